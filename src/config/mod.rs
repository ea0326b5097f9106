pub mod settings;

// Re-export the primary Config struct
pub use settings::Config;

use crate::error::SwapError;
use std::sync::Arc;

/// Loads `.env` (if present), reads the environment and validates the result.
/// Logs nothing; callers report the config once logging is up.
pub fn load_config() -> Result<Arc<settings::Config>, SwapError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = settings::Config::from_env();
    config.validate()?;

    Ok(Arc::new(config))
}
