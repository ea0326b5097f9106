// src/utils/mod.rs
use log::{error, info};
use solana_sdk::signature::{read_keypair_file, Keypair};
use std::str::FromStr;

pub mod timing;

pub use timing::{Clock, ManualClock, SystemClock, Timer};

/// Install the process-wide `fern` logger. `level` accepts the usual
/// `error|warn|info|debug|trace` names; anything else falls back to `info`.
pub fn setup_logging(level: &str) -> Result<(), fern::InitError> {
    let level = log::LevelFilter::from_str(level).unwrap_or(log::LevelFilter::Info);
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Utc::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("solana_rbpf", log::LevelFilter::Warn)
        .level_for("solana_client", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized at {}.", level);
    Ok(())
}

pub fn load_keypair(path: &str) -> anyhow::Result<Keypair> {
    match read_keypair_file(path) {
        Ok(kp) => {
            info!("Successfully loaded keypair from: {}", path);
            Ok(kp)
        }
        Err(e) => {
            let error_msg = format!("Failed to load keypair from path '{}': {}", path, e);
            error!("{}", error_msg);
            Err(anyhow::anyhow!(error_msg))
        }
    }
}

/// First six characters of a mint, for log lines.
pub fn short_mint(mint: &str) -> String {
    mint.chars().take(6).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_mint() {
        assert_eq!(
            short_mint("So11111111111111111111111111111111111111112"),
            "So1111"
        );
        assert_eq!(short_mint("abc"), "abc");
    }

    #[test]
    fn test_load_keypair_missing_file() {
        assert!(load_keypair("/definitely/not/here.json").is_err());
    }
}
