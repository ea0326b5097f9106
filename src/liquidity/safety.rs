use crate::{
    error::Result,
    liquidity::{providers::SafetyValidator, types::SafetyVerdict},
    utils::short_mint,
};
use async_trait::async_trait;
use log::{info, warn};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
};

/// =====================================
///  Deny-list of known rug / honeypot mints
/// =====================================

/// Static mint deny-list. Mint addresses are base58 and compared exactly.
#[derive(Debug, Clone, Default)]
pub struct BannedMintValidator {
    banned: HashMap<String, String>,
}

impl BannedMintValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One mint per line, optionally followed by `,reason`. Blank lines and `#` comments skipped.
    /// A missing file yields an empty list.
    pub fn load_from_file(path: Option<&str>) -> Self {
        let mut validator = Self::new();
        let Some(file_path) = path else {
            return validator;
        };
        match File::open(file_path) {
            Ok(file) => {
                for line in BufReader::new(file).lines().map_while(|l| l.ok()) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let mut parts = line.splitn(2, ',');
                    let mint = parts.next().unwrap_or_default().trim();
                    let reason = parts
                        .next()
                        .map(|r| r.trim().to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "listed as unsafe".to_string());
                    if !mint.is_empty() {
                        validator.banned.insert(mint.to_string(), reason);
                    }
                }
                info!(
                    "🚫 Loaded {} banned mints from {}",
                    validator.banned.len(),
                    file_path
                );
            }
            Err(e) => warn!("Could not open banned mint list {}: {}", file_path, e),
        }
        validator
    }

    pub fn ban(mut self, mint: &str, reason: &str) -> Self {
        self.banned.insert(mint.to_string(), reason.to_string());
        self
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.banned.contains_key(mint)
    }

    pub fn len(&self) -> usize {
        self.banned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banned.is_empty()
    }
}

#[async_trait]
impl SafetyValidator for BannedMintValidator {
    async fn validate(&self, mint: &str) -> Result<SafetyVerdict> {
        Ok(match self.banned.get(mint) {
            Some(reason) => {
                warn!("🚫 Mint {} is banned: {}", short_mint(mint), reason);
                SafetyVerdict::unsafe_because(format!("{} ({})", reason, mint))
            }
            None => SafetyVerdict::safe(),
        })
    }
}
