use std::path::PathBuf;

use anyhow::{ensure, Result};
use tracing::{info, warn};

use crate::streak::DEFAULT_STREAK_LOOKBACK_DAYS;

pub const STREAK_LOOKBACK_VAR: &str = "HABIT_STREAK_LOOKBACK_DAYS";
pub const STORE_ROOT_VAR: &str = "HABIT_STORE_ROOT";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackConfig {
    pub streak_lookback_days: u32,
    /// Directory of the JSON document store, when one is used.
    pub store_root: Option<PathBuf>,
}

impl StackConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(STREAK_LOOKBACK_VAR) {
            match raw.trim().parse::<u32>() {
                Ok(value) if value > 0 => config.streak_lookback_days = value,
                _ => warn!(value = %raw, "ignoring invalid {STREAK_LOOKBACK_VAR}"),
            }
        }
        if let Some(raw) = lookup(STORE_ROOT_VAR) {
            let path = PathBuf::from(raw.trim());
            ensure!(
                !path.is_file(),
                "{STORE_ROOT_VAR} `{}` is a file, expected a directory",
                path.display()
            );
            info!(path = %path.display(), "using habit store root");
            config.store_root = Some(path);
        }
        Ok(config)
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            streak_lookback_days: DEFAULT_STREAK_LOOKBACK_DAYS,
            store_root: None,
        }
    }
}
