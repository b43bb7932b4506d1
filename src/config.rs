use std::{env, num::ParseIntError};

use crate::{
    convention::{self, FrameConvention, UnknownConvention},
    walk::DEFAULT_MAX_DEPTH,
};

pub const CONVENTION_VAR: &str = "FPWIND_CONVENTION";
pub const MAX_DEPTH_VAR: &str = "FPWIND_MAX_DEPTH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FPWIND_CONVENTION: {0}")]
    Convention(#[from] UnknownConvention),
    #[error("FPWIND_MAX_DEPTH: {0}")]
    MaxDepth(#[from] ParseIntError),
}

/// Which frame convention to walk with, and how deep to go.
#[derive(Debug, Clone, Copy)]
pub struct UnwindConfig {
    pub convention: &'static FrameConvention,
    pub max_depth: usize,
}

impl Default for UnwindConfig {
    fn default() -> Self {
        UnwindConfig {
            convention: FrameConvention::host().unwrap_or(&convention::AARCH64),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl UnwindConfig {
    /// The defaults, overridden by `FPWIND_CONVENTION` and `FPWIND_MAX_DEPTH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = UnwindConfig::default();
        if let Some(name) = var(CONVENTION_VAR) {
            config.convention = name.trim().parse()?;
        }
        if let Some(depth) = var(MAX_DEPTH_VAR) {
            config.max_depth = depth.trim().parse()?;
        }
        debug!(convention = %config.convention, max_depth = config.max_depth, "unwind config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = UnwindConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        if let Some(host) = FrameConvention::host() {
            assert_eq!(config.convention, host);
        }
    }

    #[test]
    fn overrides() {
        let config = UnwindConfig::from_vars(vars(&[
            (CONVENTION_VAR, "riscv64"),
            (MAX_DEPTH_VAR, " 64 "),
        ]))
        .unwrap();
        assert_eq!(config.convention.name, "riscv64");
        assert_eq!(config.max_depth, 64);
    }

    #[test]
    fn bad_values() {
        assert!(matches!(
            UnwindConfig::from_vars(vars(&[(CONVENTION_VAR, "sparc")])),
            Err(ConfigError::Convention(_))
        ));
        assert!(matches!(
            UnwindConfig::from_vars(vars(&[(MAX_DEPTH_VAR, "lots")])),
            Err(ConfigError::MaxDepth(_))
        ));
    }
}
