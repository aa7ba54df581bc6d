//! Stack configuration
//!
//! ## Configuration (Environment Variables)
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EVALSTACK_JOURNAL` | `on` | `0`, `false` or `off` disables the operation journal |
//! | `EVALSTACK_MAX_STACK_REFERENCES` | `2048` | Ceiling checked by `StackReferenceCounter` |
//!
//! ## Example
//!
//! ```bash
//! # Benchmark run without journaling
//! EVALSTACK_JOURNAL=off ./my-vm contract.nef
//! ```

/// Default ceiling on live stack references per VM execution
pub const DEFAULT_MAX_STACK_REFERENCES: usize = 2048;

/// Evaluation stack configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Record every stack call in the operation journal
    pub journal: bool,
    /// Ceiling on live stack references, enforced by the reference counter
    pub max_stack_references: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            journal: true,
            max_stack_references: DEFAULT_MAX_STACK_REFERENCES,
        }
    }
}

impl StackConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let journal = std::env::var("EVALSTACK_JOURNAL")
            .ok()
            .map(|s| !matches!(s.trim().to_lowercase().as_str(), "0" | "false" | "off"))
            .unwrap_or(true);

        let max_stack_references = std::env::var("EVALSTACK_MAX_STACK_REFERENCES")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|&v: &usize| v > 0)
            .unwrap_or(DEFAULT_MAX_STACK_REFERENCES);

        Self {
            journal,
            max_stack_references,
        }
    }

    /// Same limits with journaling turned off
    pub fn without_journal(mut self) -> Self {
        self.journal = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let saved: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(k, _)| (k.to_string(), std::env::var(k).ok()))
            .collect();

        // SAFETY: callers are #[serial], no other thread touches the environment
        unsafe {
            for (k, v) in vars {
                match v {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }
        }

        f();

        // SAFETY: restoring environment to original state
        unsafe {
            for (k, v) in saved {
                match v {
                    Some(v) => std::env::set_var(&k, v),
                    None => std::env::remove_var(&k),
                }
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = StackConfig::default();
        assert!(config.journal);
        assert_eq!(config.max_stack_references, 2048);
        assert!(!config.without_journal().journal);
    }

    #[test]
    #[serial]
    fn test_from_env_unset() {
        with_env(
            &[
                ("EVALSTACK_JOURNAL", None),
                ("EVALSTACK_MAX_STACK_REFERENCES", None),
            ],
            || {
                assert_eq!(StackConfig::from_env(), StackConfig::default());
            },
        );
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        with_env(
            &[
                ("EVALSTACK_JOURNAL", Some("OFF")),
                ("EVALSTACK_MAX_STACK_REFERENCES", Some("64")),
            ],
            || {
                let config = StackConfig::from_env();
                assert!(!config.journal);
                assert_eq!(config.max_stack_references, 64);
            },
        );
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_limit() {
        with_env(
            &[
                ("EVALSTACK_JOURNAL", Some("yes")),
                ("EVALSTACK_MAX_STACK_REFERENCES", Some("0")),
            ],
            || {
                let config = StackConfig::from_env();
                assert!(config.journal);
                assert_eq!(config.max_stack_references, DEFAULT_MAX_STACK_REFERENCES);
            },
        );
    }
}
