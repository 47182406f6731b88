//! # Config - Shell Settings
//!
//! Settings of the blob shell, read from environment variables:
//!
//! ```text
//! BLOBSTORE_PATH      snapshot file                        (default: "blobs.db")
//! BLOBSTORE_SYNC      fsync on COMMIT                      (default: "true")
//! BLOBSTORE_LIMIT_KB  node store budget in KiB, 0 = none   (default: 0)
//! BLOBSTORE_LOG       tracing filter directive             (default: "warn")
//! ```
//!
//! A value that is set but cannot be parsed is an error naming the variable.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

pub const PATH_VAR: &str = "BLOBSTORE_PATH";
pub const SYNC_VAR: &str = "BLOBSTORE_SYNC";
pub const LIMIT_VAR: &str = "BLOBSTORE_LIMIT_KB";
pub const LOG_VAR: &str = "BLOBSTORE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Snapshot file loaded at startup and written by `COMMIT`.
    pub store_path: PathBuf,
    /// Whether a commit fsyncs the file and its directory.
    pub sync: bool,
    /// Byte budget of the node store, `None` for unlimited.
    pub limit_bytes: Option<usize>,
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("blobs.db"),
            sync: true,
            limit_bytes: None,
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let store_path = lookup(PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or(defaults.store_path);

        let sync = match lookup(SYNC_VAR) {
            Some(v) => parse_bool(&v).with_context(|| format!("invalid {}", SYNC_VAR))?,
            None => defaults.sync,
        };

        let limit_bytes = match lookup(LIMIT_VAR) {
            Some(v) => {
                let kb: usize = v
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid {}: {:?}", LIMIT_VAR, v))?;
                match kb {
                    0 => None,
                    kb => Some(
                        kb.checked_mul(1024)
                            .with_context(|| format!("{} too large: {}", LIMIT_VAR, kb))?,
                    ),
                }
            }
            None => defaults.limit_bytes,
        };

        let log_filter = lookup(LOG_VAR).unwrap_or(defaults.log_filter);

        Ok(Self {
            store_path,
            sync,
            limit_bytes,
            log_filter,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.store_path, PathBuf::from("blobs.db"));
        assert!(cfg.sync);
        assert_eq!(cfg.limit_bytes, None);
        assert_eq!(cfg.log_filter, "warn");
    }

    #[test]
    fn reads_every_variable() {
        let cfg = Config::from_lookup(lookup_from(&[
            (PATH_VAR, "/tmp/x.db"),
            (SYNC_VAR, "false"),
            (LIMIT_VAR, "64"),
            (LOG_VAR, "blob=debug"),
        ]))
        .unwrap();
        assert_eq!(cfg.store_path, PathBuf::from("/tmp/x.db"));
        assert!(!cfg.sync);
        assert_eq!(cfg.limit_bytes, Some(64 * 1024));
        assert_eq!(cfg.log_filter, "blob=debug");
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let cfg = Config::from_lookup(lookup_from(&[(LIMIT_VAR, "0")])).unwrap();
        assert_eq!(cfg.limit_bytes, None);
    }

    #[test]
    fn boolean_spellings() {
        for (raw, expected) in [("1", true), ("YES", true), ("off", false), (" no ", false)] {
            let cfg = Config::from_lookup(lookup_from(&[(SYNC_VAR, raw)])).unwrap();
            assert_eq!(cfg.sync, expected, "{}", raw);
        }
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = Config::from_lookup(lookup_from(&[(SYNC_VAR, "maybe")])).unwrap_err();
        assert!(format!("{:#}", err).contains(SYNC_VAR));

        let err = Config::from_lookup(lookup_from(&[(LIMIT_VAR, "-3")])).unwrap_err();
        assert!(format!("{:#}", err).contains(LIMIT_VAR));
    }
}
