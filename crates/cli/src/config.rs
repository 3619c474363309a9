//! Server configuration for `praxis serve`.
//!
//! Settings come from three layers, later ones winning: the `praxis.toml`
//! file, `PRAXIS_*` environment variables, then command-line flags.
//!
//! # Example
//!
//! ```toml
//! port = 8080
//! workflow = "workflows/practice.json"
//! rate_limit = 120
//! notify_queue = 256
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when `--config` is absent.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "praxis.toml";

pub(crate) const DEFAULT_PORT: u16 = 8080;

/// Requests per minute per client IP.
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 60;

/// Contents of `praxis.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub port: Option<u16>,
    /// Workflow definition file (JSON or TOML). Built-in workflow when unset.
    pub workflow: Option<PathBuf>,
    pub rate_limit: Option<u64>,
    /// Capacity of the notification queue. Notifications are only logged
    /// when unset.
    pub notify_queue: Option<usize>,
    pub api_key: Option<String>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub(crate) struct ServeFlags {
    pub port: Option<u16>,
    pub workflow: Option<PathBuf>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ServeSettings {
    pub port: u16,
    pub workflow: Option<PathBuf>,
    pub rate_limit: u64,
    pub notify_queue: Option<usize>,
    pub api_key: Option<String>,
}

/// Read and parse a config file.
pub(crate) fn read_config(path: &Path) -> Result<FileConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

/// Load the explicit config file, or `praxis.toml` from the working
/// directory if one exists.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<FileConfig, String> {
    match explicit {
        Some(path) => read_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                read_config(default)
            } else {
                Ok(FileConfig::default())
            }
        }
    }
}

/// Merge file, environment and flags. `env` looks up one variable.
pub(crate) fn resolve(
    file: FileConfig,
    env: impl Fn(&str) -> Option<String>,
    flags: ServeFlags,
) -> Result<ServeSettings, String> {
    let env_port = match env("PRAXIS_PORT") {
        Some(v) => Some(
            v.parse::<u16>()
                .map_err(|_| format!("PRAXIS_PORT is not a valid port: '{}'", v))?,
        ),
        None => None,
    };
    let env_rate = match env("PRAXIS_RATE_LIMIT") {
        Some(v) => Some(
            v.parse::<u64>()
                .map_err(|_| format!("PRAXIS_RATE_LIMIT is not a number: '{}'", v))?,
        ),
        None => None,
    };
    let env_key = env("PRAXIS_API_KEY").filter(|k| !k.is_empty());

    Ok(ServeSettings {
        port: flags.port.or(env_port).or(file.port).unwrap_or(DEFAULT_PORT),
        workflow: flags.workflow.or(file.workflow),
        rate_limit: env_rate.or(file.rate_limit).unwrap_or(DEFAULT_RATE_LIMIT),
        notify_queue: file.notify_queue,
        api_key: env_key.or(file.api_key.filter(|k| !k.is_empty())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let s = resolve(FileConfig::default(), env_from(&[]), ServeFlags::default()).unwrap();
        assert_eq!(s.port, DEFAULT_PORT);
        assert_eq!(s.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(s.workflow, None);
        assert_eq!(s.api_key, None);
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let file: FileConfig = toml::from_str(
            r#"
            port = 7000
            rate_limit = 10
            notify_queue = 32
            api_key = "from-file"
            "#,
        )
        .unwrap();
        let env = env_from(&[
            ("PRAXIS_PORT", "7100"),
            ("PRAXIS_RATE_LIMIT", "20"),
            ("PRAXIS_API_KEY", "from-env"),
        ]);
        let s = resolve(
            file.clone(),
            &env,
            ServeFlags {
                port: Some(7200),
                workflow: None,
            },
        )
        .unwrap();
        assert_eq!(s.port, 7200);
        assert_eq!(s.rate_limit, 20);
        assert_eq!(s.notify_queue, Some(32));
        assert_eq!(s.api_key.as_deref(), Some("from-env"));

        let s = resolve(file, &env, ServeFlags::default()).unwrap();
        assert_eq!(s.port, 7100);
    }

    #[test]
    fn bad_env_port_is_reported() {
        let err = resolve(
            FileConfig::default(),
            env_from(&[("PRAXIS_PORT", "eighty")]),
            ServeFlags::default(),
        )
        .unwrap_err();
        assert!(err.contains("PRAXIS_PORT"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = toml::from_str::<FileConfig>("prot = 80").unwrap_err();
        assert!(err.to_string().contains("prot"));
    }

    #[test]
    fn read_config_reports_missing_file() {
        let err = read_config(Path::new("/nonexistent/praxis.toml")).unwrap_err();
        assert!(err.starts_with("could not read"));
    }
}
