//! Consumer configuration.
//!
//! Values resolve in increasing precedence: built-in defaults, `.env` file,
//! process environment, command-line flags.
//!
//! # `.env` Discovery
//!
//! Without an explicit `--env-file`, `.env` in the working directory wins.
//! Otherwise we walk up to the first directory that looks like a project root
//! (contains one of [`ROOT_INDICATORS`]) and use its `.env` if present.

use fs_err as fs;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const APP_ID_ENV: &str = "DISCORD_APPLICATION_ID";
pub const STATE_FILE_ENV: &str = "STATE_FILE_PATH";
pub const POLL_INTERVAL_ENV: &str = "POLL_INTERVAL_MS";
pub const HOST_PROCESS_ENV: &str = "HOST_PROCESS_NAME";
pub const DEBUG_MODE_ENV: &str = "DEBUG_MODE";

/// Shipped so the binary starts; never a real application.
pub const PLACEHOLDER_APP_ID: &str = "123456789012345678";
pub const DEFAULT_HOST_PROCESS: &str = "fl";
pub const DEFAULT_ENV_FILE: &str = ".env";

pub const DEFAULT_TRACKING_INTERVAL: Duration = Duration::from_millis(500);
pub const WAITING_INTERVAL: Duration = Duration::from_secs(5);

pub const ROOT_INDICATORS: &[&str] = &[".env", ".git", "Cargo.toml", ".gitignore", "src"];

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceConfig {
    pub application_id: String,
    pub state_file: PathBuf,
    /// Poll cadence while the host is running.
    pub tracking_interval: Duration,
    /// Poll cadence while waiting for the host to appear.
    pub waiting_interval: Duration,
    /// Case-insensitive substring matched against process names.
    pub host_process_name: String,
    pub debug: bool,
}

impl PresenceConfig {
    pub fn uses_placeholder_app_id(&self) -> bool {
        self.application_id == PLACEHOLDER_APP_ID
    }
}

/// Values supplied on the command line. `None` defers to lower layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub application_id: Option<String>,
    pub state_file: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub host_process_name: Option<String>,
    pub debug: bool,
}

/// Builds the configuration from overrides, an env lookup and `.env` values.
///
/// `env` is usually `|key| std::env::var(key).ok()`.
pub fn resolve<F>(
    overrides: &ConfigOverrides,
    env: F,
    env_file: &BTreeMap<String, String>,
) -> Result<PresenceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| -> Option<String> {
        env(key)
            .or_else(|| env_file.get(key).cloned())
            .filter(|value| !value.trim().is_empty())
    };

    let application_id = overrides
        .application_id
        .clone()
        .or_else(|| lookup(APP_ID_ENV))
        .unwrap_or_else(|| PLACEHOLDER_APP_ID.to_string());

    let state_file = overrides
        .state_file
        .clone()
        .or_else(|| lookup(STATE_FILE_ENV).map(PathBuf::from))
        .ok_or(ConfigError::MissingStatePath)?;

    let tracking_interval = match overrides
        .poll_interval_ms
        .map(|ms| ms.to_string())
        .or_else(|| lookup(POLL_INTERVAL_ENV))
    {
        Some(raw) => Duration::from_millis(parse_millis(POLL_INTERVAL_ENV, &raw)?),
        None => DEFAULT_TRACKING_INTERVAL,
    };

    let host_process_name = overrides
        .host_process_name
        .clone()
        .or_else(|| lookup(HOST_PROCESS_ENV))
        .unwrap_or_else(|| DEFAULT_HOST_PROCESS.to_string());

    let debug = overrides.debug || lookup(DEBUG_MODE_ENV).is_some_and(|v| parse_bool(&v));

    Ok(PresenceConfig {
        application_id,
        state_file,
        tracking_interval,
        waiting_interval: WAITING_INTERVAL,
        host_process_name,
        debug,
    })
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Locates the `.env` file to load, starting from `start`.
pub fn find_env_file(start: &Path, file_name: &str) -> Option<PathBuf> {
    let direct = start.join(file_name);
    if direct.is_file() {
        return Some(direct);
    }

    let root = start.ancestors().find(|dir| {
        ROOT_INDICATORS
            .iter()
            .any(|indicator| dir.join(indicator).exists())
    })?;
    let candidate = root.join(file_name);
    candidate.is_file().then_some(candidate)
}

/// Parses a dotenv-style file. A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(parse_env(&content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(source) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// `KEY=VALUE` per line; blank lines and `#` comments are skipped, keys and
/// values are trimmed, and one layer of matching quotes is stripped.
fn parse_env(content: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    map
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn file_vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_state_path_is_fatal() {
        let result = resolve(&ConfigOverrides::default(), no_env, &BTreeMap::new());
        assert!(matches!(result, Err(ConfigError::MissingStatePath)));
    }

    #[test]
    fn test_placeholder_app_id_is_default() {
        let vars = file_vars(&[(STATE_FILE_ENV, "/tmp/state.json")]);
        let config = resolve(&ConfigOverrides::default(), no_env, &vars).unwrap();
        assert!(config.uses_placeholder_app_id());
        assert_eq!(config.tracking_interval, Duration::from_millis(500));
        assert_eq!(config.waiting_interval, Duration::from_secs(5));
        assert_eq!(config.host_process_name, "fl");
        assert!(!config.debug);
    }

    #[test]
    fn test_precedence_flags_over_env_over_file() {
        let vars = file_vars(&[
            (APP_ID_ENV, "from-file"),
            (STATE_FILE_ENV, "/file/state.json"),
            (HOST_PROCESS_ENV, "file-host"),
        ]);
        let env = |key: &str| match key {
            APP_ID_ENV => Some("from-env".to_string()),
            STATE_FILE_ENV => Some("/env/state.json".to_string()),
            _ => None,
        };
        let overrides = ConfigOverrides {
            state_file: Some(PathBuf::from("/flag/state.json")),
            ..ConfigOverrides::default()
        };

        let config = resolve(&overrides, env, &vars).unwrap();
        assert_eq!(config.application_id, "from-env");
        assert_eq!(config.state_file, PathBuf::from("/flag/state.json"));
        assert_eq!(config.host_process_name, "file-host");
    }

    #[test]
    fn test_poll_interval_and_debug_from_file() {
        let vars = file_vars(&[
            (STATE_FILE_ENV, "/tmp/state.json"),
            (POLL_INTERVAL_ENV, "250"),
            (DEBUG_MODE_ENV, "Yes"),
        ]);
        let config = resolve(&ConfigOverrides::default(), no_env, &vars).unwrap();
        assert_eq!(config.tracking_interval, Duration::from_millis(250));
        assert!(config.debug);
    }

    #[test]
    fn test_invalid_poll_interval_is_rejected() {
        let vars = file_vars(&[(STATE_FILE_ENV, "/tmp/s.json"), (POLL_INTERVAL_ENV, "soon")]);
        let result = resolve(&ConfigOverrides::default(), no_env, &vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_env_handles_comments_quotes_and_spacing() {
        let vars = parse_env(
            "# app\n\
             DISCORD_APPLICATION_ID = \"1122334455\"\n\
             \n\
             STATE_FILE_PATH='C:\\Temp\\fl_studio_state.json'\n\
             NOT A PAIR\n\
             =orphan\n\
             DEBUG_MODE=true\n",
        );
        assert_eq!(vars.get(APP_ID_ENV).map(String::as_str), Some("1122334455"));
        assert_eq!(
            vars.get(STATE_FILE_ENV).map(String::as_str),
            Some("C:\\Temp\\fl_studio_state.json")
        );
        assert_eq!(vars.get(DEBUG_MODE_ENV).map(String::as_str), Some("true"));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_find_env_file_walks_up_to_project_root() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("project");
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join(".env"), "STATE_FILE_PATH=/x\n").unwrap();

        assert_eq!(find_env_file(&nested, ".env"), Some(root.join(".env")));
    }

    #[test]
    fn test_find_env_file_prefers_working_directory() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(".env"), "").unwrap();
        assert_eq!(
            find_env_file(temp.path(), ".env"),
            Some(temp.path().join(".env"))
        );
    }

    #[test]
    fn test_read_missing_env_file_is_empty() {
        let temp = tempdir().unwrap();
        let vars = read_env_file(&temp.path().join("nope.env")).unwrap();
        assert!(vars.is_empty());
    }
}
