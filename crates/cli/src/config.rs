//! Configuration loading.
//!
//! `courier.toml` with `${ENV_VAR}` substitution, discovered project-local
//! first and then under the user config directory.

use std::path::{Path, PathBuf};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use courier_telegram::TelegramConfig;

/// Standard config file name.
const CONFIG_FILENAME: &str = "courier.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub telegram: TelegramConfig,
    pub forward: ForwardSection,
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardSection {
    /// Forward every Nth post. The value persisted in the store wins over
    /// this at startup.
    pub repost_step: u32,
    /// Album debounce window in seconds.
    pub album_idle_secs: f64,
}

impl Default for ForwardSection {
    fn default() -> Self {
        Self {
            repost_step: 1,
            album_idle_secs: 4.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite database path.
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("courier.db"),
        }
    }
}

/// Load config from `path`, or discover it in standard locations.
///
/// Returns defaults when nothing is found (startup validation rejects the
/// missing token with a clearer message than a parse error would).
pub fn load(path: Option<&Path>) -> anyhow::Result<CourierConfig> {
    if let Some(path) = path {
        return load_file(path);
    }
    if let Some(found) = find_config_file() {
        debug!(path = %found.display(), "loading config");
        return load_file(&found);
    }
    warn!("no {CONFIG_FILENAME} found, using defaults");
    Ok(CourierConfig::default())
}

fn load_file(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    Ok(toml::from_str(&raw)?)
}

/// Search order: project-local, then `~/.config/courier/`.
fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(dirs) = directories::ProjectDirs::from("", "", "courier") {
        let global = dirs.config_dir().join(CONFIG_FILENAME);
        if global.exists() {
            return Some(global);
        }
    }
    None
}

/// Replace `${ENV_VAR}` placeholders in config string values.
///
/// Unresolvable variables are left as-is.
fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if closed && !var_name.is_empty() {
                match lookup(&var_name) {
                    Some(val) => result.push_str(&val),
                    None => {
                        result.push_str("${");
                        result.push_str(&var_name);
                        result.push('}');
                    },
                }
            } else {
                result.push_str("${");
                result.push_str(&var_name);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::io::Write};

    #[test]
    fn defaults() {
        let config = CourierConfig::default();
        assert_eq!(config.forward.repost_step, 1);
        assert!((config.forward.album_idle_secs - 4.5).abs() < f64::EPSILON);
        assert_eq!(config.storage.path, PathBuf::from("courier.db"));
    }

    #[test]
    fn parse_full_config() {
        let config: CourierConfig = toml::from_str(
            r#"
            [telegram]
            token = "123:ABC"
            fallback_token = "456:DEF"
            owner_ids = [42, 43]

            [forward]
            repost_step = 3
            album_idle_secs = 2.0

            [storage]
            path = "/var/lib/courier/courier.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.telegram.owner_ids, vec![42, 43]);
        assert_eq!(config.forward.repost_step, 3);
        assert_eq!(
            config.storage.path,
            PathBuf::from("/var/lib/courier/courier.db")
        );
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: CourierConfig = toml::from_str(
            r#"
            [telegram]
            token = "123:ABC"
            owner_ids = [42]
            "#,
        )
        .unwrap();
        assert_eq!(config.forward.repost_step, 1);
        assert_eq!(config.storage.path, PathBuf::from("courier.db"));
    }

    #[test]
    fn substitutes_known_var() {
        let lookup = |name: &str| match name {
            "COURIER_TEST_TOKEN" => Some("tok".to_string()),
            _ => None,
        };
        assert_eq!(
            substitute_env_with("token = \"${COURIER_TEST_TOKEN}\"", lookup),
            "token = \"tok\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        let lookup = |_: &str| None;
        assert_eq!(
            substitute_env_with("${COURIER_NONEXISTENT_XYZ}", lookup),
            "${COURIER_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }

    #[test]
    fn load_reads_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[telegram]\ntoken = \"123:ABC\"\nowner_ids = [42]\n"
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.telegram.token.expose_secret(), "123:ABC");
    }

    #[test]
    fn load_rejects_missing_explicit_path() {
        assert!(load(Some(Path::new("/nonexistent/courier.toml"))).is_err());
    }
}
