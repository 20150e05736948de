//! Telegram credentials loaded from an INI-style config file
//!
//! The file format is the one understood by Python's `configparser`:
//!
//! ```text
//! [Telegram]
//! bot_token = "123456:ABC-DEF"
//! chat_id = "-1001234567"
//! ```
//!
//! Values may be wrapped in double quotes, which are stripped. Keys are
//! matched case-insensitively; section names are not.

use crate::CREDENTIALS_SECTION;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Bot token and chat the notifications go to
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bot_token: String,
    pub chat_id: String,
}

// Keep the token out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl Credentials {
    /// Load credentials from the `[Telegram]` section of `path`
    ///
    /// Fails with [`ConfigError`] if the file is missing or unreadable, or if
    /// either `bot_token` or `chat_id` is absent or empty. Never retries.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        log::info!("Loading Telegram bot token and chat ID...");

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let credentials = Self::parse(&contents)?;
        log::info!("Telegram bot token and chat ID loaded.");
        Ok(credentials)
    }

    /// Parse credentials from config file contents
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let sections = parse_sections(contents)?;

        let section = sections
            .get(CREDENTIALS_SECTION)
            .ok_or_else(|| ConfigError::MissingSection(CREDENTIALS_SECTION.to_string()))?;

        let lookup = |key: &str| -> Result<String, ConfigError> {
            section
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
                .ok_or_else(|| {
                    log::error!("Telegram bot token or chat ID not found. Exiting...");
                    ConfigError::MissingKey(key.to_string())
                })
        };

        Ok(Self {
            bot_token: lookup("bot_token")?,
            chat_id: lookup("chat_id")?,
        })
    }
}

type Section = HashMap<String, String>;

/// Split INI text into `section -> (key -> value)`
fn parse_sections(contents: &str) -> Result<HashMap<String, Section>, ConfigError> {
    let mut sections: HashMap<String, Section> = HashMap::new();
    let mut current: Option<String> = None;

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let malformed = || ConfigError::Malformed {
            line: index + 1,
            content: raw.to_string(),
        };

        let (key, value) = split_pair(line).ok_or_else(malformed)?;
        let section = current
            .as_ref()
            .and_then(|name| sections.get_mut(name))
            .ok_or_else(malformed)?;

        section.insert(key.to_lowercase(), strip_quotes(value).to_string());
    }

    Ok(sections)
}

/// Split `key = value` or `key: value` on the first delimiter
fn split_pair(line: &str) -> Option<(&str, &str)> {
    let pos = line.find(['=', ':'])?;
    let key = line[..pos].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[pos + 1..].trim()))
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"').trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_quoted_values() {
        let creds = Credentials::parse(
            "[Telegram]\nbot_token = \"123456:ABC-DEF\"\nchat_id = \"-1001234\"\n",
        )
        .unwrap();
        assert_eq!(creds.bot_token, "123456:ABC-DEF");
        assert_eq!(creds.chat_id, "-1001234");
    }

    #[test]
    fn test_parse_unquoted_and_colon_delimiter() {
        let creds = Credentials::parse("# bot\n[Telegram]\nBOT_TOKEN: 42:xyz\n; note\nchat_id=7\n")
            .unwrap();
        assert_eq!(creds.bot_token, "42:xyz");
        assert_eq!(creds.chat_id, "7");
    }

    #[test]
    fn test_token_colon_kept_in_value() {
        // Only the first delimiter splits the pair
        let creds = Credentials::parse("[Telegram]\nbot_token = 1:2:3\nchat_id = 9\n").unwrap();
        assert_eq!(creds.bot_token, "1:2:3");
    }

    #[test]
    fn test_missing_chat_id() {
        let err = Credentials::parse("[Telegram]\nbot_token = \"abc\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "chat_id"));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let err = Credentials::parse("[Telegram]\nbot_token = \"\"\nchat_id = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "bot_token"));
    }

    #[test]
    fn test_missing_section() {
        let err = Credentials::parse("[Other]\nbot_token = a\nchat_id = b\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(_)));
    }

    #[test]
    fn test_pair_outside_section_is_malformed() {
        let err = Credentials::parse("bot_token = a\n[Telegram]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_keys_from_other_sections_ignored() {
        let err = Credentials::parse("[Other]\nchat_id = 1\n[Telegram]\nbot_token = a\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "chat_id"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Credentials::load(&dir.path().join("absent.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[Telegram]\nbot_token = \"t\"\nchat_id = \"c\"").unwrap();
        let creds = Credentials::load(file.path()).unwrap();
        assert_eq!(creds.chat_id, "c");
        assert!(!format!("{creds:?}").contains("\"t\""));
    }
}
