use crate::error::SettingsError;
use std::{collections::HashMap, fs, path::Path};

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// A frozen copy of environment variables. Settings resolution reads from
/// this instead of the live process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Adds the variables of a `.env` file. File values win over existing
    /// ones.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_env_content(&content)
    }

    /// Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), SettingsError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(SettingsError::EnvFile {
                    line: line_num + 1,
                    reason: "expected KEY=VALUE",
                });
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(SettingsError::EnvFile {
                    line: line_num + 1,
                    reason: "empty key",
                });
            }

            self.vars.insert(key.to_string(), unquote_value(value));
        }

        Ok(())
    }
}

fn unquote_value(value: &str) -> String {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
