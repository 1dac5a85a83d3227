/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

/// A flat `key = value` configuration file. Keys are matched
/// case-insensitively, `#` starts a comment, surrounding whitespace is
/// trimmed from both keys and values.
#[derive(Debug, Default, Clone)]
pub struct ConfigFile {
    entries: Vec<(String, String)>,
    path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid value {value:?} for key {key}")]
    InvalidValue { key: String, value: String },
}

impl ConfigFile {
    pub fn parse(contents: &str) -> Self {
        let mut entries = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        ConfigFile {
            entries,
            path: None,
        }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&contents);
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            entry.1 = value.into();
        } else {
            self.entries.push((key.to_string(), value.into()));
        }
    }

    pub fn property<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn property_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    pub fn serialize(&self) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(self.entries.len() * 24);
        for (key, value) in &self.entries {
            let _ = writeln!(out, "{key} = {value}");
        }
        out
    }

    pub fn write_back(&self) -> std::io::Result<()> {
        if let Some(path) = &self.path {
            std::fs::write(path, self.serialize())
        } else {
            Ok(())
        }
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.serialize())
    }
}

impl Display for ConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_lookup() {
        let config = ConfigFile::parse(
            "# autoreply settings\nOOF_STATE = 1\nSTART_TIME=1700000000\n\nbogus line\n",
        );
        assert_eq!(config.get("oof_state"), Some("1"));
        assert_eq!(config.property::<u64>("START_TIME").unwrap(), Some(1700000000));
        assert_eq!(config.get("bogus"), None);
    }

    #[test]
    fn set_preserves_order() {
        let mut config = ConfigFile::parse("a = 1\nb = 2\n");
        config.set("A", "3");
        config.set("c", "4");
        assert_eq!(config.serialize(), "a = 3\nb = 2\nc = 4\n");
    }
}
