//! User-facing settings and their validation.

use crate::error::{Result, StateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

pub const THEME: &str = "theme";
pub const FONT_SIZE: &str = "font_size";
pub const LANGUAGE_FOCUS: &str = "language_focus";

pub const FONT_SIZE_RANGE: RangeInclusive<u32> = 10..=32;
const MAX_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::System => "system",
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Theme::System),
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(StateError::InvalidSetting {
                key: THEME.to_string(),
                reason: format!("unknown theme '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub theme: Theme,
    pub font_size: u32,
    pub language_focus: Option<String>,
    /// Settings this version does not interpret, kept verbatim.
    pub extra: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            font_size: 16,
            language_focus: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            THEME => Some(self.theme.to_string()),
            FONT_SIZE => Some(self.font_size.to_string()),
            LANGUAGE_FOCUS => self.language_focus.clone(),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Validate and apply one setting. An empty value unsets optional and
    /// free-form keys.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<SettingChange> {
        validate_key(key)?;
        let before = self.get(key);

        match key {
            THEME => self.theme = value.parse()?,
            FONT_SIZE => {
                let size: u32 = value.trim().parse().map_err(|_| StateError::InvalidSetting {
                    key: FONT_SIZE.to_string(),
                    reason: format!("'{}' is not a number", value),
                })?;
                if !FONT_SIZE_RANGE.contains(&size) {
                    return Err(StateError::InvalidSetting {
                        key: FONT_SIZE.to_string(),
                        reason: format!(
                            "{} is outside {}..={}",
                            size,
                            FONT_SIZE_RANGE.start(),
                            FONT_SIZE_RANGE.end()
                        ),
                    });
                }
                self.font_size = size;
            }
            LANGUAGE_FOCUS => {
                let trimmed = value.trim();
                self.language_focus = (!trimmed.is_empty()).then(|| trimmed.to_string());
            }
            other => {
                if value.is_empty() {
                    self.extra.remove(other);
                } else {
                    self.extra.insert(other.to_string(), value.to_string());
                }
            }
        }

        let after = self.get(key);
        Ok(SettingChange {
            changed: before != after,
            value: after,
        })
    }

    /// Every non-default setting as `(key, value)`.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            (THEME.to_string(), self.theme.to_string()),
            (FONT_SIZE.to_string(), self.font_size.to_string()),
        ];
        if let Some(focus) = &self.language_focus {
            entries.push((LANGUAGE_FOCUS.to_string(), focus.clone()));
        }
        entries.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        entries
    }
}

/// Outcome of [`Settings::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub changed: bool,
    /// Normalized value; `None` means the key is now unset.
    pub value: Option<String>,
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(StateError::InvalidSetting {
            key: key.to_string(),
            reason: "keys are 1-64 characters of [A-Za-z0-9_.-]".to_string(),
        })
    }
}
