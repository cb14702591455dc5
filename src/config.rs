//! JSON configuration for the `ksr` command line.
//!
//! Every field has a default, so an empty object (or no file at all) is a
//! valid configuration. Durations are written as `"300ms"`, `"2s"`, `"1m"`
//! or a bare number of milliseconds.

use crate::error::{KsrError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::time::Duration;

/// Largest accepted repeat count.
pub const MAX_REPEAT_COUNT: u32 = 100;

const MAX_SETTLE_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(
        default = "default_settle_delay",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub settle_delay: Duration,

    #[serde(
        default = "default_repetition_gap",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub repetition_gap: Duration,

    #[serde(
        default = "default_focus_countdown",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub focus_countdown: Duration,

    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,

    #[serde(default = "default_stop_hotkey")]
    pub stop_hotkey: String,

    #[serde(default)]
    pub max_events: Option<usize>,

    #[serde(default = "default_true")]
    pub prefer_native_code: bool,

    #[serde(default)]
    pub verbose: bool,
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_repetition_gap() -> Duration {
    Duration::from_millis(500)
}

fn default_focus_countdown() -> Duration {
    Duration::from_secs(2)
}

fn default_repeat_count() -> u32 {
    1
}

fn default_stop_hotkey() -> String {
    "ctrl+alt+s".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
            repetition_gap: default_repetition_gap(),
            focus_countdown: default_focus_countdown(),
            repeat_count: default_repeat_count(),
            stop_hotkey: default_stop_hotkey(),
            max_events: None,
            prefer_native_code: true,
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| KsrError::config_load(path, e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| KsrError::config_load(path, e.to_string()))
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KsrError::config_save(path, e.to_string()))?;
        fs::write(path, content).map_err(|e| KsrError::config_save(path, e.to_string()))
    }

    /// Override the repeat count, holding it to the same bounds as the file.
    pub fn set_repeat_count(&mut self, count: u32) -> Result<()> {
        check_repeat_count(count)?;
        self.repeat_count = count;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_repeat_count(self.repeat_count)?;

        if self.stop_hotkey.trim().is_empty() {
            return Err(KsrError::config_validation("stop_hotkey cannot be empty"));
        }

        if self.max_events == Some(0) {
            return Err(KsrError::config_validation(
                "max_events must be greater than 0",
            ));
        }

        if self.settle_delay > MAX_SETTLE_DELAY {
            return Err(KsrError::config_validation(format!(
                "settle_delay cannot exceed {}s",
                MAX_SETTLE_DELAY.as_secs()
            )));
        }

        Ok(())
    }
}

fn check_repeat_count(count: u32) -> Result<()> {
    if count == 0 || count > MAX_REPEAT_COUNT {
        return Err(KsrError::config_validation(format!(
            "repeat_count must be between 1 and {}",
            MAX_REPEAT_COUNT
        )));
    }
    Ok(())
}

/// Parse a duration such as `"500ms"`, `"2s"`, `"1m"` or `"1500"` (milliseconds).
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(KsrError::invalid_duration(value, "empty duration"));
    }

    let (number, unit) = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(index) => trimmed.split_at(index),
        None => (trimmed.as_str(), "ms"),
    };
    if number.is_empty() {
        return Err(KsrError::invalid_duration(value, "missing number"));
    }

    let amount: u64 = number
        .parse()
        .map_err(|_| KsrError::invalid_duration(value, "number out of range"))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => amount
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| KsrError::invalid_duration(value, "number out of range")),
        other => Err(KsrError::invalid_duration(
            value,
            format!("unknown unit '{}'", other),
        )),
    }
}

/// Format a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis != 0 && millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else if millis != 0 && millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*duration))
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
    }
}
