use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::model::WatchEntry;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_SPEECH_RATE: f32 = 1.0;
const MIN_SPEECH_RATE: f32 = 0.1;
const MAX_SPEECH_RATE: f32 = 10.0;
const DEFAULT_LOG_LEVEL: u8 = 2;
const MAX_LOG_LEVEL: u8 = 4;

/// Every key the watcher recognizes in the shared settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Watchlist,
    Paused,
    AutoFulfill,
    PollIntervalMs,
    RefreshWhileActive,
    UseSpeech,
    SpeechNameLimit,
    SpeechRate,
    LogLevel,
}

impl SettingKey {
    pub const ALL: [SettingKey; 9] = [
        SettingKey::Watchlist,
        SettingKey::Paused,
        SettingKey::AutoFulfill,
        SettingKey::PollIntervalMs,
        SettingKey::RefreshWhileActive,
        SettingKey::UseSpeech,
        SettingKey::SpeechNameLimit,
        SettingKey::SpeechRate,
        SettingKey::LogLevel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::Watchlist => "watchlist",
            SettingKey::Paused => "paused",
            SettingKey::AutoFulfill => "autoFulfill",
            SettingKey::PollIntervalMs => "pollIntervalMs",
            SettingKey::RefreshWhileActive => "refreshWhileActive",
            SettingKey::UseSpeech => "useSpeech",
            SettingKey::SpeechNameLimit => "speechNameLimit",
            SettingKey::SpeechRate => "speechRate",
            SettingKey::LogLevel => "logLevel",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == key)
    }

    /// Value written on first run when the key is absent.
    pub fn default_value(self) -> Value {
        match self {
            SettingKey::Watchlist => json!([]),
            SettingKey::Paused => json!(false),
            SettingKey::AutoFulfill => json!(false),
            SettingKey::PollIntervalMs => json!(DEFAULT_POLL_INTERVAL_MS),
            SettingKey::RefreshWhileActive => json!(false),
            SettingKey::UseSpeech => json!(true),
            SettingKey::SpeechNameLimit => json!(0),
            SettingKey::SpeechRate => json!(DEFAULT_SPEECH_RATE),
            SettingKey::LogLevel => json!(DEFAULT_LOG_LEVEL),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchlistError {
    #[error("watchlist is not valid JSON: {0}")]
    Unparsable(String),
    #[error("watchlist entry {path} stores item {index} as a bare name")]
    LegacyItemShape { path: String, index: usize },
    #[error("watchlist has an unexpected shape: {0}")]
    Malformed(String),
}

/// Parse the `watchlist` setting. Accepts the array itself or a string holding
/// its JSON text. Items stored as bare names cannot be upgraded because the
/// item id is unknown, so they are reported rather than guessed.
pub fn parse_watchlist(value: &Value) -> Result<Vec<WatchEntry>, WatchlistError> {
    let owned;
    let value = match value {
        Value::String(text) => {
            owned = serde_json::from_str::<Value>(text)
                .map_err(|err| WatchlistError::Unparsable(err.to_string()))?;
            &owned
        }
        other => other,
    };

    let entries = value
        .as_array()
        .ok_or_else(|| WatchlistError::Malformed("expected an array of entries".into()))?;

    for entry in entries {
        let path = entry
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let items = entry.get("items").and_then(Value::as_array);
        if let Some(index) = items.and_then(|items| items.iter().position(Value::is_string)) {
            return Err(WatchlistError::LegacyItemShape {
                path: path.to_string(),
                index,
            });
        }
    }

    serde_json::from_value(value.clone()).map_err(|err| WatchlistError::Malformed(err.to_string()))
}

/// Typed view over the shared settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub watchlist: Vec<WatchEntry>,
    pub paused: bool,
    pub auto_fulfill: bool,
    pub poll_interval: Duration,
    pub refresh_while_active: bool,
    pub use_speech: bool,
    /// 0 means unlimited.
    pub speech_name_limit: usize,
    pub speech_rate: f32,
    pub log_level: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watchlist: Vec::new(),
            paused: false,
            auto_fulfill: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            refresh_while_active: false,
            use_speech: true,
            speech_name_limit: 0,
            speech_rate: DEFAULT_SPEECH_RATE,
            log_level: DEFAULT_LOG_LEVEL,
        }
    }
}

impl Settings {
    /// Build settings from a key lookup, typically backed by the settings store.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(SettingKey) -> Option<Value>,
    {
        let mut settings = Self::default();
        for key in SettingKey::ALL {
            settings.apply(key, lookup(key).as_ref());
        }
        settings
    }

    /// Apply one key. Missing or wrongly-typed values reset the field to its
    /// default; out-of-range numbers are clamped.
    pub fn apply(&mut self, key: SettingKey, value: Option<&Value>) {
        let defaults = Settings::default();
        match key {
            SettingKey::Watchlist => {
                self.watchlist = value
                    .and_then(|v| parse_watchlist(v).ok())
                    .unwrap_or(defaults.watchlist);
            }
            SettingKey::Paused => self.paused = bool_or(value, defaults.paused),
            SettingKey::AutoFulfill => self.auto_fulfill = bool_or(value, defaults.auto_fulfill),
            SettingKey::PollIntervalMs => {
                let ms = value
                    .and_then(number)
                    .map(|ms| (ms.max(0.0) as u64).max(MIN_POLL_INTERVAL_MS))
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
                self.poll_interval = Duration::from_millis(ms);
            }
            SettingKey::RefreshWhileActive => {
                self.refresh_while_active = bool_or(value, defaults.refresh_while_active)
            }
            SettingKey::UseSpeech => self.use_speech = bool_or(value, defaults.use_speech),
            SettingKey::SpeechNameLimit => {
                self.speech_name_limit = value
                    .and_then(number)
                    .map(|n| n.max(0.0) as usize)
                    .unwrap_or(defaults.speech_name_limit);
            }
            SettingKey::SpeechRate => {
                self.speech_rate = value
                    .and_then(number)
                    .map(|rate| (rate as f32).clamp(MIN_SPEECH_RATE, MAX_SPEECH_RATE))
                    .unwrap_or(defaults.speech_rate);
            }
            SettingKey::LogLevel => {
                self.log_level = value
                    .and_then(number)
                    .map(|level| (level.max(0.0) as u8).min(MAX_LOG_LEVEL))
                    .unwrap_or(defaults.log_level);
            }
        }
    }

    pub fn watch_entry(&self, path: &str) -> Option<&WatchEntry> {
        WatchEntry::find(&self.watchlist, path)
    }

    /// Cut the announced names down to `speech_name_limit`, keeping order.
    pub fn limit_names(&self, names: &[String]) -> Vec<String> {
        match self.speech_name_limit {
            0 => names.to_vec(),
            limit => names.iter().take(limit).cloned().collect(),
        }
    }
}

fn bool_or(value: Option<&Value>, default: bool) -> bool {
    value.and_then(Value::as_bool).unwrap_or(default)
}

fn number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}
