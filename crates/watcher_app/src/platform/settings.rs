use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{json, Value};
use watcher_core::{parse_watchlist, SettingKey, Settings, WatchlistError};
use watcher_engine::{SettingsStore, StoreError};
use watcher_logging::watch_warn;

const APP_DIR_NAME: &str = "stock-watcher";
pub const EDITOR_MARKER: &str = "editor.open";

/// `--settings-dir`, else the platform config dir, else `./.stock-watcher`.
pub fn resolve_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR_NAME}")))
}

pub fn editor_marker(dir: &Path) -> PathBuf {
    dir.join(EDITOR_MARKER)
}

/// Open the store, discard an unusable watchlist, and write defaults for
/// every absent key.
pub fn open_store(dir: &Path) -> anyhow::Result<SettingsStore> {
    let store = SettingsStore::open(dir)
        .with_context(|| format!("failed to open settings in {dir:?}"))?;
    migrate_watchlist(&store)?;
    store
        .initialize_defaults(
            SettingKey::ALL
                .into_iter()
                .map(|key| (key.as_str().to_string(), key.default_value())),
        )
        .context("failed to write default settings")?;
    Ok(store)
}

/// Replace a legacy or unparsable watchlist with `[]`. Returns whether it did.
pub fn migrate_watchlist(store: &SettingsStore) -> Result<bool, StoreError> {
    let key = SettingKey::Watchlist.as_str();
    let Some(value) = store.get(key) else {
        return Ok(false);
    };
    match parse_watchlist(&value) {
        Ok(_) => Ok(false),
        Err(err @ WatchlistError::LegacyItemShape { .. }) => {
            watch_warn!("discarding watchlist saved by an older version: {err}");
            store.set(key, json!([]))?;
            Ok(true)
        }
        Err(err) => {
            watch_warn!("discarding unusable watchlist: {err}");
            store.set(key, json!([]))?;
            Ok(true)
        }
    }
}

pub fn load_settings(store: &SettingsStore) -> Settings {
    Settings::from_lookup(|key| store.get(key.as_str()))
}

/// Parse a CLI value: bool, integer, float, JSON, then plain string.
pub fn parse_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(f) = raw.parse::<f64>() {
                json!(f)
            } else if let Ok(value) = serde_json::from_str::<Value>(raw) {
                value
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}
