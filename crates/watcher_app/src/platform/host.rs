use std::path::PathBuf;

use url::Url;
use watcher_core::{normalize_path, GateSnapshot, InventoryRow, InventorySnapshot, NavigationState, Settings};
use watcher_engine::ScannedRow;

/// The page the host currently shows. Navigation state survives reloads of
/// the same page and is replaced on every navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub path: String,
    pub navigation: Option<NavigationState>,
    /// Set once the load completes.
    pub html: Option<String>,
}

impl Page {
    pub fn new(path: String, navigation: Option<NavigationState>) -> Self {
        Self {
            path,
            navigation,
            html: None,
        }
    }
}

/// Samples the reload gates: visibility comes from `--foreground`, the editor
/// gate from the marker file `watcher edit` holds.
#[derive(Debug, Clone)]
pub struct GateSource {
    pub foreground: bool,
    pub editor_marker: PathBuf,
}

impl GateSource {
    pub fn sample(&self, path: &str) -> GateSnapshot {
        GateSnapshot {
            path: path.to_string(),
            hidden: !self.foreground,
            editor_open: self.editor_marker.exists(),
        }
    }
}

pub fn start_path(explicit: Option<String>, settings: &Settings) -> Option<String> {
    explicit.or_else(|| settings.watchlist.first().map(|entry| entry.path.clone()))
}

/// The site answers an expired session by redirecting page loads to login.
pub fn is_login_redirect(final_url: &str, login_path: &str) -> bool {
    Url::parse(final_url)
        .map(|url| normalize_path(url.path()) == normalize_path(login_path))
        .unwrap_or(false)
}

pub fn to_snapshot(rows: Vec<ScannedRow>) -> InventorySnapshot {
    rows.into_iter()
        .map(|row| InventoryRow {
            id: row.id,
            name: row.name,
            in_stock: row.in_stock,
            already_reserved: row.already_reserved,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use watcher_core::{WatchEntry, WatchedItem};

    #[test]
    fn gates_follow_foreground_flag_and_marker() {
        let dir = TempDir::new().unwrap();
        let gates = GateSource {
            foreground: false,
            editor_marker: dir.path().join("editor.open"),
        };
        assert_eq!(gates.sample("/p"), GateSnapshot::background("/p"));

        std::fs::write(&gates.editor_marker, "1").unwrap();
        assert!(gates.sample("/p").editor_open);

        let visible = GateSource {
            foreground: true,
            ..gates
        };
        assert!(!visible.sample("/p").hidden);
    }

    #[test]
    fn start_path_defaults_to_first_entry() {
        let settings = Settings {
            watchlist: vec![WatchEntry {
                path: "/set/a".to_string(),
                items: vec![WatchedItem {
                    id: "X".to_string(),
                    name: "Card A".to_string(),
                }],
            }],
            ..Settings::default()
        };
        assert_eq!(start_path(None, &settings).as_deref(), Some("/set/a"));
        assert_eq!(
            start_path(Some("/other".to_string()), &settings).as_deref(),
            Some("/other")
        );
        assert_eq!(start_path(None, &Settings::default()), None);
    }

    #[test]
    fn login_redirect_detection() {
        assert!(is_login_redirect("https://shop.example/login/?next=/p", "/login"));
        assert!(!is_login_redirect("https://shop.example/p", "/login"));
        assert!(!is_login_redirect("not a url", "/login"));
    }
}
