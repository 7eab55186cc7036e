use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// An item the user wants to be alerted about. Only `id` takes part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedItem {
    pub id: String,
    pub name: String,
}

/// The watched items for one page, keyed by page path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub path: String,
    #[serde(default)]
    pub items: Vec<WatchedItem>,
}

impl WatchEntry {
    pub fn find<'a>(entries: &'a [WatchEntry], path: &str) -> Option<&'a WatchEntry> {
        let wanted = normalize_path(path);
        entries
            .iter()
            .find(|entry| normalize_path(&entry.path) == wanted)
    }

    pub fn item(&self, id: &str) -> Option<&WatchedItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub id: String,
    pub name: String,
    pub in_stock: bool,
    pub already_reserved: bool,
}

/// Rows visible on the page at scan time, in page order.
pub type InventorySnapshot = Vec<InventoryRow>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FulfillmentStatus {
    pub in_progress: bool,
}

/// State carried across a navigation to the fulfillment page. Lives in host
/// memory only, never in the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub autostart: bool,
    pub previous_path: String,
}

/// A server call that did not succeed. `status` is `None` for transport
/// failures (timeout, connection reset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub status: Option<u16>,
    pub detail: String,
}

impl CallFailure {
    pub fn new(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

/// Result of filtering a snapshot against a watch entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanMatches {
    /// Matched, in-stock, not yet reserved ids in page order.
    pub reserve_queue: VecDeque<String>,
    /// Speech labels of every matched in-stock row, including already reserved ones.
    pub names: Vec<String>,
}

impl ScanMatches {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn match_snapshot(entry: &WatchEntry, snapshot: &[InventoryRow]) -> ScanMatches {
    let mut matches = ScanMatches::default();
    let mut seen = HashSet::new();
    for row in snapshot {
        let Some(item) = entry.item(&row.id) else {
            continue;
        };
        if !row.in_stock || !seen.insert(row.id.as_str()) {
            continue;
        }
        matches.names.push(item.name.clone());
        if !row.already_reserved {
            matches.reserve_queue.push_back(row.id.clone());
        }
    }
    matches
}

/// Normalize a page path for comparison: leading slash, no trailing slash,
/// query and fragment dropped.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let without_query = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    if without_query.starts_with('/') {
        without_query.to_string()
    } else {
        format!("/{without_query}")
    }
}
