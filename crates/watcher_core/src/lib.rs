//! Watcher core: pure watch-loop state machine, data model and settings model.
mod effect;
mod model;
mod msg;
mod settings;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use model::{
    match_snapshot, normalize_path, CallFailure, FulfillmentStatus, InventoryRow,
    InventorySnapshot, NavigationState, ScanMatches, WatchEntry, WatchedItem,
};
pub use msg::Msg;
pub use settings::{
    parse_watchlist, SettingKey, Settings, WatchlistError, DEFAULT_POLL_INTERVAL_MS,
    MIN_POLL_INTERVAL_MS,
};
pub use state::{GateSnapshot, LoopState, PageContext, PageRole, WatchLoop};
pub use update::update;
pub use view_model::LoopView;
