//! Watcher engine: network, page, alert and settings IO behind the core state machine.
mod alert;
mod api;
mod decode;
mod engine;
mod fetch;
mod inventory;
mod persist;
mod request;
mod settings_store;
mod types;

pub use alert::{speech_text, AlertNotifier, Announcement, CommandNotifier, CommandSpec};
pub use api::ServerApi;
pub use decode::{decode_page, DecodedPage};
pub use engine::{ChannelEventSink, EngineCommand, EngineConfig, EngineError, EngineHandle, EventSink};
pub use fetch::{FetchSettings, FetchedPage, PageFetcher, ReqwestPageFetcher};
pub use inventory::{
    FulfillmentPageReader, FulfillmentPageState, FulfillmentSelectors, InventoryReader,
    InventorySelectors, ScannedRow, SelectorError, SelectorInventoryReader,
};
pub use persist::{ensure_dir, write_atomic, PersistError};
pub use request::{
    OnFailure, OnSuccess, Payload, Request, RequestClient, RequestHooks, SendOutcome,
    LEAVING_KEY,
};
pub use settings_store::{
    SettingChange, SettingsStore, StoreError, SubscriptionId, SETTINGS_FILENAME,
};
pub use types::{EngineEvent, Endpoints, FailureKind, FetchError, ServerOp};
