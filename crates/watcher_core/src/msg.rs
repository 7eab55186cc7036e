use serde_json::Value;

use crate::{CallFailure, FulfillmentStatus, GateSnapshot, InventorySnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// The host finished loading the page this loop was created for.
    PageReady,
    /// Inventory reader output for the current page.
    InventoryScanned(InventorySnapshot),
    /// Fulfillment status check completed.
    StatusChecked(Result<FulfillmentStatus, CallFailure>),
    /// One reservation call completed.
    ReservationSettled {
        item_id: String,
        result: Result<(), CallFailure>,
    },
    /// The alert finished playing.
    AlertFinished,
    /// The fulfillment-start call completed.
    FulfillmentStartSettled(Result<(), CallFailure>),
    /// A timer armed through `Effect::ArmTimer` expired.
    TimerFired { token: u64 },
    /// Host visibility, editor or location changed.
    HostChanged(GateSnapshot),
    /// A settings key changed, locally or in another running instance.
    SettingChanged {
        key: String,
        old: Option<Value>,
        new: Option<Value>,
        remote: bool,
    },
    /// Fulfillment page indicators, read after a load of that page.
    FulfillmentPageInspected {
        in_progress: bool,
        reserved_count: u32,
    },
}
