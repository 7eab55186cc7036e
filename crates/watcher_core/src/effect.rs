use std::time::Duration;

use crate::NavigationState;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ScanInventory,
    CheckFulfillmentStatus,
    Reserve {
        item_id: String,
    },
    Announce {
        names: Vec<String>,
        use_speech: bool,
        speech_rate: f32,
    },
    /// Issued under the leaving request key.
    StartFulfillment,
    Navigate {
        path: String,
        state: Option<NavigationState>,
    },
    Reload,
    /// Replaces any previously armed timer.
    ArmTimer {
        token: u64,
        delay: Duration,
    },
    InspectFulfillmentPage,
    SetLogVerbosity(u8),
}
