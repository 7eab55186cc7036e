use crate::LoopState;

/// Read-only summary of a loop, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoopView {
    pub phase: LoopState,
    pub page_path: String,
    /// Number of watched items on this page.
    pub watching: usize,
    pub pending_reservations: Vec<String>,
    pub alert_names: Vec<String>,
    pub timer_token: u64,
    pub paused: bool,
}
