use std::collections::VecDeque;

use crate::model::normalize_path;
use crate::view_model::LoopView;
use crate::{NavigationState, ScanMatches, Settings, WatchEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    /// No watch entry for this page; nothing will ever happen.
    Inactive,
    Scanning,
    AwaitingStatus,
    Reserving,
    Alerting,
    Fulfilling,
    Rescheduled,
    /// The poll timer fired and the pre-reload status check is in flight.
    ConfirmingReload,
    /// On the fulfillment page after an automatic start, waiting for it to finish.
    Recovering,
    /// A reload or navigation was issued; this instance is done.
    Departed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    Watched,
    Fulfillment,
}

/// What the host currently looks like, as far as the reload gates care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSnapshot {
    pub path: String,
    pub hidden: bool,
    pub editor_open: bool,
}

impl GateSnapshot {
    /// Background host on its own page, no editor: the usual unattended state.
    pub fn background(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hidden: true,
            editor_open: false,
        }
    }

    /// Reload is allowed only while the host still shows the watched page, no
    /// editor is open, and the host is hidden unless refreshing while active.
    pub fn reload_allowed(&self, watched_path: &str, refresh_while_active: bool) -> bool {
        normalize_path(&self.path) == normalize_path(watched_path)
            && !self.editor_open
            && (self.hidden || refresh_while_active)
    }
}

/// Everything the host knows about the page a loop is created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub path: String,
    pub fulfillment_path: String,
    pub navigation: Option<NavigationState>,
}

/// Per-cycle bookkeeping. The two `*_done` flags form the join that gates
/// fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Cycle {
    pub(crate) reserve_queue: VecDeque<String>,
    pub(crate) names: Vec<String>,
    pub(crate) reservations_done: bool,
    pub(crate) alert_done: bool,
    pub(crate) fulfillment_begun: bool,
}

impl Cycle {
    pub(crate) fn from_matches(matches: ScanMatches) -> Self {
        Self {
            reserve_queue: matches.reserve_queue,
            names: matches.names,
            ..Self::default()
        }
    }
}

/// One watch loop instance. The host creates a fresh instance for every page
/// load; the watch entry is fixed for the lifetime of the instance while the
/// other settings follow `Msg::SettingChanged`.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchLoop {
    pub(crate) page: PageContext,
    pub(crate) role: PageRole,
    pub(crate) entry: Option<WatchEntry>,
    pub(crate) settings: Settings,
    pub(crate) host: GateSnapshot,
    pub(crate) phase: LoopState,
    pub(crate) cycle: Cycle,
    pub(crate) timer_token: u64,
}

impl WatchLoop {
    pub fn new(page: PageContext, settings: Settings) -> Self {
        let role = if normalize_path(&page.path) == normalize_path(&page.fulfillment_path) {
            PageRole::Fulfillment
        } else {
            PageRole::Watched
        };
        let entry = settings.watch_entry(&page.path).cloned();
        let host = GateSnapshot::background(page.path.clone());
        Self {
            page,
            role,
            entry,
            settings,
            host,
            phase: LoopState::Idle,
            cycle: Cycle::default(),
            timer_token: 0,
        }
    }

    pub fn phase(&self) -> LoopState {
        self.phase
    }

    pub fn role(&self) -> PageRole {
        self.role
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn view(&self) -> LoopView {
        LoopView {
            phase: self.phase,
            page_path: self.page.path.clone(),
            watching: self.entry.as_ref().map_or(0, |entry| entry.items.len()),
            pending_reservations: self.cycle.reserve_queue.iter().cloned().collect(),
            alert_names: self.cycle.names.clone(),
            timer_token: self.timer_token,
            paused: self.settings.paused,
        }
    }

    pub(crate) fn set_phase(&mut self, phase: LoopState) {
        self.phase = phase;
    }

    pub(crate) fn next_timer_token(&mut self) -> u64 {
        self.timer_token += 1;
        self.timer_token
    }
}
