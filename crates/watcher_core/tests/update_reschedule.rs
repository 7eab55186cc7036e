use std::time::Duration;

use serde_json::json;
use watcher_core::{
    update, CallFailure, Effect, FulfillmentStatus, GateSnapshot, InventoryRow, LoopState, Msg,
    PageContext, Settings, WatchEntry, WatchLoop, WatchedItem,
};

fn init_logging() {
    watcher_logging::initialize_for_tests();
}

fn settings(refresh_while_active: bool) -> Settings {
    Settings {
        watchlist: vec![WatchEntry {
            path: "/p".to_string(),
            items: vec![WatchedItem {
                id: "X".to_string(),
                name: "Card A".to_string(),
            }],
        }],
        refresh_while_active,
        poll_interval: Duration::from_millis(2_000),
        ..Settings::default()
    }
}

/// A loop that scanned nothing of interest and is waiting on its poll timer.
fn rescheduled(settings: Settings) -> WatchLoop {
    let state = WatchLoop::new(
        PageContext {
            path: "/p".to_string(),
            fulfillment_path: "/delivery".to_string(),
            navigation: None,
        },
        settings,
    );
    let (state, _) = update(state, Msg::PageReady);
    let (state, _) = update(
        state,
        Msg::InventoryScanned(vec![InventoryRow {
            id: "X".to_string(),
            name: "Card A".to_string(),
            in_stock: false,
            already_reserved: false,
        }]),
    );
    let (state, effects) = update(
        state,
        Msg::StatusChecked(Ok(FulfillmentStatus { in_progress: false })),
    );
    assert_eq!(
        effects,
        vec![Effect::ArmTimer {
            token: 1,
            delay: Duration::from_millis(2_000)
        }]
    );
    assert_eq!(state.phase(), LoopState::Rescheduled);
    state
}

fn host(hidden: bool, editor_open: bool) -> Msg {
    Msg::HostChanged(GateSnapshot {
        path: "/p".to_string(),
        hidden,
        editor_open,
    })
}

/// Fire the current timer and answer the status check with `status`.
fn fire_and_confirm(
    state: WatchLoop,
    status: Result<FulfillmentStatus, CallFailure>,
) -> (WatchLoop, Vec<Effect>) {
    let token = state.view().timer_token;
    let (state, effects) = update(state, Msg::TimerFired { token });
    assert_eq!(effects, vec![Effect::CheckFulfillmentStatus]);
    assert_eq!(state.phase(), LoopState::ConfirmingReload);
    update(state, Msg::StatusChecked(status))
}

fn idle() -> Result<FulfillmentStatus, CallFailure> {
    Ok(FulfillmentStatus { in_progress: false })
}

#[test]
fn hidden_host_reloads_regardless_of_refresh_flag() {
    init_logging();
    for refresh in [false, true] {
        let (state, _) = update(rescheduled(settings(refresh)), host(true, false));
        let (state, effects) = fire_and_confirm(state, idle());
        assert_eq!(effects, vec![Effect::Reload]);
        assert_eq!(state.phase(), LoopState::Departed);
    }
}

#[test]
fn visible_host_without_refresh_flag_rearms_timer() {
    init_logging();
    let (state, _) = update(rescheduled(settings(false)), host(false, false));
    let (state, effects) = fire_and_confirm(state, idle());
    assert_eq!(
        effects,
        vec![Effect::ArmTimer {
            token: 2,
            delay: Duration::from_millis(2_000)
        }]
    );
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

#[test]
fn visible_host_with_refresh_flag_reloads() {
    init_logging();
    let (state, _) = update(rescheduled(settings(true)), host(false, false));
    let (_state, effects) = fire_and_confirm(state, idle());
    assert_eq!(effects, vec![Effect::Reload]);
}

#[test]
fn open_editor_blocks_reload() {
    init_logging();
    let (state, _) = update(rescheduled(settings(true)), host(true, true));
    let (state, effects) = fire_and_confirm(state, idle());
    assert!(matches!(effects.as_slice(), [Effect::ArmTimer { token: 2, .. }]));

    // Once the editor closes the next expiry reloads.
    let (state, _) = update(state, host(true, false));
    let (_state, effects) = fire_and_confirm(state, idle());
    assert_eq!(effects, vec![Effect::Reload]);
}

#[test]
fn host_on_other_path_blocks_reload() {
    init_logging();
    let state = rescheduled(settings(true));
    let (state, _) = update(
        state,
        Msg::HostChanged(GateSnapshot {
            path: "/somewhere/else".to_string(),
            hidden: true,
            editor_open: false,
        }),
    );
    let (_state, effects) = fire_and_confirm(state, idle());
    assert!(matches!(effects.as_slice(), [Effect::ArmTimer { .. }]));
}

#[test]
fn in_progress_or_failed_status_rearms_instead_of_reloading() {
    init_logging();
    let state = rescheduled(settings(true));
    let (state, effects) = fire_and_confirm(state, Ok(FulfillmentStatus { in_progress: true }));
    assert!(matches!(effects.as_slice(), [Effect::ArmTimer { token: 2, .. }]));

    let (_state, effects) = fire_and_confirm(state, Err(CallFailure::new(Some(502), "bad gateway")));
    assert!(matches!(effects.as_slice(), [Effect::ArmTimer { token: 3, .. }]));
}

#[test]
fn stale_timer_tokens_are_ignored() {
    init_logging();
    let state = rescheduled(settings(true));
    let (state, effects) = update(state, Msg::TimerFired { token: 0 });
    assert!(effects.is_empty());
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

#[test]
fn gate_matches_reload_rules() {
    let hidden = GateSnapshot::background("/p/");
    assert!(hidden.reload_allowed("/p", false));

    let visible = GateSnapshot {
        hidden: false,
        ..hidden.clone()
    };
    assert!(!visible.reload_allowed("/p", false));
    assert!(visible.reload_allowed("/p", true));

    let editing = GateSnapshot {
        editor_open: true,
        ..hidden
    };
    assert!(!editing.reload_allowed("/p", true));
}

#[test]
fn poll_interval_change_applies_to_next_timer() {
    init_logging();
    let (state, _) = update(
        rescheduled(settings(false)),
        Msg::SettingChanged {
            key: "pollIntervalMs".to_string(),
            old: Some(json!(2_000)),
            new: Some(json!(5_000)),
            remote: true,
        },
    );
    let (state, _) = update(state, host(false, false));
    let (_state, effects) = fire_and_confirm(state, idle());
    assert_eq!(
        effects,
        vec![Effect::ArmTimer {
            token: 2,
            delay: Duration::from_millis(5_000)
        }]
    );
}

#[test]
fn remote_resume_short_circuits_the_wait() {
    init_logging();
    let mut paused = settings(false);
    paused.paused = true;
    let state = rescheduled(paused);
    let (state, effects) = update(
        state,
        Msg::SettingChanged {
            key: "paused".to_string(),
            old: Some(json!(true)),
            new: Some(json!(false)),
            remote: true,
        },
    );
    assert_eq!(effects, vec![Effect::CheckFulfillmentStatus]);
    assert_eq!(state.phase(), LoopState::ConfirmingReload);

    // The timer armed before the resume is now stale.
    let (state, effects) = update(state, Msg::TimerFired { token: 1 });
    assert!(effects.is_empty());

    let (_state, effects) = update(state, idle_status_msg());
    assert_eq!(effects, vec![Effect::Reload]);
}

#[test]
fn local_resume_does_not_short_circuit() {
    init_logging();
    let mut paused = settings(false);
    paused.paused = true;
    let (state, effects) = update(
        rescheduled(paused),
        Msg::SettingChanged {
            key: "paused".to_string(),
            old: Some(json!(true)),
            new: Some(json!(false)),
            remote: false,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

fn idle_status_msg() -> Msg {
    Msg::StatusChecked(idle())
}
