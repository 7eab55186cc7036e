use std::sync::Once;
use std::time::Duration;

use serde_json::json;
use watcher_core::{
    update, CallFailure, Effect, FulfillmentStatus, InventoryRow, LoopState, Msg,
    NavigationState, PageContext, Settings, WatchEntry, WatchLoop, WatchedItem,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(watcher_logging::initialize_for_tests);
}

fn item(id: &str, name: &str) -> WatchedItem {
    WatchedItem {
        id: id.to_string(),
        name: name.to_string(),
    }
}

fn row(id: &str, in_stock: bool, already_reserved: bool) -> InventoryRow {
    InventoryRow {
        id: id.to_string(),
        name: format!("row {id}"),
        in_stock,
        already_reserved,
    }
}

fn settings_for(items: Vec<WatchedItem>) -> Settings {
    Settings {
        watchlist: vec![WatchEntry {
            path: "/p".to_string(),
            items,
        }],
        ..Settings::default()
    }
}

fn watch_loop(settings: Settings) -> WatchLoop {
    WatchLoop::new(
        PageContext {
            path: "/p".to_string(),
            fulfillment_path: "/delivery".to_string(),
            navigation: None,
        },
        settings,
    )
}

fn idle_status() -> Msg {
    Msg::StatusChecked(Ok(FulfillmentStatus { in_progress: false }))
}

/// Drive a loop through page-ready and a scan of `rows`.
fn scanned(settings: Settings, rows: Vec<InventoryRow>) -> (WatchLoop, Vec<Effect>) {
    let (state, effects) = update(watch_loop(settings), Msg::PageReady);
    assert_eq!(effects, vec![Effect::ScanInventory]);
    assert_eq!(state.phase(), LoopState::Scanning);
    update(state, Msg::InventoryScanned(rows))
}

fn reschedule_effect(token: u64) -> Effect {
    Effect::ArmTimer {
        token,
        delay: Duration::from_millis(10_000),
    }
}

#[test]
fn scenario_a_reserves_alerts_and_navigates() {
    init_logging();
    let settings = settings_for(vec![item("X", "Card A")]);
    let (state, effects) = scanned(settings, vec![row("X", true, false)]);
    assert_eq!(effects, vec![Effect::CheckFulfillmentStatus]);
    assert_eq!(state.phase(), LoopState::AwaitingStatus);

    let (state, effects) = update(state, idle_status());
    assert_eq!(
        effects,
        vec![Effect::Reserve {
            item_id: "X".to_string()
        }]
    );
    assert_eq!(state.phase(), LoopState::Reserving);

    let (state, effects) = update(
        state,
        Msg::ReservationSettled {
            item_id: "X".to_string(),
            result: Ok(()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::Announce {
            names: vec!["Card A".to_string()],
            use_speech: true,
            speech_rate: 1.0,
        }]
    );
    assert_eq!(state.phase(), LoopState::Alerting);

    let (state, effects) = update(state, Msg::AlertFinished);
    assert_eq!(
        effects,
        vec![Effect::Navigate {
            path: "/delivery".to_string(),
            state: Some(NavigationState {
                autostart: false,
                previous_path: "/p".to_string(),
            }),
        }]
    );
    assert_eq!(state.phase(), LoopState::Departed);
}

#[test]
fn scenario_b_fulfillment_in_progress_skips_everything() {
    init_logging();
    let settings = settings_for(vec![item("X", "Card A")]);
    let (state, _) = scanned(settings, vec![row("X", true, false)]);

    let (state, effects) = update(
        state,
        Msg::StatusChecked(Ok(FulfillmentStatus { in_progress: true })),
    );
    assert_eq!(effects, vec![reschedule_effect(1)]);
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

#[test]
fn scenario_c_speech_names_are_limited() {
    init_logging();
    let mut settings = settings_for(vec![item("A", "Card A"), item("B", "Card B")]);
    settings.speech_name_limit = 1;
    let (state, _) = scanned(settings, vec![row("A", true, true), row("B", true, true)]);

    // Both already reserved: reservation is skipped and the alert fires directly.
    let (state, effects) = update(state, idle_status());
    assert_eq!(
        effects,
        vec![Effect::Announce {
            names: vec!["Card A".to_string()],
            use_speech: true,
            speech_rate: 1.0,
        }]
    );
    assert_eq!(state.phase(), LoopState::Alerting);
    assert_eq!(
        state.view().alert_names,
        vec!["Card A".to_string(), "Card B".to_string()]
    );
}

#[test]
fn scenario_d_pause_mid_sequence_does_not_interrupt_reservations() {
    init_logging();
    let settings = settings_for(vec![item("A", "Card A"), item("B", "Card B")]);
    let (state, _) = scanned(
        settings.clone(),
        vec![row("A", true, false), row("B", true, false)],
    );
    let (state, effects) = update(state, idle_status());
    assert_eq!(
        effects,
        vec![Effect::Reserve {
            item_id: "A".to_string()
        }]
    );

    let (state, effects) = update(
        state,
        Msg::SettingChanged {
            key: "paused".to_string(),
            old: Some(json!(false)),
            new: Some(json!(true)),
            remote: true,
        },
    );
    assert!(effects.is_empty());
    assert!(state.view().paused);
    assert_eq!(state.phase(), LoopState::Reserving);

    let (state, effects) = update(
        state,
        Msg::ReservationSettled {
            item_id: "A".to_string(),
            result: Ok(()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::Reserve {
            item_id: "B".to_string()
        }]
    );
    let (_state, effects) = update(
        state,
        Msg::ReservationSettled {
            item_id: "B".to_string(),
            result: Ok(()),
        },
    );
    assert!(matches!(effects.as_slice(), [Effect::Announce { .. }]));

    // The next page load builds a new loop from the store, which now says paused.
    let paused = Settings {
        paused: true,
        ..settings
    };
    let (state, _) = scanned(paused, vec![row("A", true, false)]);
    let (state, effects) = update(state, idle_status());
    assert_eq!(effects, vec![reschedule_effect(1)]);
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

#[test]
fn paused_still_checks_status_but_never_reserves() {
    init_logging();
    let mut settings = settings_for(vec![item("X", "Card A")]);
    settings.paused = true;
    let (state, effects) = scanned(settings, vec![row("X", true, false)]);
    assert_eq!(effects, vec![Effect::CheckFulfillmentStatus]);

    let (state, effects) = update(state, idle_status());
    assert_eq!(effects, vec![reschedule_effect(1)]);
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::Reserve { .. } | Effect::Announce { .. })));
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

#[test]
fn matching_uses_ids_not_names() {
    init_logging();
    let settings = settings_for(vec![item("X", "Watchlist label")]);
    let rows = vec![
        InventoryRow {
            id: "Y".to_string(),
            name: "Watchlist label".to_string(),
            in_stock: true,
            already_reserved: false,
        },
        InventoryRow {
            id: "X".to_string(),
            name: "Completely different page label".to_string(),
            in_stock: true,
            already_reserved: false,
        },
    ];
    let (state, _) = scanned(settings, rows);
    let view = state.view();
    assert_eq!(view.pending_reservations, vec!["X".to_string()]);
    assert_eq!(view.alert_names, vec!["Watchlist label".to_string()]);
}

#[test]
fn out_of_stock_matches_are_ignored() {
    init_logging();
    let settings = settings_for(vec![item("X", "Card A")]);
    let (state, _) = scanned(settings, vec![row("X", false, false)]);
    assert!(state.view().pending_reservations.is_empty());
    assert!(state.view().alert_names.is_empty());

    let (state, effects) = update(state, idle_status());
    assert_eq!(effects, vec![reschedule_effect(1)]);
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

#[test]
fn already_reserved_is_alerted_but_not_reserved() {
    init_logging();
    let settings = settings_for(vec![item("A", "Card A"), item("B", "Card B")]);
    let (state, _) = scanned(settings, vec![row("A", true, true), row("B", true, false)]);
    let view = state.view();
    assert_eq!(view.pending_reservations, vec!["B".to_string()]);
    assert_eq!(
        view.alert_names,
        vec!["Card A".to_string(), "Card B".to_string()]
    );

    let (state, effects) = update(state, idle_status());
    assert_eq!(
        effects,
        vec![Effect::Reserve {
            item_id: "B".to_string()
        }]
    );
    let (_state, effects) = update(
        state,
        Msg::ReservationSettled {
            item_id: "B".to_string(),
            result: Ok(()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::Announce {
            names: vec!["Card A".to_string(), "Card B".to_string()],
            use_speech: true,
            speech_rate: 1.0,
        }]
    );
}

#[test]
fn failed_reservation_abandons_the_sequence() {
    init_logging();
    let settings = settings_for(vec![item("A", "Card A"), item("B", "Card B")]);
    let (state, _) = scanned(settings, vec![row("A", true, false), row("B", true, false)]);
    let (state, _) = update(state, idle_status());

    let (state, effects) = update(
        state,
        Msg::ReservationSettled {
            item_id: "A".to_string(),
            result: Err(CallFailure::new(Some(500), "server error")),
        },
    );
    assert_eq!(effects, vec![reschedule_effect(1)]);
    assert_eq!(state.phase(), LoopState::Rescheduled);
    assert!(state.view().pending_reservations.is_empty());

    // A late completion for the abandoned item changes nothing.
    let (state, effects) = update(
        state,
        Msg::ReservationSettled {
            item_id: "B".to_string(),
            result: Ok(()),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

#[test]
fn status_failure_fails_open_to_reschedule() {
    init_logging();
    let settings = settings_for(vec![item("X", "Card A")]);
    let (state, _) = scanned(settings, vec![row("X", true, false)]);
    let (state, effects) = update(
        state,
        Msg::StatusChecked(Err(CallFailure::new(None, "timeout"))),
    );
    assert_eq!(effects, vec![reschedule_effect(1)]);
    assert_eq!(state.phase(), LoopState::Rescheduled);
}

#[test]
fn auto_fulfill_starts_fulfillment_then_navigates_with_recovery_state() {
    init_logging();
    let mut settings = settings_for(vec![item("X", "Card A")]);
    settings.auto_fulfill = true;
    let (state, _) = scanned(settings, vec![row("X", true, false)]);
    let (state, _) = update(state, idle_status());
    let (state, _) = update(
        state,
        Msg::ReservationSettled {
            item_id: "X".to_string(),
            result: Ok(()),
        },
    );

    let (state, effects) = update(state, Msg::AlertFinished);
    assert_eq!(effects, vec![Effect::StartFulfillment]);
    assert_eq!(state.phase(), LoopState::Fulfilling);

    // A duplicate completion signal must not start fulfillment twice.
    let (state, effects) = update(state, Msg::AlertFinished);
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::FulfillmentStartSettled(Err(CallFailure::new(Some(409), "busy"))),
    );
    assert_eq!(
        effects,
        vec![Effect::Navigate {
            path: "/delivery".to_string(),
            state: Some(NavigationState {
                autostart: true,
                previous_path: "/p".to_string(),
            }),
        }]
    );
    assert_eq!(state.phase(), LoopState::Departed);
}

#[test]
fn page_without_entry_never_starts() {
    init_logging();
    let settings = Settings {
        watchlist: vec![WatchEntry {
            path: "/elsewhere".to_string(),
            items: vec![item("X", "Card A")],
        }],
        ..Settings::default()
    };
    let (state, effects) = update(watch_loop(settings), Msg::PageReady);
    assert!(effects.is_empty());
    assert_eq!(state.phase(), LoopState::Inactive);

    let (state, effects) = update(state, Msg::InventoryScanned(vec![row("X", true, false)]));
    assert!(effects.is_empty());
    assert_eq!(state.phase(), LoopState::Inactive);
}

#[test]
fn empty_entry_never_starts() {
    init_logging();
    let (state, effects) = update(watch_loop(settings_for(Vec::new())), Msg::PageReady);
    assert!(effects.is_empty());
    assert_eq!(state.phase(), LoopState::Inactive);
}

#[test]
fn watchlist_change_does_not_alter_running_loop() {
    init_logging();
    let settings = settings_for(vec![item("X", "Card A")]);
    let (state, _) = update(watch_loop(settings), Msg::PageReady);
    let (state, effects) = update(
        state,
        Msg::SettingChanged {
            key: "watchlist".to_string(),
            old: None,
            new: Some(json!([])),
            remote: true,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().watching, 1);

    let (state, _) = update(state, Msg::InventoryScanned(vec![row("X", true, false)]));
    assert_eq!(state.view().pending_reservations, vec!["X".to_string()]);
}

#[test]
fn log_level_change_emits_verbosity_effect() {
    init_logging();
    let (state, effects) = update(
        watch_loop(Settings::default()),
        Msg::SettingChanged {
            key: "logLevel".to_string(),
            old: Some(json!(2)),
            new: Some(json!(4)),
            remote: false,
        },
    );
    assert_eq!(effects, vec![Effect::SetLogVerbosity(4)]);
    assert_eq!(state.settings().log_level, 4);
}
