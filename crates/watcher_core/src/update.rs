use serde_json::Value;

use crate::state::Cycle;
use crate::{
    match_snapshot, CallFailure, Effect, FulfillmentStatus, InventorySnapshot, LoopState, Msg,
    NavigationState, PageRole, SettingKey, WatchLoop,
};

/// Pure update function: applies a message to the loop and returns any effects.
pub fn update(mut state: WatchLoop, msg: Msg) -> (WatchLoop, Vec<Effect>) {
    let effects = match msg {
        Msg::PageReady => page_ready(&mut state),
        Msg::InventoryScanned(snapshot) => inventory_scanned(&mut state, &snapshot),
        Msg::StatusChecked(result) => status_checked(&mut state, result),
        Msg::ReservationSettled { item_id, result } => {
            reservation_settled(&mut state, &item_id, result)
        }
        Msg::AlertFinished => {
            if state.phase == LoopState::Alerting {
                state.cycle.alert_done = true;
                try_fulfill(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::FulfillmentStartSettled(_result) => {
            // Navigate whether or not the start call succeeded; the fulfillment
            // page shows the real outcome.
            if state.phase == LoopState::Fulfilling {
                depart_to_fulfillment(&mut state, true)
            } else {
                Vec::new()
            }
        }
        Msg::TimerFired { token } => timer_fired(&mut state, token),
        Msg::HostChanged(snapshot) => {
            state.host = snapshot;
            Vec::new()
        }
        Msg::SettingChanged {
            key,
            old,
            new,
            remote,
        } => setting_changed(&mut state, &key, old.as_ref(), new.as_ref(), remote),
        Msg::FulfillmentPageInspected {
            in_progress,
            reserved_count,
        } => fulfillment_page_inspected(&mut state, in_progress, reserved_count),
    };

    (state, effects)
}

fn page_ready(state: &mut WatchLoop) -> Vec<Effect> {
    if state.phase != LoopState::Idle {
        return Vec::new();
    }
    match state.role {
        PageRole::Fulfillment => {
            let autostarted = state
                .page
                .navigation
                .as_ref()
                .is_some_and(|nav| nav.autostart);
            if autostarted {
                state.set_phase(LoopState::Recovering);
                vec![Effect::InspectFulfillmentPage]
            } else {
                state.set_phase(LoopState::Inactive);
                Vec::new()
            }
        }
        PageRole::Watched => match &state.entry {
            Some(entry) if !entry.items.is_empty() => {
                state.set_phase(LoopState::Scanning);
                vec![Effect::ScanInventory]
            }
            _ => {
                state.set_phase(LoopState::Inactive);
                Vec::new()
            }
        },
    }
}

fn inventory_scanned(state: &mut WatchLoop, snapshot: &InventorySnapshot) -> Vec<Effect> {
    if state.phase != LoopState::Scanning {
        return Vec::new();
    }
    let Some(entry) = state.entry.as_ref() else {
        return Vec::new();
    };
    state.cycle = Cycle::from_matches(match_snapshot(entry, snapshot));
    state.set_phase(LoopState::AwaitingStatus);
    vec![Effect::CheckFulfillmentStatus]
}

fn status_checked(
    state: &mut WatchLoop,
    result: Result<FulfillmentStatus, CallFailure>,
) -> Vec<Effect> {
    match state.phase {
        LoopState::AwaitingStatus => match result {
            // Fail open: try again on the next cycle.
            Err(_) => reschedule(state),
            Ok(status) if status.in_progress => reschedule(state),
            Ok(_) if state.settings.paused || state.cycle.names.is_empty() => reschedule(state),
            Ok(_) => begin_reservations(state),
        },
        LoopState::ConfirmingReload => {
            let idle = matches!(result, Ok(FulfillmentStatus { in_progress: false }));
            let allowed = state
                .host
                .reload_allowed(&state.page.path, state.settings.refresh_while_active);
            if idle && allowed {
                state.set_phase(LoopState::Departed);
                vec![Effect::Reload]
            } else {
                reschedule(state)
            }
        }
        _ => Vec::new(),
    }
}

fn begin_reservations(state: &mut WatchLoop) -> Vec<Effect> {
    match state.cycle.reserve_queue.front() {
        Some(first) => {
            let item_id = first.clone();
            state.set_phase(LoopState::Reserving);
            vec![Effect::Reserve { item_id }]
        }
        None => finish_reservations(state),
    }
}

fn reservation_settled(
    state: &mut WatchLoop,
    item_id: &str,
    result: Result<(), CallFailure>,
) -> Vec<Effect> {
    if state.phase != LoopState::Reserving
        || state.cycle.reserve_queue.front().map(String::as_str) != Some(item_id)
    {
        return Vec::new();
    }
    if result.is_err() {
        // Abandon the rest of the sequence; the next scan sees what is still unreserved.
        state.cycle.reserve_queue.clear();
        return reschedule(state);
    }
    state.cycle.reserve_queue.pop_front();
    match state.cycle.reserve_queue.front() {
        Some(next) => vec![Effect::Reserve {
            item_id: next.clone(),
        }],
        None => finish_reservations(state),
    }
}

fn finish_reservations(state: &mut WatchLoop) -> Vec<Effect> {
    state.cycle.reservations_done = true;
    state.set_phase(LoopState::Alerting);
    let mut effects = vec![Effect::Announce {
        names: state.settings.limit_names(&state.cycle.names),
        use_speech: state.settings.use_speech,
        speech_rate: state.settings.speech_rate,
    }];
    effects.extend(try_fulfill(state));
    effects
}

/// Join point: proceeds only once both reservations and the alert are done,
/// and only once per cycle.
fn try_fulfill(state: &mut WatchLoop) -> Vec<Effect> {
    let cycle = &mut state.cycle;
    if !(cycle.reservations_done && cycle.alert_done) || cycle.fulfillment_begun {
        return Vec::new();
    }
    cycle.fulfillment_begun = true;
    state.set_phase(LoopState::Fulfilling);
    if state.settings.auto_fulfill {
        vec![Effect::StartFulfillment]
    } else {
        depart_to_fulfillment(state, false)
    }
}

fn depart_to_fulfillment(state: &mut WatchLoop, autostart: bool) -> Vec<Effect> {
    state.set_phase(LoopState::Departed);
    vec![Effect::Navigate {
        path: state.page.fulfillment_path.clone(),
        state: Some(NavigationState {
            autostart,
            previous_path: state.page.path.clone(),
        }),
    }]
}

fn reschedule(state: &mut WatchLoop) -> Vec<Effect> {
    state.set_phase(LoopState::Rescheduled);
    arm_timer(state)
}

fn arm_timer(state: &mut WatchLoop) -> Vec<Effect> {
    let token = state.next_timer_token();
    vec![Effect::ArmTimer {
        token,
        delay: state.settings.poll_interval,
    }]
}

fn timer_fired(state: &mut WatchLoop, token: u64) -> Vec<Effect> {
    if token != state.timer_token {
        return Vec::new();
    }
    match state.phase {
        LoopState::Rescheduled => {
            state.set_phase(LoopState::ConfirmingReload);
            vec![Effect::CheckFulfillmentStatus]
        }
        LoopState::Recovering => {
            state.set_phase(LoopState::Departed);
            vec![Effect::Reload]
        }
        _ => Vec::new(),
    }
}

fn setting_changed(
    state: &mut WatchLoop,
    key: &str,
    old: Option<&Value>,
    new: Option<&Value>,
    remote: bool,
) -> Vec<Effect> {
    let Some(key) = SettingKey::parse(key) else {
        return Vec::new();
    };
    state.settings.apply(key, new);
    match key {
        SettingKey::LogLevel => vec![Effect::SetLogVerbosity(state.settings.log_level)],
        SettingKey::Paused => {
            let was_paused = old.and_then(Value::as_bool).unwrap_or(false);
            let resumed = remote && was_paused && !state.settings.paused;
            if resumed && state.phase == LoopState::Rescheduled {
                // Watching resumed elsewhere: skip the rest of the wait.
                state.next_timer_token();
                state.set_phase(LoopState::ConfirmingReload);
                vec![Effect::CheckFulfillmentStatus]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn fulfillment_page_inspected(
    state: &mut WatchLoop,
    in_progress: bool,
    reserved_count: u32,
) -> Vec<Effect> {
    if state.phase != LoopState::Recovering {
        return Vec::new();
    }
    let previous = state
        .page
        .navigation
        .as_ref()
        .map(|nav| nav.previous_path.clone());
    match previous {
        Some(path) if !in_progress && reserved_count == 0 => {
            state.set_phase(LoopState::Departed);
            vec![Effect::Navigate { path, state: None }]
        }
        _ => arm_timer(state),
    }
}
