use std::sync::mpsc;

use watcher_core::{CallFailure, Effect, FulfillmentStatus, Msg};
use watcher_engine::{
    Announcement, EngineCommand, EngineEvent, EngineHandle, EventSink, FetchError,
    SettingChange,
};
use watcher_logging::{watch_debug, watch_warn};

/// Everything the host's main loop reacts to.
#[derive(Debug)]
pub enum HostEvent {
    Engine(EngineEvent),
    Setting(SettingChange),
}

/// Forwards engine events into the host channel.
pub struct HostSink {
    tx: mpsc::Sender<HostEvent>,
}

impl HostSink {
    pub fn new(tx: mpsc::Sender<HostEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for HostSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(HostEvent::Engine(event));
    }
}

/// Where engine commands go. The engine thread in production, a recorder in
/// host tests.
pub trait CommandSink {
    fn send(&self, command: EngineCommand);
}

impl CommandSink for EngineHandle {
    fn send(&self, command: EngineCommand) {
        EngineHandle::send(self, command);
    }
}

/// Runs the effects that need the engine. Host-side effects (scan, navigate,
/// reload, verbosity) are handled by the host and never reach here.
pub struct EffectRunner<S> {
    engine: S,
}

impl<S: CommandSink> EffectRunner<S> {
    pub fn new(engine: S) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &S {
        &self.engine
    }

    pub fn run(&self, effect: Effect) {
        let command = match effect {
            Effect::CheckFulfillmentStatus => EngineCommand::CheckFulfillmentStatus,
            Effect::Reserve { item_id } => {
                watch_debug!("reserving {item_id}");
                EngineCommand::Reserve { item_id }
            }
            Effect::Announce {
                names,
                use_speech,
                speech_rate,
            } => EngineCommand::Announce(Announcement {
                names,
                use_speech,
                speech_rate,
            }),
            Effect::StartFulfillment => EngineCommand::StartFulfillment,
            Effect::ArmTimer { token, delay } => EngineCommand::ArmTimer { token, delay },
            other => {
                watch_warn!("effect {other:?} is not an engine effect; ignored");
                return;
            }
        };
        self.engine.send(command);
    }
}

impl EffectRunner<EngineHandle> {
    pub fn shutdown(self) {
        self.engine.shutdown();
    }
}

/// Translate an engine completion into a loop message. Page lifecycle,
/// login and shutdown events belong to the host and map to `None`.
pub fn map_event(event: EngineEvent) -> Option<Msg> {
    let msg = match event {
        EngineEvent::StatusChecked(result) => Msg::StatusChecked(
            result
                .map(|in_progress| FulfillmentStatus { in_progress })
                .map_err(call_failure),
        ),
        EngineEvent::ReservationSettled { item_id, result } => Msg::ReservationSettled {
            item_id,
            result: result.map_err(call_failure),
        },
        EngineEvent::FulfillmentStartSettled(result) => {
            Msg::FulfillmentStartSettled(result.map_err(call_failure))
        }
        EngineEvent::AlertFinished => Msg::AlertFinished,
        EngineEvent::TimerFired { token } => Msg::TimerFired { token },
        EngineEvent::PageLoaded { .. }
        | EngineEvent::PageFailed { .. }
        | EngineEvent::LoginRequired
        | EngineEvent::ReloadSuggested(_)
        | EngineEvent::ShutdownRequested => return None,
    };
    Some(msg)
}

fn call_failure(err: FetchError) -> CallFailure {
    CallFailure::new(err.status(), err.to_string())
}

pub fn setting_msg(change: SettingChange) -> Msg {
    Msg::SettingChanged {
        key: change.key,
        old: change.old,
        new: change.new,
        remote: change.remote,
    }
}
