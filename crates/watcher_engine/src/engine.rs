use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;
use watcher_logging::{watch_debug, watch_info, watch_warn};

use crate::alert::{AlertNotifier, Announcement};
use crate::api::ServerApi;
use crate::fetch::{FetchSettings, PageFetcher, ReqwestPageFetcher};
use crate::request::{RequestClient, RequestHooks, SendOutcome};
use crate::settings_store::SettingsStore;
use crate::{EngineEvent, FailureKind, FetchError, Endpoints};

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

pub struct EngineConfig {
    pub base_url: Url,
    pub endpoints: Endpoints,
    pub fetch: FetchSettings,
    pub request_timeout: Duration,
    pub notifier: Arc<dyn AlertNotifier>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start engine runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to build http client: {0}")]
    Http(#[from] FetchError),
}

pub enum EngineCommand {
    /// Fetch a site-relative path; answered with `PageLoaded` or `PageFailed`.
    /// Replaces any load still in flight.
    LoadPage { path: String },
    CheckFulfillmentStatus,
    Reserve { item_id: String },
    StartFulfillment,
    Announce(Announcement),
    /// Replaces the armed timer, if any.
    ArmTimer { token: u64, delay: Duration },
    CancelTimer,
    /// Poll the settings file for changes made by other processes.
    WatchSettings {
        store: SettingsStore,
        interval: Duration,
    },
    Shutdown,
}

/// Owns the engine thread. Commands are processed in order on a
/// current-thread runtime; results come back through the [`EventSink`].
/// Each command carries the sender's scan cycle, which the engine thread
/// adopts so its log lines are tagged like the host's.
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<(u64, EngineCommand)>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let fetcher = ReqwestPageFetcher::new(config.fetch)?;
        let hooks = Arc::new(SinkHooks {
            sink: Arc::clone(&sink),
        });
        let client = RequestClient::new(
            fetcher.http_client(),
            config.base_url.clone(),
            config.request_timeout,
            hooks,
        );
        let worker = Worker {
            base_url: config.base_url,
            fetcher: Arc::new(fetcher),
            api: ServerApi::new(client, config.endpoints),
            notifier: config.notifier,
            sink,
            page_load: None,
            timer: None,
            settings_sync: None,
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("watcher-engine".to_string())
            .spawn(move || runtime.block_on(worker.run(cmd_rx)))?;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, command: EngineCommand) {
        if self
            .cmd_tx
            .send((watcher_logging::scan_cycle(), command))
            .is_err()
        {
            watch_warn!("engine thread has stopped; command dropped");
        }
    }

    /// Stop the engine and wait for its thread. Work still in flight is dropped.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self
            .cmd_tx
            .send((watcher_logging::scan_cycle(), EngineCommand::Shutdown));
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                watch_warn!("engine thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SinkHooks {
    sink: Arc<dyn EventSink>,
}

impl RequestHooks for SinkHooks {
    fn redirect_to_login(&self) {
        self.sink.emit(EngineEvent::LoginRequired);
    }

    fn prompt_reload(&self, failure: &FetchError) {
        self.sink.emit(EngineEvent::ReloadSuggested(failure.clone()));
    }
}

struct Worker {
    base_url: Url,
    fetcher: Arc<dyn PageFetcher>,
    api: ServerApi,
    notifier: Arc<dyn AlertNotifier>,
    sink: Arc<dyn EventSink>,
    page_load: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
    settings_sync: Option<JoinHandle<()>>,
}

impl Worker {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<(u64, EngineCommand)>) {
        let interrupt = {
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    watch_info!("interrupt received; shutting down");
                    sink.emit(EngineEvent::ShutdownRequested);
                }
            })
        };

        while let Some((cycle, command)) = cmd_rx.recv().await {
            watcher_logging::set_scan_cycle(cycle);
            if matches!(command, EngineCommand::Shutdown) {
                break;
            }
            self.handle(command);
        }

        interrupt.abort();
        for task in [&self.page_load, &self.timer, &self.settings_sync]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        watch_debug!("engine stopped");
    }

    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::LoadPage { path } => self.load_page(path),
            EngineCommand::CheckFulfillmentStatus => {
                let sink = Arc::clone(&self.sink);
                self.api
                    .check_status(move |result| sink.emit(EngineEvent::StatusChecked(result)));
            }
            EngineCommand::Reserve { item_id } => {
                let sink = Arc::clone(&self.sink);
                let settled_id = item_id.clone();
                self.api.reserve(&item_id, move |result| {
                    sink.emit(EngineEvent::ReservationSettled {
                        item_id: settled_id,
                        result,
                    })
                });
            }
            EngineCommand::StartFulfillment => {
                let sink = Arc::clone(&self.sink);
                let outcome = self.api.start_fulfillment(move |result| {
                    sink.emit(EngineEvent::FulfillmentStartSettled(result))
                });
                // The request already in flight keeps running; the caller
                // still gets an answer so it can leave the page.
                if outcome == SendOutcome::Dropped {
                    watch_debug!("fulfillment start already in flight");
                    self.sink.emit(EngineEvent::FulfillmentStartSettled(Ok(())));
                }
            }
            EngineCommand::Announce(announcement) => {
                let notifier = Arc::clone(&self.notifier);
                let sink = Arc::clone(&self.sink);
                tokio::spawn(async move {
                    notifier.announce(&announcement).await;
                    sink.emit(EngineEvent::AlertFinished);
                });
            }
            EngineCommand::ArmTimer { token, delay } => {
                let sink = Arc::clone(&self.sink);
                replace_task(
                    &mut self.timer,
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        sink.emit(EngineEvent::TimerFired { token });
                    }),
                );
            }
            EngineCommand::CancelTimer => {
                if let Some(timer) = self.timer.take() {
                    timer.abort();
                }
            }
            EngineCommand::WatchSettings { store, interval } => {
                replace_task(&mut self.settings_sync, tokio::spawn(sync_settings(store, interval)));
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn load_page(&mut self, path: String) {
        let url = match self.base_url.join(&path) {
            Ok(url) => url,
            Err(err) => {
                self.sink.emit(EngineEvent::PageFailed {
                    path,
                    error: FetchError::new(FailureKind::InvalidUrl, err.to_string()),
                });
                return;
            }
        };
        let fetcher = Arc::clone(&self.fetcher);
        let sink = Arc::clone(&self.sink);
        replace_task(
            &mut self.page_load,
            tokio::spawn(async move {
                let event = match fetcher.fetch(url.as_str()).await {
                    Ok(page) => EngineEvent::PageLoaded { path, page },
                    Err(error) => EngineEvent::PageFailed { path, error },
                };
                sink.emit(event);
            }),
        );
    }
}

fn replace_task(slot: &mut Option<JoinHandle<()>>, task: JoinHandle<()>) {
    if let Some(previous) = slot.replace(task) {
        previous.abort();
    }
}

async fn sync_settings(store: SettingsStore, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = store.sync_from_disk() {
            watch_warn!("settings sync failed: {err}");
        }
    }
}
