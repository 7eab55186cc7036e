use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use anyhow::{anyhow, Context};
use watcher_core::{update, Effect, Msg, NavigationState, PageContext, Settings, WatchLoop};
use watcher_engine::{
    CommandNotifier, EngineCommand, EngineConfig, EngineEvent, EngineHandle, FailureKind,
    FetchError, FetchSettings, FetchedPage, FulfillmentPageReader, InventoryReader,
    SelectorInventoryReader, SettingsStore,
};
use watcher_logging::{watch_debug, watch_info, watch_trace, watch_warn};

use super::effects::{map_event, setting_msg, CommandSink, EffectRunner, HostEvent, HostSink};
use super::host::{self, GateSource, Page};
use super::logging::{self, LogDestination, LOG_FILENAME};
use super::settings::{editor_marker, load_settings, open_store};
use super::site::SiteConfig;

/// Timer token the host uses to retry a failed page load. Loop tokens start at 1.
const PAGE_RETRY_TOKEN: u64 = 0;

pub struct RunOptions {
    pub settings_dir: PathBuf,
    pub base_url: Option<String>,
    pub path: Option<String>,
    pub foreground: bool,
    pub log_file: bool,
}

pub fn run_app(options: RunOptions) -> anyhow::Result<()> {
    let dir = options.settings_dir;
    let destination = if options.log_file {
        LogDestination::Both(dir.join(LOG_FILENAME))
    } else {
        LogDestination::Terminal
    };
    let (store, settings) = open_settings(&dir, destination)?;

    let mut site = SiteConfig::load(&dir)?;
    if let Some(base_url) = options.base_url {
        site.base_url = base_url;
    }
    let start = host::start_path(options.path, &settings).ok_or_else(|| {
        anyhow!("nothing to watch: pass --path or add an entry with `watcher set watchlist ...`")
    })?;

    let (tx, rx) = mpsc::channel();
    let engine = EngineHandle::new(
        EngineConfig {
            base_url: site.base_url()?,
            endpoints: site.endpoints.clone(),
            fetch: FetchSettings::default(),
            request_timeout: site.request_timeout(),
            notifier: Arc::new(CommandNotifier::new(site.speech.clone(), site.cue.clone())),
        },
        Arc::new(HostSink::new(tx.clone())),
    )
    .context("failed to start engine")?;

    let subscription = store.subscribe_all(move |change| {
        let _ = tx.send(HostEvent::Setting(change.clone()));
    });
    engine.send(EngineCommand::WatchSettings {
        store: store.clone(),
        interval: site.settings_sync_interval(),
    });

    let gates = GateSource {
        foreground: options.foreground,
        editor_marker: editor_marker(&dir),
    };
    let mut host = Host::new(site, store.clone(), EffectRunner::new(engine), gates)?;
    watch_info!("watching {start} (settings in {dir:?})");
    host.open(start, None);

    let result = host.run(&rx);
    store.unsubscribe(subscription);
    host.runner.shutdown();
    result
}

/// Logging comes up at the default level before the store opens, so
/// warnings from the watchlist migration reach the log.
fn open_settings(
    dir: &Path,
    destination: LogDestination,
) -> anyhow::Result<(SettingsStore, Settings)> {
    logging::initialize(destination, Settings::default().log_level);
    let store = open_store(dir)?;
    let settings = load_settings(&store);
    watcher_logging::apply_verbosity(settings.log_level);
    Ok((store, settings))
}

#[derive(Debug)]
enum Flow {
    Continue,
    Stop,
}

struct Host<S> {
    site: SiteConfig,
    store: SettingsStore,
    runner: EffectRunner<S>,
    inventory: SelectorInventoryReader,
    fulfillment: FulfillmentPageReader,
    gates: GateSource,
    page: Page,
    watch_loop: Option<WatchLoop>,
    loads: u64,
}

impl<S: CommandSink> Host<S> {
    fn new(
        site: SiteConfig,
        store: SettingsStore,
        runner: EffectRunner<S>,
        gates: GateSource,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            inventory: SelectorInventoryReader::new(&site.inventory)?,
            fulfillment: FulfillmentPageReader::new(&site.fulfillment_page)?,
            site,
            store,
            runner,
            gates,
            page: Page::new(String::new(), None),
            watch_loop: None,
            loads: 0,
        })
    }

    fn run(&mut self, rx: &mpsc::Receiver<HostEvent>) -> anyhow::Result<()> {
        while let Ok(event) = rx.recv() {
            let flow = match event {
                HostEvent::Setting(change) => {
                    self.dispatch(setting_msg(change));
                    Flow::Continue
                }
                HostEvent::Engine(event) => self.engine_event(event)?,
            };
            if let Flow::Stop = flow {
                watch_info!("stopped");
                break;
            }
        }
        Ok(())
    }

    fn engine_event(&mut self, event: EngineEvent) -> anyhow::Result<Flow> {
        match event {
            EngineEvent::PageLoaded { path, page } => self.page_loaded(path, page)?,
            EngineEvent::PageFailed { path, error } => self.page_failed(path, error)?,
            EngineEvent::LoginRequired => return Err(self.login_error()),
            EngineEvent::ReloadSuggested(failure) => {
                watch_warn!("request failed ({failure}); reloading");
                self.reload();
            }
            EngineEvent::ShutdownRequested => return Ok(Flow::Stop),
            EngineEvent::TimerFired { token }
                if token == PAGE_RETRY_TOKEN && self.watch_loop.is_none() =>
            {
                self.reload();
            }
            other => {
                if let Some(msg) = map_event(other) {
                    self.dispatch_sampled(msg);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn page_loaded(&mut self, path: String, page: FetchedPage) -> anyhow::Result<()> {
        if path != self.page.path {
            watch_debug!("ignoring stale load of {path}");
            return Ok(());
        }
        if host::is_login_redirect(&page.final_url, &self.site.login_path) {
            return Err(self.login_error());
        }

        self.loads += 1;
        watcher_logging::set_scan_cycle(self.loads);
        let settings = load_settings(&self.store);
        watcher_logging::apply_verbosity(settings.log_level);

        self.page.html = Some(page.html);
        self.watch_loop = Some(WatchLoop::new(
            PageContext {
                path,
                fulfillment_path: self.site.fulfillment_path.clone(),
                navigation: self.page.navigation.clone(),
            },
            settings,
        ));
        self.dispatch_sampled(Msg::PageReady);
        Ok(())
    }

    fn page_failed(&mut self, path: String, error: FetchError) -> anyhow::Result<()> {
        if path != self.page.path {
            return Ok(());
        }
        if error.kind == FailureKind::Unauthorized {
            return Err(self.login_error());
        }
        let delay = load_settings(&self.store).poll_interval;
        watch_warn!("loading {path} failed: {error}; retrying in {delay:?}");
        self.runner.run(Effect::ArmTimer {
            token: PAGE_RETRY_TOKEN,
            delay,
        });
        Ok(())
    }

    fn login_error(&self) -> anyhow::Error {
        anyhow!(
            "the site requires a login; sign in at {} and restart the watcher",
            self.site.login_url()
        )
    }

    /// Dispatch an engine completion after refreshing the loop's view of the
    /// host gates.
    fn dispatch_sampled(&mut self, msg: Msg) {
        let gates = self.gates.sample(&self.page.path);
        self.dispatch(Msg::HostChanged(gates));
        self.dispatch(msg);
    }

    fn dispatch(&mut self, msg: Msg) {
        let mut queue = VecDeque::from([msg]);
        while let Some(msg) = queue.pop_front() {
            let Some(state) = self.watch_loop.take() else {
                watch_trace!("no active loop; dropping {msg:?}");
                return;
            };
            let (state, effects) = update(state, msg);
            watch_trace!("loop now {:?}", state.view());
            self.watch_loop = Some(state);
            for effect in effects {
                self.apply(effect, &mut queue);
            }
        }
    }

    fn apply(&mut self, effect: Effect, queue: &mut VecDeque<Msg>) {
        match effect {
            Effect::ScanInventory => {
                let rows = self
                    .page
                    .html
                    .as_deref()
                    .map(|html| self.inventory.scan(html))
                    .unwrap_or_default();
                watch_debug!("scanned {} rows", rows.len());
                queue.push_back(Msg::InventoryScanned(host::to_snapshot(rows)));
            }
            Effect::InspectFulfillmentPage => {
                let state = self
                    .fulfillment
                    .inspect(self.page.html.as_deref().unwrap_or_default());
                queue.push_back(Msg::FulfillmentPageInspected {
                    in_progress: state.in_progress,
                    reserved_count: state.reserved_count,
                });
            }
            Effect::Navigate { path, state } => self.open(path, state),
            Effect::Reload => self.reload(),
            Effect::SetLogVerbosity(level) => watcher_logging::apply_verbosity(level),
            engine_effect => self.runner.run(engine_effect),
        }
    }

    /// Start loading `path`. The current loop is dropped and its timer cancelled.
    fn open(&mut self, path: String, navigation: Option<NavigationState>) {
        watch_info!("loading {path}");
        self.watch_loop = None;
        self.runner.engine().send(EngineCommand::CancelTimer);
        self.runner.engine().send(EngineCommand::LoadPage { path: path.clone() });
        self.page = Page::new(path, navigation);
    }

    fn reload(&mut self) {
        self.open(self.page.path.clone(), self.page.navigation.clone());
    }
}
