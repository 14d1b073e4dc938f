use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use shared::{OutputStatus, RunnerStatus};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{AudioBuffer, AudioStream, KeywordIngestLoop};
use crate::backend::Backends;
use crate::classify::KeywordClassifier;
use crate::command::{command_queue, Command, CommandSender};
use crate::config::{load_config, Config};
use crate::confirm::ConfirmationFilter;
use crate::dispatch::CommandDispatcher;
use crate::error::RunnerError;
use crate::events::{EventHub, Subscription};
use crate::output::{LocalKeySink, OutputRouter};
use crate::preview::{PreviewBuffer, PreviewFrame};
use crate::rate_limit::Cooldown;
use crate::video::{VideoDevices, VideoExit, VideoIngestLoop};

/// How long stop waits on the video thread before warning that the camera is slow to let go.
const VIDEO_JOIN_WARNING: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where `start()` gets its configuration from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Re-read on every start. `None` is the default location.
    File(Option<PathBuf>),
    Fixed(Config),
}

impl ConfigSource {
    /// An unreadable or invalid file degrades to the defaults.
    pub fn load(&self) -> Config {
        match self {
            ConfigSource::Fixed(config) => config.clone(),
            ConfigSource::File(path) => load_config(path.as_deref()).unwrap_or_else(|e| {
                warn!("{:#}, using defaults", e);
                Config::default()
            }),
        }
    }
}

#[derive(Default)]
struct KeywordSession {
    /// Built on first enable and kept until stop.
    classifier: Option<Arc<dyn KeywordClassifier>>,
    buffer: Option<AudioBuffer>,
    task: Option<JoinHandle<()>>,
    stream: Option<Box<dyn AudioStream>>,
}

struct Session {
    generation: u64,
    stop_tx: watch::Sender<bool>,
    commands: CommandSender,
    dispatcher: JoinHandle<()>,
    video: Option<std::thread::JoinHandle<()>>,
    keyword: KeywordSession,
}

struct Inner {
    config_source: ConfigSource,
    backends: Arc<dyn Backends>,
    config: RwLock<Arc<Config>>,
    hub: EventHub,
    router: OutputRouter,
    preview: PreviewBuffer,
    overlay: Arc<AtomicBool>,
    kws_enabled: Arc<AtomicBool>,
    gesture_enabled: AtomicBool,
    lifecycle: RwLock<LifecycleState>,
    generation: AtomicU64,
    /// Held for the whole of start, stop and keyword toggles.
    session: Mutex<Option<Session>>,
}

/// Owns the capture loops, the dispatcher and every shared cell between them.
/// Cheap to clone; all clones drive the same runner.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<Inner>,
}

impl Runner {
    pub fn new(config_source: ConfigSource, backends: Arc<dyn Backends>) -> Self {
        let config = config_source.load();
        let router = OutputRouter::new(LocalKeySink::new(backends.key_injector()));
        router.set_mode(config.output.mode);

        Self {
            inner: Arc::new(Inner {
                hub: EventHub::new(config.events.capacity),
                overlay: Arc::new(AtomicBool::new(config.preview.overlay)),
                config: RwLock::new(Arc::new(config)),
                config_source,
                backends,
                router,
                preview: PreviewBuffer::new(),
                kws_enabled: Arc::new(AtomicBool::new(false)),
                gesture_enabled: AtomicBool::new(false),
                lifecycle: RwLock::new(LifecycleState::Stopped),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
            }),
        }
    }

    /// Bring every configured subsystem up. Returns `false` if already running.
    pub async fn start(&self) -> bool {
        let mut slot = self.inner.session.lock().await;
        if slot.is_some() {
            debug!("Start requested while running");
            return false;
        }

        self.set_lifecycle(LifecycleState::Starting);

        let config = Arc::new(self.inner.config_source.load());
        *self.inner.config.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&config);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.inner.router.set_mode(config.output.mode);
        if config.serial.enabled {
            self.open_serial(&config).await;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (commands, rx) = command_queue();
        let dispatcher = CommandDispatcher::new(
            rx,
            stop_rx,
            Cooldown::new(config.dispatch.cooldown()),
            self.inner.router.clone(),
            self.inner.hub.clone(),
        )
        .spawn();

        let mut session = Session {
            generation,
            stop_tx,
            commands,
            dispatcher,
            video: None,
            keyword: KeywordSession::default(),
        };

        if config.keyword.enabled {
            if let Err(e) = self.enable_keyword(&mut session, &config).await {
                warn!("Keyword spotting disabled: {}", e);
            }
        }

        if config.gesture.enabled {
            if let Err(e) = self.start_video(&mut session, &config).await {
                warn!("Gesture recognition disabled: {}", e);
            }
        }

        *slot = Some(session);
        self.set_lifecycle(LifecycleState::Running);
        info!(
            "Runner started (gesture: {}, keyword: {}, output: {})",
            self.inner.gesture_enabled.load(Ordering::SeqCst),
            self.inner.kws_enabled.load(Ordering::SeqCst),
            self.inner.router.mode()
        );
        true
    }

    /// Tear everything down. Returns `false` if nothing was running.
    pub async fn stop(&self) -> bool {
        self.stop_session(None).await
    }

    /// Stop only if `generation` is still the running session.
    async fn stop_session(&self, generation: Option<u64>) -> bool {
        let mut slot = self.inner.session.lock().await;
        let session = match slot.take() {
            Some(session) if generation.map_or(true, |g| g == session.generation) => session,
            other => {
                *slot = other;
                return false;
            }
        };

        self.set_lifecycle(LifecycleState::Stopping);
        let _ = session.stop_tx.send(true);
        self.inner.kws_enabled.store(false, Ordering::SeqCst);
        self.inner.gesture_enabled.store(false, Ordering::SeqCst);

        let Session {
            commands,
            dispatcher,
            video,
            keyword,
            ..
        } = session;

        if let Some(stream) = keyword.stream {
            close_audio(stream).await;
        }
        if let Some(task) = keyword.task {
            if let Err(e) = task.await {
                warn!("Keyword processing task ended abnormally: {}", e);
            }
        }

        if let Some(video) = video {
            join_video(video).await;
        }

        if self.inner.router.detach_serial() {
            debug!("Serial output detached");
        }

        drop(commands);
        if let Err(e) = dispatcher.await {
            warn!("Dispatcher ended abnormally: {}", e);
        }

        self.inner.preview.clear();
        self.set_lifecycle(LifecycleState::Stopped);
        info!("Runner stopped");
        true
    }

    pub fn lifecycle(&self) -> LifecycleState {
        *self.inner.lifecycle.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == LifecycleState::Running
    }

    pub fn status(&self) -> RunnerStatus {
        let running = self.is_running();
        RunnerStatus {
            running,
            lifecycle: self.lifecycle().to_string(),
            gesture_enabled: running && self.inner.gesture_enabled.load(Ordering::SeqCst),
            kws_enabled: self.kws_enabled(),
        }
    }

    /// Configuration of the current (or last) session.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.inner.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn output_status(&self) -> OutputStatus {
        let mut status = self.inner.router.status();
        status.serial_available &= self.is_running();
        status
    }

    pub fn set_output_mode(&self, mode: &str) -> Result<OutputStatus, RunnerError> {
        self.ensure_running()?;
        self.inner.router.select_mode(mode)
    }

    pub fn kws_enabled(&self) -> bool {
        self.is_running() && self.inner.kws_enabled.load(Ordering::SeqCst)
    }

    /// Build the keyword classifier if needed, start processing and open the
    /// microphone. On failure keyword spotting stays disabled.
    pub async fn enable_kws(&self) -> Result<(), RunnerError> {
        let mut slot = self.inner.session.lock().await;
        let session = slot.as_mut().ok_or(RunnerError::NotRunning)?;
        if self.inner.kws_enabled.load(Ordering::SeqCst) {
            return Ok(());
        }

        let config = self.config();
        self.enable_keyword(session, &config).await.map_err(|e| {
            warn!("Failed to enable keyword spotting: {}", e);
            e
        })
    }

    /// Close the microphone. The processing task idles and the classifier is kept.
    pub async fn disable_kws(&self) -> Result<(), RunnerError> {
        let mut slot = self.inner.session.lock().await;
        let session = slot.as_mut().ok_or(RunnerError::NotRunning)?;

        self.inner.kws_enabled.store(false, Ordering::SeqCst);
        if let Some(stream) = session.keyword.stream.take() {
            close_audio(stream).await;
        }
        info!("Keyword spotting disabled");
        Ok(())
    }

    pub fn overlay_enabled(&self) -> bool {
        self.inner.overlay.load(Ordering::Relaxed)
    }

    pub fn set_overlay(&self, enabled: bool) -> Result<bool, RunnerError> {
        self.ensure_running()?;
        self.inner.overlay.store(enabled, Ordering::Relaxed);
        info!("Preview overlay {}", if enabled { "enabled" } else { "disabled" });
        Ok(enabled)
    }

    /// Latest preview, `None` until the first frame is encoded.
    pub fn latest_frame(&self) -> Result<Option<Arc<PreviewFrame>>, RunnerError> {
        self.ensure_running()?;
        Ok(self.inner.preview.latest())
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.hub.subscribe()
    }

    /// Queue a synthetic command. Only actions listed in `[control]
    /// test_actions` are accepted. Returns the normalised action.
    pub async fn inject_command(&self, action: &str) -> Result<String, RunnerError> {
        let slot = self.inner.session.lock().await;
        let session = slot.as_ref().ok_or(RunnerError::NotRunning)?;

        let action = action.trim().to_lowercase();
        let allowed = self
            .config()
            .control
            .test_actions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&action));
        if !allowed {
            return Err(RunnerError::InvalidAction(action));
        }

        session
            .commands
            .send(Command::injected(action.clone()))
            .map_err(|_| RunnerError::NotRunning)?;
        info!("Injected test command '{}'", action);
        Ok(action)
    }

    fn ensure_running(&self) -> Result<(), RunnerError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(RunnerError::NotRunning)
        }
    }

    fn set_lifecycle(&self, state: LifecycleState) {
        *self.inner.lifecycle.write().unwrap_or_else(|e| e.into_inner()) = state;
        debug!("Lifecycle -> {}", state);
    }

    async fn open_serial(&self, config: &Config) {
        let backends = Arc::clone(&self.inner.backends);
        let serial = config.serial.clone();
        match tokio::task::spawn_blocking(move || backends.open_serial(&serial)).await {
            Ok(Ok(sink)) => self.inner.router.attach_serial(sink),
            Ok(Err(e)) => warn!("Serial output disabled: {}", e),
            Err(e) => warn!("Serial open task failed: {}", e),
        }
    }

    async fn enable_keyword(
        &self,
        session: &mut Session,
        config: &Config,
    ) -> Result<(), RunnerError> {
        config.keyword.validate()?;

        let classifier = match &session.keyword.classifier {
            Some(classifier) => Arc::clone(classifier),
            None => {
                let backends = Arc::clone(&self.inner.backends);
                let keyword = config.keyword.clone();
                let classifier =
                    tokio::task::spawn_blocking(move || backends.keyword_classifier(&keyword))
                        .await
                        .map_err(|e| RunnerError::config("keyword", e.to_string()))??;
                session.keyword.classifier = Some(Arc::clone(&classifier));
                classifier
            }
        };

        let sample_rate = classifier.sample_rate();
        let buffer = session
            .keyword
            .buffer
            .get_or_insert_with(|| {
                AudioBuffer::new(classifier.window_len().max(sample_rate as usize) * 2)
            })
            .clone();

        if session.keyword.task.is_none() {
            let task = KeywordIngestLoop::new(
                buffer.clone(),
                Arc::clone(&classifier),
                ConfirmationFilter::for_keyword(&config.keyword),
                Arc::clone(&self.inner.kws_enabled),
                config.keyword.tick(),
                session.commands.clone(),
                self.inner.hub.clone(),
                session.stop_tx.subscribe(),
            )
            .spawn();
            session.keyword.task = Some(task);
        }

        if session.keyword.stream.is_none() {
            let backends = Arc::clone(&self.inner.backends);
            let audio = config.audio.clone();
            let stream = tokio::task::spawn_blocking(move || {
                backends.open_audio(&audio, sample_rate, buffer)
            })
            .await
            .map_err(|e| RunnerError::device("audio", e.to_string()))??;
            session.keyword.stream = Some(stream);
        }

        self.inner.kws_enabled.store(true, Ordering::SeqCst);
        info!("Keyword spotting enabled ({} Hz)", sample_rate);
        Ok(())
    }

    async fn start_video(&self, session: &mut Session, config: &Config) -> Result<(), RunnerError> {
        config.gesture.validate()?;

        let backends = Arc::clone(&self.inner.backends);
        let camera = config.camera.clone();
        let gesture = config.gesture.clone();
        let devices = tokio::task::spawn_blocking(move || -> Result<VideoDevices, RunnerError> {
            let landmarker = backends.hand_landmarker(&gesture)?;
            let classifier = backends.gesture_classifier(&gesture)?;
            let source = backends.open_camera(&camera)?;
            Ok(VideoDevices {
                source,
                landmarker,
                classifier,
                encoder: backends.preview_encoder(),
            })
        })
        .await
        .map_err(|e| RunnerError::device("camera", e.to_string()))??;

        let (exit_tx, exit_rx) = oneshot::channel();
        let handle = VideoIngestLoop::new(
            devices,
            ConfirmationFilter::for_gesture(&config.gesture),
            self.inner.preview.clone(),
            &config.preview,
            Arc::clone(&self.inner.overlay),
            session.commands.clone(),
            self.inner.hub.clone(),
            session.stop_tx.subscribe(),
        )
        .spawn(exit_tx)
        .map_err(|e| RunnerError::device("camera", e.to_string()))?;

        session.video = Some(handle);
        self.inner.gesture_enabled.store(true, Ordering::SeqCst);
        self.supervise_video(session.generation, exit_rx);
        info!("Gesture recognition enabled");
        Ok(())
    }

    /// A camera that ends or fails takes the whole session down with it.
    fn supervise_video(&self, generation: u64, exit_rx: oneshot::Receiver<VideoExit>) {
        let runner = self.clone();
        tokio::spawn(async move {
            let exit = exit_rx.await.unwrap_or_else(|_| {
                VideoExit::Failed("video thread ended without reporting".to_string())
            });
            if exit.stops_runner() {
                warn!("Video capture ended ({:?}), stopping runner", exit);
                runner.stop_session(Some(generation)).await;
            }
        });
    }
}

async fn close_audio(stream: Box<dyn AudioStream>) {
    if let Err(e) = tokio::task::spawn_blocking(move || stream.close()).await {
        warn!("Audio close failed: {}", e);
    }
}

/// Wait until the video thread has closed its camera.
async fn join_video(handle: std::thread::JoinHandle<()>) {
    let mut join = tokio::task::spawn_blocking(move || handle.join());
    let joined = match tokio::time::timeout(VIDEO_JOIN_WARNING, &mut join).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!("Video thread still waiting on the camera, stop continues once it returns");
            join.await
        }
    };
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!("Video thread panicked"),
        Err(e) => warn!("Video join task failed: {}", e),
    }
}
