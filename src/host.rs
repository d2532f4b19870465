//! The pet host: owns every component and consumes one event queue.
//!
//! Timers, pointer input, typed commands and finished network calls all
//! arrive as [`PetEvent`]s on a single channel and are handled one at a time,
//! so no component needs its own locking. Anything slow (chat, model listing)
//! runs on a spawned task that posts its result back onto the same queue.

use crate::animation::{AnimationDriver, AnimationState, Point, Priority, Scheduled, TransitionKind};
use crate::clock::{ClockDisplay, ClockText};
use crate::error::ChatError;
use crate::providers::{load_provider, ChatBackend, ProviderKind};
use crate::selector::BackendSelector;
use crate::store::{load_record, save_record, SettingsStore};
use chrono::Local;
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub const PET_SETTINGS_KEY: &str = "pet_config";

const WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);
const REST_INTERVAL: Duration = Duration::from_secs(30 * 60);
const CLOCK_INTERVAL: Duration = Duration::from_secs(1);
const DRAG_SETTLE_DELAY: Duration = Duration::from_millis(300);
const RANDOM_INTERVAL_SECS: std::ops::RangeInclusive<u64> = 5..=15;
const GREETING_JITTER_MS: std::ops::RangeInclusive<u64> = 500..=1000;

const REST_MESSAGE: &str =
    "You have been working for 30 minutes! Stand up, stretch and rest your eyes for a bit.";

/// Toggles persisted under [`PET_SETTINGS_KEY`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PetSettings {
    pub animations_enabled: bool,
    pub greetings_enabled: bool,
    pub rest_reminder_enabled: bool,
    pub time_display_enabled: bool,
}

impl Default for PetSettings {
    fn default() -> Self {
        Self {
            animations_enabled: true,
            greetings_enabled: true,
            rest_reminder_enabled: true,
            time_display_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    RandomAnimation,
    Watchdog,
    Greeting,
    RestReminder,
    Clock,
    /// One-off random animation after a drag ends
    DragSettle,
}

#[derive(Debug)]
pub enum PetEvent {
    /// A timer fired; ignored unless the generation is still current
    Tick(TimerKind, u64),
    TransitionDone(u64),
    PointerDown,
    PointerMove(Point),
    PointerUp,
    DoubleClick,
    Submit(String),
    ChatFinished(Result<String, ChatError>),
    /// Opens the provider picker
    ShowProviders,
    /// The picker's answer; `None` means it was dismissed
    SelectProvider(Option<String>),
    Configure(Vec<(String, String)>),
    ListModels,
    ModelsListed(Result<Vec<String>, ChatError>),
    ToggleAnimations(bool),
    ToggleGreetings(bool),
    ToggleRestReminder(bool),
    ToggleClock(bool),
    StartCountdown(u32),
    /// The renderer saw the visible loop stop
    LoopStalled,
    Status,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostStatus {
    pub provider: ProviderKind,
    pub configured: bool,
    pub state: AnimationState,
    pub position: Point,
    pub settings: PetSettings,
    pub input_mode: bool,
    pub thinking: bool,
    pub history_len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostOutput {
    Thinking,
    Reply(String),
    Error(String),
    /// The active provider needs settings before it can be used
    ConfigRequired(ProviderKind),
    ConfigSaved(ProviderKind),
    ProviderMenu(Vec<String>),
    ProviderSelected(ProviderKind),
    Models(Vec<String>),
    Greeting(String),
    RestReminder(String),
    Clock(ClockText),
    AnimationChanged(AnimationState),
    InputMode(bool),
    Status(HostStatus),
}

/// Arms one-shot timers by posting an event back onto the host queue later.
#[derive(Clone)]
pub struct Scheduler {
    events: UnboundedSender<PetEvent>,
}

impl Scheduler {
    pub fn new(events: UnboundedSender<PetEvent>) -> Self {
        Self { events }
    }

    pub fn after(&self, delay: Duration, event: PetEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The host may already be gone during shutdown.
            let _ = events.send(event);
        });
    }

    pub fn sender(&self) -> UnboundedSender<PetEvent> {
        self.events.clone()
    }
}

pub struct PetHost {
    driver: AnimationDriver,
    backend: ChatBackend,
    selector: BackendSelector,
    store: Arc<dyn SettingsStore>,
    settings: PetSettings,
    clock: ClockDisplay,
    greetings: Vec<String>,
    scheduler: Scheduler,
    outputs: UnboundedSender<HostOutput>,
    generations: HashMap<TimerKind, u64>,
    random_interval: Duration,
    thinking: bool,
    input_mode: bool,
    pressed: bool,
    dragged: bool,
    shown_state: AnimationState,
}

impl PetHost {
    pub fn new(
        driver: AnimationDriver,
        backend: ChatBackend,
        store: Arc<dyn SettingsStore>,
        greetings: Vec<String>,
        events: UnboundedSender<PetEvent>,
        outputs: UnboundedSender<HostOutput>,
    ) -> Self {
        let settings = load_record::<PetSettings>(store.as_ref(), PET_SETTINGS_KEY).unwrap_or_else(|e| {
            warn!("[host] {}, using default pet settings", e);
            PetSettings::default()
        });
        let mut selector = BackendSelector::new();
        selector.choose(Some(backend.kind().config_key()));
        let random_interval = Duration::from_secs(rand::thread_rng().gen_range(RANDOM_INTERVAL_SECS));
        let shown_state = driver.current_state();

        let mut host = Self {
            driver,
            backend,
            selector,
            store,
            settings,
            clock: ClockDisplay::new(settings.time_display_enabled),
            greetings,
            scheduler: Scheduler::new(events),
            outputs,
            generations: HashMap::new(),
            random_interval,
            thinking: false,
            input_mode: false,
            pressed: false,
            dragged: false,
            shown_state,
        };
        host.sync_animations();
        host
    }

    pub fn settings(&self) -> PetSettings {
        self.settings
    }

    pub fn driver(&self) -> &AnimationDriver {
        &self.driver
    }

    pub fn backend(&self) -> &ChatBackend {
        &self.backend
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    pub fn is_input_mode(&self) -> bool {
        self.input_mode
    }

    /// Arms the recurring timers and consumes events until shutdown.
    pub async fn run(mut self, mut events: UnboundedReceiver<PetEvent>) {
        self.start();
        while let Some(event) = events.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        info!("[host] Event loop stopped");
    }

    /// Arms timers according to the current settings.
    pub fn start(&mut self) {
        info!(
            "[host] Starting with {} (random animation every {:?})",
            self.backend.kind(),
            self.random_interval
        );
        self.arm(TimerKind::RandomAnimation, self.random_interval);
        self.arm(TimerKind::Watchdog, WATCHDOG_INTERVAL);
        self.arm(TimerKind::Clock, CLOCK_INTERVAL);
        if self.settings.greetings_enabled {
            self.arm(TimerKind::Greeting, self.greeting_delay());
        }
        if self.settings.rest_reminder_enabled {
            self.arm(TimerKind::RestReminder, REST_INTERVAL);
        }
        if !self.backend.validate() {
            self.emit(HostOutput::ConfigRequired(self.backend.kind()));
        }
    }

    /// Handles one event. Returns false once the host should stop.
    pub fn handle(&mut self, event: PetEvent) -> bool {
        debug!("[host] {:?}", event);
        match event {
            PetEvent::Tick(kind, generation) => {
                if self.generations.get(&kind) == Some(&generation) {
                    self.on_timer(kind);
                } else {
                    debug!("[host] stale {:?} tick", kind);
                }
            }
            PetEvent::TransitionDone(id) => {
                let next = self.driver.on_transition_done(id);
                self.schedule(next);
            }
            PetEvent::PointerDown => self.pointer_down(),
            PetEvent::PointerMove(point) => {
                if self.pressed {
                    self.dragged = true;
                    self.driver.drag_to(point);
                }
            }
            PetEvent::PointerUp => self.pointer_up(),
            PetEvent::DoubleClick => self.toggle_input_mode(),
            PetEvent::Submit(text) => self.submit(text),
            PetEvent::ChatFinished(result) => self.chat_finished(result),
            PetEvent::ShowProviders => self.emit(HostOutput::ProviderMenu(self.selector.menu())),
            PetEvent::SelectProvider(answer) => self.select_provider(answer.as_deref()),
            PetEvent::Configure(fields) => self.configure(&fields),
            PetEvent::ListModels => self.list_models(),
            PetEvent::ModelsListed(result) => match result {
                Ok(models) => self.emit(HostOutput::Models(models)),
                Err(e) => self.emit(HostOutput::Error(e.to_string())),
            },
            PetEvent::ToggleAnimations(on) => {
                self.settings.animations_enabled = on;
                self.sync_animations();
                self.save_settings();
            }
            PetEvent::ToggleGreetings(on) => {
                self.settings.greetings_enabled = on;
                if on {
                    self.arm(TimerKind::Greeting, self.greeting_delay());
                } else {
                    self.cancel(TimerKind::Greeting);
                }
                self.save_settings();
            }
            PetEvent::ToggleRestReminder(on) => {
                self.settings.rest_reminder_enabled = on;
                if on {
                    self.arm(TimerKind::RestReminder, REST_INTERVAL);
                } else {
                    self.cancel(TimerKind::RestReminder);
                }
                self.save_settings();
            }
            PetEvent::ToggleClock(on) => {
                self.settings.time_display_enabled = on;
                self.clock.set_enabled(on);
                self.save_settings();
            }
            PetEvent::StartCountdown(minutes) => match self.clock.start_countdown(minutes) {
                Ok(()) => {
                    if let Some(text) = self.clock.render(Local::now().naive_local()) {
                        self.emit(HostOutput::Clock(text));
                    }
                }
                Err(e) => self.emit(HostOutput::Error(e)),
            },
            PetEvent::LoopStalled => self.driver.report_stalled(),
            PetEvent::Status => self.emit(HostOutput::Status(self.status())),
            PetEvent::Shutdown => {
                info!("[host] Shutting down");
                self.save_settings();
                return false;
            }
        }
        self.report_animation();
        true
    }

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::RandomAnimation => {
                let next = self.driver.random_animation();
                self.schedule(next);
                self.arm(kind, self.random_interval);
            }
            TimerKind::Watchdog => {
                self.driver.check_liveness();
                self.arm(kind, WATCHDOG_INTERVAL);
            }
            TimerKind::Greeting => {
                if !self.thinking {
                    if let Some(greeting) = self.greetings.choose(&mut rand::thread_rng()) {
                        self.emit(HostOutput::Greeting(greeting.clone()));
                    }
                }
                self.arm(kind, self.greeting_delay());
            }
            TimerKind::RestReminder => {
                info!("[host] Rest reminder");
                if !self.driver.is_animating() {
                    self.driver.play(AnimationState::Shake);
                }
                self.emit(HostOutput::RestReminder(REST_MESSAGE.to_string()));
                self.arm(kind, REST_INTERVAL);
            }
            TimerKind::Clock => {
                let (text, _finished) = self.clock.tick(Local::now().naive_local());
                if let Some(text) = text {
                    self.emit(HostOutput::Clock(text));
                }
                self.arm(kind, CLOCK_INTERVAL);
            }
            TimerKind::DragSettle => {
                let next = self.driver.random_animation();
                self.schedule(next);
            }
        }
    }

    fn pointer_down(&mut self) {
        if !self.driver.session().pointer_enabled {
            debug!("[host] pointer ignored during recovery");
            return;
        }
        self.pressed = true;
        self.dragged = false;
        self.driver.pointer_down();
    }

    fn pointer_up(&mut self) {
        if !self.pressed {
            return;
        }
        self.pressed = false;
        if self.dragged {
            self.dragged = false;
            self.arm(TimerKind::DragSettle, DRAG_SETTLE_DELAY);
        } else {
            let next = self
                .driver
                .request_animation(TransitionKind::Touch, Priority::Interaction);
            self.schedule(next);
        }
    }

    fn toggle_input_mode(&mut self) {
        self.input_mode = !self.input_mode;
        info!("[host] Input mode {}", if self.input_mode { "on" } else { "off" });
        self.sync_animations();
        if self.input_mode {
            self.driver.play(AnimationState::Shake);
        }
        self.emit(HostOutput::InputMode(self.input_mode));
    }

    fn submit(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.thinking {
            self.emit(HostOutput::Error("Still thinking about the last message".to_string()));
            return;
        }
        if !self.backend.validate() {
            self.emit(HostOutput::ConfigRequired(self.backend.kind()));
            return;
        }

        self.thinking = true;
        self.sync_animations();
        self.emit(HostOutput::Thinking);

        let backend = self.backend.clone();
        let events = self.scheduler.sender();
        tokio::spawn(async move {
            let result = backend.reply(&text).await;
            if events.send(PetEvent::ChatFinished(result)).is_err() {
                warn!("[host] Reply arrived after shutdown");
            }
        });
    }

    fn chat_finished(&mut self, result: Result<String, ChatError>) {
        self.thinking = false;
        self.sync_animations();
        match result {
            Ok(reply) => self.emit(HostOutput::Reply(reply)),
            Err(ChatError::ConfigInvalid) => self.emit(HostOutput::ConfigRequired(self.backend.kind())),
            Err(e) => {
                error!("[host] Chat failed: {}", e);
                self.emit(HostOutput::Error(e.to_string()));
            }
        }
    }

    fn select_provider(&mut self, answer: Option<&str>) {
        let Some(kind) = self.selector.choose(answer) else {
            info!("[host] Provider selection cancelled");
            return;
        };
        if kind != self.backend.kind() {
            let provider = load_provider(kind, self.store.as_ref());
            self.backend = self.backend.switch_provider(provider);
            info!("[host] Switched to {}", kind);
        }
        self.emit(HostOutput::ProviderSelected(kind));
        if !self.backend.validate() {
            self.emit(HostOutput::ConfigRequired(kind));
        }
    }

    fn configure(&mut self, fields: &[(String, String)]) {
        match self.backend.reconfigure(fields) {
            Ok(backend) => {
                let saved = backend.save_config(self.store.as_ref());
                self.backend = backend;
                match saved {
                    Ok(()) => self.emit(HostOutput::ConfigSaved(self.backend.kind())),
                    Err(e) => {
                        error!("[host] {}", e);
                        self.emit(HostOutput::Error(format!(
                            "{} settings applied but not saved: {}",
                            self.backend.kind(),
                            e
                        )));
                    }
                }
            }
            Err(_) => self.emit(HostOutput::ConfigRequired(self.backend.kind())),
        }
    }

    fn list_models(&mut self) {
        let provider = Arc::clone(self.backend.provider());
        let events = self.scheduler.sender();
        tokio::spawn(async move {
            let result = provider.list_models().await;
            let _ = events.send(PetEvent::ModelsListed(result));
        });
    }

    fn status(&self) -> HostStatus {
        HostStatus {
            provider: self.backend.kind(),
            configured: self.backend.validate(),
            state: self.driver.current_state(),
            position: self.driver.pose().position,
            settings: self.settings,
            input_mode: self.input_mode,
            thinking: self.thinking,
            history_len: self.backend.history().len(),
        }
    }

    /// Animations run only when enabled, outside input mode and while no
    /// reply is pending.
    fn sync_animations(&mut self) {
        let enabled = self.settings.animations_enabled && !self.input_mode && !self.thinking;
        self.driver.set_enabled(enabled);
    }

    fn save_settings(&self) {
        if let Err(e) = save_record(self.store.as_ref(), PET_SETTINGS_KEY, &self.settings) {
            error!("[host] {}", e);
        }
    }

    fn greeting_delay(&self) -> Duration {
        self.random_interval + Duration::from_millis(rand::thread_rng().gen_range(GREETING_JITTER_MS))
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration) {
        let generation = self.generations.entry(kind).or_insert(0);
        *generation += 1;
        self.scheduler.after(delay, PetEvent::Tick(kind, *generation));
    }

    fn cancel(&mut self, kind: TimerKind) {
        *self.generations.entry(kind).or_insert(0) += 1;
    }

    fn schedule(&self, next: Option<Scheduled>) {
        if let Some(next) = next {
            self.scheduler.after(next.after, PetEvent::TransitionDone(next.id));
        }
    }

    fn report_animation(&mut self) {
        let state = self.driver.current_state();
        if state != self.shown_state {
            self.shown_state = state;
            self.emit(HostOutput::AnimationChanged(state));
        }
    }

    fn emit(&self, output: HostOutput) {
        if self.outputs.send(output).is_err() {
            debug!("[host] output receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationBindings, Rect, Size};
    use crate::conversation::ConversationBuffer;
    use crate::models::Message;
    use crate::providers::ChatProvider;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    struct Canned(Result<String, ChatError>);

    #[async_trait]
    impl ChatProvider for Canned {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Spark
        }

        fn validate(&self) -> bool {
            true
        }

        async fn complete(&self, _history: &[Message]) -> Result<String, ChatError> {
            self.0.clone()
        }

        fn config_record(&self) -> Value {
            json!({})
        }
    }

    struct Harness {
        host: PetHost,
        events: UnboundedReceiver<PetEvent>,
        outputs: UnboundedReceiver<HostOutput>,
        store: Arc<dyn SettingsStore>,
    }

    impl Harness {
        fn new(answer: Result<String, ChatError>) -> Self {
            let store = Arc::new(MemoryStore::new());
            let backend = ChatBackend::new(Arc::new(Canned(answer)), ConversationBuffer::new("sys", 5));
            Self::with_backend(backend, store)
        }

        fn with_backend(backend: ChatBackend, store: Arc<dyn SettingsStore>) -> Self {
            let (event_tx, events) = mpsc::unbounded_channel();
            let (output_tx, outputs) = mpsc::unbounded_channel();
            let driver = AnimationDriver::with_rng(
                AnimationBindings::default(),
                Rect::new(0, 0, 1920, 1080),
                Size::new(200, 200),
                Point::new(800, 400),
                StdRng::seed_from_u64(11),
            );
            let host = PetHost::new(
                driver,
                backend,
                store.clone(),
                vec!["Hello!".to_string()],
                event_tx,
                output_tx,
            );
            Self {
                host,
                events,
                outputs,
                store,
            }
        }

        fn drain(&mut self) -> Vec<HostOutput> {
            let mut out = Vec::new();
            while let Ok(output) = self.outputs.try_recv() {
                out.push(output);
            }
            out
        }

        async fn next_event(&mut self) -> PetEvent {
            self.events.recv().await.unwrap()
        }
    }

    #[tokio::test]
    async fn chat_success_pauses_then_restores_animations() {
        let mut h = Harness::new(Ok("meow".to_string()));
        assert!(h.host.driver().is_enabled());

        h.host.handle(PetEvent::Submit("hi".to_string()));
        assert!(h.host.is_thinking());
        assert!(!h.host.driver().is_enabled());
        assert_eq!(h.drain(), vec![HostOutput::Thinking]);

        let finished = h.next_event().await;
        assert!(matches!(finished, PetEvent::ChatFinished(Ok(_))));
        h.host.handle(finished);

        assert!(!h.host.is_thinking());
        assert!(h.host.driver().is_enabled());
        assert_eq!(h.drain(), vec![HostOutput::Reply("meow".to_string())]);
        assert_eq!(h.host.backend().history().len(), 3);
    }

    #[tokio::test]
    async fn chat_failure_restores_animations_and_reports() {
        let mut h = Harness::new(Err(ChatError::Network("offline".to_string())));
        h.host.handle(PetEvent::Submit("hi".to_string()));
        let finished = h.next_event().await;
        h.host.handle(finished);

        assert!(h.host.driver().is_enabled());
        let outputs = h.drain();
        assert_eq!(outputs.last(), Some(&HostOutput::Error("network error: offline".to_string())));
        assert_eq!(h.host.backend().history().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_provider_asks_for_settings() {
        let store = Arc::new(MemoryStore::new());
        let backend = ChatBackend::new(
            load_provider(ProviderKind::OpenRouter, store.as_ref()),
            ConversationBuffer::new("sys", 5),
        );
        let mut h = Harness::with_backend(backend, store);

        h.host.handle(PetEvent::Submit("hi".to_string()));
        assert!(!h.host.is_thinking());
        assert!(h.host.driver().is_enabled());
        assert_eq!(h.drain(), vec![HostOutput::ConfigRequired(ProviderKind::OpenRouter)]);

        h.host.handle(PetEvent::Configure(vec![
            ("api_key".to_string(), "k".repeat(25)),
            ("model".to_string(), "gpt-test".to_string()),
        ]));
        assert_eq!(h.drain(), vec![HostOutput::ConfigSaved(ProviderKind::OpenRouter)]);
        assert!(h.host.backend().validate());
        assert!(h.store.load("openrouter").unwrap().is_some());
    }

    #[tokio::test]
    async fn click_without_movement_plays_touch() {
        let mut h = Harness::new(Ok(String::new()));
        h.host.handle(PetEvent::PointerDown);
        h.host.handle(PetEvent::PointerUp);

        assert_eq!(h.host.driver().current_state(), AnimationState::Touch);
        assert_eq!(h.drain(), vec![HostOutput::AnimationChanged(AnimationState::Touch)]);
    }

    #[tokio::test(start_paused = true)]
    async fn drag_release_schedules_a_random_animation() {
        let mut h = Harness::new(Ok(String::new()));
        h.host.handle(PetEvent::PointerDown);
        h.host.handle(PetEvent::PointerMove(Point::new(600, 300)));
        h.host.handle(PetEvent::PointerUp);
        assert!(!h.host.driver().is_animating());

        let settle = h.next_event().await;
        assert!(matches!(settle, PetEvent::Tick(TimerKind::DragSettle, _)));
        h.host.handle(settle);
        assert!(h.host.driver().is_animating());

        let done = h.next_event().await;
        assert!(matches!(done, PetEvent::TransitionDone(_)));
        h.host.handle(done);
        assert!(!h.host.driver().is_animating());
    }

    #[tokio::test]
    async fn double_click_toggles_input_mode() {
        let mut h = Harness::new(Ok(String::new()));
        h.host.handle(PetEvent::DoubleClick);
        assert!(h.host.is_input_mode());
        assert!(!h.host.driver().is_enabled());
        assert_eq!(h.host.driver().current_state(), AnimationState::Shake);

        h.host.handle(PetEvent::DoubleClick);
        assert!(!h.host.is_input_mode());
        assert!(h.host.driver().is_enabled());
        assert_eq!(h.host.driver().current_state(), AnimationState::Idle);
    }

    #[tokio::test]
    async fn cancelled_timer_ticks_are_ignored() {
        let mut h = Harness::new(Ok(String::new()));
        h.host.handle(PetEvent::ToggleGreetings(true));
        let stale = *h.host.generations.get(&TimerKind::Greeting).unwrap();
        h.host.handle(PetEvent::ToggleGreetings(false));
        h.drain();

        h.host.handle(PetEvent::Tick(TimerKind::Greeting, stale));
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn toggles_persist_pet_settings() {
        let mut h = Harness::new(Ok(String::new()));
        h.host.handle(PetEvent::ToggleClock(false));
        h.host.handle(PetEvent::ToggleRestReminder(false));

        let saved: PetSettings = load_record(h.store.as_ref(), PET_SETTINGS_KEY).unwrap();
        assert!(!saved.time_display_enabled);
        assert!(!saved.rest_reminder_enabled);
        assert!(saved.animations_enabled);
    }

    #[tokio::test]
    async fn provider_selection_switches_backend_and_keeps_history() {
        let mut h = Harness::new(Ok("meow".to_string()));
        h.host.handle(PetEvent::Submit("hi".to_string()));
        let finished = h.next_event().await;
        h.host.handle(finished);
        h.drain();

        h.host.handle(PetEvent::SelectProvider(None));
        assert!(h.drain().is_empty());

        h.host.handle(PetEvent::SelectProvider(Some("2".to_string())));
        assert_eq!(
            h.drain(),
            vec![
                HostOutput::ProviderSelected(ProviderKind::OpenRouter),
                HostOutput::ConfigRequired(ProviderKind::OpenRouter),
            ]
        );
        assert_eq!(h.host.backend().kind(), ProviderKind::OpenRouter);
        assert_eq!(h.host.backend().history().len(), 3);
    }

    struct ReadOnlyStore;

    impl SettingsStore for ReadOnlyStore {
        fn load(&self, _key: &str) -> Result<Option<Value>, String> {
            Ok(None)
        }

        fn save(&self, key: &str, _record: &Value) -> Result<(), String> {
            Err(format!("Failed to save {} config: read-only", key))
        }
    }

    #[tokio::test]
    async fn unsaved_settings_are_reported_once() {
        let store: Arc<dyn SettingsStore> = Arc::new(ReadOnlyStore);
        let backend = ChatBackend::new(
            load_provider(ProviderKind::OpenRouter, store.as_ref()),
            ConversationBuffer::new("sys", 5),
        );
        let mut h = Harness::with_backend(backend, store);

        h.host.handle(PetEvent::Configure(vec![
            ("api_key".to_string(), "k".repeat(25)),
            ("model".to_string(), "gpt-test".to_string()),
        ]));
        let outputs = h.drain();
        assert_eq!(outputs.len(), 1, "{:?}", outputs);
        match &outputs[0] {
            HostOutput::Error(message) => assert!(message.contains("applied but not saved"), "{}", message),
            other => panic!("unexpected {:?}", other),
        }
        assert!(h.host.backend().validate());
    }

    #[tokio::test]
    async fn watchdog_tick_restarts_a_stalled_loop() {
        let mut h = Harness::new(Ok(String::new()));
        h.host.handle(PetEvent::LoopStalled);
        assert!(!h.host.driver().session().looping.is_running());

        h.host.arm(TimerKind::Watchdog, WATCHDOG_INTERVAL);
        let generation = h.host.generations[&TimerKind::Watchdog];
        h.host.handle(PetEvent::Tick(TimerKind::Watchdog, generation));

        assert!(h.host.driver().session().looping.is_running());
        assert_eq!(h.host.driver().current_state(), AnimationState::Idle);
        assert_eq!(h.host.generations[&TimerKind::Watchdog], generation + 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let mut h = Harness::new(Ok(String::new()));
        assert!(!h.host.handle(PetEvent::Shutdown));
        assert!(h.store.load(PET_SETTINGS_KEY).unwrap().is_some());
    }
}
