//! Startup bootstrap
//!
//! Registers the dispatcher on its bus address, then loads every index
//! template definition found on disk by sending `putIndexTemplate` envelopes
//! back through the bus. All units of work hang off one completion barrier;
//! the gateway is ready only when every unit completed without failure.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use searchbus_protocol::fields;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::barrier::CompletionBarrier;
use crate::bus::{BusError, EnvelopeHandler, MessageBus};
use crate::config::GatewayConfig;
use crate::metrics::{BOOTSTRAP_READY, TEMPLATES_REGISTERED};
use crate::ops::template::request_envelope;
use crate::templates::{parse_templates, TemplateDefinition, TemplateFs};

/// Global startup state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    Idle,
    Registering,
    ListingTemplates,
    Ready,
    Failed,
}

impl BootstrapState {
    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapState::Idle => "idle",
            BootstrapState::Registering => "registering",
            BootstrapState::ListingTemplates => "listing_templates",
            BootstrapState::Ready => "ready",
            BootstrapState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bootstrap errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("Failed to register handler on {address}: {source}")]
    Registration { address: String, source: BusError },

    #[error("Failed to register template {name}: {source}")]
    Template { name: String, source: BusError },

    #[error("Bootstrap was abandoned before completion")]
    Abandoned,
}

/// Settings the bootstrap run depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    pub address: String,
    pub template_dir: PathBuf,
    pub template_suffix: String,
    pub create_only: bool,
    pub reply_timeout: Duration,
}

impl From<&GatewayConfig> for BootstrapSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            address: config.address.clone(),
            template_dir: config.template_dir.clone(),
            template_suffix: config.template_suffix.clone(),
            create_only: config.template_create_only,
            reply_timeout: config.reply_timeout,
        }
    }
}

/// Outcome of a successful bootstrap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Names of acknowledged templates, sorted
    pub templates: Vec<String>,
}

type Barrier = CompletionBarrier<BootstrapError>;

/// Runs the startup procedure and publishes its state
pub struct Bootstrapper {
    bus: Arc<dyn MessageBus>,
    fs: Arc<dyn TemplateFs>,
    settings: BootstrapSettings,
    state: watch::Sender<BootstrapState>,
}

impl Bootstrapper {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        fs: Arc<dyn TemplateFs>,
        settings: BootstrapSettings,
    ) -> Self {
        let (state, _) = watch::channel(BootstrapState::Idle);
        Self {
            bus,
            fs,
            settings,
            state,
        }
    }

    /// Receiver observing every state transition
    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    fn set_state(&self, state: BootstrapState) {
        debug!(state = %state, "Bootstrap state changed");
        self.state.send_replace(state);
    }

    /// Register `handler` and load templates. On failure the registration is withdrawn.
    pub async fn run(
        &self,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<BootstrapReport, BootstrapError> {
        let address = self.settings.address.clone();
        self.set_state(BootstrapState::Registering);

        let barrier = Barrier::new(1);
        let (tx, rx) = oneshot::channel();
        barrier.on_finished(move |outcome| {
            let _ = tx.send(outcome);
        });

        let acknowledged = Arc::new(Mutex::new(Vec::new()));
        let registered = match self.bus.register(&address, handler).await {
            Ok(()) => {
                self.set_state(BootstrapState::ListingTemplates);
                let loader = TemplateLoader {
                    bus: Arc::clone(&self.bus),
                    fs: Arc::clone(&self.fs),
                    settings: self.settings.clone(),
                    barrier: barrier.clone(),
                    acknowledged: Arc::clone(&acknowledged),
                };
                loader.start();
                barrier.complete();
                true
            }
            Err(source) => {
                barrier.fail(BootstrapError::Registration {
                    address: address.clone(),
                    source,
                });
                false
            }
        };

        let outcome = rx.await.unwrap_or(Err(BootstrapError::Abandoned));
        match outcome {
            Ok(()) => {
                let mut templates = std::mem::take(
                    &mut *acknowledged.lock().unwrap_or_else(PoisonError::into_inner),
                );
                templates.sort();
                self.set_state(BootstrapState::Ready);
                BOOTSTRAP_READY.set(1.0);
                info!(address = %address, templates = templates.len(), "Bootstrap complete");
                Ok(BootstrapReport { templates })
            }
            Err(err) => {
                if registered {
                    self.bus.unregister(&address).await;
                }
                self.set_state(BootstrapState::Failed);
                BOOTSTRAP_READY.set(0.0);
                error!(address = %address, error = %err, "Bootstrap failed");
                Err(err)
            }
        }
    }
}

/// Template loading units; every unit is counted on the barrier before it is spawned.
#[derive(Clone)]
struct TemplateLoader {
    bus: Arc<dyn MessageBus>,
    fs: Arc<dyn TemplateFs>,
    settings: BootstrapSettings,
    barrier: Barrier,
    acknowledged: Arc<Mutex<Vec<String>>>,
}

impl TemplateLoader {
    fn start(self) {
        if self.barrier.increment() {
            tokio::spawn(async move { self.list().await });
        }
    }

    async fn list(self) {
        let dir = &self.settings.template_dir;
        match self.fs.list_files(dir, &self.settings.template_suffix).await {
            Ok(files) => {
                debug!(dir = %dir.display(), files = files.len(), "Template files listed");
                for path in files {
                    if !self.barrier.increment() {
                        break;
                    }
                    let loader = self.clone();
                    tokio::spawn(async move { loader.load_file(path).await });
                }
            }
            Err(err) => warn!(dir = %dir.display(), error = %err, "Template listing failed"),
        }
        self.barrier.complete();
    }

    async fn load_file(self, path: PathBuf) {
        debug!(path = %path.display(), "Reading template file");
        let parsed = match self.fs.read_file(&path).await {
            Ok(bytes) => parse_templates(&bytes),
            Err(err) => Err(err),
        };

        match parsed {
            Ok(definitions) => {
                debug!(
                    path = %path.display(),
                    templates = definitions.len(),
                    "Template file parsed"
                );
                for definition in definitions {
                    if !self.barrier.increment() {
                        break;
                    }
                    let loader = self.clone();
                    tokio::spawn(async move { loader.register(definition).await });
                }
            }
            Err(err) => warn!(path = %path.display(), error = %err, "Skipping template file"),
        }
        self.barrier.complete();
    }

    async fn register(self, definition: TemplateDefinition) {
        let TemplateDefinition { name, source } = definition;
        let envelope = request_envelope(&name, source, self.settings.create_only);

        match self
            .bus
            .send(&self.settings.address, envelope, self.settings.reply_timeout)
            .await
        {
            Ok(reply) => {
                let acknowledged = reply
                    .get(fields::ACKNOWLEDGED)
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if acknowledged {
                    TEMPLATES_REGISTERED.inc();
                    self.acknowledged
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(name.clone());
                    debug!(template = %name, "Template registered");
                } else {
                    warn!(template = %name, "Template registration not acknowledged");
                }
                self.barrier.complete();
            }
            Err(source) => {
                error!(template = %name, error = %source, "Template registration failed");
                self.barrier.fail(BootstrapError::Template { name, source });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::dispatch::Dispatcher;
    use crate::templates::LocalFs;
    use searchbus_backend::{InMemoryBackend, PutTemplateRequest, SearchBackend};
    use std::fs;
    use tempfile::tempdir;

    fn settings(dir: &std::path::Path) -> BootstrapSettings {
        BootstrapSettings {
            address: "realtime/search".into(),
            template_dir: dir.to_path_buf(),
            template_suffix: ".json".into(),
            create_only: false,
            reply_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn registers_every_definition_and_becomes_ready() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("logs.json"),
            r#"{"logs": {"template": "logs-*"}, "events": {"template": "events-*"}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "not json").unwrap();
        fs::write(dir.path().join("ignored.txt"), r#"{"skip": {}}"#).unwrap();

        let backend = InMemoryBackend::new();
        let bus = LocalBus::new();
        let bootstrapper =
            Bootstrapper::new(Arc::new(bus.clone()), Arc::new(LocalFs), settings(dir.path()));
        let states = bootstrapper.subscribe();

        let report = bootstrapper
            .run(Arc::new(Dispatcher::new(Arc::new(backend.clone()))))
            .await
            .unwrap();

        assert_eq!(report.templates, vec!["events", "logs"]);
        assert_eq!(backend.template_names().await, vec!["events", "logs"]);
        assert_eq!(*states.borrow(), BootstrapState::Ready);
        assert!(bus.has_handler("realtime/search").await);
    }

    #[tokio::test]
    async fn loads_yaml_definition_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("logs.yaml"),
            "logs:\n  template: logs-*\nevents:\n  template: events-*\n",
        )
        .unwrap();

        let backend = InMemoryBackend::new();
        let mut settings = settings(dir.path());
        settings.template_suffix = ".yaml".into();
        let bootstrapper =
            Bootstrapper::new(Arc::new(LocalBus::new()), Arc::new(LocalFs), settings);

        let report = bootstrapper
            .run(Arc::new(Dispatcher::new(Arc::new(backend.clone()))))
            .await
            .unwrap();

        assert_eq!(report.templates, vec!["events", "logs"]);
        assert_eq!(
            backend.template("logs").await.unwrap()["template"],
            "logs-*"
        );
    }

    #[tokio::test]
    async fn missing_directory_is_tolerated() {
        let dir = tempdir().unwrap();
        let bootstrapper = Bootstrapper::new(
            Arc::new(LocalBus::new()),
            Arc::new(LocalFs),
            settings(&dir.path().join("absent")),
        );

        let report = bootstrapper
            .run(Arc::new(Dispatcher::new(Arc::new(InMemoryBackend::new()))))
            .await
            .unwrap();
        assert!(report.templates.is_empty());
        assert_eq!(bootstrapper.state(), BootstrapState::Ready);
    }

    #[tokio::test]
    async fn occupied_address_fails_registration() {
        let dir = tempdir().unwrap();
        let bus = LocalBus::new();
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(InMemoryBackend::new())));
        bus.register("realtime/search", dispatcher.clone()).await.unwrap();

        let bootstrapper =
            Bootstrapper::new(Arc::new(bus.clone()), Arc::new(LocalFs), settings(dir.path()));
        let err = bootstrapper.run(dispatcher).await.unwrap_err();

        assert!(matches!(err, BootstrapError::Registration { .. }));
        assert_eq!(bootstrapper.state(), BootstrapState::Failed);
        // the earlier registration is not ours to withdraw
        assert!(bus.has_handler("realtime/search").await);
    }

    #[tokio::test]
    async fn rejected_template_fails_and_withdraws_registration() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("logs.json"), r#"{"logs": {"template": "logs-*"}}"#).unwrap();

        let backend = InMemoryBackend::new();
        backend
            .put_template(PutTemplateRequest {
                name: "logs".into(),
                source: serde_json::Map::new(),
                create: false,
            })
            .await
            .unwrap();

        let bus = LocalBus::new();
        let mut settings = settings(dir.path());
        settings.create_only = true;
        let bootstrapper = Bootstrapper::new(Arc::new(bus.clone()), Arc::new(LocalFs), settings);

        let err = bootstrapper
            .run(Arc::new(Dispatcher::new(Arc::new(backend))))
            .await
            .unwrap_err();

        match err {
            BootstrapError::Template { name, source } => {
                assert_eq!(name, "logs");
                assert!(matches!(source, BusError::RecipientFailure(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bootstrapper.state(), BootstrapState::Failed);
        assert!(!bus.has_handler("realtime/search").await);
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl EnvelopeHandler for Stalled {
        async fn handle(
            &self,
            envelope: searchbus_protocol::Envelope,
        ) -> searchbus_protocol::Reply {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(envelope)
        }
    }

    #[tokio::test]
    async fn template_reply_timeout_fails_and_withdraws_registration() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("logs.json"), r#"{"logs": {"template": "logs-*"}}"#).unwrap();

        let bus = LocalBus::new();
        let mut settings = settings(dir.path());
        settings.reply_timeout = Duration::from_millis(50);
        let bootstrapper = Bootstrapper::new(Arc::new(bus.clone()), Arc::new(LocalFs), settings);

        let err = bootstrapper.run(Arc::new(Stalled)).await.unwrap_err();

        match err {
            BootstrapError::Template { name, source } => {
                assert_eq!(name, "logs");
                assert!(matches!(source, BusError::Timeout { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bootstrapper.state(), BootstrapState::Failed);
        assert!(!bus.has_handler("realtime/search").await);
    }
}
