//! Chat engine: the event loop around a [`Session`].
//!
//! The engine owns the session and everything it talks to. Jobs the session
//! asks for run on spawned tasks and report back over a channel; the caller
//! drains that channel with [`ChatEngine::next_update`], so session state is
//! only ever touched from the caller's task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dwight_backend::BackendLifecycle;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::availability::Availability;
use crate::config::EngineConfig;
use crate::context::ContextUsage;
use crate::error::EngineError;
use crate::ollama::OllamaClient;
use crate::paths;
use crate::profiles::{ModelProfile, ProfileSet};
use crate::resources::{load_attachments, FsResourceReader, ResourceReader};
use crate::session::{Job, Session, SessionEvent, Update};
use crate::settings::AppSettings;
use crate::store::ConversationStore;

pub struct ChatEngine {
    session: Session,
    availability: Availability,
    client: OllamaClient,
    store: ConversationStore,
    reader: Arc<dyn ResourceReader>,
    settings: AppSettings,
    stream: bool,
    profiles_path: PathBuf,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ChatEngine {
    /// Build an engine from configuration, loading settings and profiles
    /// from the data directory.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        Self::with_lifecycle(config, config.lifecycle())
    }

    /// Like [`from_config`](Self::from_config) with an explicit lifecycle
    /// collaborator.
    pub fn with_lifecycle(config: &EngineConfig, lifecycle: Arc<dyn BackendLifecycle>) -> Result<Self, EngineError> {
        let settings = AppSettings::load(&paths::settings_path(&config.data_dir))?;
        let profiles_path = paths::profiles_path(&config.data_dir);
        let profiles = ProfileSet::load(&profiles_path)?;

        let client = OllamaClient::new(config.base_url.clone()).with_chat_timeout(settings.chat_timeout());
        let availability = Availability::new(client.clone(), lifecycle, config.pull);
        let store = ConversationStore::new(paths::conversations_dir(&config.data_dir));
        let (tx, rx) = mpsc::unbounded_channel();

        info!(
            url = %client.base_url(),
            profile = %profiles.current().name,
            stream = config.stream,
            "Chat engine ready"
        );

        Ok(Self {
            session: Session::new(profiles),
            availability,
            client,
            store,
            reader: Arc::new(FsResourceReader),
            settings,
            stream: config.stream,
            profiles_path,
            tx,
            rx,
        })
    }

    /// Replace the reader used for attached resources.
    pub fn with_reader(mut self, reader: Arc<dyn ResourceReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    pub fn context_usage(&self) -> ContextUsage {
        self.session.context_usage()
    }

    /// Pick the starting profile before [`open`](Self::open).
    pub fn select_profile(&mut self, index: usize) -> Result<&ModelProfile, EngineError> {
        self.session.select_profile(index)?;
        Ok(self.session.profile())
    }

    pub fn open(&mut self) -> Result<(), EngineError> {
        let job = self.session.open()?;
        self.spawn(job);
        Ok(())
    }

    pub fn retry(&mut self) -> Result<(), EngineError> {
        let job = self.session.retry()?;
        self.spawn(job);
        Ok(())
    }

    pub fn confirm_pull(&mut self) -> Result<(), EngineError> {
        let job = self.session.confirm_pull()?;
        self.spawn(job);
        Ok(())
    }

    pub fn decline_pull(&mut self) -> Result<(), EngineError> {
        Ok(self.session.decline_pull()?)
    }

    /// Send a user turn with the global preamble and attached resources.
    pub fn submit(&mut self, text: &str) -> Result<(), EngineError> {
        let attachments = load_attachments(self.reader.as_ref(), self.session.attachments());
        let job = self
            .session
            .submit(text, &self.settings.main_prompt, &attachments, self.stream)?;
        self.spawn(job);
        Ok(())
    }

    /// Wait for the next job event and apply it.
    ///
    /// Returns `None` only if the channel closed. Awaiting while the session
    /// is not busy waits indefinitely.
    pub async fn next_update(&mut self) -> Option<Update> {
        let event = self.rx.recv().await?;
        Some(self.session.apply(event))
    }

    /// Apply events until nothing is in flight.
    pub async fn run_until_idle<F>(&mut self, mut on_update: F)
    where
        F: FnMut(&Update),
    {
        while self.session.is_busy() {
            match self.next_update().await {
                Some(update) => on_update(&update),
                None => break,
            }
        }
    }

    /// Switch profile while `Ready` and persist the choice.
    pub fn switch_profile(&mut self, index: usize) -> Result<&ModelProfile, EngineError> {
        self.session.switch_profile(index)?;
        self.persist_profiles()?;
        Ok(self.session.profile())
    }

    pub fn next_profile(&mut self) -> Result<&ModelProfile, EngineError> {
        self.session.next_profile()?;
        self.persist_profiles()?;
        Ok(self.session.profile())
    }

    pub fn previous_profile(&mut self) -> Result<&ModelProfile, EngineError> {
        self.session.previous_profile()?;
        self.persist_profiles()?;
        Ok(self.session.profile())
    }

    fn persist_profiles(&self) -> Result<(), EngineError> {
        self.session.profiles().save(&self.profiles_path)?;
        Ok(())
    }

    /// Persist the current conversation and return its id. A failed save
    /// leaves the session untouched.
    pub fn save(&mut self) -> Result<String, EngineError> {
        let mut conversation = self.session.prepare_save()?;
        self.store.save(&mut conversation)?;
        let id = conversation.id.clone();
        self.session.bind_conversation(conversation);
        Ok(id)
    }

    /// Continue a stored conversation.
    pub fn load(&mut self, id: &str) -> Result<(), EngineError> {
        let conversation = self.store.load(id)?;
        self.session.load_conversation(conversation)?;
        Ok(())
    }

    pub fn trim_history(&mut self) -> Result<usize, EngineError> {
        Ok(self.session.trim_history()?)
    }

    pub fn new_conversation(&mut self) -> Result<(), EngineError> {
        Ok(self.session.new_conversation()?)
    }

    pub fn attach(&mut self, path: impl Into<PathBuf>) -> bool {
        self.session.attach(path)
    }

    pub fn detach(&mut self, path: &Path) -> bool {
        self.session.detach(path)
    }

    fn spawn(&self, job: Job) {
        let tx = self.tx.clone();
        debug!(ticket = job.ticket(), "Spawning job");

        match job {
            Job::CheckModel { ticket, model } => {
                let availability = self.availability.clone();
                tokio::spawn(async move {
                    let result = availability.check_model(&model).await;
                    let _ = tx.send(SessionEvent::ModelChecked { ticket, result });
                });
            }
            Job::PullModel { ticket, model } => {
                let availability = self.availability.clone();
                tokio::spawn(async move {
                    let result = availability.pull_model(&model).await;
                    let _ = tx.send(SessionEvent::PullFinished { ticket, result });
                });
            }
            Job::Chat { ticket, request } => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let result = if request.stream {
                        let deltas = tx.clone();
                        client
                            .chat_stream(&request, |text| {
                                let _ = deltas.send(SessionEvent::Delta {
                                    ticket,
                                    text: text.to_string(),
                                });
                            })
                            .await
                    } else {
                        client.chat(&request).await
                    };
                    let _ = tx.send(SessionEvent::ChatFinished { ticket, result });
                });
            }
        }
    }
}
