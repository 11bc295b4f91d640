//! Chat session state machine.
//!
//! The session never performs I/O. Operations that need the network return a
//! [`Job`] for the caller to run; the job's outcome comes back through
//! [`Session::apply`] as a [`SessionEvent`]. Every job carries a ticket and
//! events for any ticket other than the one in flight are dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::context::{trim_to_context, ContextUsage};
use crate::error::{BackendError, ChatError, PullError, SessionError, ValidationError};
use crate::profiles::{ModelProfile, ProfileSet};
use crate::prompt::{assemble_request, Attachment};
use crate::store::Conversation;
use crate::types::{ChatMessage, ChatReply, ChatRequest};

/// Discriminant of [`ChatState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Init,
    CheckingModel,
    ModelNotAvailable,
    PullingModel,
    Ready,
    Streaming,
    Sending,
    Error,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StateKind::Init => "initializing",
            StateKind::CheckingModel => "checking the model",
            StateKind::ModelNotAvailable => "the model is not available",
            StateKind::PullingModel => "pulling the model",
            StateKind::Ready => "ready",
            StateKind::Streaming => "streaming a reply",
            StateKind::Sending => "waiting for a reply",
            StateKind::Error => "in error",
        };
        f.write_str(text)
    }
}

/// Session state. Each variant carries only what that state needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatState {
    Init,
    CheckingModel { model: String },
    ModelNotAvailable { model: String },
    PullingModel { model: String },
    Ready,
    Streaming { buffer: String, started: Instant },
    Sending { started: Instant },
    Error { message: String },
}

impl ChatState {
    pub fn kind(&self) -> StateKind {
        match self {
            ChatState::Init => StateKind::Init,
            ChatState::CheckingModel { .. } => StateKind::CheckingModel,
            ChatState::ModelNotAvailable { .. } => StateKind::ModelNotAvailable,
            ChatState::PullingModel { .. } => StateKind::PullingModel,
            ChatState::Ready => StateKind::Ready,
            ChatState::Streaming { .. } => StateKind::Streaming,
            ChatState::Sending { .. } => StateKind::Sending,
            ChatState::Error { .. } => StateKind::Error,
        }
    }
}

/// Network work requested by the session.
#[derive(Debug, Clone)]
pub enum Job {
    /// Ensure the backend is up, then look the model up in the registry.
    CheckModel { ticket: u64, model: String },
    PullModel { ticket: u64, model: String },
    Chat { ticket: u64, request: ChatRequest },
}

impl Job {
    pub fn ticket(&self) -> u64 {
        match self {
            Job::CheckModel { ticket, .. } | Job::PullModel { ticket, .. } | Job::Chat { ticket, .. } => *ticket,
        }
    }
}

/// Outcome of a [`Job`], delivered back to the session.
#[derive(Debug)]
pub enum SessionEvent {
    ModelChecked {
        ticket: u64,
        result: Result<bool, BackendError>,
    },
    PullFinished {
        ticket: u64,
        result: Result<(), PullError>,
    },
    /// One streamed content fragment.
    Delta { ticket: u64, text: String },
    ChatFinished {
        ticket: u64,
        result: Result<ChatReply, ChatError>,
    },
}

impl SessionEvent {
    pub fn ticket(&self) -> u64 {
        match self {
            SessionEvent::ModelChecked { ticket, .. }
            | SessionEvent::PullFinished { ticket, .. }
            | SessionEvent::Delta { ticket, .. }
            | SessionEvent::ChatFinished { ticket, .. } => *ticket,
        }
    }
}

/// What applying an event changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// The session moved to a new state.
    State(StateKind),
    /// A fragment was appended to the streaming buffer.
    Delta(String),
    /// The event belonged to a request that is no longer in flight.
    Stale,
}

#[derive(Debug)]
pub struct Session {
    state: ChatState,
    profiles: ProfileSet,
    messages: Vec<ChatMessage>,
    conversation: Option<Conversation>,
    attachments: Vec<PathBuf>,
    in_flight: Option<u64>,
    next_ticket: u64,
}

impl Session {
    pub fn new(profiles: ProfileSet) -> Self {
        Self {
            state: ChatState::Init,
            profiles,
            messages: Vec::new(),
            conversation: None,
            attachments: Vec::new(),
            in_flight: None,
            next_ticket: 0,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn profile(&self) -> &ModelProfile {
        self.profiles.current()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The stored conversation this session saves into, once saved.
    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    /// Text received so far while streaming.
    pub fn partial_response(&self) -> Option<&str> {
        match &self.state {
            ChatState::Streaming { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match &self.state {
            ChatState::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Model the session is waiting on, if any.
    pub fn pending_model(&self) -> Option<&str> {
        match &self.state {
            ChatState::CheckingModel { model }
            | ChatState::ModelNotAvailable { model }
            | ChatState::PullingModel { model } => Some(model),
            _ => None,
        }
    }

    /// A job has been issued and its outcome not applied yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn context_usage(&self) -> ContextUsage {
        ContextUsage::of(&self.messages, &self.profile().model)
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            action,
            state: self.kind(),
        }
    }

    fn ensure_ready(&self, action: &'static str) -> Result<(), SessionError> {
        if matches!(self.state, ChatState::Ready) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    /// Nothing in flight.
    fn ensure_idle(&self, action: &'static str) -> Result<(), SessionError> {
        if matches!(self.state, ChatState::Init | ChatState::Ready | ChatState::Error { .. }) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn transition(&mut self, next: ChatState) -> Update {
        let from = self.kind();
        self.state = next;
        let to = self.kind();
        debug!(%from, %to, "Session transition");
        Update::State(to)
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.in_flight = Some(self.next_ticket);
        self.next_ticket
    }

    fn check_model(&mut self) -> Job {
        let model = self.profile().model.clone();
        let ticket = self.issue_ticket();
        self.transition(ChatState::CheckingModel { model: model.clone() });
        Job::CheckModel { ticket, model }
    }

    /// Open the session: check that the current profile's model is installed.
    pub fn open(&mut self) -> Result<Job, SessionError> {
        match self.state {
            ChatState::Init => Ok(self.check_model()),
            _ => Err(self.invalid("open the session")),
        }
    }

    /// Leave `Error` and check the model again.
    pub fn retry(&mut self) -> Result<Job, SessionError> {
        match self.state {
            ChatState::Error { .. } => Ok(self.check_model()),
            _ => Err(self.invalid("retry")),
        }
    }

    /// The user agreed to download the missing model.
    pub fn confirm_pull(&mut self) -> Result<Job, SessionError> {
        let ChatState::ModelNotAvailable { model } = &self.state else {
            return Err(self.invalid("pull a model"));
        };
        let model = model.clone();
        let ticket = self.issue_ticket();
        info!(model = %model, "Pulling missing model");
        self.transition(ChatState::PullingModel { model: model.clone() });
        Ok(Job::PullModel { ticket, model })
    }

    /// The user refused the download; the session closes back to `Init`.
    pub fn decline_pull(&mut self) -> Result<(), SessionError> {
        match self.state {
            ChatState::ModelNotAvailable { .. } => {
                self.transition(ChatState::Init);
                Ok(())
            }
            _ => Err(self.invalid("decline a pull")),
        }
    }

    /// Submit a user turn.
    ///
    /// The message is appended to the history right away; the request carries
    /// the history trimmed to the model's budget, the system prompt and the
    /// attached texts.
    pub fn submit(
        &mut self,
        text: &str,
        preamble: &str,
        attachments: &[Attachment],
        stream: bool,
    ) -> Result<Job, SessionError> {
        self.ensure_ready("send a message")?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let profile = self.profile().clone();
        let history = trim_to_context(&self.messages, &profile.model);
        let request = ChatRequest {
            model: profile.model.clone(),
            messages: assemble_request(&history, text, &profile, preamble, attachments),
            temperature: profile.temperature,
            stream,
        };

        self.messages.push(ChatMessage::user(text));
        let ticket = self.issue_ticket();
        let started = Instant::now();
        self.transition(if stream {
            ChatState::Streaming {
                buffer: String::new(),
                started,
            }
        } else {
            ChatState::Sending { started }
        });

        Ok(Job::Chat { ticket, request })
    }

    /// Fold a job outcome into the session.
    pub fn apply(&mut self, event: SessionEvent) -> Update {
        let ticket = event.ticket();
        if self.in_flight != Some(ticket) {
            debug!(ticket, in_flight = ?self.in_flight, "Dropping stale event");
            return Update::Stale;
        }

        match event {
            SessionEvent::ModelChecked { result, .. } => {
                let ChatState::CheckingModel { model } = &self.state else {
                    return self.mismatch(ticket, "model check");
                };
                let model = model.clone();
                self.in_flight = None;
                match result {
                    Ok(true) => self.transition(ChatState::Ready),
                    Ok(false) => {
                        info!(model = %model, "Model not installed");
                        self.transition(ChatState::ModelNotAvailable { model })
                    }
                    Err(e) => self.fail(e.to_string()),
                }
            }
            SessionEvent::PullFinished { result, .. } => {
                if !matches!(self.state, ChatState::PullingModel { .. }) {
                    return self.mismatch(ticket, "pull result");
                }
                self.in_flight = None;
                match result {
                    Ok(()) => self.transition(ChatState::Ready),
                    Err(e) => self.fail(e.to_string()),
                }
            }
            SessionEvent::Delta { text, .. } => {
                let ChatState::Streaming { buffer, .. } = &mut self.state else {
                    return self.mismatch(ticket, "delta");
                };
                buffer.push_str(&text);
                Update::Delta(text)
            }
            SessionEvent::ChatFinished { result, .. } => {
                let started = match &self.state {
                    ChatState::Streaming { started, .. } | ChatState::Sending { started } => *started,
                    _ => return self.mismatch(ticket, "chat result"),
                };
                let elapsed = started.elapsed();
                self.in_flight = None;
                match result {
                    Ok(reply) => {
                        debug!(
                            ticket,
                            total_tokens = reply.total_tokens,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Reply complete"
                        );
                        self.messages.push(ChatMessage::assistant(reply, elapsed));
                        self.transition(ChatState::Ready)
                    }
                    Err(e) => self.fail(e.to_string()),
                }
            }
        }
    }

    fn mismatch(&self, ticket: u64, event: &str) -> Update {
        debug!(ticket, event, state = %self.kind(), "Event does not apply to current state");
        Update::Stale
    }

    fn fail(&mut self, message: String) -> Update {
        warn!(error = %message, "Session error");
        self.transition(ChatState::Error { message })
    }

    /// Pick the starting profile before the session is opened.
    pub fn select_profile(&mut self, index: usize) -> Result<&ModelProfile, SessionError> {
        if !matches!(self.state, ChatState::Init) {
            return Err(self.invalid("select the starting profile"));
        }
        Ok(self.profiles.set_current(index)?)
    }

    /// Make profile `index` current. Only allowed while `Ready`; history is kept.
    pub fn switch_profile(&mut self, index: usize) -> Result<&ModelProfile, SessionError> {
        self.ensure_ready("switch profiles")?;
        Ok(self.profiles.set_current(index)?)
    }

    pub fn next_profile(&mut self) -> Result<&ModelProfile, SessionError> {
        self.ensure_ready("switch profiles")?;
        Ok(self.profiles.next())
    }

    pub fn previous_profile(&mut self) -> Result<&ModelProfile, SessionError> {
        self.ensure_ready("switch profiles")?;
        Ok(self.profiles.previous())
    }

    /// Trim the live history to the current model's budget. Returns how many
    /// messages were dropped.
    pub fn trim_history(&mut self) -> Result<usize, SessionError> {
        self.ensure_idle("trim the history")?;
        let before = self.messages.len();
        self.messages = trim_to_context(&self.messages, &self.profile().model);
        Ok(before - self.messages.len())
    }

    /// Start over: no messages, no bound conversation, no attachments.
    pub fn new_conversation(&mut self) -> Result<(), SessionError> {
        self.ensure_idle("start a new conversation")?;
        self.messages.clear();
        self.conversation = None;
        self.attachments.clear();
        Ok(())
    }

    /// Continue a stored conversation.
    pub fn load_conversation(&mut self, conversation: Conversation) -> Result<(), SessionError> {
        self.ensure_idle("load a conversation")?;
        self.messages = conversation.messages.clone();
        self.attachments = conversation.attached_resources.clone();
        info!(id = %conversation.id, messages = self.messages.len(), "Loaded conversation");
        self.conversation = Some(conversation);
        Ok(())
    }

    /// Add a resource path. Returns false if it was already attached.
    pub fn attach(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.attachments.contains(&path) {
            return false;
        }
        self.attachments.push(path);
        true
    }

    pub fn detach(&mut self, path: &Path) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|p| p != path);
        self.attachments.len() != before
    }

    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }

    /// The conversation to persist: the bound one updated with the current
    /// messages, or a new one. Nothing changes until [`bind_conversation`]
    /// is called with the saved result.
    ///
    /// [`bind_conversation`]: Self::bind_conversation
    pub fn prepare_save(&self) -> Result<Conversation, ValidationError> {
        if self.messages.is_empty() {
            return Err(ValidationError::NothingToSave);
        }

        let profile = self.profile();
        Ok(match &self.conversation {
            Some(existing) => {
                let mut conversation = existing.clone();
                conversation.messages = self.messages.clone();
                conversation.model = profile.model.clone();
                conversation.profile_name = profile.name.clone();
                conversation.attached_resources = self.attachments.clone();
                conversation
            }
            None => Conversation::new(
                profile.model.clone(),
                profile.name.clone(),
                self.messages.clone(),
                self.attachments.clone(),
            ),
        })
    }

    pub fn bind_conversation(&mut self, conversation: Conversation) {
        self.conversation = Some(conversation);
    }
}
