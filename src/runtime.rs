//! Runtime for executing conversations
//!
//! Each conversation session gets its own runtime task that exclusively
//! owns its engine state. Collaborators talk to it through a
//! `ConversationHandle`; the `RuntimeManager` keeps the table of live
//! sessions.

mod executor;


pub use executor::ConversationRuntime;

use crate::state_machine::state::DEFAULT_SEED_GREETING;
use crate::state_machine::{
    ConvContext, ConversationView, EngineState, Event, Ignored, Notice, Session,
    TransitionError, ValidationError,
};
use crate::submit::SubmitService;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Configuration
// ============================================================================

/// Engine settings shared by every conversation
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between revealed characters
    pub reveal_interval: Duration,
    /// Opening turn of every new conversation
    pub seed_greeting: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal_interval: Duration::from_millis(30),
            seed_greeting: DEFAULT_SEED_GREETING.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reveal_interval: std::env::var("OTHER_SIDE_REVEAL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.reveal_interval, Duration::from_millis),
            seed_greeting: std::env::var("OTHER_SIDE_SEED_GREETING")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.seed_greeting),
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// How the engine disposed of an accepted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    Ignored(Ignored),
}

/// Errors returned to collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("Conversation has ended")]
    RuntimeStopped,
    #[error("Conversation not found: {0}")]
    NotFound(String),
}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Validation(v) => EngineError::Validation(v),
            TransitionError::InvalidTransition(msg) => EngineError::InvalidTransition(msg),
        }
    }
}

/// A command for the runtime loop, optionally with a reply channel
#[derive(Debug)]
pub struct Command {
    pub event: Event,
    pub reply: Option<oneshot::Sender<Result<Disposition, TransitionError>>>,
}

/// Updates pushed to the presentation layer
#[derive(Debug, Clone)]
pub enum EngineUpdate {
    /// Full snapshot after a structural change
    View { view: ConversationView },
    /// Streaming progress of one turn
    Reveal {
        turn_index: usize,
        shown: usize,
        complete: bool,
    },
    Notice { notice: Notice },
    Error { message: String },
}

/// Handle to interact with a running conversation
#[derive(Clone)]
pub struct ConversationHandle {
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: broadcast::Sender<EngineUpdate>,
    view_rx: watch::Receiver<ConversationView>,
    shutdown: CancellationToken,
}

impl ConversationHandle {
    /// Finalize the open user slot with `text` and send it
    pub async fn submit_user_turn(
        &self,
        text: impl Into<String>,
    ) -> Result<Disposition, EngineError> {
        self.send(Event::SubmitUserTurn { text: text.into() }).await
    }

    /// Resend the unanswered user turn after a failure
    pub async fn retry(&self) -> Result<Disposition, EngineError> {
        self.send(Event::RetrySubmission).await
    }

    pub async fn set_draft(&self, text: impl Into<String>) -> Result<Disposition, EngineError> {
        self.send(Event::DraftChanged { text: text.into() }).await
    }

    /// Start over from the seed turn
    pub async fn reset(&self) -> Result<Disposition, EngineError> {
        self.send(Event::Reset).await
    }

    /// Latest snapshot of the read model
    pub fn view(&self) -> ConversationView {
        self.view_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineUpdate> {
        self.broadcast_tx.subscribe()
    }

    /// Stop the runtime; pending timers are torn down and late results dropped
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled() || self.command_tx.is_closed()
    }

    async fn send(&self, event: Event) -> Result<Disposition, EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::RuntimeStopped);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command {
                event,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| EngineError::RuntimeStopped)?;

        let result = reply_rx.await.map_err(|_| EngineError::RuntimeStopped)?;
        result.map_err(EngineError::from)
    }
}

/// Start a runtime for one conversation session and return its handle
pub fn spawn_conversation<C>(
    context: ConvContext,
    client: Arc<C>,
    config: &EngineConfig,
) -> ConversationHandle
where
    C: SubmitService + ?Sized + 'static,
{
    let state = EngineState::new(context.seed.clone());
    let (command_tx, command_rx) = mpsc::channel(32);
    let (broadcast_tx, _) = broadcast::channel(256);
    let (view_tx, view_rx) = watch::channel(state.view(&context));
    let shutdown = CancellationToken::new();

    let conv_id = context.conversation_id.clone();
    let runtime = ConversationRuntime::new(
        context,
        state,
        client,
        config.reveal_interval,
        command_rx,
        broadcast_tx.clone(),
        view_tx,
        shutdown.clone(),
    );

    tokio::spawn(async move {
        runtime.run().await;
        tracing::info!(conv_id = %conv_id, "Conversation runtime finished");
    });

    ConversationHandle {
        command_tx,
        broadcast_tx,
        view_rx,
        shutdown,
    }
}

// ============================================================================
// Manager
// ============================================================================

struct SessionEntry {
    handle: ConversationHandle,
    session: Session,
    created_at: DateTime<Utc>,
}

/// Listing entry for a live conversation
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub visible_turns: usize,
    pub loading: bool,
}

/// Outcome of starting a new chat over an existing one
pub struct NewChat {
    pub conversation_id: String,
    pub handle: ConversationHandle,
    /// The previous conversation had user turns that an anonymous session cannot keep
    pub warn_unsaved_history: bool,
}

/// Manager for all conversation runtimes
pub struct RuntimeManager {
    client: Arc<dyn SubmitService>,
    config: EngineConfig,
    conversations: RwLock<HashMap<String, SessionEntry>>,
}

impl RuntimeManager {
    pub fn new(client: Arc<dyn SubmitService>, config: EngineConfig) -> Self {
        Self {
            client,
            config,
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Open a fresh conversation session
    pub async fn create(&self, session: Session) -> (String, ConversationHandle) {
        let id = uuid::Uuid::new_v4().to_string();
        let context = ConvContext::new(&id, &self.config.seed_greeting);
        let handle = spawn_conversation(context, self.client.clone(), &self.config);

        tracing::info!(
            conv_id = %id,
            authenticated = session.is_authenticated(),
            "Conversation created"
        );
        self.conversations.write().await.insert(
            id.clone(),
            SessionEntry {
                handle: handle.clone(),
                session,
                created_at: Utc::now(),
            },
        );

        (id, handle)
    }

    pub async fn get(&self, conversation_id: &str) -> Result<ConversationHandle, EngineError> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| EngineError::NotFound(conversation_id.to_string()))
    }

    pub async fn list(&self) -> Vec<ConversationSummary> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = conversations
            .iter()
            .map(|(id, entry)| {
                let view = entry.handle.view();
                ConversationSummary {
                    conversation_id: id.clone(),
                    user: entry.session.user.clone(),
                    created_at: entry.created_at,
                    visible_turns: view.turns.len(),
                    loading: view.loading,
                }
            })
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// End a session: the runtime stops and its conversation is discarded
    pub async fn end(&self, conversation_id: &str) -> Result<(), EngineError> {
        let entry = self
            .conversations
            .write()
            .await
            .remove(conversation_id)
            .ok_or_else(|| EngineError::NotFound(conversation_id.to_string()))?;
        entry.handle.shutdown();
        tracing::info!(conv_id = %conversation_id, "Conversation ended");
        Ok(())
    }

    /// Replace a conversation with a fresh one for `session`
    pub async fn start_new_chat(
        &self,
        conversation_id: &str,
        session: Session,
    ) -> Result<NewChat, EngineError> {
        let previous = self.get(conversation_id).await?;
        let had_user_turns = previous
            .view()
            .turns
            .iter()
            .any(|t| t.author == crate::state_machine::state::Author::User);
        let warn_unsaved_history = had_user_turns && !session.is_authenticated();

        self.end(conversation_id).await?;
        let (id, handle) = self.create(session).await;

        Ok(NewChat {
            conversation_id: id,
            handle,
            warn_unsaved_history,
        })
    }
}
