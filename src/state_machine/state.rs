//! Conversation and engine state types

use serde::{Deserialize, Serialize};

/// Greeting used when the collaborator does not supply an opening turn
pub const DEFAULT_SEED_GREETING: &str = "Hi, ask me anything";

// ============================================================================
// Turn
// ============================================================================

/// Which side of the debate authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    /// The opening turn (index 0), spoken by the system side
    Seed,
    User,
    System,
}

impl Author {
    /// Authorship is fixed by position: 0 is the seed, then user and system alternate.
    pub fn for_index(index: usize) -> Self {
        if index == 0 {
            Author::Seed
        } else if index % 2 == 1 {
            Author::User
        } else {
            Author::System
        }
    }

    /// Seed and system turns sit on the same side of the alternation
    pub fn is_system_side(self) -> bool {
        matches!(self, Author::Seed | Author::System)
    }
}

/// Display progress of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RevealState {
    #[default]
    Pending,
    Streaming,
    Complete,
}

/// One unit of conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub index: usize,
    pub content: String,
    pub reveal: RevealState,
    /// Streaming cursor, in characters
    pub shown: usize,
}

impl Turn {
    /// The opening turn, fully shown from the start
    pub fn seed(content: impl Into<String>) -> Self {
        let content = content.into();
        let shown = content.chars().count();
        Self {
            index: 0,
            content,
            reveal: RevealState::Complete,
            shown,
        }
    }

    /// An open user slot waiting for the draft to be submitted
    pub fn open_slot(index: usize) -> Self {
        Self {
            index,
            content: String::new(),
            reveal: RevealState::Pending,
            shown: 0,
        }
    }

    /// A system reply that will be revealed progressively
    pub fn streaming(index: usize, content: impl Into<String>) -> Self {
        Self {
            index,
            content: content.into(),
            reveal: RevealState::Streaming,
            shown: 0,
        }
    }

    pub fn author(&self) -> Author {
        Author::for_index(self.index)
    }

    /// Length of the content in reveal units
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// The part of the content the presentation layer should currently show
    pub fn visible_text(&self) -> &str {
        match self.reveal {
            RevealState::Pending => "",
            RevealState::Complete => &self.content,
            RevealState::Streaming => match self.content.char_indices().nth(self.shown) {
                Some((byte_end, _)) => self.content.get(..byte_end).unwrap_or_default(),
                None => &self.content,
            },
        }
    }

    /// Jump straight to the end of the reveal
    pub fn complete(&mut self) {
        self.shown = self.char_len();
        self.reveal = RevealState::Complete;
    }
}

// ============================================================================
// Conversation
// ============================================================================

/// Rejected attempt to append a turn out of sequence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("turn index {got} does not follow conversation length {expected}")]
pub struct OutOfSequence {
    pub expected: usize,
    pub got: usize,
}

/// Append-only, strictly alternating sequence of turns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Start a conversation from its seed turn
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::seed(seed)],
        }
    }

    /// Append a turn. Its index must equal the current length, which keeps
    /// indices contiguous and authorship alternating.
    pub fn push(&mut self, turn: Turn) -> Result<(), OutOfSequence> {
        if turn.index != self.turns.len() {
            return Err(OutOfSequence {
                expected: self.turns.len(),
                got: turn.index,
            });
        }
        self.turns.push(turn);
        Ok(())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[cfg(test)]
    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    pub(super) fn get_mut(&mut self, index: usize) -> Option<&mut Turn> {
        self.turns.get_mut(index)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Index of the next turn to be appended
    pub fn next_index(&self) -> usize {
        self.turns.len()
    }

    /// Index of the open user slot, if the conversation currently ends in one
    pub fn open_slot(&self) -> Option<usize> {
        self.last()
            .filter(|t| t.author() == Author::User && t.reveal == RevealState::Pending)
            .map(|t| t.index)
    }
}

// ============================================================================
// Engine State
// ============================================================================

/// Submission phase of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    /// Input slot open, nothing in flight
    #[default]
    Ready,

    /// A user turn has been sent and its reply is awaited
    Submitting { request_id: u64 },

    /// The last submission failed; the finalized user turn is unanswered
    SubmitFailed { message: String },
}

/// Pointer to the single turn currently being revealed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStream {
    pub turn_index: usize,
    pub stream_id: u64,
}

/// Full state of one reveal engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub conversation: Conversation,
    pub phase: Phase,
    /// The user's unsubmitted draft
    pub pending_input: String,
    pub active_stream: Option<ActiveStream>,
    /// Generation of the conversation, bumped on every reset
    pub epoch: u64,
    /// Counters survive resets so late callbacks never match a new id
    pub next_request_id: u64,
    pub next_stream_id: u64,
}

impl EngineState {
    /// Seed turn shown, input slot open, nothing in flight
    pub fn new(seed: impl Into<String>) -> Self {
        let mut conversation = Conversation::new(seed);
        conversation.turns.push(Turn::open_slot(1));
        Self {
            conversation,
            phase: Phase::Ready,
            pending_input: String::new(),
            active_stream: None,
            epoch: 0,
            next_request_id: 1,
            next_stream_id: 1,
        }
    }

    /// True while a system reply is being fetched
    pub fn loading(&self) -> bool {
        matches!(self.phase, Phase::Submitting { .. })
    }

    /// Turns currently mounted for display
    pub fn visible_turns(&self) -> impl Iterator<Item = &Turn> {
        self.conversation
            .turns()
            .iter()
            .filter(|t| t.reveal != RevealState::Pending)
    }

    #[cfg(test)]
    pub fn visible_count(&self) -> usize {
        self.visible_turns().count()
    }

    /// Request id of the submission in flight
    #[cfg(test)]
    pub fn in_flight(&self) -> Option<u64> {
        match self.phase {
            Phase::Submitting { request_id } => Some(request_id),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match &self.phase {
            Phase::SubmitFailed { message } => Some(message),
            _ => None,
        }
    }

    /// Snapshot for the presentation layer
    pub fn view(&self, context: &ConvContext) -> ConversationView {
        ConversationView {
            conversation_id: context.conversation_id.clone(),
            epoch: self.epoch,
            turns: self.visible_turns().map(TurnView::from).collect(),
            loading: self.loading(),
            pending_input: self.pending_input.clone(),
            input_slot: self.conversation.open_slot(),
            streaming_turn: self.active_stream.map(|s| s.turn_index),
            last_error: self.last_error().map(str::to_string),
        }
    }
}

// ============================================================================
// Read Model
// ============================================================================

/// One visible turn as rendered by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnView {
    pub index: usize,
    pub author: Author,
    pub content: String,
    pub reveal_state: RevealState,
    pub shown: usize,
    pub visible_text: String,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        Self {
            index: turn.index,
            author: turn.author(),
            content: turn.content.clone(),
            reveal_state: turn.reveal,
            shown: turn.shown,
            visible_text: turn.visible_text().to_string(),
        }
    }
}

/// Read-only view of an engine, exposed to collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation_id: String,
    pub epoch: u64,
    pub turns: Vec<TurnView>,
    pub loading: bool,
    pub pending_input: String,
    /// Index of the open user slot, when input is accepted
    pub input_slot: Option<usize>,
    pub streaming_turn: Option<usize>,
    pub last_error: Option<String>,
}

// ============================================================================
// Context
// ============================================================================

/// Identity of whoever is using the client, read but never mutated here
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            user: Some(name.into()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Context for a conversation (immutable configuration)
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub conversation_id: String,
    /// Text of the opening turn, restored on reset
    pub seed: String,
}

impl ConvContext {
    pub fn new(conversation_id: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            seed: seed.into(),
        }
    }
}
