//! Append-only conversation transcript
//!
//! The store is written by exactly one owner (the session runtime). Readers
//! hold `watch` receivers and only ever see immutable snapshots, so a
//! snapshot handed out before an append is never altered by it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use ts_rs::TS;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Speaker {
    User,
    Assistant,
}

/// One committed utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Turn {
    pub id: String,
    pub speaker: Speaker,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            speaker,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[allow(dead_code)] // Used by tests
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Speaker::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, content)
    }
}

/// Immutable view of the transcript at some instant
pub type Transcript = Arc<Vec<Turn>>;

/// Ordered, append-only log of turns
#[derive(Debug)]
pub struct TranscriptStore {
    tx: watch::Sender<Transcript>,
}

impl TranscriptStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Self { tx }
    }

    /// Create a store seeded with the assistant's greeting
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        let store = Self::new();
        store.append(Turn::assistant(greeting));
        store
    }

    /// Append a turn at the end and notify subscribers.
    ///
    /// `created_at` is clamped so it never precedes the previous turn's
    /// timestamp (wall clocks can step backwards). Returns the turn as
    /// committed.
    pub fn append(&self, mut turn: Turn) -> Turn {
        self.tx.send_modify(|turns| {
            if let Some(last) = turns.last() {
                if turn.created_at < last.created_at {
                    turn.created_at = last.created_at;
                }
            }
            Arc::make_mut(turns).push(turn.clone());
        });
        turn
    }

    /// Snapshot of every turn in insertion order
    pub fn all(&self) -> Transcript {
        self.tx.borrow().clone()
    }

    /// Receiver that observes each new snapshot
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    #[allow(dead_code)] // API completeness
    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    #[allow(dead_code)] // API completeness
    pub fn last(&self) -> Option<Turn> {
        self.tx.borrow().last().cloned()
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}
