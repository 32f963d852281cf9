// src/chat/log.rs
//
// Message log for the active selection, plus the generation guard that
// keeps a superseded channel from ever writing into the current log.

use super::ChatMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Ordered, append-only sequence of chat messages.
///
/// Owned by the selection controller; everything else sees snapshots.
/// Reset exactly when the selection changes.
#[derive(Default)]
pub struct MessageLog {
    entries: Mutex<Vec<ChatMessage>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, message: ChatMessage) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(message);
        }
    }

    /// Copy of the log in append order.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear to an empty sequence. Called only at a selection transition.
    pub fn reset(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Write handle given to one channel task.
///
/// Each channel carries a generation number; the controller bumps the active
/// generation whenever the selection changes. An appender whose generation is
/// no longer active silently discards writes - this is the logical
/// cancellation token that makes in-flight deliveries from a torn-down
/// channel harmless, even when the task itself has not finished yet.
#[derive(Clone)]
pub struct LogAppender {
    log: Arc<MessageLog>,
    active_generation: Arc<AtomicU64>,
    generation: u64,
}

impl LogAppender {
    pub fn new(log: Arc<MessageLog>, active_generation: Arc<AtomicU64>, generation: u64) -> Self {
        Self {
            log,
            active_generation,
            generation,
        }
    }

    /// Whether this appender still belongs to the active channel.
    pub fn is_live(&self) -> bool {
        self.active_generation.load(Ordering::SeqCst) == self.generation
    }

    /// Append if still live. Returns false when the write was discarded.
    pub fn append(&self, message: ChatMessage) -> bool {
        if !self.is_live() {
            return false;
        }
        self.log.append(message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Sender;

    fn msg(content: &str) -> ChatMessage {
        ChatMessage {
            sender: Sender::Ai,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_append_order_preserved() {
        let log = MessageLog::new();
        log.append(msg("one"));
        log.append(msg("two"));
        log.append(msg("three"));

        let contents: Vec<_> = log.snapshot().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_reset_empties_log() {
        let log = MessageLog::new();
        log.append(msg("one"));
        log.reset();
        assert!(log.is_empty());
    }

    #[test]
    fn test_live_appender_writes() {
        let log = Arc::new(MessageLog::new());
        let active = Arc::new(AtomicU64::new(3));
        let appender = LogAppender::new(log.clone(), active, 3);

        assert!(appender.append(msg("hello")));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_stale_appender_discards() {
        let log = Arc::new(MessageLog::new());
        let active = Arc::new(AtomicU64::new(3));
        let stale = LogAppender::new(log.clone(), active.clone(), 2);

        assert!(!stale.is_live());
        assert!(!stale.append(msg("late delivery")));
        assert!(log.is_empty());
    }

    #[test]
    fn test_appender_goes_stale_when_generation_moves() {
        let log = Arc::new(MessageLog::new());
        let active = Arc::new(AtomicU64::new(1));
        let appender = LogAppender::new(log.clone(), active.clone(), 1);

        assert!(appender.append(msg("in time")));

        // Selection change: generation retired while a delivery is in flight
        active.store(2, Ordering::SeqCst);
        assert!(!appender.append(msg("too late")));
        assert_eq!(log.len(), 1);
    }
}
