//! Per-chat conversation state for the interactive flows.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use ycbot_types::Resource;

/// Where a chat is in a multi-step flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Conversation {
    #[default]
    Idle,
    /// `/check_expired` listed these instances and asked whether to stop them.
    AwaitingShutdownConfirmation { expired: Vec<Resource> },
    /// `/auto_shutdown` asked whether to toggle or edit the schedule.
    AwaitingToggleDecision,
    /// Waiting for the two-line start/period reply.
    AwaitingScheduleEdit,
}

/// One lock per chat. Whoever holds a chat's guard owns its turn: state read
/// at the start of a message and written at the end cannot interleave with
/// another message from the same chat.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Arc<Mutex<Conversation>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the chat's turn. Waiters are served in arrival order.
    pub async fn lock(&self, chat_id: i64) -> OwnedMutexGuard<Conversation> {
        let slot = self
            .sessions
            .lock()
            .await
            .entry(chat_id)
            .or_default()
            .clone();
        slot.lock_owned().await
    }

    pub async fn get(&self, chat_id: i64) -> Conversation {
        self.lock(chat_id).await.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_state_persists_between_turns() {
        let store = SessionStore::new();
        *store.lock(1).await = Conversation::AwaitingToggleDecision;
        assert_eq!(store.get(1).await, Conversation::AwaitingToggleDecision);

        let taken = std::mem::take(&mut *store.lock(1).await);
        assert_eq!(taken, Conversation::AwaitingToggleDecision);
        assert_eq!(store.get(1).await, Conversation::Idle);
    }

    #[tokio::test]
    async fn test_chats_are_independent() {
        let store = SessionStore::new();
        let mut first = store.lock(1).await;
        *first = Conversation::AwaitingScheduleEdit;

        // Chat 2 is not blocked by chat 1's turn.
        let second = tokio::time::timeout(Duration::from_secs(1), store.lock(2))
            .await
            .unwrap();
        assert_eq!(*second, Conversation::Idle);
        drop(second);
        drop(first);
        assert_eq!(store.get(1).await, Conversation::AwaitingScheduleEdit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_chat_waits_for_the_turn_in_progress() {
        let store = Arc::new(SessionStore::new());
        let mut turn = store.lock(1).await;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.get(1).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        *turn = Conversation::AwaitingToggleDecision;
        drop(turn);
        assert_eq!(waiter.await.unwrap(), Conversation::AwaitingToggleDecision);
    }
}
