//! Per-admin pending-input state.
//!
//! When an admin taps "answer" or "broadcast", the bot waits for their next
//! text message. That expectation is explicit state keyed by admin id, armed
//! by the callback handlers and consumed exactly once by the text handler.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::domain::{AdminId, TicketId};

/// What the next text message from an admin will be interpreted as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Awaiting {
    #[default]
    Nothing,
    /// The next message is the answer for this ticket.
    Answer(TicketId),
    /// The next message is broadcast to all eligible users.
    Broadcast,
}

#[derive(Default)]
pub struct AdminSessions {
    inner: Mutex<HashMap<i64, Awaiting>>,
}

impl AdminSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn expect_answer(&self, admin: AdminId, ticket: TicketId) {
        self.inner.lock().await.insert(admin.0, Awaiting::Answer(ticket));
    }

    pub async fn expect_broadcast(&self, admin: AdminId) {
        self.inner.lock().await.insert(admin.0, Awaiting::Broadcast);
    }

    /// Consume the pending expectation, resetting it to `Nothing`.
    pub async fn take(&self, admin: AdminId) -> Awaiting {
        self.inner
            .lock()
            .await
            .remove(&admin.0)
            .unwrap_or_default()
    }

    pub async fn clear(&self, admin: AdminId) {
        self.inner.lock().await.remove(&admin.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_consumes_the_expectation() {
        let sessions = AdminSessions::new();
        sessions.expect_answer(AdminId(1), TicketId(7)).await;

        assert_eq!(sessions.take(AdminId(1)).await, Awaiting::Answer(TicketId(7)));
        assert_eq!(sessions.take(AdminId(1)).await, Awaiting::Nothing);
    }

    #[tokio::test]
    async fn admins_do_not_share_state() {
        let sessions = AdminSessions::new();
        sessions.expect_broadcast(AdminId(1)).await;

        assert_eq!(sessions.take(AdminId(2)).await, Awaiting::Nothing);
        assert_eq!(sessions.take(AdminId(1)).await, Awaiting::Broadcast);
    }

    #[tokio::test]
    async fn newer_expectation_replaces_older() {
        let sessions = AdminSessions::new();
        sessions.expect_answer(AdminId(1), TicketId(1)).await;
        sessions.expect_broadcast(AdminId(1)).await;

        assert_eq!(sessions.take(AdminId(1)).await, Awaiting::Broadcast);
    }
}
