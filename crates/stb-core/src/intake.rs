//! Question intake: registration, ban gate, ticket creation, admin alerts.

use std::sync::Arc;

use tracing::warn;

use crate::{
    domain::AdminId,
    errors::Error,
    formatting::{ellipsize, escape_html},
    messaging::{
        port::MessagingPort,
        types::{InlineButton, InlineKeyboard},
    },
    store::{Ticket, TicketStore, User, UserDirectory, UserProfile},
    Result,
};

/// How much of a question is quoted in the admin alert.
const ALERT_QUESTION_CHARS: usize = 500;

pub struct IntakeService {
    tickets: Arc<dyn TicketStore>,
    directory: Arc<dyn UserDirectory>,
    messenger: Arc<dyn MessagingPort>,
    admins: Vec<AdminId>,
}

impl IntakeService {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        directory: Arc<dyn UserDirectory>,
        messenger: Arc<dyn MessagingPort>,
        admins: Vec<AdminId>,
    ) -> Self {
        Self {
            tickets,
            directory,
            messenger,
            admins,
        }
    }

    /// Accept one inbound question.
    ///
    /// Upserts the sender, rejects banned users and empty questions, persists
    /// the ticket, then alerts every admin. Alert delivery is best-effort:
    /// an unreachable admin never fails the submission.
    pub async fn submit(&self, profile: UserProfile, question: &str) -> Result<Ticket> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }

        let user = self.directory.upsert(profile).await?;
        if user.banned {
            return Err(Error::Banned(user.id));
        }

        let ticket = self.tickets.create(user.id, question).await?;
        self.alert_admins(&user, &ticket).await;
        Ok(ticket)
    }

    async fn alert_admins(&self, user: &User, ticket: &Ticket) {
        let text = format!(
            "📨 <b>New question {}</b>\n\n👤 {} (id {})\n\n{}",
            ticket.id,
            escape_html(&user.label()),
            user.id,
            escape_html(&ellipsize(&ticket.question, ALERT_QUESTION_CHARS)),
        );
        let keyboard = claim_alert_keyboard(ticket);

        for admin in &self.admins {
            match self
                .messenger
                .notify(admin.chat(), &text, Some(keyboard.clone()))
                .await
            {
                Ok(outcome) if outcome.is_delivered() => {}
                Ok(outcome) => {
                    warn!(admin = admin.0, ?outcome, ticket = %ticket.id, "admin alert not delivered")
                }
                Err(e) => {
                    warn!(admin = admin.0, ticket = %ticket.id, "admin alert failed: {e}")
                }
            }
        }
    }
}

fn claim_alert_keyboard(ticket: &Ticket) -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![
        InlineButton::new("✍️ Claim", format!("a:claim:{}", ticket.id.0)),
        InlineButton::new("⛔ Ban user", format!("a:ban:{}", ticket.user_id.0)),
    ]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, MessageId, MessageRef, UserId},
        messaging::types::{DeliveryOutcome, MessagingCapabilities},
        store::{json::JsonStore, StatusFilter, TicketStatus},
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeMessenger {
        notified: Mutex<Vec<(ChatId, String)>>,
        blocked_chats: Vec<i64>,
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_html: true,
                supports_edit: true,
                supports_inline_keyboards: true,
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, chat_id: ChatId, _html: &str) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn edit_html(&self, _msg: MessageRef, _html: &str) -> Result<()> {
            Ok(())
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            _html: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn answer_callback_query(
            &self,
            _callback_id: &str,
            _text: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }

        async fn notify(
            &self,
            chat_id: ChatId,
            html: &str,
            _keyboard: Option<InlineKeyboard>,
        ) -> Result<DeliveryOutcome> {
            self.notified
                .lock()
                .unwrap()
                .push((chat_id, html.to_string()));
            if self.blocked_chats.contains(&chat_id.0) {
                return Ok(DeliveryOutcome::Blocked);
            }
            Ok(DeliveryOutcome::Delivered)
        }
    }

    fn profile(id: i64) -> UserProfile {
        UserProfile {
            id: UserId(id),
            display_name: Some("Tester".to_string()),
            handle: Some("tester".to_string()),
        }
    }

    fn service(
        store: Arc<JsonStore>,
        messenger: Arc<FakeMessenger>,
        admins: &[i64],
    ) -> IntakeService {
        IntakeService::new(
            store.clone(),
            store,
            messenger,
            admins.iter().map(|&id| AdminId(id)).collect(),
        )
    }

    #[tokio::test]
    async fn submit_creates_ticket_and_alerts_every_admin() {
        let store = Arc::new(JsonStore::in_memory());
        let messenger = Arc::new(FakeMessenger::default());
        let intake = service(store.clone(), messenger.clone(), &[100, 200]);

        let ticket = intake.submit(profile(1), "where is my order?").await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.user_id, UserId(1));

        let notified = messenger.notified.lock().unwrap();
        assert_eq!(notified.len(), 2);
        assert_eq!(notified[0].0, ChatId(100));
        assert_eq!(notified[1].0, ChatId(200));
        assert!(notified[0].1.contains("where is my order?"));
        assert!(notified[0].1.contains("@tester"));
    }

    #[tokio::test]
    async fn unreachable_admin_does_not_fail_submission() {
        let store = Arc::new(JsonStore::in_memory());
        let messenger = Arc::new(FakeMessenger {
            blocked_chats: vec![100],
            ..Default::default()
        });
        let intake = service(store.clone(), messenger.clone(), &[100, 200]);

        intake.submit(profile(1), "hello?").await.unwrap();
        assert_eq!(store.count(StatusFilter::All).await.unwrap(), 1);
        assert_eq!(messenger.notified.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn banned_user_is_rejected_before_ticket_creation() {
        let store = Arc::new(JsonStore::in_memory());
        let messenger = Arc::new(FakeMessenger::default());
        let intake = service(store.clone(), messenger.clone(), &[100]);

        store.upsert(profile(1)).await.unwrap();
        store.set_banned(UserId(1), true).await.unwrap();

        let err = intake.submit(profile(1), "let me in").await.unwrap_err();
        assert!(matches!(err, Error::Banned(UserId(1))));
        assert_eq!(store.count(StatusFilter::All).await.unwrap(), 0);
        assert!(messenger.notified.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let store = Arc::new(JsonStore::in_memory());
        let messenger = Arc::new(FakeMessenger::default());
        let intake = service(store, messenger, &[100]);

        let err = intake.submit(profile(1), "  \n ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn alert_keyboard_targets_claim_and_ban() {
        let ticket = Ticket {
            id: crate::domain::TicketId(12),
            user_id: UserId(34),
            question: "q".to_string(),
            status: TicketStatus::Open,
            claimed_by: None,
            answer: None,
            answered_by: None,
            created_at: chrono::Utc::now(),
            answered_at: None,
        };

        let kb = claim_alert_keyboard(&ticket);
        assert_eq!(kb.rows[0][0].callback_data, "a:claim:12");
        assert_eq!(kb.rows[0][1].callback_data, "a:ban:34");
    }
}
