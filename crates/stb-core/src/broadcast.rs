//! Broadcast fan-out with per-recipient failure accounting.
//!
//! A broadcast is best-effort and non-transactional: the recipient list is
//! snapshotted once, every recipient is attempted, and each outcome is
//! recorded independently. There is no rollback; "unsending" a chat message
//! is not meaningful.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    messaging::port::MessagingPort,
    store::UserDirectory,
    Result,
};

/// Final accounting for one run. `success + failure == total` always holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

/// Incremental progress, emitted every `progress_every` recipients and once
/// at the end of the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastProgress {
    pub attempted: usize,
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct BroadcastConfig {
    /// Fixed pause between recipients (transport rate-limit policy).
    pub per_recipient_delay: Duration,
    /// Progress callback cadence; 0 disables intermediate reports.
    pub progress_every: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            per_recipient_delay: Duration::from_millis(100),
            progress_every: 10,
        }
    }
}

pub struct BroadcastDispatcher {
    directory: Arc<dyn UserDirectory>,
    messenger: Arc<dyn MessagingPort>,
    cfg: BroadcastConfig,
}

impl BroadcastDispatcher {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        messenger: Arc<dyn MessagingPort>,
        cfg: BroadcastConfig,
    ) -> Self {
        Self {
            directory,
            messenger,
            cfg,
        }
    }

    pub async fn send(&self, html: &str) -> Result<BroadcastReport> {
        self.send_with_progress(html, &mut |_| {}).await
    }

    /// Deliver `html` to every eligible user.
    ///
    /// The recipient set is fixed at the start of the run; directory changes
    /// made while the run is in flight do not affect it. One recipient's
    /// failure never stops delivery to the rest. Only the initial directory
    /// snapshot can fail the run.
    pub async fn send_with_progress(
        &self,
        html: &str,
        on_progress: &mut (dyn FnMut(BroadcastProgress) + Send),
    ) -> Result<BroadcastReport> {
        let recipients = self.directory.list_eligible().await?;
        let total = recipients.len();
        info!(total, "broadcast started");

        let mut success = 0usize;
        let mut failure = 0usize;

        for (idx, user_id) in recipients.iter().enumerate() {
            match self.messenger.notify(user_id.chat(), html, None).await {
                Ok(outcome) if outcome.is_delivered() => success += 1,
                Ok(outcome) => {
                    failure += 1;
                    warn!(user = user_id.0, ?outcome, "broadcast recipient skipped");
                }
                Err(e) => {
                    failure += 1;
                    warn!(user = user_id.0, "broadcast delivery failed: {e}");
                }
            }

            let attempted = idx + 1;
            let at_cadence =
                self.cfg.progress_every > 0 && attempted % self.cfg.progress_every == 0;
            if at_cadence || attempted == total {
                on_progress(BroadcastProgress {
                    attempted,
                    total,
                    success,
                    failure,
                });
            }

            if attempted < total && !self.cfg.per_recipient_delay.is_zero() {
                sleep(self.cfg.per_recipient_delay).await;
            }
        }

        info!(total, success, failure, "broadcast finished");
        Ok(BroadcastReport {
            total,
            success,
            failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, MessageId, MessageRef, UserId},
        messaging::types::{
            DeliveryOutcome, InlineKeyboard, MessagingCapabilities,
        },
        store::{json::JsonStore, UserProfile},
        Error,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted transport: failures keyed by chat id.
    #[derive(Default)]
    struct FakeTransport {
        blocked: Vec<i64>,
        erroring: Vec<i64>,
        sent: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl MessagingPort for FakeTransport {
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
            _html: &str,
            _keyboard: Option<InlineKeyboard>,
        ) -> Result<DeliveryOutcome> {
            self.sent.lock().unwrap().push(chat_id.0);
            if self.erroring.contains(&chat_id.0) {
                return Err(Error::External("boom".to_string()));
            }
            if self.blocked.contains(&chat_id.0) {
                return Ok(DeliveryOutcome::Blocked);
            }
            Ok(DeliveryOutcome::Delivered)
        }
    }

    async fn directory_with_users(ids: &[i64]) -> Arc<JsonStore> {
        let store = Arc::new(JsonStore::in_memory());
        for &id in ids {
            store
                .upsert(UserProfile {
                    id: UserId(id),
                    display_name: None,
                    handle: None,
                })
                .await
                .unwrap();
        }
        store
    }

    fn dispatcher(store: Arc<JsonStore>, transport: Arc<FakeTransport>) -> BroadcastDispatcher {
        BroadcastDispatcher::new(
            store,
            transport,
            BroadcastConfig {
                per_recipient_delay: Duration::ZERO,
                progress_every: 2,
            },
        )
    }

    #[tokio::test]
    async fn accounting_with_one_forced_failure() {
        // 3 eligible users, one delivery fails: total=3, success=2, failure=1.
        let store = directory_with_users(&[1, 2, 3]).await;
        let transport = Arc::new(FakeTransport {
            blocked: vec![2],
            ..Default::default()
        });

        let report = dispatcher(store, transport.clone()).send("hi").await.unwrap();
        assert_eq!(
            report,
            BroadcastReport {
                total: 3,
                success: 2,
                failure: 1,
            }
        );
        // The failed recipient did not stop the rest.
        assert_eq!(*transport.sent.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn transport_errors_count_as_failures() {
        let store = directory_with_users(&[1, 2, 3, 4]).await;
        let transport = Arc::new(FakeTransport {
            erroring: vec![1, 4],
            ..Default::default()
        });

        let report = dispatcher(store, transport).send("hi").await.unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.success, 2);
        assert_eq!(report.failure, 2);
        assert_eq!(report.success + report.failure, report.total);
    }

    #[tokio::test]
    async fn banned_users_are_excluded_from_the_snapshot() {
        let store = directory_with_users(&[1, 2, 3]).await;
        store.set_banned(UserId(2), true).await.unwrap();
        let transport = Arc::new(FakeTransport::default());

        let report = dispatcher(store, transport.clone()).send("hi").await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(*transport.sent.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn progress_fires_at_cadence_and_at_the_end() {
        let store = directory_with_users(&[1, 2, 3, 4, 5]).await;
        let transport = Arc::new(FakeTransport::default());

        let mut seen = Vec::new();
        dispatcher(store, transport)
            .send_with_progress("hi", &mut |p| seen.push(p))
            .await
            .unwrap();

        // progress_every = 2 over 5 recipients: after 2, 4, and the final 5.
        assert_eq!(
            seen.iter().map(|p| p.attempted).collect::<Vec<_>>(),
            vec![2, 4, 5]
        );
        let last = seen.last().unwrap();
        assert_eq!(last.success + last.failure, last.total);
    }

    #[tokio::test]
    async fn empty_directory_reports_zeroes() {
        let store = directory_with_users(&[]).await;
        let transport = Arc::new(FakeTransport::default());

        let report = dispatcher(store, transport).send("hi").await.unwrap();
        assert_eq!(report, BroadcastReport::default());
    }
}
