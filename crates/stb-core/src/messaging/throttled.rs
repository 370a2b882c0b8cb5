//! Rate-limiting decorator for a [`MessagingPort`].
//!
//! Chat transports throttle bots (Telegram allows roughly one message per
//! second per chat and ~30/sec overall). Question alerts fan out to every
//! admin and broadcasts to every user, so outbound calls are paced here with
//! a global and a per-chat minimum interval rather than at each call site.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{DeliveryOutcome, InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound API calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls targeting the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

/// Reserves evenly spaced send slots.
#[derive(Debug)]
struct Pacer {
    interval: Duration,
    next_slot: Instant,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Instant::now(),
        }
    }

    /// Claim the next slot and return how long to wait before using it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next_slot {
            now
        } else {
            self.next_slot
        };
        self.next_slot = start + self.interval;
        start.saturating_duration_since(now)
    }
}

pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<Pacer>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<Pacer>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(Pacer::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn pace_chat(&self, chat_id: ChatId) {
        let global_wait = { self.global.lock().await.reserve() };

        let pacer = {
            let mut map = self.per_chat.lock().await;
            map.entry(chat_id.0)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(Pacer::new(self.cfg.per_chat_min_interval)))
                })
                .clone()
        };
        let chat_wait = { pacer.lock().await.reserve() };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn pace_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace_chat(chat_id).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.pace_chat(msg.chat_id).await;
        self.inner.edit_html(msg, html).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.pace_chat(chat_id).await;
        self.inner.send_inline_keyboard(chat_id, html, keyboard).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // No chat id here; only the global pacer applies.
        self.pace_global().await;
        self.inner.answer_callback_query(callback_id, text).await
    }

    async fn notify(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<DeliveryOutcome> {
        self.pace_chat(chat_id).await;
        self.inner.notify(chat_id, html, keyboard).await
    }
}
