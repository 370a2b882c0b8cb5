use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{DeliveryOutcome, InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Cross-messenger port.
///
/// Telegram is the first implementation; the shape is kept small enough that
/// other chat transports can sit behind it with capability flags.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    /// Best-effort delivery to one recipient.
    ///
    /// Recipient-side rejection (blocked bot, deleted account) comes back as
    /// `Ok(Blocked)` / `Ok(Undeliverable)` so fan-out loops can account for
    /// it without aborting; `Err` is reserved for transport-level failures,
    /// which callers also record rather than propagate.
    async fn notify(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<DeliveryOutcome>;
}
