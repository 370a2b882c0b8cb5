/// Inline keyboard attached to an outgoing message.
///
/// Rows are rendered as-is; most menus here use one or two buttons per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// One button per row.
    pub fn column(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }
}

/// Per-recipient delivery result for best-effort sends.
///
/// Anything other than `Delivered` is recorded as a failure by callers,
/// never escalated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The recipient blocked the bot or the account is gone.
    Blocked,
    /// Transport rejected the send for an unclassified reason.
    Undeliverable,
}

impl DeliveryOutcome {
    pub fn is_delivered(self) -> bool {
        self == DeliveryOutcome::Delivered
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_edit: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
}
