//! Cross-messenger abstractions (Telegram today; anything else later).

pub mod port;
pub mod throttled;
pub mod types;
