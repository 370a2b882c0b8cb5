use crate::domain::{AdminId, TicketId, UserId};

/// Core error type.
///
/// Ticket-state variants (`AlreadyClaimed`, `AlreadyAnswered`,
/// `NotClaimedByYou`) are expected concurrent-use outcomes, surfaced so the
/// operator UI can explain them; only `Storage` aborts the enclosing request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("ticket {ticket} is already claimed by admin {by}")]
    AlreadyClaimed { ticket: TicketId, by: AdminId },

    #[error("ticket {0} is already answered")]
    AlreadyAnswered(TicketId),

    #[error("ticket {0} is not claimed by you")]
    NotClaimedByYou(TicketId),

    #[error("user {0} is banned")]
    Banned(UserId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
