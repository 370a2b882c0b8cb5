//! Persistence ports for tickets and users.
//!
//! The engine behind these traits is interchangeable (the crate ships a JSON
//! snapshot backend in [`json`]); the contract the core relies on is:
//! atomic writes, torn-read-free counts, and a compare-and-swap on the
//! `(status, claimed_by)` pair of a ticket.

pub mod json;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{AdminId, TicketId, UserId},
    Result,
};

/// Ticket lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Answered,
}

impl TicketStatus {
    pub fn label(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in progress",
            TicketStatus::Answered => "answered",
        }
    }
}

/// One user-submitted question and its eventual answer.
///
/// Invariants (enforced by routing every mutation through
/// `ClaimCoordinator` + [`TicketStore::transition`]):
/// - `Open`       => `claimed_by == None && answer == None`
/// - `InProgress` => `claimed_by == Some(_) && answer == None`
/// - `Answered`   => `answer == Some(_) && answered_by == Some(_)
///                    && claimed_by == None`, and the ticket is terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub user_id: UserId,
    pub question: String,
    pub status: TicketStatus,
    pub claimed_by: Option<AdminId>,
    pub answer: Option<String>,
    pub answered_by: Option<AdminId>,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// The pair the claim compare-and-swap is defined over.
    pub fn claim_state(&self) -> ClaimState {
        ClaimState {
            status: self.status,
            claimed_by: self.claimed_by,
        }
    }
}

/// The `(status, claimed_by)` pair a [`TicketStore::transition`] compares
/// against before applying a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimState {
    pub status: TicketStatus,
    pub claimed_by: Option<AdminId>,
}

/// The three writes that exist for a ticket after creation.
#[derive(Clone, Debug)]
pub enum TicketTransition {
    Claim { admin: AdminId },
    Release,
    Answer { admin: AdminId, text: String },
}

/// Result of a compare-and-swap write.
#[derive(Clone, Debug)]
pub enum CasOutcome {
    /// The expected state matched; the transition was applied atomically.
    Applied(Ticket),
    /// The ticket moved on; carries the current record for error reporting.
    Conflict(Ticket),
}

/// Status filter for list/count queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(TicketStatus),
}

impl StatusFilter {
    pub fn matches(self, status: TicketStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(s) => s == status,
        }
    }
}

/// Durable ticket records, queryable by status.
///
/// `transition` is the only write after `create`; callers other than
/// `ClaimCoordinator` must treat this trait as read-only.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create(&self, user_id: UserId, question: &str) -> Result<Ticket>;

    async fn get(&self, id: TicketId) -> Result<Ticket>;

    /// Tickets matching `filter`, oldest first (FIFO queue view), up to `limit`.
    async fn list(&self, filter: StatusFilter, limit: usize) -> Result<Vec<Ticket>>;

    /// One user's tickets, oldest first, up to `limit`.
    async fn list_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Ticket>>;

    async fn count(&self, filter: StatusFilter) -> Result<u64>;

    /// Apply `next` iff the ticket's `(status, claimed_by)` equals `expected`.
    async fn transition(
        &self,
        id: TicketId,
        expected: ClaimState,
        next: TicketTransition,
    ) -> Result<CasOutcome>;
}

/// A known end user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub banned: bool,
    pub registered_at: DateTime<Utc>,
}

impl User {
    /// Human-readable label for operator-facing messages.
    pub fn label(&self) -> String {
        match (&self.display_name, &self.handle) {
            (Some(name), Some(handle)) => format!("{name} (@{handle})"),
            (Some(name), None) => name.clone(),
            (None, Some(handle)) => format!("@{handle}"),
            (None, None) => self.id.to_string(),
        }
    }
}

/// Mutable profile attributes refreshed on every contact.
#[derive(Clone, Debug)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: Option<String>,
    pub handle: Option<String>,
}

/// Registry of end users and broadcast eligibility.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create on first sight, refresh `display_name`/`handle` afterwards.
    /// `banned` and `registered_at` are never touched by upsert.
    async fn upsert(&self, profile: UserProfile) -> Result<User>;

    async fn get(&self, id: UserId) -> Result<User>;

    async fn set_banned(&self, id: UserId, banned: bool) -> Result<User>;

    /// Unknown users are not banned.
    async fn is_banned(&self, id: UserId) -> Result<bool>;

    /// Snapshot of all non-banned user ids at call time.
    async fn list_eligible(&self) -> Result<Vec<UserId>>;

    async fn count_active(&self) -> Result<u64>;

    async fn count_banned(&self) -> Result<u64>;
}
