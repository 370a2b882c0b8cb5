//! Claim coordination: the sole authority mutating ticket state.
//!
//! A claim is a per-ticket mutual-exclusion lock encoded directly in the
//! ticket's own `(status, claimed_by)` fields, so acquiring the lock and the
//! useful state transition are the same atomic store write. There is no
//! separate lock table and nothing to expire: an unanswered claim stays
//! `InProgress` until the same admin answers or releases it.

use std::sync::Arc;

use crate::{
    domain::{AdminId, TicketId},
    errors::Error,
    store::{CasOutcome, ClaimState, Ticket, TicketStatus, TicketStore, TicketTransition},
    Result,
};

pub struct ClaimCoordinator {
    store: Arc<dyn TicketStore>,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Take exclusive ownership of an `Open` ticket.
    ///
    /// Two admins racing on the same ticket both attempt the same
    /// compare-and-swap; exactly one applies, the other gets
    /// [`Error::AlreadyClaimed`] carrying the winner's id.
    pub async fn claim(&self, id: TicketId, admin: AdminId) -> Result<Ticket> {
        let expected = ClaimState {
            status: TicketStatus::Open,
            claimed_by: None,
        };
        let outcome = self
            .store
            .transition(id, expected, TicketTransition::Claim { admin })
            .await?;

        match outcome {
            CasOutcome::Applied(ticket) => Ok(ticket),
            CasOutcome::Conflict(current) => Err(claim_conflict(id, &current)),
        }
    }

    /// Release a claim held by `admin`, returning the ticket to `Open`.
    pub async fn unclaim(&self, id: TicketId, admin: AdminId) -> Result<Ticket> {
        let expected = ClaimState {
            status: TicketStatus::InProgress,
            claimed_by: Some(admin),
        };
        let outcome = self
            .store
            .transition(id, expected, TicketTransition::Release)
            .await?;

        match outcome {
            CasOutcome::Applied(ticket) => Ok(ticket),
            // Unclaimed, claimed by someone else, or already answered: the
            // caller's remedy is the same, so the rejection is too.
            CasOutcome::Conflict(_) => Err(Error::NotClaimedByYou(id)),
        }
    }

    /// Record the answer for a ticket claimed by `admin` and close it.
    ///
    /// The returned ticket carries `user_id` so the caller can route the
    /// reply to the asking user.
    pub async fn answer(&self, id: TicketId, admin: AdminId, text: &str) -> Result<Ticket> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("answer must not be empty".to_string()));
        }

        let expected = ClaimState {
            status: TicketStatus::InProgress,
            claimed_by: Some(admin),
        };
        let outcome = self
            .store
            .transition(
                id,
                expected,
                TicketTransition::Answer {
                    admin,
                    text: text.to_string(),
                },
            )
            .await?;

        match outcome {
            CasOutcome::Applied(ticket) => Ok(ticket),
            CasOutcome::Conflict(_) => Err(Error::NotClaimedByYou(id)),
        }
    }
}

fn claim_conflict(id: TicketId, current: &Ticket) -> Error {
    match (current.status, current.claimed_by) {
        (TicketStatus::Answered, _) => Error::AlreadyAnswered(id),
        // `by` may equal the requester if they tapped claim twice.
        (_, Some(by)) => Error::AlreadyClaimed { ticket: id, by },
        _ => Error::Storage(format!("ticket {id} has inconsistent claim state")),
    }
}
