//! Operator-facing counters.

use crate::{
    store::{StatusFilter, TicketStatus, TicketStore, UserDirectory},
    Result,
};

/// Counts for the admin stats view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub open: u64,
    pub in_progress: u64,
    pub answered: u64,
    pub total_tickets: u64,
    pub active_users: u64,
    pub banned_users: u64,
}

pub async fn gather(
    tickets: &dyn TicketStore,
    directory: &dyn UserDirectory,
) -> Result<StatsSnapshot> {
    Ok(StatsSnapshot {
        open: tickets.count(StatusFilter::Only(TicketStatus::Open)).await?,
        in_progress: tickets
            .count(StatusFilter::Only(TicketStatus::InProgress))
            .await?,
        answered: tickets
            .count(StatusFilter::Only(TicketStatus::Answered))
            .await?,
        total_tickets: tickets.count(StatusFilter::All).await?,
        active_users: directory.count_active().await?,
        banned_users: directory.count_banned().await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        claim::ClaimCoordinator,
        domain::{AdminId, UserId},
        store::{json::JsonStore, UserProfile},
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn stats_reflect_store_state() {
        let store = Arc::new(JsonStore::in_memory());
        let coord = ClaimCoordinator::new(store.clone());

        for id in 1..=3 {
            store
                .upsert(UserProfile {
                    id: UserId(id),
                    display_name: None,
                    handle: None,
                })
                .await
                .unwrap();
        }
        store.set_banned(UserId(3), true).await.unwrap();

        let t1 = store.create(UserId(1), "q1").await.unwrap();
        let t2 = store.create(UserId(2), "q2").await.unwrap();
        store.create(UserId(1), "q3").await.unwrap();
        coord.claim(t1.id, AdminId(9)).await.unwrap();
        coord.claim(t2.id, AdminId(9)).await.unwrap();
        coord.answer(t2.id, AdminId(9), "a2").await.unwrap();

        let stats = gather(store.as_ref(), store.as_ref()).await.unwrap();
        assert_eq!(
            stats,
            StatsSnapshot {
                open: 1,
                in_progress: 1,
                answered: 1,
                total_tickets: 3,
                active_users: 2,
                banned_users: 1,
            }
        );
    }
}
