//! JSON snapshot backend for [`TicketStore`] and [`UserDirectory`].
//!
//! One mutex-guarded state holds both tables, so every operation (including
//! counts) observes a consistent snapshot. Durability is a whole-document
//! write to a temp file followed by an atomic rename; a failed persist leaves
//! the in-memory state untouched, so no partial write ever becomes visible.

use std::{collections::BTreeMap, fs, path::PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{TicketId, UserId},
    errors::Error,
    store::{
        CasOutcome, ClaimState, StatusFilter, Ticket, TicketStatus, TicketStore,
        TicketTransition, User, UserDirectory, UserProfile,
    },
    Result,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_ticket_id: u64,
    tickets: BTreeMap<u64, Ticket>,
    users: BTreeMap<i64, User>,
}

pub struct JsonStore {
    snap: Mutex<Snapshot>,
    path: Option<PathBuf>,
}

impl JsonStore {
    /// Volatile store (tests, ephemeral runs).
    pub fn in_memory() -> Self {
        Self {
            snap: Mutex::new(Snapshot::default()),
            path: None,
        }
    }

    /// Open (or create) a durable store at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        let snap = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                Error::Storage(format!("corrupt store file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "read store file {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            snap: Mutex::new(snap),
            path: Some(path),
        })
    }

    /// Mutate a working copy, persist it, then publish it. State is small
    /// (one JSON document), so copying per write is cheaper than recovery
    /// logic for half-applied mutations.
    async fn mutate<T>(&self, apply: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut guard = self.snap.lock().await;
        let mut next = guard.clone();
        let out = apply(&mut next)?;
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *guard = next;
        Ok(out)
    }
}

fn persist(path: &PathBuf, snap: &Snapshot) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(snap)
        .map_err(|e| Error::Storage(format!("encode store snapshot: {e}")))?;
    fs::write(&tmp, bytes)
        .map_err(|e| Error::Storage(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::Storage(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl TicketStore for JsonStore {
    async fn create(&self, user_id: UserId, question: &str) -> Result<Ticket> {
        let question = question.to_string();
        self.mutate(|snap| {
            snap.next_ticket_id += 1;
            let id = TicketId(snap.next_ticket_id);
            let ticket = Ticket {
                id,
                user_id,
                question,
                status: TicketStatus::Open,
                claimed_by: None,
                answer: None,
                answered_by: None,
                created_at: Utc::now(),
                answered_at: None,
            };
            snap.tickets.insert(id.0, ticket.clone());
            Ok(ticket)
        })
        .await
    }

    async fn get(&self, id: TicketId) -> Result<Ticket> {
        let guard = self.snap.lock().await;
        guard
            .tickets
            .get(&id.0)
            .cloned()
            .ok_or(Error::TicketNotFound(id))
    }

    async fn list(&self, filter: StatusFilter, limit: usize) -> Result<Vec<Ticket>> {
        let guard = self.snap.lock().await;
        // Ids are assigned monotonically, so BTreeMap order is insertion
        // (= created_at) order.
        Ok(guard
            .tickets
            .values()
            .filter(|t| filter.matches(t.status))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Ticket>> {
        let guard = self.snap.lock().await;
        Ok(guard
            .tickets
            .values()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: StatusFilter) -> Result<u64> {
        let guard = self.snap.lock().await;
        Ok(guard
            .tickets
            .values()
            .filter(|t| filter.matches(t.status))
            .count() as u64)
    }

    async fn transition(
        &self,
        id: TicketId,
        expected: ClaimState,
        next: TicketTransition,
    ) -> Result<CasOutcome> {
        self.mutate(|snap| {
            let ticket = snap
                .tickets
                .get_mut(&id.0)
                .ok_or(Error::TicketNotFound(id))?;

            if ticket.claim_state() != expected {
                return Ok(CasOutcome::Conflict(ticket.clone()));
            }

            match next {
                TicketTransition::Claim { admin } => {
                    ticket.status = TicketStatus::InProgress;
                    ticket.claimed_by = Some(admin);
                }
                TicketTransition::Release => {
                    ticket.status = TicketStatus::Open;
                    ticket.claimed_by = None;
                }
                TicketTransition::Answer { admin, text } => {
                    ticket.status = TicketStatus::Answered;
                    ticket.answer = Some(text);
                    ticket.answered_by = Some(admin);
                    ticket.claimed_by = None;
                    ticket.answered_at = Some(Utc::now());
                }
            }

            Ok(CasOutcome::Applied(ticket.clone()))
        })
        .await
    }
}

#[async_trait]
impl UserDirectory for JsonStore {
    async fn upsert(&self, profile: UserProfile) -> Result<User> {
        self.mutate(|snap| {
            let user = snap
                .users
                .entry(profile.id.0)
                .and_modify(|u| {
                    u.display_name = profile.display_name.clone();
                    u.handle = profile.handle.clone();
                })
                .or_insert_with(|| User {
                    id: profile.id,
                    display_name: profile.display_name.clone(),
                    handle: profile.handle.clone(),
                    banned: false,
                    registered_at: Utc::now(),
                });
            Ok(user.clone())
        })
        .await
    }

    async fn get(&self, id: UserId) -> Result<User> {
        let guard = self.snap.lock().await;
        guard
            .users
            .get(&id.0)
            .cloned()
            .ok_or(Error::UserNotFound(id))
    }

    async fn set_banned(&self, id: UserId, banned: bool) -> Result<User> {
        self.mutate(|snap| {
            let user = snap.users.get_mut(&id.0).ok_or(Error::UserNotFound(id))?;
            user.banned = banned;
            Ok(user.clone())
        })
        .await
    }

    async fn is_banned(&self, id: UserId) -> Result<bool> {
        let guard = self.snap.lock().await;
        Ok(guard.users.get(&id.0).map(|u| u.banned).unwrap_or(false))
    }

    async fn list_eligible(&self) -> Result<Vec<UserId>> {
        let guard = self.snap.lock().await;
        Ok(guard
            .users
            .values()
            .filter(|u| !u.banned)
            .map(|u| u.id)
            .collect())
    }

    async fn count_active(&self) -> Result<u64> {
        let guard = self.snap.lock().await;
        Ok(guard.users.values().filter(|u| !u.banned).count() as u64)
    }

    async fn count_banned(&self) -> Result<u64> {
        let guard = self.snap.lock().await;
        Ok(guard.users.values().filter(|u| u.banned).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AdminId;

    fn profile(id: i64, name: &str) -> UserProfile {
        UserProfile {
            id: UserId(id),
            display_name: Some(name.to_string()),
            handle: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_monotonic_ids_and_opens() {
        let store = JsonStore::in_memory();
        let a = store.create(UserId(1), "first?").await.unwrap();
        let b = store.create(UserId(2), "second?").await.unwrap();

        assert_eq!(a.id, TicketId(1));
        assert_eq!(b.id, TicketId(2));
        assert_eq!(a.status, TicketStatus::Open);
        assert_eq!(a.claimed_by, None);
        assert_eq!(a.answer, None);
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = JsonStore::in_memory();
        let err = TicketStore::get(&store, TicketId(99)).await.unwrap_err();
        assert!(matches!(err, Error::TicketNotFound(TicketId(99))));
    }

    #[tokio::test]
    async fn list_is_fifo_and_limited() {
        let store = JsonStore::in_memory();
        for i in 0..5 {
            store.create(UserId(1), &format!("q{i}")).await.unwrap();
        }

        let all = store.list(StatusFilter::All, 3).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].question, "q0");
        assert_eq!(all[2].question, "q2");
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = JsonStore::in_memory();
        let t = store.create(UserId(1), "q").await.unwrap();
        store.create(UserId(2), "still open").await.unwrap();

        store
            .transition(
                t.id,
                t.claim_state(),
                TicketTransition::Claim { admin: AdminId(7) },
            )
            .await
            .unwrap();

        let open = store
            .list(StatusFilter::Only(TicketStatus::Open), 10)
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].question, "still open");

        assert_eq!(
            store
                .count(StatusFilter::Only(TicketStatus::InProgress))
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.count(StatusFilter::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cas_applies_only_on_matching_state() {
        let store = JsonStore::in_memory();
        let t = store.create(UserId(1), "q").await.unwrap();
        let open = ClaimState {
            status: TicketStatus::Open,
            claimed_by: None,
        };

        let first = store
            .transition(t.id, open, TicketTransition::Claim { admin: AdminId(1) })
            .await
            .unwrap();
        assert!(matches!(first, CasOutcome::Applied(_)));

        // Second writer raced on the same expected state and must lose,
        // seeing the current record.
        let second = store
            .transition(t.id, open, TicketTransition::Claim { admin: AdminId(2) })
            .await
            .unwrap();
        match second {
            CasOutcome::Conflict(cur) => {
                assert_eq!(cur.status, TicketStatus::InProgress);
                assert_eq!(cur.claimed_by, Some(AdminId(1)));
            }
            CasOutcome::Applied(_) => panic!("conflicting claim must not apply"),
        }
    }

    #[tokio::test]
    async fn upsert_refreshes_profile_but_not_ban_state() {
        let store = JsonStore::in_memory();
        store.upsert(profile(5, "Alice")).await.unwrap();
        store.set_banned(UserId(5), true).await.unwrap();

        let updated = store.upsert(profile(5, "Alicia")).await.unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Alicia"));
        assert!(updated.banned);
    }

    #[tokio::test]
    async fn banned_users_are_not_eligible() {
        let store = JsonStore::in_memory();
        store.upsert(profile(1, "a")).await.unwrap();
        store.upsert(profile(2, "b")).await.unwrap();
        store.set_banned(UserId(2), true).await.unwrap();

        assert_eq!(store.list_eligible().await.unwrap(), vec![UserId(1)]);
        assert_eq!(store.count_active().await.unwrap(), 1);
        assert_eq!(store.count_banned().await.unwrap(), 1);
        assert!(store.is_banned(UserId(2)).await.unwrap());
        assert!(!store.is_banned(UserId(99)).await.unwrap());
    }

    #[tokio::test]
    async fn reopen_restores_tickets_and_users() {
        let path = std::env::temp_dir().join(format!("stb-store-{}.json", std::process::id()));
        let _ = fs::remove_file(&path);

        {
            let store = JsonStore::open(path.clone()).unwrap();
            store.upsert(profile(1, "Alice")).await.unwrap();
            let t = store.create(UserId(1), "persisted?").await.unwrap();
            store
                .transition(
                    t.id,
                    t.claim_state(),
                    TicketTransition::Claim { admin: AdminId(9) },
                )
                .await
                .unwrap();
        }

        let reopened = JsonStore::open(path.clone()).unwrap();
        let t = TicketStore::get(&reopened, TicketId(1)).await.unwrap();
        assert_eq!(t.question, "persisted?");
        assert_eq!(t.status, TicketStatus::InProgress);
        assert_eq!(t.claimed_by, Some(AdminId(9)));

        // Id assignment continues past the restored high-water mark.
        let next = reopened.create(UserId(1), "another").await.unwrap();
        assert_eq!(next.id, TicketId(2));

        let _ = fs::remove_file(&path);
    }
}
