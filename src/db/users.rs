//! User profiles with their three indexes.
//!
//! Layout:
//! - `["users", email]` holds the profile
//! - `["users_by_id", id]` maps to the email
//! - `["users_by_role", role, email]` maps to the email, for enumeration
//!
//! Every mutation writes all affected indexes in one atomic operation guarded
//! by the versionstamp of the profile entry.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use super::models::{normalize_email, UserProfile, UserRole};
use super::repository::{Versioned, WriteOutcome};
use crate::kv::{AtomicOperation, CommitResult, KvError, KvKey, KvStore};

const USERS: &str = "users";
const USERS_BY_ID: &str = "users_by_id";
const USERS_BY_ROLE: &str = "users_by_role";

fn email_key(email: &str) -> KvKey {
    KvKey::new([USERS, email])
}

fn id_key(id: &str) -> KvKey {
    KvKey::new([USERS_BY_ID, id])
}

fn role_key(role: UserRole, email: &str) -> KvKey {
    KvKey::new([USERS_BY_ROLE, role.as_str(), email])
}

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn KvStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn get_all(&self) -> Result<Vec<UserProfile>, KvError> {
        self.store
            .list(&KvKey::new([USERS]))
            .await?
            .iter()
            .map(|entry| entry.decode())
            .collect()
    }

    pub async fn count(&self) -> Result<usize, KvError> {
        Ok(self.store.list(&KvKey::new([USERS])).await?.len())
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserProfile>, KvError> {
        Ok(self.get_entry_by_email(email).await?.map(|v| v.value))
    }

    pub async fn get_entry_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Versioned<UserProfile>>, KvError> {
        match self.store.find(&email_key(&normalize_email(email))).await? {
            Some(entry) => Ok(Some(Versioned {
                value: entry.decode()?,
                versionstamp: entry.versionstamp,
            })),
            None => Ok(None),
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserProfile>, KvError> {
        Ok(self.get_entry_by_id(id).await?.map(|v| v.value))
    }

    pub async fn get_entry_by_id(&self, id: &str) -> Result<Option<Versioned<UserProfile>>, KvError> {
        let email: String = match self.store.find(&id_key(id)).await? {
            Some(entry) => entry.decode()?,
            None => return Ok(None),
        };
        self.get_entry_by_email(&email).await
    }

    pub async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserProfile>, KvError> {
        let index = self
            .store
            .list(&KvKey::new([USERS_BY_ROLE, role.as_str()]))
            .await?;

        let mut users = Vec::with_capacity(index.len());
        for entry in index {
            let email: String = entry.decode()?;
            match self.get_by_email(&email).await? {
                Some(user) => users.push(user),
                None => warn!(email = %email, role = %role, "Role index points at a missing user"),
            }
        }
        Ok(users)
    }

    pub async fn count_by_role(&self, role: UserRole) -> Result<usize, KvError> {
        Ok(self
            .store
            .list(&KvKey::new([USERS_BY_ROLE, role.as_str()]))
            .await?
            .len())
    }

    /// Insert a profile and all its indexes. `Conflict` if the email or id is taken.
    pub async fn create(&self, user: UserProfile) -> Result<WriteOutcome<UserProfile>, KvError> {
        let op = AtomicOperation::new()
            .check(email_key(&user.email), None)
            .check(id_key(&user.id), None)
            .set(email_key(&user.email), &user)?
            .set(id_key(&user.id), &user.email)?
            .set(role_key(user.role, &user.email), &user.email)?;

        Ok(match self.store.commit(op).await? {
            CommitResult::Committed(_) => WriteOutcome::Committed(user),
            CommitResult::CheckFailed => WriteOutcome::Conflict,
        })
    }

    /// Apply `f` to the profile with `id`. The email is the primary key and is
    /// restored if `f` changes it; a role change moves the role index.
    pub async fn modify<F>(&self, id: &str, f: F) -> Result<WriteOutcome<UserProfile>, KvError>
    where
        F: FnOnce(&mut UserProfile) + Send,
    {
        let Some(Versioned {
            value: original,
            versionstamp,
        }) = self.get_entry_by_id(id).await?
        else {
            return Ok(WriteOutcome::NotFound);
        };

        let mut user = original.clone();
        f(&mut user);
        user.id = original.id.clone();
        user.email = original.email.clone();
        user.updated_at = Utc::now();

        let mut op = AtomicOperation::new()
            .check(email_key(&user.email), Some(versionstamp))
            .set(email_key(&user.email), &user)?;
        if user.role != original.role {
            op = op
                .delete(role_key(original.role, &user.email))
                .set(role_key(user.role, &user.email), &user.email)?;
        }

        Ok(match self.store.commit(op).await? {
            CommitResult::Committed(_) => WriteOutcome::Committed(user),
            CommitResult::CheckFailed => WriteOutcome::Conflict,
        })
    }

    /// Remove the profile and every index in one commit.
    pub async fn delete(&self, id: &str) -> Result<WriteOutcome<UserProfile>, KvError> {
        let Some(current) = self.get_entry_by_id(id).await? else {
            return Ok(WriteOutcome::NotFound);
        };
        let user = current.value;

        let op = AtomicOperation::new()
            .check(email_key(&user.email), Some(current.versionstamp))
            .delete(email_key(&user.email))
            .delete(id_key(&user.id))
            .delete(role_key(user.role, &user.email));

        Ok(match self.store.commit(op).await? {
            CommitResult::Committed(_) => WriteOutcome::Committed(user),
            CommitResult::CheckFailed => WriteOutcome::Conflict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn repo() -> (UserRepository, Arc<dyn KvStore>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        (UserRepository::new(store.clone()), store)
    }

    fn psychologist(email: &str) -> UserProfile {
        UserProfile::new(email, "Dr. Test", UserRole::Psychologist, "hash".to_string())
    }

    #[tokio::test]
    async fn test_create_indexes_all_keys() {
        let (repo, _) = repo();
        let user = repo
            .create(psychologist("Psy@Clinic.test"))
            .await
            .unwrap()
            .committed()
            .unwrap();

        assert_eq!(user.email, "psy@clinic.test");
        assert!(repo.get_by_email("PSY@clinic.test").await.unwrap().is_some());
        assert_eq!(repo.get_by_id(&user.id).await.unwrap().unwrap().email, user.email);
        assert_eq!(repo.list_by_role(UserRole::Psychologist).await.unwrap().len(), 1);
        assert_eq!(repo.count_by_role(UserRole::Superadmin).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (repo, _) = repo();
        repo.create(psychologist("a@clinic.test")).await.unwrap();
        let outcome = repo.create(psychologist("a@clinic.test")).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_role_change_moves_index() {
        let (repo, _) = repo();
        let user = repo.create(psychologist("a@clinic.test")).await.unwrap().committed().unwrap();

        let updated = repo
            .modify(&user.id, |u| u.role = UserRole::Superadmin)
            .await
            .unwrap()
            .committed()
            .unwrap();

        assert_eq!(updated.role, UserRole::Superadmin);
        assert_eq!(repo.count_by_role(UserRole::Psychologist).await.unwrap(), 0);
        assert_eq!(repo.count_by_role(UserRole::Superadmin).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_modify_keeps_primary_key() {
        let (repo, _) = repo();
        let user = repo.create(psychologist("a@clinic.test")).await.unwrap().committed().unwrap();

        let updated = repo
            .modify(&user.id, |u| {
                u.email = "other@clinic.test".to_string();
                u.name = "Renamed".to_string();
            })
            .await
            .unwrap()
            .committed()
            .unwrap();

        assert_eq!(updated.email, "a@clinic.test");
        assert_eq!(updated.name, "Renamed");
    }

    #[tokio::test]
    async fn test_delete_cascades_indexes() {
        let (repo, store) = repo();
        let user = repo.create(psychologist("a@clinic.test")).await.unwrap().committed().unwrap();

        assert!(repo.delete(&user.id).await.unwrap().is_committed());

        assert!(repo.get_by_email("a@clinic.test").await.unwrap().is_none());
        assert!(store.get(&id_key(&user.id)).await.unwrap().is_none());
        assert!(store
            .get(&role_key(UserRole::Psychologist, "a@clinic.test"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.delete(&user.id).await.unwrap(), WriteOutcome::NotFound);
    }
}
