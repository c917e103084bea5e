use std::sync::Arc;

use async_trait::async_trait;
use nfa_storage::{NfaStorage, StorageError, UserRecord};
use serde::Serialize;

use crate::error::WorkflowError;
use crate::status::Role;

/// Addressing details for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub designation: Option<String>,
    pub roles: Vec<String>,
}

impl DirectoryEntry {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }
}

impl From<UserRecord> for DirectoryEntry {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            email: user.email,
            designation: user.designation,
            roles: user.roles,
        }
    }
}

/// Resolves user ids for notification addressing.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` when the user is unknown.
    async fn lookup(&self, user_id: &str) -> Result<Option<DirectoryEntry>, WorkflowError>;
}

/// Directory backed by the Users collection.
pub struct StorageDirectory<S> {
    storage: Arc<S>,
}

impl<S: NfaStorage> StorageDirectory<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Insert a user in its own snapshot.
    pub async fn register(&self, user: UserRecord) -> Result<(), WorkflowError> {
        let mut snap = self.storage.begin_snapshot().await?;
        if let Err(e) = self.storage.insert_user(&mut snap, user).await {
            let _ = self.storage.abort_snapshot(snap).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snap).await?;
        Ok(())
    }
}

#[async_trait]
impl<S: NfaStorage> UserDirectory for StorageDirectory<S> {
    async fn lookup(&self, user_id: &str) -> Result<Option<DirectoryEntry>, WorkflowError> {
        match self.storage.get_user(user_id).await {
            Ok(user) => Ok(Some(user.into())),
            Err(StorageError::UserNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfa_storage::MemoryStorage;

    fn user(id: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            username: id.to_string(),
            name: format!("User {id}"),
            email: format!("{id}@corp.example"),
            designation: Some("Manager".to_string()),
            department: None,
            roles: vec!["approver".to_string()],
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn registered_user_resolves() {
        let directory = StorageDirectory::new(Arc::new(MemoryStorage::new()));
        directory.register(user("carol")).await.unwrap();

        let entry = directory.lookup("carol").await.unwrap().unwrap();
        assert_eq!(entry.email, "carol@corp.example");
        assert_eq!(entry.designation.as_deref(), Some("Manager"));
        assert!(entry.has_role(Role::Approver));
        assert!(!entry.has_role(Role::Coordinator));
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let directory = StorageDirectory::new(Arc::new(MemoryStorage::new()));
        assert!(directory.lookup("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let directory = StorageDirectory::new(Arc::new(MemoryStorage::new()));
        directory.register(user("carol")).await.unwrap();
        let err = directory.register(user("carol")).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Storage(StorageError::AlreadyExists { .. })
        ));
    }
}
