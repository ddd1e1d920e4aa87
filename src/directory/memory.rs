use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{DirectoryError, NewUser, UserAccount, UserDirectory};

/// In-process directory for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<Uuid, UserAccount>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, UserAccount>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError> {
        Ok(self
            .lock()
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, DirectoryError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn update_password(&self, id: Uuid, new_hash: &str) -> Result<(), DirectoryError> {
        let mut users = self.lock();
        let account = users.get_mut(&id).ok_or(DirectoryError::NotFound)?;
        account.password_hash = new_hash.to_string();
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<Uuid, DirectoryError> {
        let mut users = self.lock();
        if users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(DirectoryError::UsernameTaken);
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        users.insert(
            id,
            UserAccount {
                id,
                username: user.username,
                email_address: user.email_address,
                first_name: user.first_name,
                last_name: user.last_name,
                phone_number: user.phone_number,
                password_hash: user.password_hash,
                roles: user.roles,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email_address: format!("{}@example.com", username),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            phone_number: None,
            password_hash: "hash".to_string(),
            roles: vec!["user".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let directory = MemoryUserDirectory::new();
        let id = directory.create_user(new_user("alice")).await.unwrap();

        let by_name = directory.find_by_username("Alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, id);
        assert_eq!(directory.find_by_id(id).await.unwrap(), Some(by_name));
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let directory = MemoryUserDirectory::new();
        directory.create_user(new_user("bob")).await.unwrap();
        assert_eq!(
            directory.create_user(new_user("BOB")).await,
            Err(DirectoryError::UsernameTaken)
        );
    }

    #[tokio::test]
    async fn test_update_password_missing_user() {
        let directory = MemoryUserDirectory::new();
        assert_eq!(
            directory.update_password(Uuid::new_v4(), "x").await,
            Err(DirectoryError::NotFound)
        );
    }
}
