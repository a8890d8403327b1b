use crate::error::{AppError, Result};
use crate::models::{CreateUser, User};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory user directory. Signaling only ever consumes the identifiers
/// this hands out; the records themselves are not durable across restarts.
#[derive(Clone)]
pub struct UserDirectory {
    records: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, input: CreateUser) -> Result<User> {
        if input.name.trim().is_empty() {
            return Err(AppError::BadRequest("Name must not be empty".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: input.name,
            created_at: Utc::now(),
        };

        self.records.write().await.insert(user.id, user.clone());

        Ok(user)
    }

    pub async fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.records.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        users
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        self.records.write().await.remove(&id).is_some()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}
