use crate::error::{AppError, Result};
use crate::models::{CreateMeeting, Meeting};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory meeting directory. Live signaling state for a meeting is kept
/// separately by the coordinator; this only tracks the directory records.
#[derive(Clone)]
pub struct MeetingDirectory {
    records: Arc<RwLock<HashMap<Uuid, Meeting>>>,
}

impl MeetingDirectory {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, input: CreateMeeting) -> Result<Meeting> {
        if input.title.trim().is_empty() {
            return Err(AppError::BadRequest("Title must not be empty".to_string()));
        }

        let meeting = Meeting {
            id: Uuid::new_v4(),
            title: input.title,
            host_user_id: input.host_user_id,
            created_at: Utc::now(),
            ended_at: None,
        };

        self.records.write().await.insert(meeting.id, meeting.clone());

        Ok(meeting)
    }

    pub async fn list(&self) -> Vec<Meeting> {
        let mut meetings: Vec<Meeting> = self.records.read().await.values().cloned().collect();
        meetings.sort_by_key(|m| m.created_at);
        meetings
    }

    pub async fn get(&self, id: Uuid) -> Result<Meeting> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Meeting not found".to_string()))
    }

    /// Marks the meeting ended. Ending an already-ended meeting keeps the
    /// original timestamp.
    pub async fn end(&self, id: Uuid) -> Result<Meeting> {
        let mut records = self.records.write().await;
        let meeting = records
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Meeting not found".to_string()))?;

        if meeting.ended_at.is_none() {
            meeting.ended_at = Some(Utc::now());
        }

        Ok(meeting.clone())
    }
}

impl Default for MeetingDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn end_is_idempotent() {
        let directory = MeetingDirectory::new();

        let meeting = directory
            .create(CreateMeeting {
                title: "standup".to_string(),
                host_user_id: None,
            })
            .await
            .unwrap();
        assert!(meeting.ended_at.is_none());

        let ended = directory.end(meeting.id).await.unwrap();
        let first_ended_at = ended.ended_at.unwrap();

        let ended_again = directory.end(meeting.id).await.unwrap();
        assert_eq!(ended_again.ended_at.unwrap(), first_ended_at);
    }

    #[tokio::test]
    async fn get_unknown_meeting_is_not_found() {
        let directory = MeetingDirectory::new();
        assert!(directory.get(Uuid::new_v4()).await.is_err());
    }
}
