use crate::error::Result;
use crate::models::{CreateMeeting, Meeting};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

pub async fn create_meeting(
    State(state): State<AppState>,
    Json(input): Json<CreateMeeting>,
) -> Result<Json<Meeting>> {
    let meeting = state.meeting_directory.create(input).await?;
    Ok(Json(meeting))
}

pub async fn list_meetings(State(state): State<AppState>) -> Json<Vec<Meeting>> {
    Json(state.meeting_directory.list().await)
}

pub async fn get_meeting(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Meeting>> {
    let meeting = state.meeting_directory.get(id).await?;
    Ok(Json(meeting))
}

pub async fn end_meeting(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Meeting>> {
    let meeting = state.meeting_directory.end(id).await?;
    Ok(Json(meeting))
}
