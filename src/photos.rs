//! The shared photo wall the authenticated accounts curate.
//!
//! Reading is public; changing a caption or date requires a signed-in
//! identity from the session guard. Uploads live with the binary storage
//! collaborator, not here.

use crate::error::{AuthError, AuthResult};
use crate::session::SessionUser;
use crate::AuthContext;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Photo {
    pub id: i64,
    pub src: String,
    pub date: String,
    pub message: String,
    pub section: String,
    pub added_by: Option<String>,
    pub added_at: DateTime<Utc>,
    pub sort_order: i64,
}

#[derive(Debug, Deserialize)]
pub struct PhotoUpdate {
    pub message: Option<String>,
    pub date: Option<String>,
}

pub async fn list(pool: &SqlitePool) -> AuthResult<Vec<Photo>> {
    let photos = sqlx::query_as::<_, Photo>(
        "SELECT id, src, date, message, section, added_by, added_at, sort_order
         FROM photos
         ORDER BY sort_order ASC, added_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(photos)
}

pub async fn find(pool: &SqlitePool, id: i64) -> AuthResult<Option<Photo>> {
    let photo = sqlx::query_as::<_, Photo>(
        "SELECT id, src, date, message, section, added_by, added_at, sort_order
         FROM photos WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(photo)
}

pub async fn list_photos(State(ctx): State<AuthContext>) -> AuthResult<Json<Vec<Photo>>> {
    Ok(Json(list(&ctx.db).await?))
}

pub async fn update_photo(
    State(ctx): State<AuthContext>,
    Path(id): Path<i64>,
    Extension(user): Extension<SessionUser>,
    Json(update): Json<PhotoUpdate>,
) -> AuthResult<Json<Photo>> {
    if update.message.is_none() && update.date.is_none() {
        return Err(AuthError::BadRequest("Nothing to update".to_string()));
    }

    sqlx::query(
        "UPDATE photos
         SET message = COALESCE(?1, message), date = COALESCE(?2, date)
         WHERE id = ?3",
    )
    .bind(update.message)
    .bind(update.date)
    .bind(id)
    .execute(&ctx.db)
    .await?;

    let photo = find(&ctx.db, id)
        .await?
        .ok_or_else(|| AuthError::NotFound("Photo not found".to_string()))?;

    info!(photo = id, by = %user.username, "photo caption updated");

    Ok(Json(photo))
}
