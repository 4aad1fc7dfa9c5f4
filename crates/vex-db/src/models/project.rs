//! Project model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// A project groups flags; its edge representation is one snapshot record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub account_id: Uuid,
    #[sqlx(rename = "project_name")]
    pub name: String,
    #[sqlx(rename = "project_description")]
    pub description: String,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
}

impl Project {
    /// Get a project by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT id, account_id, project_name, project_description, created_on, modified_on
            FROM project
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| DbError::from_query(e, format!("project {id}")))
    }
}
