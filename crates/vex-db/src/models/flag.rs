//! Flag model.
//!
//! Flag values are stored as opaque strings; the type tag says how an edge
//! reader should interpret them. Values are only checked here, at write time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// How a flag's string value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlagType {
    String,
    Boolean,
    Number,
}

impl FlagType {
    /// Wire and column representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Number => "NUMBER",
        }
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRING" => Ok(Self::String),
            "BOOLEAN" => Ok(Self::Boolean),
            "NUMBER" => Ok(Self::Number),
            other => Err(DbError::ValidationFailed(format!(
                "invalid flag type: {other}"
            ))),
        }
    }
}

/// A single feature flag belonging to a project.
///
/// This is also the record carried in flag provisioning messages, so the
/// serde field names are part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub id: Uuid,
    pub project_id: Uuid,
    pub account_id: Uuid,
    pub key: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_on: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct FlagRow {
    id: Uuid,
    project_id: Uuid,
    account_id: Uuid,
    flag_key: String,
    flag_type: String,
    flag_value: String,
    created_on: DateTime<Utc>,
    modified_on: DateTime<Utc>,
}

impl TryFrom<FlagRow> for Flag {
    type Error = DbError;

    fn try_from(row: FlagRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            account_id: row.account_id,
            key: row.flag_key,
            flag_type: row.flag_type.parse()?,
            value: row.flag_value,
            created_on: Some(row.created_on),
            modified_on: Some(row.modified_on),
        })
    }
}

impl Flag {
    /// Check the write-time rules for a flag.
    ///
    /// BOOLEAN values must be exactly `true` or `false`; NUMBER values must
    /// parse as a 64-bit float; STRING values are unrestricted.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.project_id.is_nil() {
            return Err(DbError::ValidationFailed(
                "project id must not be empty".to_string(),
            ));
        }
        if self.key.is_empty() {
            return Err(DbError::ValidationFailed(
                "flag key must not be empty".to_string(),
            ));
        }
        match self.flag_type {
            FlagType::Boolean if self.value != "true" && self.value != "false" => Err(
                DbError::ValidationFailed("invalid value for boolean flag".to_string()),
            ),
            FlagType::Number if self.value.parse::<f64>().is_err() => Err(
                DbError::ValidationFailed("invalid value for number flag".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// List the flags of a project, ordered by key.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, FlagRow>(
            r"
            SELECT id, project_id, account_id, flag_key, flag_type, flag_value,
                   created_on, modified_on
            FROM flag
            WHERE project_id = $1
            ORDER BY flag_key
            OFFSET $2
            LIMIT $3
            ",
        )
        .bind(project_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| DbError::from_query(e, format!("flags of project {project_id}")))?;

        rows.into_iter().map(Flag::try_from).collect()
    }
}
