//! Authoritative entity reads used by reconciliation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use vex_db::{DbError, Flag, Project, Token};

/// Upper bound on the flags rendered into one project snapshot.
pub const FLAG_PAGE_LIMIT: i64 = 1000;

/// Reads the current state of an entity by ID.
#[async_trait]
pub trait EntityReader: Send + Sync {
    async fn project(&self, id: Uuid) -> Result<Project, DbError>;

    /// The first `limit` flags of a project, ordered by key.
    async fn flags_for_project(&self, project_id: Uuid, limit: i64) -> Result<Vec<Flag>, DbError>;

    async fn token(&self, id: Uuid) -> Result<Token, DbError>;
}

/// Postgres-backed reader.
#[derive(Debug, Clone)]
pub struct PgEntityReader {
    pool: PgPool,
}

impl PgEntityReader {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityReader for PgEntityReader {
    async fn project(&self, id: Uuid) -> Result<Project, DbError> {
        Project::find_by_id(&self.pool, id).await
    }

    async fn flags_for_project(&self, project_id: Uuid, limit: i64) -> Result<Vec<Flag>, DbError> {
        Flag::list_by_project(&self.pool, project_id, limit, 0).await
    }

    async fn token(&self, id: Uuid) -> Result<Token, DbError> {
        Token::find_by_id(&self.pool, id).await
    }
}
