//! Reconciliation: recompute an entity's edge record from authoritative state.
//!
//! Every operation is idempotent. Provisions rewrite the complete record and
//! deprovisions remove it, so replaying a message converges to the same edge
//! state as applying it once.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use vex_db::Flag;
use vex_edge::{EdgeStore, KvPair, Namespace};
use vex_events::Operation;

use crate::error::{ReconcileError, ReconcileResult};
use crate::reader::{EntityReader, FLAG_PAGE_LIMIT};
use crate::render::render_snapshot;

/// Length of a SHA-256 digest.
const HASH_BYTES: usize = 32;

/// Canonical edge key for a token hash: lowercase hex.
///
/// Accepts the hex form, in any case, or the raw 32-byte digest.
pub fn normalize_token_hash(raw: &[u8]) -> ReconcileResult<String> {
    let invalid = |reason: &str| ReconcileError::InvalidPayload {
        operation: Operation::DeprovisionToken,
        reason: reason.to_string(),
    };

    if let Ok(text) = std::str::from_utf8(raw) {
        let text = text.trim();
        if text.len() == HASH_BYTES * 2 {
            return match hex::decode(text) {
                Ok(bytes) => Ok(hex::encode(bytes)),
                Err(_) => Err(invalid("token hash is not hex")),
            };
        }
    }
    if raw.len() == HASH_BYTES {
        return Ok(hex::encode(raw));
    }
    Err(invalid("expected a 32-byte hash or its hex encoding"))
}

/// Pushes and removes edge records using an entity reader and an edge store.
#[derive(Clone)]
pub struct Reconciler {
    reader: Arc<dyn EntityReader>,
    edge: Arc<dyn EdgeStore>,
}

impl Reconciler {
    pub fn new(reader: Arc<dyn EntityReader>, edge: Arc<dyn EdgeStore>) -> Self {
        Self { reader, edge }
    }

    /// Write the full flag snapshot of a project, keyed by project ID.
    #[instrument(skip(self))]
    pub async fn provision_project(&self, project_id: Uuid) -> ReconcileResult<()> {
        let project = self.reader.project(project_id).await?;
        let flags = self
            .reader
            .flags_for_project(project_id, FLAG_PAGE_LIMIT)
            .await?;
        if i64::try_from(flags.len()).map_or(true, |n| n >= FLAG_PAGE_LIMIT) {
            warn!(
                limit = FLAG_PAGE_LIMIT,
                "Project has at least the flag page limit; snapshot may be truncated"
            );
        }

        let snapshot = render_snapshot(&flags)?;
        let entry = KvPair::new(project.id.to_string(), snapshot)
            .with_metadata(Value::String(project.account_id.to_string()));

        self.edge.write(Namespace::Projects, vec![entry]).await?;
        info!(flags = flags.len(), account_id = %project.account_id, "Project provisioned");
        Ok(())
    }

    /// Remove the project's snapshot.
    #[instrument(skip(self))]
    pub async fn deprovision_project(&self, project_id: Uuid) -> ReconcileResult<()> {
        self.edge
            .delete(Namespace::Projects, &project_id.to_string())
            .await?;
        info!("Project deprovisioned");
        Ok(())
    }

    /// Write the token record: hex hash → account ID.
    #[instrument(skip(self))]
    pub async fn provision_token(&self, token_id: Uuid) -> ReconcileResult<()> {
        let token = self.reader.token(token_id).await?;
        let entry = KvPair::new(token.edge_key(), token.account_id.to_string());

        self.edge.write(Namespace::Tokens, vec![entry]).await?;
        info!(account_id = %token.account_id, "Token provisioned");
        Ok(())
    }

    /// Remove a token record. Only the hash is needed.
    #[instrument(skip_all)]
    pub async fn deprovision_token(&self, token_hash: &[u8]) -> ReconcileResult<()> {
        let key = normalize_token_hash(token_hash)?;
        self.edge.delete(Namespace::Tokens, &key).await?;
        info!("Token deprovisioned");
        Ok(())
    }

    /// A flag changed: re-render its parent project.
    #[instrument(skip_all, fields(flag_id = %flag.id, project_id = %flag.project_id))]
    pub async fn provision_flag(&self, flag: &Flag) -> ReconcileResult<()> {
        self.rerender_parent(flag).await
    }

    /// A flag was removed: re-render its parent project without it.
    #[instrument(skip_all, fields(flag_id = %flag.id, project_id = %flag.project_id))]
    pub async fn deprovision_flag(&self, flag: &Flag) -> ReconcileResult<()> {
        self.rerender_parent(flag).await
    }

    async fn rerender_parent(&self, flag: &Flag) -> ReconcileResult<()> {
        match self.provision_project(flag.project_id).await {
            Err(ReconcileError::Db(e)) if e.is_not_found() => {
                debug!("Parent project is gone, removing its snapshot");
                self.deprovision_project(flag.project_id).await
            }
            other => other,
        }
    }
}
