//! Access token model.
//!
//! Only the SHA-256 hash of a token secret is stored. Edge code authorizes a
//! bearer secret by hashing it and looking up the hex digest directly.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// Number of random bytes in a generated secret (hex-encoded to twice this).
pub const SECRET_BYTES: usize = 16;

/// An access token. The plaintext secret never leaves the creating request.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(skip)]
    pub token_hash: Vec<u8>,
    pub read_only: bool,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
}

impl Token {
    /// Get a token by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT id, account_id, token_hash, read_only, created_on, modified_on
            FROM token
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| DbError::from_query(e, format!("token {id}")))
    }

    /// Generate a new secret and its hash.
    #[must_use]
    pub fn generate_secret() -> (String, Vec<u8>) {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = hex::encode(bytes);
        let hash = Self::hash_secret(&secret);
        (secret, hash)
    }

    /// SHA-256 of the secret's text form.
    #[must_use]
    pub fn hash_secret(secret: &str) -> Vec<u8> {
        Sha256::digest(secret.as_bytes()).to_vec()
    }

    /// The edge store key for this token: lowercase hex of the hash.
    #[must_use]
    pub fn edge_key(&self) -> String {
        hex::encode(&self.token_hash)
    }
}
