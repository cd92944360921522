//! API-key lifecycle: generation, constant-time verification, revocation.
//!
//! Key material is `{prefix}{urlsafe-base64-secret}` where the prefix is
//! the first 8 characters and is unique. Only the SHA-256 of the secret is
//! stored; the plaintext key is shown once at creation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;

pub const PREFIX_LEN: usize = 8;
const SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub prefix: String,
    pub hashed_secret: [u8; 32],
    pub user_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct ApiKeyService {
    records: RwLock<HashMap<String, ApiKeyRecord>>,
}

fn hash_secret(secret: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(secret.as_bytes()));
    out
}

impl ApiKeyService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a key for a user. Returns the one-time plaintext and the
    /// stored record.
    pub fn generate(&self, user_id: &str) -> (String, ApiKeyRecord) {
        let mut rng = rand::thread_rng();

        let prefix = loop {
            let mut raw = [0u8; 6];
            rng.fill_bytes(&mut raw);
            let candidate = format!("sk{}", hex::encode(&raw[..3]));
            debug_assert_eq!(candidate.len(), PREFIX_LEN);
            if !self.records.read().contains_key(&candidate) {
                break candidate;
            }
        };

        let mut secret_bytes = [0u8; SECRET_LEN];
        rng.fill_bytes(&mut secret_bytes);
        let secret = URL_SAFE_NO_PAD.encode(secret_bytes);

        let record = ApiKeyRecord {
            prefix: prefix.clone(),
            hashed_secret: hash_secret(&secret),
            user_id: user_id.to_string(),
            is_active: true,
            created_at: Utc::now(),
            revoked_at: None,
        };
        self.records.write().insert(prefix.clone(), record.clone());

        (format!("{prefix}{secret}"), record)
    }

    /// Verify a presented key; returns the owning user id when valid.
    pub fn verify(&self, presented: &str) -> Option<String> {
        if presented.len() <= PREFIX_LEN {
            return None;
        }
        let (prefix, secret) = presented.split_at(PREFIX_LEN);
        let records = self.records.read();
        let record = records.get(prefix)?;
        if !record.is_active {
            return None;
        }
        let candidate = hash_secret(secret);
        if bool::from(candidate.ct_eq(&record.hashed_secret)) {
            Some(record.user_id.clone())
        } else {
            None
        }
    }

    /// Deactivate a key. Idempotent; returns false if the prefix is unknown.
    pub fn revoke(&self, prefix: &str) -> bool {
        let mut records = self.records.write();
        match records.get_mut(prefix) {
            Some(record) => {
                if record.is_active {
                    record.is_active = false;
                    record.revoked_at = Some(Utc::now());
                }
                true
            }
            None => false,
        }
    }

    /// Total number of issued keys (active or revoked).
    pub fn count(&self) -> usize {
        self.records.read().len()
    }

    pub fn list(&self, user_id: &str) -> Vec<ApiKeyRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}
