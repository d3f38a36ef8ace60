//! Credential store for custodied signing seeds
//!
//! Seeds for user wallets are encrypted at rest with AES-256-GCM under a
//! process-wide 32-byte master key; ciphertext, nonce and auth tag are
//! hex-encoded into separate wallet columns. Decrypted seeds sit in a
//! bounded TTL cache. The issuer seed comes from process configuration and
//! never touches storage or the cache.

use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use moka::future::Cache;
use rand::RngCore;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::debug;

use crate::entities::wallets;
use crate::models::ISSUER_WALLET_ID;

/// GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes
const TAG_LEN: usize = 16;

/// Maximum number of decrypted seeds kept in memory
const CACHE_CAPACITY: u64 = 10_000;

/// Errors from credential operations
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Wallet not found: {0}")]
    NotFound(String),

    #[error("Credential integrity failure: {0}")]
    Integrity(String),

    #[error("Credential configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

/// Encrypted seed material as stored on a wallet record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSeed {
    pub cipher_hex: String,
    pub nonce_hex: String,
    pub tag_hex: String,
}

/// Encrypt a seed under the master key with a fresh random nonce.
pub fn encrypt_seed(master_key: &[u8; 32], plaintext: &str) -> EncryptedSeed {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    // AES-GCM appends the tag to the ciphertext; split it back out so the
    // stored layout is (ciphertext, nonce, tag).
    let mut sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .expect("AES-GCM encryption is infallible for in-memory buffers");
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    EncryptedSeed {
        cipher_hex: hex::encode(sealed),
        nonce_hex: hex::encode(nonce_bytes),
        tag_hex: hex::encode(tag),
    }
}

/// Decrypt a stored seed. Any decode or authentication failure is an
/// integrity error; the record cannot be trusted.
pub fn decrypt_seed(
    master_key: &[u8; 32],
    sealed: &EncryptedSeed,
) -> Result<String, CredentialError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));

    let mut ciphertext =
        hex::decode(&sealed.cipher_hex).map_err(|e| CredentialError::Integrity(e.to_string()))?;
    let nonce_bytes =
        hex::decode(&sealed.nonce_hex).map_err(|e| CredentialError::Integrity(e.to_string()))?;
    let tag =
        hex::decode(&sealed.tag_hex).map_err(|e| CredentialError::Integrity(e.to_string()))?;

    if nonce_bytes.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(CredentialError::Integrity(
            "malformed nonce or auth tag".to_string(),
        ));
    }

    ciphertext.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload::from(ciphertext.as_slice()),
        )
        .map_err(|_| CredentialError::Integrity("seed decryption failed".to_string()))?;

    String::from_utf8(plaintext).map_err(|e| CredentialError::Integrity(e.to_string()))
}

/// Mediates all access to signing seeds.
#[derive(Clone)]
pub struct CredentialStore {
    db: DatabaseConnection,
    master_key: [u8; 32],
    issuer_seed: String,
    cache: Cache<String, String>,
}

impl CredentialStore {
    pub fn new(
        db: DatabaseConnection,
        master_key: [u8; 32],
        issuer_seed: String,
        cache_ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(cache_ttl)
            .build();

        Self {
            db,
            master_key,
            issuer_seed,
            cache,
        }
    }

    /// Fetch the plaintext seed for a wallet identity.
    ///
    /// The reserved identifier "issuer" resolves to the configured issuer
    /// seed without consulting storage or the cache.
    pub async fn fetch_seed(&self, wallet_id: &str) -> Result<String, CredentialError> {
        if wallet_id == ISSUER_WALLET_ID {
            if self.issuer_seed.is_empty() {
                return Err(CredentialError::Configuration(
                    "issuer seed is not configured".to_string(),
                ));
            }
            return Ok(self.issuer_seed.clone());
        }

        if let Some(seed) = self.cache.get(wallet_id).await {
            debug!(wallet_id = %wallet_id, "Credential cache hit");
            return Ok(seed);
        }

        let wallet = wallets::Entity::find_by_id(wallet_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| CredentialError::NotFound(wallet_id.to_string()))?;

        let sealed = EncryptedSeed {
            cipher_hex: wallet.seed_cipher,
            nonce_hex: wallet.seed_nonce,
            tag_hex: wallet.seed_tag,
        };
        let seed = decrypt_seed(&self.master_key, &sealed)?;

        self.cache.insert(wallet_id.to_string(), seed.clone()).await;
        Ok(seed)
    }

    /// Encrypt and persist a new seed onto an existing wallet record.
    ///
    /// Rejected for the reserved identifier "issuer": the issuer seed lives
    /// only in process configuration.
    pub async fn store_seed(&self, wallet_id: &str, plaintext: &str) -> Result<(), CredentialError> {
        if wallet_id == ISSUER_WALLET_ID {
            return Err(CredentialError::Configuration(
                "the issuer seed cannot be stored".to_string(),
            ));
        }

        let wallet = wallets::Entity::find_by_id(wallet_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| CredentialError::NotFound(wallet_id.to_string()))?;

        let sealed = encrypt_seed(&self.master_key, plaintext);
        let mut active: wallets::ActiveModel = wallet.into();
        active.seed_cipher = Set(sealed.cipher_hex);
        active.seed_nonce = Set(sealed.nonce_hex);
        active.seed_tag = Set(sealed.tag_hex);
        active.updated_at = Set(chrono::Utc::now().into());
        active.update(&self.db).await?;

        self.cache.invalidate(wallet_id).await;
        Ok(())
    }

    /// Encrypt a seed without touching storage (used when creating the
    /// wallet row itself).
    pub fn seal(&self, plaintext: &str) -> EncryptedSeed {
        encrypt_seed(&self.master_key, plaintext)
    }

    /// Evict one identity from the cache. Storage is untouched.
    pub async fn clear(&self, wallet_id: &str) {
        self.cache.invalidate(wallet_id).await;
    }

    /// Evict every cached seed. Storage is untouched.
    pub fn clear_all(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let master = key(0x11);
        let sealed = encrypt_seed(&master, "sEd7rBGm5kxzauRTAV2hbsNz7N45X91");
        let plain = decrypt_seed(&master, &sealed).unwrap();
        assert_eq!(plain, "sEd7rBGm5kxzauRTAV2hbsNz7N45X91");
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let master = key(0x11);
        let a = encrypt_seed(&master, "same-seed");
        let b = encrypt_seed(&master, "same-seed");
        assert_ne!(a.nonce_hex, b.nonce_hex);
        assert_ne!(a.cipher_hex, b.cipher_hex);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let sealed = encrypt_seed(&key(0x11), "topsecret");
        let result = decrypt_seed(&key(0x22), &sealed);
        assert!(matches!(result, Err(CredentialError::Integrity(_))));
    }

    #[test]
    fn test_decrypt_tampered_ciphertext_fails() {
        let master = key(0x11);
        let mut sealed = encrypt_seed(&master, "topsecret");
        let mut bytes = hex::decode(&sealed.cipher_hex).unwrap();
        bytes[0] ^= 0xff;
        sealed.cipher_hex = hex::encode(bytes);
        assert!(matches!(
            decrypt_seed(&master, &sealed),
            Err(CredentialError::Integrity(_))
        ));
    }

    #[test]
    fn test_decrypt_tampered_tag_fails() {
        let master = key(0x11);
        let mut sealed = encrypt_seed(&master, "topsecret");
        let mut tag = hex::decode(&sealed.tag_hex).unwrap();
        tag[0] ^= 0xff;
        sealed.tag_hex = hex::encode(tag);
        assert!(matches!(
            decrypt_seed(&master, &sealed),
            Err(CredentialError::Integrity(_))
        ));
    }
}
