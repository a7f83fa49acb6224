//! Sealed metadata for tenant-scoped records.
//!
//! AES-256-GCM with a per-tenant key derived on demand from a root secret
//! and the tenant handle. The additional-authenticated-data field binds the
//! tenant handle and a record-type discriminator into the ciphertext, so
//! bytes lifted from one tenant's rows are useless under any other tenant's
//! session.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::tenant::TenantHandle;

/// AES-256-GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// Authentication tag size for GCM
pub const TAG_SIZE: usize = 16;

// Separates handle from record type inside the AAD. Neither side can
// contain it: handles are lowercase hex and record types are validated.
const AAD_SEPARATOR: u8 = 0x1f;

/// Persisted form of an encrypted metadata field. The tag is stored apart
/// from the ciphertext and recombined before decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub auth_tag: Vec<u8>,
    pub aad: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CodecError {
    /// Tag or AAD mismatch. Corruption or an attack; surfaced to callers as
    /// a generic denial.
    #[error("sealed record failed authentication")]
    TamperDetected,

    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("invalid record type: {0}")]
    RecordType(String),

    #[error("seal failure: {0}")]
    Seal(String),
}

/// Encrypts and authenticates metadata records bound to a tenant handle.
pub struct MetadataCodec {
    root_key: [u8; KEY_SIZE],
}

impl MetadataCodec {
    /// Build from a hex-encoded 32-byte root key.
    pub fn new(root_key_hex: &str) -> Result<Self, CodecError> {
        let decoded = hex::decode(root_key_hex.trim())
            .map_err(|e| CodecError::KeyMaterial(format!("root key is not hex: {}", e)))?;
        if decoded.len() != KEY_SIZE {
            return Err(CodecError::KeyMaterial(format!(
                "root key must be {} bytes, got {}",
                KEY_SIZE,
                decoded.len()
            )));
        }
        let mut root_key = [0u8; KEY_SIZE];
        root_key.copy_from_slice(&decoded);
        Ok(Self { root_key })
    }

    /// Generate a random root key as a hex string.
    pub fn generate_root_key_hex() -> String {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }

    /// Encrypt `plaintext` under the tenant's derived key. The nonce is
    /// generated here and nowhere else; callers cannot supply one.
    pub fn seal(
        &self,
        tenant: &TenantHandle,
        record_type: &str,
        plaintext: &[u8],
    ) -> Result<EncryptedRecord, CodecError> {
        validate_record_type(record_type)?;

        let key = self.tenant_key(tenant);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CodecError::Seal(format!("cipher init: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = build_aad(tenant, record_type);
        let mut sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| CodecError::Seal("encryption failed".to_string()))?;

        // aes-gcm appends the tag; persist it as its own field.
        let tag_at = sealed.len() - TAG_SIZE;
        let auth_tag = sealed.split_off(tag_at);

        Ok(EncryptedRecord {
            ciphertext: sealed,
            nonce: nonce_bytes.to_vec(),
            auth_tag,
            aad,
        })
    }

    /// Decrypt a sealed record under the *current* session's tenant handle.
    ///
    /// The expected AAD is recomputed from that handle and the stored record
    /// type; a record sealed under another tenant fails here before any
    /// plaintext exists.
    pub fn open(
        &self,
        tenant: &TenantHandle,
        record: &EncryptedRecord,
    ) -> Result<Vec<u8>, CodecError> {
        if record.nonce.len() != NONCE_SIZE || record.auth_tag.len() != TAG_SIZE {
            return Err(CodecError::TamperDetected);
        }

        let record_type = record_type_from_aad(&record.aad)?;
        let expected_aad = build_aad(tenant, record_type);
        if expected_aad != record.aad {
            return Err(CodecError::TamperDetected);
        }

        let key = self.tenant_key(tenant);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| CodecError::TamperDetected)?;

        let mut sealed = Vec::with_capacity(record.ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(&record.ciphertext);
        sealed.extend_from_slice(&record.auth_tag);

        // Decryption uses the recomputed AAD, not the stored one, so the
        // binding holds even if the comparison above were bypassed.
        cipher
            .decrypt(
                Nonce::from_slice(&record.nonce),
                Payload {
                    msg: &sealed,
                    aad: &expected_aad,
                },
            )
            .map_err(|_| CodecError::TamperDetected)
    }

    /// Per-tenant key: HMAC-SHA256(root, handle). Recomputed on demand,
    /// never persisted.
    fn tenant_key(&self, tenant: &TenantHandle) -> [u8; KEY_SIZE] {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.root_key)
            .expect("HMAC accepts keys of any length");
        mac.update(tenant.as_str().as_bytes());
        let digest = mac.finalize().into_bytes();
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        key
    }
}

fn build_aad(tenant: &TenantHandle, record_type: &str) -> Vec<u8> {
    let handle = tenant.as_str().as_bytes();
    let mut aad = Vec::with_capacity(handle.len() + 1 + record_type.len());
    aad.extend_from_slice(handle);
    aad.push(AAD_SEPARATOR);
    aad.extend_from_slice(record_type.as_bytes());
    aad
}

fn record_type_from_aad(aad: &[u8]) -> Result<&str, CodecError> {
    let sep = aad
        .iter()
        .position(|&b| b == AAD_SEPARATOR)
        .ok_or(CodecError::TamperDetected)?;
    std::str::from_utf8(&aad[sep + 1..]).map_err(|_| CodecError::TamperDetected)
}

fn validate_record_type(record_type: &str) -> Result<(), CodecError> {
    if record_type.is_empty()
        || !record_type
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
    {
        return Err(CodecError::RecordType(record_type.to_string()));
    }
    Ok(())
}
