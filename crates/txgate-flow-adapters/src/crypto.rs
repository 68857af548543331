//! Vault primitives for the password collaborator: a password-derived key
//! unseals the signing secret, which in turn authorizes a bundle digest.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;

use alloy::primitives::{keccak256, B256};

use txgate_flow_core::TransactionDraft;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("randomness unavailable: {0}")]
    Random(String),
    #[error("key expansion failed")]
    KeyExpansion,
    #[error("seal failed: {0}")]
    Seal(String),
    #[error("unseal failed, wrong password or corrupt vault")]
    Unseal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfAlgorithm {
    Argon2idV1,
    Pbkdf2HmacSha256V1,
}

/// Password-sealed signing secret. The KDF actually used at seal time is
/// recorded so unseal re-derives with the same algorithm.
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub kdf: KdfAlgorithm,
    pub salt: [u8; 16],
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

pub fn generate_salt() -> Result<[u8; 16], CryptoError> {
    let mut salt = [0u8; 16];
    getrandom::getrandom(&mut salt).map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(salt)
}

pub fn generate_nonce() -> Result<[u8; 12], CryptoError> {
    let mut nonce = [0u8; 12];
    getrandom::getrandom(&mut nonce).map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(nonce)
}

pub fn seal_secret(password: &[u8], secret: &[u8]) -> Result<SealedSecret, CryptoError> {
    let salt = generate_salt()?;
    let nonce = generate_nonce()?;
    let (root, kdf) = derive_root_key(password, &salt, None).ok_or(CryptoError::Unseal)?;
    let enc_key = expand_enc_key(&root)?;
    let cipher =
        Aes256Gcm::new_from_slice(&enc_key).map_err(|e| CryptoError::Seal(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(&Nonce::<aes_gcm::aead::consts::U12>::from(nonce), secret)
        .map_err(|e| CryptoError::Seal(e.to_string()))?;
    Ok(SealedSecret {
        kdf,
        salt,
        nonce,
        ciphertext,
    })
}

/// Unseals the signing secret. AEAD authentication failure is the wrong
/// password signal.
pub fn open_secret(password: &[u8], sealed: &SealedSecret) -> Result<Vec<u8>, CryptoError> {
    let (root, _) =
        derive_root_key(password, &sealed.salt, Some(sealed.kdf)).ok_or(CryptoError::Unseal)?;
    let enc_key = expand_enc_key(&root)?;
    let cipher = Aes256Gcm::new_from_slice(&enc_key).map_err(|_| CryptoError::Unseal)?;
    cipher
        .decrypt(
            &Nonce::<aes_gcm::aead::consts::U12>::from(sealed.nonce),
            sealed.ciphertext.as_slice(),
        )
        .map_err(|_| CryptoError::Unseal)
}

/// Deterministic digest over the candidate bundle. This is what both
/// authorization paths sign and what settlement correlates on.
pub fn bundle_digest(drafts: &[TransactionDraft]) -> B256 {
    let mut bytes = Vec::with_capacity(drafts.len() * 64);
    for draft in drafts {
        bytes.extend_from_slice(draft.to.as_slice());
        bytes.extend_from_slice(&draft.value.to_be_bytes::<32>());
        bytes.extend_from_slice(&(draft.data.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&draft.data);
    }
    keccak256(bytes)
}

/// HMAC-SHA256 authorization tag over the bundle digest, keyed by the
/// unsealed signing secret.
pub fn authorization_tag(secret: &[u8], digest: B256) -> Result<B256, CryptoError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| CryptoError::KeyExpansion)?;
    mac.update(digest.as_slice());
    let out = mac.finalize().into_bytes();
    Ok(B256::from_slice(&out))
}

fn expand_enc_key(root: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, root);
    let mut enc_key = [0u8; 32];
    hk.expand(b"enc_key_v1", &mut enc_key)
        .map_err(|_| CryptoError::KeyExpansion)?;
    Ok(enc_key)
}

fn derive_root_key(
    password: &[u8],
    salt: &[u8; 16],
    required: Option<KdfAlgorithm>,
) -> Option<([u8; 32], KdfAlgorithm)> {
    let mut root = [0u8; 32];

    if required != Some(KdfAlgorithm::Pbkdf2HmacSha256V1) {
        if let Ok(params) = Params::new(65536, 3, 1, Some(32)) {
            let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
            if argon.hash_password_into(password, salt, &mut root).is_ok() {
                return Some((root, KdfAlgorithm::Argon2idV1));
            }
        }
        // A vault sealed with argon2id cannot be opened by the fallback.
        if required == Some(KdfAlgorithm::Argon2idV1) {
            return None;
        }
    }

    pbkdf2_hmac::<Sha256>(password, salt, 600_000, &mut root);
    Some((root, KdfAlgorithm::Pbkdf2HmacSha256V1))
}
