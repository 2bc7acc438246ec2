// ABOUTME: Authenticated encryption for OAuth token material at rest
// ABOUTME: AES-256-GCM via ring with HKDF-SHA256 key derivation and per-call nonces
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Credential Vault
//!
//! Pure transformation layer: no I/O. Every call to [`CredentialVault::encrypt`]
//! draws a fresh 12-byte nonce from the system RNG, so two ciphertexts never
//! share an IV even for identical plaintexts. Decryption verifies the GCM
//! auth tag and fails with a decryption error on any mismatch; it never
//! returns unauthenticated plaintext.

use base64::{engine::general_purpose, Engine as _};
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN},
    hkdf::{Salt, HKDF_SHA256},
    rand::{SecureRandom, SystemRandom},
};
use zeroize::Zeroizing;

use crate::errors::{AppError, AppResult};
use crate::models::EncryptedSecret;

/// Minimum length accepted for the configured vault secret
const MIN_SECRET_LEN: usize = 16;

/// HKDF salt binding derived keys to this vault
const HKDF_SALT: &[u8] = b"linkvault-credential-vault";

/// HKDF info label; bump the version to rotate the derivation
const HKDF_INFO: &[u8] = b"token-encryption:v1";

/// Process-wide authenticated encryption for token secrets
pub struct CredentialVault {
    key: Zeroizing<[u8; 32]>,
    rng: SystemRandom,
}

impl CredentialVault {
    /// Derive the AES-256 key from a configured secret via HKDF-SHA256.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is shorter than 16
    /// characters, or an internal error if key derivation fails.
    pub fn new(secret: &str) -> AppResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::configuration(format!(
                "vault secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }

        let salt = Salt::new(HKDF_SHA256, HKDF_SALT);
        let prk = salt.extract(secret.as_bytes());
        let okm = prk
            .expand(&[HKDF_INFO], HKDF_SHA256)
            .map_err(|_| AppError::internal("failed to expand vault key material"))?;

        let mut key = Zeroizing::new([0u8; 32]);
        okm.fill(&mut *key)
            .map_err(|_| AppError::internal("failed to fill derived vault key"))?;

        Ok(Self {
            key,
            rng: SystemRandom::new(),
        })
    }

    /// Build a vault from a raw 32-byte key, bypassing derivation
    #[must_use]
    pub fn from_key(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
            rng: SystemRandom::new(),
        }
    }

    /// Encrypt a plaintext secret, producing an independent IV and auth tag.
    ///
    /// # Errors
    ///
    /// Returns an internal error if nonce generation or sealing fails.
    pub fn encrypt(&self, plaintext: &str) -> AppResult<EncryptedSecret> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::internal("failed to generate encryption nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let key = self.sealing_key()?;
        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = key
            .seal_in_place_separate_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| AppError::internal("encryption failed"))?;

        Ok(EncryptedSecret {
            ciphertext: general_purpose::STANDARD.encode(&in_out),
            iv: hex::encode(nonce_bytes),
            auth_tag: hex::encode(tag.as_ref()),
        })
    }

    /// Decrypt a stored secret, verifying its auth tag.
    ///
    /// # Errors
    ///
    /// Returns a decryption error if the IV, tag, or ciphertext is
    /// malformed, or if tag verification fails (tamper or key mismatch).
    /// Garbage is never returned.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> AppResult<String> {
        let iv = hex::decode(&secret.iv)
            .map_err(|_| AppError::decryption("IV is not valid hex"))?;
        let nonce_bytes: [u8; NONCE_LEN] = iv
            .as_slice()
            .try_into()
            .map_err(|_| AppError::decryption("IV must be 12 bytes"))?;

        let tag = hex::decode(&secret.auth_tag)
            .map_err(|_| AppError::decryption("auth tag is not valid hex"))?;
        let mut in_out = general_purpose::STANDARD
            .decode(&secret.ciphertext)
            .map_err(|_| AppError::decryption("ciphertext is not valid base64"))?;
        in_out.extend_from_slice(&tag);

        let key = self.sealing_key()?;
        let plaintext = key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| AppError::decryption("auth tag verification failed"))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| AppError::decryption("plaintext is not valid UTF-8"))
    }

    fn sealing_key(&self) -> AppResult<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &*self.key)
            .map_err(|_| AppError::internal("failed to build AES-256-GCM key"))?;
        Ok(LessSafeKey::new(unbound))
    }
}
