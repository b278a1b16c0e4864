//! Signing primitives for change requests (secp256k1 ECDSA over SHA-256)
//!
//! An account id is the hex-encoded compressed public key of its owner, so a
//! request's signer doubles as the key its signature is checked against.

use crate::error::ChainError;
use crate::transaction::AccountId;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// Shared context; creating one per call is expensive.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::InvalidSignature(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::InvalidSignature(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Account id owned by this key: hex of the compressed public key.
    pub fn account_id(&self) -> AccountId {
        hex::encode(self.public_key.serialize())
    }

    /// Signs SHA-256(message) and returns the compact signature as hex.
    pub fn sign(&self, message: &[u8]) -> String {
        let digest: [u8; 32] = Sha256::digest(message).into();
        let message = Message::from_digest(digest);
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        hex::encode(signature.serialize_compact())
    }
}

/// Verifies a hex signature made by the owner of `account` over `message`.
pub fn verify_signature(account: &str, message: &[u8], signature_hex: &str) -> Result<(), ChainError> {
    let public_key_bytes = hex::decode(account)
        .map_err(|e| ChainError::InvalidSignature(format!("Signer is not valid hex: {}", e)))?;
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::InvalidSignature(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| ChainError::InvalidSignature(format!("Signature is not valid hex: {}", e)))?;
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::InvalidSignature(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(&public_key_bytes)
        .map_err(|e| ChainError::InvalidSignature(format!("Invalid public key: {}", e)))?;
    let signature = Signature::from_compact(&signature_bytes)
        .map_err(|e| ChainError::InvalidSignature(format!("Malformed signature: {}", e)))?;

    let digest: [u8; 32] = Sha256::digest(message).into();
    let message = Message::from_digest(digest);

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::InvalidSignature("Signature verification failed".to_string()))
}
