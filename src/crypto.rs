//! Cryptographic utilities for the gateway
//!
//! Ed25519 is the process identity key. Node ids follow the Tendermint
//! address scheme: the first 20 bytes of SHA-256 over the public key,
//! lowercase hex.

use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::types::NodeId;

/// Bytes of the SHA-256 digest kept in a node id
const NODE_ID_BYTES: usize = 20;

// =============================================================================
// KEYPAIR MANAGEMENT
// =============================================================================

/// Generate a new Ed25519 keypair
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Load the identity key from a file, or use a fresh ephemeral key
pub async fn load_or_ephemeral(key_file: Option<&Path>) -> anyhow::Result<SigningKey> {
    match key_file {
        Some(path) => {
            info!("🔑 Loading identity key from {:?}", path);
            load_keypair(path).await
        }
        None => {
            info!("🔑 Using ephemeral identity key");
            Ok(generate_keypair())
        }
    }
}

/// Save keypair to file (secret key only, verifying key is derived)
pub async fn save_keypair(keypair: &SigningKey, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let secret_bytes = keypair.to_bytes();
    tokio::fs::write(path, secret_bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

/// Load keypair from file
pub async fn load_keypair(path: &Path) -> anyhow::Result<SigningKey> {
    let bytes = tokio::fs::read(path).await?;

    if bytes.len() != SECRET_KEY_LENGTH {
        anyhow::bail!(
            "Invalid key file size: expected {}, got {}",
            SECRET_KEY_LENGTH,
            bytes.len()
        );
    }

    let mut secret_bytes = [0u8; SECRET_KEY_LENGTH];
    secret_bytes.copy_from_slice(&bytes);

    Ok(SigningKey::from_bytes(&secret_bytes))
}

// =============================================================================
// NODE IDS
// =============================================================================

/// Derive the node id for a public key
pub fn node_id_from_public_key(key: &VerifyingKey) -> NodeId {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..NODE_ID_BYTES])
}

/// Node id of a keypair
pub fn keypair_to_node_id(keypair: &SigningKey) -> NodeId {
    node_id_from_public_key(&keypair.verifying_key())
}

/// Parse raw public key bytes
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, SignatureError> {
    let bytes: &[u8; PUBLIC_KEY_LENGTH] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(bytes).map_err(|_| SignatureError::InvalidPublicKey)
}

// =============================================================================
// SECRET CONNECTION CHALLENGES
// =============================================================================

/// Sign a secret-connection challenge. The raw challenge is signed, as every
/// Tendermint peer expects.
pub fn sign_challenge(keypair: &SigningKey, challenge: &[u8; 32]) -> [u8; SIGNATURE_LENGTH] {
    keypair.sign(challenge).to_bytes()
}

/// Verify a secret-connection challenge signature
pub fn verify_challenge(
    key: &VerifyingKey,
    challenge: &[u8; 32],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let signature =
        Signature::from_slice(signature).map_err(|_| SignatureError::InvalidSignature)?;
    key.verify(challenge, &signature)
        .map_err(|_| SignatureError::InvalidSignature)
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid signature")]
    InvalidSignature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_derivation() {
        let keypair = generate_keypair();
        let id = keypair_to_node_id(&keypair);

        assert_eq!(id.len(), NODE_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(id, keypair_to_node_id(&keypair));
        assert_ne!(id, keypair_to_node_id(&generate_keypair()));
    }

    #[test]
    fn test_node_id_matches_tendermint_address() {
        // RFC 8032 test vector 1
        let secret = hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60").unwrap();
        let keypair = SigningKey::from_bytes(&secret.try_into().unwrap());
        assert_eq!(
            hex::encode(keypair.verifying_key().as_bytes()),
            "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
        );

        assert_eq!(
            keypair_to_node_id(&keypair),
            "21fe31dfa154a261626bf854046fd2271b7bed4b"
        );
    }

    #[test]
    fn test_challenge_signing() {
        let keypair = generate_keypair();
        let challenge = [7u8; 32];

        let signature = sign_challenge(&keypair, &challenge);
        assert!(verify_challenge(&keypair.verifying_key(), &challenge, &signature).is_ok());

        // Plain Ed25519 over the challenge bytes
        assert_eq!(signature, keypair.sign(&challenge).to_bytes());

        assert_eq!(
            verify_challenge(&keypair.verifying_key(), &[8u8; 32], &signature),
            Err(SignatureError::InvalidSignature)
        );
        assert_eq!(
            verify_challenge(&keypair.verifying_key(), &challenge, &signature[..63]),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn test_public_key_length_checked() {
        let keypair = generate_keypair();
        let bytes = keypair.verifying_key().to_bytes();

        assert_eq!(public_key_from_bytes(&bytes).unwrap(), keypair.verifying_key());
        assert_eq!(
            public_key_from_bytes(&bytes[..31]),
            Err(SignatureError::InvalidPublicKey)
        );
    }

    #[tokio::test]
    async fn test_keypair_save_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let key_path = temp_dir.path().join("identity.key");

        let keypair = generate_keypair();
        save_keypair(&keypair, &key_path).await.unwrap();

        let loaded = load_or_ephemeral(Some(&key_path)).await.unwrap();
        assert_eq!(keypair_to_node_id(&keypair), keypair_to_node_id(&loaded));
    }

    #[tokio::test]
    async fn test_load_rejects_bad_key_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let key_path = temp_dir.path().join("short.key");
        tokio::fs::write(&key_path, [1u8; 7]).await.unwrap();

        assert!(load_keypair(&key_path).await.is_err());
    }
}
