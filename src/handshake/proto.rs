//! Protobuf messages of the Tendermint P2P handshake
//!
//! Hand-written prost equivalents of `google.protobuf.BytesValue`,
//! `tendermint.crypto.PublicKey`, `tendermint.p2p.AuthSigMessage` and
//! `tendermint.p2p.DefaultNodeInfo`. Field tags match the upstream `.proto`
//! files; a oneof encodes the same as its member fields.

use ed25519_dalek::VerifyingKey;
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::HandshakeError;
use crate::crypto;
use crate::types;

/// Longest uvarint length prefix
const MAX_VARINT_LEN: usize = 10;

#[derive(Clone, PartialEq, Message)]
pub struct BytesValue {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PublicKey {
    #[prost(bytes = "vec", tag = "1")]
    pub ed25519: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub secp256k1: Vec<u8>,
}

impl PublicKey {
    pub fn ed25519(key: &VerifyingKey) -> Self {
        Self {
            ed25519: key.to_bytes().to_vec(),
            secp256k1: Vec::new(),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthSigMessage {
    #[prost(message, optional, tag = "1")]
    pub pub_key: Option<PublicKey>,
    #[prost(bytes = "vec", tag = "2")]
    pub sig: Vec<u8>,
}

impl AuthSigMessage {
    /// The Ed25519 key this message presents
    pub fn verifying_key(&self) -> Result<VerifyingKey, HandshakeError> {
        match &self.pub_key {
            Some(key) if !key.ed25519.is_empty() => Ok(crypto::public_key_from_bytes(&key.ed25519)?),
            Some(_) => Err(HandshakeError::Malformed(
                "only ed25519 peer keys are supported".to_string(),
            )),
            None => Err(HandshakeError::Malformed("auth message without key".to_string())),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtocolVersion {
    #[prost(uint64, tag = "1")]
    pub p2p: u64,
    #[prost(uint64, tag = "2")]
    pub block: u64,
    #[prost(uint64, tag = "3")]
    pub app: u64,
}

impl From<types::ProtocolVersion> for ProtocolVersion {
    fn from(version: types::ProtocolVersion) -> Self {
        Self {
            p2p: version.p2p,
            block: version.block,
            app: version.app,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct DefaultNodeInfoOther {
    #[prost(string, tag = "1")]
    pub tx_index: String,
    #[prost(string, tag = "2")]
    pub rpc_address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct DefaultNodeInfo {
    #[prost(message, optional, tag = "1")]
    pub protocol_version: Option<ProtocolVersion>,
    #[prost(string, tag = "2")]
    pub default_node_id: String,
    #[prost(string, tag = "3")]
    pub listen_addr: String,
    #[prost(string, tag = "4")]
    pub network: String,
    #[prost(string, tag = "5")]
    pub version: String,
    #[prost(bytes = "vec", tag = "6")]
    pub channels: Vec<u8>,
    #[prost(string, tag = "7")]
    pub moniker: String,
    #[prost(message, optional, tag = "8")]
    pub other: Option<DefaultNodeInfoOther>,
}

pub fn decode<M: Message + Default>(bytes: &[u8]) -> Result<M, HandshakeError> {
    M::decode(bytes).map_err(|e| HandshakeError::Malformed(e.to_string()))
}

/// Read one uvarint-delimited message straight off a plaintext stream
pub async fn read_delimited<R, M>(reader: &mut R, max_size: usize) -> Result<M, HandshakeError>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let mut prefix = Vec::with_capacity(MAX_VARINT_LEN);
    loop {
        let byte = reader.read_u8().await?;
        prefix.push(byte);
        if byte & 0x80 == 0 {
            break;
        }
        if prefix.len() == MAX_VARINT_LEN {
            return Err(HandshakeError::Malformed("length prefix overflows".to_string()));
        }
    }

    let len = prost::decode_length_delimiter(prefix.as_slice())
        .map_err(|e| HandshakeError::Malformed(e.to_string()))?;
    if len > max_size {
        return Err(HandshakeError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;

    #[test]
    fn test_ephemeral_key_wire_layout() {
        let msg = BytesValue { value: vec![0xAB; 32] };
        let bytes = msg.encode_length_delimited_to_vec();

        assert_eq!(bytes.len(), 35);
        assert_eq!(&bytes[..3], &[0x22, 0x0a, 0x20]);
        assert!(bytes[3..].iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn test_auth_sig_wire_layout() {
        let keypair = generate_keypair();
        let msg = AuthSigMessage {
            pub_key: Some(PublicKey::ed25519(&keypair.verifying_key())),
            sig: vec![0x11; 64],
        };
        let bytes = msg.encode_to_vec();

        assert_eq!(bytes.len(), 102);
        assert_eq!(&bytes[..4], &[0x0a, 0x22, 0x0a, 0x20]);
        assert_eq!(&bytes[36..38], &[0x12, 0x40]);
        assert_eq!(msg.verifying_key().unwrap(), keypair.verifying_key());
    }

    #[test]
    fn test_non_ed25519_key_rejected() {
        let msg = AuthSigMessage {
            pub_key: Some(PublicKey {
                ed25519: Vec::new(),
                secp256k1: vec![2; 33],
            }),
            sig: vec![0; 64],
        };
        assert!(matches!(msg.verifying_key(), Err(HandshakeError::Malformed(_))));

        let keyless = AuthSigMessage {
            pub_key: None,
            sig: vec![0; 64],
        };
        assert!(matches!(keyless.verifying_key(), Err(HandshakeError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_read_delimited_from_stream() {
        let info = DefaultNodeInfo {
            default_node_id: "21fe31dfa154a261626bf854046fd2271b7bed4b".to_string(),
            network: "testnet-1".to_string(),
            moniker: "validator-1".to_string(),
            ..Default::default()
        };
        let bytes = info.encode_length_delimited_to_vec();

        let mut reader = bytes.as_slice();
        let decoded: DefaultNodeInfo = read_delimited(&mut reader, 10240).await.unwrap();
        assert_eq!(decoded, info);

        let mut reader = bytes.as_slice();
        let result: Result<DefaultNodeInfo, _> = read_delimited(&mut reader, 8).await;
        assert!(matches!(result, Err(HandshakeError::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn test_overlong_length_prefix_rejected() {
        let bytes = [0xFFu8; 12];
        let mut reader = &bytes[..];
        let result: Result<BytesValue, _> = read_delimited(&mut reader, 1024).await;
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
    }
}
