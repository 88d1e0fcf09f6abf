//! Handshake & Authentication
//!
//! Verifies that a peer claiming node id X at address A really controls A.
//! This is the crawler's only trust anchor: the status probe is
//! unauthenticated, so without this step any host could claim any node id.
//!
//! Speaks the Tendermint P2P handshake, so any chain node's P2P port can
//! be dialed.
//!
//! ## Phases (each under the dial timeout, each timed)
//!
//! 1. TCP connect
//! 2. Secret connection: ephemeral key exchange + mutual key challenge
//! 3. Node info exchange: write our `DefaultNodeInfo` and read theirs
//!    concurrently, short-circuiting on the first error
//!
//! The peer is accepted only if its node info names the id derived from
//! the channel key and that id is the expected one.

pub mod identity;
mod proto;
mod secret;

pub use identity::LocalIdentity;
pub use proto::DefaultNodeInfo;
use secret::SecretConnection;

use ed25519_dalek::SigningKey;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::crypto::SignatureError;
use crate::types::{HandshakeReport, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Connection failed: {0}")]
    Connect(std::io::Error),

    #[error("{phase} timed out after {timeout_ms}ms")]
    Timeout { phase: &'static str, timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Frame authentication failed")]
    Decrypt,

    #[error("Nonce space exhausted")]
    NonceExhausted,

    #[error("Remote reflected our ephemeral key")]
    ReflectedKey,

    #[error("Low-order ephemeral key")]
    WeakKey,

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Node info claims {claimed} but the channel key derives {derived}")]
    IdentityMismatch { claimed: String, derived: String },

    #[error("Expected node {expected}, peer authenticated as {actual}")]
    IdMismatch { expected: String, actual: String },
}

/// Dial `addr` and authenticate it as `expected_id`
pub async fn authenticate(
    addr: SocketAddr,
    expected_id: &str,
    keypair: &SigningKey,
    ours: &DefaultNodeInfo,
    timeout: Duration,
) -> Result<HandshakeReport, HandshakeError> {
    let started = Instant::now();
    let stream = with_timeout("connect", timeout, async {
        TcpStream::connect(addr).await.map_err(HandshakeError::Connect)
    })
    .await?;
    let connect_ms = elapsed_ms(started);

    let (actual, channel_ms, exchange_ms) = handshake(stream, keypair, ours, timeout).await?;

    if actual != expected_id {
        return Err(HandshakeError::IdMismatch {
            expected: expected_id.to_string(),
            actual,
        });
    }

    Ok(HandshakeReport {
        connect_ms,
        channel_ms,
        exchange_ms,
    })
}

/// Run phases 2 and 3 on an open stream. Symmetric: used for both dialing
/// and accepting.
///
/// Returns the peer's verified node id and the two phase timings.
pub async fn handshake<S>(
    stream: S,
    keypair: &SigningKey,
    ours: &DefaultNodeInfo,
    timeout: Duration,
) -> Result<(NodeId, u64, u64), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = Instant::now();
    let conn = with_timeout("secret connection", timeout, SecretConnection::establish(stream, keypair)).await?;
    let channel_ms = elapsed_ms(started);

    let started = Instant::now();
    let theirs = exchange_node_info(conn, ours, timeout).await?;
    let exchange_ms = elapsed_ms(started);

    Ok((theirs, channel_ms, exchange_ms))
}

/// Write our node info and read theirs concurrently under one deadline
async fn exchange_node_info<S>(
    conn: SecretConnection<S>,
    ours: &DefaultNodeInfo,
    timeout: Duration,
) -> Result<NodeId, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let remote_key = *conn.remote_key();
    let (mut reader, mut writer) = conn.into_split();

    let (_, theirs) = with_timeout("node info exchange", timeout, async {
        tokio::try_join!(
            writer.write_msg(ours),
            reader.read_msg::<DefaultNodeInfo>(identity::MAX_NODE_INFO_SIZE)
        )
    })
    .await?;

    identity::verify_node_info(&theirs, &remote_key)
}

async fn with_timeout<T, F>(phase: &'static str, timeout: Duration, fut: F) -> Result<T, HandshakeError>
where
    F: Future<Output = Result<T, HandshakeError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| HandshakeError::Timeout {
            phase,
            timeout_ms: timeout.as_millis() as u64,
        })?
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
