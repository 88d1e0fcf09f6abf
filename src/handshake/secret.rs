//! Tendermint secret connection
//!
//! ## Protocol
//!
//! 1. Both sides send a fresh X25519 ephemeral public key as a
//!    uvarint-delimited `BytesValue`
//! 2. The sorted ephemeral keys and the DH secret go into a Merlin
//!    transcript, which yields the 32-byte challenge. HKDF-SHA256 over the
//!    DH secret yields the two directional ChaCha20-Poly1305 keys; the side
//!    with the lower ephemeral key receives with the first one.
//! 3. Both sides send an encrypted `AuthSigMessage` (Ed25519 key and a
//!    signature over the challenge) and verify the other's
//!
//! Every sealed frame holds 1028 plaintext bytes: a little-endian `u32`
//! payload length, up to 1024 payload bytes, zero padding. Nonces are
//! per-direction little-endian counters.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use merlin::Transcript;
use prost::Message;
use rand::rngs::OsRng;
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use x25519_dalek::{EphemeralSecret, PublicKey as EphemeralPublic};

use super::proto::{self, AuthSigMessage, BytesValue, PublicKey};
use super::HandshakeError;
use crate::crypto;

/// Payload bytes carried by one frame
pub const DATA_MAX_SIZE: usize = 1024;
const DATA_LEN_SIZE: usize = 4;
const TOTAL_FRAME_SIZE: usize = DATA_MAX_SIZE + DATA_LEN_SIZE;
/// Poly1305 tag appended to every frame
const TAG_SIZE: usize = 16;
const SEALED_FRAME_SIZE: usize = TOTAL_FRAME_SIZE + TAG_SIZE;

const MAX_EPHEMERAL_MESSAGE_SIZE: usize = 64;
const MAX_AUTH_MESSAGE_SIZE: usize = 1024 * 1024;
const MAX_VARINT_LEN: usize = 10;

const TRANSCRIPT_LABEL: &[u8] = b"TENDERMINT_SECRET_CONNECTION_TRANSCRIPT_HASH";
const LABEL_EPHEMERAL_LOWER: &[u8] = b"EPHEMERAL_LOWER_PUBLIC_KEY";
const LABEL_EPHEMERAL_UPPER: &[u8] = b"EPHEMERAL_UPPER_PUBLIC_KEY";
const LABEL_DH_SECRET: &[u8] = b"DH_SECRET";
const LABEL_CHALLENGE: &[u8] = b"SECRET_CONNECTION_MAC";
const KDF_INFO: &[u8] = b"TENDERMINT_SECRET_CONNECTION_KEY_AND_CHALLENGE_GEN";

/// Directional keys and the shared challenge
struct SessionKeys {
    send: [u8; 32],
    recv: [u8; 32],
    challenge: [u8; 32],
}

/// Derive session keys. Both sides compute identical material.
fn derive_keys(
    dh_secret: &[u8; 32],
    local_eph: &[u8; 32],
    remote_eph: &[u8; 32],
) -> Result<SessionKeys, HandshakeError> {
    let local_is_low = local_eph < remote_eph;
    let (low, high) = if local_is_low {
        (local_eph, remote_eph)
    } else {
        (remote_eph, local_eph)
    };

    let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
    transcript.append_message(LABEL_EPHEMERAL_LOWER, low);
    transcript.append_message(LABEL_EPHEMERAL_UPPER, high);
    transcript.append_message(LABEL_DH_SECRET, dh_secret);

    let mut challenge = [0u8; 32];
    transcript.challenge_bytes(LABEL_CHALLENGE, &mut challenge);

    let mut okm = [0u8; 64];
    Hkdf::<Sha256>::new(None, dh_secret)
        .expand(KDF_INFO, &mut okm)
        .map_err(|e| HandshakeError::Malformed(format!("key derivation: {}", e)))?;

    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);

    let (recv, send) = if local_is_low {
        (first, second)
    } else {
        (second, first)
    };

    Ok(SessionKeys {
        send,
        recv,
        challenge,
    })
}

/// One direction of the channel
struct FrameCipher {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl FrameCipher {
    fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            counter: 0,
        }
    }

    fn next_nonce(&mut self) -> Result<[u8; 12], HandshakeError> {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&self.counter.to_le_bytes());
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or(HandshakeError::NonceExhausted)?;
        Ok(nonce)
    }

    fn seal(&mut self, frame: &[u8; TOTAL_FRAME_SIZE]) -> Result<Vec<u8>, HandshakeError> {
        let nonce = self.next_nonce()?;
        self.cipher
            .encrypt(Nonce::from_slice(&nonce), frame.as_slice())
            .map_err(|_| HandshakeError::Decrypt)
    }

    fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let nonce = self.next_nonce()?;
        self.cipher
            .decrypt(Nonce::from_slice(&nonce), sealed)
            .map_err(|_| HandshakeError::Decrypt)
    }
}

/// Sending half of a secret connection
pub struct SecretWriter<W> {
    inner: W,
    cipher: FrameCipher,
}

impl<W: AsyncWrite + Unpin> SecretWriter<W> {
    /// Send a uvarint-delimited message, split over as many frames as needed
    pub async fn write_msg<M: Message>(&mut self, msg: &M) -> Result<(), HandshakeError> {
        self.write_all(&msg.encode_length_delimited_to_vec()).await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), HandshakeError> {
        for chunk in data.chunks(DATA_MAX_SIZE) {
            let mut frame = [0u8; TOTAL_FRAME_SIZE];
            frame[..DATA_LEN_SIZE].copy_from_slice(&(chunk.len() as u32).to_le_bytes());
            frame[DATA_LEN_SIZE..DATA_LEN_SIZE + chunk.len()].copy_from_slice(chunk);

            let sealed = self.cipher.seal(&frame)?;
            self.inner.write_all(&sealed).await?;
        }
        self.inner.flush().await?;

        Ok(())
    }
}

/// Receiving half of a secret connection
pub struct SecretReader<R> {
    inner: R,
    cipher: FrameCipher,
    /// Decrypted payload not yet consumed
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> SecretReader<R> {
    /// Receive one uvarint-delimited message of at most `max_size` bytes
    pub async fn read_msg<M: Message + Default>(
        &mut self,
        max_size: usize,
    ) -> Result<M, HandshakeError> {
        let len = loop {
            if let Ok(len) = prost::decode_length_delimiter(self.buffer.as_slice()) {
                break len;
            }
            if self.buffer.len() >= MAX_VARINT_LEN {
                return Err(HandshakeError::Malformed("length prefix overflows".to_string()));
            }
            self.read_frame().await?;
        };

        if len > max_size {
            return Err(HandshakeError::FrameTooLarge(len));
        }
        self.buffer.drain(..prost::length_delimiter_len(len));

        while self.buffer.len() < len {
            self.read_frame().await?;
        }
        let body: Vec<u8> = self.buffer.drain(..len).collect();

        proto::decode(&body)
    }

    /// Receive and decrypt one frame into the buffer
    async fn read_frame(&mut self) -> Result<(), HandshakeError> {
        let mut sealed = [0u8; SEALED_FRAME_SIZE];
        self.inner.read_exact(&mut sealed).await?;

        let frame = self.cipher.open(&sealed)?;
        let mut len_bytes = [0u8; DATA_LEN_SIZE];
        len_bytes.copy_from_slice(&frame[..DATA_LEN_SIZE]);

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > DATA_MAX_SIZE {
            return Err(HandshakeError::FrameTooLarge(len));
        }

        self.buffer
            .extend_from_slice(&frame[DATA_LEN_SIZE..DATA_LEN_SIZE + len]);
        Ok(())
    }
}

/// An authenticated, encrypted connection
pub struct SecretConnection<S> {
    reader: SecretReader<ReadHalf<S>>,
    writer: SecretWriter<WriteHalf<S>>,
    remote_key: VerifyingKey,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SecretConnection<S> {
    /// Run the key exchange and mutual challenge over `stream`.
    ///
    /// Proves that the remote holds the private key it presents; it does not
    /// say anything about which node id the remote claims to be.
    pub async fn establish(mut stream: S, local_key: &SigningKey) -> Result<Self, HandshakeError> {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let local_eph = EphemeralPublic::from(&secret);

        let hello = BytesValue {
            value: local_eph.as_bytes().to_vec(),
        };
        stream.write_all(&hello.encode_length_delimited_to_vec()).await?;
        stream.flush().await?;

        let remote: BytesValue =
            proto::read_delimited(&mut stream, MAX_EPHEMERAL_MESSAGE_SIZE).await?;
        let remote_eph: [u8; 32] = remote.value.as_slice().try_into().map_err(|_| {
            HandshakeError::Malformed(format!("ephemeral key of {} bytes", remote.value.len()))
        })?;

        if &remote_eph == local_eph.as_bytes() {
            return Err(HandshakeError::ReflectedKey);
        }

        let dh_secret = secret.diffie_hellman(&EphemeralPublic::from(remote_eph));
        if !dh_secret.was_contributory() {
            return Err(HandshakeError::WeakKey);
        }

        let keys = derive_keys(dh_secret.as_bytes(), local_eph.as_bytes(), &remote_eph)?;

        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = SecretReader {
            inner: read_half,
            cipher: FrameCipher::new(&keys.recv),
            buffer: Vec::new(),
        };
        let mut writer = SecretWriter {
            inner: write_half,
            cipher: FrameCipher::new(&keys.send),
        };

        // Mutual challenge
        let auth = AuthSigMessage {
            pub_key: Some(PublicKey::ed25519(&local_key.verifying_key())),
            sig: crypto::sign_challenge(local_key, &keys.challenge).to_vec(),
        };
        let (_, remote_auth) = tokio::try_join!(
            writer.write_msg(&auth),
            reader.read_msg::<AuthSigMessage>(MAX_AUTH_MESSAGE_SIZE)
        )?;

        let remote_key = remote_auth.verifying_key()?;
        crypto::verify_challenge(&remote_key, &keys.challenge, &remote_auth.sig)?;

        Ok(Self {
            reader,
            writer,
            remote_key,
        })
    }

    /// Ed25519 key the remote proved possession of
    pub fn remote_key(&self) -> &VerifyingKey {
        &self.remote_key
    }

    pub fn into_split(self) -> (SecretReader<ReadHalf<S>>, SecretWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}
