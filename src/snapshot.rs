//! Local snapshot metadata
//!
//! Describes the chain-state snapshot this gateway serves, if any, so
//! companion gateways can discover it through `/snapshot/info`.

use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::types::SnapshotInfo;

const READ_CHUNK: usize = 64 * 1024;

/// Checksum and size of the configured snapshot file.
///
/// No path, or a file that cannot be read, yields the empty (size 0) info.
pub async fn load_local_snapshot(path: Option<&Path>) -> SnapshotInfo {
    let Some(path) = path else {
        return SnapshotInfo::default();
    };

    match checksum_file(path).await {
        Ok(info) => {
            info!(
                "📦 Serving snapshot {:?} ({} bytes, blake3 {})",
                path, info.size, info.checksum
            );
            info
        }
        Err(e) => {
            warn!("Snapshot {:?} unavailable: {}", path, e);
            SnapshotInfo::default()
        }
    }
}

/// Streaming BLAKE3 of a file
async fn checksum_file(path: &Path) -> std::io::Result<SnapshotInfo> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut size = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok(SnapshotInfo {
        checksum: hasher.finalize().to_hex().to_string(),
        size,
    })
}
