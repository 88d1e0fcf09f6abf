//! Liveness & consistency classification
//!
//! `synced` compares heights against the local node. `safe` requires the
//! candidate to be on our chain and to agree with us on the block hash at
//! the highest height both sides have. The decisions are pure; only the
//! block fetches touch the network.

use crate::probe::{NetworkProbe, RpcTarget};
use crate::types::{BlockHeight, BlockRef, ChainStatus, HandshakeReport, LocalChainState};

/// Classifier output for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub synced: bool,
    pub safe: bool,
    /// Local height minus candidate height, saturating
    pub block_diff: i64,
}

// Candidate heights come from an unauthenticated /status, so any i64 is possible

pub fn block_diff(local: BlockHeight, candidate: BlockHeight) -> i64 {
    local.saturating_sub(candidate)
}

pub fn is_synced(local: BlockHeight, candidate: BlockHeight, limit: i64) -> bool {
    local.abs_diff(candidate) <= limit.max(0) as u64
}

/// Height at which both nodes are compared
pub fn safety_height(local: BlockHeight, candidate: BlockHeight) -> BlockHeight {
    local.min(candidate)
}

/// Decide safety from already-fetched blocks. A missing block is unsafe.
pub fn evaluate_safety(
    local_chain_id: &str,
    candidate_chain_id: &str,
    local_block: Option<&BlockRef>,
    candidate_block: Option<&BlockRef>,
) -> bool {
    if local_chain_id.is_empty() || local_chain_id != candidate_chain_id {
        return false;
    }

    match (local_block, candidate_block) {
        (Some(ours), Some(theirs)) => {
            ours.height == theirs.height
                && ours.hash == theirs.hash
                && ours.chain_id == local_chain_id
                && theirs.chain_id == local_chain_id
        }
        _ => false,
    }
}

/// Fetch the comparison block from both sides concurrently and decide
pub async fn check_safety(
    probe: &dyn NetworkProbe,
    local: &LocalChainState,
    candidate: &ChainStatus,
) -> bool {
    if local.chain_id != candidate.chain_id {
        return false;
    }

    let height = safety_height(local.latest_block_height, candidate.latest_block_height);
    if height <= 0 {
        return false;
    }

    let local_target = RpcTarget::Url(local.rpc_url.clone());
    let candidate_target = RpcTarget::Url(candidate.rpc_url.clone());

    let (ours, theirs) = tokio::join!(
        probe.block_at_height(&local_target, height),
        probe.block_at_height(&candidate_target, height),
    );

    evaluate_safety(
        &local.chain_id,
        &candidate.chain_id,
        ours.ok().as_ref(),
        theirs.ok().as_ref(),
    )
}

pub async fn classify(
    probe: &dyn NetworkProbe,
    local: &LocalChainState,
    candidate: &ChainStatus,
    block_diff_limit: i64,
) -> Classification {
    Classification {
        synced: is_synced(
            local.latest_block_height,
            candidate.latest_block_height,
            block_diff_limit,
        ),
        safe: check_safety(probe, local, candidate).await,
        block_diff: block_diff(local.latest_block_height, candidate.latest_block_height),
    }
}

/// Latency figure reported for a node: the slowest handshake phase
pub fn ping_ms(report: &HandshakeReport) -> u64 {
    report
        .connect_ms
        .max(report.channel_ms)
        .max(report.exchange_ms)
}
