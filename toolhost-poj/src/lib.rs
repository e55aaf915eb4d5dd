//! Proof-of-Judgment chain: an append-only, hash-linked batch block producer
//! with startup integrity verification.
//!
//! The pending buffer is the textbook single-owner case the design notes
//! call out: it lives behind one `Mutex` and every mutation — `add_judgment`
//! and the seal path alike — goes through `PojChainManager`, never split
//! across two owners. The batch timer is grounded on the teacher's
//! `r2e-scheduler` idiom: a `CancellationToken` handed to a spawned loop,
//! cancelled once on close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use toolhost_events::{EventBus, PublishOptions};
use toolhost_persistence::{domain, PersistenceManager};

pub const GENESIS_HASH: &str = "genesis";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PojBlock {
    pub slot: u64,
    pub previous_hash: String,
    pub judgments_root: String,
    pub judgments: Vec<serde_json::Value>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum PojError {
    Closed,
    Persistence(toolhost_persistence::DataError),
}

impl std::fmt::Display for PojError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PojError::Closed => write!(f, "PoJ chain is closing; no new judgments are accepted"),
            PojError::Persistence(err) => write!(f, "PoJ persistence error: {err}"),
        }
    }
}

impl std::error::Error for PojError {}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn judgment_id_of(judgment: &serde_json::Value) -> String {
    judgment.get("judgment_id").and_then(|v| v.as_str()).map(str::to_string).unwrap_or_default()
}

/// Merkle root over judgment ids. Empty input hashes the empty string; a
/// single id hashes itself; otherwise pairs are combined bottom-up,
/// duplicating the last id when the level is odd-sized.
pub fn merkle_root(judgments: &[serde_json::Value]) -> String {
    let mut level: Vec<String> = judgments.iter().map(|j| sha256_hex(&judgment_id_of(j))).collect();
    if level.is_empty() {
        return sha256_hex("");
    }
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level.last().unwrap().clone());
        }
        level = level.chunks(2).map(|pair| sha256_hex(&format!("{}{}", pair[0], pair[1]))).collect();
    }
    level.into_iter().next().unwrap()
}

fn block_hash(slot: u64, previous_hash: &str, judgments_root: &str) -> String {
    sha256_hex(&format!("{slot}:{previous_hash}:{judgments_root}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationError {
    pub slot: u64,
    pub expected_previous_hash: String,
    pub actual_previous_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub blocks_checked: u64,
    pub error_count: u64,
    pub errors: Vec<VerificationError>,
}

struct PendingItem {
    judgment: serde_json::Value,
    received_at: DateTime<Utc>,
}

struct ChainState {
    blocks: Vec<PojBlock>,
    pending: Vec<PendingItem>,
}

pub struct PojChainManager {
    state: Mutex<ChainState>,
    adapter: toolhost_persistence::Adapter,
    bus: EventBus,
    batch_size: usize,
    batch_interval: Duration,
    closing: AtomicBool,
    cancel: CancellationToken,
}

impl PojChainManager {
    pub async fn new(
        persistence: &PersistenceManager,
        bus: EventBus,
        batch_size: usize,
        batch_interval: Duration,
    ) -> Arc<Self> {
        let adapter = persistence.adapter(domain::POJ_BLOCKS);
        let mut blocks: Vec<PojBlock> = adapter
            .list()
            .await
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        blocks.sort_by_key(|block| block.slot);

        Arc::new(Self {
            state: Mutex::new(ChainState { blocks, pending: Vec::new() }),
            adapter,
            bus,
            batch_size,
            batch_interval,
            closing: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Startup verification: `block[n].previous_hash == hash(block[n-1])`
    /// for every `n > 0`; slot 0 is checked against [`GENESIS_HASH`]. Never
    /// mutates the chain.
    pub async fn verify_chain(&self) -> VerificationReport {
        let state = self.state.lock().await;
        let mut errors = Vec::new();
        let mut previous_hash = GENESIS_HASH.to_string();
        for block in &state.blocks {
            if block.previous_hash != previous_hash {
                errors.push(VerificationError {
                    slot: block.slot,
                    expected_previous_hash: previous_hash.clone(),
                    actual_previous_hash: block.previous_hash.clone(),
                });
            }
            previous_hash = block.hash.clone();
        }
        let blocks_checked = state.blocks.len() as u64;
        let error_count = errors.len() as u64;
        errors.truncate(3);
        VerificationReport { valid: error_count == 0, blocks_checked, error_count, errors }
    }

    /// Appends a judgment to the pending buffer and seals a block if the
    /// size or time threshold has been crossed. Rejected once closing.
    pub async fn add_judgment(&self, judgment: serde_json::Value) -> Result<(), PojError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(PojError::Closed);
        }
        let mut state = self.state.lock().await;
        state.pending.push(PendingItem { judgment, received_at: Utc::now() });
        self.seal_if_needed(&mut state).await
    }

    async fn seal_if_needed(&self, state: &mut ChainState) -> Result<(), PojError> {
        let should_seal = match state.pending.first() {
            None => false,
            Some(oldest) => {
                state.pending.len() >= self.batch_size
                    || Utc::now().signed_duration_since(oldest.received_at).to_std().unwrap_or_default()
                        >= self.batch_interval
            }
        };
        if should_seal {
            self.seal_locked(state).await?;
        }
        Ok(())
    }

    /// Seals whatever is pending, regardless of threshold. Called by the
    /// background timer and by `close`.
    async fn seal_locked(&self, state: &mut ChainState) -> Result<(), PojError> {
        if state.pending.is_empty() {
            return Ok(());
        }
        let slot = state.blocks.len() as u64;
        let previous_hash = state.blocks.last().map(|b| b.hash.clone()).unwrap_or_else(|| GENESIS_HASH.to_string());
        let judgments: Vec<serde_json::Value> = state.pending.iter().map(|item| item.judgment.clone()).collect();
        let judgments_root = merkle_root(&judgments);
        let hash = block_hash(slot, &previous_hash, &judgments_root);
        let block = PojBlock { slot, previous_hash, judgments_root, judgments, hash, created_at: Utc::now() };

        let record = serde_json::to_value(&block).expect("block serializes");
        match self.adapter.save(&slot.to_string(), record).await {
            Ok(_) => {
                state.pending.clear();
                state.blocks.push(block.clone());
                self.bus.publish(
                    "poj:block:created",
                    serde_json::to_value(&block).expect("block serializes"),
                    PublishOptions { source: Some("poj-chain".into()), timestamp: None },
                );
                Ok(())
            }
            Err(err) => {
                // Discard the sealed block attempt; the pending buffer is
                // untouched so a subsequent add_judgment/seal call replays it.
                tracing::error!(slot, error = %err, "failed to persist sealed PoJ block");
                Err(PojError::Persistence(err))
            }
        }
    }

    pub async fn head_slot(&self) -> Option<u64> {
        self.state.lock().await.blocks.last().map(|b| b.slot)
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Spawns the time-based batch timer. Returns immediately; the loop runs
    /// until [`PojChainManager::close`] cancels it.
    pub fn spawn_batch_timer(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let token = self.cancel.clone();
        let interval = self.batch_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mut state = manager.state.lock().await;
                        if let Err(err) = manager.seal_if_needed(&mut state).await {
                            tracing::warn!(error = %err, "batch timer seal attempt failed");
                        }
                    }
                }
            }
        });
    }

    /// Seals any non-empty pending buffer as a final block, then rejects
    /// further judgments.
    pub async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        let mut state = self.state.lock().await;
        if let Err(err) = self.seal_locked(&mut state).await {
            tracing::error!(error = %err, "failed to flush final PoJ block on close");
        }
    }
}
