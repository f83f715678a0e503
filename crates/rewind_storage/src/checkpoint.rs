//! Checkpoint storage for fast replay seeding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rewind_core::{CoreError, CoreResult, Hash, Seq, StreamId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Current checkpoint envelope format
pub const CHECKPOINT_VERSION: u32 = 1;

/// A materialized view state and the sequence number it reflects
///
/// Folding every event with `seq > index` from `state` must give the same
/// result as folding from genesis. Replay relies on this; it does not check it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialCheckpoint<S> {
    /// View state after folding through `index`
    pub state: S,
    /// Last sequence number folded into `state`
    pub index: Seq,
}

impl<S> InitialCheckpoint<S> {
    /// Create a checkpoint
    #[must_use]
    pub const fn new(state: S, index: Seq) -> Self {
        Self { state, index }
    }

    /// Checkpoint at genesis
    #[must_use]
    pub const fn genesis(state: S) -> Self {
        Self {
            state,
            index: Seq::genesis(),
        }
    }
}

/// Checkpoint metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Stream the checkpoint belongs to
    pub stream: StreamId,
    /// Sequence number the state reflects
    pub index: Seq,
    /// Envelope format version
    pub version: u32,
    /// When the checkpoint was taken
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the encoded state
    pub state_hash: Hash,
}

/// Stored checkpoint: state plus metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint<S> {
    /// Metadata
    pub metadata: CheckpointMetadata,
    /// Materialized state
    pub state: S,
}

impl<S: Serialize + DeserializeOwned> Checkpoint<S> {
    /// Wrap an initial checkpoint for storage
    ///
    /// # Errors
    ///
    /// Returns error if the state cannot be encoded
    pub fn new(stream: StreamId, initial: InitialCheckpoint<S>) -> CoreResult<Self> {
        let state_hash = Hash::of_json(&initial.state)?;
        Ok(Self {
            metadata: CheckpointMetadata {
                stream,
                index: initial.index,
                version: CHECKPOINT_VERSION,
                created_at: Utc::now(),
                state_hash,
            },
            state: initial.state,
        })
    }

    /// Encode checkpoint to bytes
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode checkpoint from bytes, checking version and state fingerprint
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails, the version is unknown, or the state
    /// does not match its recorded hash
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let checkpoint: Self = serde_json::from_slice(data)?;
        if checkpoint.metadata.version != CHECKPOINT_VERSION {
            return Err(CoreError::Encoding {
                reason: format!(
                    "checkpoint version mismatch: expected {}, got {}",
                    CHECKPOINT_VERSION, checkpoint.metadata.version
                ),
            });
        }
        if Hash::of_json(&checkpoint.state)? != checkpoint.metadata.state_hash {
            return Err(CoreError::Encoding {
                reason: format!(
                    "checkpoint state hash mismatch at {} seq {}",
                    checkpoint.metadata.stream, checkpoint.metadata.index
                ),
            });
        }
        Ok(checkpoint)
    }
}

impl<S> Checkpoint<S> {
    /// The seed a replay starts from
    #[must_use]
    pub fn into_initial(self) -> InitialCheckpoint<S> {
        InitialCheckpoint {
            index: self.metadata.index,
            state: self.state,
        }
    }
}

/// Source of the nearest prior checkpoint
#[async_trait]
pub trait CheckpointSource<S>: Send + Sync {
    /// Latest checkpoint of `stream` with `index <= at_or_before`
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read
    async fn nearest_checkpoint(
        &self,
        stream: &StreamId,
        at_or_before: Seq,
    ) -> CoreResult<Option<InitialCheckpoint<S>>>;
}

#[async_trait]
impl<S, T> CheckpointSource<S> for Arc<T>
where
    S: Send + 'static,
    T: CheckpointSource<S> + ?Sized,
{
    async fn nearest_checkpoint(
        &self,
        stream: &StreamId,
        at_or_before: Seq,
    ) -> CoreResult<Option<InitialCheckpoint<S>>> {
        (**self).nearest_checkpoint(stream, at_or_before).await
    }
}

/// Checkpoint source that never has a checkpoint; every replay folds from
/// the view's initial state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoCheckpoints;

#[async_trait]
impl<S: Send + 'static> CheckpointSource<S> for NoCheckpoints {
    async fn nearest_checkpoint(
        &self,
        _stream: &StreamId,
        _at_or_before: Seq,
    ) -> CoreResult<Option<InitialCheckpoint<S>>> {
        Ok(None)
    }
}

/// In-memory checkpoint store, ordered by sequence number per stream
#[derive(Debug)]
pub struct MemoryCheckpointStore<S> {
    checkpoints: RwLock<BTreeMap<StreamId, BTreeMap<Seq, Checkpoint<S>>>>,
}

impl<S> Default for MemoryCheckpointStore<S> {
    fn default() -> Self {
        Self {
            checkpoints: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<S> MemoryCheckpointStore<S>
where
    S: Clone + Serialize + DeserializeOwned,
{
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a checkpoint, replacing any existing one at the same index
    ///
    /// # Errors
    ///
    /// Returns error if the state cannot be fingerprinted
    pub fn save(&self, stream: &StreamId, initial: InitialCheckpoint<S>) -> CoreResult<()> {
        let checkpoint = Checkpoint::new(stream.clone(), initial)?;
        self.insert(checkpoint);
        Ok(())
    }

    /// Store an already-built checkpoint
    pub fn insert(&self, checkpoint: Checkpoint<S>) {
        let mut checkpoints = self
            .checkpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(
            stream = %checkpoint.metadata.stream,
            index = %checkpoint.metadata.index,
            "checkpoint stored"
        );
        checkpoints
            .entry(checkpoint.metadata.stream.clone())
            .or_default()
            .insert(checkpoint.metadata.index, checkpoint);
    }

    /// Checkpoint stored at exactly `index`
    #[must_use]
    pub fn get(&self, stream: &StreamId, index: Seq) -> Option<Checkpoint<S>> {
        let checkpoints = self.checkpoints.read().unwrap_or_else(PoisonError::into_inner);
        checkpoints.get(stream).and_then(|by_seq| by_seq.get(&index).cloned())
    }

    /// Remove the checkpoint at `index`
    pub fn remove(&self, stream: &StreamId, index: Seq) -> bool {
        let mut checkpoints = self
            .checkpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        checkpoints
            .get_mut(stream)
            .is_some_and(|by_seq| by_seq.remove(&index).is_some())
    }

    /// Sequence numbers with a checkpoint, ascending
    #[must_use]
    pub fn indices(&self, stream: &StreamId) -> Vec<Seq> {
        let checkpoints = self.checkpoints.read().unwrap_or_else(PoisonError::into_inner);
        checkpoints
            .get(stream)
            .map(|by_seq| by_seq.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of stored checkpoints
    #[must_use]
    pub fn len(&self) -> usize {
        let checkpoints = self.checkpoints.read().unwrap_or_else(PoisonError::into_inner);
        checkpoints.values().map(BTreeMap::len).sum()
    }

    /// Whether the store holds no checkpoints
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<S> CheckpointSource<S> for MemoryCheckpointStore<S>
where
    S: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn nearest_checkpoint(
        &self,
        stream: &StreamId,
        at_or_before: Seq,
    ) -> CoreResult<Option<InitialCheckpoint<S>>> {
        let checkpoints = self.checkpoints.read().unwrap_or_else(PoisonError::into_inner);
        Ok(checkpoints
            .get(stream)
            .and_then(|by_seq| by_seq.range(..=at_or_before).next_back())
            .map(|(_, checkpoint)| checkpoint.clone().into_initial()))
    }
}
