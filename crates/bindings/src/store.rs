//! Persistence trait for the binding graph.

use {anyhow::Result, async_trait::async_trait};

use courier_common::{ChannelId, ChannelRecord};

/// Outcome of a `bind` call over several targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOutcome {
    pub added: usize,
    pub existing: usize,
}

/// Outcome of removing a registered channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Whether the channel row itself existed.
    pub removed: bool,
    /// How many bindings were cascaded away with it.
    pub bindings_removed: usize,
    /// Display name of the removed channel (its id as text when unknown).
    pub name: String,
}

/// Persistence backend for sources, targets, bindings, and settings.
///
/// All ids crossing this boundary are canonical. An empty `targets_for`
/// result means "nothing to do", never an error.
#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn targets_for(&self, source: ChannelId) -> Result<Vec<ChannelId>>;

    async fn upsert_source(&self, record: &ChannelRecord) -> Result<()>;
    async fn upsert_target(&self, record: &ChannelRecord) -> Result<()>;

    async fn remove_source(&self, id: ChannelId) -> Result<RemoveOutcome>;
    async fn remove_target(&self, id: ChannelId) -> Result<RemoveOutcome>;

    async fn list_sources(&self) -> Result<Vec<ChannelRecord>>;
    async fn list_targets(&self) -> Result<Vec<ChannelRecord>>;

    async fn bind(&self, source: ChannelId, targets: &[ChannelId]) -> Result<BindOutcome>;
    async fn unbind(&self, source: ChannelId, target: ChannelId) -> Result<bool>;
    async fn bindings(&self) -> Result<Vec<(ChannelId, ChannelId)>>;

    /// Persisted decimation step, when one has been stored.
    async fn repost_step(&self) -> Result<Option<u32>>;
    async fn set_repost_step(&self, step: u32) -> Result<()>;
}
