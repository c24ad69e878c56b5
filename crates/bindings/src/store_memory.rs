//! In-memory store for tests and ephemeral runs.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

use {anyhow::Result, async_trait::async_trait};

use courier_common::{ChannelId, ChannelRecord};

use crate::store::{BindOutcome, BindingStore, RemoveOutcome};

/// In-memory store backed by `BTreeMap`. No persistence.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sources: BTreeMap<ChannelId, ChannelRecord>,
    targets: BTreeMap<ChannelId, ChannelRecord>,
    bindings: BTreeSet<(ChannelId, ChannelId)>,
    repost_step: Option<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_channel(
        &self,
        id: ChannelId,
        pick_target_side: bool,
    ) -> RemoveOutcome {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let removed = if pick_target_side {
            inner.targets.remove(&id)
        } else {
            inner.sources.remove(&id)
        };
        let before = inner.bindings.len();
        inner.bindings.retain(|(s, t)| {
            if pick_target_side { *t != id } else { *s != id }
        });
        RemoveOutcome {
            bindings_removed: before - inner.bindings.len(),
            name: removed
                .as_ref()
                .map(|r| r.name.clone())
                .unwrap_or_else(|| id.to_string()),
            removed: removed.is_some(),
        }
    }
}

#[async_trait]
impl BindingStore for MemoryStore {
    async fn targets_for(&self, source: ChannelId) -> Result<Vec<ChannelId>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .bindings
            .iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, t)| *t)
            .collect())
    }

    async fn upsert_source(&self, record: &ChannelRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.sources.insert(record.id, record.clone());
        Ok(())
    }

    async fn upsert_target(&self, record: &ChannelRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.targets.insert(record.id, record.clone());
        Ok(())
    }

    async fn remove_source(&self, id: ChannelId) -> Result<RemoveOutcome> {
        Ok(self.remove_channel(id, false))
    }

    async fn remove_target(&self, id: ChannelId) -> Result<RemoveOutcome> {
        Ok(self.remove_channel(id, true))
    }

    async fn list_sources(&self) -> Result<Vec<ChannelRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.sources.values().cloned().collect())
    }

    async fn list_targets(&self) -> Result<Vec<ChannelRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.targets.values().cloned().collect())
    }

    async fn bind(&self, source: ChannelId, targets: &[ChannelId]) -> Result<BindOutcome> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut outcome = BindOutcome::default();
        for target in targets {
            if inner.bindings.insert((source, *target)) {
                outcome.added += 1;
            } else {
                outcome.existing += 1;
            }
        }
        Ok(outcome)
    }

    async fn unbind(&self, source: ChannelId, target: ChannelId) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.bindings.remove(&(source, target)))
    }

    async fn bindings(&self) -> Result<Vec<(ChannelId, ChannelId)>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.bindings.iter().copied().collect())
    }

    async fn repost_step(&self) -> Result<Option<u32>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.repost_step)
    }

    async fn set_repost_step(&self, step: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.repost_step = Some(step);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, name: &str) -> ChannelRecord {
        ChannelRecord {
            id: ChannelId(id),
            name: name.into(),
            username: None,
        }
    }

    #[tokio::test]
    async fn bind_and_resolve() {
        let store = MemoryStore::new();
        store.upsert_source(&record(-1, "src")).await.unwrap();
        store.upsert_target(&record(-2, "tgt")).await.unwrap();

        let outcome = store.bind(ChannelId(-1), &[ChannelId(-2)]).await.unwrap();
        assert_eq!(outcome.added, 1);

        let targets = store.targets_for(ChannelId(-1)).await.unwrap();
        assert_eq!(targets, vec![ChannelId(-2)]);
    }

    #[tokio::test]
    async fn bind_is_idempotent() {
        let store = MemoryStore::new();
        store.bind(ChannelId(-1), &[ChannelId(-2)]).await.unwrap();
        let outcome = store
            .bind(ChannelId(-1), &[ChannelId(-2), ChannelId(-3)])
            .await
            .unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.existing, 1);
    }

    #[tokio::test]
    async fn unknown_source_resolves_empty() {
        let store = MemoryStore::new();
        assert!(store.targets_for(ChannelId(-99)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_source_cascades_bindings() {
        let store = MemoryStore::new();
        store.upsert_source(&record(-1, "src")).await.unwrap();
        store
            .bind(ChannelId(-1), &[ChannelId(-2), ChannelId(-3)])
            .await
            .unwrap();

        let outcome = store.remove_source(ChannelId(-1)).await.unwrap();
        assert!(outcome.removed);
        assert_eq!(outcome.bindings_removed, 2);
        assert_eq!(outcome.name, "src");
        assert!(store.bindings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_missing_channel_reports_not_removed() {
        let store = MemoryStore::new();
        let outcome = store.remove_target(ChannelId(-5)).await.unwrap();
        assert!(!outcome.removed);
        assert_eq!(outcome.bindings_removed, 0);
    }

    #[tokio::test]
    async fn repost_step_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.repost_step().await.unwrap(), None);
        store.set_repost_step(3).await.unwrap();
        assert_eq!(store.repost_step().await.unwrap(), Some(3));
    }
}
