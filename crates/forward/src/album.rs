//! Album (media group) aggregation.
//!
//! Fragments of one album arrive as a burst of individual events. Each
//! fragment is buffered under its `(source, group)` key and (re)arms a
//! debounce timer; only when the group has been idle for the configured
//! window is it flushed as one forward operation. Replacing a timer is
//! always "cancel old token, create new token", never mutation in place.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Mutex,
};

use tokio_util::sync::CancellationToken;

use courier_common::{ChannelId, GroupId, MessageId};

/// Buffer key: one album in one source channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlbumKey {
    pub source: ChannelId,
    pub group: GroupId,
}

impl std::fmt::Display for AlbumKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, self.group)
    }
}

/// What happened to an incoming fragment.
pub enum AddOutcome {
    /// Fragment buffered; the caller must arm a debounce timer owning this
    /// token (any previously armed timer for the key was cancelled).
    Buffered { cancel: CancellationToken },
    /// First fragment of a group the decimation policy skipped; the caller
    /// must arm one cleanup timer so the tombstone is eventually dropped.
    SkippedNew { cancel: CancellationToken },
    /// Fragment of an already-skipped group; dropped.
    SkippedDrop,
    /// Fragment arrived while the group is mid-flush; dropped.
    Flushing,
}

/// A consumed buffer, ready to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumBatch {
    /// Message ids sorted ascending.
    pub messages: Vec<MessageId>,
    pub targets: Vec<ChannelId>,
}

enum Entry {
    Buffering {
        /// Ordered set: sorts by sequence number and absorbs the duplicate
        /// fragments a second listening identity delivers.
        fragments: BTreeSet<MessageId>,
        targets: Vec<ChannelId>,
        cancel: CancellationToken,
    },
    /// Group was decimation-skipped on creation; fragments are discarded
    /// until the tombstone is cleaned up.
    Skipped,
}

#[derive(Default)]
pub struct AlbumBuffers {
    entries: Mutex<HashMap<AlbumKey, Entry>>,
    /// Keys currently being flushed; guards against re-entrant flushes and
    /// fragments racing into a buffer that is being consumed.
    flushing: Mutex<HashSet<AlbumKey>>,
}

impl AlbumBuffers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one fragment.
    ///
    /// `decide_forward` is invoked exactly once per group, when its first
    /// fragment creates the buffer; this is where the decimation counter is
    /// seeded (one increment per album, not per fragment).
    pub fn add_fragment(
        &self,
        key: &AlbumKey,
        message: MessageId,
        targets: Vec<ChannelId>,
        decide_forward: impl FnOnce() -> bool,
    ) -> AddOutcome {
        {
            let flushing = self.flushing.lock().unwrap_or_else(|e| e.into_inner());
            if flushing.contains(key) {
                return AddOutcome::Flushing;
            }
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(key) {
            None => {
                if decide_forward() {
                    let cancel = CancellationToken::new();
                    entries.insert(
                        key.clone(),
                        Entry::Buffering {
                            fragments: BTreeSet::from([message]),
                            targets,
                            cancel: cancel.clone(),
                        },
                    );
                    AddOutcome::Buffered { cancel }
                } else {
                    entries.insert(key.clone(), Entry::Skipped);
                    AddOutcome::SkippedNew {
                        cancel: CancellationToken::new(),
                    }
                }
            },
            Some(Entry::Skipped) => AddOutcome::SkippedDrop,
            Some(Entry::Buffering {
                fragments,
                targets: entry_targets,
                cancel,
            }) => {
                fragments.insert(message);
                // Bindings may have changed since the first fragment; the
                // latest resolution wins.
                *entry_targets = targets;
                let fresh = CancellationToken::new();
                let old = std::mem::replace(cancel, fresh.clone());
                old.cancel();
                AddOutcome::Buffered { cancel: fresh }
            },
        }
    }

    /// Consume the buffer for `key`, claiming the flush.
    ///
    /// Returns `None` when another flush of the same key is already running,
    /// when the buffer was already consumed, or when the key is a skipped
    /// tombstone (which is removed here). On `Some`, the caller owns the
    /// flush and must call [`end_flush`](Self::end_flush) when done.
    pub fn begin_flush(&self, key: &AlbumKey) -> Option<AlbumBatch> {
        {
            let mut flushing = self.flushing.lock().unwrap_or_else(|e| e.into_inner());
            if !flushing.insert(key.clone()) {
                return None;
            }
        }

        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.remove(key)
        };

        match entry {
            Some(Entry::Buffering {
                fragments,
                targets,
                cancel,
            }) if !fragments.is_empty() => {
                // No-op if the timer that triggered us already fired.
                cancel.cancel();
                Some(AlbumBatch {
                    messages: fragments.into_iter().collect(),
                    targets,
                })
            },
            _ => {
                self.end_flush(key);
                None
            },
        }
    }

    /// Release the flush claim for `key`.
    pub fn end_flush(&self, key: &AlbumKey) {
        let mut flushing = self.flushing.lock().unwrap_or_else(|e| e.into_inner());
        flushing.remove(key);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn key(group: &str) -> AlbumKey {
        AlbumKey {
            source: ChannelId(-100),
            group: group.into(),
        }
    }

    fn targets() -> Vec<ChannelId> {
        vec![ChannelId(-200)]
    }

    #[test]
    fn decide_runs_once_per_group() {
        let buffers = AlbumBuffers::new();
        let mut decisions = 0;
        for id in [3, 1, 2] {
            buffers.add_fragment(&key("g"), MessageId(id), targets(), || {
                decisions += 1;
                true
            });
        }
        assert_eq!(decisions, 1);
    }

    #[test]
    fn flush_yields_sorted_unique_messages() {
        let buffers = AlbumBuffers::new();
        for id in [30, 10, 20, 10] {
            buffers.add_fragment(&key("g"), MessageId(id), targets(), || true);
        }
        let batch = buffers.begin_flush(&key("g")).unwrap();
        assert_eq!(
            batch.messages,
            vec![MessageId(10), MessageId(20), MessageId(30)]
        );
        assert_eq!(batch.targets, targets());
        buffers.end_flush(&key("g"));
    }

    #[test]
    fn later_fragments_refresh_targets() {
        let buffers = AlbumBuffers::new();
        buffers.add_fragment(&key("g"), MessageId(1), vec![ChannelId(-200)], || true);
        buffers.add_fragment(
            &key("g"),
            MessageId(2),
            vec![ChannelId(-200), ChannelId(-300)],
            || true,
        );
        let batch = buffers.begin_flush(&key("g")).unwrap();
        assert_eq!(batch.targets, vec![ChannelId(-200), ChannelId(-300)]);
        buffers.end_flush(&key("g"));
    }

    #[test]
    fn each_buffered_fragment_replaces_the_timer_token() {
        let buffers = AlbumBuffers::new();
        let AddOutcome::Buffered { cancel: first } =
            buffers.add_fragment(&key("g"), MessageId(1), targets(), || true)
        else {
            panic!("expected Buffered");
        };
        let AddOutcome::Buffered { cancel: second } =
            buffers.add_fragment(&key("g"), MessageId(2), targets(), || true)
        else {
            panic!("expected Buffered");
        };
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn skipped_group_discards_fragments() {
        let buffers = AlbumBuffers::new();
        let outcome = buffers.add_fragment(&key("g"), MessageId(1), targets(), || false);
        assert!(matches!(outcome, AddOutcome::SkippedNew { .. }));
        let outcome = buffers.add_fragment(&key("g"), MessageId(2), targets(), || true);
        assert!(matches!(outcome, AddOutcome::SkippedDrop));
        // Flushing a tombstone is a no-op that removes it.
        assert!(buffers.begin_flush(&key("g")).is_none());
        // Gone: a new fragment would start a fresh group.
        let outcome = buffers.add_fragment(&key("g"), MessageId(3), targets(), || true);
        assert!(matches!(outcome, AddOutcome::Buffered { .. }));
    }

    #[test]
    fn second_flush_claim_is_rejected() {
        let buffers = AlbumBuffers::new();
        buffers.add_fragment(&key("g"), MessageId(1), targets(), || true);
        let batch = buffers.begin_flush(&key("g"));
        assert!(batch.is_some());
        assert!(buffers.begin_flush(&key("g")).is_none());
        buffers.end_flush(&key("g"));
    }

    #[test]
    fn fragment_during_flush_is_dropped() {
        let buffers = AlbumBuffers::new();
        buffers.add_fragment(&key("g"), MessageId(1), targets(), || true);
        let _batch = buffers.begin_flush(&key("g")).unwrap();
        let outcome = buffers.add_fragment(&key("g"), MessageId(2), targets(), || true);
        assert!(matches!(outcome, AddOutcome::Flushing));
        buffers.end_flush(&key("g"));
    }

    #[test]
    fn flush_of_consumed_buffer_is_noop() {
        let buffers = AlbumBuffers::new();
        buffers.add_fragment(&key("g"), MessageId(1), targets(), || true);
        assert!(buffers.begin_flush(&key("g")).is_some());
        buffers.end_flush(&key("g"));
        assert!(buffers.begin_flush(&key("g")).is_none());
    }
}
