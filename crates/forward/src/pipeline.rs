//! The forwarding pipeline orchestrator.

use std::sync::{Arc, Weak};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    courier_bindings::BindingStore,
    courier_common::{ChannelId, DedupKey, Identity, InboundPost},
};

use crate::{
    album::{AddOutcome, AlbumBuffers, AlbumKey},
    classify,
    client::{ForwardRequest, IdentityPool},
    decimate::DecimationCounter,
    dedup::DedupLedger,
    routing::RoutingMemory,
    settings::RuntimeSettings,
};

/// Ties the pipeline together: binding resolution, decimation, album
/// aggregation, deduplication, and identity failover.
///
/// All mutable state is owned here and guarded per structure; nothing is
/// process-global. One instance serves every listening identity.
pub struct Forwarder {
    bindings: Arc<dyn BindingStore>,
    pool: IdentityPool,
    settings: Arc<RuntimeSettings>,
    routing: RoutingMemory,
    dedup: DedupLedger,
    decimation: DecimationCounter,
    albums: AlbumBuffers,
    /// Self-handle for the debounce timer tasks.
    weak: Weak<Forwarder>,
}

impl Forwarder {
    #[must_use]
    pub fn new(
        bindings: Arc<dyn BindingStore>,
        pool: IdentityPool,
        settings: Arc<RuntimeSettings>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            bindings,
            pool,
            settings,
            routing: RoutingMemory::new(),
            dedup: DedupLedger::new(),
            decimation: DecimationCounter::new(),
            albums: AlbumBuffers::new(),
            weak: weak.clone(),
        })
    }

    /// Handle one inbound post event.
    ///
    /// Never fails: every failure path degrades to a logged, skipped
    /// delivery, local to one (post, target) pair.
    pub async fn handle_post(&self, post: InboundPost) {
        let source = ChannelId::canonical(post.source.0);

        let targets = match self.bindings.targets_for(source).await {
            Ok(targets) => targets,
            Err(error) => {
                warn!(%source, error = %error, "binding lookup failed, dropping post");
                return;
            },
        };
        if targets.is_empty() {
            debug!(%source, message = %post.message, "no targets bound, ignoring post");
            return;
        }

        match &post.group {
            Some(group) => {
                let key = AlbumKey {
                    source,
                    group: group.clone(),
                };
                self.handle_album_fragment(key, &post, targets);
            },
            None => self.handle_single(source, &post, &targets).await,
        }
    }

    async fn handle_single(&self, source: ChannelId, post: &InboundPost, targets: &[ChannelId]) {
        let key = DedupKey::Message(source, post.message);
        if !self.dedup.reserve(&key) {
            debug!(%source, message = %post.message, via = %post.via, "duplicate post, ignoring");
            return;
        }

        if !self.decimation.should_forward(source, &self.settings) {
            // Remember the skip so a duplicate delivery is not re-counted.
            self.dedup.commit(&key);
            info!(
                %source,
                message = %post.message,
                step = self.settings.repost_step(),
                "post skipped by decimation"
            );
            return;
        }

        let request = ForwardRequest::Single(post.message);
        let delivered = self.forward_to_targets(source, targets, &request).await;
        if delivered > 0 {
            self.dedup.commit(&key);
        } else {
            self.dedup.release(&key);
        }
    }

    fn handle_album_fragment(&self, key: AlbumKey, post: &InboundPost, targets: Vec<ChannelId>) {
        let dedup_key = DedupKey::Album(key.source, key.group.clone());
        if self.dedup.is_duplicate(&dedup_key) {
            debug!(album = %key, via = %post.via, "duplicate album fragment, ignoring");
            return;
        }

        let outcome = self.albums.add_fragment(&key, post.message, targets, || {
            self.decimation.should_forward(key.source, &self.settings)
        });

        match outcome {
            AddOutcome::Buffered { cancel } => {
                debug!(album = %key, message = %post.message, "album fragment buffered");
                self.arm_album_timer(key, cancel);
            },
            AddOutcome::SkippedNew { cancel } => {
                self.dedup.mark_seen(&dedup_key);
                info!(
                    album = %key,
                    step = self.settings.repost_step(),
                    "album skipped by decimation"
                );
                // One fixed timer so the tombstone does not outlive the burst.
                self.arm_album_timer(key, cancel);
            },
            AddOutcome::SkippedDrop | AddOutcome::Flushing => {
                debug!(album = %key, message = %post.message, "album fragment dropped");
            },
        }
    }

    /// Arm the debounce timer for an album key. The token was freshly issued
    /// by the buffer; a newer fragment cancels it and arms its own.
    fn arm_album_timer(&self, key: AlbumKey, cancel: CancellationToken) {
        let Some(forwarder) = self.weak.upgrade() else {
            return;
        };
        let idle = self.settings.album_idle();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {},
                () = tokio::time::sleep(idle) => forwarder.flush_album(key).await,
            }
        });
    }

    async fn flush_album(&self, key: AlbumKey) {
        let Some(batch) = self.albums.begin_flush(&key) else {
            return;
        };

        let request = ForwardRequest::Album(batch.messages);
        let delivered = self
            .forward_to_targets(key.source, &batch.targets, &request)
            .await;
        if delivered > 0 {
            self.dedup
                .mark_seen(&DedupKey::Album(key.source, key.group.clone()));
        }
        self.albums.end_flush(&key);
    }

    /// Fan out to every target. Failure domains are independent: one target
    /// failing never aborts the rest. Returns how many targets succeeded.
    async fn forward_to_targets(
        &self,
        source: ChannelId,
        targets: &[ChannelId],
        request: &ForwardRequest,
    ) -> usize {
        let mut delivered = 0;
        for target in targets {
            if self.forward_with_failover(source, *target, request).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// One forward attempt with at most one failover retry.
    async fn forward_with_failover(
        &self,
        source: ChannelId,
        target: ChannelId,
        request: &ForwardRequest,
    ) -> bool {
        let identity = if self.routing.prefers_fallback(target) && self.pool.has_fallback() {
            Identity::Fallback
        } else {
            Identity::Primary
        };

        match self.pool.forward(identity, target, source, request).await {
            Ok(()) => {
                info!(%source, %target, %identity, "forwarded");
                match identity {
                    Identity::Primary => self.routing.note_primary_success(target),
                    Identity::Fallback => self.routing.note_fallback_success(target),
                }
                true
            },
            Err(error) => {
                let permission = classify::is_permission_error(&error);
                warn!(%source, %target, %identity, permission, error = %error, "forward failed");

                if !(permission && identity == Identity::Primary && self.pool.has_fallback()) {
                    return false;
                }

                info!(%source, %target, "retrying through fallback identity");
                match self
                    .pool
                    .forward(Identity::Fallback, target, source, request)
                    .await
                {
                    Ok(()) => {
                        info!(%source, %target, identity = %Identity::Fallback, "forwarded");
                        self.routing.note_fallback_success(target);
                        true
                    },
                    Err(error) => {
                        warn!(%source, %target, error = %error, "both identities failed");
                        false
                    },
                }
            },
        }
    }
}
