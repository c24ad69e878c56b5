//! "Repost every Nth post" sampling.

use std::{collections::HashMap, sync::Mutex};

use courier_common::ChannelId;

use crate::settings::RuntimeSettings;

/// Per-source counter of logical posts observed.
///
/// One increment per logical post: a whole album counts once, however many
/// fragments it arrives in (the aggregator consults this only for the first
/// fragment of a new group).
#[derive(Default)]
pub struct DecimationCounter {
    counts: Mutex<HashMap<ChannelId, u64>>,
}

impl DecimationCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count this post and decide whether it should be forwarded.
    ///
    /// With `step` ≤ 1 every post is forwarded; otherwise every Nth,
    /// 1-indexed by arrival. The step is read live from `settings` on every
    /// call, so an admin change applies to the very next post.
    pub fn should_forward(&self, source: ChannelId, settings: &RuntimeSettings) -> bool {
        let count = {
            let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
            let count = counts.entry(source).or_insert(0);
            *count += 1;
            *count
        };
        let step = u64::from(settings.repost_step());
        step <= 1 || count % step == 0
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration};

    #[test]
    fn default_step_forwards_everything() {
        let counter = DecimationCounter::new();
        let settings = RuntimeSettings::default();
        for _ in 0..5 {
            assert!(counter.should_forward(ChannelId(-1), &settings));
        }
    }

    #[test]
    fn step_three_forwards_every_third() {
        let counter = DecimationCounter::new();
        let settings = RuntimeSettings::new(3, Duration::from_secs(1));
        let decisions: Vec<bool> = (0..9)
            .map(|_| counter.should_forward(ChannelId(-1), &settings))
            .collect();
        assert_eq!(
            decisions,
            [false, false, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn sources_are_counted_independently() {
        let counter = DecimationCounter::new();
        let settings = RuntimeSettings::new(2, Duration::from_secs(1));
        assert!(!counter.should_forward(ChannelId(-1), &settings));
        // A different source starts its own count.
        assert!(!counter.should_forward(ChannelId(-2), &settings));
        assert!(counter.should_forward(ChannelId(-1), &settings));
        assert!(counter.should_forward(ChannelId(-2), &settings));
    }

    #[test]
    fn step_change_applies_to_next_post() {
        let counter = DecimationCounter::new();
        let settings = RuntimeSettings::new(1, Duration::from_secs(1));
        assert!(counter.should_forward(ChannelId(-1), &settings)); // count 1
        settings.set_repost_step(2);
        assert!(counter.should_forward(ChannelId(-1), &settings)); // count 2
        assert!(!counter.should_forward(ChannelId(-1), &settings)); // count 3
    }
}
