//! Per-target identity routing memory.
//!
//! Once a target is known to need the fallback identity, keep using it; only
//! an explicit success through the primary identity clears the preference.
//! Nothing here is persisted — after a restart the preference is rebuilt by
//! trial.

use std::{collections::HashMap, sync::Mutex};

use courier_common::ChannelId;

#[derive(Default)]
pub struct RoutingMemory {
    prefers_fallback: Mutex<HashMap<ChannelId, bool>>,
}

impl RoutingMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefers_fallback(&self, target: ChannelId) -> bool {
        let map = self.prefers_fallback.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&target).copied().unwrap_or(false)
    }

    /// A forward through the fallback identity succeeded: the preference is
    /// sticky from here on.
    pub fn note_fallback_success(&self, target: ChannelId) {
        let mut map = self.prefers_fallback.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(target, true);
    }

    /// A forward through the primary identity succeeded: the target is
    /// reachable again without the fallback.
    pub fn note_primary_success(&self, target: ChannelId) {
        let mut map = self.prefers_fallback.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&target);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_target_prefers_primary() {
        let memory = RoutingMemory::new();
        assert!(!memory.prefers_fallback(ChannelId(-1)));
    }

    #[test]
    fn fallback_success_is_sticky() {
        let memory = RoutingMemory::new();
        memory.note_fallback_success(ChannelId(-1));
        assert!(memory.prefers_fallback(ChannelId(-1)));
        // Another fallback success does not flip anything.
        memory.note_fallback_success(ChannelId(-1));
        assert!(memory.prefers_fallback(ChannelId(-1)));
    }

    #[test]
    fn primary_success_clears_the_preference() {
        let memory = RoutingMemory::new();
        memory.note_fallback_success(ChannelId(-1));
        memory.note_primary_success(ChannelId(-1));
        assert!(!memory.prefers_fallback(ChannelId(-1)));
    }

    #[test]
    fn targets_are_independent() {
        let memory = RoutingMemory::new();
        memory.note_fallback_success(ChannelId(-1));
        assert!(!memory.prefers_fallback(ChannelId(-2)));
    }
}
