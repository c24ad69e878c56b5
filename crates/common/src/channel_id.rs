//! Canonical encoding of Telegram chat identifiers.
//!
//! Telegram reports the same chat under different raw encodings depending on
//! where the id was observed: broadcast channels as bare positive ids above
//! [`BROADCAST_THRESHOLD`], small groups as positive ids below it, users as
//! positive ids, and already-canonical ids as negatives. Everything courier
//! stores or compares goes through [`canonicalize`] first.

/// Raw ids above this are broadcast channels.
pub const BROADCAST_THRESHOLD: i64 = 1_000_000_000;

/// Offset applied to broadcast channel ids (the `-100…` prefix form).
pub const BROADCAST_PREFIX: i64 = 1_000_000_000_000;

/// Normalize a raw chat id to its canonical signed form.
///
/// Idempotent: canonical ids (negative or zero) pass through unchanged.
#[must_use]
pub fn canonicalize(raw: i64) -> i64 {
    if raw < 0 {
        raw
    } else if raw > BROADCAST_THRESHOLD {
        -(BROADCAST_PREFIX + raw)
    } else if raw > 0 {
        -raw
    } else {
        raw
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_channel_gets_prefix() {
        assert_eq!(canonicalize(1_234_567_890), -1_001_234_567_890);
    }

    #[test]
    fn small_group_is_negated() {
        assert_eq!(canonicalize(98_765), -98_765);
    }

    #[test]
    fn negative_passes_through() {
        assert_eq!(canonicalize(-1_001_234_567_890), -1_001_234_567_890);
        assert_eq!(canonicalize(-42), -42);
    }

    #[test]
    fn zero_passes_through() {
        assert_eq!(canonicalize(0), 0);
    }

    #[test]
    fn idempotent_for_all_forms() {
        for raw in [
            0,
            1,
            98_765,
            BROADCAST_THRESHOLD,
            BROADCAST_THRESHOLD + 1,
            1_234_567_890,
            -7,
            -1_001_234_567_890,
        ] {
            let once = canonicalize(raw);
            assert_eq!(canonicalize(once), once, "raw={raw}");
        }
    }

    #[test]
    fn threshold_itself_is_treated_as_group() {
        // The threshold is exclusive: exactly 10^9 is still a plain negation.
        assert_eq!(canonicalize(BROADCAST_THRESHOLD), -BROADCAST_THRESHOLD);
    }
}
