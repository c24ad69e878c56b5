//! Permission-failure classification.
//!
//! Telegram reports permission problems as free-text API errors, not as a
//! structured code we could match on. This is a best-effort heuristic over
//! the error's rendered text; keep it isolated here and out of control flow
//! elsewhere.

/// Substrings (lowercase) that mark an error as permission-related.
pub const PERMISSION_MARKERS: &[&str] = &[
    "admin required",
    "write forbidden",
    "channels too much",
    "chat_admin_required",
    "chat_write_forbidden",
    "user_channels_too_much",
    "not enough rights",
    "insufficient rights",
    "no rights",
    "lack permission",
    "permission to access",
    "banned from it",
    "access denied",
    "forbidden",
];

/// Whether the error text describes a permission problem.
#[must_use]
pub fn is_permission_error(error: &anyhow::Error) -> bool {
    // `{:#}` renders the whole context chain, not just the outermost message.
    matches_permission_marker(&format!("{error:#}"))
}

/// Case-insensitive substring match against [`PERMISSION_MARKERS`].
#[must_use]
pub fn matches_permission_marker(text: &str) -> bool {
    let text = text.to_lowercase();
    PERMISSION_MARKERS.iter().any(|marker| text.contains(marker))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("Bad Request: CHAT_WRITE_FORBIDDEN")]
    #[case("CHAT_ADMIN_REQUIRED")]
    #[case("USER_CHANNELS_TOO_MUCH")]
    #[case("Forbidden: bot is not a member of the channel chat")]
    #[case("you were banned from it")]
    #[case("not enough rights to post")]
    #[case("ACCESS DENIED")]
    #[case("Access Denied")]
    fn matches_permission_texts(#[case] text: &str) {
        assert!(matches_permission_marker(text));
    }

    #[rstest]
    #[case("network timeout")]
    #[case("Bad Request: message to forward not found")]
    #[case("")]
    fn ignores_unrelated_errors(#[case] text: &str) {
        assert!(!matches_permission_marker(text));
    }

    #[test]
    fn reads_the_whole_context_chain() {
        let inner = anyhow::anyhow!("CHAT_WRITE_FORBIDDEN");
        let wrapped = inner.context("forwarding message 42");
        assert!(is_permission_error(&wrapped));
    }
}
