use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::error::ConfigError;

/// Configuration for the Telegram identities.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Primary bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Optional fallback identity token, tried when the primary hits a
    /// permission error.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(serialize_with = "serialize_secret_opt")]
    pub fallback_token: Option<Secret<String>>,

    /// User ids allowed to drive the admin command surface.
    pub owner_ids: Vec<u64>,
}

impl TelegramConfig {
    /// Startup validation: a primary token and at least one owner.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.expose_secret().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.owner_ids.is_empty() {
            return Err(ConfigError::NoOwners);
        }
        Ok(())
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            fallback_token: None,
            owner_ids: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("fallback_token", &self.fallback_token.as_ref().map(|_| "[REDACTED]"))
            .field("owner_ids", &self.owner_ids)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_secret_opt<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(secret) => serializer.serialize_str(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal() {
        let json = r#"{ "token": "123:ABC", "owner_ids": [42] }"#;
        let config: TelegramConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.token.expose_secret(), "123:ABC");
        assert!(config.fallback_token.is_none());
        assert_eq!(config.owner_ids, vec![42]);
        config.validate().unwrap();
    }

    #[test]
    fn deserialize_with_fallback() {
        let json = r#"{
            "token": "123:ABC",
            "fallback_token": "456:DEF",
            "owner_ids": [42]
        }"#;
        let config: TelegramConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.fallback_token.unwrap().expose_secret(), "456:DEF");
    }

    #[test]
    fn validate_rejects_empty_token() {
        let config = TelegramConfig {
            owner_ids: vec![42],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingToken));
    }

    #[test]
    fn validate_rejects_missing_owners() {
        let config = TelegramConfig {
            token: Secret::new("123:ABC".into()),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoOwners));
    }

    #[test]
    fn debug_redacts_tokens() {
        let config = TelegramConfig {
            token: Secret::new("123:ABC".into()),
            fallback_token: Some(Secret::new("456:DEF".into())),
            owner_ids: vec![42],
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("123:ABC"));
        assert!(!rendered.contains("456:DEF"));
    }
}
