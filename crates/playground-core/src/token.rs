use std::time::Duration;

use livekit_api::access_token::{AccessToken, VideoGrants};
use url::Url;

use crate::errors::PlaygroundError;

/// Room joined by minted development tokens unless `LIVEKIT_ROOM` says otherwise.
pub const DEFAULT_ROOM: &str = "playground";

const DEV_TOKEN_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Turn user input into a LiveKit signaling URL.
///
/// Accepts `wss://host`, `https://host` (rewritten to `wss`), `http://host`
/// (rewritten to `ws`) or a bare `host[:port]` (assumed `wss`).
pub fn normalize_server_url(input: &str) -> Result<String, PlaygroundError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PlaygroundError::InvalidUrl("server URL is empty".into()));
    }

    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("wss://{input}")
    };

    let mut url = Url::parse(&candidate)
        .map_err(|e| PlaygroundError::InvalidUrl(format!("'{input}': {e}")))?;

    let scheme = match url.scheme() {
        "wss" | "https" => "wss",
        "ws" | "http" => "ws",
        other => {
            return Err(PlaygroundError::InvalidUrl(format!(
                "unsupported scheme '{other}' in '{input}'"
            )));
        }
    };
    if url.host_str().is_none_or(str::is_empty) {
        return Err(PlaygroundError::InvalidUrl(format!("'{input}' has no host")));
    }
    url.set_scheme(scheme)
        .map_err(|_| PlaygroundError::InvalidUrl(format!("cannot use scheme {scheme}")))?;

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// API credentials used to mint join tokens against a development server.
#[derive(Debug, Clone, PartialEq)]
pub struct DevTokenConfig {
    pub api_key: String,
    pub api_secret: String,
    pub room: String,
    pub identity: String,
}

impl DevTokenConfig {
    /// Read `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET`, `LIVEKIT_ROOM` and
    /// `LIVEKIT_IDENTITY`. Returns `None` unless both credentials are present.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let api_key = non_empty("LIVEKIT_API_KEY")?;
        let api_secret = non_empty("LIVEKIT_API_SECRET")?;
        let room = non_empty("LIVEKIT_ROOM").unwrap_or_else(|| DEFAULT_ROOM.to_string());
        let identity = non_empty("LIVEKIT_IDENTITY").unwrap_or_else(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("playground-{}", &suffix[..8])
        });
        Some(Self {
            api_key,
            api_secret,
            room,
            identity,
        })
    }

    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Mint a join token allowed to publish and subscribe in `room`.
    pub fn mint(&self) -> Result<String, PlaygroundError> {
        let token = AccessToken::with_api_key(&self.api_key, &self.api_secret)
            .with_identity(&self.identity)
            .with_name(&self.identity)
            .with_ttl(DEV_TOKEN_TTL)
            .with_grants(VideoGrants {
                room_join: true,
                room: self.room.clone(),
                can_publish: true,
                can_subscribe: true,
                ..Default::default()
            })
            .to_jwt()
            .map_err(|e| PlaygroundError::Token(e.to_string()))?;
        tracing::info!(room = %self.room, identity = %self.identity, "minted development token");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livekit_api::access_token::TokenVerifier;
    use std::collections::HashMap;

    #[test]
    fn wss_url_is_kept() {
        assert_eq!(
            normalize_server_url("wss://demo.livekit.cloud").unwrap(),
            "wss://demo.livekit.cloud"
        );
    }

    #[test]
    fn https_becomes_wss() {
        assert_eq!(
            normalize_server_url(" https://demo.livekit.cloud/ ").unwrap(),
            "wss://demo.livekit.cloud"
        );
    }

    #[test]
    fn http_becomes_ws_and_keeps_port() {
        assert_eq!(
            normalize_server_url("http://localhost:7880").unwrap(),
            "ws://localhost:7880"
        );
    }

    #[test]
    fn bare_host_defaults_to_wss() {
        assert_eq!(
            normalize_server_url("demo.livekit.cloud").unwrap(),
            "wss://demo.livekit.cloud"
        );
    }

    #[test]
    fn invalid_urls_are_rejected() {
        for input in ["", "   ", "ftp://demo.livekit.cloud", "wss://", "http://"] {
            assert!(
                matches!(normalize_server_url(input), Err(PlaygroundError::InvalidUrl(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn dev_config_needs_both_credentials() {
        let env = HashMap::from([("LIVEKIT_API_KEY", "devkey")]);
        assert!(DevTokenConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).is_none());
    }

    #[test]
    fn dev_config_defaults_room_and_identity() {
        let env = HashMap::from([("LIVEKIT_API_KEY", "devkey"), ("LIVEKIT_API_SECRET", "secret")]);
        let config = DevTokenConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.room, DEFAULT_ROOM);
        assert!(config.identity.starts_with("playground-"));
        assert_eq!(config.identity.len(), "playground-".len() + 8);
    }

    #[test]
    fn minted_token_grants_room_join() {
        let config = DevTokenConfig {
            api_key: "devkey".to_string(),
            api_secret: "a-development-secret-of-sufficient-length".to_string(),
            room: "standup".to_string(),
            identity: "alice".to_string(),
        };
        let jwt = config.mint().unwrap();

        let claims = TokenVerifier::with_api_key(&config.api_key, &config.api_secret)
            .verify(&jwt)
            .unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.video.room_join);
        assert_eq!(claims.video.room, "standup");
    }
}
