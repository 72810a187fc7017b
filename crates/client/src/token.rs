//! Join tokens
//!
//! Server-issued tokens are URLs such as
//! `wss://media.example.org:4443?sessionId=ses_A&token=tok_B&secret=S&recorder=true`.
//! Anything that does not parse that way is treated as an opaque token.

use crate::{Error, Result};
use url::Url;

/// Credentials for `joinRoom`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinToken {
    /// Value forwarded as `token`
    pub token: String,
    pub session_id: Option<String>,
    pub secret: String,
    pub recorder: bool,
    /// Signaling endpoint derived from the token's host
    pub signaling_url: Option<String>,
}

impl JoinToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidToken("empty token".to_string()));
        }

        let Ok(url) = Url::parse(raw) else {
            return Ok(Self::opaque(raw));
        };

        let mut session_id = None;
        let mut token = None;
        let mut secret = String::new();
        let mut recorder = false;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "sessionId" => session_id = Some(value.into_owned()),
                "token" => token = Some(value.into_owned()),
                "secret" => secret = value.into_owned(),
                "recorder" => recorder = value == "true",
                _ => {}
            }
        }

        let (Some(session_id), Some(_)) = (session_id, token) else {
            return Ok(Self::opaque(raw));
        };

        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidToken(format!("token URL has no host: {}", raw)))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            token: raw.to_string(),
            session_id: Some(session_id),
            secret,
            recorder,
            signaling_url: Some(format!("wss://{}/openvidu", authority)),
        })
    }

    fn opaque(raw: &str) -> Self {
        Self {
            token: raw.to_string(),
            session_id: None,
            secret: String::new(),
            recorder: false,
            signaling_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_token() {
        let token = JoinToken::parse(
            "wss://media.example.org:4443?sessionId=ses_A&token=tok_B&role=PUBLISHER&secret=S3&recorder=true",
        )
        .unwrap();
        assert_eq!(token.session_id.as_deref(), Some("ses_A"));
        assert_eq!(token.secret, "S3");
        assert!(token.recorder);
        assert_eq!(
            token.signaling_url.as_deref(),
            Some("wss://media.example.org:4443/openvidu")
        );
        assert!(token.token.starts_with("wss://"));
    }

    #[test]
    fn test_url_without_session_is_opaque() {
        let token = JoinToken::parse("https://example.org/?token=abc").unwrap();
        assert_eq!(token.session_id, None);
        assert_eq!(token.signaling_url, None);
    }

    #[test]
    fn test_opaque_token() {
        let token = JoinToken::parse("tok_12345").unwrap();
        assert_eq!(token.token, "tok_12345");
        assert!(!token.recorder);
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(JoinToken::parse("  "), Err(Error::InvalidToken(_))));
    }
}
