//! Interactive OAuth for elicitations (authorization code + PKCE S256).
//!
//! Flow: metadata discovery → dynamic client registration → PKCE
//! challenge + state → ephemeral loopback callback server → browser →
//! code exchange. Every resource is scoped to the flow and released on
//! all exit paths; any discovery or registration failure means the
//! elicitation is declined rather than failed.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Query, State};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ens_domain::error::{Error, Result};

/// End-to-end ceiling for the interactive flow.
pub const OAUTH_TIMEOUT: Duration = Duration::from_secs(300);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discovery / registration wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct ServerMetadata {
    authorization_endpoint: String,
    token_endpoint: String,
    #[serde(default)]
    registration_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisteredClient {
    client_id: String,
}

/// Token response forwarded through `resume_elicitation`.
///
/// `Debug` is implemented by hand to keep the tokens out of logs.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl TokenGrant {
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "access_token": self.access_token,
            "token_type": self.token_type,
        });
        if let Some(expires_in) = self.expires_in {
            value["expires_in"] = expires_in.into();
        }
        if let Some(ref refresh_token) = self.refresh_token {
            value["refresh_token"] = refresh_token.clone().into();
        }
        value
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PKCE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// S256 code challenge for a verifier.
pub(crate) fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Callback server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
struct CallbackState {
    tx: mpsc::Sender<(String, String)>,
}

async fn callback_handler(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> &'static str {
    let code = params.get("code").cloned().unwrap_or_default();
    let returned_state = params.get("state").cloned().unwrap_or_default();
    let _ = state.tx.try_send((code, returned_state));
    "Authorization complete. You can close this tab."
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Flow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive flow against an authorization server.
///
/// Errors before the browser opens (discovery, missing registration
/// endpoint, registration failure) are the caller's cue to decline the
/// elicitation.
pub async fn authorize(
    http: &reqwest::Client,
    server_url: &str,
    cancel: &CancellationToken,
) -> Result<TokenGrant> {
    // 1. Discovery.
    let metadata_url = format!(
        "{}/.well-known/oauth-authorization-server",
        server_url.trim_end_matches('/')
    );
    let metadata: ServerMetadata = http
        .get(&metadata_url)
        .send()
        .await
        .map_err(|e| Error::Auth(format!("metadata discovery failed: {e}")))?
        .error_for_status()
        .map_err(|e| Error::Auth(format!("metadata discovery failed: {e}")))?
        .json()
        .await
        .map_err(|e| Error::Auth(format!("invalid server metadata: {e}")))?;

    let Some(registration_endpoint) = metadata.registration_endpoint else {
        return Err(Error::Auth(
            "server does not support dynamic client registration".into(),
        ));
    };

    // 2. Loopback callback server on an ephemeral port.
    let (callback_tx, mut callback_rx) = mpsc::channel::<(String, String)>(1);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(Error::Io)?;
    let port = listener.local_addr().map_err(Error::Io)?.port();
    let redirect_uri = format!("http://127.0.0.1:{port}/callback");

    let server_cancel = CancellationToken::new();
    let router = axum::Router::new()
        .route("/callback", axum::routing::get(callback_handler))
        .with_state(CallbackState { tx: callback_tx });
    let shutdown = server_cancel.clone();
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
    });

    let flow = async {
        // 3. Dynamic client registration.
        let client: RegisteredClient = http
            .post(&registration_endpoint)
            .json(&serde_json::json!({
                "redirect_uris": [redirect_uri],
                "grant_types": ["authorization_code"],
                "response_types": ["code"],
                "token_endpoint_auth_method": "none",
            }))
            .send()
            .await
            .map_err(|e| Error::Auth(format!("client registration failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Auth(format!("client registration failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Auth(format!("invalid registration response: {e}")))?;

        // 4. PKCE + state, then the browser.
        let verifier = random_urlsafe(32);
        let challenge = pkce_challenge(&verifier);
        let state = random_urlsafe(24);

        let authorize_url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&code_challenge={}&code_challenge_method=S256&state={}",
            metadata.authorization_endpoint,
            urlencode(&client.client_id),
            urlencode(&redirect_uri),
            challenge,
            state,
        );
        if webbrowser::open(&authorize_url).is_err() {
            tracing::warn!(url = %authorize_url, "could not open a browser; open the URL manually");
        }

        // 5. Wait for the redirect, bounded by the flow timeout.
        let (code, returned_state) = tokio::select! {
            received = tokio::time::timeout(OAUTH_TIMEOUT, callback_rx.recv()) => {
                match received {
                    Ok(Some(pair)) => pair,
                    Ok(None) => return Err(Error::Auth("callback channel closed".into())),
                    Err(_) => return Err(Error::Timeout("authorization timed out".into())),
                }
            }
            _ = cancel.cancelled() => return Err(Error::Canceled),
        };

        if returned_state != state {
            return Err(Error::Auth("state mismatch in authorization response".into()));
        }
        if code.is_empty() {
            return Err(Error::Auth("authorization response carried no code".into()));
        }

        // 6. Code exchange.
        let grant: TokenGrant = http
            .post(&metadata.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("client_id", client.client_id.as_str()),
                ("code_verifier", verifier.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token exchange failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Auth(format!("token exchange failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Auth(format!("invalid token response: {e}")))?;

        Ok(grant)
    };

    let result = flow.await;

    // The callback server dies with the flow on every exit path.
    server_cancel.cancel();
    let _ = server.await;

    result
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_challenge_matches_rfc7636_vector() {
        // RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn random_urlsafe_has_no_padding_or_reserved_chars() {
        let value = random_urlsafe(32);
        assert!(!value.contains('='));
        assert!(!value.contains('+'));
        assert!(!value.contains('/'));
        assert!(value.len() >= 43);
    }

    #[test]
    fn urlencode_escapes_reserved() {
        assert_eq!(urlencode("http://x/y?z=1"), "http%3A%2F%2Fx%2Fy%3Fz%3D1");
        assert_eq!(urlencode("plain-value_1.2~ok"), "plain-value_1.2~ok");
    }

    #[test]
    fn token_grant_debug_redacts_secrets() {
        let grant = TokenGrant {
            access_token: "secret".into(),
            token_type: "Bearer".into(),
            expires_in: Some(3600),
            refresh_token: Some("also-secret".into()),
        };
        let debug = format!("{grant:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn token_grant_json_omits_absent_fields() {
        let grant = TokenGrant {
            access_token: "tok".into(),
            token_type: "Bearer".into(),
            expires_in: None,
            refresh_token: None,
        };
        let json = grant.to_json();
        assert_eq!(json["access_token"], "tok");
        assert!(json.get("expires_in").is_none());
        assert!(json.get("refresh_token").is_none());
    }
}
