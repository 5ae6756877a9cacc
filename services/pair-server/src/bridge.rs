//! Protocol bridge integration via its local HTTP API
//!
//! The messaging protocol is spoken by a bridge sidecar that owns the
//! socket, the signal key store and credential persistence. This service
//! drives it over HTTP:
//!
//! - `GET    /health`                     readiness probe
//! - `POST   /sessions`                   build a session over an auth dir
//! - `POST   /sessions/{id}/pairing-code` request a pairing code
//! - `GET    /sessions/{id}/events`       long-poll the next connection update
//! - `POST   /sessions/{id}/messages`     send a message
//! - `DELETE /sessions/{id}`              close the socket
//!
//! The bridge writes every credential update into the auth directory it was
//! given, so the exported `creds.json` is always the bridge's latest state.

use std::path::Path;
use std::time::Duration;

use pairing::{
    BoxFuture, ClientSession, ConnectionEvent, Connector, MessageKey, OutgoingMessage,
    SendOptions,
};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

/// Platform advertised for every session
const BROWSER_PLATFORM: &str = "Mac OS";

/// Pause between empty long-poll responses
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Identity of a reachable bridge, obtained at startup.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    pub url: String,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct BrowserIdentity<'a> {
    platform: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    auth_dir: &'a str,
    browser: BrowserIdentity<'a>,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
    #[serde(default)]
    registered: bool,
}

#[derive(Debug, Serialize)]
struct PairingCodeRequest<'a> {
    number: &'a str,
}

#[derive(Debug, Deserialize)]
struct PairingCodeResponse {
    code: String,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    #[serde(default)]
    event: Option<ConnectionEvent>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    jid: &'a str,
    message: &'a OutgoingMessage,
    options: SendOptions,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    key: MessageKey,
}

/// Check that the bridge is up and willing to serve.
///
/// Connection failures and 5xx are `BridgeUnreachable` (retryable); any
/// other non-success status is `BridgeRejected`.
pub async fn probe(client: &reqwest::Client, url: &str) -> Result<BridgeHandle> {
    let health_url = format!("{}/health", url.trim_end_matches('/'));
    let response = client
        .get(&health_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .map_err(|e| Error::BridgeUnreachable(format!("{health_url}: {e}")))?;

    let status = response.status();
    if status.is_server_error() {
        return Err(Error::BridgeUnreachable(format!(
            "{health_url} returned {status}"
        )));
    }
    if !status.is_success() {
        return Err(Error::BridgeRejected(format!(
            "{health_url} returned {status}"
        )));
    }

    let health = response
        .json::<HealthResponse>()
        .await
        .map_err(|e| Error::BridgeRejected(format!("invalid health response: {e}")))?;

    info!(url, version = ?health.version, "protocol bridge reachable");
    Ok(BridgeHandle {
        url: url.trim_end_matches('/').to_string(),
        version: health.version,
    })
}

/// Turn a non-success response into an error carrying status and body.
async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    format!("bridge returned {status}: {body}")
}

/// `Connector` that opens sessions on the bridge.
pub struct BridgeConnector {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    browsers: Vec<String>,
}

impl BridgeConnector {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        timeout: Duration,
        browsers: Vec<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            browsers,
        }
    }

    fn pick_browser(&self) -> &str {
        if self.browsers.is_empty() {
            return "Safari";
        }
        let idx = rand::rng().random_range(0..self.browsers.len());
        &self.browsers[idx]
    }

    #[instrument(skip_all, fields(auth_dir = %auth_dir.display()))]
    async fn create_session(&self, auth_dir: &Path) -> pairing::Result<Box<dyn ClientSession>> {
        let auth_dir = auth_dir.to_string_lossy();
        let browser = self.pick_browser();
        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .timeout(self.timeout)
            .json(&CreateSessionRequest {
                auth_dir: &auth_dir,
                browser: BrowserIdentity {
                    platform: BROWSER_PLATFORM,
                    name: browser,
                },
            })
            .send()
            .await
            .map_err(|e| pairing::Error::Client(format!("creating session: {e}")))?;

        if !response.status().is_success() {
            return Err(pairing::Error::Client(error_body(response).await));
        }

        let created = response
            .json::<CreateSessionResponse>()
            .await
            .map_err(|e| pairing::Error::Client(format!("invalid session response: {e}")))?;

        debug!(session_id = %created.session_id, registered = created.registered, browser, "bridge session created");
        Ok(Box::new(BridgeSession {
            client: self.client.clone(),
            session_url: format!("{}/sessions/{}", self.base_url, created.session_id),
            registered: created.registered,
            timeout: self.timeout,
        }))
    }
}

impl Connector for BridgeConnector {
    fn connect<'a>(
        &'a self,
        auth_dir: &'a Path,
    ) -> BoxFuture<'a, pairing::Result<Box<dyn ClientSession>>> {
        Box::pin(self.create_session(auth_dir))
    }
}

/// One session living on the bridge.
pub struct BridgeSession {
    client: reqwest::Client,
    session_url: String,
    registered: bool,
    timeout: Duration,
}

impl BridgeSession {
    async fn pairing_code(&self, number: &str) -> pairing::Result<String> {
        let response = self
            .client
            .post(format!("{}/pairing-code", self.session_url))
            .timeout(self.timeout)
            .json(&PairingCodeRequest { number })
            .send()
            .await
            .map_err(|e| pairing::Error::PairingCode(e.to_string()))?;

        if !response.status().is_success() {
            return Err(pairing::Error::PairingCode(error_body(response).await));
        }

        let parsed = response
            .json::<PairingCodeResponse>()
            .await
            .map_err(|e| pairing::Error::PairingCode(format!("invalid response: {e}")))?;
        Ok(parsed.code)
    }

    async fn poll_event(&self) -> pairing::Result<Option<ConnectionEvent>> {
        let events_url = format!("{}/events", self.session_url);
        loop {
            let response = self
                .client
                .get(&events_url)
                .timeout(self.timeout)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                // The bridge holds the poll open; hitting our own timeout just means "nothing yet"
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(pairing::Error::Client(format!("polling events: {e}"))),
            };

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(pairing::Error::Client(error_body(response).await));
            }

            let parsed = response
                .json::<EventResponse>()
                .await
                .map_err(|e| pairing::Error::Client(format!("invalid event response: {e}")))?;

            match parsed.event {
                Some(event) => return Ok(Some(event)),
                None => tokio::time::sleep(EVENT_POLL_INTERVAL).await,
            }
        }
    }

    async fn send(
        &self,
        jid: &str,
        message: &OutgoingMessage,
        options: SendOptions,
    ) -> pairing::Result<MessageKey> {
        let response = self
            .client
            .post(format!("{}/messages", self.session_url))
            .timeout(self.timeout)
            .json(&SendMessageRequest {
                jid,
                message,
                options,
            })
            .send()
            .await
            .map_err(|e| pairing::Error::Send(e.to_string()))?;

        if !response.status().is_success() {
            return Err(pairing::Error::Send(error_body(response).await));
        }

        let parsed = response
            .json::<SendMessageResponse>()
            .await
            .map_err(|e| pairing::Error::Send(format!("invalid response: {e}")))?;
        Ok(parsed.key)
    }

    async fn delete(&self) -> pairing::Result<()> {
        let response = self
            .client
            .delete(&self.session_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| pairing::Error::Client(format!("closing session: {e}")))?;

        // Already gone counts as closed
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(pairing::Error::Client(error_body(response).await))
    }
}

impl ClientSession for BridgeSession {
    fn is_registered(&self) -> bool {
        self.registered
    }

    fn request_pairing_code<'a>(&'a self, number: &'a str) -> BoxFuture<'a, pairing::Result<String>> {
        Box::pin(self.pairing_code(number))
    }

    fn next_event(&self) -> BoxFuture<'_, pairing::Result<Option<ConnectionEvent>>> {
        Box::pin(self.poll_event())
    }

    fn send_message<'a>(
        &'a self,
        jid: &'a str,
        message: &'a OutgoingMessage,
        options: SendOptions,
    ) -> BoxFuture<'a, pairing::Result<MessageKey>> {
        Box::pin(self.send(jid, message, options))
    }

    fn close(&self) -> BoxFuture<'_, pairing::Result<()>> {
        Box::pin(self.delete())
    }
}
