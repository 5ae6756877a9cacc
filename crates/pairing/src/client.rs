//! Protocol client abstraction
//!
//! The messaging protocol itself is spoken by an external client. The
//! workflow only needs a handful of operations from it: build a session over
//! an auth directory, ask for a pairing code, watch connection updates, send
//! messages and close. `Connector` and `ClientSession` capture exactly that.
//!
//! Uses `Pin<Box<dyn Future>>` return types so sessions can live behind
//! `Box<dyn ClientSession>` and connectors behind `Arc<dyn Connector>`.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::constants::AUTH_FAILURE_STATUS;
use crate::error::Result;

/// Boxed future returned by the client traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Connection update emitted by the protocol client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "connection", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// The account completed pairing; `account_id` is its own address.
    Open { account_id: String },
    /// The connection dropped, with the disconnect status if one was given.
    Close {
        #[serde(default)]
        status_code: Option<u16>,
    },
}

impl ConnectionEvent {
    /// Whether this is a close caused by the account rejecting the session.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ConnectionEvent::Close {
                status_code: Some(AUTH_FAILURE_STATUS)
            }
        )
    }
}

/// Large link preview attached to a text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub title: String,
    pub thumbnail_url: String,
    pub source_url: String,
    pub render_large_thumbnail: bool,
}

/// Message body sent through the protocol client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<LinkPreview>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            preview: None,
        }
    }
}

/// Key identifying a sent message, used for quoting it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    pub id: String,
    pub remote_jid: String,
}

/// Per-send options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Explicit message identifier; the client generates one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Message to quote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<MessageKey>,
}

impl SendOptions {
    pub fn with_id(message_id: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            quoted: None,
        }
    }

    pub fn quoting(key: MessageKey) -> Self {
        Self {
            message_id: None,
            quoted: Some(key),
        }
    }
}

/// One live protocol-client session bound to an auth directory.
///
/// The client persists credential updates into the auth directory itself;
/// the workflow never writes there.
pub trait ClientSession: Send + Sync {
    /// Whether the stored credentials already belong to a paired account.
    fn is_registered(&self) -> bool;

    /// Ask the server for a pairing code for `number` (digits only).
    fn request_pairing_code<'a>(&'a self, number: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Wait for the next connection update. `Ok(None)` means the event
    /// stream ended without a close status.
    fn next_event(&self) -> BoxFuture<'_, Result<Option<ConnectionEvent>>>;

    /// Send `message` to `jid`, returning the key of the sent message.
    fn send_message<'a>(
        &'a self,
        jid: &'a str,
        message: &'a OutgoingMessage,
        options: SendOptions,
    ) -> BoxFuture<'a, Result<MessageKey>>;

    /// Close the underlying socket.
    fn close(&self) -> BoxFuture<'_, Result<()>>;
}

/// Builds client sessions over an auth directory.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, auth_dir: &'a Path) -> BoxFuture<'a, Result<Box<dyn ClientSession>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_401_is_auth_failure() {
        assert!(
            ConnectionEvent::Close {
                status_code: Some(401)
            }
            .is_auth_failure()
        );
        assert!(
            !ConnectionEvent::Close {
                status_code: Some(408)
            }
            .is_auth_failure()
        );
        assert!(!ConnectionEvent::Close { status_code: None }.is_auth_failure());
        assert!(
            !ConnectionEvent::Open {
                account_id: "1555@s.whatsapp.net".into()
            }
            .is_auth_failure()
        );
    }

    #[test]
    fn connection_event_deserializes_tagged_json() {
        let open: ConnectionEvent =
            serde_json::from_str(r#"{"connection":"open","account_id":"1555:3@s.whatsapp.net"}"#)
                .unwrap();
        assert_eq!(
            open,
            ConnectionEvent::Open {
                account_id: "1555:3@s.whatsapp.net".into()
            }
        );

        let close: ConnectionEvent =
            serde_json::from_str(r#"{"connection":"close","status_code":401}"#).unwrap();
        assert!(close.is_auth_failure());

        let bare_close: ConnectionEvent =
            serde_json::from_str(r#"{"connection":"close"}"#).unwrap();
        assert_eq!(bare_close, ConnectionEvent::Close { status_code: None });
    }

    #[test]
    fn send_options_omit_empty_fields() {
        let json = serde_json::to_string(&SendOptions::default()).unwrap();
        assert_eq!(json, "{}");

        let json = serde_json::to_string(&SendOptions::with_id("3EBABC")).unwrap();
        assert_eq!(json, r#"{"message_id":"3EBABC"}"#);
    }
}
