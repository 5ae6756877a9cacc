//! Session provisioning library
//!
//! Everything needed to pair a messaging account through a pairing code and
//! hand its session back to the user, minus the I/O glue that lives in the
//! server binary. Nothing here depends on the HTTP layer, so the workflow can
//! be tested with in-memory protocol clients.
//!
//! Provisioning flow:
//! 1. Caller's number normalized via `phone::PhoneNumber::parse()`
//! 2. Attempt directory created with `store::CredentialDir::create()`
//! 3. A `client::Connector` builds a session over that directory
//! 4. `attempt::handle_event()` decides when to request the code, retry,
//!    fail or deliver
//! 5. The code reaches the caller through `responder::CodeResponder`
//! 6. On open, credentials are read, uploaded and announced with a
//!    `session::SessionDescriptor` and `notify::Branding::confirmation()`

pub mod attempt;
pub mod client;
pub mod constants;
pub mod error;
pub mod notify;
pub mod phone;
pub mod responder;
pub mod session;
pub mod store;

pub use attempt::{
    AttemptAction, AttemptEvent, AttemptPolicy, AttemptState, FailureReason, handle_event,
};
pub use client::{
    BoxFuture, ClientSession, ConnectionEvent, Connector, LinkPreview, MessageKey,
    OutgoingMessage, SendOptions,
};
pub use constants::*;
pub use error::{Error, Result};
pub use notify::{Branding, error_notice};
pub use phone::PhoneNumber;
pub use responder::{CodeReply, CodeResponder};
pub use session::{SessionDescriptor, extract_reference, generate_session_id};
pub use store::CredentialDir;
