//! Single-assignment reply to the HTTP caller
//!
//! Several paths of an attempt can produce the caller's answer: the code
//! request succeeding, the code request failing, or the attempt ending
//! before either happened. The first `respond` wins; later ones are no-ops.
//! If the responder is dropped unanswered, the receiver sees a closed
//! channel and the caller gets the unavailable placeholder.

use tokio::sync::oneshot;

/// What the HTTP caller receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeReply {
    Code(String),
    Unavailable,
}

/// Sending half of the reply channel.
#[derive(Debug)]
pub struct CodeResponder {
    tx: Option<oneshot::Sender<CodeReply>>,
}

impl CodeResponder {
    /// Create a responder and the receiver the HTTP handler waits on.
    pub fn channel() -> (Self, oneshot::Receiver<CodeReply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Deliver `reply` if nothing was delivered yet. Returns whether this
    /// call was the one that answered.
    pub fn respond(&mut self, reply: CodeReply) -> bool {
        match self.tx.take() {
            // A dropped receiver still counts as answered
            Some(tx) => {
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.tx.is_some()
    }
}
