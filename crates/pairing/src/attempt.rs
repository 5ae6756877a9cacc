//! Pairing attempt state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! The runner executes the I/O implied by each action and feeds the result
//! back in as the next event.
//!
//! Lifecycle of one attempt:
//!
//! ```text
//! Initializing --StoreReady--> AwaitingCode --CodeIssued--> Connecting
//!                                   |                        |  |  |
//!                         CodeRequestFailed          open    |  |  close(other)
//!                                   v                  v     |  v
//!                                 Failed          Succeeded  | Retrying --RetryTimer--> Initializing
//!                                                            |
//!                                                       close(401) -> Failed
//! ```

use std::time::Duration;

use crate::client::ConnectionEvent;

/// Why an attempt ended without delivering a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The pairing code could not be obtained
    RequestError(String),
    /// The account rejected the session (close status 401)
    AuthFailure,
    /// `max_retries` reconnects were used up
    RetriesExhausted,
    /// The attempt outlived `attempt_deadline`
    DeadlineExceeded,
}

impl FailureReason {
    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::RequestError(_) => "request_failed",
            FailureReason::AuthFailure => "auth_failed",
            FailureReason::RetriesExhausted => "retries_exhausted",
            FailureReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Attempt states. `retries` counts reconnects already performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    /// Temp store and client session being set up
    Initializing { retries: u32 },
    /// Waiting for the pairing code
    AwaitingCode { retries: u32 },
    /// Code issued (or session already registered), waiting for open/close
    Connecting { retries: u32 },
    /// Connection opened; session is being delivered
    Succeeded { account_id: String, retries: u32 },
    /// Transient close; waiting out the retry delay
    Retrying { retries: u32 },
    /// Terminal failure
    Failed { reason: FailureReason, retries: u32 },
}

impl AttemptState {
    pub fn initial() -> Self {
        AttemptState::Initializing { retries: 0 }
    }

    /// Lifecycle label for the attempt registry.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptState::Initializing { .. } => "initializing",
            AttemptState::AwaitingCode { .. } => "awaiting_code",
            AttemptState::Connecting { .. } => "connecting",
            AttemptState::Succeeded { .. } => "succeeded",
            AttemptState::Retrying { .. } => "retrying",
            AttemptState::Failed { .. } => "failed",
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            AttemptState::Initializing { retries }
            | AttemptState::AwaitingCode { retries }
            | AttemptState::Connecting { retries }
            | AttemptState::Succeeded { retries, .. }
            | AttemptState::Retrying { retries }
            | AttemptState::Failed { retries, .. } => *retries,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Succeeded { .. } | AttemptState::Failed { .. }
        )
    }
}

/// Events that drive attempt transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptEvent {
    /// Temp store created and client session constructed
    StoreReady { registered: bool },
    /// Pairing code obtained and handed to the caller
    CodeIssued,
    /// Pairing code request failed
    CodeRequestFailed(String),
    /// Connection update from the protocol client
    Connection(ConnectionEvent),
    /// Retry delay expired
    RetryTimer,
    /// `AttemptPolicy::deadline` passed while waiting on the client
    DeadlineElapsed,
}

/// Actions the runner should execute after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptAction {
    /// Wait `delay`, then request a pairing code
    RequestCode { delay: Duration },
    /// Listen for connection updates
    AwaitConnection,
    /// Wait `settle`, then export, upload, notify and clean up
    DeliverSession { settle: Duration },
    /// Close the session, clean up, wait `delay`, then send `RetryTimer`
    ScheduleRetry { delay: Duration },
    /// Close the session and clean up; the attempt is over
    Abort,
    /// Recreate the temp store and client session
    Reconnect,
    /// No-op
    None,
}

/// Timing and retry bounds for an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPolicy {
    /// Wait between session construction and the code request
    pub code_delay: Duration,
    /// Wait after `open` before reading credentials
    pub settle_delay: Duration,
    /// Wait between cleanup and the next cycle after a transient close
    pub retry_delay: Duration,
    /// Reconnects allowed before giving up; `None` retries forever
    pub max_retries: Option<u32>,
    /// Total lifetime allowed; `None` has no limit
    pub deadline: Option<Duration>,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            code_delay: Duration::from_millis(1500),
            settle_delay: Duration::from_millis(4000),
            retry_delay: Duration::from_millis(2000),
            max_retries: None,
            deadline: None,
        }
    }
}

/// Handle a state transition. Pure function: no I/O.
///
/// `elapsed` is the time since the attempt started and is only consulted
/// when deciding whether a transient close may still be retried.
pub fn handle_event(
    state: AttemptState,
    event: AttemptEvent,
    policy: &AttemptPolicy,
    elapsed: Duration,
) -> (AttemptState, AttemptAction) {
    match (state, event) {
        // --- Initializing ---
        (AttemptState::Initializing { retries }, AttemptEvent::StoreReady { registered: false }) => (
            AttemptState::AwaitingCode { retries },
            AttemptAction::RequestCode {
                delay: policy.code_delay,
            },
        ),

        (AttemptState::Initializing { retries }, AttemptEvent::StoreReady { registered: true }) => (
            AttemptState::Connecting { retries },
            AttemptAction::AwaitConnection,
        ),

        // Session construction failing is reported the same way as a failed code request
        (
            AttemptState::Initializing { retries } | AttemptState::AwaitingCode { retries },
            AttemptEvent::CodeRequestFailed(error),
        ) => (
            AttemptState::Failed {
                reason: FailureReason::RequestError(error),
                retries,
            },
            AttemptAction::Abort,
        ),

        // --- AwaitingCode ---
        (AttemptState::AwaitingCode { retries }, AttemptEvent::CodeIssued) => (
            AttemptState::Connecting { retries },
            AttemptAction::AwaitConnection,
        ),

        // --- Connecting ---
        (
            AttemptState::Connecting { retries },
            AttemptEvent::Connection(ConnectionEvent::Open { account_id }),
        ) => (
            AttemptState::Succeeded {
                account_id,
                retries,
            },
            AttemptAction::DeliverSession {
                settle: policy.settle_delay,
            },
        ),

        (AttemptState::Connecting { retries }, AttemptEvent::Connection(event))
            if event.is_auth_failure() =>
        {
            (
                AttemptState::Failed {
                    reason: FailureReason::AuthFailure,
                    retries,
                },
                AttemptAction::Abort,
            )
        }

        (
            AttemptState::Connecting { retries },
            AttemptEvent::Connection(ConnectionEvent::Close { .. }),
        ) => {
            if policy.max_retries.is_some_and(|max| retries >= max) {
                (
                    AttemptState::Failed {
                        reason: FailureReason::RetriesExhausted,
                        retries,
                    },
                    AttemptAction::Abort,
                )
            } else if policy.deadline.is_some_and(|deadline| elapsed >= deadline) {
                (
                    AttemptState::Failed {
                        reason: FailureReason::DeadlineExceeded,
                        retries,
                    },
                    AttemptAction::Abort,
                )
            } else {
                (
                    AttemptState::Retrying { retries },
                    AttemptAction::ScheduleRetry {
                        delay: policy.retry_delay,
                    },
                )
            }
        }

        // --- Retrying ---
        (AttemptState::Retrying { retries }, AttemptEvent::RetryTimer) => (
            AttemptState::Initializing {
                retries: retries + 1,
            },
            AttemptAction::Reconnect,
        ),

        // --- Any live state + deadline = stop ---
        (state, AttemptEvent::DeadlineElapsed) if !state.is_terminal() => (
            AttemptState::Failed {
                reason: FailureReason::DeadlineExceeded,
                retries: state.retries(),
            },
            AttemptAction::Abort,
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, AttemptAction::None),
    }
}
