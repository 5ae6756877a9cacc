//! Service state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! Caller (main.rs) executes the I/O implied by each action.

use std::net::SocketAddr;
use std::time::Duration;

use crate::bridge::BridgeHandle;

/// Service lifecycle states.
///
/// Some fields are only carried through transitions and never read on their
/// own; they document what each state holds.
#[derive(Debug)]
#[allow(dead_code)]
pub enum ServiceState {
    /// Loading config, setting up resources
    Initializing,
    /// Waiting for the protocol bridge to answer its health probe
    ConnectingBridge {
        retries: u32,
        listen_addr: SocketAddr,
    },
    /// Binding the HTTP listener once the bridge is reachable
    Starting {
        bridge: BridgeHandle,
        listen_addr: SocketAddr,
    },
    /// Serving pairing requests
    Running {
        bridge: BridgeHandle,
        listen_addr: SocketAddr,
    },
    /// Terminal state; `reason` is set when startup gave up
    Stopped {
        exit_code: i32,
        reason: Option<String>,
    },
    /// Bridge unreachable, waiting to probe again
    Error {
        error: String,
        retries: u32,
        listen_addr: SocketAddr,
    },
}

/// Events that drive state transitions
#[derive(Debug)]
pub enum ServiceEvent {
    /// Configuration parsed and validated
    ConfigLoaded { listen_addr: SocketAddr },
    /// Bridge answered its health probe
    BridgeReady(BridgeHandle),
    /// Bridge could not be reached; worth retrying
    BridgeUnreachable(String),
    /// Bridge answered but refuses to serve; retrying cannot help
    BridgeRejected(String),
    /// HTTP listener bound and ready
    ListenerReady,
    /// SIGTERM/SIGINT received
    ShutdownSignal,
    /// Retry backoff expired
    RetryTimer,
}

/// Actions the caller should execute after a state transition
#[derive(Debug, PartialEq, Eq)]
pub enum ServiceAction {
    /// Probe the protocol bridge
    ProbeBridge,
    /// Bind HTTP listener on the given address
    StartListener { addr: SocketAddr },
    /// Set retry timer
    ScheduleRetry { delay: Duration },
    /// Exit the process
    Shutdown { exit_code: i32 },
    /// No-op
    None,
}

/// Maximum bridge probe retries before giving up
pub const MAX_BRIDGE_RETRIES: u32 = 5;

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: ServiceState, event: ServiceEvent) -> (ServiceState, ServiceAction) {
    match (state, event) {
        // --- Initializing ---
        (ServiceState::Initializing, ServiceEvent::ConfigLoaded { listen_addr }) => (
            ServiceState::ConnectingBridge {
                retries: 0,
                listen_addr,
            },
            ServiceAction::ProbeBridge,
        ),

        // --- ConnectingBridge ---
        (ServiceState::ConnectingBridge { listen_addr, .. }, ServiceEvent::BridgeReady(bridge)) => (
            ServiceState::Starting {
                bridge,
                listen_addr,
            },
            ServiceAction::StartListener { addr: listen_addr },
        ),

        (
            ServiceState::ConnectingBridge {
                retries,
                listen_addr,
            },
            ServiceEvent::BridgeUnreachable(error),
        ) if retries < MAX_BRIDGE_RETRIES => {
            let delay = Duration::from_secs(2u64.pow(retries));
            (
                ServiceState::Error {
                    error,
                    retries,
                    listen_addr,
                },
                ServiceAction::ScheduleRetry { delay },
            )
        }

        (
            ServiceState::ConnectingBridge { .. },
            ServiceEvent::BridgeUnreachable(reason) | ServiceEvent::BridgeRejected(reason),
        ) => (
            ServiceState::Stopped {
                exit_code: 1,
                reason: Some(reason),
            },
            ServiceAction::Shutdown { exit_code: 1 },
        ),

        // --- Error recovery ---
        (
            ServiceState::Error {
                retries,
                listen_addr,
                ..
            },
            ServiceEvent::RetryTimer,
        ) => (
            ServiceState::ConnectingBridge {
                retries: retries + 1,
                listen_addr,
            },
            ServiceAction::ProbeBridge,
        ),

        // --- Starting ---
        (
            ServiceState::Starting {
                bridge,
                listen_addr,
            },
            ServiceEvent::ListenerReady,
        ) => (
            ServiceState::Running {
                bridge,
                listen_addr,
            },
            ServiceAction::None,
        ),

        // --- Any state + shutdown = stop ---
        (_, ServiceEvent::ShutdownSignal) => (
            ServiceState::Stopped {
                exit_code: 0,
                reason: None,
            },
            ServiceAction::Shutdown { exit_code: 0 },
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, ServiceAction::None),
    }
}
