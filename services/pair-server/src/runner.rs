//! Pairing attempt runner
//!
//! Executes the actions returned by `pairing::handle_event` for one attempt:
//! builds the temp store and client session, requests the pairing code,
//! watches connection updates, delivers the session on open and tears
//! everything down. Each attempt runs in its own spawned task and reports
//! its `AttemptOutcome` through the task's join handle; the HTTP caller is
//! answered separately through a `CodeResponder`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pairing::{
    AttemptAction, AttemptEvent, AttemptPolicy, AttemptState, Branding, ClientSession, CodeReply,
    CodeResponder, ConnectionEvent, Connector, CredentialDir, FailureReason, OutgoingMessage,
    PhoneNumber, SendOptions, SessionDescriptor, error_notice, handle_event,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uploader::Uploader;

use crate::error::{DeliveryError, Result};
use crate::metrics;
use crate::registry::AttemptRegistry;

/// Static settings shared by every attempt.
#[derive(Debug, Clone)]
pub struct AttemptSettings {
    pub temp_dir: PathBuf,
    pub session_marker: String,
    pub url_prefix: String,
    pub policy: AttemptPolicy,
    pub close_delay: Duration,
    pub export_read_attempts: u32,
    pub export_poll: Duration,
    pub branding: Branding,
}

/// Collaborators and settings an attempt runs against.
#[derive(Clone)]
pub struct AttemptContext {
    pub connector: Arc<dyn Connector>,
    pub uploader: Arc<dyn Uploader>,
    pub registry: Arc<AttemptRegistry>,
    pub settings: Arc<AttemptSettings>,
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// The account paired. `session` holds the delivered session string, or
    /// the error that stopped delivery.
    Paired {
        account_id: String,
        session: std::result::Result<String, String>,
    },
    Failed(FailureReason),
}

impl AttemptResult {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptResult::Paired { .. } => "succeeded",
            AttemptResult::Failed(reason) => reason.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub attempt_id: String,
    pub retries: u32,
    pub result: AttemptResult,
}

/// Short opaque attempt identifier.
pub fn new_attempt_id() -> String {
    let id = uuid::Uuid::new_v4().as_simple().to_string();
    id[..12].to_string()
}

/// Admit and spawn an attempt.
///
/// Returns the receiver the HTTP handler waits on for the pairing code and
/// the join handle yielding the attempt's outcome.
pub async fn start_attempt(
    ctx: AttemptContext,
    attempt_id: String,
    number: PhoneNumber,
) -> Result<(oneshot::Receiver<CodeReply>, JoinHandle<AttemptOutcome>)> {
    ctx.registry.admit(&attempt_id).await?;
    let (responder, rx) = CodeResponder::channel();
    let span = info_span!("attempt", attempt_id = %attempt_id);

    let handle = tokio::spawn(
        async move {
            let outcome = Attempt::new(&ctx, &attempt_id)
                .run(&number, responder)
                .await;
            let succeeded = matches!(outcome.result, AttemptResult::Paired { .. });
            ctx.registry.finish(&attempt_id, succeeded).await;
            if let AttemptResult::Paired {
                account_id,
                session: Err(e),
            } = &outcome.result
            {
                warn!(account_id = %account_id, error = %e, "paired but session not delivered");
            }
            metrics::record_attempt(outcome.result.label());
            info!(
                outcome = outcome.result.label(),
                retries = outcome.retries,
                "attempt finished"
            );
            outcome
        }
        .instrument(span),
    );

    Ok((rx, handle))
}

/// Result of one connect cycle.
enum Cycle {
    Retry,
    Done(AttemptResult),
}

struct Attempt<'a> {
    ctx: &'a AttemptContext,
    attempt_id: &'a str,
    started: Instant,
    state: AttemptState,
}

impl<'a> Attempt<'a> {
    fn new(ctx: &'a AttemptContext, attempt_id: &'a str) -> Self {
        Self {
            ctx,
            attempt_id,
            started: Instant::now(),
            state: AttemptState::initial(),
        }
    }

    async fn run(mut self, number: &PhoneNumber, mut responder: CodeResponder) -> AttemptOutcome {
        let result = loop {
            match self.cycle(number, &mut responder).await {
                Cycle::Retry => continue,
                Cycle::Done(result) => break result,
            }
        };

        // Whatever happened, a caller still waiting gets the placeholder
        responder.respond(CodeReply::Unavailable);

        AttemptOutcome {
            attempt_id: self.attempt_id.to_string(),
            retries: self.state.retries(),
            result,
        }
    }

    /// Feed `event` to the state machine and publish the new state.
    async fn transition(&mut self, event: AttemptEvent) -> AttemptAction {
        let state = std::mem::replace(&mut self.state, AttemptState::initial());
        let from = state.label();
        let (next, action) = handle_event(
            state,
            event,
            &self.ctx.settings.policy,
            self.started.elapsed(),
        );
        debug!(from, to = next.label(), ?action, "attempt transition");
        self.ctx.registry.update(self.attempt_id, &next).await;
        self.state = next;
        action
    }

    /// One pass from a fresh temp store to success, failure or retry.
    async fn cycle(&mut self, number: &PhoneNumber, responder: &mut CodeResponder) -> Cycle {
        let ctx = self.ctx;
        let settings = &ctx.settings;
        let dir = CredentialDir::new(&settings.temp_dir, self.attempt_id);

        let session = match self.open_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "failed to set up client session");
                self.transition(AttemptEvent::CodeRequestFailed(e.to_string()))
                    .await;
                cleanup(&dir).await;
                responder.respond(CodeReply::Unavailable);
                return Cycle::Done(self.failure());
            }
        };

        let mut action = self
            .transition(AttemptEvent::StoreReady {
                registered: session.is_registered(),
            })
            .await;

        if action == AttemptAction::AwaitConnection {
            // Registered already: there is no code to hand out
            info!("session already registered, skipping pairing code");
            responder.respond(CodeReply::Unavailable);
        }

        if let AttemptAction::RequestCode { delay } = action {
            tokio::time::sleep(delay).await;
            let requested_at = Instant::now();
            match session.request_pairing_code(number.as_str()).await {
                Ok(code) => {
                    metrics::record_code_request(true, requested_at.elapsed().as_secs_f64());
                    info!(retries = self.state.retries(), "pairing code issued");
                    responder.respond(CodeReply::Code(code));
                    action = self.transition(AttemptEvent::CodeIssued).await;
                }
                Err(e) => {
                    metrics::record_code_request(false, requested_at.elapsed().as_secs_f64());
                    warn!(error = %e, "pairing code request failed");
                    action = self
                        .transition(AttemptEvent::CodeRequestFailed(e.to_string()))
                        .await;
                }
            }
        }

        loop {
            match action {
                AttemptAction::AwaitConnection | AttemptAction::None => {
                    let polled = match self.remaining() {
                        Some(remaining) => {
                            tokio::time::timeout(remaining, session.next_event())
                                .await
                                .ok()
                        }
                        None => Some(session.next_event().await),
                    };
                    let Some(polled) = polled else {
                        warn!(
                            retries = self.state.retries(),
                            "attempt deadline passed while waiting for connection"
                        );
                        action = self.transition(AttemptEvent::DeadlineElapsed).await;
                        continue;
                    };
                    let event = match polled {
                        Ok(Some(event)) => event,
                        Ok(None) => ConnectionEvent::Close { status_code: None },
                        Err(e) => {
                            warn!(error = %e, "lost connection updates");
                            ConnectionEvent::Close { status_code: None }
                        }
                    };
                    debug!(?event, "connection update");
                    action = self.transition(AttemptEvent::Connection(event)).await;
                }
                AttemptAction::DeliverSession { settle } => {
                    let account_id = match &self.state {
                        AttemptState::Succeeded { account_id, .. } => account_id.clone(),
                        _ => String::new(),
                    };
                    info!(account_id = %account_id, "connected, delivering session");
                    let delivered = self
                        .deliver(session.as_ref(), &dir, &account_id, settle)
                        .await;
                    tokio::time::sleep(settings.close_delay).await;
                    teardown(session.as_ref(), &dir).await;
                    info!("session closed and cleaned up");
                    return Cycle::Done(AttemptResult::Paired {
                        account_id,
                        session: delivered,
                    });
                }
                AttemptAction::ScheduleRetry { delay } => {
                    info!(
                        retries = self.state.retries(),
                        retry_in_ms = delay.as_millis() as u64,
                        "connection closed, retrying"
                    );
                    metrics::record_retry();
                    teardown(session.as_ref(), &dir).await;
                    tokio::time::sleep(delay).await;
                    self.transition(AttemptEvent::RetryTimer).await;
                    return Cycle::Retry;
                }
                AttemptAction::Abort => {
                    teardown(session.as_ref(), &dir).await;
                    responder.respond(CodeReply::Unavailable);
                    return Cycle::Done(self.failure());
                }
                AttemptAction::RequestCode { .. } | AttemptAction::Reconnect => {
                    warn!(
                        state = self.state.label(),
                        ?action,
                        "unexpected action while connecting, stopping attempt"
                    );
                    teardown(session.as_ref(), &dir).await;
                    return Cycle::Done(self.failure());
                }
            }
        }
    }

    async fn open_session(&self) -> pairing::Result<Box<dyn ClientSession>> {
        let dir = CredentialDir::create(&self.ctx.settings.temp_dir, self.attempt_id).await?;
        self.ctx.connector.connect(dir.path()).await
    }

    /// Time left before `AttemptPolicy::deadline`, if one is set.
    fn remaining(&self) -> Option<Duration> {
        self.ctx
            .settings
            .policy
            .deadline
            .map(|deadline| deadline.saturating_sub(self.started.elapsed()))
    }

    fn failure(&self) -> AttemptResult {
        match &self.state {
            AttemptState::Failed { reason, .. } => AttemptResult::Failed(reason.clone()),
            other => AttemptResult::Failed(FailureReason::RequestError(format!(
                "attempt stopped in state {}",
                other.label()
            ))),
        }
    }

    /// Export, upload and announce the session. Failures are reported to the
    /// account and returned as text; the upload is never retried.
    async fn deliver(
        &self,
        session: &dyn ClientSession,
        dir: &CredentialDir,
        account_id: &str,
        settle: Duration,
    ) -> std::result::Result<String, String> {
        tokio::time::sleep(settle).await;

        match self.export_and_notify(session, dir, account_id).await {
            Ok(session_string) => {
                info!("session delivered");
                Ok(session_string)
            }
            Err(e) => {
                warn!(error = %e, "failed to deliver session");
                if let Err(notice_err) = session
                    .send_message(account_id, &error_notice(&e.to_string()), SendOptions::default())
                    .await
                {
                    warn!(error = %notice_err, "failed to send error notice");
                }
                Err(e.to_string())
            }
        }
    }

    async fn export_and_notify(
        &self,
        session: &dyn ClientSession,
        dir: &CredentialDir,
        account_id: &str,
    ) -> std::result::Result<String, DeliveryError> {
        let settings = &self.ctx.settings;
        let creds = dir
            .read_credentials(settings.export_read_attempts, settings.export_poll)
            .await?;

        let file_name = format!("{account_id}.json");
        let url = match self.ctx.uploader.upload(Bytes::from(creds), &file_name).await {
            Ok(url) => {
                metrics::record_upload("ok");
                url
            }
            Err(e) => {
                metrics::record_upload(e.label());
                return Err(e.into());
            }
        };

        let descriptor = SessionDescriptor::from_upload_url(&url, &settings.url_prefix)?;
        let session_string = descriptor.session_string(&settings.session_marker);

        let key = session
            .send_message(
                account_id,
                &OutgoingMessage::text(session_string.clone()),
                SendOptions::with_id(descriptor.message_id.clone()),
            )
            .await?;
        session
            .send_message(
                account_id,
                &settings.branding.confirmation(),
                SendOptions::quoting(key),
            )
            .await?;

        Ok(session_string)
    }
}

/// Close the session, then remove the temp store.
async fn teardown(session: &dyn ClientSession, dir: &CredentialDir) {
    if let Err(e) = session.close().await {
        debug!(error = %e, "closing client session failed");
    }
    cleanup(dir).await;
}

async fn cleanup(dir: &CredentialDir) {
    match dir.cleanup().await {
        Ok(()) => metrics::record_cleanup(),
        Err(e) => warn!(error = %e, "temp store cleanup failed"),
    }
}
