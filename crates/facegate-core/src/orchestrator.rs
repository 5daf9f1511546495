//! Verification orchestrator: the login / registration state machine.
//!
//! The orchestrator runs as a single actor task. Front ends talk to it
//! through a clone-safe [`OrchestratorHandle`]; every network round trip
//! is spawned off the actor and comes back as a completion tagged with
//! the session token it was issued under. Completions whose token is no
//! longer current are dropped on arrival, which is the only thing that
//! protects a new session from an old session's late responses.
//!
//! ```text
//! Idle -> AwaitingCamera -> Capturing -> Recognizing -> LivenessPending
//!      -> RegistrationPending (new face) -> Registering -> Succeeded(Registered)
//!      -> LoginPending        (known face) -> Succeeded(LoggedIn)
//! any step on error -> Failed(error)
//! ```

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::backend::{
    BackendError, IdentityMatch, LoginGrant, RecognitionBackend, RecognitionClient, Tagged,
};
use crate::capture::{CameraDevice, SharedCapture};
use crate::error::VerifyError;
use crate::liveness::{LivenessChallenge, LivenessConfig, LivenessOutcome};
use crate::session::{CaptureSession, IdentityStatus, SessionToken, TokenIssuer};
use crate::sink::PresentationSink;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("orchestrator task exited")]
    ChannelClosed,
}

/// Terminal outcome of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum VerificationResult {
    LoggedIn {
        username: String,
        redirect: Option<String>,
    },
    Registered {
        username: String,
    },
    Failed(VerifyError),
    /// Reserved for callers that put their own deadline around
    /// [`OrchestratorHandle::wait_for_result`]. A liveness timeout is
    /// reported as `Failed(LivenessTimeout)`.
    TimedOut,
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::LoggedIn { .. } | Self::Registered { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingCamera,
    Capturing,
    Recognizing,
    LivenessPending,
    RegistrationPending,
    /// The display name was accepted and `/register` is in flight.
    Registering,
    LoginPending,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn is_running(self) -> bool {
        !matches!(self, Self::Idle) && !self.is_terminal()
    }
}

/// Observable orchestrator state, published after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorSnapshot {
    pub token: SessionToken,
    pub phase: Phase,
    pub identity: IdentityStatus,
    pub attempts: u32,
    pub capture_enabled: bool,
    pub result: Option<VerificationResult>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    pub liveness: LivenessConfig,
    /// Depth of the command queue between handles and the actor.
    pub command_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            liveness: LivenessConfig::default(),
            command_buffer: 8,
        }
    }
}

/// Messages sent from handles to the actor.
enum Command {
    Trigger {
        reply: oneshot::Sender<Result<SessionToken, VerifyError>>,
    },
    SubmitName {
        token: SessionToken,
        name: String,
        reply: oneshot::Sender<Result<(), VerifyError>>,
    },
    ReacquireCamera {
        reply: oneshot::Sender<Result<(), VerifyError>>,
    },
    ReleaseCamera {
        reply: oneshot::Sender<()>,
    },
    Abandon,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Network results coming back from spawned requests.
enum Completion {
    Identity(Tagged<Result<IdentityMatch, BackendError>>),
    Liveness {
        token: SessionToken,
        result: Result<LivenessOutcome, VerifyError>,
    },
    /// A liveness tick was sent.
    Attempt {
        token: SessionToken,
        attempts: u32,
    },
    Registered(Tagged<Result<String, BackendError>>),
    LoggedIn(Tagged<Result<LoginGrant, BackendError>>),
}

impl Completion {
    fn token(&self) -> SessionToken {
        match self {
            Self::Identity(t) => t.token,
            Self::Liveness { token, .. } => *token,
            Self::Attempt { token, .. } => *token,
            Self::Registered(t) => t.token,
            Self::LoggedIn(t) => t.token,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Identity(_) => "check_identity",
            Self::Liveness { .. } => "liveness",
            Self::Attempt { .. } => "liveness_tick",
            Self::Registered(_) => "register",
            Self::LoggedIn(_) => "login",
        }
    }

    /// The only phase in which this completion may be applied.
    fn phase(&self) -> Phase {
        match self {
            Self::Identity(_) => Phase::Recognizing,
            Self::Liveness { .. } | Self::Attempt { .. } => Phase::LivenessPending,
            Self::Registered(_) => Phase::Registering,
            Self::LoggedIn(_) => Phase::LoginPending,
        }
    }
}

/// Clone-safe handle to the orchestrator actor.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<OrchestratorSnapshot>,
}

impl OrchestratorHandle {
    /// Start a new session, superseding any session still in flight.
    ///
    /// The returned token identifies the session; its outcome arrives via
    /// [`wait_for_result`](Self::wait_for_result) and the sink. Refused
    /// with `CameraUnavailable` while capture is disabled.
    pub async fn trigger_capture(&self) -> Result<SessionToken, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Trigger { reply }).await?;
        Ok(rx.await.map_err(|_| OrchestratorError::ChannelClosed)??)
    }

    /// Supply the display name for a session in `RegistrationPending`.
    ///
    /// An empty name fails the session with a validation error and no
    /// request is made.
    pub async fn submit_display_name(
        &self,
        token: SessionToken,
        name: &str,
    ) -> Result<(), OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SubmitName {
            token,
            name: name.to_string(),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| OrchestratorError::ChannelClosed)??)
    }

    /// Try to open the camera again after it was unavailable.
    pub async fn reacquire_camera(&self) -> Result<(), OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ReacquireCamera { reply }).await?;
        Ok(rx.await.map_err(|_| OrchestratorError::ChannelClosed)??)
    }

    /// Give the camera back. A running session is abandoned.
    pub async fn release_camera(&self) -> Result<(), OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ReleaseCamera { reply }).await?;
        rx.await.map_err(|_| OrchestratorError::ChannelClosed)
    }

    /// Drop the running session (e.g. the user navigated away).
    pub async fn abandon(&self) -> Result<(), OrchestratorError> {
        self.send(Command::Abandon).await
    }

    /// Stop the actor and release the camera.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| OrchestratorError::ChannelClosed)
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `pred`.
    pub async fn wait_until(
        &self,
        pred: impl FnMut(&OrchestratorSnapshot) -> bool,
    ) -> Result<OrchestratorSnapshot, OrchestratorError> {
        let mut rx = self.state.clone();
        let snapshot = rx
            .wait_for(pred)
            .await
            .map_err(|_| OrchestratorError::ChannelClosed)?;
        Ok(snapshot.clone())
    }

    /// Wait for the terminal result of `token`. Returns `None` if the
    /// session was superseded or abandoned first.
    pub async fn wait_for_result(
        &self,
        token: SessionToken,
    ) -> Result<Option<VerificationResult>, OrchestratorError> {
        let snapshot = self
            .wait_until(|s| s.token != token || s.result.is_some() || s.phase == Phase::Idle)
            .await?;
        if snapshot.token != token {
            return Ok(None);
        }
        Ok(snapshot.result)
    }

    async fn send(&self, cmd: Command) -> Result<(), OrchestratorError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| OrchestratorError::ChannelClosed)
    }
}

/// Spawn the orchestrator actor on the current tokio runtime.
///
/// The camera is not opened until the first capture is triggered. It is
/// released when the actor stops, either through
/// [`OrchestratorHandle::shutdown`] or once every handle is dropped.
pub fn spawn_orchestrator<D, B, S>(
    capture: SharedCapture<D>,
    backend: Arc<B>,
    sink: Arc<S>,
    config: OrchestratorConfig,
) -> OrchestratorHandle
where
    D: CameraDevice + 'static,
    B: RecognitionBackend + ?Sized + 'static,
    S: PresentationSink + ?Sized + 'static,
{
    let (tx, mut rx) = mpsc::channel(config.command_buffer.max(1));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let (state_tx, state) = watch::channel(OrchestratorSnapshot {
        token: SessionToken::NONE,
        phase: Phase::Idle,
        identity: IdentityStatus::Unknown,
        attempts: 0,
        capture_enabled: true,
        result: None,
    });

    let mut orchestrator = Orchestrator {
        capture,
        client: RecognitionClient::new(backend),
        sink,
        config,
        tokens: TokenIssuer::new(),
        session: None,
        phase: Phase::Idle,
        capture_enabled: true,
        result: None,
        done_tx,
        state_tx,
    };

    tokio::spawn(async move {
        tracing::info!("orchestrator started");
        let mut shutdown_reply = None;
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    Some(cmd) => orchestrator.handle_command(cmd).await,
                    None => break,
                },
                Some(done) = done_rx.recv() => orchestrator.handle_completion(done),
            }
        }

        orchestrator.tokens.revoke();
        orchestrator.capture.lock().await.close();
        tracing::info!("orchestrator stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    });

    OrchestratorHandle { tx, state }
}

struct Orchestrator<D: CameraDevice, B: ?Sized, S: ?Sized> {
    capture: SharedCapture<D>,
    client: RecognitionClient<B>,
    sink: Arc<S>,
    config: OrchestratorConfig,
    tokens: TokenIssuer,
    session: Option<CaptureSession>,
    phase: Phase,
    capture_enabled: bool,
    result: Option<VerificationResult>,
    done_tx: mpsc::UnboundedSender<Completion>,
    state_tx: watch::Sender<OrchestratorSnapshot>,
}

impl<D, B, S> Orchestrator<D, B, S>
where
    D: CameraDevice + 'static,
    B: RecognitionBackend + ?Sized + 'static,
    S: PresentationSink + ?Sized + 'static,
{
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Trigger { reply } => {
                let result = self.start_session().await;
                let _ = reply.send(result);
            }
            Command::SubmitName { token, name, reply } => {
                let _ = reply.send(self.submit_name(token, &name));
            }
            Command::ReacquireCamera { reply } => {
                let _ = reply.send(self.reacquire_camera().await);
            }
            Command::ReleaseCamera { reply } => {
                self.abandon();
                self.capture.lock().await.close();
                let _ = reply.send(());
            }
            Command::Abandon => self.abandon(),
            // Handled by the actor loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn start_session(&mut self) -> Result<SessionToken, VerifyError> {
        if !self.capture_enabled {
            return Err(VerifyError::CameraUnavailable(
                "capture disabled until the camera is reacquired".into(),
            ));
        }

        let previous = self.tokens.current();
        let token = self.tokens.issue();
        if self.phase.is_running() {
            tracing::info!(%previous, %token, phase = ?self.phase, "superseding running session");
        }
        self.session = Some(CaptureSession::new(token));
        self.result = None;
        tracing::info!(%token, "capture session started");

        self.transition(Phase::AwaitingCamera);
        let opened = self.capture.lock().await.open();
        if let Err(e) = opened {
            let err = VerifyError::from(e);
            if matches!(err, VerifyError::CameraUnavailable(_)) {
                self.capture_enabled = false;
                self.sink.capture_enabled(false);
            }
            self.fail(err);
            return Ok(token);
        }

        self.transition(Phase::Capturing);
        let snapshot = self.capture.lock().await.snapshot();
        let image = match snapshot {
            Ok(image) => image,
            Err(e) => {
                self.fail(e.into());
                return Ok(token);
            }
        };
        if let Some(session) = self.session.as_mut() {
            session.pending_image = Some(image.clone());
        }

        self.transition(Phase::Recognizing);
        self.sink.loading(true);
        self.sink.status("Checking identity...");

        let client = self.client.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let tagged = client.check_identity(token, &image).await;
            let _ = done.send(Completion::Identity(tagged));
        });

        Ok(token)
    }

    fn handle_completion(&mut self, done: Completion) {
        let token = done.token();
        let current = self.session.as_ref().map(|s| s.token);
        if !self.tokens.is_current(token) || current != Some(token) {
            tracing::debug!(%token, request = done.name(), "discarding stale response");
            return;
        }
        if self.phase != done.phase() {
            tracing::debug!(
                %token,
                request = done.name(),
                phase = ?self.phase,
                "discarding response outside its phase"
            );
            return;
        }

        match done {
            Completion::Identity(tagged) => match tagged.value {
                Ok(found) => self.on_identity(token, found),
                Err(e) => self.fail(e.into()),
            },
            Completion::Liveness { result, .. } => match result {
                Ok(LivenessOutcome::Confirmed {
                    attempts,
                    last_openness,
                }) => {
                    if let Some(session) = self.session.as_mut() {
                        session.attempt_count = attempts;
                        session.last_openness = last_openness;
                    }
                    self.on_blink(token);
                }
                Ok(LivenessOutcome::Cancelled { .. }) => {}
                Err(e) => {
                    if let (VerifyError::LivenessTimeout { attempts }, Some(session)) =
                        (&e, self.session.as_mut())
                    {
                        session.attempt_count = *attempts;
                    }
                    self.fail(e);
                }
            },
            Completion::Attempt { attempts, .. } => {
                if let Some(session) = self.session.as_mut() {
                    session.attempt_count = attempts;
                }
                self.publish();
            }
            Completion::Registered(tagged) => match tagged.value {
                Ok(username) => {
                    tracing::info!(%token, username = %username, "registered");
                    self.succeed(VerificationResult::Registered { username });
                }
                Err(e) => self.fail(e.into()),
            },
            Completion::LoggedIn(tagged) => match tagged.value {
                Ok(grant) => {
                    tracing::info!(%token, username = %grant.username, "logged in");
                    self.succeed(VerificationResult::LoggedIn {
                        username: grant.username,
                        redirect: grant.redirect,
                    });
                }
                Err(e) => self.fail(e.into()),
            },
        }
    }

    fn on_identity(&mut self, token: SessionToken, found: IdentityMatch) {
        let identity = IdentityStatus::from(found);
        tracing::info!(%token, identity = ?identity, "identity checked");
        if let Some(session) = self.session.as_mut() {
            session.identity = identity;
            session.reset_attempts();
        }

        self.transition(Phase::LivenessPending);
        self.sink.loading(false);

        let capture = self.capture.clone();
        let client = self.client.clone();
        let sink = self.sink.clone();
        let issuer = self.tokens.clone();
        let config = self.config.liveness;
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let mut challenge = LivenessChallenge::new(config);
            let progress = done.clone();
            let result = challenge
                .run(
                    &capture,
                    &client,
                    &*sink,
                    token,
                    || issuer.is_current(token),
                    |attempts| {
                        let _ = progress.send(Completion::Attempt { token, attempts });
                    },
                )
                .await;
            let _ = done.send(Completion::Liveness { token, result });
        });
    }

    fn on_blink(&mut self, token: SessionToken) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        match session.identity.clone() {
            IdentityStatus::NewUser => {
                self.transition(Phase::RegistrationPending);
                self.sink.status("New face. Enter a display name to register");
                self.sink.request_display_name(token);
            }
            IdentityStatus::Existing { label } => {
                let Some(image) = session.pending_image.clone() else {
                    self.fail(VerifyError::FrameCapture("no captured frame to submit".into()));
                    return;
                };
                self.transition(Phase::LoginPending);
                self.sink.loading(true);
                self.sink.status(&format!("Welcome back, {label}. Signing in..."));

                let client = self.client.clone();
                let done = self.done_tx.clone();
                tokio::spawn(async move {
                    let tagged = client.login(token, &image).await;
                    let _ = done.send(Completion::LoggedIn(tagged));
                });
            }
            IdentityStatus::Unknown => {
                self.fail(VerifyError::Server("identity check returned no answer".into()));
            }
        }
    }

    fn submit_name(&mut self, token: SessionToken, name: &str) -> Result<(), VerifyError> {
        let pending = self.tokens.is_current(token)
            && self.phase == Phase::RegistrationPending
            && self.session.as_ref().map(|s| s.token) == Some(token);
        if !pending {
            return Err(VerifyError::Validation(format!(
                "session {token} is not waiting for a display name"
            )));
        }

        let name = name.trim();
        if name.is_empty() {
            let err = VerifyError::Validation("display name must not be empty".into());
            self.fail(err.clone());
            return Err(err);
        }

        let Some(image) = self.session.as_ref().and_then(|s| s.pending_image.clone()) else {
            let err = VerifyError::FrameCapture("no captured frame to submit".into());
            self.fail(err.clone());
            return Err(err);
        };

        self.transition(Phase::Registering);
        self.sink.loading(true);
        self.sink.status("Registering...");

        let client = self.client.clone();
        let done = self.done_tx.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let tagged = client.register(token, &image, &name).await;
            let _ = done.send(Completion::Registered(tagged));
        });
        Ok(())
    }

    async fn reacquire_camera(&mut self) -> Result<(), VerifyError> {
        let opened = self.capture.lock().await.open();
        match opened {
            Ok(_) => {
                if !self.capture_enabled {
                    self.capture_enabled = true;
                    self.sink.capture_enabled(true);
                    self.publish();
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn abandon(&mut self) {
        if self.phase.is_running() {
            tracing::info!(token = %self.tokens.current(), phase = ?self.phase, "session abandoned");
            self.tokens.revoke();
            self.sink.loading(false);
            self.transition(Phase::Idle);
        }
    }

    fn succeed(&mut self, result: VerificationResult) {
        self.finish(Phase::Succeeded, result);
    }

    fn fail(&mut self, error: VerifyError) {
        tracing::warn!(
            token = %self.tokens.current(),
            phase = ?self.phase,
            kind = error.kind(),
            error = %error,
            "session failed"
        );
        self.sink.error(&error);
        self.finish(Phase::Failed, VerificationResult::Failed(error));
    }

    fn finish(&mut self, phase: Phase, result: VerificationResult) {
        if let Some(session) = self.session.as_mut() {
            session.pending_image = None;
        }
        self.sink.loading(false);
        self.sink.finished(&result);
        self.result = Some(result);
        self.transition(phase);
    }

    fn transition(&mut self, phase: Phase) {
        tracing::debug!(token = %self.tokens.current(), from = ?self.phase, to = ?phase, "transition");
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        let (token, identity, attempts) = match &self.session {
            Some(s) => (s.token, s.identity.clone(), s.attempt_count),
            None => (SessionToken::NONE, IdentityStatus::Unknown, 0),
        };
        self.state_tx.send_replace(OrchestratorSnapshot {
            token,
            phase: self.phase,
            identity,
            attempts,
            capture_enabled: self.capture_enabled,
            result: self.result.clone(),
        });
    }
}
