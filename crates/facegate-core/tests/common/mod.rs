#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use facegate_core::{
    spawn_orchestrator, ActionSample, BackendError, CameraDevice, CameraError, CaptureSource,
    EmotionRecord, EncodedImage, IdentityMatch, LivenessConfig, LoginGrant, OrchestratorConfig,
    OrchestratorHandle, RawFrame, RecognitionBackend, RecordingSink, SharedCapture,
};

/// Shared view of what the mock camera has been asked to do.
#[derive(Default)]
pub struct CameraState {
    pub deny: AtomicBool,
    pub not_ready: AtomicBool,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub grabbed: AtomicUsize,
}

impl CameraState {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

pub struct MockCamera {
    pub state: Arc<CameraState>,
}

impl CameraDevice for MockCamera {
    fn acquire(&mut self) -> Result<(), CameraError> {
        if self.state.deny.load(Ordering::SeqCst) {
            return Err(CameraError::Unavailable("permission denied".into()));
        }
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        if self.state.not_ready.load(Ordering::SeqCst) {
            None
        } else {
            Some((16, 12))
        }
    }

    fn grab(&mut self) -> Result<RawFrame, CameraError> {
        self.state.grabbed.fetch_add(1, Ordering::SeqCst);
        Ok(RawFrame::solid(16, 12, [128, 100, 90]))
    }

    fn release(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct Reply<T> {
    value: Result<T, BackendError>,
    delay: Duration,
}

type Script<T> = Mutex<VecDeque<Reply<T>>>;

#[derive(Default)]
pub struct Calls {
    pub identity: AtomicUsize,
    pub action: AtomicUsize,
    pub register: AtomicUsize,
    pub login: AtomicUsize,
    pub emotion: AtomicUsize,
}

impl Calls {
    pub fn identity(&self) -> usize {
        self.identity.load(Ordering::SeqCst)
    }
    pub fn action(&self) -> usize {
        self.action.load(Ordering::SeqCst)
    }
    pub fn register(&self) -> usize {
        self.register.load(Ordering::SeqCst)
    }
    pub fn login(&self) -> usize {
        self.login.load(Ordering::SeqCst)
    }
}

/// Backend that replays scripted replies per endpoint, in order.
///
/// An empty liveness script answers "eyes open" forever; every other
/// empty script answers with a server error.
#[derive(Default)]
pub struct ScriptedBackend {
    identity: Script<IdentityMatch>,
    actions: Script<ActionSample>,
    register: Script<String>,
    login: Script<LoginGrant>,
    emotion: Script<EmotionRecord>,
    pub calls: Calls,
    pub registered_names: Mutex<Vec<String>>,
}

fn push<T>(script: &Script<T>, value: Result<T, BackendError>, delay: Duration) {
    script.lock().unwrap().push_back(Reply { value, delay });
}

async fn pop<T>(script: &Script<T>, fallback: impl FnOnce() -> Result<T, BackendError>) -> Result<T, BackendError> {
    let next = script.lock().unwrap().pop_front();
    match next {
        Some(reply) => {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            reply.value
        }
        None => fallback(),
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(self, value: Result<IdentityMatch, BackendError>) -> Self {
        self.identity_after(Duration::ZERO, value)
    }

    pub fn identity_after(self, delay: Duration, value: Result<IdentityMatch, BackendError>) -> Self {
        push(&self.identity, value, delay);
        self
    }

    pub fn openness(self, values: &[f32]) -> Self {
        for &v in values {
            push(&self.actions, Ok(ActionSample::Openness(v)), Duration::ZERO);
        }
        self
    }

    pub fn action(self, value: Result<ActionSample, BackendError>) -> Self {
        push(&self.actions, value, Duration::ZERO);
        self
    }

    pub fn register(self, value: Result<String, BackendError>) -> Self {
        self.register_after(Duration::ZERO, value)
    }

    pub fn register_after(self, delay: Duration, value: Result<String, BackendError>) -> Self {
        push(&self.register, value, delay);
        self
    }

    pub fn login(self, value: Result<LoginGrant, BackendError>) -> Self {
        push(&self.login, value, Duration::ZERO);
        self
    }

    pub fn emotion(self, value: Result<EmotionRecord, BackendError>) -> Self {
        push(&self.emotion, value, Duration::ZERO);
        self
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.registered_names.lock().unwrap().clone()
    }
}

fn unscripted<T>() -> Result<T, BackendError> {
    Err(BackendError::Server("unscripted call".into()))
}

#[async_trait]
impl RecognitionBackend for ScriptedBackend {
    async fn check_identity(&self, _image: &EncodedImage) -> Result<IdentityMatch, BackendError> {
        self.calls.identity.fetch_add(1, Ordering::SeqCst);
        pop(&self.identity, unscripted).await
    }

    async fn detect_action(&self, _image: &EncodedImage) -> Result<ActionSample, BackendError> {
        self.calls.action.fetch_add(1, Ordering::SeqCst);
        pop(&self.actions, || Ok(ActionSample::Openness(0.32))).await
    }

    async fn register(&self, _image: &EncodedImage, username: &str) -> Result<String, BackendError> {
        self.calls.register.fetch_add(1, Ordering::SeqCst);
        self.registered_names.lock().unwrap().push(username.to_string());
        pop(&self.register, unscripted).await
    }

    async fn login(&self, _image: &EncodedImage) -> Result<LoginGrant, BackendError> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        pop(&self.login, unscripted).await
    }

    async fn record_emotion(&self, _image: &EncodedImage) -> Result<EmotionRecord, BackendError> {
        self.calls.emotion.fetch_add(1, Ordering::SeqCst);
        pop(&self.emotion, unscripted).await
    }
}

pub struct Harness {
    pub handle: OrchestratorHandle,
    pub backend: Arc<ScriptedBackend>,
    pub sink: Arc<RecordingSink>,
    pub camera: Arc<CameraState>,
    pub capture: SharedCapture<MockCamera>,
}

pub fn harness(backend: ScriptedBackend, max_attempts: u32) -> Harness {
    harness_with_camera(backend, max_attempts, Arc::new(CameraState::default()))
}

pub fn harness_with_camera(
    backend: ScriptedBackend,
    max_attempts: u32,
    camera: Arc<CameraState>,
) -> Harness {
    let backend = Arc::new(backend);
    let sink = Arc::new(RecordingSink::new());
    let capture = CaptureSource::new(MockCamera {
        state: camera.clone(),
    })
    .shared();

    let config = OrchestratorConfig {
        liveness: LivenessConfig {
            max_attempts,
            ..LivenessConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    let handle = spawn_orchestrator(capture.clone(), backend.clone(), sink.clone(), config);

    Harness {
        handle,
        backend,
        sink,
        camera,
        capture,
    }
}

pub fn new_face() -> Result<IdentityMatch, BackendError> {
    Ok(IdentityMatch {
        exists: false,
        username: None,
    })
}

pub fn known_face(name: &str) -> Result<IdentityMatch, BackendError> {
    Ok(IdentityMatch {
        exists: true,
        username: Some(name.to_string()),
    })
}
