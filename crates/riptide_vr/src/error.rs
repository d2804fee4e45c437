//! Error types for the VR session and its two external collaborators.

use crate::session::SessionState;
use thiserror::Error;

/// Failures reported by a VR runtime adapter.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("VR runtime failed to initialize: {0}")]
    Init(String),
    #[error("compositor error: {0}")]
    Compositor(String),
    #[error("runtime does not accept {0:?} textures")]
    UnsupportedTexture(crate::runtime::TextureApi),
}

/// Failures reported by the rendering backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no suitable GPU adapter")]
    NoAdapter,
    #[error("GPU device request failed: {0}")]
    Device(String),
    #[error("surface creation failed: {0}")]
    Surface(String),
    #[error("{0} used before it was created")]
    MissingResource(&'static str),
    #[error("draw issued outside an eye pass")]
    NoActiveEye,
    #[error("eye pass for {0:?} already open")]
    EyeAlreadyOpen(crate::eye::Eye),
    #[error("cannot export eye texture: {0}")]
    Export(String),
}

/// Errors surfaced to the owner of a [`crate::session::Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("VR runtime: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("rendering backend: {0}")]
    Backend(#[from] BackendError),
    #[error("operation requires a running session, state is {state:?}")]
    NotRunning { state: SessionState },
    #[error("session already started, state is {state:?}")]
    AlreadyStarted { state: SessionState },
}
