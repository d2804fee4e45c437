//! Session lifecycle and the per-frame pipeline.
//!
//! A [`Session`] exclusively owns the runtime connection and the rendering
//! backend (and through it the eye targets, cube geometry, constant buffer and
//! pipeline). Each frame runs strictly in order: wait for poses, resolve them,
//! render the left then the right eye, submit both eyes.

use crate::{
    config::SessionConfig,
    error::{RuntimeError, SessionError},
    eye::{Eye, EyeTransformDeriver},
    pose::PoseResolver,
    renderer::{submit_frame, EyeRenderer, RenderBackend},
    runtime::VrRuntime,
};

/// Emit a frame summary this often (about ten seconds at 90 Hz).
const STATS_INTERVAL_FRAMES: u64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Running,
    ShuttingDown,
    Terminated,
}

/// What one call to [`Session::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub valid_poses: usize,
    pub draws_per_eye: [usize; 2],
    pub submitted: usize,
}

pub struct Session<R: VrRuntime, B: RenderBackend> {
    state: SessionState,
    config: SessionConfig,
    backend: B,
    runtime: Option<R>,
    renderer: Option<EyeRenderer>,
    resolver: PoseResolver,
    frame_index: u64,
}

impl<R: VrRuntime, B: RenderBackend> Session<R, B> {
    pub fn new(backend: B, config: SessionConfig) -> Self {
        let resolver = PoseResolver::new(config.stale_poses, config.convention);
        Self {
            state: SessionState::Uninitialized,
            config,
            backend,
            runtime: None,
            renderer: None,
            resolver,
            frame_index: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn runtime(&self) -> Option<&R> {
        self.runtime.as_ref()
    }

    /// Connects to the runtime and allocates every per-session resource.
    ///
    /// Either the session ends up `Running` or it ends up `Terminated` with
    /// everything released and the cause returned.
    pub fn initialize<F>(&mut self, connect: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> Result<R, RuntimeError>,
    {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::AlreadyStarted { state: self.state });
        }
        self.state = SessionState::Initializing;
        log::info!("Session initializing");

        match self.start(connect) {
            Ok(()) => {
                self.state = SessionState::Running;
                log::info!("Session running");
                Ok(())
            }
            Err(err) => {
                log::error!("Session initialization failed: {}", err);
                self.backend.release();
                self.state = SessionState::Terminated;
                Err(err)
            }
        }
    }

    fn start<F>(&mut self, connect: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> Result<R, RuntimeError>,
    {
        self.config.validate()?;

        let mut runtime = connect()?;
        if let Err(err) = self.allocate(&runtime) {
            runtime.shutdown();
            return Err(err);
        }

        let deriver =
            EyeTransformDeriver::from_runtime(&runtime, self.config.clip, self.config.convention);
        self.renderer = Some(EyeRenderer::new(
            deriver,
            self.config.cube,
            self.config.tint_eyes,
        ));
        self.runtime = Some(runtime);
        Ok(())
    }

    fn allocate(&mut self, runtime: &R) -> Result<(), SessionError> {
        let size = runtime.recommended_render_target_size();
        log::info!("Recommended eye target size: {}x{}", size.width, size.height);

        self.backend.create_eye_targets(size)?;
        self.backend.create_cube_resources()?;
        Ok(())
    }

    /// Runs one frame: poses, both eyes, submission.
    ///
    /// Blocks inside the runtime until the compositor opens the next frame
    /// interval. Calling this outside `Running` is an error.
    pub fn render_frame(&mut self) -> Result<FrameStats, SessionError> {
        let (runtime, renderer) = match (self.state, self.runtime.as_mut(), self.renderer.as_ref())
        {
            (SessionState::Running, Some(runtime), Some(renderer)) => (runtime, renderer),
            _ => return Err(SessionError::NotRunning { state: self.state }),
        };

        let poses = match runtime.wait_get_poses() {
            Ok(poses) => poses,
            Err(err) => {
                log::warn!("Pose wait failed, rendering without tracking: {}", err);
                Vec::new()
            }
        };
        let transforms = self.resolver.resolve_frame(&*runtime, &poses);

        let mut draws_per_eye = [0; 2];
        for eye in Eye::BOTH {
            draws_per_eye[eye.index()] =
                renderer.render_eye(eye, &transforms, &*runtime, &mut self.backend)?;
        }

        let submitted = submit_frame(runtime, &self.backend)?;

        let stats = FrameStats {
            frame_index: self.frame_index,
            valid_poses: self.resolver.valid_poses(),
            draws_per_eye,
            submitted,
        };
        if self.frame_index % STATS_INTERVAL_FRAMES == 0 {
            log::debug!("Frame stats: {:?}", stats);
        }
        log::trace!("Frame {} head {:?}", self.frame_index, transforms.head.w_axis);
        self.frame_index += 1;
        Ok(stats)
    }

    /// Quit signal from the window layer: stop rendering frames.
    pub fn request_shutdown(&mut self) {
        if self.state == SessionState::Running {
            log::info!("Session shutting down");
            self.state = SessionState::ShuttingDown;
        }
    }

    /// Releases the runtime and all GPU resources. Idempotent.
    pub fn shutdown(&mut self) {
        match self.state {
            SessionState::Terminated => return,
            SessionState::Uninitialized => {
                self.state = SessionState::Terminated;
                return;
            }
            _ => {}
        }

        self.state = SessionState::ShuttingDown;
        self.renderer = None;
        self.backend.release();
        if let Some(mut runtime) = self.runtime.take() {
            runtime.shutdown();
        }
        self.state = SessionState::Terminated;
        log::info!("Session terminated after {} frames", self.frame_index);
    }
}

impl<R: VrRuntime, B: RenderBackend> Drop for Session<R, B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
