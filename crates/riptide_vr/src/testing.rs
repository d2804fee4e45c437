//! Test doubles for the runtime and backend seams, sharing one ordered call log.

use crate::{
    error::{BackendError, RuntimeError},
    eye::Eye,
    pose::TrackedPose,
    renderer::{CubeConstants, RenderBackend},
    runtime::{
        ColorSpace, CompositorTexture, ControllerRole, DeviceClass, NativeTextureHandle,
        RenderSize, TextureApi, VrRuntime,
    },
};
use std::{cell::RefCell, collections::HashMap, collections::VecDeque, rc::Rc};
use vr_math::{HmdMatrix34, HmdMatrix44};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    WaitGetPoses,
    CreateEyeTargets(RenderSize),
    CreateCubeResources,
    BeginEye(Eye),
    Draw(Eye),
    EndEye(Eye),
    Submit(Eye),
    Release,
    RuntimeShutdown,
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

const IDENTITY_34: HmdMatrix34 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
];

pub const IDENTITY_44: HmdMatrix44 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Runtime that replays queued pose frames and answers device queries from
/// tables.
pub struct ScriptedRuntime {
    log: CallLog,
    pub frames: VecDeque<Vec<TrackedPose>>,
    pub devices: HashMap<u32, (DeviceClass, ControllerRole)>,
    pub eye_to_head: [HmdMatrix34; 2],
    /// When set, returned verbatim instead of a symmetric 90 degree frustum.
    pub fixed_projection: Option<HmdMatrix44>,
    pub size: RenderSize,
    pub reject_submit: bool,
    pub submitted: Vec<(Eye, CompositorTexture)>,
}

impl ScriptedRuntime {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            frames: VecDeque::new(),
            devices: HashMap::new(),
            eye_to_head: [IDENTITY_34; 2],
            fixed_projection: None,
            size: RenderSize {
                width: 64,
                height: 48,
            },
            reject_submit: false,
            submitted: Vec::new(),
        }
    }

    pub fn set_device(&mut self, index: u32, class: DeviceClass, role: ControllerRole) {
        self.devices.insert(index, (class, role));
    }
}

impl VrRuntime for ScriptedRuntime {
    fn recommended_render_target_size(&self) -> RenderSize {
        self.size
    }

    fn wait_get_poses(&mut self) -> Result<Vec<TrackedPose>, RuntimeError> {
        self.log.push(Call::WaitGetPoses);
        Ok(self.frames.pop_front().unwrap_or_default())
    }

    fn device_class(&self, device_index: u32) -> DeviceClass {
        self.devices
            .get(&device_index)
            .map_or(DeviceClass::Invalid, |(class, _)| *class)
    }

    fn controller_role(&self, device_index: u32) -> ControllerRole {
        self.devices
            .get(&device_index)
            .map_or(ControllerRole::Unknown, |(_, role)| *role)
    }

    fn eye_to_head_transform(&self, eye: Eye) -> HmdMatrix34 {
        self.eye_to_head[eye.index()]
    }

    fn projection_matrix(&self, _eye: Eye, near: f32, far: f32) -> HmdMatrix44 {
        self.fixed_projection
            .unwrap_or_else(|| vr_math::projection_from_tangents(-1.0, 1.0, -1.0, 1.0, near, far))
    }

    fn submit(&mut self, eye: Eye, texture: &CompositorTexture) -> Result<(), RuntimeError> {
        self.log.push(Call::Submit(eye));
        if self.reject_submit {
            return Err(RuntimeError::Compositor("scripted rejection".into()));
        }
        self.submitted.push((eye, *texture));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.log.push(Call::RuntimeShutdown);
    }
}

/// Backend that records calls and draw payloads instead of touching a GPU.
pub struct RecordingBackend {
    log: CallLog,
    active: Option<Eye>,
    targets: Option<RenderSize>,
    pub clears: Vec<(Eye, [f32; 4])>,
    pub draws: Vec<(Eye, CubeConstants)>,
    pub fail_cube_resources: bool,
    pub releases: usize,
}

impl RecordingBackend {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            active: None,
            targets: None,
            clears: Vec::new(),
            draws: Vec::new(),
            fail_cube_resources: false,
            releases: 0,
        }
    }

    pub fn draws_for(&self, eye: Eye) -> Vec<CubeConstants> {
        self.draws
            .iter()
            .filter(|(e, _)| *e == eye)
            .map(|(_, c)| *c)
            .collect()
    }
}

impl RenderBackend for RecordingBackend {
    fn create_eye_targets(&mut self, size: RenderSize) -> Result<(), BackendError> {
        self.log.push(Call::CreateEyeTargets(size));
        self.targets = Some(size);
        Ok(())
    }

    fn create_cube_resources(&mut self) -> Result<(), BackendError> {
        self.log.push(Call::CreateCubeResources);
        if self.fail_cube_resources {
            return Err(BackendError::Device("scripted pipeline failure".into()));
        }
        Ok(())
    }

    fn begin_eye(&mut self, eye: Eye, clear: [f32; 4]) -> Result<(), BackendError> {
        if let Some(open) = self.active {
            return Err(BackendError::EyeAlreadyOpen(open));
        }
        self.log.push(Call::BeginEye(eye));
        self.active = Some(eye);
        self.clears.push((eye, clear));
        Ok(())
    }

    fn draw_cube(&mut self, constants: &CubeConstants) -> Result<(), BackendError> {
        let eye = self.active.ok_or(BackendError::NoActiveEye)?;
        self.log.push(Call::Draw(eye));
        self.draws.push((eye, *constants));
        Ok(())
    }

    fn end_eye(&mut self) -> Result<(), BackendError> {
        let eye = self.active.take().ok_or(BackendError::NoActiveEye)?;
        self.log.push(Call::EndEye(eye));
        Ok(())
    }

    fn compositor_texture(&self, eye: Eye) -> Result<CompositorTexture, BackendError> {
        let size = self.targets.unwrap_or(RenderSize {
            width: 1,
            height: 1,
        });
        Ok(CompositorTexture {
            handle: NativeTextureHandle::InProcess { eye, size },
            api: TextureApi::InProcess,
            color_space: ColorSpace::Linear,
        })
    }

    fn release(&mut self) {
        self.log.push(Call::Release);
        self.releases += 1;
        self.targets = None;
    }
}
