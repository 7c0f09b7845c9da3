//! Recording fakes for the backend, scheduler and host.
//!
//! Each fake keeps its state behind `Rc<RefCell<_>>` so a test can hand one
//! clone to the mount and keep another to inspect calls and fire frames.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::backend::{GraphicsBackend, UniformShape};
use crate::error::{BackendError, ShaderError, ShaderStage};
use crate::frame::{FrameHandle, FrameScheduler, FrameSlot};
use crate::host::MountHost;
use crate::sizing::{ObservedSize, ViewportMetrics};
use crate::types::TextureImage;

#[derive(Debug, Clone, PartialEq)]
pub enum UniformCall {
    Int(String, i32),
    Float(String, f32),
    Floats(String, UniformShape, Vec<f32>),
}

impl UniformCall {
    pub fn name(&self) -> &str {
        match self {
            UniformCall::Int(name, _)
            | UniformCall::Float(name, _)
            | UniformCall::Floats(name, _, _) => name,
        }
    }
}

#[derive(Debug, Default)]
pub struct GlLog {
    pub fail_compile: bool,
    pub fail_texture_upload: Option<u32>,
    pub declared: BTreeSet<String>,
    pub programs_created: usize,
    pub programs_deleted: usize,
    pub quad_bound: bool,
    pub location_lookups: Vec<String>,
    pub uniform_calls: Vec<UniformCall>,
    pub next_texture: u32,
    pub live_textures: BTreeSet<u32>,
    pub textures_created: usize,
    pub textures_deleted: usize,
    pub texture_units: Vec<(u32, u32)>,
    pub viewports: Vec<(u32, u32)>,
    pub clears: usize,
    pub draws: usize,
    pub finished_frames: usize,
    pub releases: usize,
}

impl GlLog {
    pub fn calls_for(&self, name: &str) -> Vec<&UniformCall> {
        self.uniform_calls.iter().filter(|call| call.name() == name).collect()
    }
}

/// Parses `uniform <type> <name>;` declarations so lookups behave like a
/// linked program.
fn declared_uniforms(source: &str) -> impl Iterator<Item = String> + '_ {
    source.lines().filter_map(|line| {
        let rest = line.trim().strip_prefix("uniform ")?;
        let declaration = rest.split(';').next()?;
        let name = declaration.split_whitespace().last()?;
        Some(name.split('[').next().unwrap_or(name).to_string())
    })
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub log: Rc<RefCell<GlLog>>,
}

impl MockBackend {
    pub fn failing_compile() -> Self {
        let backend = Self::default();
        backend.log.borrow_mut().fail_compile = true;
        backend
    }
}

impl GraphicsBackend for MockBackend {
    type Program = u32;
    type Location = String;
    type Texture = u32;

    fn compile_program(&mut self, vertex: &str, fragment: &str) -> Result<u32, ShaderError> {
        let mut log = self.log.borrow_mut();
        if log.fail_compile {
            return Err(ShaderError::Compile {
                stage: ShaderStage::Fragment,
                log: "ERROR: 0:1: syntax error".to_string(),
            });
        }
        log.declared = declared_uniforms(vertex).chain(declared_uniforms(fragment)).collect();
        log.programs_created += 1;
        Ok(log.programs_created as u32)
    }

    fn setup_quad(&mut self, _program: &u32) -> Result<(), BackendError> {
        self.log.borrow_mut().quad_bound = true;
        Ok(())
    }

    fn use_program(&mut self, _program: &u32) {}

    fn uniform_location(&mut self, _program: &u32, name: &str) -> Option<String> {
        let mut log = self.log.borrow_mut();
        log.location_lookups.push(name.to_string());
        log.declared.contains(name).then(|| name.to_string())
    }

    fn uniform_1f(&mut self, location: &String, value: f32) {
        self.log
            .borrow_mut()
            .uniform_calls
            .push(UniformCall::Float(location.clone(), value));
    }

    fn uniform_1i(&mut self, location: &String, value: i32) {
        self.log
            .borrow_mut()
            .uniform_calls
            .push(UniformCall::Int(location.clone(), value));
    }

    fn uniform_floats(&mut self, location: &String, shape: UniformShape, data: &[f32]) {
        self.log
            .borrow_mut()
            .uniform_calls
            .push(UniformCall::Floats(location.clone(), shape, data.to_vec()));
    }

    fn create_texture(&mut self, unit: u32, _image: &TextureImage) -> Result<u32, BackendError> {
        let mut log = self.log.borrow_mut();
        if let Some(code) = log.fail_texture_upload {
            return Err(BackendError::Upload { code });
        }
        log.next_texture += 1;
        let texture = log.next_texture;
        log.live_textures.insert(texture);
        log.textures_created += 1;
        log.texture_units.push((unit, texture));
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: u32) {
        let mut log = self.log.borrow_mut();
        assert!(log.live_textures.remove(&texture), "texture {texture} deleted twice");
        log.textures_deleted += 1;
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.log.borrow_mut().viewports.push((width, height));
    }

    fn clear(&mut self) {
        self.log.borrow_mut().clears += 1;
    }

    fn draw_quad(&mut self) {
        self.log.borrow_mut().draws += 1;
    }

    fn finish_frame(&mut self) {
        self.log.borrow_mut().finished_frames += 1;
    }

    fn delete_program(&mut self, _program: u32) {
        self.log.borrow_mut().programs_deleted += 1;
    }

    fn release(&mut self) {
        let mut log = self.log.borrow_mut();
        log.releases += 1;
        log.quad_bound = false;
    }
}

#[derive(Debug, Default)]
pub struct SchedulerState {
    pub now: f64,
    pub next_id: u64,
    pub pending: Vec<FrameHandle>,
    pub requested: Vec<FrameHandle>,
    pub cancelled: Vec<FrameHandle>,
}

/// Manual clock plus a list of outstanding frame requests.
#[derive(Debug, Clone, Default)]
pub struct MockScheduler {
    pub state: Rc<RefCell<SchedulerState>>,
}

impl MockScheduler {
    pub fn advance(&self, ms: f64) {
        self.state.borrow_mut().now += ms;
    }

    pub fn pending_count(&self, slot: FrameSlot) -> usize {
        self.state
            .borrow()
            .pending
            .iter()
            .filter(|handle| handle.slot == slot)
            .count()
    }

    pub fn requested_count(&self, slot: FrameSlot) -> usize {
        self.state
            .borrow()
            .requested
            .iter()
            .filter(|handle| handle.slot == slot)
            .count()
    }

    pub fn cancelled(&self) -> Vec<FrameHandle> {
        self.state.borrow().cancelled.clone()
    }

    /// Removes the oldest pending request for `slot`, as if it were delivered.
    pub fn take_pending(&self, slot: FrameSlot) -> Option<FrameHandle> {
        let mut state = self.state.borrow_mut();
        let index = state.pending.iter().position(|handle| handle.slot == slot)?;
        Some(state.pending.remove(index))
    }
}

impl FrameScheduler for MockScheduler {
    fn request_frame(&mut self, slot: FrameSlot) -> Option<FrameHandle> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let handle = FrameHandle::new(slot, state.next_id);
        state.pending.push(handle);
        state.requested.push(handle);
        Some(handle)
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        let mut state = self.state.borrow_mut();
        state.pending.retain(|pending| *pending != handle);
        state.cancelled.push(handle);
    }

    fn now(&self) -> f64 {
        self.state.borrow().now
    }
}

#[derive(Debug, Default)]
pub struct HostState {
    pub size: Option<ObservedSize>,
    pub metrics: ViewportMetrics,
    pub style_installs: usize,
    pub attached: bool,
    pub mounted: bool,
    pub observing: bool,
    pub canvas_sizes: Vec<(u32, u32)>,
    pub presents: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockHost {
    pub state: Rc<RefCell<HostState>>,
}

impl MockHost {
    pub fn sized(width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        let host = Self::default();
        {
            let mut state = host.state.borrow_mut();
            state.size = Some(ObservedSize::new(width, height));
            state.metrics = ViewportMetrics::with_device_pixel_ratio(device_pixel_ratio);
        }
        host
    }
}

impl MountHost for MockHost {
    fn install_global_style(&mut self) {
        self.state.borrow_mut().style_installs += 1;
    }

    fn attach_canvas(&mut self) {
        self.state.borrow_mut().attached = true;
    }

    fn mark_mounted(&mut self) {
        self.state.borrow_mut().mounted = true;
    }

    fn unmark_mounted(&mut self) {
        self.state.borrow_mut().mounted = false;
    }

    fn connect_observers(&mut self) {
        self.state.borrow_mut().observing = true;
    }

    fn disconnect_observers(&mut self) {
        self.state.borrow_mut().observing = false;
    }

    fn observed_size(&self) -> Option<ObservedSize> {
        self.state.borrow().size
    }

    fn viewport_metrics(&self) -> ViewportMetrics {
        self.state.borrow().metrics
    }

    fn resize_canvas(&mut self, width: u32, height: u32) {
        self.state.borrow_mut().canvas_sizes.push((width, height));
    }

    fn present(&mut self) {
        self.state.borrow_mut().presents += 1;
    }
}
