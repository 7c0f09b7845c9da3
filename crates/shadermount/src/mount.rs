use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, warn};

use crate::backend::{GraphicsBackend, UniformShape};
use crate::debounce::ViewportDebounce;
use crate::error::MountError;
use crate::frame::{FrameHandle, FrameScheduler, FrameSlot};
use crate::glsl::SIZING_VERTEX_SHADER;
use crate::host::MountHost;
use crate::sizing::{compute_render_target, ObservedSize, RenderTarget};
use crate::textures::TextureUnits;
use crate::types::{MountOptions, TextureImage, UniformMap, UniformValue};
use crate::uniforms::{
    aspect_ratio_uniform, lower, UnsupportedLength, Upload, U_PIXEL_RATIO, U_RESOLUTION, U_TIME,
};

/// A fragment shader bound to a host surface.
///
/// The mount owns the compiled program, its uniform locations and textures,
/// and the animation clock. It renders synchronously whenever something
/// visible changes (resize, uniforms, seek) and otherwise only while
/// `speed != 0`, one scheduled frame at a time.
///
/// After [`ShaderMount::dispose`] every method is a no-op; GPU objects are
/// never re-acquired.
pub struct ShaderMount<B: GraphicsBackend, S: FrameScheduler, H: MountHost> {
    backend: B,
    scheduler: S,
    host: H,
    program: Option<B::Program>,
    /// Both hits and misses are cached; a linked program never changes.
    locations: HashMap<String, Option<B::Location>>,
    textures: BTreeMap<String, B::Texture>,
    texture_units: TextureUnits,
    uniforms: UniformMap,
    min_pixel_ratio: f64,
    max_pixel_count: u64,
    total_frame_time: f64,
    speed: f64,
    last_render_time: f64,
    render_frame: Option<FrameHandle>,
    debounce: ViewportDebounce,
    observed_size: Option<ObservedSize>,
    target: RenderTarget,
    resolution_dirty: bool,
    disposed: bool,
}

impl<B: GraphicsBackend, S: FrameScheduler, H: MountHost> ShaderMount<B, S, H> {
    /// Mounts `fragment_source` on `host`.
    ///
    /// A shader that fails to compile is logged and leaves the mount inert
    /// rather than failing construction. Images in `uniforms` must already
    /// be decoded; unloaded ones are logged, left out of [`Self::uniforms`],
    /// and every other uniform is still uploaded.
    pub fn new(
        backend: B,
        scheduler: S,
        host: H,
        fragment_source: &str,
        uniforms: UniformMap,
        options: MountOptions,
    ) -> Self {
        let last_render_time = scheduler.now();
        let mut mount = Self {
            backend,
            scheduler,
            host,
            program: None,
            locations: HashMap::new(),
            textures: BTreeMap::new(),
            texture_units: TextureUnits::new(),
            uniforms: UniformMap::new(),
            min_pixel_ratio: options.min_pixel_ratio,
            max_pixel_count: options.max_pixel_count,
            total_frame_time: options.frame,
            speed: 0.0,
            last_render_time,
            render_frame: None,
            debounce: ViewportDebounce::Idle,
            observed_size: None,
            target: RenderTarget::default(),
            resolution_dirty: true,
            disposed: false,
        };

        mount.host.install_global_style();
        mount.host.attach_canvas();

        match mount
            .backend
            .compile_program(SIZING_VERTEX_SHADER, fragment_source)
        {
            Ok(program) => mount.program = Some(program),
            Err(err) => error!(error = %err, "shader program unavailable; nothing will render"),
        }

        mount.setup_program(&uniforms);
        let (applied, result) = mount.upload_uniforms(uniforms);
        if let Err(err) = result {
            error!(error = %err, "initial uniforms incomplete");
        }
        mount.uniforms = applied;

        mount.host.connect_observers();
        if let Some(size) = mount.host.observed_size() {
            mount.handle_resize(size);
        }

        mount.set_speed(options.speed);
        mount.host.mark_mounted();
        mount
    }

    fn setup_program(&mut self, uniforms: &UniformMap) {
        let Some(program) = self.program.as_ref() else {
            return;
        };
        if let Err(err) = self.backend.setup_quad(program) {
            error!(error = %err, "failed to bind full-screen quad");
        }

        let mut names: Vec<String> = [U_TIME, U_RESOLUTION, U_PIXEL_RATIO]
            .into_iter()
            .map(String::from)
            .collect();
        for (name, value) in uniforms {
            names.push(name.clone());
            if value.as_texture().is_some() {
                names.push(aspect_ratio_uniform(name));
                self.texture_units.unit_for(name);
            }
        }

        for name in names {
            let location = self.backend.uniform_location(program, &name);
            self.locations.insert(name, location);
        }
    }

    /// Cached location for `name`, looked up on first use.
    fn location(&mut self, name: &str) -> Option<B::Location> {
        if let Some(cached) = self.locations.get(name) {
            return cached.clone();
        }
        let program = self.program.as_ref()?;
        let location = self.backend.uniform_location(program, name);
        self.locations.insert(name.to_string(), location.clone());
        location
    }

    /// Uploads every entry of `values` it can. Unloaded images are skipped
    /// and left out of the returned map; the first one is reported once the
    /// rest have been uploaded.
    fn upload_uniforms(&mut self, values: UniformMap) -> (UniformMap, Result<(), MountError>) {
        let mut applied = UniformMap::new();
        let mut first_unloaded = None;

        if let Some(program) = self.program.as_ref() {
            self.backend.use_program(program);
        }

        for (name, value) in values {
            if let Some(image) = value.as_texture() {
                if !image.is_loaded() {
                    warn!(uniform = %name, "image not loaded; skipping");
                    first_unloaded.get_or_insert_with(|| name.clone());
                    continue;
                }
            }
            if self.program.is_some() {
                self.upload_uniform(&name, &value);
            }
            applied.insert(name, value);
        }

        let result = match first_unloaded {
            Some(uniform) => Err(MountError::ImageNotLoaded { uniform }),
            None => Ok(()),
        };
        (applied, result)
    }

    fn upload_uniform(&mut self, name: &str, value: &UniformValue) {
        let upload = match lower(value) {
            Ok(upload) => upload,
            Err(UnsupportedLength(len)) => {
                warn!(uniform = %name, len, "unsupported uniform length; skipping");
                return;
            }
        };

        if let Upload::Texture(image) = upload {
            self.upload_texture(name, image);
            return;
        }

        let Some(location) = self.location(name) else {
            warn!(uniform = %name, "uniform not found in program; skipping");
            return;
        };
        match upload {
            Upload::Int(value) => self.backend.uniform_1i(&location, value),
            Upload::Float(value) => self.backend.uniform_1f(&location, value),
            Upload::Floats(shape, data) => self.backend.uniform_floats(&location, shape, data),
            Upload::Texture(_) => {}
        }
    }

    fn upload_texture(&mut self, name: &str, image: &TextureImage) {
        if let Some(previous) = self.textures.remove(name) {
            self.backend.delete_texture(previous);
        }

        let unit = self.texture_units.unit_for(name);
        let texture = match self.backend.create_texture(unit, image) {
            Ok(texture) => texture,
            Err(err) => {
                error!(uniform = %name, error = %err, "texture upload failed");
                return;
            }
        };
        self.textures.insert(name.to_string(), texture);

        match self.location(name) {
            Some(location) => self.backend.uniform_1i(&location, unit as i32),
            None => warn!(uniform = %name, "sampler not found in program; texture unused"),
        }
        if let Some(location) = self.location(&aspect_ratio_uniform(name)) {
            self.backend.uniform_1f(&location, image.aspect_ratio());
        }
    }

    /// Merges `partial` into the current uniforms, uploads it, and renders.
    ///
    /// Fails only when an image has not been decoded yet. That image is
    /// left out, every other entry is still uploaded and stored, and no
    /// frame is drawn.
    pub fn set_uniforms(&mut self, partial: UniformMap) -> Result<(), MountError> {
        if self.disposed {
            warn!("set_uniforms called on a disposed shader mount; ignoring");
            return Ok(());
        }
        let (applied, result) = self.upload_uniforms(partial);
        self.uniforms.extend(applied);
        result?;
        self.render_now();
        Ok(())
    }

    pub fn set_uniform(
        &mut self,
        name: impl Into<String>,
        value: impl Into<UniformValue>,
    ) -> Result<(), MountError> {
        let mut partial = UniformMap::new();
        partial.insert(name.into(), value.into());
        self.set_uniforms(partial)
    }

    /// Changes the animation multiplier. Negative speeds play backwards.
    pub fn set_speed(&mut self, speed: f64) {
        if self.disposed {
            warn!("set_speed called on a disposed shader mount; ignoring");
            return;
        }
        let running = self.render_frame.is_some();
        self.speed = speed;

        if speed != 0.0 && !running {
            self.last_render_time = self.scheduler.now();
            self.request_render_frame();
        } else if speed == 0.0 {
            self.cancel_render_frame();
        }
    }

    /// Seeks to `frame` milliseconds and draws it, whatever the speed.
    pub fn set_frame(&mut self, frame: f64) {
        if self.disposed {
            return;
        }
        self.total_frame_time = frame;
        let now = self.scheduler.now();
        self.last_render_time = now;
        self.render(now);
    }

    /// Accumulated animation time in milliseconds.
    pub fn current_frame_time(&self) -> f64 {
        self.total_frame_time
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Draws one frame at `now` (scheduler milliseconds).
    pub fn render(&mut self, now: f64) {
        if self.disposed {
            return;
        }
        let Some(program) = self.program.as_ref() else {
            warn!("render skipped: shader program is not available");
            return;
        };

        let dt = now - self.last_render_time;
        self.last_render_time = now;
        if self.speed != 0.0 {
            self.total_frame_time += dt * self.speed;
        }

        self.backend.clear();
        self.backend.use_program(program);

        if let Some(location) = self.location(U_TIME) {
            self.backend
                .uniform_1f(&location, (self.total_frame_time * 0.001) as f32);
        }

        if self.resolution_dirty {
            let RenderTarget { width, height, scale } = self.target;
            if let Some(location) = self.location(U_RESOLUTION) {
                self.backend.uniform_floats(
                    &location,
                    UniformShape::Vec2,
                    &[width as f32, height as f32],
                );
            }
            if let Some(location) = self.location(U_PIXEL_RATIO) {
                self.backend.uniform_1f(&location, scale as f32);
            }
            self.resolution_dirty = false;
        }

        self.backend.draw_quad();
        self.backend.finish_frame();
        self.host.present();

        if self.speed != 0.0 {
            self.request_render_frame();
        } else {
            self.cancel_render_frame();
        }
    }

    fn render_now(&mut self) {
        let now = self.scheduler.now();
        self.render(now);
    }

    fn request_render_frame(&mut self) {
        self.cancel_render_frame();
        self.render_frame = self.scheduler.request_frame(FrameSlot::Render);
    }

    fn cancel_render_frame(&mut self) {
        if let Some(handle) = self.render_frame.take() {
            self.scheduler.cancel_frame(handle);
        }
    }

    /// Scheduler callback. Handles the mount no longer tracks are ignored,
    /// so late deliveries after cancel or dispose are harmless.
    pub fn on_frame(&mut self, handle: FrameHandle, timestamp: f64) {
        if self.disposed {
            return;
        }
        match handle.slot {
            FrameSlot::Render => {
                if self.render_frame != Some(handle) {
                    return;
                }
                self.render_frame = None;
                self.render(timestamp);
            }
            FrameSlot::Resize => {
                if self.debounce.advance(handle, &mut self.scheduler) {
                    self.apply_resize();
                }
            }
        }
    }

    /// The handle currently awaited for `slot`, if any.
    pub fn pending_frame(&self, slot: FrameSlot) -> Option<FrameHandle> {
        match slot {
            FrameSlot::Render => self.render_frame,
            FrameSlot::Resize => self.debounce.pending(),
        }
    }

    /// Resize observer entry point: the host box is now `size` CSS pixels.
    pub fn handle_resize(&mut self, size: ObservedSize) {
        if self.disposed {
            return;
        }
        self.observed_size = Some(size);
        self.apply_resize();
    }

    /// Visual-viewport entry point; recomputes two frames later.
    pub fn handle_viewport_change(&mut self) {
        if self.disposed {
            return;
        }
        self.debounce.schedule(&mut self.scheduler);
    }

    fn apply_resize(&mut self) {
        let Some(size) = self.observed_size else {
            return;
        };
        let metrics = self.host.viewport_metrics();
        let target =
            compute_render_target(size, &metrics, self.min_pixel_ratio, self.max_pixel_count);
        if target == self.target {
            return;
        }

        debug!(
            width = target.width,
            height = target.height,
            scale = target.scale,
            "resizing shader backing store"
        );
        self.target = target;
        self.host.resize_canvas(target.width, target.height);
        self.backend.viewport(target.width, target.height);
        self.resolution_dirty = true;
        self.render_now();
    }

    pub fn render_target(&self) -> RenderTarget {
        self.target
    }

    pub fn uniforms(&self) -> &UniformMap {
        &self.uniforms
    }

    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Releases every GPU object and detaches from the host. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.cancel_render_frame();
        self.debounce.cancel(&mut self.scheduler);

        for (_, texture) in std::mem::take(&mut self.textures) {
            self.backend.delete_texture(texture);
        }
        if let Some(program) = self.program.take() {
            self.backend.delete_program(program);
        }
        self.backend.release();

        self.host.disconnect_observers();
        self.host.unmark_mounted();
        self.locations.clear();
        debug!("shader mount disposed");
    }
}

impl<B: GraphicsBackend, S: FrameScheduler, H: MountHost> Drop for ShaderMount<B, S, H> {
    fn drop(&mut self) {
        self.dispose();
    }
}
