//! Desktop host for a [`ShaderMount`]: a winit window with a glutin GL
//! context. The mount renders into an offscreen framebuffer sized by its
//! pixel budget which is scaled onto the window on present, the same split a
//! browser makes between a canvas backing store and its CSS box.

use std::cell::RefCell;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glutin::config::{Config, ConfigTemplateBuilder};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, GlProfile, NotCurrentContext, PossiblyCurrentContext,
    Version,
};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface, SwapInterval, WindowSurface};
use glutin_winit::{DisplayBuilder, GlWindow};
use raw_window_handle::HasRawWindowHandle;
use sceneconfig::ResolvedScene;
use shadermount::{
    FrameHandle, FrameScheduler, FrameSlot, GlowBackend, GlslDialect, MountHost, ObservedSize,
    ShaderMount, ViewportMetrics,
};
use tracing::{debug, info, warn};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

type DesktopMount = ShaderMount<GlowBackend, RedrawScheduler, WindowHost>;

/// Frame requests waiting for the next `RedrawRequested`, plus the clock
/// their timestamps come from.
#[derive(Debug)]
struct FrameQueue {
    started: Instant,
    next_id: u64,
    pending: Vec<FrameHandle>,
}

impl FrameQueue {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            next_id: 0,
            pending: Vec::new(),
        }
    }

    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

/// Turns frame requests into window redraws. Handles requested while a
/// redraw is being processed are delivered on the following one.
struct RedrawScheduler {
    window: Rc<Window>,
    queue: Rc<RefCell<FrameQueue>>,
}

impl RedrawScheduler {
    fn new(window: Rc<Window>) -> Self {
        Self {
            window,
            queue: Rc::new(RefCell::new(FrameQueue::new())),
        }
    }
}

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self, slot: FrameSlot) -> Option<FrameHandle> {
        let mut queue = self.queue.borrow_mut();
        queue.next_id += 1;
        let handle = FrameHandle::new(slot, queue.next_id);
        queue.pending.push(handle);
        self.window.request_redraw();
        Some(handle)
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.queue
            .borrow_mut()
            .pending
            .retain(|pending| *pending != handle);
    }

    fn now(&self) -> f64 {
        self.queue.borrow().now()
    }
}

struct WindowHost {
    window: Rc<Window>,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    backing_size: (u32, u32),
}

impl WindowHost {
    fn resize_surface(&mut self) {
        self.window.resize_surface(&self.surface, &self.context);
    }
}

impl MountHost for WindowHost {
    fn observed_size(&self) -> Option<ObservedSize> {
        let logical: LogicalSize<f64> = self.window.inner_size().to_logical(self.window.scale_factor());
        Some(ObservedSize::new(logical.width, logical.height))
    }

    fn viewport_metrics(&self) -> ViewportMetrics {
        ViewportMetrics::with_device_pixel_ratio(self.window.scale_factor())
    }

    fn resize_canvas(&mut self, width: u32, height: u32) {
        debug!(width, height, "window backing store resized");
        self.backing_size = (width, height);
    }

    fn present(&mut self) {
        if let Err(err) = self.surface.swap_buffers(&self.context) {
            warn!(error = %err, "failed to present frame");
        }
    }
}

struct GlSetup {
    window: Window,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    gl: glow::Context,
    dialect: GlslDialect,
}

fn pick_config(configs: Box<dyn Iterator<Item = Config> + '_>) -> Config {
    configs
        .reduce(|best, candidate| {
            if candidate.num_samples() > best.num_samples() {
                candidate
            } else {
                best
            }
        })
        .expect("glutin only calls the picker with at least one config")
}

/// Prefers desktop GL 3.3 core and falls back to GLES 3.0.
fn create_context(config: &Config, window: &Window) -> Result<(NotCurrentContext, GlslDialect)> {
    let display = config.display();
    let raw_window_handle = window.raw_window_handle();

    let desktop = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
        .with_profile(GlProfile::Core)
        .build(Some(raw_window_handle));
    match unsafe { display.create_context(config, &desktop) } {
        Ok(context) => return Ok((context, GlslDialect::Desktop330)),
        Err(err) => warn!(error = %err, "OpenGL 3.3 core unavailable; trying GLES 3.0"),
    }

    let gles = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(3, 0))))
        .build(Some(raw_window_handle));
    let context = unsafe { display.create_context(config, &gles) }
        .map_err(|err| anyhow!("failed to create a GL 3.3 or GLES 3.0 context: {err}"))?;
    Ok((context, GlslDialect::Es300))
}

fn setup_gl(event_loop: &EventLoop<()>, scene: &ResolvedScene) -> Result<GlSetup> {
    let window_builder = WindowBuilder::new()
        .with_title(scene.window.title.as_str())
        .with_inner_size(LogicalSize::new(scene.window.width, scene.window.height));

    let alpha_size = if scene.options.context.alpha { 8 } else { 0 };
    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(alpha_size)
        .with_depth_size(0);
    let (window, config) = DisplayBuilder::new()
        .with_window_builder(Some(window_builder))
        .build(event_loop, template, pick_config)
        .map_err(|err| anyhow!("failed to build GL display: {err}"))?;
    let window = window.context("display builder did not create a window")?;

    let (context, dialect) = create_context(&config, &window)?;
    let surface_attributes = window.build_surface_attributes(Default::default());
    let surface = unsafe {
        config
            .display()
            .create_window_surface(&config, &surface_attributes)
    }
    .map_err(|err| anyhow!("failed to create window surface: {err}"))?;
    let context = context
        .make_current(&surface)
        .map_err(|err| anyhow!("failed to make GL context current: {err}"))?;
    if let Err(err) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
        warn!(error = %err, "vsync unavailable");
    }

    let display = config.display();
    let gl = unsafe { glow::Context::from_loader_function_cstr(|name| display.get_proc_address(name)) };

    Ok(GlSetup {
        window,
        surface,
        context,
        gl,
        dialect,
    })
}

/// Key bindings: Space toggles pause, `R` rewinds, Escape closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    TogglePause,
    Rewind,
    Close,
}

fn key_action(event: &KeyEvent) -> Option<KeyAction> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Space) => Some(KeyAction::TogglePause),
        Key::Named(NamedKey::Escape) => Some(KeyAction::Close),
        Key::Character(value) if value.eq_ignore_ascii_case("r") => Some(KeyAction::Rewind),
        Key::Character(value) if value.as_str() == " " => Some(KeyAction::TogglePause),
        _ => None,
    }
}

/// Remembers the speed to restore when unpausing.
#[derive(Debug, Clone, Copy)]
struct Playback {
    resume_speed: f64,
}

impl Playback {
    fn new(speed: f64) -> Self {
        Self {
            resume_speed: if speed == 0.0 { 1.0 } else { speed },
        }
    }

    fn toggle(&mut self, mount: &mut DesktopMount) {
        let speed = mount.speed();
        if speed == 0.0 {
            info!(speed = self.resume_speed, "resuming");
            mount.set_speed(self.resume_speed);
        } else {
            self.resume_speed = speed;
            info!(frame = mount.current_frame_time(), "paused");
            mount.set_speed(0.0);
        }
    }
}

/// Delivers every frame requested before this redraw. A redraw nobody asked
/// for (expose, restore) repaints the current frame.
fn deliver_frames(mount: &mut DesktopMount, queue: &RefCell<FrameQueue>) {
    let due = std::mem::take(&mut queue.borrow_mut().pending);
    let now = queue.borrow().now();
    if due.is_empty() {
        mount.render(now);
        return;
    }
    for handle in due {
        mount.on_frame(handle, now);
    }
}

pub fn run_window(scene: ResolvedScene) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let GlSetup {
        window,
        surface,
        context,
        gl,
        dialect,
    } = setup_gl(&event_loop, &scene)?;
    info!(?dialect, "GL context ready");

    let window = Rc::new(window);
    let size = window.inner_size();
    let mut backend = GlowBackend::new(gl, dialect).with_offscreen_target();
    backend.set_present_size(size.width, size.height);

    let scheduler = RedrawScheduler::new(window.clone());
    let queue = scheduler.queue.clone();
    let host = WindowHost {
        window: window.clone(),
        surface,
        context,
        backing_size: (0, 0),
    };

    let mut playback = Playback::new(scene.options.speed);
    let mut mount = ShaderMount::new(
        backend,
        scheduler,
        host,
        &scene.fragment_source,
        scene.uniforms,
        scene.options,
    );
    if !mount.has_program() {
        return Err(anyhow!("shader failed to compile; see the log for details"));
    }

    event_loop.set_control_flow(ControlFlow::Wait);
    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(size) => handle_resized(&mut mount, &queue, size),
                WindowEvent::ScaleFactorChanged { .. } => mount.handle_viewport_change(),
                WindowEvent::KeyboardInput { event, .. } => match key_action(&event) {
                    Some(KeyAction::TogglePause) => playback.toggle(&mut mount),
                    Some(KeyAction::Rewind) => mount.set_frame(0.0),
                    Some(KeyAction::Close) => elwt.exit(),
                    None => {}
                },
                WindowEvent::RedrawRequested => deliver_frames(&mut mount, &queue),
                _ => {}
            },
            Event::LoopExiting => {
                let (width, height) = mount.host().backing_size;
                debug!(width, height, "disposing shader mount");
                mount.dispose();
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

/// The window size only feeds the mount's sizing; if the budget leaves the
/// backing store unchanged the frame is still re-presented at the new size.
fn handle_resized(mount: &mut DesktopMount, queue: &RefCell<FrameQueue>, size: PhysicalSize<u32>) {
    if size.width == 0 || size.height == 0 {
        return;
    }
    mount.host_mut().resize_surface();
    mount.backend_mut().set_present_size(size.width, size.height);

    let before = mount.render_target();
    if let Some(observed) = mount.host().observed_size() {
        mount.handle_resize(observed);
    }
    if mount.render_target() == before {
        let now = queue.borrow().now();
        mount.render(now);
    }
}
