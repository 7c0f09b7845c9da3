//! Browser host: a canvas prepended into a DOM element, WebGL2 through
//! `glow`, `requestAnimationFrame` scheduling, and a `ResizeObserver` plus
//! visual-viewport listener feeding the mount.
//!
//! Callbacks reach the mount through a shared [`Weak`] so a frame or
//! observer event delivered after the mount is gone does nothing.

use std::cell::RefCell;
use std::io;
use std::rc::{Rc, Weak};
use std::sync::Once;

use image::RgbaImage;
use js_sys::{Array, Object, Reflect};
use tracing::{warn, Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    CanvasRenderingContext2d, Document, HtmlCanvasElement, HtmlElement, HtmlImageElement,
    ResizeObserver, ResizeObserverEntry, ResizeObserverSize, WebGl2RenderingContext, Window,
};

use crate::color::parse_color;
use crate::compile::GlslDialect;
use crate::error::MountError;
use crate::frame::{FrameHandle, FrameScheduler, FrameSlot};
use crate::glow_backend::GlowBackend;
use crate::host::MountHost;
use crate::mount::ShaderMount;
use crate::sizing::{is_safari_user_agent, ObservedSize, ViewportMetrics, VisualViewport};
use crate::types::{
    ContextAttributes, MountOptions, PowerPreference, TextureImage, UniformMap, UniformValue,
};

const MARKER_ATTRIBUTE: &str = "data-paper-shaders";
const MOUNT_PROPERTY: &str = "paperShaderMount";

const GLOBAL_STYLE: &str = "[data-paper-shaders] {
  isolation: isolate;
  position: relative;
}

[data-paper-shaders] > canvas {
  contain: strict;
  display: block;
  position: absolute;
  inset: 0;
  z-index: -1;
  width: 100%;
  height: 100%;
  border-radius: inherit;
}
";

pub type WebMount = ShaderMount<GlowBackend, RafScheduler, WebHost>;

type MountLink = Rc<RefCell<Weak<RefCell<WebMount>>>>;

fn with_mount(link: &MountLink, action: impl FnOnce(&mut WebMount)) {
    let Some(mount) = link.borrow().upgrade() else {
        return;
    };
    let Ok(mut guard) = mount.try_borrow_mut() else {
        warn!("shader mount busy; dropping callback");
        return;
    };
    action(&mut guard);
}

fn js_error(err: impl ToString) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn browser_window() -> Result<Window, MountError> {
    web_sys::window().ok_or_else(|| MountError::InvalidHost("no global window".to_string()))
}

/// `requestAnimationFrame` with one persistent callback per slot.
pub struct RafScheduler {
    window: Window,
    callbacks: [Closure<dyn FnMut(f64)>; 2],
}

impl RafScheduler {
    fn new(window: Window, link: MountLink) -> Self {
        let callback = |slot: FrameSlot| {
            let link = link.clone();
            Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
                with_mount(&link, |mount| {
                    if let Some(handle) = mount.pending_frame(slot) {
                        mount.on_frame(handle, timestamp);
                    }
                });
            })
        };
        Self {
            window,
            callbacks: [callback(FrameSlot::Render), callback(FrameSlot::Resize)],
        }
    }

    fn callback(&self, slot: FrameSlot) -> &js_sys::Function {
        let index = match slot {
            FrameSlot::Render => 0,
            FrameSlot::Resize => 1,
        };
        self.callbacks[index].as_ref().unchecked_ref()
    }
}

impl FrameScheduler for RafScheduler {
    fn request_frame(&mut self, slot: FrameSlot) -> Option<FrameHandle> {
        match self.window.request_animation_frame(self.callback(slot)) {
            Ok(id) => Some(FrameHandle::new(slot, id as u64)),
            Err(err) => {
                warn!(error = ?err, "requestAnimationFrame failed");
                None
            }
        }
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Err(err) = self.window.cancel_animation_frame(handle.id as i32) {
            warn!(error = ?err, "cancelAnimationFrame failed");
        }
    }

    fn now(&self) -> f64 {
        self.window
            .performance()
            .map(|performance| performance.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}

/// The DOM element a mount lives in.
pub struct WebHost {
    window: Window,
    document: Document,
    element: HtmlElement,
    canvas: HtmlCanvasElement,
    link: MountLink,
    resize_observer: Option<ResizeObserver>,
    resize_callback: Option<Closure<dyn FnMut(Array)>>,
    viewport_callback: Option<Closure<dyn FnMut()>>,
}

impl WebHost {
    /// Prepends a canvas into `element` and opens a WebGL2 context on it.
    fn new(
        element: &JsValue,
        attributes: &ContextAttributes,
        link: MountLink,
    ) -> Result<(Self, GlowBackend), MountError> {
        let element = element
            .dyn_ref::<HtmlElement>()
            .cloned()
            .ok_or_else(|| MountError::InvalidHost("expected an HTMLElement".to_string()))?;
        let window = browser_window()?;
        let document = window
            .document()
            .ok_or_else(|| MountError::InvalidHost("window has no document".to_string()))?;

        let canvas = document
            .create_element("canvas")
            .ok()
            .and_then(|node| node.dyn_into::<HtmlCanvasElement>().ok())
            .ok_or_else(|| MountError::InvalidHost("failed to create canvas".to_string()))?;
        element
            .prepend_with_node_1(&canvas)
            .map_err(|err| MountError::InvalidHost(format!("{err:?}")))?;

        let context = canvas
            .get_context_with_context_options("webgl2", &context_options(attributes))
            .ok()
            .flatten()
            .and_then(|context| context.dyn_into::<WebGl2RenderingContext>().ok())
            .ok_or_else(|| {
                MountError::ContextUnavailable("WebGL2 is not supported by this browser".to_string())
            })?;
        let gl = glow::Context::from_webgl2_context(context);

        let host = Self {
            window,
            document,
            element,
            canvas,
            link,
            resize_observer: None,
            resize_callback: None,
            viewport_callback: None,
        };
        Ok((host, GlowBackend::new(gl, GlslDialect::Es300)))
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

fn context_options(attributes: &ContextAttributes) -> JsValue {
    let options = Object::new();
    let entries: [(&str, JsValue); 5] = [
        ("alpha", attributes.alpha.into()),
        ("premultipliedAlpha", attributes.premultiplied_alpha.into()),
        ("antialias", attributes.antialias.into()),
        ("preserveDrawingBuffer", attributes.preserve_drawing_buffer.into()),
        ("powerPreference", attributes.power_preference.as_str().into()),
    ];
    for (key, value) in entries {
        let _ = Reflect::set(&options, &key.into(), &value);
    }
    options.into()
}

fn context_attributes_from_js(value: &JsValue) -> ContextAttributes {
    let mut attributes = ContextAttributes::default();
    if !value.is_object() {
        return attributes;
    }
    let flag = |key: &str| Reflect::get(value, &key.into()).ok().and_then(|v| v.as_bool());
    if let Some(alpha) = flag("alpha") {
        attributes.alpha = alpha;
    }
    if let Some(premultiplied) = flag("premultipliedAlpha") {
        attributes.premultiplied_alpha = premultiplied;
    }
    if let Some(antialias) = flag("antialias") {
        attributes.antialias = antialias;
    }
    if let Some(preserve) = flag("preserveDrawingBuffer") {
        attributes.preserve_drawing_buffer = preserve;
    }
    let preference = Reflect::get(value, &"powerPreference".into())
        .ok()
        .and_then(|v| v.as_string());
    attributes.power_preference = match preference.as_deref() {
        Some("low-power") => PowerPreference::LowPower,
        Some("high-performance") => PowerPreference::HighPerformance,
        _ => PowerPreference::Default,
    };
    attributes
}

fn observed_size_from_entry(entry: &ResizeObserverEntry) -> ObservedSize {
    let border_box = entry.border_box_size().get(0);
    if let Some(size) = border_box.dyn_ref::<ResizeObserverSize>() {
        return ObservedSize::new(size.inline_size(), size.block_size());
    }
    let rect = entry.content_rect();
    ObservedSize::new(rect.width(), rect.height())
}

impl MountHost for WebHost {
    fn install_global_style(&mut self) {
        let selector = format!("style[{MARKER_ATTRIBUTE}]");
        if let Ok(Some(_)) = self.document.query_selector(&selector) {
            return;
        }
        let Some(head) = self.document.head() else {
            return;
        };
        let Ok(style) = self.document.create_element("style") else {
            return;
        };
        let _ = style.set_attribute(MARKER_ATTRIBUTE, "");
        style.set_text_content(Some(GLOBAL_STYLE));
        if let Err(err) = head.prepend_with_node_1(&style) {
            warn!(error = ?err, "failed to install shader stylesheet");
        }
    }

    fn attach_canvas(&mut self) {
        if let Err(err) = self.element.set_attribute(MARKER_ATTRIBUTE, "") {
            warn!(error = ?err, "failed to mark shader host element");
        }
    }

    fn mark_mounted(&mut self) {
        let handle = MountHandle {
            inner: self.link.borrow().clone(),
        };
        if let Err(err) = Reflect::set(&self.element, &MOUNT_PROPERTY.into(), &handle.into()) {
            warn!(error = ?err, "failed to publish shader mount on host element");
        }
    }

    fn unmark_mounted(&mut self) {
        let _ = Reflect::delete_property(&self.element, &MOUNT_PROPERTY.into());
        let _ = self.element.remove_attribute(MARKER_ATTRIBUTE);
    }

    fn connect_observers(&mut self) {
        let link = self.link.clone();
        let resize_callback = Closure::<dyn FnMut(Array)>::new(move |entries: Array| {
            let Some(entry) = entries
                .iter()
                .last()
                .and_then(|entry| entry.dyn_into::<ResizeObserverEntry>().ok())
            else {
                return;
            };
            let size = observed_size_from_entry(&entry);
            with_mount(&link, |mount| mount.handle_resize(size));
        });
        match ResizeObserver::new(resize_callback.as_ref().unchecked_ref()) {
            Ok(observer) => {
                observer.observe(&self.element);
                self.resize_observer = Some(observer);
            }
            Err(err) => warn!(error = ?err, "ResizeObserver unavailable; size is fixed"),
        }
        self.resize_callback = Some(resize_callback);

        let link = self.link.clone();
        let viewport_callback = Closure::<dyn FnMut()>::new(move || {
            with_mount(&link, |mount| mount.handle_viewport_change());
        });
        if let Some(viewport) = self.window.visual_viewport() {
            let _ = viewport.add_event_listener_with_callback(
                "resize",
                viewport_callback.as_ref().unchecked_ref(),
            );
        }
        self.viewport_callback = Some(viewport_callback);
    }

    fn disconnect_observers(&mut self) {
        if let Some(observer) = self.resize_observer.take() {
            observer.disconnect();
        }
        if let (Some(viewport), Some(callback)) =
            (self.window.visual_viewport(), self.viewport_callback.as_ref())
        {
            let _ = viewport
                .remove_event_listener_with_callback("resize", callback.as_ref().unchecked_ref());
        }
    }

    fn observed_size(&self) -> Option<ObservedSize> {
        let rect = self.element.get_bounding_client_rect();
        Some(ObservedSize::new(rect.width(), rect.height()))
    }

    fn viewport_metrics(&self) -> ViewportMetrics {
        let user_agent = self.window.navigator().user_agent().unwrap_or_default();
        ViewportMetrics {
            device_pixel_ratio: self.window.device_pixel_ratio(),
            visual_viewport: self.window.visual_viewport().map(|viewport| VisualViewport {
                scale: viewport.scale(),
                width: viewport.width(),
            }),
            outer_width: self.window.outer_width().ok().and_then(|v| v.as_f64()),
            inner_width: self.window.inner_width().ok().and_then(|v| v.as_f64()),
            is_safari: is_safari_user_agent(&user_agent),
        }
    }

    fn resize_canvas(&mut self, width: u32, height: u32) {
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }
}

/// Reads decoded pixels out of an `<img>` through a 2D canvas. An image that
/// has not finished loading yields an empty texture.
fn texture_from_image(document: &Document, image: &HtmlImageElement) -> Result<TextureImage, JsValue> {
    let (width, height) = (image.natural_width(), image.natural_height());
    if !image.complete() || width == 0 || height == 0 {
        return Ok(TextureImage::new(RgbaImage::new(0, 0)));
    }

    let canvas: HtmlCanvasElement = document.create_element("canvas")?.dyn_into()?;
    canvas.set_width(width);
    canvas.set_height(height);
    let context: CanvasRenderingContext2d = canvas
        .get_context("2d")?
        .ok_or("2d canvas context unavailable")?
        .dyn_into()?;
    context.draw_image_with_html_image_element(image, 0.0, 0.0)?;
    let data = context.get_image_data(0.0, 0.0, width as f64, height as f64)?;
    let pixels = RgbaImage::from_raw(width, height, data.data().0).ok_or("image data size mismatch")?;
    Ok(TextureImage::new(pixels))
}

fn floats_from_array(name: &str, array: &Array) -> Option<Vec<f32>> {
    let number = |value: JsValue| value.as_f64().map(|n| n as f32);

    if !Array::is_array(&array.get(0)) {
        let flat = array.iter().map(number).collect::<Option<Vec<_>>>();
        if flat.is_none() {
            warn!(uniform = %name, "uniform array contains non-numeric values; skipping");
        }
        return flat;
    }

    let expected = Array::from(&array.get(0)).length();
    let mut flat = Vec::new();
    for row in array.iter() {
        if !Array::is_array(&row) {
            warn!(uniform = %name, "mixed nested and flat uniform arrays; skipping");
            return None;
        }
        let row = Array::from(&row);
        if row.length() != expected {
            warn!(uniform = %name, "all child arrays must be the same length; skipping");
            return None;
        }
        for value in row.iter() {
            let Some(value) = number(value) else {
                warn!(uniform = %name, "uniform array contains non-numeric values; skipping");
                return None;
            };
            flat.push(value);
        }
    }
    Some(flat)
}

fn uniform_from_js(
    document: &Document,
    name: &str,
    value: &JsValue,
) -> Result<Option<UniformValue>, JsValue> {
    if let Some(flag) = value.as_bool() {
        return Ok(Some(UniformValue::Bool(flag)));
    }
    if let Some(number) = value.as_f64() {
        return Ok(Some(UniformValue::Float(number as f32)));
    }
    if let Some(image) = value.dyn_ref::<HtmlImageElement>() {
        return texture_from_image(document, image).map(|image| Some(UniformValue::Texture(image)));
    }
    if Array::is_array(value) {
        return Ok(floats_from_array(name, &Array::from(value)).map(UniformValue::Floats));
    }
    warn!(uniform = %name, "unsupported uniform value; skipping");
    Ok(None)
}

/// Converts a `{ name: value }` object. Numbers become floats, booleans
/// bools, arrays float vectors (nested arrays are flattened), and `<img>`
/// elements textures.
fn uniforms_from_js(document: &Document, value: &JsValue) -> Result<UniformMap, JsValue> {
    let mut uniforms = UniformMap::new();
    if value.is_undefined() || value.is_null() {
        return Ok(uniforms);
    }
    let object = value
        .dyn_ref::<Object>()
        .ok_or("uniforms must be an object")?;
    for entry in Object::entries(object).iter() {
        let pair = Array::from(&entry);
        let Some(name) = pair.get(0).as_string() else {
            continue;
        };
        if let Some(uniform) = uniform_from_js(document, &name, &pair.get(1))? {
            uniforms.insert(name, uniform);
        }
    }
    Ok(uniforms)
}

/// Browser output for `tracing`: each event becomes one console call at the
/// matching level.
#[derive(Clone, Copy)]
struct ConsoleMakeWriter;

struct ConsoleWriter {
    level: Level,
    buffer: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let message = String::from_utf8_lossy(&self.buffer);
        let message = JsValue::from_str(message.trim_end());
        match self.level {
            Level::ERROR => web_sys::console::error_1(&message),
            Level::WARN => web_sys::console::warn_1(&message),
            Level::INFO => web_sys::console::info_1(&message),
            _ => web_sys::console::debug_1(&message),
        }
    }
}

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            level: Level::INFO,
            buffer: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            level: *meta.level(),
            buffer: Vec::new(),
        }
    }
}

fn initialise_console_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        let _ = tracing_subscriber::fmt()
            .with_writer(ConsoleMakeWriter)
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .try_init();
    });
}

/// JavaScript-facing mount: `new ShaderMount(element, fragmentShader, ...)`.
#[wasm_bindgen(js_name = ShaderMount)]
pub struct WebShaderMount {
    inner: Rc<RefCell<WebMount>>,
    document: Document,
}

#[wasm_bindgen(js_class = ShaderMount)]
impl WebShaderMount {
    #[wasm_bindgen(constructor)]
    pub fn new(
        element: JsValue,
        fragment_shader: &str,
        uniforms: JsValue,
        webgl_context_attributes: JsValue,
        speed: Option<f64>,
        frame: Option<f64>,
        min_pixel_ratio: Option<f64>,
        max_pixel_count: Option<f64>,
    ) -> Result<WebShaderMount, JsValue> {
        initialise_console_logging();

        let defaults = MountOptions::default();
        let options = MountOptions {
            speed: speed.unwrap_or(defaults.speed),
            frame: frame.unwrap_or(defaults.frame),
            min_pixel_ratio: min_pixel_ratio.unwrap_or(defaults.min_pixel_ratio),
            max_pixel_count: max_pixel_count
                .filter(|count| count.is_finite() && *count >= 0.0)
                .map(|count| count as u64)
                .unwrap_or(defaults.max_pixel_count),
            context: context_attributes_from_js(&webgl_context_attributes),
        };

        let window = browser_window().map_err(js_error)?;
        let document = window
            .document()
            .ok_or_else(|| js_error("window has no document"))?;
        let uniforms = uniforms_from_js(&document, &uniforms)?;
        if let Some((name, _)) = uniforms
            .iter()
            .find(|(_, value)| value.as_texture().is_some_and(|image| !image.is_loaded()))
        {
            return Err(js_error(MountError::ImageNotLoaded {
                uniform: name.clone(),
            }));
        }

        let link: MountLink = Rc::new(RefCell::new(Weak::new()));
        let (host, backend) =
            WebHost::new(&element, &options.context, link.clone()).map_err(js_error)?;
        let scheduler = RafScheduler::new(window, link.clone());

        let inner = Rc::new_cyclic(|weak| {
            *link.borrow_mut() = weak.clone();
            RefCell::new(ShaderMount::new(
                backend,
                scheduler,
                host,
                fragment_shader,
                uniforms,
                options,
            ))
        });
        Ok(Self { inner, document })
    }

    #[wasm_bindgen(js_name = setUniforms)]
    pub fn set_uniforms(&self, uniforms: JsValue) -> Result<(), JsValue> {
        let uniforms = uniforms_from_js(&self.document, &uniforms)?;
        self.update(uniforms)
    }

    #[wasm_bindgen(js_name = setFloat)]
    pub fn set_float(&self, name: String, value: f32) -> Result<(), JsValue> {
        self.update_one(name, UniformValue::Float(value))
    }

    #[wasm_bindgen(js_name = setBool)]
    pub fn set_bool(&self, name: String, value: bool) -> Result<(), JsValue> {
        self.update_one(name, UniformValue::Bool(value))
    }

    #[wasm_bindgen(js_name = setVector)]
    pub fn set_vector(&self, name: String, values: Vec<f32>) -> Result<(), JsValue> {
        self.update_one(name, UniformValue::Floats(values))
    }

    /// Parses a CSS colour (`#rrggbb`, `rgb()`, `hsl()`) into a `vec4`.
    #[wasm_bindgen(js_name = setColor)]
    pub fn set_color(&self, name: String, color: &str) -> Result<(), JsValue> {
        let rgba = parse_color(color).map_err(js_error)?;
        self.update_one(name, UniformValue::Vec4(rgba))
    }

    #[wasm_bindgen(js_name = setSpeed)]
    pub fn set_speed(&self, speed: f64) {
        if let Ok(mut mount) = self.inner.try_borrow_mut() {
            mount.set_speed(speed);
        }
    }

    #[wasm_bindgen(js_name = setFrame)]
    pub fn set_frame(&self, frame: f64) {
        if let Ok(mut mount) = self.inner.try_borrow_mut() {
            mount.set_frame(frame);
        }
    }

    #[wasm_bindgen(js_name = getCurrentFrameTime)]
    pub fn current_frame_time(&self) -> f64 {
        self.inner
            .try_borrow()
            .map(|mount| mount.current_frame_time())
            .unwrap_or(f64::NAN)
    }

    pub fn dispose(&self) {
        if let Ok(mut mount) = self.inner.try_borrow_mut() {
            mount.dispose();
        }
    }

    fn update_one(&self, name: String, value: UniformValue) -> Result<(), JsValue> {
        let mut uniforms = UniformMap::new();
        uniforms.insert(name, value);
        self.update(uniforms)
    }

    fn update(&self, uniforms: UniformMap) -> Result<(), JsValue> {
        let mut mount = self
            .inner
            .try_borrow_mut()
            .map_err(|_| js_error("shader mount is busy"))?;
        mount.set_uniforms(uniforms).map_err(js_error)
    }
}

/// What the host element's `paperShaderMount` property points at. Holds
/// the mount weakly so the DOM never keeps GPU resources alive.
#[wasm_bindgen]
pub struct MountHandle {
    inner: Weak<RefCell<WebMount>>,
}

#[wasm_bindgen]
impl MountHandle {
    #[wasm_bindgen(js_name = isDisposed)]
    pub fn is_disposed(&self) -> bool {
        self.inner
            .upgrade()
            .and_then(|mount| mount.try_borrow().ok().map(|mount| mount.is_disposed()))
            .unwrap_or(true)
    }

    #[wasm_bindgen(js_name = getCurrentFrameTime)]
    pub fn current_frame_time(&self) -> Option<f64> {
        let mount = self.inner.upgrade()?;
        let frame_time = mount.try_borrow().ok()?.current_frame_time();
        Some(frame_time)
    }

    pub fn dispose(&self) {
        if let Some(mount) = self.inner.upgrade() {
            if let Ok(mut mount) = mount.try_borrow_mut() {
                mount.dispose();
            }
        }
    }
}
