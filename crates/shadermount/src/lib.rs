//! Runtime for mounting a GLSL fragment shader onto a drawing surface.
//!
//! A [`ShaderMount`] compiles one fragment shader against a shared sizing
//! vertex shader, uploads uniforms and textures, drives an animation clock,
//! and keeps the backing store matched to the host's size under a pixel
//! budget. The flow is:
//!
//! ```text
//!   host observers ──▶ handle_resize / handle_viewport_change
//!          │                        │ compute_render_target()
//!          ▼                        ▼
//!   FrameScheduler ──▶ on_frame ──▶ render() ──▶ GraphicsBackend (glow)
//!          ▲                                        │
//!          └──────────── speed != 0 ◀───────────────┘
//! ```
//!
//! Three seams keep the mount independent of where it runs:
//! [`GraphicsBackend`] (GL calls), [`FrameScheduler`] (animation frames) and
//! [`MountHost`] (canvas, observers, viewport metrics). [`GlowBackend`]
//! implements the first for both WebGL2 and desktop GL; the browser host
//! lives behind `target_arch = "wasm32"` and is exported to JavaScript as
//! `ShaderMount`.

mod backend;
mod color;
mod compile;
mod debounce;
mod error;
mod frame;
mod glow_backend;
mod glsl;
mod host;
mod mount;
mod sizing;
mod textures;
mod types;
mod uniforms;

#[cfg(test)]
mod mock;

#[cfg(target_arch = "wasm32")]
mod web;

pub use backend::{GraphicsBackend, UniformShape};
pub use color::{parse_color, ColorError};
pub use compile::{prepare_source, GlslDialect};
pub use error::{BackendError, MountError, ShaderError, ShaderStage};
pub use frame::{FrameHandle, FrameScheduler, FrameSlot};
pub use glow_backend::GlowBackend;
pub use glsl::{builtin_fragment, FitMode, ShaderSizing, BUILTIN_NAMES, SIZING_VERTEX_SHADER};
pub use host::MountHost;
pub use mount::ShaderMount;
pub use sizing::{
    compute_render_target, is_safari_user_agent, ObservedSize, RenderTarget, ViewportMetrics,
    VisualViewport,
};
pub use types::{
    ContextAttributes, MountOptions, PowerPreference, TextureError, TextureImage, UniformMap,
    UniformValue, DEFAULT_MAX_PIXEL_COUNT, DEFAULT_MIN_PIXEL_RATIO,
};

#[cfg(target_arch = "wasm32")]
pub use web::{MountHandle, WebShaderMount};
