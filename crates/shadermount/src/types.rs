use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;

/// Uniforms keyed by their GLSL name (`u_colorBack`, `u_image`, ...).
pub type UniformMap = BTreeMap<String, UniformValue>;

/// Value supplied to a GLSL uniform.
///
/// The caller picks the variant; the mount never guesses a shape from the
/// data. `Floats` exists for bridging layers that only know "a list of
/// numbers" and is dispatched by its length.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major 3×3 matrix.
    Mat3([[f32; 3]; 3]),
    /// Column-major 4×4 matrix.
    Mat4([[f32; 4]; 4]),
    /// `uniform vec4 u_colors[N]` style arrays.
    Vec4Array(Vec<[f32; 4]>),
    Floats(Vec<f32>),
    Texture(TextureImage),
}

impl UniformValue {
    pub fn kind(&self) -> &'static str {
        match self {
            UniformValue::Bool(_) => "bool",
            UniformValue::Float(_) => "float",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec3(_) => "vec3",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::Mat3(_) => "mat3",
            UniformValue::Mat4(_) => "mat4",
            UniformValue::Vec4Array(_) => "vec4[]",
            UniformValue::Floats(_) => "float[]",
            UniformValue::Texture(_) => "sampler2D",
        }
    }

    pub fn as_texture(&self) -> Option<&TextureImage> {
        match self {
            UniformValue::Texture(image) => Some(image),
            _ => None,
        }
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        UniformValue::Bool(value)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<[[f32; 3]; 3]> for UniformValue {
    fn from(value: [[f32; 3]; 3]) -> Self {
        UniformValue::Mat3(value)
    }
}

impl From<[[f32; 4]; 4]> for UniformValue {
    fn from(value: [[f32; 4]; 4]) -> Self {
        UniformValue::Mat4(value)
    }
}

impl From<TextureImage> for UniformValue {
    fn from(value: TextureImage) -> Self {
        UniformValue::Texture(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decoded RGBA8 pixels shared between uniform maps without copying.
#[derive(Clone)]
pub struct TextureImage {
    pixels: Arc<RgbaImage>,
}

impl TextureImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    /// Decodes an image file into RGBA8.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TextureError> {
        let decoded = image::open(path)?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TextureError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// An image without pixels has not finished loading and cannot be uploaded.
    pub fn is_loaded(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height() == 0 {
            return 1.0;
        }
        self.width() as f32 / self.height() as f32
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

impl fmt::Debug for TextureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl PartialEq for TextureImage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

/// GPU power hint forwarded to context creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    #[default]
    Default,
    LowPower,
    HighPerformance,
}

impl PowerPreference {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerPreference::Default => "default",
            PowerPreference::LowPower => "low-power",
            PowerPreference::HighPerformance => "high-performance",
        }
    }
}

/// Context creation attributes, mirroring `WebGLContextAttributes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAttributes {
    pub alpha: bool,
    pub premultiplied_alpha: bool,
    pub antialias: bool,
    pub preserve_drawing_buffer: bool,
    pub power_preference: PowerPreference,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            alpha: true,
            premultiplied_alpha: true,
            antialias: true,
            preserve_drawing_buffer: false,
            power_preference: PowerPreference::Default,
        }
    }
}

/// 1920×1080 at 4 pixels per CSS pixel.
pub const DEFAULT_MAX_PIXEL_COUNT: u64 = 1920 * 1080 * 4;
pub const DEFAULT_MIN_PIXEL_RATIO: f64 = 2.0;

/// Construction-time knobs for a [`crate::ShaderMount`].
#[derive(Debug, Clone, PartialEq)]
pub struct MountOptions {
    /// Animation speed multiplier; `0` renders only on demand.
    pub speed: f64,
    /// Initial accumulated frame time in milliseconds.
    pub frame: f64,
    /// Lower bound for the render scale regardless of the display's DPR.
    pub min_pixel_ratio: f64,
    /// Upper bound for `width × height` of the backing store.
    pub max_pixel_count: u64,
    pub context: ContextAttributes,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_frame(mut self, frame: f64) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_min_pixel_ratio(mut self, ratio: f64) -> Self {
        self.min_pixel_ratio = ratio;
        self
    }

    pub fn with_max_pixel_count(mut self, count: u64) -> Self {
        self.max_pixel_count = count;
        self
    }
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            speed: 0.0,
            frame: 0.0,
            min_pixel_ratio: DEFAULT_MIN_PIXEL_RATIO,
            max_pixel_count: DEFAULT_MAX_PIXEL_COUNT,
            context: ContextAttributes::default(),
        }
    }
}
