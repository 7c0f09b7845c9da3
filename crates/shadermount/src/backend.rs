use crate::error::{BackendError, ShaderError};
use crate::types::TextureImage;

/// Layout of a float-vector uniform upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformShape {
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformShape {
    /// Dispatch for untyped numeric vectors: 2/3/4 are vectors, 9/16 are
    /// column-major matrices.
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            2 => Some(UniformShape::Vec2),
            3 => Some(UniformShape::Vec3),
            4 => Some(UniformShape::Vec4),
            9 => Some(UniformShape::Mat3),
            16 => Some(UniformShape::Mat4),
            _ => None,
        }
    }

    pub fn components(self) -> usize {
        match self {
            UniformShape::Vec2 => 2,
            UniformShape::Vec3 => 3,
            UniformShape::Vec4 => 4,
            UniformShape::Mat3 => 9,
            UniformShape::Mat4 => 16,
        }
    }
}

/// The GL calls a mount issues, narrowed to what a single full-screen
/// fragment program needs.
///
/// Implementations hold the context; the mount holds the handles it gets
/// back and hands each one back exactly once for deletion.
pub trait GraphicsBackend {
    type Program;
    type Location: Clone;
    type Texture;

    fn compile_program(&mut self, vertex: &str, fragment: &str)
        -> Result<Self::Program, ShaderError>;

    /// Binds the two-triangle quad to the program's `a_position` attribute.
    fn setup_quad(&mut self, program: &Self::Program) -> Result<(), BackendError>;

    fn use_program(&mut self, program: &Self::Program);

    fn uniform_location(&mut self, program: &Self::Program, name: &str) -> Option<Self::Location>;

    fn uniform_1f(&mut self, location: &Self::Location, value: f32);

    fn uniform_1i(&mut self, location: &Self::Location, value: i32);

    /// Uploads `data` as `shape`; `data.len()` is a multiple of the shape's
    /// component count (arrays upload every element).
    fn uniform_floats(&mut self, location: &Self::Location, shape: UniformShape, data: &[f32]);

    /// Creates a 2D texture with REPEAT wrapping and LINEAR filtering and
    /// leaves it bound on `unit`. On failure nothing stays allocated.
    fn create_texture(
        &mut self,
        unit: u32,
        image: &TextureImage,
    ) -> Result<Self::Texture, BackendError>;

    fn delete_texture(&mut self, texture: Self::Texture);

    fn viewport(&mut self, width: u32, height: u32);

    /// Clears to transparent.
    fn clear(&mut self);

    /// Draws the six-vertex quad.
    fn draw_quad(&mut self);

    /// Hook run after each draw, before the host presents.
    fn finish_frame(&mut self) {}

    fn delete_program(&mut self, program: Self::Program);

    /// Frees quad geometry and unbinds every buffer, framebuffer and
    /// renderbuffer target, then drains pending errors.
    fn release(&mut self);
}
