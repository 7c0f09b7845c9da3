//! [`GraphicsBackend`] over a `glow` context (WebGL2 or desktop GL 3.3).
//!
//! In offscreen mode the mount renders into a renderbuffer sized to the
//! computed backing store, and [`GraphicsBackend::finish_frame`] blits it to
//! the default framebuffer at the present size. That gives a native window
//! the same "backing store independent of display size" behaviour a canvas
//! has. A renderbuffer is used so no texture unit is ever borrowed.

use glow::HasContext;
use tracing::{debug, warn};

use crate::backend::{GraphicsBackend, UniformShape};
use crate::compile::{prepare_source, GlslDialect};
use crate::error::{BackendError, ShaderError, ShaderStage};
use crate::types::TextureImage;

/// Two triangles covering clip space.
const QUAD_VERTICES: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

/// Guards against contexts that keep reporting the same error (context loss).
const MAX_DRAINED_ERRORS: usize = 32;

struct Quad {
    vertex_array: glow::VertexArray,
    buffer: glow::Buffer,
}

struct OffscreenTarget {
    framebuffer: glow::Framebuffer,
    renderbuffer: glow::Renderbuffer,
    width: u32,
    height: u32,
}

pub struct GlowBackend {
    gl: glow::Context,
    dialect: GlslDialect,
    quad: Option<Quad>,
    offscreen_enabled: bool,
    offscreen: Option<OffscreenTarget>,
    present_size: (u32, u32),
}

impl GlowBackend {
    /// Wraps `gl`, which must stay current on this thread for the backend's
    /// whole lifetime.
    pub fn new(gl: glow::Context, dialect: GlslDialect) -> Self {
        Self {
            gl,
            dialect,
            quad: None,
            offscreen_enabled: false,
            offscreen: None,
            present_size: (0, 0),
        }
    }

    /// Renders into an offscreen framebuffer that is scaled onto the default
    /// framebuffer at [`GlowBackend::set_present_size`] after each frame.
    pub fn with_offscreen_target(mut self) -> Self {
        self.offscreen_enabled = true;
        self
    }

    pub fn set_present_size(&mut self, width: u32, height: u32) {
        self.present_size = (width, height);
    }

    pub fn dialect(&self) -> GlslDialect {
        self.dialect
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn drain_errors(&self) -> usize {
        let mut drained = 0;
        while drained < MAX_DRAINED_ERRORS {
            let code = unsafe { self.gl.get_error() };
            if code == glow::NO_ERROR {
                break;
            }
            drained += 1;
        }
        drained
    }

    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<glow::Shader, ShaderError> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let prepared = prepare_source(source, self.dialect);
        unsafe {
            let shader = self.gl.create_shader(kind).map_err(ShaderError::Create)?;
            self.gl.shader_source(shader, &prepared);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(ShaderError::Compile { stage, log });
            }
            Ok(shader)
        }
    }

    fn target_framebuffer(&self) -> Option<glow::Framebuffer> {
        self.offscreen.as_ref().map(|target| target.framebuffer)
    }

    fn resize_offscreen(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(target) = &self.offscreen {
            if target.width == width && target.height == height {
                return;
            }
        }

        unsafe {
            let (framebuffer, renderbuffer) = match &self.offscreen {
                Some(target) => (target.framebuffer, target.renderbuffer),
                None => {
                    let framebuffer = match self.gl.create_framebuffer() {
                        Ok(framebuffer) => framebuffer,
                        Err(err) => {
                            warn!(error = %err, "offscreen framebuffer unavailable; drawing to window");
                            return;
                        }
                    };
                    let renderbuffer = match self.gl.create_renderbuffer() {
                        Ok(renderbuffer) => renderbuffer,
                        Err(err) => {
                            self.gl.delete_framebuffer(framebuffer);
                            warn!(error = %err, "offscreen renderbuffer unavailable; drawing to window");
                            return;
                        }
                    };
                    (framebuffer, renderbuffer)
                }
            };

            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::RGBA8,
                width as i32,
                height as i32,
            );
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::RENDERBUFFER,
                Some(renderbuffer),
            );
            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);

            if status != glow::FRAMEBUFFER_COMPLETE {
                warn!(status, "offscreen framebuffer incomplete; drawing to window");
                self.gl.delete_framebuffer(framebuffer);
                self.gl.delete_renderbuffer(renderbuffer);
                self.offscreen = None;
                return;
            }

            debug!(width, height, "offscreen target resized");
            self.offscreen = Some(OffscreenTarget {
                framebuffer,
                renderbuffer,
                width,
                height,
            });
        }
    }
}

impl GraphicsBackend for GlowBackend {
    type Program = glow::Program;
    type Location = glow::UniformLocation;
    type Texture = glow::Texture;

    fn compile_program(&mut self, vertex: &str, fragment: &str) -> Result<glow::Program, ShaderError> {
        let vs = self.compile_stage(ShaderStage::Vertex, vertex)?;
        let fs = match self.compile_stage(ShaderStage::Fragment, fragment) {
            Ok(fs) => fs,
            Err(err) => {
                unsafe { self.gl.delete_shader(vs) };
                return Err(err);
            }
        };

        unsafe {
            let program = match self.gl.create_program() {
                Ok(program) => program,
                Err(err) => {
                    self.gl.delete_shader(vs);
                    self.gl.delete_shader(fs);
                    return Err(ShaderError::Create(err));
                }
            };
            self.gl.attach_shader(program, vs);
            self.gl.attach_shader(program, fs);
            self.gl.link_program(program);

            let linked = self.gl.get_program_link_status(program);
            let log = if linked {
                String::new()
            } else {
                self.gl.get_program_info_log(program)
            };

            self.gl.detach_shader(program, vs);
            self.gl.detach_shader(program, fs);
            self.gl.delete_shader(vs);
            self.gl.delete_shader(fs);

            if !linked {
                self.gl.delete_program(program);
                return Err(ShaderError::Link(log));
            }
            Ok(program)
        }
    }

    fn setup_quad(&mut self, program: &glow::Program) -> Result<(), BackendError> {
        unsafe {
            if let Some(previous) = self.quad.take() {
                self.gl.delete_vertex_array(previous.vertex_array);
                self.gl.delete_buffer(previous.buffer);
            }

            let vertex_array = self.gl.create_vertex_array().map_err(BackendError::Create)?;
            let buffer = match self.gl.create_buffer() {
                Ok(buffer) => buffer,
                Err(err) => {
                    self.gl.delete_vertex_array(vertex_array);
                    return Err(BackendError::Create(err));
                }
            };
            self.quad = Some(Quad {
                vertex_array,
                buffer,
            });

            self.gl.bind_vertex_array(Some(vertex_array));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&QUAD_VERTICES),
                glow::STATIC_DRAW,
            );

            let position = self
                .gl
                .get_attrib_location(*program, "a_position")
                .ok_or_else(|| {
                    BackendError::Geometry("vertex stage has no a_position attribute".to_string())
                })?;
            self.gl.enable_vertex_attrib_array(position);
            self.gl
                .vertex_attrib_pointer_f32(position, 2, glow::FLOAT, false, 0, 0);
        }
        Ok(())
    }

    fn use_program(&mut self, program: &glow::Program) {
        unsafe { self.gl.use_program(Some(*program)) };
    }

    fn uniform_location(&mut self, program: &glow::Program, name: &str) -> Option<glow::UniformLocation> {
        unsafe { self.gl.get_uniform_location(*program, name) }
    }

    fn uniform_1f(&mut self, location: &glow::UniformLocation, value: f32) {
        unsafe { self.gl.uniform_1_f32(Some(location), value) };
    }

    fn uniform_1i(&mut self, location: &glow::UniformLocation, value: i32) {
        unsafe { self.gl.uniform_1_i32(Some(location), value) };
    }

    fn uniform_floats(&mut self, location: &glow::UniformLocation, shape: UniformShape, data: &[f32]) {
        let location = Some(location);
        unsafe {
            match shape {
                UniformShape::Vec2 => self.gl.uniform_2_f32_slice(location, data),
                UniformShape::Vec3 => self.gl.uniform_3_f32_slice(location, data),
                UniformShape::Vec4 => self.gl.uniform_4_f32_slice(location, data),
                UniformShape::Mat3 => self.gl.uniform_matrix_3_f32_slice(location, false, data),
                UniformShape::Mat4 => self.gl.uniform_matrix_4_f32_slice(location, false, data),
            }
        }
    }

    fn create_texture(&mut self, unit: u32, image: &TextureImage) -> Result<glow::Texture, BackendError> {
        self.drain_errors();
        unsafe {
            let texture = self.gl.create_texture().map_err(BackendError::Create)?;
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::REPEAT as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                image.width() as i32,
                image.height() as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(image.as_raw()),
            );

            let code = self.gl.get_error();
            if code != glow::NO_ERROR {
                self.gl.bind_texture(glow::TEXTURE_2D, None);
                self.gl.delete_texture(texture);
                return Err(BackendError::Upload { code });
            }
            Ok(texture)
        }
    }

    fn delete_texture(&mut self, texture: glow::Texture) {
        unsafe { self.gl.delete_texture(texture) };
    }

    fn viewport(&mut self, width: u32, height: u32) {
        if self.offscreen_enabled {
            self.resize_offscreen(width, height);
        }
        unsafe { self.gl.viewport(0, 0, width as i32, height as i32) };
    }

    fn clear(&mut self) {
        let framebuffer = self.target_framebuffer();
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
            self.gl.clear_color(0.0, 0.0, 0.0, 0.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw_quad(&mut self) {
        let Some(quad) = &self.quad else {
            return;
        };
        unsafe {
            self.gl.bind_vertex_array(Some(quad.vertex_array));
            self.gl.draw_arrays(glow::TRIANGLES, 0, QUAD_VERTICES.len() as i32);
        }
    }

    fn finish_frame(&mut self) {
        let Some(target) = &self.offscreen else {
            return;
        };
        let (present_width, present_height) = self.present_size;
        unsafe {
            self.gl
                .bind_framebuffer(glow::READ_FRAMEBUFFER, Some(target.framebuffer));
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            self.gl.clear_color(0.0, 0.0, 0.0, 0.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
            self.gl.blit_framebuffer(
                0,
                0,
                target.width as i32,
                target.height as i32,
                0,
                0,
                present_width as i32,
                present_height as i32,
                glow::COLOR_BUFFER_BIT,
                glow::LINEAR,
            );
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }

    fn delete_program(&mut self, program: glow::Program) {
        unsafe { self.gl.delete_program(program) };
    }

    fn release(&mut self) {
        unsafe {
            if let Some(quad) = self.quad.take() {
                self.gl.delete_vertex_array(quad.vertex_array);
                self.gl.delete_buffer(quad.buffer);
            }
            if let Some(target) = self.offscreen.take() {
                self.gl.delete_framebuffer(target.framebuffer);
                self.gl.delete_renderbuffer(target.renderbuffer);
            }
            self.gl.bind_vertex_array(None);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            self.gl.use_program(None);
        }
        let drained = self.drain_errors();
        if drained > 0 {
            debug!(drained, "cleared pending GL errors on release");
        }
    }
}
