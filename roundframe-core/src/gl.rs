//! # Graphics API seam
//!
//! [`GlApi`] is the slice of OpenGL ES 2.0 the drawer touches. Two backends:
//! - [`GlowContext`]: real GL through `glow`
//! - [`crate::soft::SoftGl`]: CPU rasterizer for headless output and tests
//!
//! Methods take `&self` like `glow::Context`; none of them are synchronised.
//! Every call must happen on the thread that holds the current context.

use crate::error::{RenderError, Result, ShaderStage};
use crate::geometry::Viewport;
use glow::HasContext;
use std::fmt::Debug;
use std::sync::Arc;

/// `GL_TEXTURE_EXTERNAL_OES` from `OES_EGL_image_external`
pub const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

/// Where a texture gets attached on its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    ExternalOes,
}

impl TextureTarget {
    pub fn gl_enum(self) -> u32 {
        match self {
            TextureTarget::Texture2D => glow::TEXTURE_2D,
            TextureTarget::ExternalOes => TEXTURE_EXTERNAL_OES,
        }
    }
}

/// Layout of texel data handed to [`GlApi::upload_texture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelFormat {
    /// One byte per texel, sampled into `.r`
    Luminance8,
    /// Four bytes per texel
    Rgba8,
}

impl TexelFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TexelFormat::Luminance8 => 1,
            TexelFormat::Rgba8 => 4,
        }
    }
}

/// Operations the drawer issues against a graphics context
pub trait GlApi {
    type Program: Copy + Debug;
    type UniformLocation: Debug;
    type Buffer: Copy + Debug;
    type Texture: Copy + PartialEq + Debug;

    /// Compile both stages and link them into a program.
    fn compile_program(&self, vertex_src: &str, fragment_src: &str) -> Result<Self::Program>;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation>;
    fn attribute_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    /// Point a sampler uniform of the current program at a texture unit.
    fn set_sampler_unit(&self, location: &Self::UniformLocation, unit: u32);
    /// Upload a column-major matrix into a uniform of the current program.
    fn set_matrix4(&self, location: &Self::UniformLocation, matrix: &[f32; 16]);

    fn create_vertex_buffer(&self, data: &[f32]) -> Result<Self::Buffer>;
    fn delete_buffer(&self, buffer: Self::Buffer);
    /// Feed attribute `index` of `program` from `buffer`, `components` floats per vertex.
    fn bind_vertex_attribute(
        &self,
        program: Self::Program,
        index: u32,
        buffer: Self::Buffer,
        components: i32,
    );

    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: TextureTarget, texture: Option<Self::Texture>);
    fn upload_texture(
        &self,
        target: TextureTarget,
        format: TexelFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<Self::Texture>;
    fn delete_texture(&self, texture: Self::Texture);

    fn viewport(&self, viewport: Viewport);
    fn draw_triangle_strip(&self, vertex_count: i32);

    /// Fail if the context's error flag is raised, naming `op` in the error.
    fn check_error(&self, op: &str) -> Result<()>;
}

// ============================================================================
// glow backend
// ============================================================================

const DESKTOP_VERTEX_HEADER: &str = "#version 330 core
#define attribute in
#define varying out
";

const DESKTOP_FRAGMENT_HEADER: &str = "#version 330 core
#define varying in
#define texture2D texture
#define gl_FragColor frag_color
out vec4 frag_color;
";

/// Program handle plus the vertex array holding its attribute bindings.
///
/// ES 2.0 contexts have no vertex arrays, so `vao` is `None` there and
/// attribute state lives in the default context state.
#[derive(Debug, Clone, Copy)]
pub struct GlowProgram {
    pub program: glow::Program,
    pub vao: Option<glow::VertexArray>,
}

/// Vertex array for a new program. `None` means the context has no vertex
/// arrays (ES 2.0); on every other context a failed creation is an error.
fn required_vertex_array<T>(
    created: Option<std::result::Result<T, String>>,
) -> Result<Option<T>> {
    match created {
        None => Ok(None),
        Some(Ok(vao)) => Ok(Some(vao)),
        Some(Err(e)) => Err(RenderError::Resource(format!("create vertex array: {}", e))),
    }
}

pub struct GlowContext {
    gl: Arc<glow::Context>,
}

impl GlowContext {
    /// Wrap a shared `glow` context.
    ///
    /// # Safety
    ///
    /// `gl` must be current on the calling thread whenever any method of the
    /// returned value runs, and must outlive every GL object created through it.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Self {
        Self { gl }
    }

    pub fn inner(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    /// OpenGL ES 2.0: no vertex arrays, no single-channel `R8` textures.
    fn is_es2(&self) -> bool {
        let version = self.gl.version();
        version.is_embedded && version.major < 3
    }

    /// Desktop core profiles reject GLSL ES 1.00 text, so it is lifted to 3.30.
    fn source_header(&self, stage: ShaderStage) -> &'static str {
        if self.gl.version().is_embedded {
            return "";
        }
        match stage {
            ShaderStage::Vertex => DESKTOP_VERTEX_HEADER,
            ShaderStage::Fragment => DESKTOP_FRAGMENT_HEADER,
        }
    }

    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<glow::Shader> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = self.gl.create_shader(kind).map_err(RenderError::Resource)?;
            let source = format!("{}{}", self.source_header(stage), source);
            self.gl.shader_source(shader, &source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(RenderError::ShaderCompile { stage, log });
            }
            Ok(shader)
        }
    }
}

impl GlApi for GlowContext {
    type Program = GlowProgram;
    type UniformLocation = glow::UniformLocation;
    type Buffer = glow::Buffer;
    type Texture = glow::Texture;

    fn compile_program(&self, vertex_src: &str, fragment_src: &str) -> Result<GlowProgram> {
        let vertex = self.compile_stage(ShaderStage::Vertex, vertex_src)?;
        let fragment = match self.compile_stage(ShaderStage::Fragment, fragment_src) {
            Ok(shader) => shader,
            Err(e) => {
                unsafe { self.gl.delete_shader(vertex) };
                return Err(e);
            }
        };

        unsafe {
            let program = match self.gl.create_program() {
                Ok(program) => program,
                Err(e) => {
                    self.gl.delete_shader(vertex);
                    self.gl.delete_shader(fragment);
                    return Err(RenderError::Resource(e));
                }
            };
            self.gl.attach_shader(program, vertex);
            self.gl.attach_shader(program, fragment);
            self.gl.link_program(program);
            let linked = self.gl.get_program_link_status(program);

            // Shaders are reference counted by the program once linked.
            self.gl.detach_shader(program, vertex);
            self.gl.detach_shader(program, fragment);
            self.gl.delete_shader(vertex);
            self.gl.delete_shader(fragment);

            if !linked {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(RenderError::ProgramLink(log));
            }

            let created = (!self.is_es2()).then(|| self.gl.create_vertex_array());
            let vao = match required_vertex_array(created) {
                Ok(vao) => vao,
                Err(e) => {
                    self.gl.delete_program(program);
                    return Err(e);
                }
            };
            Ok(GlowProgram { program, vao })
        }
    }

    fn delete_program(&self, program: GlowProgram) {
        unsafe {
            if let Some(vao) = program.vao {
                self.gl.delete_vertex_array(vao);
            }
            self.gl.delete_program(program.program);
        }
    }

    fn use_program(&self, program: Option<GlowProgram>) {
        unsafe {
            self.gl.use_program(program.map(|p| p.program));
            if let Some(vao) = program.and_then(|p| p.vao) {
                self.gl.bind_vertex_array(Some(vao));
            }
        }
    }

    fn uniform_location(&self, program: GlowProgram, name: &str) -> Option<glow::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program.program, name) }
    }

    fn attribute_location(&self, program: GlowProgram, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program.program, name) }
    }

    fn set_sampler_unit(&self, location: &glow::UniformLocation, unit: u32) {
        unsafe { self.gl.uniform_1_i32(Some(location), unit as i32) }
    }

    fn set_matrix4(&self, location: &glow::UniformLocation, matrix: &[f32; 16]) {
        unsafe { self.gl.uniform_matrix_4_f32_slice(Some(location), false, matrix) }
    }

    fn create_vertex_buffer(&self, data: &[f32]) -> Result<glow::Buffer> {
        unsafe {
            let buffer = self.gl.create_buffer().map_err(RenderError::Resource)?;
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(data),
                glow::STATIC_DRAW,
            );
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
            Ok(buffer)
        }
    }

    fn delete_buffer(&self, buffer: glow::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn bind_vertex_attribute(
        &self,
        program: GlowProgram,
        index: u32,
        buffer: glow::Buffer,
        components: i32,
    ) {
        unsafe {
            if let Some(vao) = program.vao {
                self.gl.bind_vertex_array(Some(vao));
            }
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl.enable_vertex_attrib_array(index);
            self.gl.vertex_attrib_pointer_f32(index, components, glow::FLOAT, false, 0, 0);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<glow::Texture>) {
        unsafe { self.gl.bind_texture(target.gl_enum(), texture) }
    }

    fn upload_texture(
        &self,
        target: TextureTarget,
        format: TexelFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<glow::Texture> {
        if target == TextureTarget::ExternalOes {
            return Err(RenderError::Unsupported(
                "external OES textures are filled by their producer, not uploaded".into(),
            ));
        }
        let expected = width as usize * height as usize * format.bytes_per_texel();
        if data.len() < expected {
            return Err(RenderError::Resource(format!(
                "texture data too short: {} < {}",
                data.len(),
                expected
            )));
        }
        let (internal, pixel_format) = match format {
            TexelFormat::Luminance8 if self.is_es2() => (glow::LUMINANCE, glow::LUMINANCE),
            TexelFormat::Luminance8 => (glow::R8, glow::RED),
            TexelFormat::Rgba8 => (glow::RGBA8, glow::RGBA),
        };

        unsafe {
            let texture = self.gl.create_texture().map_err(RenderError::Resource)?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal as i32,
                width as i32,
                height as i32,
                0,
                pixel_format,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(&data[..expected])),
            );
            for (param, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            ] {
                self.gl.tex_parameter_i32(glow::TEXTURE_2D, param, value as i32);
            }
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(texture)
        }
    }

    fn delete_texture(&self, texture: glow::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn viewport(&self, viewport: Viewport) {
        unsafe { self.gl.viewport(viewport.x, viewport.y, viewport.width, viewport.height) }
    }

    fn draw_triangle_strip(&self, vertex_count: i32) {
        unsafe { self.gl.draw_arrays(glow::TRIANGLE_STRIP, 0, vertex_count) }
    }

    fn check_error(&self, op: &str) -> Result<()> {
        let code = unsafe { self.gl.get_error() };
        if code == glow::NO_ERROR {
            Ok(())
        } else {
            Err(RenderError::Gl { op: op.to_string(), code })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets() {
        assert_eq!(TextureTarget::Texture2D.gl_enum(), glow::TEXTURE_2D);
        assert_eq!(TextureTarget::ExternalOes.gl_enum(), 0x8D65);
        assert_ne!(TextureTarget::Texture2D.gl_enum(), TextureTarget::ExternalOes.gl_enum());
    }

    #[test]
    fn test_vertex_array_failure_is_reported() {
        assert!(matches!(required_vertex_array::<u32>(None), Ok(None)));
        assert!(matches!(required_vertex_array(Some(Ok(7u32))), Ok(Some(7))));

        let err = required_vertex_array::<u32>(Some(Err("out of memory".into()))).unwrap_err();
        assert!(matches!(err, RenderError::Resource(ref msg) if msg.contains("out of memory")));
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(TexelFormat::Luminance8.bytes_per_texel(), 1);
        assert_eq!(TexelFormat::Rgba8.bytes_per_texel(), 4);
    }
}
