//! # Frame Drawer
//!
//! Draws one video frame per call into the bound framebuffer, masked to the
//! circle inscribed in the viewport.
//!
//! Per call:
//! 1. resolve the variant's program (compiling on first use)
//! 2. make it current and upload the texture matrix
//! 3. bind the frame's textures to their units
//! 4. set the viewport, draw the 4-vertex strip
//! 5. bind the null texture on every unit touched in step 3
//!
//! OES textures are bound and unbound on every call. Their producer may
//! update the image from another context between draws, and a fresh bind is
//! what makes the driver pick up the new contents.

use crate::error::Result;
use crate::frame::FrameTextures;
use crate::geometry::{FrameSize, TexMatrix, Viewport, QUAD_VERTEX_COUNT};
use crate::gl::{GlApi, TextureTarget};
use crate::program_cache::ProgramCache;
use crate::shaders::ShaderVariant;

/// Draw entry points shared by every drawer a host may plug in
pub trait GlDrawer {
    type Texture;

    /// Draw an external (OES) texture.
    fn draw_oes(
        &mut self,
        texture: Self::Texture,
        tex_matrix: &TexMatrix,
        frame: FrameSize,
        viewport: Viewport,
    ) -> Result<()>;

    /// Draw an RGB(A) 2D texture.
    fn draw_rgb(
        &mut self,
        texture: Self::Texture,
        tex_matrix: &TexMatrix,
        frame: FrameSize,
        viewport: Viewport,
    ) -> Result<()>;

    /// Draw Y, U and V planes, in that order.
    fn draw_yuv(
        &mut self,
        textures: [Self::Texture; 3],
        tex_matrix: &TexMatrix,
        frame: FrameSize,
        viewport: Viewport,
    ) -> Result<()>;

    /// Free every GL object the drawer allocated. Must run on the context thread.
    fn release(&mut self);
}

/// Frames drawn per variant since creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawerStats {
    pub frames: [u64; ShaderVariant::COUNT],
}

/// Circular-mask drawer. Programs are compiled lazily and kept until [`GlDrawer::release`].
pub struct FrameDrawer<G: GlApi> {
    gl: G,
    cache: ProgramCache<G>,
    stats: DrawerStats,
}

impl<G: GlApi> FrameDrawer<G> {
    pub fn new(gl: G) -> Self {
        Self {
            gl,
            cache: ProgramCache::new(),
            stats: DrawerStats::default(),
        }
    }

    pub fn gl(&self) -> &G {
        &self.gl
    }

    pub fn cache(&self) -> &ProgramCache<G> {
        &self.cache
    }

    pub fn stats(&self) -> &DrawerStats {
        &self.stats
    }

    /// Dispatch on the kind of textures the frame carries.
    pub fn draw(
        &mut self,
        textures: &FrameTextures<G::Texture>,
        tex_matrix: &TexMatrix,
        frame: FrameSize,
        viewport: Viewport,
    ) -> Result<()> {
        match *textures {
            FrameTextures::Yuv(planes) => self.draw_yuv(planes, tex_matrix, frame, viewport),
            FrameTextures::Rgb(texture) => self.draw_rgb(texture, tex_matrix, frame, viewport),
            FrameTextures::Oes(texture) => self.draw_oes(texture, tex_matrix, frame, viewport),
        }
    }

    fn prepare_shader(&mut self, variant: ShaderVariant, tex_matrix: &TexMatrix) -> Result<()> {
        let compiled = self.cache.ensure_compiled(&self.gl, variant)?;
        self.gl.use_program(Some(compiled.program));
        self.gl.set_matrix4(&compiled.tex_matrix_location, tex_matrix);
        Ok(())
    }

    fn draw_rectangle(&mut self, variant: ShaderVariant, frame: FrameSize, viewport: Viewport) {
        tracing::trace!(?frame, ?viewport, "Drawing {} frame", variant);
        self.gl.viewport(viewport);
        self.gl.draw_triangle_strip(QUAD_VERTEX_COUNT);
        self.stats.frames[variant.index()] += 1;
    }
}

impl<G: GlApi> GlDrawer for FrameDrawer<G> {
    type Texture = G::Texture;

    fn draw_oes(
        &mut self,
        texture: G::Texture,
        tex_matrix: &TexMatrix,
        frame: FrameSize,
        viewport: Viewport,
    ) -> Result<()> {
        self.prepare_shader(ShaderVariant::Oes, tex_matrix)?;
        self.gl.active_texture(0);
        self.gl.bind_texture(TextureTarget::ExternalOes, Some(texture));
        self.draw_rectangle(ShaderVariant::Oes, frame, viewport);
        self.gl.bind_texture(TextureTarget::ExternalOes, None);
        Ok(())
    }

    fn draw_rgb(
        &mut self,
        texture: G::Texture,
        tex_matrix: &TexMatrix,
        frame: FrameSize,
        viewport: Viewport,
    ) -> Result<()> {
        self.prepare_shader(ShaderVariant::Rgb, tex_matrix)?;
        self.gl.active_texture(0);
        self.gl.bind_texture(TextureTarget::Texture2D, Some(texture));
        self.draw_rectangle(ShaderVariant::Rgb, frame, viewport);
        self.gl.bind_texture(TextureTarget::Texture2D, None);
        Ok(())
    }

    fn draw_yuv(
        &mut self,
        textures: [G::Texture; 3],
        tex_matrix: &TexMatrix,
        frame: FrameSize,
        viewport: Viewport,
    ) -> Result<()> {
        self.prepare_shader(ShaderVariant::Yuv, tex_matrix)?;
        for (unit, texture) in (0u32..).zip(textures) {
            self.gl.active_texture(unit);
            self.gl.bind_texture(TextureTarget::Texture2D, Some(texture));
        }
        self.draw_rectangle(ShaderVariant::Yuv, frame, viewport);
        for unit in 0..textures.len() as u32 {
            self.gl.active_texture(unit);
            self.gl.bind_texture(TextureTarget::Texture2D, None);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.cache.release(&self.gl);
    }
}

impl<G: GlApi> Drop for FrameDrawer<G> {
    fn drop(&mut self) {
        if !self.cache.is_released() {
            tracing::warn!(
                "FrameDrawer dropped without release(), leaking programs {:?} and quad geometry",
                self.cache.compiled_variants()
            );
        }
    }
}
