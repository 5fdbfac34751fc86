//! # Shader Program Cache
//!
//! One slot per [`ShaderVariant`]. A slot is filled the first time its
//! variant is drawn and stays filled until [`ProgramCache::release`], which
//! empties every slot at once. There is no per-variant eviction.
//!
//! ```text
//!   empty ──ensure_compiled──► compiled ──release──► empty
//!     ▲          │ (error)
//!     └──────────┘
//! ```

use crate::error::{RenderError, Result};
use crate::geometry::{GeometryBuffers, QUAD_COMPONENTS};
use crate::gl::GlApi;
use crate::shaders::{self, ShaderVariant};

/// A linked program and the uniform re-written on every draw
pub struct CompiledProgram<G: GlApi> {
    pub program: G::Program,
    pub tex_matrix_location: G::UniformLocation,
}

impl<G: GlApi> std::fmt::Debug for CompiledProgram<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("program", &self.program)
            .field("tex_matrix_location", &self.tex_matrix_location)
            .finish()
    }
}

pub struct ProgramCache<G: GlApi> {
    slots: [Option<CompiledProgram<G>>; ShaderVariant::COUNT],
    geometry: Option<GeometryBuffers<G>>,
}

impl<G: GlApi> Default for ProgramCache<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GlApi> ProgramCache<G> {
    pub fn new() -> Self {
        Self {
            slots: [None, None, None],
            geometry: None,
        }
    }

    pub fn get(&self, variant: ShaderVariant) -> Option<&CompiledProgram<G>> {
        self.slots[variant.index()].as_ref()
    }

    pub fn is_compiled(&self, variant: ShaderVariant) -> bool {
        self.slots[variant.index()].is_some()
    }

    /// Variants currently holding a program
    pub fn compiled_variants(&self) -> Vec<ShaderVariant> {
        ShaderVariant::ALL
            .into_iter()
            .filter(|v| self.is_compiled(*v))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// No program and no geometry left on the context.
    ///
    /// A failed first build leaves the cache empty but the quad buffers
    /// uploaded, so this is the check for leaks, not [`Self::is_empty`].
    pub fn is_released(&self) -> bool {
        self.is_empty() && self.geometry.is_none()
    }

    /// Return the program for `variant`, building it on first use.
    ///
    /// A build leaves the new program current. On failure nothing is cached
    /// and the partially built program is deleted.
    pub fn ensure_compiled(
        &mut self,
        gl: &G,
        variant: ShaderVariant,
    ) -> Result<&CompiledProgram<G>> {
        let slot = variant.index();
        if self.slots[slot].is_none() {
            if self.geometry.is_none() {
                self.geometry = Some(GeometryBuffers::upload(gl)?);
            }
            let Some(geometry) = self.geometry.as_ref() else {
                return Err(RenderError::Resource("quad geometry missing".into()));
            };
            let compiled = match build_program(gl, geometry, variant) {
                Ok(compiled) => compiled,
                Err(e) => {
                    tracing::warn!("Failed to build {} program: {}", variant, e);
                    return Err(e);
                }
            };
            tracing::debug!("Compiled {} program {:?}", variant, compiled.program);
            self.slots[slot] = Some(compiled);
        }
        self.slots[slot]
            .as_ref()
            .ok_or_else(|| RenderError::Resource(format!("{} program missing", variant)))
    }

    /// Delete every cached program and the shared geometry.
    ///
    /// Handles obtained earlier are dead afterwards. A second call with
    /// nothing compiled in between deletes nothing.
    pub fn release(&mut self, gl: &G) {
        let mut released = 0;
        for slot in self.slots.iter_mut() {
            if let Some(compiled) = slot.take() {
                gl.delete_program(compiled.program);
                released += 1;
            }
        }
        if let Some(geometry) = self.geometry.take() {
            geometry.delete(gl);
        }
        if released > 0 {
            tracing::info!("Released {} shader program(s)", released);
        }
    }
}

/// Compile, link and wire up one variant. Leaves the program current.
fn build_program<G: GlApi>(
    gl: &G,
    geometry: &GeometryBuffers<G>,
    variant: ShaderVariant,
) -> Result<CompiledProgram<G>> {
    let program = gl.compile_program(shaders::VERTEX_SHADER, variant.fragment_source())?;
    match wire_program(gl, geometry, variant, program) {
        Ok(tex_matrix_location) => Ok(CompiledProgram { program, tex_matrix_location }),
        Err(e) => {
            gl.use_program(None);
            gl.delete_program(program);
            Err(e)
        }
    }
}

fn wire_program<G: GlApi>(
    gl: &G,
    geometry: &GeometryBuffers<G>,
    variant: ShaderVariant,
    program: G::Program,
) -> Result<G::UniformLocation> {
    gl.use_program(Some(program));

    let tex_matrix_location = gl
        .uniform_location(program, shaders::TEX_MATRIX_UNIFORM)
        .ok_or_else(|| RenderError::UniformNotFound(shaders::TEX_MATRIX_UNIFORM.into()))?;

    for (name, unit) in variant.sampler_units() {
        let location = gl
            .uniform_location(program, name)
            .ok_or_else(|| RenderError::UniformNotFound((*name).into()))?;
        gl.set_sampler_unit(&location, *unit);
    }
    gl.check_error("initialize fragment shader uniform values")?;

    for (name, buffer) in [
        (shaders::POSITION_ATTRIBUTE, geometry.position),
        (shaders::TEX_COORD_ATTRIBUTE, geometry.tex_coord),
    ] {
        let index = gl
            .attribute_location(program, name)
            .ok_or_else(|| RenderError::AttributeNotFound(name.into()))?;
        gl.bind_vertex_attribute(program, index, buffer, QUAD_COMPONENTS);
    }

    Ok(tex_matrix_location)
}
