//! # Software GL
//!
//! A CPU implementation of [`GlApi`] that understands exactly the programs in
//! [`crate::shaders`]. It rasterizes the triangle strip over the viewport and
//! runs the matching fragment program from [`crate::mask`] for every covered
//! pixel centre.
//!
//! Besides headless rendering it exposes the state a real driver hides:
//! compile and delete counters, per-unit texture bindings, the bind log and
//! uniform values. Error behaviour follows GL: misuse raises a sticky error
//! flag that [`GlApi::check_error`] reports and clears.

use crate::error::{RenderError, Result, ShaderStage};
use crate::geometry::{TexMatrix, Viewport, IDENTITY_MATRIX};
use crate::gl::{GlApi, TexelFormat, TextureTarget};
use crate::mask;
use crate::shaders::{self, ShaderVariant};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

pub const GL_INVALID_ENUM: u32 = 0x0500;
pub const GL_INVALID_VALUE: u32 = 0x0501;
pub const GL_INVALID_OPERATION: u32 = 0x0502;

/// Texture units available to shaders
pub const MAX_TEXTURE_UNITS: u32 = 8;

/// Colour returned when sampling a unit with nothing usable bound
const INCOMPLETE_TEXTURE: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoftProgram(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoftBuffer(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoftTexture(u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftUniform {
    program: SoftProgram,
    name: String,
}

/// One `bind_texture` call as seen by the context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindEvent {
    pub unit: u32,
    pub target: TextureTarget,
    pub texture: Option<SoftTexture>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftStats {
    /// Successful `compile_program` calls, per variant index
    pub compiles: [usize; ShaderVariant::COUNT],
    pub programs_deleted: usize,
    pub buffers_created: usize,
    pub buffers_deleted: usize,
    pub draws: usize,
}

impl SoftStats {
    pub fn total_compiles(&self) -> usize {
        self.compiles.iter().sum()
    }
}

struct ProgramState {
    variant: ShaderVariant,
    tex_matrix: TexMatrix,
    samplers: HashMap<&'static str, u32>,
    attributes: [Option<SoftBuffer>; 2],
}

struct TextureState {
    target: TextureTarget,
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl TextureState {
    /// Nearest-neighbour sample, clamp to edge. Row 0 is `t = 0`.
    fn sample(&self, tc: [f32; 2]) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return INCOMPLETE_TEXTURE;
        }
        let x = ((tc[0] * self.width as f32).floor() as i64).clamp(0, self.width as i64 - 1);
        let y = ((tc[1] * self.height as f32).floor() as i64).clamp(0, self.height as i64 - 1);
        self.texels[y as usize * self.width as usize + x as usize]
    }
}

struct State {
    next_id: u32,
    programs: HashMap<u32, ProgramState>,
    buffers: HashMap<u32, Vec<f32>>,
    textures: HashMap<u32, TextureState>,
    current_program: Option<SoftProgram>,
    active_unit: u32,
    bindings: HashMap<(u32, TextureTarget), SoftTexture>,
    viewport: Viewport,
    width: u32,
    height: u32,
    framebuffer: Vec<[f32; 4]>,
    error: Option<u32>,
    stats: SoftStats,
    bind_log: Vec<BindEvent>,
    fail_next_compile: Option<String>,
    hidden_names: HashSet<String>,
}

impl State {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// GL keeps the first error until it is read.
    fn raise(&mut self, code: u32) {
        if self.error.is_none() {
            self.error = Some(code);
        }
    }

    fn sample_unit(&self, unit: u32, target: TextureTarget, tc: [f32; 2]) -> [f32; 4] {
        self.bindings
            .get(&(unit, target))
            .and_then(|tex| self.textures.get(&tex.0))
            .map(|tex| tex.sample(tc))
            .unwrap_or(INCOMPLETE_TEXTURE)
    }

    fn shade(&self, program: &ProgramState, tc: [f32; 2]) -> [f32; 4] {
        let variant = program.variant;
        let units = variant.sampler_units();
        let unit_of = |plane: usize| {
            let name = units[plane].0;
            program.samplers.get(name).copied().unwrap_or(0)
        };
        match variant {
            ShaderVariant::Yuv => mask::shade_yuv(tc, |plane, tc| {
                self.sample_unit(unit_of(plane), TextureTarget::Texture2D, tc)[0]
            }),
            ShaderVariant::Rgb | ShaderVariant::Oes => mask::shade_direct(variant, tc, |tc| {
                self.sample_unit(unit_of(0), variant.texture_target(), tc)
            }),
        }
    }

    fn rasterize(&mut self, vertex_count: i32) {
        let Some(current) = self.current_program else {
            self.raise(GL_INVALID_OPERATION);
            return;
        };
        let Some(program) = self.programs.get(&current.0) else {
            self.raise(GL_INVALID_OPERATION);
            return;
        };
        let (Some(pos), Some(tc)) = (program.attributes[0], program.attributes[1]) else {
            self.raise(GL_INVALID_OPERATION);
            return;
        };
        let (Some(positions), Some(tex_coords)) =
            (self.buffers.get(&pos.0), self.buffers.get(&tc.0))
        else {
            self.raise(GL_INVALID_OPERATION);
            return;
        };
        let count = vertex_count.max(0) as usize;
        if positions.len() < count * 2 || tex_coords.len() < count * 2 {
            self.raise(GL_INVALID_OPERATION);
            return;
        }

        fn vertex(data: &[f32], i: usize) -> [f32; 2] {
            [data[i * 2], data[i * 2 + 1]]
        }
        let triangles: Vec<[usize; 3]> = (2..count).map(|i| [i - 2, i - 1, i]).collect();

        let vp = self.viewport;
        let x0 = vp.x.max(0);
        let y0 = vp.y.max(0);
        let x1 = vp.x.saturating_add(vp.width).min(self.width as i32);
        let y1 = vp.y.saturating_add(vp.height).min(self.height as i32);
        let mut writes = Vec::new();

        for py in y0..y1 {
            for px in x0..x1 {
                let ndc = [
                    (px as f32 + 0.5 - vp.x as f32) / vp.width as f32 * 2.0 - 1.0,
                    (py as f32 + 0.5 - vp.y as f32) / vp.height as f32 * 2.0 - 1.0,
                ];
                for &tri in &triangles {
                    let corners = tri.map(|i| vertex(positions, i));
                    let Some(weights) = barycentric(corners, ndc) else {
                        continue;
                    };
                    let uv = tri.map(|i| vertex(tex_coords, i));
                    let interp = [
                        weights[0] * uv[0][0] + weights[1] * uv[1][0] + weights[2] * uv[2][0],
                        weights[0] * uv[0][1] + weights[1] * uv[1][1] + weights[2] * uv[2][1],
                    ];
                    let interp_tc = mask::transform_tex_coord(&program.tex_matrix, interp);
                    let color = self.shade(program, interp_tc);
                    writes.push((py as usize * self.width as usize + px as usize, color));
                    break;
                }
            }
        }

        for (index, color) in writes {
            self.framebuffer[index] = color;
        }
        self.stats.draws += 1;
    }
}

/// Barycentric weights of `p`, or `None` when it lies outside the triangle.
fn barycentric(v: [[f32; 2]; 3], p: [f32; 2]) -> Option<[f32; 3]> {
    let edge = |a: [f32; 2], b: [f32; 2], c: [f32; 2]| {
        (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
    };
    let area = edge(v[0], v[1], v[2]);
    if area == 0.0 {
        return None;
    }
    let w0 = edge(v[1], v[2], p) / area;
    let w1 = edge(v[2], v[0], p) / area;
    let w2 = edge(v[0], v[1], p) / area;
    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
        return None;
    }
    Some([w0, w1, w2])
}

/// Headless context with an RGBA float framebuffer, origin bottom left
pub struct SoftGl {
    state: Mutex<State>,
}

impl SoftGl {
    /// Framebuffer of `width` x `height`, cleared to transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 0,
                programs: HashMap::new(),
                buffers: HashMap::new(),
                textures: HashMap::new(),
                current_program: None,
                active_unit: 0,
                bindings: HashMap::new(),
                viewport: Viewport::new(0, 0, width as i32, height as i32),
                width,
                height,
                framebuffer: vec![mask::TRANSPARENT; width as usize * height as usize],
                error: None,
                stats: SoftStats::default(),
                bind_log: Vec::new(),
                fail_next_compile: None,
                hidden_names: HashSet::new(),
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.state.lock().width
    }

    pub fn height(&self) -> u32 {
        self.state.lock().height
    }

    pub fn clear(&self, color: [f32; 4]) {
        self.state.lock().framebuffer.fill(color);
    }

    /// Pixel at (`x`, `y`) counted from the bottom-left corner.
    pub fn read_pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let state = self.state.lock();
        state.framebuffer[y as usize * state.width as usize + x as usize]
    }

    /// Framebuffer as 8-bit RGBA rows, top row first, clamped to [0, 1].
    pub fn to_rgba8(&self) -> Vec<u8> {
        let state = self.state.lock();
        let width = state.width as usize;
        let mut out = Vec::with_capacity(state.framebuffer.len() * 4);
        for row in state.framebuffer.chunks(width.max(1)).rev() {
            for px in row {
                out.extend(px.iter().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
            }
        }
        out
    }

    // ------------------------------------------------------------------------
    // Probes
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> SoftStats {
        self.state.lock().stats.clone()
    }

    pub fn live_programs(&self) -> usize {
        self.state.lock().programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn current_program(&self) -> Option<SoftProgram> {
        self.state.lock().current_program
    }

    pub fn active_unit(&self) -> u32 {
        self.state.lock().active_unit
    }

    pub fn bound_texture(&self, unit: u32, target: TextureTarget) -> Option<SoftTexture> {
        self.state.lock().bindings.get(&(unit, target)).copied()
    }

    /// True when no unit has a texture bound on any target.
    pub fn all_units_unbound(&self) -> bool {
        self.state.lock().bindings.is_empty()
    }

    pub fn take_bind_log(&self) -> Vec<BindEvent> {
        std::mem::take(&mut self.state.lock().bind_log)
    }

    pub fn last_viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    pub fn tex_matrix(&self, program: SoftProgram) -> Option<TexMatrix> {
        self.state.lock().programs.get(&program.0).map(|p| p.tex_matrix)
    }

    pub fn sampler_unit(&self, program: SoftProgram, name: &str) -> Option<u32> {
        self.state
            .lock()
            .programs
            .get(&program.0)
            .and_then(|p| p.samplers.get(name).copied())
    }

    pub fn program_variant(&self, program: SoftProgram) -> Option<ShaderVariant> {
        self.state.lock().programs.get(&program.0).map(|p| p.variant)
    }

    // ------------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------------

    /// Make the next `compile_program` fail with `log`.
    pub fn fail_next_compile(&self, log: &str) {
        self.state.lock().fail_next_compile = Some(log.to_string());
    }

    /// Raise the error flag as a driver would after a failed call.
    pub fn raise_error(&self, code: u32) {
        self.state.lock().raise(code);
    }

    /// Report `name` as absent from every program (uniform or attribute).
    pub fn hide_location(&self, name: &str) {
        self.state.lock().hidden_names.insert(name.to_string());
    }
}

impl GlApi for SoftGl {
    type Program = SoftProgram;
    type UniformLocation = SoftUniform;
    type Buffer = SoftBuffer;
    type Texture = SoftTexture;

    fn compile_program(&self, vertex_src: &str, fragment_src: &str) -> Result<SoftProgram> {
        let mut state = self.state.lock();
        if let Some(log) = state.fail_next_compile.take() {
            return Err(RenderError::ShaderCompile { stage: ShaderStage::Fragment, log });
        }
        if vertex_src != shaders::VERTEX_SHADER {
            return Err(RenderError::ShaderCompile {
                stage: ShaderStage::Vertex,
                log: "unrecognized vertex shader".into(),
            });
        }
        let variant = ShaderVariant::from_fragment_source(fragment_src).ok_or_else(|| {
            RenderError::ShaderCompile {
                stage: ShaderStage::Fragment,
                log: "unrecognized fragment shader".into(),
            }
        })?;

        let id = state.next_id();
        state.programs.insert(
            id,
            ProgramState {
                variant,
                tex_matrix: IDENTITY_MATRIX,
                samplers: variant.sampler_units().iter().map(|(name, _)| (*name, 0)).collect(),
                attributes: [None, None],
            },
        );
        state.stats.compiles[variant.index()] += 1;
        Ok(SoftProgram(id))
    }

    fn delete_program(&self, program: SoftProgram) {
        let mut state = self.state.lock();
        if state.programs.remove(&program.0).is_none() {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        if state.current_program == Some(program) {
            state.current_program = None;
        }
        state.stats.programs_deleted += 1;
    }

    fn use_program(&self, program: Option<SoftProgram>) {
        let mut state = self.state.lock();
        match program {
            Some(p) if !state.programs.contains_key(&p.0) => state.raise(GL_INVALID_VALUE),
            _ => state.current_program = program,
        }
    }

    fn uniform_location(&self, program: SoftProgram, name: &str) -> Option<SoftUniform> {
        let state = self.state.lock();
        if state.hidden_names.contains(name) {
            return None;
        }
        let known = state.programs.get(&program.0).map_or(false, |p| {
            name == shaders::TEX_MATRIX_UNIFORM || p.samplers.contains_key(name)
        });
        known.then(|| SoftUniform { program, name: name.to_string() })
    }

    fn attribute_location(&self, program: SoftProgram, name: &str) -> Option<u32> {
        let state = self.state.lock();
        if state.hidden_names.contains(name) || !state.programs.contains_key(&program.0) {
            return None;
        }
        match name {
            shaders::POSITION_ATTRIBUTE => Some(0),
            shaders::TEX_COORD_ATTRIBUTE => Some(1),
            _ => None,
        }
    }

    fn set_sampler_unit(&self, location: &SoftUniform, unit: u32) {
        let mut state = self.state.lock();
        if state.current_program != Some(location.program) {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        let updated = match state
            .programs
            .get_mut(&location.program.0)
            .and_then(|p| p.samplers.get_mut(location.name.as_str()))
        {
            Some(slot) => {
                *slot = unit;
                true
            }
            None => false,
        };
        if !updated {
            state.raise(GL_INVALID_OPERATION);
        }
    }

    fn set_matrix4(&self, location: &SoftUniform, matrix: &[f32; 16]) {
        let mut state = self.state.lock();
        if state.current_program != Some(location.program)
            || location.name != shaders::TEX_MATRIX_UNIFORM
        {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        if let Some(p) = state.programs.get_mut(&location.program.0) {
            p.tex_matrix = *matrix;
        }
    }

    fn create_vertex_buffer(&self, data: &[f32]) -> Result<SoftBuffer> {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.buffers.insert(id, data.to_vec());
        state.stats.buffers_created += 1;
        Ok(SoftBuffer(id))
    }

    fn delete_buffer(&self, buffer: SoftBuffer) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer.0).is_some() {
            state.stats.buffers_deleted += 1;
        } else {
            state.raise(GL_INVALID_VALUE);
        }
    }

    fn bind_vertex_attribute(
        &self,
        program: SoftProgram,
        index: u32,
        buffer: SoftBuffer,
        components: i32,
    ) {
        let mut state = self.state.lock();
        if components != 2 || index > 1 || !state.buffers.contains_key(&buffer.0) {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        let bound = state
            .programs
            .get_mut(&program.0)
            .map(|p| p.attributes[index as usize] = Some(buffer))
            .is_some();
        if !bound {
            state.raise(GL_INVALID_OPERATION);
        }
    }

    fn active_texture(&self, unit: u32) {
        let mut state = self.state.lock();
        if unit >= MAX_TEXTURE_UNITS {
            state.raise(GL_INVALID_ENUM);
            return;
        }
        state.active_unit = unit;
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<SoftTexture>) {
        let mut state = self.state.lock();
        let unit = state.active_unit;
        if let Some(tex) = texture {
            let matches_target = state.textures.get(&tex.0).map_or(false, |t| t.target == target);
            if !matches_target {
                state.raise(GL_INVALID_OPERATION);
                return;
            }
            state.bindings.insert((unit, target), tex);
        } else {
            state.bindings.remove(&(unit, target));
        }
        state.bind_log.push(BindEvent { unit, target, texture });
    }

    /// External targets are accepted here and stand in for a producer filling the image.
    fn upload_texture(
        &self,
        target: TextureTarget,
        format: TexelFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<SoftTexture> {
        let texel_count = width as usize * height as usize;
        let bpt = format.bytes_per_texel();
        if data.len() < texel_count * bpt {
            return Err(RenderError::Resource(format!(
                "texture data too short: {} < {}",
                data.len(),
                texel_count * bpt
            )));
        }
        let norm = |b: u8| b as f32 / 255.0;
        let texels = data[..texel_count * bpt]
            .chunks_exact(bpt)
            .map(|c| match format {
                TexelFormat::Luminance8 => [norm(c[0]), norm(c[0]), norm(c[0]), 1.0],
                TexelFormat::Rgba8 => [norm(c[0]), norm(c[1]), norm(c[2]), norm(c[3])],
            })
            .collect();

        let mut state = self.state.lock();
        let id = state.next_id();
        state.textures.insert(id, TextureState { target, width, height, texels });
        Ok(SoftTexture(id))
    }

    fn delete_texture(&self, texture: SoftTexture) {
        let mut state = self.state.lock();
        if state.textures.remove(&texture.0).is_none() {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        state.bindings.retain(|_, bound| *bound != texture);
    }

    fn viewport(&self, viewport: Viewport) {
        let mut state = self.state.lock();
        if viewport.width < 0 || viewport.height < 0 {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        state.viewport = viewport;
    }

    fn draw_triangle_strip(&self, vertex_count: i32) {
        self.state.lock().rasterize(vertex_count);
    }

    fn check_error(&self, op: &str) -> Result<()> {
        match self.state.lock().error.take() {
            None => Ok(()),
            Some(code) => Err(RenderError::Gl { op: op.to_string(), code }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_shaders() {
        let gl = SoftGl::new(4, 4);
        let err = gl.compile_program("void main() {}", shaders::RGB_FRAGMENT_SHADER).unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile { stage: ShaderStage::Vertex, .. }));

        let err = gl.compile_program(shaders::VERTEX_SHADER, "void main() {}").unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile { stage: ShaderStage::Fragment, .. }));
        assert_eq!(gl.live_programs(), 0);
    }

    #[test]
    fn test_error_flag_is_sticky_until_read() {
        let gl = SoftGl::new(4, 4);
        gl.active_texture(MAX_TEXTURE_UNITS);
        gl.raise_error(GL_INVALID_VALUE);

        let err = gl.check_error("active_texture").unwrap_err();
        assert!(matches!(err, RenderError::Gl { code: GL_INVALID_ENUM, .. }));
        assert!(gl.check_error("active_texture").is_ok());
    }

    #[test]
    fn test_uniform_writes_need_current_program() {
        let gl = SoftGl::new(4, 4);
        let program = gl
            .compile_program(shaders::VERTEX_SHADER, shaders::RGB_FRAGMENT_SHADER)
            .unwrap();
        let loc = gl.uniform_location(program, "rgb_tex").unwrap();

        gl.set_sampler_unit(&loc, 3);
        assert!(gl.check_error("no program").is_err());

        gl.use_program(Some(program));
        gl.set_sampler_unit(&loc, 3);
        assert!(gl.check_error("with program").is_ok());
        assert_eq!(gl.sampler_unit(program, "rgb_tex"), Some(3));
        assert!(gl.uniform_location(program, "y_tex").is_none());
    }

    #[test]
    fn test_texture_target_is_fixed() {
        let gl = SoftGl::new(4, 4);
        let tex = gl
            .upload_texture(TextureTarget::ExternalOes, TexelFormat::Rgba8, 1, 1, &[1, 2, 3, 4])
            .unwrap();
        gl.bind_texture(TextureTarget::Texture2D, Some(tex));
        assert!(gl.check_error("wrong target").is_err());
        assert_eq!(gl.bound_texture(0, TextureTarget::Texture2D), None);

        gl.bind_texture(TextureTarget::ExternalOes, Some(tex));
        assert_eq!(gl.bound_texture(0, TextureTarget::ExternalOes), Some(tex));
    }

    #[test]
    fn test_nearest_sampling_clamps() {
        let gl = SoftGl::new(4, 4);
        let texels = [0u8, 64, 128, 255];
        let tex = gl
            .upload_texture(TextureTarget::Texture2D, TexelFormat::Luminance8, 2, 2, &texels)
            .unwrap();
        let state = gl.state.lock();
        let t = &state.textures[&tex.0];
        assert_eq!(t.sample([0.0, 0.0])[0], 0.0);
        assert_eq!(t.sample([0.9, 0.1])[0], 64.0 / 255.0);
        assert_eq!(t.sample([-3.0, 2.0])[0], 128.0 / 255.0);
        assert_eq!(t.sample([1.0, 1.0])[0], 1.0);
    }

    #[test]
    fn test_rgba8_readback_is_top_down() {
        let gl = SoftGl::new(1, 2);
        {
            let mut state = gl.state.lock();
            state.framebuffer[0] = [1.0, 0.0, 0.0, 1.0];
            state.framebuffer[1] = [0.0, 0.0, 1.0, 1.0];
        }
        assert_eq!(gl.to_rgba8(), vec![0, 0, 255, 255, 255, 0, 0, 255]);
    }

    #[test]
    fn test_barycentric() {
        let tri = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0]];
        assert!(barycentric(tri, [-0.5, -0.5]).is_some());
        assert!(barycentric(tri, [0.5, 0.5]).is_none());
        // Second strip triangle winds the other way.
        let tri = [[1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
        let w = barycentric(tri, [0.5, 0.5]).unwrap();
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }
}
