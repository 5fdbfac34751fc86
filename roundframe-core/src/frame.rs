// FRAME - CPU-side frames and their GPU textures
//
// Hosts normally hand the drawer textures a decoder already filled. This
// module covers the other case: a frame that lives in memory (test pattern,
// still image) and has to be uploaded first.
//
// Planes are stored bottom row first, matching GL's texture origin.

use crate::error::{RenderError, Result};
use crate::geometry::FrameSize;
use crate::gl::{GlApi, TexelFormat, TextureTarget};
use crate::shaders::ShaderVariant;
use serde::{Deserialize, Serialize};

// ============================================================================
// Textures
// ============================================================================

/// Textures of one frame, shaped by the shader variant that reads them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTextures<T> {
    /// Y, U, V planes
    Yuv([T; 3]),
    Rgb(T),
    Oes(T),
}

impl<T: Copy> FrameTextures<T> {
    pub fn variant(&self) -> ShaderVariant {
        match self {
            FrameTextures::Yuv(_) => ShaderVariant::Yuv,
            FrameTextures::Rgb(_) => ShaderVariant::Rgb,
            FrameTextures::Oes(_) => ShaderVariant::Oes,
        }
    }

    pub fn handles(&self) -> Vec<T> {
        match self {
            FrameTextures::Yuv(planes) => planes.to_vec(),
            FrameTextures::Rgb(t) | FrameTextures::Oes(t) => vec![*t],
        }
    }

    pub fn delete<G: GlApi<Texture = T>>(self, gl: &G) {
        for texture in self.handles() {
            gl.delete_texture(texture);
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Planar 4:2:0, chroma planes are `ceil(w/2) x ceil(h/2)`
#[derive(Debug, Clone)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl I420Frame {
    pub fn chroma_size(&self) -> (u32, u32) {
        (self.width.div_ceil(2), self.height.div_ceil(2))
    }
}

/// Packed 8-bit RGBA
#[derive(Debug, Clone)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum VideoFrame {
    I420(I420Frame),
    Rgba(RgbaFrame),
}

/// Synthetic picture used when no decoder feeds the drawer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestPattern {
    /// Eight vertical colour bars
    #[default]
    Bars,
    /// Red across, green up
    Gradient,
}

/// White, yellow, cyan, green, magenta, red, blue, black
const BARS: [[f32; 3]; 8] = [
    [1.0, 1.0, 1.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 0.0, 1.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, 0.0],
];

impl TestPattern {
    /// Colour at pixel (`x`, `y`), counted from the bottom left.
    pub fn rgb_at(self, x: u32, y: u32, width: u32, height: u32) -> [f32; 3] {
        match self {
            TestPattern::Bars => {
                let bar = (x as usize * BARS.len()) / width.max(1) as usize;
                BARS[bar.min(BARS.len() - 1)]
            }
            TestPattern::Gradient => [
                x as f32 / (width.max(2) - 1) as f32,
                y as f32 / (height.max(2) - 1) as f32,
                0.5,
            ],
        }
    }
}

impl std::str::FromStr for TestPattern {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bars" => Ok(TestPattern::Bars),
            "gradient" => Ok(TestPattern::Gradient),
            other => Err(format!("unknown test pattern: {}", other)),
        }
    }
}

/// Full-range BT.601 forward transform, the inverse of the YUV program's constants.
pub fn rgb_to_yuv(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = (b - y) / 1.772 + 0.5;
    let v = (r - y) / 1.402 + 0.5;
    [y, u, v]
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl VideoFrame {
    /// Generate `pattern` in the layout `variant` reads: I420 for YUV, RGBA otherwise.
    pub fn test_pattern(
        pattern: TestPattern,
        variant: ShaderVariant,
        width: u32,
        height: u32,
    ) -> Self {
        match variant {
            ShaderVariant::Yuv => VideoFrame::I420(Self::i420_pattern(pattern, width, height)),
            ShaderVariant::Rgb | ShaderVariant::Oes => {
                let mut data = Vec::with_capacity(width as usize * height as usize * 4);
                for y in 0..height {
                    for x in 0..width {
                        let [r, g, b] = pattern.rgb_at(x, y, width, height);
                        data.extend([to_byte(r), to_byte(g), to_byte(b), 255]);
                    }
                }
                VideoFrame::Rgba(RgbaFrame { width, height, data })
            }
        }
    }

    fn i420_pattern(pattern: TestPattern, width: u32, height: u32) -> I420Frame {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        let mut y_plane = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                y_plane.push(to_byte(rgb_to_yuv(pattern.rgb_at(x, y, width, height))[0]));
            }
        }

        // Chroma averages each 2x2 block, clipped at odd edges.
        let mut u_plane = Vec::with_capacity(cw as usize * ch as usize);
        let mut v_plane = Vec::with_capacity(cw as usize * ch as usize);
        for cy in 0..ch {
            for cx in 0..cw {
                let (mut u, mut v, mut n) = (0.0, 0.0, 0.0);
                for y in (cy * 2)..(cy * 2 + 2).min(height) {
                    for x in (cx * 2)..(cx * 2 + 2).min(width) {
                        let [_, pu, pv] = rgb_to_yuv(pattern.rgb_at(x, y, width, height));
                        u += pu;
                        v += pv;
                        n += 1.0;
                    }
                }
                u_plane.push(to_byte(u / n));
                v_plane.push(to_byte(v / n));
            }
        }

        I420Frame { width, height, y: y_plane, u: u_plane, v: v_plane }
    }

    pub fn size(&self) -> FrameSize {
        match self {
            VideoFrame::I420(f) => FrameSize::new(f.width, f.height),
            VideoFrame::Rgba(f) => FrameSize::new(f.width, f.height),
        }
    }

    /// Upload into textures for `variant`.
    ///
    /// I420 frames feed the YUV program; RGBA frames feed RGB, or OES on
    /// backends that accept writes into external images.
    pub fn upload<G: GlApi>(
        &self,
        gl: &G,
        variant: ShaderVariant,
    ) -> Result<FrameTextures<G::Texture>> {
        match (self, variant) {
            (VideoFrame::I420(f), ShaderVariant::Yuv) => {
                let plane = |width, height, data: &[u8]| {
                    let format = TexelFormat::Luminance8;
                    gl.upload_texture(TextureTarget::Texture2D, format, width, height, data)
                };
                let (cw, ch) = f.chroma_size();
                let y = plane(f.width, f.height, &f.y)?;
                let u = match plane(cw, ch, &f.u) {
                    Ok(t) => t,
                    Err(e) => {
                        gl.delete_texture(y);
                        return Err(e);
                    }
                };
                let v = match plane(cw, ch, &f.v) {
                    Ok(t) => t,
                    Err(e) => {
                        gl.delete_texture(y);
                        gl.delete_texture(u);
                        return Err(e);
                    }
                };
                tracing::debug!("Uploaded I420 frame {}x{}", f.width, f.height);
                Ok(FrameTextures::Yuv([y, u, v]))
            }
            (VideoFrame::Rgba(f), ShaderVariant::Rgb | ShaderVariant::Oes) => {
                let target = variant.texture_target();
                let texture =
                    gl.upload_texture(target, TexelFormat::Rgba8, f.width, f.height, &f.data)?;
                tracing::debug!("Uploaded RGBA frame {}x{} as {}", f.width, f.height, variant);
                Ok(match variant {
                    ShaderVariant::Oes => FrameTextures::Oes(texture),
                    _ => FrameTextures::Rgb(texture),
                })
            }
            (VideoFrame::I420(_), other) => Err(RenderError::Unsupported(format!(
                "I420 frame cannot feed the {} program",
                other
            ))),
            (VideoFrame::Rgba(_), other) => Err(RenderError::Unsupported(format!(
                "RGBA frame cannot feed the {} program",
                other
            ))),
        }
    }
}
