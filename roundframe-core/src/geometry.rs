//! Quad geometry, viewports and texture-coordinate transforms.

use crate::error::Result;
use crate::gl::GlApi;

// ============================================================================
// Quad
// ============================================================================

/// Vertex positions in normalized device coordinates, drawn as a triangle strip.
pub const FULL_RECTANGLE: [f32; 8] = [
    -1.0, -1.0, // bottom left
    1.0, -1.0, // bottom right
    -1.0, 1.0, // top left
    1.0, 1.0, // top right
];

/// Texture coordinates matching [`FULL_RECTANGLE`], (0, 0) is bottom left.
pub const FULL_RECTANGLE_TEX: [f32; 8] = [
    0.0, 0.0, // bottom left
    1.0, 0.0, // bottom right
    0.0, 1.0, // top left
    1.0, 1.0, // top right
];

/// Components per vertex in both quads
pub const QUAD_COMPONENTS: i32 = 2;
/// Vertices per quad
pub const QUAD_VERTEX_COUNT: i32 = 4;

/// GPU copies of the two quads, shared by every compiled program.
pub struct GeometryBuffers<G: GlApi> {
    pub position: G::Buffer,
    pub tex_coord: G::Buffer,
}

impl<G: GlApi> GeometryBuffers<G> {
    pub fn upload(gl: &G) -> Result<Self> {
        let position = gl.create_vertex_buffer(&FULL_RECTANGLE)?;
        let tex_coord = match gl.create_vertex_buffer(&FULL_RECTANGLE_TEX) {
            Ok(buffer) => buffer,
            Err(e) => {
                gl.delete_buffer(position);
                return Err(e);
            }
        };
        tracing::debug!("Uploaded quad geometry buffers");
        Ok(Self { position, tex_coord })
    }

    pub fn delete(self, gl: &G) {
        gl.delete_buffer(self.position);
        gl.delete_buffer(self.tex_coord);
    }
}

// ============================================================================
// Viewport / Frame Size
// ============================================================================

/// Target rectangle in surface pixels, origin bottom left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Largest square centred in a `width` x `height` surface.
    ///
    /// The circle drawn into it has radius `min(width, height) / 2`, the same
    /// circle a host view clips to.
    pub fn centered_square(width: i32, height: i32) -> Self {
        let side = width.min(height).max(0);
        Self {
            x: (width - side) / 2,
            y: (height - side) / 2,
            width: side,
            height: side,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Dimensions of the source frame.
///
/// Accepted by every draw entry point; the circular mask does not use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// ============================================================================
// Texture Matrix
// ============================================================================

/// 4x4 column-major transform applied to texture coordinates
pub type TexMatrix = [f32; 16];

pub const IDENTITY_MATRIX: TexMatrix = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, //
];

/// Flips texture coordinates vertically (`v -> 1 - v`).
pub fn vertical_flip() -> TexMatrix {
    let mut m = IDENTITY_MATRIX;
    m[5] = -1.0;
    m[13] = 1.0;
    m
}

/// Rotates texture coordinates by `angle` radians about (0.5, 0.5).
pub fn rotation_about_center(angle: f32) -> TexMatrix {
    let (sin, cos) = angle.sin_cos();
    let mut m = IDENTITY_MATRIX;
    m[0] = cos;
    m[1] = sin;
    m[4] = -sin;
    m[5] = cos;
    m[12] = 0.5 - 0.5 * cos + 0.5 * sin;
    m[13] = 0.5 - 0.5 * sin - 0.5 * cos;
    m
}

/// `a * b` for column-major matrices
pub fn multiply(a: &TexMatrix, b: &TexMatrix) -> TexMatrix {
    let mut out = [0.0; 16];
    for col in 0..4 {
        for row in 0..4 {
            out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
        }
    }
    out
}
