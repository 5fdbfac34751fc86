//! GLSL sources and the closed set of shader variants.
//!
//! One vertex shader is shared by every variant. Each fragment shader masks
//! the quad to a circle centred on the texture; only the YUV shader corrects
//! the x axis for a 16:9 source, and only the YUV shader keeps pixels lying
//! exactly on the circle.

use crate::gl::TextureTarget;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Sources
// ============================================================================

pub const VERTEX_SHADER: &str = "\
varying vec2 interp_tc;
attribute vec4 in_pos;
attribute vec4 in_tc;

uniform mat4 texMatrix;

void main() {
    gl_Position = in_pos;
    interp_tc = (texMatrix * in_tc).xy;
}
";

pub const YUV_FRAGMENT_SHADER: &str = "\
precision mediump float;
varying vec2 interp_tc;

uniform sampler2D y_tex;
uniform sampler2D u_tex;
uniform sampler2D v_tex;

void main() {
  vec2 p = -1.0 + 2.0 * interp_tc.xy;
  p.x = p.x * 1.77;
  float r = sqrt(dot(p, p));
  if (r <= 1.0) {
    float y = texture2D(y_tex, interp_tc).r;
    float u = texture2D(u_tex, interp_tc).r - 0.5;
    float v = texture2D(v_tex, interp_tc).r - 0.5;
    gl_FragColor = vec4(y + 1.403 * v,
                        y - 0.344 * u - 0.714 * v,
                        y + 1.77 * u, 1);
  } else {
    gl_FragColor = vec4(0, 0, 0, 0);
  }
}
";

pub const RGB_FRAGMENT_SHADER: &str = "\
precision mediump float;
varying vec2 interp_tc;

uniform sampler2D rgb_tex;

void main() {
  vec2 p = -1.0 + 2.0 * interp_tc.xy;
  float r = sqrt(dot(p, p));
  gl_FragColor = ((r < 1.0) ? texture2D(rgb_tex, interp_tc) : vec4(0, 0, 0, 0));
}
";

pub const OES_FRAGMENT_SHADER: &str = "\
#extension GL_OES_EGL_image_external : require
precision mediump float;
varying vec2 interp_tc;

uniform samplerExternalOES oes_tex;

void main() {
  vec2 p = -1.0 + 2.0 * interp_tc.xy;
  float r = sqrt(dot(p, p));
  gl_FragColor = ((r < 1.0) ? texture2D(oes_tex, interp_tc) : vec4(0, 0, 0, 0));
}
";

/// Uniform holding the texture-coordinate transform.
pub const TEX_MATRIX_UNIFORM: &str = "texMatrix";
/// Vertex attribute fed from the position quad.
pub const POSITION_ATTRIBUTE: &str = "in_pos";
/// Vertex attribute fed from the texture-coordinate quad.
pub const TEX_COORD_ATTRIBUTE: &str = "in_tc";

// ============================================================================
// Variants
// ============================================================================

/// Fragment shader flavour, chosen per draw from the source pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderVariant {
    /// Three single-channel planes (Y, U, V)
    Yuv,
    /// One RGB(A) 2D texture
    Rgb,
    /// One external image texture (camera/decoder surface)
    Oes,
}

impl ShaderVariant {
    pub const COUNT: usize = 3;
    pub const ALL: [ShaderVariant; Self::COUNT] =
        [ShaderVariant::Yuv, ShaderVariant::Rgb, ShaderVariant::Oes];

    /// Slot in the program cache
    pub fn index(self) -> usize {
        match self {
            ShaderVariant::Yuv => 0,
            ShaderVariant::Rgb => 1,
            ShaderVariant::Oes => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderVariant::Yuv => "yuv",
            ShaderVariant::Rgb => "rgb",
            ShaderVariant::Oes => "oes",
        }
    }

    pub fn fragment_source(self) -> &'static str {
        match self {
            ShaderVariant::Yuv => YUV_FRAGMENT_SHADER,
            ShaderVariant::Rgb => RGB_FRAGMENT_SHADER,
            ShaderVariant::Oes => OES_FRAGMENT_SHADER,
        }
    }

    /// Sampler uniforms and the texture unit each one reads from.
    ///
    /// The order is also the plane order expected by `draw_yuv`.
    pub fn sampler_units(self) -> &'static [(&'static str, u32)] {
        match self {
            ShaderVariant::Yuv => &[("y_tex", 0), ("u_tex", 1), ("v_tex", 2)],
            ShaderVariant::Rgb => &[("rgb_tex", 0)],
            ShaderVariant::Oes => &[("oes_tex", 0)],
        }
    }

    /// Bind target the variant's textures are attached to
    pub fn texture_target(self) -> TextureTarget {
        match self {
            ShaderVariant::Yuv | ShaderVariant::Rgb => TextureTarget::Texture2D,
            ShaderVariant::Oes => TextureTarget::ExternalOes,
        }
    }

    /// Reverse lookup used by backends that interpret the shader text themselves.
    pub fn from_fragment_source(source: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.fragment_source() == source)
    }
}

impl std::fmt::Display for ShaderVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShaderVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yuv" | "i420" => Ok(ShaderVariant::Yuv),
            "rgb" | "rgba" => Ok(ShaderVariant::Rgb),
            "oes" | "external" => Ok(ShaderVariant::Oes),
            other => Err(format!("unknown shader variant: {}", other)),
        }
    }
}
