//! # Roundframe Core
//!
//! Draws decoded video frames (I420 planes, RGB, or external OES images)
//! into a viewport, masked to a circle, through a lazily built cache of
//! shader programs.

// ============================================================================
// GL Access
// ============================================================================
pub mod error;
pub mod gl;
pub mod soft;

// ============================================================================
// Shaders / Geometry
// ============================================================================
pub mod shaders;
pub mod geometry;
pub mod mask;
pub mod program_cache;

// ============================================================================
// Drawing
// ============================================================================
pub mod drawer;
pub mod frame;

pub use drawer::{FrameDrawer, GlDrawer};
pub use error::{RenderError, Result};
pub use frame::{FrameTextures, TestPattern, VideoFrame};
pub use geometry::{FrameSize, TexMatrix, Viewport, IDENTITY_MATRIX};
pub use gl::{GlApi, GlowContext};
pub use glow;
pub use shaders::ShaderVariant;
pub use soft::SoftGl;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
