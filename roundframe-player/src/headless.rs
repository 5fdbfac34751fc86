//! One-shot render through the software backend, written out as PNG.

use crate::config::PlayerConfig;
use anyhow::{Context, Result};
use roundframe_core::geometry::TexMatrix;
use roundframe_core::{FrameDrawer, GlDrawer, SoftGl, VideoFrame, Viewport, IDENTITY_MATRIX};
use std::path::Path;

pub fn render_to_png(config: &PlayerConfig, out: &Path) -> Result<()> {
    let pixels = render(config, &IDENTITY_MATRIX)?;
    let size = config.headless_size;
    let image = image::RgbaImage::from_raw(size, size, pixels)
        .context("Rendered buffer does not match the output size")?;
    image
        .save(out)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    tracing::info!("Wrote {}x{} {} frame to {}", size, size, config.variant, out.display());
    Ok(())
}

/// Draw the configured frame into a transparent square, rows top-down.
pub fn render(config: &PlayerConfig, tex_matrix: &TexMatrix) -> Result<Vec<u8>> {
    let size = config.headless_size;
    let mut drawer = FrameDrawer::new(SoftGl::new(size, size));

    let frame = VideoFrame::test_pattern(
        config.pattern,
        config.variant,
        config.frame_width,
        config.frame_height,
    );
    let textures = frame
        .upload(drawer.gl(), config.variant)
        .context("Failed to upload test frame")?;

    let viewport = Viewport::centered_square(size as i32, size as i32);
    let drawn = drawer.draw(&textures, tex_matrix, frame.size(), viewport);

    textures.delete(drawer.gl());
    drawer.release();
    drawn.context("Failed to draw frame")?;

    tracing::debug!("Headless draw stats: {:?}", drawer.stats());
    Ok(drawer.gl().to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundframe_core::{ShaderVariant, TestPattern};

    fn config(variant: ShaderVariant) -> PlayerConfig {
        PlayerConfig {
            variant,
            pattern: TestPattern::Bars,
            frame_width: 32,
            frame_height: 32,
            headless_size: 64,
            ..PlayerConfig::default()
        }
    }

    fn pixel(buf: &[u8], size: usize, x: usize, y: usize) -> [u8; 4] {
        let i = (y * size + x) * 4;
        [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
    }

    #[test]
    fn test_corners_transparent_centre_opaque() {
        for variant in ShaderVariant::ALL {
            let buf = render(&config(variant), &IDENTITY_MATRIX).unwrap();
            assert_eq!(buf.len(), 64 * 64 * 4);
            assert_eq!(pixel(&buf, 64, 0, 0), [0, 0, 0, 0], "{variant}");
            assert_eq!(pixel(&buf, 64, 63, 63), [0, 0, 0, 0], "{variant}");
            assert_eq!(pixel(&buf, 64, 32, 32)[3], 255, "{variant}");
        }
    }

    #[test]
    fn test_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frame.png");
        render_to_png(&config(ShaderVariant::Rgb), &out).unwrap();

        let image = image::open(&out).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (64, 64));
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(image.get_pixel(32, 32).0[3], 255);
    }
}
