//! # Roundframe Player
//!
//! Demo host for roundframe-core: takes the GL context eframe created,
//! uploads a test frame and draws it through the circular-mask drawer on
//! every repaint.

mod config;
mod headless;

use anyhow::{Context, Result};
use config::{CliArgs, PlayerConfig};
use eframe::egui;
use parking_lot::Mutex;
use roundframe_core::geometry::{rotation_about_center, TexMatrix};
use roundframe_core::glow;
use roundframe_core::{
    FrameDrawer, FrameSize, FrameTextures, GlApi, GlDrawer, GlowContext, VideoFrame, Viewport,
};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = CliArgs::parse(&args)?;

    let default_filter = if cli.headless.is_some() {
        "roundframe=info,eframe=warn"
    } else {
        "roundframe=debug,eframe=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("Roundframe Player v{}", roundframe_core::VERSION);

    let config = PlayerConfig::resolve(&cli)?;
    tracing::debug!("Config: {:?}", config);

    if let Some(out) = &cli.headless {
        return headless::render_to_png(&config, out);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Roundframe")
            .with_inner_size([config.window_width, config.window_height])
            .with_min_inner_size([160.0, 160.0]),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    eframe::run_native(
        "Roundframe",
        options,
        Box::new(|cc| Ok(Box::new(RoundframeApp::new(cc, config)?))),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {}", e))?;

    Ok(())
}

// ============================================================================
// Application State
// ============================================================================

struct RoundframeApp {
    config: PlayerConfig,

    // Shared with the paint callback, which runs inside egui's GL pass
    drawer: Arc<Mutex<FrameDrawer<GlowContext>>>,
    textures: Option<FrameTextures<glow::Texture>>,
    frame_size: FrameSize,
    last_error: Arc<Mutex<Option<String>>>,

    started: Instant,
}

impl RoundframeApp {
    fn new(cc: &eframe::CreationContext<'_>, config: PlayerConfig) -> Result<Self> {
        let gl = cc
            .gl
            .clone()
            .context("eframe did not provide a glow context")?;
        // SAFETY: eframe keeps this context current on the UI thread, which is
        // where update, paint callbacks and on_exit run.
        let gl = unsafe { GlowContext::new(gl) };

        let frame = VideoFrame::test_pattern(
            config.pattern,
            config.variant,
            config.frame_width,
            config.frame_height,
        );
        let textures = frame
            .upload(&gl, config.variant)
            .context("Failed to upload test frame")?;
        tracing::info!(
            "Showing {:?} pattern as {} frame {}x{}",
            config.pattern,
            config.variant,
            config.frame_width,
            config.frame_height
        );

        Ok(Self {
            frame_size: frame.size(),
            drawer: Arc::new(Mutex::new(FrameDrawer::new(gl))),
            textures: Some(textures),
            last_error: Arc::new(Mutex::new(None)),
            started: Instant::now(),
            config,
        })
    }

    fn paint_frame(&self, ui: &mut egui::Ui) {
        let Some(textures) = self.textures else {
            return;
        };
        let rect = ui.available_rect_before_wrap();
        let angle = self.started.elapsed().as_secs_f32() * self.config.spin_speed;
        let tex_matrix = rotation_about_center(angle);
        let frame_size = self.frame_size;
        let drawer = self.drawer.clone();
        let last_error = self.last_error.clone();

        let callback = eframe::egui_glow::CallbackFn::new(move |info, _painter| {
            let area = info.viewport_in_pixels();
            let square = Viewport::centered_square(area.width_px, area.height_px);
            let viewport = Viewport::new(
                area.left_px + square.x,
                area.from_bottom_px + square.y,
                square.width,
                square.height,
            );
            if viewport.is_empty() {
                return;
            }
            draw_unless_failed(&drawer, &last_error, &textures, &tex_matrix, frame_size, viewport);
        });

        ui.painter().add(egui::PaintCallback {
            rect,
            callback: Arc::new(callback),
        });
    }
}

/// Draw one frame unless an earlier draw on this drawer failed.
///
/// The first failure is recorded and ends drawing for the drawer; later calls
/// return without touching GL. Returns whether a draw was issued.
fn draw_unless_failed<G: GlApi>(
    drawer: &Mutex<FrameDrawer<G>>,
    last_error: &Mutex<Option<String>>,
    textures: &FrameTextures<G::Texture>,
    tex_matrix: &TexMatrix,
    frame_size: FrameSize,
    viewport: Viewport,
) -> bool {
    let mut slot = last_error.lock();
    if slot.is_some() {
        return false;
    }
    if let Err(e) = drawer.lock().draw(textures, tex_matrix, frame_size, viewport) {
        tracing::error!("Draw failed, drawing stopped: {}", e);
        *slot = Some(e.to_string());
    }
    true
}

impl eframe::App for RoundframeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::bottom("status")
            .frame(
                egui::Frame::default()
                    .fill(egui::Color32::from_rgb(25, 25, 28))
                    .inner_margin(egui::Margin::symmetric(8, 4)),
            )
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    let frames = self.drawer.lock().stats().frames;
                    ui.label(format!("{} | frames drawn {:?}", self.config.variant, frames));
                    if let Some(error) = self.last_error.lock().as_ref() {
                        ui.colored_label(egui::Color32::from_rgb(220, 90, 90), error.as_str());
                    }
                });
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::default().fill(egui::Color32::from_rgb(18, 18, 18)))
            .show(ctx, |ui| self.paint_frame(ui));

        if self.config.spin_speed != 0.0 {
            ctx.request_repaint();
        }
    }

    fn on_exit(&mut self, _gl: Option<&glow::Context>) {
        let mut drawer = self.drawer.lock();
        if let Some(textures) = self.textures.take() {
            textures.delete(drawer.gl());
        }
        drawer.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundframe_core::soft::SoftTexture;
    use roundframe_core::{ShaderVariant, SoftGl, TestPattern, IDENTITY_MATRIX};

    fn setup() -> (Mutex<FrameDrawer<SoftGl>>, FrameTextures<SoftTexture>) {
        let drawer = FrameDrawer::new(SoftGl::new(16, 16));
        let frame = VideoFrame::test_pattern(TestPattern::Bars, ShaderVariant::Rgb, 8, 8);
        let textures = frame.upload(drawer.gl(), ShaderVariant::Rgb).unwrap();
        (Mutex::new(drawer), textures)
    }

    #[test]
    fn test_failed_draw_stops_drawing() {
        let (drawer, textures) = setup();
        let last_error = Mutex::new(None);
        let viewport = Viewport::new(0, 0, 16, 16);
        let draw = || {
            draw_unless_failed(
                &drawer,
                &last_error,
                &textures,
                &IDENTITY_MATRIX,
                FrameSize::new(8, 8),
                viewport,
            )
        };
        drawer.lock().gl().fail_next_compile("0:1: syntax error");

        assert!(draw());
        assert!(last_error.lock().as_deref().is_some_and(|e| e.contains("syntax error")));

        // The injected failure is spent, so any retry would compile.
        for _ in 0..3 {
            assert!(!draw());
        }

        let mut drawer = drawer.into_inner();
        assert_eq!(drawer.gl().stats().total_compiles(), 0);
        assert_eq!(drawer.gl().stats().draws, 0);
        drawer.release();
    }

    #[test]
    fn test_healthy_drawer_keeps_drawing() {
        let (drawer, textures) = setup();
        let last_error = Mutex::new(None);
        let viewport = Viewport::new(0, 0, 16, 16);
        let draw = || {
            draw_unless_failed(
                &drawer,
                &last_error,
                &textures,
                &IDENTITY_MATRIX,
                FrameSize::new(8, 8),
                viewport,
            )
        };

        assert!(draw());
        assert!(draw());
        assert!(last_error.lock().is_none());

        let mut drawer = drawer.into_inner();
        assert_eq!(drawer.stats().frames[ShaderVariant::Rgb.index()], 2);
        textures.delete(drawer.gl());
        drawer.release();
    }
}
