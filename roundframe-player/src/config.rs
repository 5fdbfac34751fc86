//! Player configuration: JSON file first, command-line flags on top.

use anyhow::{bail, Context, Result};
use roundframe_core::{ShaderVariant, TestPattern};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub window_width: f32,
    pub window_height: f32,
    /// Size of the generated source frame
    pub frame_width: u32,
    pub frame_height: u32,
    pub variant: ShaderVariant,
    pub pattern: TestPattern,
    /// Radians per second, applied as a texture-matrix rotation
    pub spin_speed: f32,
    /// Side of the square image written in headless mode
    pub headless_size: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            window_width: 720.0,
            window_height: 720.0,
            frame_width: 640,
            frame_height: 360,
            variant: ShaderVariant::Yuv,
            pattern: TestPattern::Bars,
            spin_speed: 0.5,
            headless_size: 512,
        }
    }
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: PlayerConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Config file (if any) with command-line overrides applied.
    pub fn resolve(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(variant) = args.variant {
            config.variant = variant;
        }
        if let Some(pattern) = args.pattern {
            config.pattern = pattern;
        }
        config.validate(args.headless.is_some())?;
        Ok(config)
    }

    /// OES sources only exist on the software backend, which accepts
    /// uploads into external images.
    pub fn validate(&self, headless: bool) -> Result<()> {
        if self.frame_width == 0 || self.frame_height == 0 {
            bail!("frame size must be non-zero, got {}x{}", self.frame_width, self.frame_height);
        }
        if headless && self.headless_size == 0 {
            bail!("headless_size must be non-zero");
        }
        if !headless && self.variant == ShaderVariant::Oes {
            bail!(
                "the oes variant needs an external image producer; use yuv or rgb, or --headless"
            );
        }
        Ok(())
    }
}

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub variant: Option<ShaderVariant>,
    pub pattern: Option<TestPattern>,
    /// PNG path; present means render once with the software backend
    pub headless: Option<PathBuf>,
}

impl CliArgs {
    /// `args[0]` is the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut cli = CliArgs::default();

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = || {
                args.get(i + 1)
                    .map(String::as_str)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for {}", flag))
            };
            match flag {
                "--config" | "-c" => cli.config = Some(PathBuf::from(value()?)),
                "--variant" => {
                    cli.variant = Some(value()?.parse().map_err(anyhow::Error::msg)?);
                }
                "--pattern" => {
                    cli.pattern = Some(value()?.parse().map_err(anyhow::Error::msg)?);
                }
                "--headless" => cli.headless = Some(PathBuf::from(value()?)),
                other => bail!("Unknown argument: {}", other),
            }
            i += 2;
        }

        Ok(cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("roundframe")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "variant": "rgb", "spin_speed": 0.0 }}"#).unwrap();

        let config = PlayerConfig::load(file.path()).unwrap();
        assert_eq!(config.variant, ShaderVariant::Rgb);
        assert_eq!(config.spin_speed, 0.0);
        assert_eq!(config.frame_width, PlayerConfig::default().frame_width);
        assert_eq!(config.pattern, TestPattern::Bars);
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "variant": "rgb", "pattern": "bars" }}"#).unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let flags = ["--config", path.as_str(), "--variant", "YUV", "--pattern", "gradient"];
        let cli = CliArgs::parse(&args(&flags)).unwrap();
        let config = PlayerConfig::resolve(&cli).unwrap();
        assert_eq!(config.variant, ShaderVariant::Yuv);
        assert_eq!(config.pattern, TestPattern::Gradient);
    }

    #[test]
    fn test_bad_input_reports_errors() {
        assert!(CliArgs::parse(&args(&["--variant"])).is_err());
        assert!(CliArgs::parse(&args(&["--variant", "nv12"])).is_err());
        assert!(CliArgs::parse(&args(&["--volume", "3"])).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = PlayerConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_oes_only_headless() {
        let cli = CliArgs::parse(&args(&["--variant", "oes"])).unwrap();
        assert!(PlayerConfig::resolve(&cli).is_err());

        let cli = CliArgs::parse(&args(&["--variant", "oes", "--headless", "out.png"])).unwrap();
        assert_eq!(PlayerConfig::resolve(&cli).unwrap().variant, ShaderVariant::Oes);
    }
}
