use std::path::PathBuf;

use crate::error::ConfigError;
use crate::render::Viewport;

pub const USAGE: &str = "Usage: compute-raytracer [--size WIDTHxHEIGHT] [--shader-dir PATH] [--no-vsync] [--log FILTER]";

/// Runtime configuration, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub title: String,
    pub viewport: Viewport,
    /// Directory holding `raytracer.wgsl`, `quad.vert.wgsl` and `quad.frag.wgsl`.
    /// The built-in shaders are used when unset.
    pub shader_dir: Option<PathBuf>,
    pub vsync: bool,
    /// Overrides `RUST_LOG` when set.
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "GPU Raytracer".to_string(),
            viewport: Viewport::new(1280, 720),
            shader_dir: None,
            vsync: true,
            log_filter: None,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(Config),
    Help,
}

impl Config {
    /// Parses command-line arguments, excluding the program name.
    pub fn from_args<I>(args: I) -> Result<Command, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" | "-h" => return Ok(Command::Help),
                "--size" => {
                    let value = args.next().ok_or(ConfigError::MissingValue("--size"))?;
                    config.viewport = parse_size(&value)?;
                }
                "--shader-dir" => {
                    let value = args
                        .next()
                        .ok_or(ConfigError::MissingValue("--shader-dir"))?;
                    config.shader_dir = Some(PathBuf::from(value));
                }
                "--no-vsync" => config.vsync = false,
                "--log" => {
                    let value = args.next().ok_or(ConfigError::MissingValue("--log"))?;
                    config.log_filter = Some(value);
                }
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }
        Ok(Command::Run(config))
    }
}

fn parse_size(value: &str) -> Result<Viewport, ConfigError> {
    let invalid = || ConfigError::InvalidSize(value.to_string());
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(invalid)?;
    let width = width.trim().parse::<u32>().map_err(|_| invalid())?;
    let height = height.trim().parse::<u32>().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(ConfigError::EmptyViewport { width, height });
    }
    Ok(Viewport::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, ConfigError> {
        Config::from_args(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn defaults_to_720p() {
        let Command::Run(config) = parse(&[]).unwrap() else {
            panic!("expected run command");
        };
        assert_eq!(config.viewport, Viewport::new(1280, 720));
        assert!(config.vsync);
        assert!(config.shader_dir.is_none());
    }

    #[test]
    fn parses_all_options() {
        let Command::Run(config) =
            parse(&["--size", "640x480", "--shader-dir", "assets", "--no-vsync", "--log", "debug"])
                .unwrap()
        else {
            panic!("expected run command");
        };
        assert_eq!(config.viewport, Viewport::new(640, 480));
        assert_eq!(config.shader_dir, Some(PathBuf::from("assets")));
        assert!(!config.vsync);
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn help_short_circuits() {
        assert_eq!(parse(&["--help", "--bogus"]).unwrap(), Command::Help);
    }

    #[test]
    fn rejects_zero_sized_viewport() {
        assert!(matches!(
            parse(&["--size", "0x720"]),
            Err(ConfigError::EmptyViewport { width: 0, height: 720 })
        ));
    }

    #[test]
    fn rejects_malformed_size_and_unknown_flags() {
        assert!(matches!(parse(&["--size", "wide"]), Err(ConfigError::InvalidSize(_))));
        assert!(matches!(parse(&["--size"]), Err(ConfigError::MissingValue("--size"))));
        assert!(matches!(parse(&["--fast"]), Err(ConfigError::UnknownArgument(arg)) if arg == "--fast"));
    }
}
