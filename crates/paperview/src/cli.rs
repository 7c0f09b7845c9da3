use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "paperview",
    author,
    version,
    about = "Preview GLSL fragment shaders in a desktop window",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scene description (TOML) to open.
    #[arg(value_name = "SCENE")]
    pub scene: Option<PathBuf>,

    /// Fragment shader file or `builtin:<name>`; replaces the scene's shader.
    #[arg(long, value_name = "FILE")]
    pub shader: Option<String>,

    /// Animation speed multiplier (0 renders only on changes).
    #[arg(long, value_name = "X")]
    pub speed: Option<f64>,

    /// Starting frame time in milliseconds.
    #[arg(long, value_name = "MS")]
    pub frame: Option<f64>,

    /// Render a single still frame at `--frame` instead of animating.
    #[arg(long)]
    pub still: bool,

    /// Initial window size in logical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Lower bound for the render scale.
    #[arg(long, value_name = "RATIO")]
    pub min_pixel_ratio: Option<f64>,

    /// Upper bound for the backing store's width × height.
    #[arg(long, value_name = "PIXELS")]
    pub max_pixel_count: Option<u64>,

    /// Uniform override `NAME=KIND:VALUE` (repeatable), e.g. `u_speed=float:0.5`.
    #[arg(long = "set", value_name = "NAME=KIND:VALUE")]
    pub overrides: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a scene and print its uniforms.
    Check(CheckArgs),
    /// Normalise a CSS colour into the RGBA a shader receives.
    Color(ColorArgs),
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[arg(value_name = "SCENE")]
    pub scene: PathBuf,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ColorArgs {
    #[arg(value_name = "VALUE")]
    pub value: String,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_window_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 640 X 480 ").unwrap(), (640, 480));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("widexhigh").is_err());
    }

    #[test]
    fn collects_repeated_overrides() {
        let cli = Cli::try_parse_from([
            "paperview",
            "scene.toml",
            "--set",
            "u_a=float:1",
            "--set",
            "u_b=bool:true",
            "--still",
        ])
        .unwrap();
        assert_eq!(cli.run.scene, Some(PathBuf::from("scene.toml")));
        assert_eq!(cli.run.overrides, ["u_a=float:1", "u_b=bool:true"]);
        assert!(cli.run.still);
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_check_subcommand() {
        let cli = Cli::try_parse_from(["paperview", "check", "scene.toml", "--json"]).unwrap();
        match cli.command {
            Some(Command::Check(args)) => {
                assert_eq!(args.scene, PathBuf::from("scene.toml"));
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
