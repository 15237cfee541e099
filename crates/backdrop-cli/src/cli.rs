use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "backdrop",
    author,
    version,
    about = "Animated raymarched swirl background",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Settings file; defaults to `backdrop.toml` in the user config directory.
    #[arg(long, global = true, value_name = "FILE", env = "BACKDROP_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a window and animate the background in it (the default).
    Run(RunArgs),
    /// Drive the background against a headless host and report what it drew.
    Simulate(SimulateArgs),
    /// Render one frame on the CPU and write it as a PNG.
    Still(StillArgs),
}

/// Knobs shared by every mode that mounts a background.
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// Frame-rate ceiling (0 = draw on every frame the host offers).
    #[arg(long, value_name = "FPS", value_parser = parse_fps)]
    pub fps: Option<f32>,

    /// Backing-store multiplier applied on top of the pixel density.
    #[arg(long, value_name = "SCALE", value_parser = parse_scale)]
    pub scale: Option<f32>,

    /// Pointer filter coefficient in (0, 1]; smaller trails further behind.
    #[arg(long, value_name = "K", value_parser = parse_smoothing)]
    pub smoothing: Option<f32>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Initial window size in logical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Window title.
    #[arg(long)]
    pub title: Option<String>,

    /// Style class carried through to the window title.
    #[arg(long, value_name = "CLASS")]
    pub class: Option<String>,

    /// Request an opaque surface instead of a transparent one.
    #[arg(long)]
    pub opaque: bool,

    /// GPU power preference: `low` or `high`.
    #[arg(long, value_name = "PREF", value_parser = backdrop_config::parse_power)]
    pub power: Option<backdrop_config::PowerSetting>,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Number of frame callbacks to deliver.
    #[arg(long, default_value_t = 120)]
    pub frames: u32,

    /// Host clock advance between callbacks, in milliseconds.
    #[arg(long = "step-ms", value_name = "MS", default_value = "16.667", value_parser = parse_step)]
    pub step: Duration,

    /// Physical pixels per display pixel.
    #[arg(long, default_value_t = 1.0)]
    pub density: f32,

    /// Container size in display pixels.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1280x720")]
    pub size: (u32, u32),

    /// Simulate a host without graphics support.
    #[arg(long)]
    pub unsupported: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StillArgs {
    /// Destination PNG.
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Shader time to render (`5`, `2.5`, `4s 500ms`).
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub time: Option<Duration>,

    /// Image size in pixels.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{value}'; expected WIDTHxHEIGHT"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("size must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_scale(value: &str) -> Result<f32, String> {
    let scale: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid scale '{value}'"))?;
    if !scale.is_finite() || scale <= 0.0 {
        return Err("scale must be greater than zero".into());
    }
    Ok(scale)
}

pub fn parse_smoothing(value: &str) -> Result<f32, String> {
    let k: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid smoothing '{value}'"))?;
    if !(k > 0.0 && k <= 1.0) {
        return Err("smoothing must be in the range (0, 1]".into());
    }
    Ok(k)
}

pub fn parse_fps(value: &str) -> Result<f32, String> {
    let fps: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid fps '{value}'"))?;
    backdrop_config::check_fps(fps)
}

fn parse_step(value: &str) -> Result<Duration, String> {
    let step: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid step '{value}'"))?;
    if !step.is_finite() || step < 0.0 {
        return Err("step must be a non-negative number of milliseconds".into());
    }
    Duration::try_from_secs_f64(step / 1000.0)
        .map_err(|err| format!("invalid step '{value}': {err}"))
}

/// Plain numbers are seconds; anything else goes through humantime.
pub fn parse_time(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err("time must be non-negative".into());
        }
        return Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid time '{trimmed}': {err}"));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid time '{trimmed}': {err}"))
}
