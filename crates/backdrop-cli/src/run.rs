use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use backdrop::headless::ManualHost;
use backdrop::{
    export_still, BackgroundConfig, BackgroundStatus, ContextOptions, DisplaySize, FieldInputs,
    HostEvent, PowerPreference, ShaderBackground, SurfaceSize, TickOutcome, WindowOptions,
    DEFAULT_POINTER_SMOOTHING, DEFAULT_TARGET_FPS, SHADER_RESOLUTION_SCALE,
};
use backdrop_config::{BackdropConfig, PowerSetting};
use tracing_subscriber::EnvFilter;

use crate::cli::{RunArgs, SimulateArgs, StillArgs, TuningArgs};
use crate::paths::AppPaths;

/// Far enough in that the fade-in has completed.
pub const DEFAULT_STILL_TIME: Duration = Duration::from_secs(5);
pub const DEFAULT_STILL_SIZE: (u32, u32) = (1280, 720);
pub const DEFAULT_STILL_OUTPUT: &str = "backdrop.png";

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Reads the settings file named on the command line, or the one in the user
/// config directory if it exists.
pub fn load_config(explicit: Option<&Path>) -> Result<BackdropConfig> {
    if let Some(path) = explicit {
        return BackdropConfig::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()));
    }
    let paths = AppPaths::discover()?;
    let path = paths.config_file();
    let config = BackdropConfig::load_or_default(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    tracing::debug!(path = %path.display(), "resolved settings file");
    Ok(config)
}

/// Flags win over the settings file, which wins over the built-in defaults.
pub fn background_config(file: &BackdropConfig, tuning: &TuningArgs) -> BackgroundConfig {
    BackgroundConfig {
        target_fps: tuning.fps.or(file.fps).unwrap_or(DEFAULT_TARGET_FPS),
        resolution_scale: tuning
            .scale
            .or(file.scale)
            .unwrap_or(SHADER_RESOLUTION_SCALE),
        pointer_smoothing: tuning
            .smoothing
            .or(file.smoothing)
            .unwrap_or(DEFAULT_POINTER_SMOOTHING),
        class_name: file.window.class.clone(),
        context: ContextOptions {
            antialias: file.context.antialias.unwrap_or(false),
            alpha: file.context.alpha.unwrap_or(true),
            power_preference: map_power(file.context.power),
        },
    }
}

fn map_power(setting: Option<PowerSetting>) -> PowerPreference {
    match setting {
        Some(PowerSetting::Low) => PowerPreference::LowPower,
        Some(PowerSetting::High) | None => PowerPreference::HighPerformance,
    }
}

fn merge_size(
    flag: Option<(u32, u32)>,
    width: Option<u32>,
    height: Option<u32>,
    fallback: (u32, u32),
) -> (u32, u32) {
    flag.unwrap_or((width.unwrap_or(fallback.0), height.unwrap_or(fallback.1)))
}

pub fn run(args: RunArgs, file: &BackdropConfig) -> Result<()> {
    let mut config = background_config(file, &args.tuning);
    if let Some(class) = args.class {
        config.class_name = Some(class);
    }
    if args.opaque {
        config.context.alpha = false;
    }
    if args.power.is_some() {
        config.context.power_preference = map_power(args.power);
    }

    let defaults = WindowOptions::default();
    let options = WindowOptions {
        size: merge_size(args.size, file.window.width, file.window.height, defaults.size),
        title: args
            .title
            .or_else(|| file.window.title.clone())
            .unwrap_or(defaults.title),
    };
    tracing::info!(
        width = options.size.0,
        height = options.size.1,
        fps = config.target_fps,
        scale = config.resolution_scale,
        "opening preview window"
    );
    backdrop::run_window(options, config)
}

/// Tallies from one headless run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub status: BackgroundStatus,
    pub callbacks: u32,
    pub drawn: usize,
    pub throttled: usize,
    pub dropped: usize,
    pub backing: SurfaceSize,
    pub objects_created: usize,
    pub live_after_unmount: usize,
    pub double_deletes: usize,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "status:    {:?}", self.status)?;
        writeln!(
            f,
            "backing:   {}x{}",
            self.backing.width, self.backing.height
        )?;
        writeln!(
            f,
            "callbacks: {} (drawn {}, throttled {}, dropped {})",
            self.callbacks, self.drawn, self.throttled, self.dropped
        )?;
        write!(
            f,
            "objects:   {} created, {} live after unmount, {} double deletes",
            self.objects_created, self.live_after_unmount, self.double_deletes
        )
    }
}

pub fn simulate(args: SimulateArgs, file: &BackdropConfig) -> Result<SimulationReport> {
    let config = background_config(file, &args.tuning);
    let (width, height) = (args.size.0 as f32, args.size.1 as f32);
    let mut host = ManualHost::new(DisplaySize::new(width, height), args.density);
    host.set_supported(!args.unsupported);
    let journal = host.journal();
    let step = args.step;

    let mut background = ShaderBackground::mount(host, config);
    let backing = background.surface().backing();
    let (mut drawn, mut throttled, mut dropped) = (0, 0, 0);
    let mut callbacks = 0;

    for frame in 0..args.frames {
        // Sweep the pointer around the centre so the smoothing path is exercised.
        let angle = frame as f32 * 0.05;
        background.handle_event(HostEvent::PointerMoved {
            x: width * (0.5 + 0.3 * angle.cos()),
            y: height * (0.5 + 0.3 * angle.sin()),
        });
        let Some(outcome) = background.pump_frame(step) else {
            break;
        };
        callbacks += 1;
        match outcome {
            TickOutcome::Drawn => drawn += 1,
            TickOutcome::Throttled => throttled += 1,
            TickOutcome::Dropped(_) | TickOutcome::Fatal(_) => dropped += 1,
            TickOutcome::Ignored => {}
        }
    }

    let status = background.status().clone();
    background.unmount();
    drop(background);

    let journal = journal.borrow();
    let report = SimulationReport {
        status,
        callbacks,
        drawn,
        throttled,
        dropped,
        backing,
        objects_created: journal.created.len(),
        live_after_unmount: journal.live_objects(),
        double_deletes: journal.double_deletes(),
    };
    tracing::info!(
        drawn = report.drawn,
        throttled = report.throttled,
        "simulation finished"
    );
    Ok(report)
}

pub fn still(args: StillArgs, file: &BackdropConfig) -> Result<PathBuf> {
    let time = args
        .time
        .or(file.still.time)
        .unwrap_or(DEFAULT_STILL_TIME);
    let (width, height) = merge_size(
        args.size,
        file.still.width,
        file.still.height,
        DEFAULT_STILL_SIZE,
    );
    let output = args
        .output
        .or_else(|| file.still.output.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STILL_OUTPUT));

    match output.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => {}
        _ => bail!(
            "unsupported output path {}; expected a .png file",
            output.display()
        ),
    }

    let inputs = FieldInputs {
        time: time.as_secs_f32(),
        resolution: [width as f32, height as f32],
        pointer: [0.0, 0.0],
    };
    export_still(&output, SurfaceSize::new(width, height), &inputs)?;
    Ok(output)
}
