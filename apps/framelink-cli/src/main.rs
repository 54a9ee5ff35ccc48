use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use framelink_backend::{DEFAULT_LIBRARY, DeviceConfig, ProcessStatusHandler, library};
use framelink_common::{ParseExtentError, SurfaceExtent};
use framelink_render::{CpuDisplay, DisplaySink, Viewer, ViewerConfig, surface_size_channel};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "framelink-cli", about = "Headless framelink rendering")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    device: DeviceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DeviceArgs {
    /// Device debug mode: report unknown parameters and every commit
    #[arg(short, long, global = true)]
    debug: bool,

    /// Backend library to load
    #[arg(short, long, global = true, default_value = DEFAULT_LIBRARY)]
    library: String,

    /// Record every device call to <DIR>/framelink-trace.jsonl
    #[arg(short, long, global = true, value_name = "DIR")]
    trace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the backend libraries that can be loaded
    Libraries,
    /// Render the demo scene for a number of frames
    Render {
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
        /// Number of frames to render
        #[arg(short, long, default_value_t = 1)]
        frames: u64,
        /// Resize before a frame, e.g. `3:800x600` (repeatable)
        #[arg(long, value_name = "FRAME:WxH")]
        resize: Vec<ScheduledResize>,
        /// Write the last presented frame as PNG
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// A surface size delivered just before frame `frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledResize {
    frame: u64,
    size: SurfaceExtent,
}

impl FromStr for ScheduledResize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (frame, size) = s
            .split_once(':')
            .ok_or_else(|| format!("expected FRAME:WxH, got {s:?}"))?;
        let frame = frame
            .trim()
            .parse()
            .map_err(|_| format!("invalid frame index {frame:?}"))?;
        // Zero sizes are valid input: they model a minimized window.
        let size = size
            .parse()
            .map_err(|e: ParseExtentError| e.to_string())?;
        Ok(Self { frame, size })
    }
}

impl fmt::Display for ScheduledResize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.frame, self.size)
    }
}

fn print_libraries() {
    for lib in library::available() {
        let default = if lib.name == DEFAULT_LIBRARY || lib.aliases.contains(&DEFAULT_LIBRARY) {
            " (default)"
        } else {
            ""
        };
        println!("{}{default}", lib.name);
        if !lib.aliases.is_empty() {
            println!("  aliases: {}", lib.aliases.join(", "));
        }
        println!("  {}", lib.description);
    }
}

/// Write bottom-to-top RGBA rows as a top-to-bottom PNG.
fn write_png(path: &Path, extent: SurfaceExtent, texels: &[[u8; 4]]) -> anyhow::Result<()> {
    let raw = texels.iter().flatten().copied().collect::<Vec<u8>>();
    let Some(img) = image::RgbaImage::from_raw(extent.width, extent.height, raw) else {
        bail!("pixel buffer does not match {extent}");
    };
    image::imageops::flip_vertical(&img)
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn render(
    cli_verbose: bool,
    device: DeviceArgs,
    extent: SurfaceExtent,
    frames: u64,
    mut schedule: Vec<ScheduledResize>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if extent.is_empty() {
        bail!("initial size must be non-zero, got {extent}");
    }
    let config = DeviceConfig {
        trace_dir: device.trace,
        debug: device.debug,
        ..DeviceConfig::default()
    };
    let mut backend = library::load(
        &device.library,
        config,
        Box::new(ProcessStatusHandler::new(cli_verbose)),
    )
    .with_context(|| format!("failed to load library {:?}", device.library))?;
    let world = framelink_scenes::triangle_pair(backend.as_mut())?;

    let (sizes, receiver) = surface_size_channel();
    let viewer_config = ViewerConfig {
        extent,
        ..ViewerConfig::default()
    };
    let mut viewer = Viewer::new(backend, world, CpuDisplay::new(extent), receiver, &viewer_config)?;

    schedule.sort_by_key(|r| r.frame);
    let mut pending = schedule.into_iter().peekable();
    for index in 0..frames {
        while let Some(r) = pending.next_if(|r| r.frame == index) {
            sizes.notify(r.size.width, r.size.height);
        }
        let stats = viewer.frame()?;
        tracing::debug!(
            frame = stats.index,
            extent = %stats.extent,
            resize = ?stats.resize,
            ms = stats.elapsed.as_secs_f64() * 1000.0,
            "frame presented"
        );
    }
    for r in pending {
        tracing::warn!("resize {r} is past the last frame, ignored");
    }

    let display = viewer.shutdown()?;
    println!(
        "rendered {frames} frame(s), final size {}, {} reallocation(s)",
        display.extent(),
        display.reallocations()
    );
    if let Some(path) = output {
        if display.presented() == 0 {
            bail!("no frame was presented, nothing to write");
        }
        write_png(&path, display.extent(), display.texels())?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Libraries => print_libraries(),
        Commands::Render {
            width,
            height,
            frames,
            resize,
            output,
        } => render(
            cli.verbose,
            cli.device,
            SurfaceExtent::new(width, height),
            frames,
            resize,
            output,
        )?,
    }
    Ok(())
}
