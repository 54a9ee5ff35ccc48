use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser};
use framelink_backend::{
    Backend, DEFAULT_LIBRARY, DeviceConfig, ObjectHandle, ProcessStatusHandler, library,
};
use framelink_common::SurfaceExtent;
use framelink_render::{SurfaceSizeSender, Viewer, ViewerConfig, surface_size_channel};
use framelink_render_wgpu::{GpuContext, WgpuPresenter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "framelink-desktop", about = "Render a scene through a backend device and show it in a window")]
struct Cli {
    /// Enable verbose logging (also shows INFO/PERF/DEBUG device messages)
    #[arg(short, long)]
    verbose: bool,

    /// Device debug mode: report unknown parameters and every commit
    #[arg(short, long)]
    debug: bool,

    /// Backend library to load
    #[arg(short, long, default_value = DEFAULT_LIBRARY)]
    library: String,

    /// Record every device call to <DIR>/framelink-trace.jsonl
    #[arg(short, long, value_name = "DIR")]
    trace: Option<PathBuf>,

    /// Initial window width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial window height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,
}

fn library_list() -> String {
    let mut out = String::from("Libraries:\n");
    for lib in library::available() {
        out.push_str(&format!("  {:<12}{}", lib.name, lib.description));
        if !lib.aliases.is_empty() {
            out.push_str(&format!(" (alias: {})", lib.aliases.join(", ")));
        }
        out.push('\n');
    }
    out
}

/// Device and world created before the window exists.
struct Startup {
    backend: Box<dyn Backend>,
    world: ObjectHandle,
    extent: SurfaceExtent,
}

struct App {
    startup: Option<Startup>,
    window: Option<Arc<Window>>,
    viewer: Option<Viewer<WgpuPresenter>>,
    sizes: Option<SurfaceSizeSender>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(startup: Startup) -> Self {
        Self {
            startup: Some(startup),
            window: None,
            viewer: None,
            sizes: None,
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop, startup: Startup) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("framelink")
            .with_inner_size(PhysicalSize::new(
                startup.extent.width,
                startup.extent.height,
            ));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let size = window.inner_size();
        let extent = SurfaceExtent::new(size.width.max(1), size.height.max(1));
        let gpu = GpuContext::new(window.clone(), extent).context("failed to initialize GPU")?;
        let presenter = WgpuPresenter::new(gpu, extent);

        let (tx, rx) = surface_size_channel();
        let config = ViewerConfig {
            extent,
            ..ViewerConfig::default()
        };
        let viewer = Viewer::new(startup.backend, startup.world, presenter, rx, &config)
            .context("failed to set up viewer")?;

        self.window = Some(window);
        self.viewer = Some(viewer);
        self.sizes = Some(tx);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{error:#}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(startup) = self.startup.take() else {
            return;
        };
        if let Err(e) = self.start(event_loop, startup) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(sizes) = &self.sizes {
                    sizes.notify(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(viewer) = &mut self.viewer else {
                    return;
                };
                match viewer.frame() {
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => {
                        self.fail(event_loop, anyhow::Error::new(e).context("frame loop stopped"));
                        return;
                    }
                    Err(e) => tracing::warn!("frame skipped: {e}"),
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let matches = Cli::command().after_help(library_list()).get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("framelink-desktop starting");

    let config = DeviceConfig {
        trace_dir: cli.trace,
        debug: cli.debug,
        ..DeviceConfig::default()
    };
    let mut backend = library::load(
        &cli.library,
        config,
        Box::new(ProcessStatusHandler::new(cli.verbose)),
    )
    .with_context(|| format!("failed to load library {:?}", cli.library))?;
    let world = framelink_scenes::triangle_pair(backend.as_mut())
        .context("failed to build the demo world")?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(Startup {
        backend,
        world,
        extent: SurfaceExtent::new(cli.width.max(1), cli.height.max(1)),
    });
    event_loop.run_app(&mut app)?;

    if let Some(viewer) = app.viewer.take() {
        viewer.shutdown()?;
    }
    match app.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
