//! live_detect - live camera object detection client
//!
//! This binary:
//! 1. Loads the client config (file, env, then CLI flags)
//! 2. Checks the detection server's health and address
//! 3. Samples camera frames at the target rate, at most one request in flight
//! 4. Renders boxes to the log or to an annotated snapshot file
//! 5. Takes operator commands on stdin (start, stop, switch, fps, conf, status, quit)

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use live_detect::{
    AppEvent, CameraSource, ClientConfig, ControlCommand, DetectWorker, DetectionClient,
    DetectorApp, FacingMode, FrameSampler, LogStatusBoard, LogSurface, LoopConfig,
    OverlaySurface, RasterSurface, Resolution, SourceCamera, SystemClock,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream camera frames to an object-detection server and draw the results"
)]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "LIVE_DETECT_CONFIG")]
    config: Option<PathBuf>,

    /// Detection server base URL.
    #[arg(long)]
    server_url: Option<String>,

    /// Target detection rate (1-60).
    #[arg(long)]
    fps: Option<u32>,

    /// Minimum confidence to draw, in percent.
    #[arg(long)]
    confidence: Option<u32>,

    /// Camera to open first: user (front) or environment (back).
    #[arg(long)]
    facing: Option<FacingMode>,

    /// Write the annotated frame here on every render.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Wait for a `start` command instead of opening the camera at launch.
    #[arg(long)]
    idle: bool,

    /// Exit after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ClientConfig::load_from(args.config.as_deref())?;
    apply_args(&mut config, &args)?;
    config.validate()?;

    let client = DetectionClient::new(&config.server_url, config.request_timeout)?;
    log::info!(
        "live_detect {} using server {}",
        env!("CARGO_PKG_VERSION"),
        client.base_url()
    );

    let backend = SourceCamera::new(
        parse_source(&config.camera.user_source)?,
        parse_source(&config.camera.environment_source)?,
    );
    let sampler = FrameSampler::new(
        Box::new(backend),
        Resolution::new(config.camera.width, config.camera.height),
        config.jpeg_quality,
    );
    let settings = LoopConfig::new(config.target_fps, config.confidence_threshold)?;

    let (tx, rx) = mpsc::channel();
    let worker = DetectWorker::spawn(client.clone(), tx.clone())?;

    let shutdown_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(AppEvent::Shutdown);
    })
    .context("set Ctrl-C handler")?;
    spawn_control_reader(tx.clone())?;
    if let Some(seconds) = args.seconds {
        let timer_tx = tx.clone();
        std::thread::Builder::new()
            .name("run-timer".to_string())
            .spawn(move || {
                std::thread::sleep(Duration::from_secs(seconds));
                let _ = timer_tx.send(AppEvent::Shutdown);
            })
            .context("spawn run timer")?;
    }
    drop(tx);

    let session = Session {
        client,
        sampler,
        settings,
        facing: config.camera.facing,
        worker,
        autostart: !args.idle,
    };
    match config.snapshot_path.clone() {
        Some(path) => {
            log::info!("writing annotated frames to {}", path.display());
            session.run(RasterSurface::new(Some(path)), rx)
        }
        None => session.run(LogSurface::new(), rx),
    }
}

struct Session {
    client: DetectionClient,
    sampler: FrameSampler,
    settings: LoopConfig,
    facing: FacingMode,
    worker: DetectWorker,
    autostart: bool,
}

impl Session {
    fn run<S: OverlaySurface>(self, surface: S, events: Receiver<AppEvent>) -> Result<()> {
        let mut app = DetectorApp::new(
            self.sampler,
            self.settings,
            self.facing,
            LogStatusBoard::new(),
            surface,
            self.worker,
            SystemClock,
        );
        app.apply_server_health(self.client.health());
        app.apply_server_info(self.client.server_info());

        if self.autostart {
            if let Err(err) = app.start_camera() {
                log::warn!("camera not started ({}); type `start` to retry", err);
            }
        }

        app.run(events);
        log::info!("shutting down");
        app.into_dispatcher().shutdown()
    }
}

fn apply_args(config: &mut ClientConfig, args: &Args) -> Result<()> {
    if let Some(url) = &args.server_url {
        config.server_url = url.clone();
    }
    if let Some(fps) = args.fps {
        config.target_fps = fps;
    }
    if let Some(percent) = args.confidence {
        if percent > 100 {
            return Err(anyhow!("--confidence must be a percentage (0-100)"));
        }
        config.confidence_threshold = percent as f32 / 100.0;
    }
    if let Some(facing) = args.facing {
        config.camera.facing = facing;
    }
    if let Some(path) = &args.snapshot {
        config.snapshot_path = Some(path.clone());
    }
    Ok(())
}

fn parse_source(raw: &str) -> Result<Option<CameraSource>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let source = CameraSource::parse(raw).map_err(|e| anyhow!("camera source: {}", e))?;
    Ok(Some(source))
}

fn spawn_control_reader(events: Sender<AppEvent>) -> Result<()> {
    std::thread::Builder::new()
        .name("control-reader".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ControlCommand>() {
                    Ok(command) => {
                        if events.send(AppEvent::from(command)).is_err() {
                            break;
                        }
                    }
                    Err(err) => log::warn!("{}", err),
                }
            }
            log::debug!("control input closed");
        })
        .context("spawn control reader")?;
    Ok(())
}
