//! server_probe - check a detection server without a camera
//!
//! Queries `/health`, `/` and `/classes` and optionally sends one still image
//! to `/detect`, printing what the server returned.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};
use std::time::Duration;

use live_detect::camera::DEFAULT_JPEG_QUALITY;
use live_detect::overlay::format_label;
use live_detect::{ClientConfig, DetectionClient, EncodedImage};

#[derive(Parser, Debug)]
#[command(author, version, about = "Probe a detection server's endpoints")]
struct Args {
    /// Detection server base URL (defaults to the configured one).
    #[arg(long, env = "LIVE_DETECT_SERVER_URL")]
    server_url: Option<String>,

    /// Request timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Also list the classes the model knows.
    #[arg(long)]
    classes: bool,

    /// Image to run through `/detect`.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Minimum confidence to print for `--image`, in percent.
    #[arg(long, default_value_t = 25)]
    confidence: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let server_url = match args.server_url {
        Some(url) => url,
        None => ClientConfig::load()?.server_url,
    };
    let client = DetectionClient::new(&server_url, Duration::from_millis(args.timeout_ms))?;

    let health = client
        .health()
        .map_err(|e| anyhow!("{} unreachable: {}", client.base_url(), e))?;
    println!(
        "health: {} (model: {})",
        health.status,
        health.model.as_deref().unwrap_or("unknown")
    );

    match client.server_info() {
        Ok(info) => println!("server ip: {}", info.server_ip),
        Err(e) => log::warn!("server info unavailable: {}", e),
    }

    if args.classes {
        let classes = client.classes().map_err(|e| anyhow!("classes: {}", e))?;
        println!("classes: {}", classes.len());
        for (id, name) in &classes.classes {
            println!("  {:>3} {}", id, name);
        }
    }

    if let Some(path) = args.image {
        let image = load_jpeg(&path)?;
        let response = client
            .detect(&image)
            .map_err(|e| anyhow!("detect: {}", e))?;
        if !response.result.success {
            return Err(anyhow!(
                "server could not process {}: {}",
                path.display(),
                response.result.error.as_deref().unwrap_or("no reason given")
            ));
        }
        println!(
            "detect: {} objects in {}ms",
            response.result.count(),
            response.latency.as_millis()
        );
        let threshold = args.confidence.min(100) as f32 / 100.0;
        for det in response.result.filtered(threshold) {
            println!(
                "  {} at ({:.0},{:.0})-({:.0},{:.0})",
                format_label(det),
                det.bbox.x1,
                det.bbox.y1,
                det.bbox.x2,
                det.bbox.y2
            );
        }
    }
    Ok(())
}

fn load_jpeg(path: &Path) -> Result<EncodedImage> {
    let raster = image::open(path)
        .with_context(|| format!("open image {}", path.display()))?
        .into_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, DEFAULT_JPEG_QUALITY)
        .encode_image(&raster)
        .with_context(|| format!("encode {}", path.display()))?;
    Ok(EncodedImage::new(bytes, raster.width(), raster.height()))
}
