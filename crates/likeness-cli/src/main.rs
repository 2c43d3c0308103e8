use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use likeness_core::alignment::align_frame;
use likeness_core::normalizer::normalize_patch;
use likeness_core::roi::extract_roi;
use likeness_core::{AlignmentTransform, Frame, Point};
use likeness_hw::Camera;
use std::path::PathBuf;
use std::time::Duration;

#[zbus::proxy(
    interface = "org.freedesktop.Likeness1",
    default_service = "org.freedesktop.Likeness1",
    default_path = "/org/freedesktop/Likeness1"
)]
trait Likeness {
    fn arm(&self) -> zbus::Result<bool>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "likeness", about = "Likeness one-shot face verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Arm the daemon for one attempt on the next frame
    Arm {
        /// Wait for the attempt to finish and print its result
        #[arg(short, long)]
        wait: bool,
        /// Seconds to wait with --wait
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Show daemon status
    Status,
    /// Align a face in an image file and write the canonical patch
    Align {
        /// Input image (any format the image crate reads)
        image: PathBuf,
        /// Left eye centre as X,Y in pixels
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        left_eye: Point,
        /// Right eye centre as X,Y in pixels
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        right_eye: Point,
        /// Output PNG for the canonical patch
        #[arg(short, long, default_value = "patch.png")]
        out: PathBuf,
        /// Inter-eye distance after alignment
        #[arg(long, default_value_t = likeness_core::geometry::DEFAULT_EYE_DISTANCE)]
        eye_distance: f64,
        /// Side of the canonical patch
        #[arg(long, default_value_t = likeness_core::roi::DEFAULT_PATCH_SIZE)]
        patch_size: u32,
    },
    /// Run camera diagnostics
    Test {
        /// V4L2 device to capture from
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Save the captured frame as PNG
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

/// Parse `X,Y` into a point.
fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("invalid coordinate {v:?}"))
    };
    Ok(Point::new(parse(x)?, parse(y)?))
}

async fn proxy() -> Result<LikenessProxy<'static>> {
    let connection = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    let proxy = LikenessProxy::new(&connection)
        .await
        .context("likenessd is not running")?;
    tracing::debug!("connected to likenessd");
    Ok(proxy)
}

async fn status_json(proxy: &LikenessProxy<'_>) -> Result<serde_json::Value> {
    let raw = proxy.status().await?;
    serde_json::from_str(&raw).context("daemon returned malformed status")
}

async fn run_arm(wait: bool, timeout: u64) -> Result<()> {
    let proxy = proxy().await?;
    let before = status_json(&proxy).await?["attempts"].as_u64().unwrap_or(0);
    tracing::debug!(attempts = before, "attempt counter before arming");

    if proxy.arm().await? {
        println!("Armed: the next frame will be attempted");
    } else {
        println!("Already armed");
    }
    if !wait {
        return Ok(());
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout);
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = status_json(&proxy).await?;
        if status["attempts"].as_u64().unwrap_or(0) <= before {
            continue;
        }
        if let Some(error) = status["last_error"].as_str() {
            println!("No score: {error}");
        } else if let Some(similarity) = status["last_similarity"].as_f64() {
            let matched = status["matched"].as_bool().unwrap_or(false);
            println!("Similarity: {similarity:.4} ({})", if matched { "match" } else { "no match" });
        } else {
            println!("Reference enrolled");
        }
        return Ok(());
    }
    bail!("no attempt finished within {timeout}s")
}

async fn run_status() -> Result<()> {
    let status = status_json(&proxy().await?).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn run_align(
    image: PathBuf,
    left_eye: Point,
    right_eye: Point,
    out: PathBuf,
    eye_distance: f64,
    patch_size: u32,
) -> Result<()> {
    let rgb = image::open(&image)
        .with_context(|| format!("failed to read {}", image.display()))?
        .to_rgb8();
    tracing::debug!(path = %image.display(), width = rgb.width(), height = rgb.height(), "loaded image");
    let frame = Frame::from_rgb_image(rgb);

    let transform = AlignmentTransform::from_eyes(left_eye, right_eye, eye_distance)?;
    println!(
        "angle {:.3}°  scale {:.4}  pivot ({:.1}, {:.1})",
        transform.angle_deg, transform.scale, transform.pivot.x, transform.pivot.y
    );

    let aligned = align_frame(&frame, &transform);
    let roi = extract_roi(&aligned, transform.pivot, patch_size)?;
    tracing::debug!(x = roi.origin.0, y = roi.origin.1, size = patch_size, "extracted ROI");
    let patch = normalize_patch(&roi.patch, patch_size);

    patch
        .to_rgb_image()
        .save(&out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "ROI origin ({}, {}), {patch_size}x{patch_size} patch written to {}",
        roi.origin.0,
        roi.origin.1,
        out.display()
    );
    Ok(())
}

fn run_test(device: &str, out: Option<PathBuf>) -> Result<()> {
    println!("Running camera diagnostics...");
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for dev in &devices {
        println!("  {}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }

    let camera = Camera::open(device).with_context(|| format!("failed to open {device}"))?;
    println!(
        "{device}: {}x{} {:?}",
        camera.width,
        camera.height,
        camera.pixel_format()
    );

    let frame = camera.capture_frame()?;
    let dark = likeness_hw::is_dark_frame(&frame, 0.95);
    println!("Captured {}x{} frame{}", frame.width(), frame.height(), if dark { " (dark)" } else { "" });

    if let Some(out) = out {
        frame
            .to_rgb_image()
            .save(&out)
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("Frame written to {}", out.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Arm { wait, timeout } => run_arm(wait, timeout).await,
        Commands::Status => run_status().await,
        Commands::Align {
            image,
            left_eye,
            right_eye,
            out,
            eye_distance,
            patch_size,
        } => run_align(image, left_eye, right_eye, out, eye_distance, patch_size),
        Commands::Test { device, out } => run_test(&device, out),
    }
}
