mod settings;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::Parser;

use emotionlens_core::capture::infrastructure::video_source::VideoSource;
use emotionlens_core::detection::infrastructure::http_detector::HttpDetector;
use emotionlens_core::pipeline::controller::{
    ControllerConfig, DetectorFactory, ModeController, ResultEntry,
};
use emotionlens_core::pipeline::mode::Mode;
use emotionlens_core::shared::constants::{
    DEFAULT_ENDPOINT, DEFAULT_POLL_INTERVAL_MS, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS,
};

use settings::Settings;

/// Live face and emotion annotation for images, videos and cameras.
#[derive(Parser)]
#[command(name = "emotionlens")]
struct Cli {
    /// Input image or video file. Omit to use the camera.
    input: Option<PathBuf>,

    /// Source mode: image, video or camera. Inferred from the input file
    /// extension when omitted.
    #[arg(long)]
    mode: Option<String>,

    /// Detection service base URL (persisted for future runs).
    #[arg(long)]
    endpoint: Option<String>,

    /// Poll period in milliseconds for realtime detection.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    interval_ms: u64,

    /// Stop video/camera analysis after this many seconds.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Keep detecting camera frames on a timer instead of one snapshot.
    #[arg(long)]
    realtime: bool,

    /// Write the annotated image here (image mode).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Rendered overlay width; defaults to the source's native width.
    #[arg(long)]
    display_width: Option<u32>,

    /// Rendered overlay height; defaults to the source's native height.
    #[arg(long)]
    display_height: Option<u32>,

    /// Camera device index.
    #[arg(long, default_value = "0")]
    camera_index: u32,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let endpoint = resolve_endpoint(cli.endpoint.as_deref());
    let mode = resolve_mode(cli.mode.as_deref(), cli.input.as_deref())?;
    let display_size = resolve_display_size(cli.display_width, cli.display_height)?;

    let factory: DetectorFactory = {
        let endpoint = endpoint.clone();
        Box::new(move || Box::new(HttpDetector::new(endpoint.clone())))
    };
    let config = ControllerConfig {
        interval: Duration::from_millis(cli.interval_ms.max(1)),
        display_size,
        ..ControllerConfig::default()
    };
    let mut controller = ModeController::new(factory, config);

    log::info!("using detection service at {endpoint}");

    match mode {
        Mode::Image => {
            let input = cli
                .input
                .as_deref()
                .ok_or("image mode requires an input file")?;
            run_image(&mut controller, input, cli.output.as_deref())
        }
        Mode::Video => {
            let input = cli
                .input
                .as_deref()
                .ok_or("video mode requires an input file")?;
            run_video(&mut controller, input, cli.duration_secs)
        }
        Mode::Camera => run_camera(&mut controller, &cli),
    }
}

/// Applies a `--endpoint` override and persists it, mirroring the
/// save-on-edit behavior of the configuration surface.
fn resolve_endpoint(override_endpoint: Option<&str>) -> String {
    let mut settings = Settings::load();
    if let Some(endpoint) = override_endpoint {
        let trimmed = endpoint.trim();
        settings.endpoint = if trimmed.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            trimmed.to_string()
        };
        settings.save();
    }
    settings.endpoint
}

fn resolve_mode(mode: Option<&str>, input: Option<&Path>) -> Result<Mode, Box<dyn std::error::Error>> {
    if let Some(mode) = mode {
        return Ok(mode.parse::<Mode>()?);
    }
    let Some(input) = input else {
        return Ok(Mode::Camera);
    };
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(Mode::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Ok(Mode::Video)
    } else {
        Err(format!(
            "cannot infer mode from '{}'; pass --mode",
            input.display()
        )
        .into())
    }
}

fn resolve_display_size(
    width: Option<u32>,
    height: Option<u32>,
) -> Result<Option<(u32, u32)>, Box<dyn std::error::Error>> {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok(Some((w, h))),
        (None, None) => Ok(None),
        _ => Err("--display-width and --display-height must be given together and non-zero".into()),
    }
}

fn run_image(
    controller: &mut ModeController,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    controller.load_image(input)?;
    let count = controller.analyze_once()?;
    println!("detected {count} face(s) in {}", input.display());
    print_results(controller.results(), None);

    if let Some(output) = output {
        let annotated = compose_annotated(controller, input)?;
        annotated.save(output)?;
        println!("annotated image written to {}", output.display());
    }
    Ok(())
}

fn compose_annotated(
    controller: &ModeController,
    input: &Path,
) -> Result<image::RgbImage, Box<dyn std::error::Error>> {
    let surface = controller
        .surface(Mode::Image)
        .ok_or("no overlay was rendered")?;
    let base = image::open(input)?.to_rgb8();
    let base = if base.dimensions() == (surface.width(), surface.height()) {
        base
    } else {
        image::imageops::resize(
            &base,
            surface.width(),
            surface.height(),
            image::imageops::FilterType::Triangle,
        )
    };
    Ok(surface.composite_over(&base))
}

fn run_video(
    controller: &mut ModeController,
    input: &Path,
    duration_secs: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = VideoSource::open(input)?;
    println!(
        "video loaded: {} ({:.1}s at {:.1} fps)",
        input.display(),
        source.duration_secs(),
        source.fps()
    );
    controller.set_video_source(Arc::new(Mutex::new(source)));
    controller.start_video_analysis()?;

    poll_loop(controller, duration_secs);
    controller.stop_video_analysis();
    Ok(())
}

fn run_camera(
    controller: &mut ModeController,
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    controller.start_camera(cli.camera_index)?;

    if cli.realtime {
        controller.set_realtime(true)?;
        poll_loop(controller, cli.duration_secs);
    } else {
        let count = controller.analyze_once()?;
        println!("detected {count} face(s)");
        print_results(controller.results(), None);
    }

    controller.stop_camera();
    Ok(())
}

/// Drains session events until the session ends or the deadline passes,
/// printing a timestamped result line per handled detection.
fn poll_loop(controller: &mut ModeController, duration_secs: Option<u64>) {
    let started = Instant::now();
    let deadline = duration_secs.map(|secs| started + Duration::from_secs(secs));
    let mut last_status: Option<String> = None;

    loop {
        if controller.pump_events() > 0 {
            print_results(controller.results(), Some(started.elapsed()));
        }
        if let Some(status) = controller.status() {
            if last_status.as_deref() != Some(status) {
                println!("[{:6.1}s] {status}", started.elapsed().as_secs_f64());
                last_status = Some(status.to_string());
            }
        }
        if !controller.is_polling() {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

fn print_results(results: &[ResultEntry], elapsed: Option<Duration>) {
    let stamp = elapsed
        .map(|e| format!("[{:6.1}s] ", e.as_secs_f64()))
        .unwrap_or_default();
    if results.is_empty() {
        println!("{stamp}no faces detected");
        return;
    }
    let summary: Vec<String> = results
        .iter()
        .map(|entry| match entry.confidence {
            Some(confidence) => format!("{} {:.1}%", entry.emotion, confidence * 100.0),
            None => entry.emotion.clone(),
        })
        .collect();
    println!("{stamp}{} face(s): {}", results.len(), summary.join(" | "));
}
