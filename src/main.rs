use anyhow::{Context, Result};
use clap::Parser;
use mattepipe::{config, engine, BackgroundMode, Device, PipelineController, RunConfig, RunStatus};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input image or video file
    #[arg(short, long)]
    source: PathBuf,

    /// Destination folder for results
    #[arg(short, long)]
    destination: PathBuf,

    /// Background type: map, green, white, blur, overlay, "Custom Image"
    #[arg(short, long, default_value = "map")]
    mode: BackgroundMode,

    /// Backdrop still image, required for "Custom Image"
    #[arg(long)]
    custom_image: Option<PathBuf>,

    /// Model checkpoint (ONNX file)
    /// If not provided, the first .onnx file in ./ckpt is used
    #[arg(long)]
    ckpt: Option<PathBuf>,

    /// Inference device
    #[arg(long, default_value = "CPU")]
    device: Device,

    /// Enable FAST mode (smaller model input, lower quality)
    #[arg(long)]
    fast: bool,

    /// Enable precompiled mode (full graph optimization at load time)
    #[arg(long)]
    precompiled: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Mattepipe starting");

    let checkpoint = args
        .ckpt
        .or_else(config::default_checkpoint)
        .context("no checkpoint given and none found in ./ckpt")?;

    let config = RunConfig {
        source: args.source,
        destination: args.destination,
        mode: args.mode,
        custom_image: args.custom_image,
        checkpoint,
        device: args.device,
        fast: args.fast,
        precompiled: args.precompiled,
    };

    if config.is_video_source() {
        run_video(config)
    } else {
        let output = engine::process_image(&config).context("image processing failed")?;
        println!(
            "Background removal for image completed. Result saved to: {}",
            output.display()
        );
        Ok(())
    }
}

fn run_video(config: RunConfig) -> Result<()> {
    let mut controller = PipelineController::new();
    let handle = controller
        .start_run(config)
        .context("failed to start video run")?;

    let abort = handle.abort_signal();
    ctrlc::set_handler(move || {
        tracing::info!("Abort requested");
        abort.request_abort();
    })
    .context("failed to install Ctrl-C handler")?;

    tracing::info!("Press Ctrl+C to abort");

    let mut last_reported = 0;
    loop {
        let progress = handle.poll();
        if progress.frames_done != last_reported {
            last_reported = progress.frames_done;
            println!(
                "Frame Count: {}/{}",
                progress.frames_done, progress.total_frames
            );
        }
        if progress.status.is_terminal() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let progress = handle.wait();
    if let Some(message) = &progress.message {
        println!("{message}");
    }
    if progress.status == RunStatus::Failed {
        anyhow::bail!("background removal failed");
    }
    Ok(())
}
