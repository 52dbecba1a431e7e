//! Preview demo: capture from a V4L2 device and report frame delivery.

use std::path::Path;
use std::thread;
use std::time::Duration;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::{info, warn};

use shutter::capture::v4l2;
use shutter::{CameraError, CaptureConfig, DeviceController, V4l2Source};

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shutter=debug".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let mut config = CaptureConfig::default();
    if let Some(path) = std::env::args().nth(1) {
        config.device = path;
    } else if !Path::new(&config.device).exists() {
        config.device = v4l2::find_device(config.format)?;
    }
    info!(?config, "starting preview");

    let source = V4l2Source::open(&config)?;
    let mut device = DeviceController::new(source);
    device.set_wait_timeout(Some(Duration::from_millis(config.wait_timeout_ms)));
    device.initialize()?;
    device.start_capture(config.width, config.height, config.format, false)?;

    let frame_size = config
        .format
        .frame_size(config.width, config.height)
        .ok_or_else(|| eyre!("format {:?} has no raw frame size", config.format))?;
    let mut frame = vec![0u8; frame_size];

    let mut delivered = 0u32;
    for _ in 0..150 {
        thread::sleep(Duration::from_millis(33));
        match device.read_current_frame(&mut frame, config.format) {
            Ok(()) => delivered += 1,
            Err(CameraError::NoFrame) => continue,
            Err(e) => {
                warn!(error = %e, "frame read failed");
                break;
            }
        }
    }
    info!(
        delivered,
        captured = device.frames_captured(),
        "preview finished"
    );

    device.stop_capture()?;
    Ok(())
}
