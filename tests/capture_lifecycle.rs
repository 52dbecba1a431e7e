//! End-to-end lifecycle tests over the mock frame source.
//!
//! The mock signals frame availability through a pipe, so these tests
//! drive the worker's real poll/dispatch path without hardware.

use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;
use shutter::capture::mock::{FrameTrigger, MockSource, CHROMA_EVEN, CHROMA_ODD};
use shutter::{CameraError, DeviceController, DeviceState, PixelFormat};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const FRAME_LEN: usize = 460_800;

fn started_device() -> (DeviceController<MockSource>, FrameTrigger) {
    let (source, trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source);
    device.initialize().expect("initialize");
    device
        .start_capture(WIDTH, HEIGHT, PixelFormat::Nv12, false)
        .expect("start");
    (device, trigger)
}

/// Poll until the worker has delivered at least `count` frames.
fn wait_for_frames(device: &DeviceController<MockSource>, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while device.frames_captured() < count {
        assert!(Instant::now() < deadline, "no frame within deadline");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn preview_lifecycle_end_to_end() {
    let (mut device, mut trigger) = started_device();
    assert_eq!(device.state(), DeviceState::Started);

    trigger.trigger().expect("trigger");
    wait_for_frames(&device, 1);

    let mut buf = vec![0u8; FRAME_LEN];
    device
        .read_current_frame(&mut buf, PixelFormat::Nv12)
        .expect("read frame");
    // First mock frame: luma plane carries sequence number zero.
    assert!(buf[..(WIDTH * HEIGHT) as usize].iter().all(|&b| b == 0));

    device.stop_capture().expect("stop");
    assert_eq!(device.state(), DeviceState::Stopped);
    assert!(matches!(
        device.read_current_frame(&mut buf, PixelFormat::Nv12),
        Err(CameraError::NotStarted)
    ));
}

#[test]
fn read_before_start_fails() {
    let (source, _trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source);
    device.initialize().expect("initialize");

    let mut buf = vec![0u8; FRAME_LEN];
    assert!(matches!(
        device.read_current_frame(&mut buf, PixelFormat::Nv12),
        Err(CameraError::NotStarted)
    ));
}

#[test]
fn read_before_first_frame_reports_no_frame() {
    let (mut device, _trigger) = started_device();
    let mut buf = vec![0u8; FRAME_LEN];
    assert!(matches!(
        device.read_current_frame(&mut buf, PixelFormat::Nv12),
        Err(CameraError::NoFrame)
    ));
    device.stop_capture().expect("stop");
}

#[test]
fn stop_before_start_is_a_noop_success() {
    let (source, _trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source);
    device.initialize().expect("initialize");
    device.stop_capture().expect("stop is a no-op");
    assert_eq!(device.state(), DeviceState::Initialized);
}

#[test]
fn start_requires_initialize() {
    let (source, _trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source);
    assert!(matches!(
        device.start_capture(WIDTH, HEIGHT, PixelFormat::Nv12, false),
        Err(CameraError::NotInitialized)
    ));
}

#[test]
fn initialize_twice_is_idempotent() {
    let (source, _trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source);
    device.initialize().expect("first initialize");
    device.initialize().expect("second initialize");
    assert_eq!(device.state(), DeviceState::Initialized);
}

#[test]
fn unsupported_format_leaves_state_unchanged() {
    let (source, mut trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source);
    device.initialize().expect("initialize");

    assert!(matches!(
        device.start_capture(WIDTH, HEIGHT, PixelFormat::Mjpeg, false),
        Err(CameraError::UnsupportedFormat(PixelFormat::Mjpeg))
    ));
    assert_eq!(device.state(), DeviceState::Initialized);

    // A valid start still works afterwards.
    device
        .start_capture(WIDTH, HEIGHT, PixelFormat::Nv12, false)
        .expect("start");
    trigger.trigger().expect("trigger");
    wait_for_frames(&device, 1);
    device.stop_capture().expect("stop");
}

#[test]
fn zero_resolution_is_rejected() {
    let (source, _trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source);
    device.initialize().expect("initialize");
    assert!(matches!(
        device.start_capture(0, HEIGHT, PixelFormat::Nv12, false),
        Err(CameraError::InvalidArgument(_))
    ));
}

#[test]
fn double_start_reports_already_started() {
    let (mut device, _trigger) = started_device();
    assert!(matches!(
        device.start_capture(WIDTH, HEIGHT, PixelFormat::Nv12, false),
        Err(CameraError::AlreadyStarted)
    ));
    device.stop_capture().expect("stop");
}

#[test]
fn chroma_order_round_trip() {
    let (mut device, mut trigger) = started_device();
    trigger.trigger().expect("trigger");
    wait_for_frames(&device, 1);

    let luma = (WIDTH * HEIGHT) as usize;
    let mut same = vec![0u8; FRAME_LEN];
    device
        .read_current_frame(&mut same, PixelFormat::Nv12)
        .expect("read same order");
    let mut swapped = vec![0u8; FRAME_LEN];
    device
        .read_current_frame(&mut swapped, PixelFormat::Nv21)
        .expect("read swapped order");

    assert_eq!(same[..luma], swapped[..luma]);
    for pair in same[luma..].chunks_exact(2) {
        assert_eq!(pair, [CHROMA_EVEN, CHROMA_ODD]);
    }
    for pair in swapped[luma..].chunks_exact(2) {
        assert_eq!(pair, [CHROMA_ODD, CHROMA_EVEN]);
    }

    // Planar output would need a real converter.
    let mut planar = vec![0u8; FRAME_LEN];
    assert!(matches!(
        device.read_current_frame(&mut planar, PixelFormat::Yu12),
        Err(CameraError::UnsupportedFormat(PixelFormat::Yu12))
    ));
    device.stop_capture().expect("stop");
}

#[test]
fn one_burst_captures_exactly_one_frame() {
    let (source, mut trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source);
    device.initialize().expect("initialize");
    device
        .start_capture(WIDTH, HEIGHT, PixelFormat::Nv12, true)
        .expect("start");

    trigger.trigger_many(3).expect("trigger");
    wait_for_frames(&device, 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(device.frames_captured(), 1);

    device.stop_capture().expect("stop");
    assert_eq!(device.state(), DeviceState::Stopped);
}

#[test]
fn restart_after_stop_delivers_again() {
    let (mut device, mut trigger) = started_device();
    trigger.trigger().expect("trigger");
    wait_for_frames(&device, 1);
    device.stop_capture().expect("stop");

    device
        .start_capture(WIDTH, HEIGHT, PixelFormat::Nv21, false)
        .expect("restart");
    assert_eq!(device.frames_captured(), 0);
    trigger.trigger().expect("trigger");
    wait_for_frames(&device, 1);

    let mut buf = vec![0u8; FRAME_LEN];
    device
        .read_current_frame(&mut buf, PixelFormat::Nv21)
        .expect("read after restart");
    device.stop_capture().expect("stop");
}

#[test]
fn source_failure_surfaces_on_stop() {
    let (source, mut trigger) = MockSource::new().expect("mock pipe");
    let mut device = DeviceController::new(source.fail_after(0));
    device.initialize().expect("initialize");
    device
        .start_capture(WIDTH, HEIGHT, PixelFormat::Nv12, false)
        .expect("start");

    trigger.trigger().expect("trigger");
    thread::sleep(Duration::from_millis(50));

    assert!(matches!(
        device.stop_capture(),
        Err(CameraError::Io(_))
    ));
    assert_eq!(device.state(), DeviceState::Stopped);
    assert_eq!(device.frames_captured(), 0);
}

#[test]
#[serial]
fn stop_waits_for_still_capture_to_finish() {
    let (mut device, mut trigger) = started_device();
    trigger.trigger().expect("trigger");
    wait_for_frames(&device, 1);

    let guard = device.begin_still_capture().expect("still fence");
    assert!(matches!(
        device.begin_still_capture(),
        Err(CameraError::StillInProgress)
    ));

    let hold = Duration::from_millis(150);
    let orchestrator = thread::spawn(move || {
        thread::sleep(hold);
        drop(guard);
    });

    let begun = Instant::now();
    device.stop_capture().expect("stop");
    assert!(begun.elapsed() >= hold, "stop did not wait for the fence");
    orchestrator.join().expect("orchestrator thread");
}

#[test]
#[serial]
fn stop_immediately_after_start_joins_cleanly() {
    // Exercises the loop-running handshake: stop issued right after start
    // must wait for the worker to reach its poll before signalling.
    for _ in 0..20 {
        let (source, _trigger) = MockSource::new().expect("mock pipe");
        let mut device = DeviceController::new(source);
        device.initialize().expect("initialize");
        device
            .start_capture(WIDTH, HEIGHT, PixelFormat::Nv12, false)
            .expect("start");
        device.stop_capture().expect("stop");
        assert_eq!(device.state(), DeviceState::Stopped);
    }
}
