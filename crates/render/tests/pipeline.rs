use framelink_backend::trace::{TRACE_FILE_NAME, TraceEvent, TraceRecorder};
use framelink_backend::{
    CollectingStatusHandler, DeviceConfig, DeviceLimits, ObjectKind, Severity, library,
};
use framelink_common::{Channel, SurfaceExtent};
use framelink_render::{
    CpuDisplay, DisplaySink, ResizeOutcome, SurfaceSizeSender, Viewer, ViewerConfig, ViewerError,
    surface_size_channel,
};

fn viewer(
    extent: SurfaceExtent,
    config: DeviceConfig,
) -> (Viewer<CpuDisplay>, SurfaceSizeSender, CollectingStatusHandler) {
    let log = CollectingStatusHandler::new();
    let mut backend = library::load("reference", config, Box::new(log.clone())).unwrap();
    let world = framelink_scenes::triangle_pair(backend.as_mut()).unwrap();
    let (tx, rx) = surface_size_channel();
    let viewer = Viewer::new(
        backend,
        world,
        CpuDisplay::new(extent),
        rx,
        &ViewerConfig {
            extent,
            ..ViewerConfig::default()
        },
    )
    .unwrap();
    (viewer, tx, log)
}

fn committed_aspect(viewer: &Viewer<CpuDisplay>) -> f32 {
    viewer
        .backend()
        .committed(viewer.camera(), "aspect")
        .and_then(|v| v.as_float())
        .unwrap()
}

fn committed_size(viewer: &Viewer<CpuDisplay>) -> SurfaceExtent {
    viewer
        .backend()
        .committed(viewer.frame_target(), "size")
        .and_then(|v| v.as_extent())
        .unwrap()
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[test]
fn resize_720p_to_800x600() {
    let (mut viewer, tx, log) = viewer(SurfaceExtent::new(1280, 720), DeviceConfig::default());
    let first = viewer.frame().unwrap();
    assert_eq!(first.resize, ResizeOutcome::Unchanged);
    assert_eq!(first.extent, SurfaceExtent::new(1280, 720));

    tx.notify(800, 600);
    let stats = viewer.frame().unwrap();
    let target = SurfaceExtent::new(800, 600);
    assert_eq!(stats.resize, ResizeOutcome::Resized(target));
    assert_eq!(stats.extent, target);
    assert!((committed_aspect(&viewer) - 4.0 / 3.0).abs() < 1e-6);
    assert_eq!(committed_size(&viewer), target);
    assert_eq!(viewer.display().extent(), target);
    assert_eq!(viewer.display().reallocations(), 1);

    // The flag was cleared: the next frame is a plain one.
    assert_eq!(viewer.frame().unwrap().resize, ResizeOutcome::Unchanged);
    assert!(log.at_least(Severity::Warning).is_empty());
}

#[test]
fn zero_size_is_skipped_until_a_real_size_arrives() {
    let initial = SurfaceExtent::new(64, 36);
    let (mut viewer, tx, _) = viewer(initial, DeviceConfig::default());
    viewer.frame().unwrap();
    let camera_commits = viewer.backend().commit_count(viewer.camera());
    let frame_commits = viewer.backend().commit_count(viewer.frame_target());

    tx.notify(0, 0);
    let stats = viewer.frame().unwrap();
    assert_eq!(stats.resize, ResizeOutcome::Skipped(SurfaceExtent::new(0, 0)));
    assert_eq!(stats.extent, initial);
    assert_eq!(viewer.backend().commit_count(viewer.camera()), camera_commits);
    assert_eq!(viewer.backend().commit_count(viewer.frame_target()), frame_commits);

    tx.notify(0, 50);
    viewer.frame().unwrap();
    assert_eq!(viewer.extent(), initial);
    assert_eq!(viewer.display().extent(), initial);

    tx.notify(40, 30);
    let stats = viewer.frame().unwrap();
    assert_eq!(stats.resize, ResizeOutcome::Resized(SurfaceExtent::new(40, 30)));
    assert_eq!(viewer.backend().commit_count(viewer.camera()), camera_commits + 1);
}

#[test]
fn fatal_error_stops_frames() {
    let config = DeviceConfig {
        limits: DeviceLimits {
            max_frame_extent: SurfaceExtent::new(256, 256),
        },
        ..DeviceConfig::default()
    };
    let (mut viewer, tx, log) = viewer(SurfaceExtent::new(64, 64), config);
    viewer.frame().unwrap();
    assert_eq!(viewer.display().presented(), 1);

    tx.notify(4096, 64);
    let err = viewer.frame().unwrap_err();
    assert!(err.is_fatal());
    assert!(viewer.is_stopped());
    assert_eq!(log.at_least(Severity::Fatal).len(), 1);

    tx.notify(32, 32);
    assert!(matches!(viewer.frame(), Err(ViewerError::Stopped)));
    assert_eq!(viewer.display().presented(), 1);

    let display = viewer.shutdown().unwrap();
    assert_eq!(display.presented(), 1);
}

#[test]
fn frames_without_resize_commit_nothing() {
    let (mut viewer, _tx, _) = viewer(SurfaceExtent::new(48, 32), DeviceConfig::default());
    let camera_commits = viewer.backend().commit_count(viewer.camera());
    let frame_commits = viewer.backend().commit_count(viewer.frame_target());
    for _ in 0..3 {
        assert_eq!(viewer.frame().unwrap().resize, ResizeOutcome::Unchanged);
    }
    assert_eq!(viewer.backend().commit_count(viewer.camera()), camera_commits);
    assert_eq!(viewer.backend().commit_count(viewer.frame_target()), frame_commits);
}

#[test]
fn two_frames_are_independent_and_identical() {
    let (mut viewer, _tx, _) = viewer(SurfaceExtent::new(40, 30), DeviceConfig::default());
    let a = viewer.frame().unwrap();
    let first = viewer.display().texels().to_vec();
    let b = viewer.frame().unwrap();

    assert_eq!((a.index, b.index), (0, 1));
    assert_eq!(a.extent, b.extent);
    assert_eq!(viewer.display().texels(), first.as_slice());
    assert_eq!(viewer.display().presented(), 2);
    assert_eq!(viewer.display().sub_image_updates(), 2);
    assert_eq!(viewer.frames_presented(), 2);
}

#[test]
fn demo_world_is_visible_in_the_color_channel() {
    let (mut viewer, _tx, _) = viewer(SurfaceExtent::new(64, 64), DeviceConfig::default());
    viewer.frame().unwrap();
    let background = viewer.display().texels()[0];
    assert!(viewer.display().texels().iter().any(|px| *px != background));
}

#[test]
fn map_unmap_pairs_across_random_resizes() {
    let tmp = tempfile::tempdir().unwrap();
    let config = DeviceConfig {
        trace_dir: Some(tmp.path().to_path_buf()),
        ..DeviceConfig::default()
    };
    let start = SurfaceExtent::new(32, 18);
    let (mut viewer, tx, log) = viewer(start, config);

    let mut rng = 0x00f7_a3e1_u64;
    let mut expected = start;
    const FRAMES: usize = 40;
    for _ in 0..FRAMES {
        let mut latest = None;
        for _ in 0..splitmix64(&mut rng) % 3 {
            let r = splitmix64(&mut rng);
            let size = SurfaceExtent::new((r % 48) as u32, ((r >> 16) % 48) as u32);
            tx.notify(size.width, size.height);
            latest = Some(size);
        }
        if let Some(size) = latest.filter(|s| !s.is_empty()) {
            expected = size;
        }

        let stats = viewer.frame().unwrap();
        assert_eq!(stats.extent, expected);
        assert_eq!(committed_size(&viewer), expected);
        assert_eq!(viewer.display().extent(), expected);
        let aspect = expected.width as f32 / expected.height as f32;
        assert!((committed_aspect(&viewer) - aspect).abs() < 1e-6);
    }
    assert!(log.at_least(Severity::Error).is_empty());

    let events = TraceRecorder::read(tmp.path().join(TRACE_FILE_NAME)).unwrap();
    let mut mapped: Option<Channel> = None;
    let mut maps = 0;
    for event in &events {
        match event {
            TraceEvent::Render { .. } => assert_eq!(mapped, None, "render while mapped"),
            TraceEvent::Map { channel, .. } => {
                assert_eq!(mapped, None, "map while mapped");
                mapped = Some(*channel);
                maps += 1;
            }
            TraceEvent::Unmap { channel, .. } => {
                assert_eq!(mapped, Some(*channel), "unmap without map");
                mapped = None;
            }
            _ => {}
        }
    }
    assert_eq!(mapped, None);
    assert_eq!(maps, FRAMES);
}

#[test]
fn zero_size_at_startup_is_refused() {
    let log = CollectingStatusHandler::new();
    let mut backend =
        library::load("reference", DeviceConfig::default(), Box::new(log.clone())).unwrap();
    let world = framelink_scenes::triangle_pair(backend.as_mut()).unwrap();
    let (_tx, rx) = surface_size_channel();
    let empty = SurfaceExtent::new(0, 0);
    let result = Viewer::new(
        backend,
        world,
        CpuDisplay::new(empty),
        rx,
        &ViewerConfig {
            extent: empty,
            ..ViewerConfig::default()
        },
    );
    match result {
        Err(e) => {
            assert!(matches!(e, ViewerError::EmptyExtent(_)));
            assert!(e.is_fatal());
        }
        Ok(_) => panic!("viewer started on a 0x0 surface"),
    }
}

#[test]
fn rejected_frame_commit_fails_startup() {
    let log = CollectingStatusHandler::new();
    let mut backend =
        library::load("reference", DeviceConfig::default(), Box::new(log.clone())).unwrap();
    // A material where the frame expects a world fails frame validation.
    let not_a_world = backend.new_object(ObjectKind::Material, "matte").unwrap();
    let (_tx, rx) = surface_size_channel();
    let extent = SurfaceExtent::new(16, 16);
    let result = Viewer::new(
        backend,
        not_a_world,
        CpuDisplay::new(extent),
        rx,
        &ViewerConfig {
            extent,
            ..ViewerConfig::default()
        },
    );
    match result {
        Err(ViewerError::Rejected(object)) => assert_eq!(object.kind, ObjectKind::Frame),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("viewer started without a committed frame"),
    }
    assert_eq!(log.at_least(Severity::Error).len(), 1);
}
