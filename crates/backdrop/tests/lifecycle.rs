use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backdrop::device::UniformValue;
use backdrop::headless::{FailurePlan, ManualHost};
use backdrop::{
    BackgroundConfig, BackgroundError, BackgroundStatus, ContextOptions, DisplaySize, DrawError,
    EventKind, HostEnvironment, HostEvent, PowerPreference, ShaderBackground, ShaderStage,
    SurfaceSize, TickOutcome,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

const FRAME: Duration = Duration::from_millis(40);

#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn with_warn_count<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, counter.count())
}

fn host() -> ManualHost {
    ManualHost::new(DisplaySize::new(800.0, 600.0), 2.0)
}

fn vec2(value: Option<UniformValue>) -> [f32; 2] {
    match value {
        Some(UniformValue::Vec2(v)) => v,
        other => panic!("expected vec2 uniform, got {other:?}"),
    }
}

#[test]
fn mount_draws_at_scaled_backing_resolution() {
    let host = host();
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());

    assert_eq!(background.status(), &BackgroundStatus::Running);
    assert_eq!(
        background.host().subscriptions(),
        vec![EventKind::Resize, EventKind::PointerMove]
    );
    assert_eq!(background.pump_frame(FRAME), Some(TickOutcome::Drawn));

    let journal = journal.borrow();
    let draw = journal.draws.last().expect("one draw");
    assert_eq!(draw.backing, SurfaceSize::new(800, 600));
    assert_eq!(draw.viewport, draw.backing);
    assert_eq!(vec2(draw.uniform("resolution")), [800.0, 600.0]);
    assert_eq!(draw.uniform("time"), Some(UniformValue::Float(0.04)));
}

#[test]
fn resize_keeps_backing_and_viewport_in_step() {
    let host = host();
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());
    background.pump_frame(FRAME);

    background
        .host_mut()
        .set_viewport(DisplaySize::new(1024.0, 768.0));
    background.handle_event(HostEvent::Resized);
    for _ in 0..3 {
        background.pump_frame(FRAME);
    }
    background.host_mut().set_density(1.0);
    background.handle_event(HostEvent::Resized);
    background.pump_frame(FRAME);

    let journal = journal.borrow();
    assert_eq!(journal.draws.len(), 5);
    for draw in &journal.draws {
        assert_eq!(draw.viewport, draw.backing);
        assert_eq!(
            vec2(draw.uniform("resolution")),
            [draw.backing.width as f32, draw.backing.height as f32]
        );
    }
    assert_eq!(journal.draws[1].backing, SurfaceSize::new(1024, 768));
    assert_eq!(journal.draws[4].backing, SurfaceSize::new(512, 384));
}

#[test]
fn same_backing_resize_still_reconfigures_the_surface() {
    let host = ManualHost::new(DisplaySize::new(800.0, 600.0), 1.0);
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());
    assert_eq!(background.pump_frame(FRAME), Some(TickOutcome::Drawn));

    // 801 * 0.5 floors to the same 400 pixel backing.
    background
        .host_mut()
        .set_viewport(DisplaySize::new(801.0, 600.0));
    background.handle_event(HostEvent::Resized);
    assert_eq!(background.pump_frame(FRAME), Some(TickOutcome::Drawn));

    let journal = journal.borrow();
    assert_eq!(
        journal.resizes,
        vec![SurfaceSize::new(400, 300), SurfaceSize::new(400, 300)]
    );
    assert_eq!(journal.draws.len(), 2);
}

#[test]
fn vanishing_frame_rate_is_clamped_instead_of_panicking() {
    let config = BackgroundConfig {
        target_fps: 1e-30,
        ..BackgroundConfig::default()
    };
    let mut background = ShaderBackground::mount(host(), config);

    assert_eq!(background.status(), &BackgroundStatus::Running);
    assert_eq!(background.pump_frame(FRAME), Some(TickOutcome::Drawn));
    assert_eq!(background.pump_frame(FRAME), Some(TickOutcome::Throttled));
    assert_eq!(
        background.next_frame_due(),
        Some(FRAME + backdrop::pacing::MAX_FRAME_INTERVAL)
    );
}

#[test]
fn resize_to_nothing_keeps_the_previous_backing() {
    let host = host();
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());
    background.pump_frame(FRAME);

    background.host_mut().set_viewport(DisplaySize::new(0.0, 0.0));
    background.handle_event(HostEvent::Resized);
    assert_eq!(background.pump_frame(FRAME), Some(TickOutcome::Drawn));

    let journal = journal.borrow();
    assert_eq!(journal.draws[1].backing, SurfaceSize::new(800, 600));
}

#[test]
fn queued_frame_after_unmount_does_not_draw() {
    let host = host();
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());
    let token = background.host().pending_frames()[0];

    background.unmount();

    assert_eq!(background.on_frame(token, FRAME), TickOutcome::Ignored);
    assert!(background.host().pending_frames().is_empty());
    assert!(background.host().cancelled_frames().contains(&token));
    assert!(journal.borrow().draws.is_empty());
}

#[test]
fn unmount_is_idempotent_and_releases_everything_once() {
    let host = host();
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());
    for _ in 0..4 {
        background.pump_frame(FRAME);
    }

    background.unmount();
    background.unmount();
    assert_eq!(background.status(), &BackgroundStatus::Disposed);
    assert!(background.host().subscriptions().is_empty());
    assert!(background.context().is_none());
    assert_eq!(background.pump_frame(FRAME), None);
    drop(background);

    let journal = journal.borrow();
    assert!(!journal.created.is_empty());
    assert_eq!(journal.live_objects(), 0);
    assert_eq!(journal.double_deletes(), 0);
    assert_eq!(journal.deletions.len(), journal.created.len());
}

#[test]
fn dropping_a_running_background_releases_it() {
    let host = host();
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());
    background.pump_frame(FRAME);
    drop(background);

    let journal = journal.borrow();
    assert_eq!(journal.live_objects(), 0);
    assert_eq!(journal.double_deletes(), 0);
}

#[test]
fn unsupported_context_degrades_with_one_warning() {
    let mut host = host();
    host.set_supported(false);
    let journal = host.journal();

    let (mut background, warnings) =
        with_warn_count(|| ShaderBackground::mount(host, BackgroundConfig::default()));

    assert_eq!(warnings, 1);
    assert_eq!(
        background.status(),
        &BackgroundStatus::Unavailable(BackgroundError::ContextUnsupported)
    );
    assert!(background.host().subscriptions().is_empty());
    assert!(background.host().pending_frames().is_empty());
    assert_eq!(background.pump_frame(FRAME), None);
    assert_eq!(journal.borrow().contexts_created, 0);
}

#[test]
fn link_failure_leaves_no_live_objects() {
    let mut host = host();
    host.set_failures(FailurePlan {
        fail_link: true,
        ..FailurePlan::default()
    });
    let journal = host.journal();

    let (background, warnings) =
        with_warn_count(|| ShaderBackground::mount(host, BackgroundConfig::default()));

    assert_eq!(warnings, 1);
    assert!(matches!(
        background.status(),
        BackgroundStatus::Unavailable(BackgroundError::ProgramLink { .. })
    ));
    assert!(background.context().is_none());
    let journal = journal.borrow();
    assert_eq!(journal.live_objects(), 0);
    assert_eq!(journal.double_deletes(), 0);
    assert!(journal.draws.is_empty());
}

#[test]
fn fragment_compile_failure_is_reported_by_stage() {
    let mut host = host();
    host.set_failures(FailurePlan {
        fail_compile: Some(ShaderStage::Fragment),
        ..FailurePlan::default()
    });
    let journal = host.journal();

    let background = ShaderBackground::mount(host, BackgroundConfig::default());

    assert!(matches!(
        background.status(),
        BackgroundStatus::Unavailable(BackgroundError::ShaderCompile {
            stage: ShaderStage::Fragment,
            ..
        })
    ));
    assert_eq!(journal.borrow().live_objects(), 0);
}

#[test]
fn zero_size_mount_waits_for_a_resize() {
    let host = ManualHost::new(DisplaySize::new(0.0, 0.0), 1.0);
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());

    assert_eq!(background.status(), &BackgroundStatus::AwaitingSize);
    assert_eq!(background.host().subscriptions(), vec![EventKind::Resize]);
    assert_eq!(journal.borrow().contexts_created, 0);
    background.handle_event(HostEvent::PointerMoved { x: 10.0, y: 10.0 });
    assert_eq!(background.pump_frame(FRAME), None);

    background
        .host_mut()
        .set_viewport(DisplaySize::new(400.0, 300.0));
    background.handle_event(HostEvent::Resized);

    assert_eq!(background.status(), &BackgroundStatus::Running);
    assert_eq!(background.surface().backing(), SurfaceSize::new(200, 150));
    assert_eq!(
        background.host().subscriptions(),
        vec![EventKind::Resize, EventKind::PointerMove]
    );
    assert_eq!(background.pump_frame(FRAME), Some(TickOutcome::Drawn));
    assert_eq!(journal.borrow().contexts_created, 1);
}

#[test]
fn sixty_hertz_host_draws_about_thirty_frames() {
    let mut background = ShaderBackground::mount(host(), BackgroundConfig::default());
    let step = Duration::from_micros(16_667);

    let drawn = (0..60)
        .filter_map(|_| background.pump_frame(step))
        .filter(|outcome| *outcome == TickOutcome::Drawn)
        .count();

    assert!((29..=31).contains(&drawn), "drew {drawn} frames");
    assert_eq!(background.render_loop().frames_drawn(), drawn as u64);
}

#[test]
fn pointer_moves_are_smoothed_into_the_move_uniform() {
    let host = host();
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());

    background.handle_event(HostEvent::PointerMoved { x: 200.0, y: 100.0 });
    background.pump_frame(FRAME);
    background.pump_frame(FRAME);

    let journal = journal.borrow();
    let first = vec2(journal.draws[0].uniform("move"));
    let second = vec2(journal.draws[1].uniform("move"));
    assert!((first[0] - 10.0).abs() < 1e-4 && (first[1] - 5.0).abs() < 1e-4);
    assert!((second[0] - 19.5).abs() < 1e-4 && (second[1] - 9.75).abs() < 1e-4);
}

#[test]
fn lost_surface_recovers_on_the_next_frame() {
    let mut background = ShaderBackground::mount(host(), BackgroundConfig::default());
    background.host_mut().fail_next_draw(DrawError::Lost);

    assert_eq!(
        background.pump_frame(FRAME),
        Some(TickOutcome::Dropped(DrawError::Lost))
    );
    assert_eq!(background.pump_frame(FRAME), Some(TickOutcome::Drawn));
    assert_eq!(background.status(), &BackgroundStatus::Running);
}

#[test]
fn out_of_memory_degrades_and_releases() {
    let host = host();
    let journal = host.journal();
    let mut background = ShaderBackground::mount(host, BackgroundConfig::default());
    background.pump_frame(FRAME);
    background.host_mut().fail_next_draw(DrawError::OutOfMemory);

    let (outcome, warnings) = with_warn_count(|| background.pump_frame(FRAME));

    assert_eq!(outcome, Some(TickOutcome::Fatal(DrawError::OutOfMemory)));
    assert_eq!(warnings, 1);
    assert!(matches!(
        background.status(),
        BackgroundStatus::Unavailable(BackgroundError::Surface(_))
    ));
    assert!(background.host().subscriptions().is_empty());
    assert_eq!(background.pump_frame(FRAME), None);
    let journal = journal.borrow();
    assert_eq!(journal.live_objects(), 0);
    assert_eq!(journal.double_deletes(), 0);
}

#[test]
fn context_options_reach_the_host() {
    let host = host();
    let journal = host.journal();
    let config = BackgroundConfig {
        class_name: Some("hero".into()),
        context: ContextOptions {
            antialias: false,
            alpha: false,
            power_preference: PowerPreference::LowPower,
        },
        ..BackgroundConfig::default()
    };
    let background = ShaderBackground::mount(host, config.clone());

    assert_eq!(background.class_name(), Some("hero"));
    assert_eq!(journal.borrow().context_options, vec![config.context]);
    assert!(background.host().now().is_zero());
}
