mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{DETECT, ScriptedRunner, test_config};
use display_switcher::detect::{ModeDetector, NoReport};
use display_switcher::mode::{DetectionResult, DisplayMode};

type Reports = Arc<Mutex<Vec<(DisplayMode, bool)>>>;

fn collector() -> (Reports, impl Fn(DisplayMode, bool) + Send + 'static) {
    let reports: Reports = Arc::default();
    let sink = reports.clone();
    (reports, move |mode, late| sink.lock().unwrap().push((mode, late)))
}

fn detector(runner: &ScriptedRunner) -> ModeDetector {
    let dir = tempfile::tempdir().unwrap();
    ModeDetector::from_config(runner.shared(), &test_config(dir.path()))
}

#[tokio::test(start_paused = true)]
async fn on_time_result_is_returned_and_reported() {
    let runner = ScriptedRunner::new();
    runner.reply_after(DETECT, "mirror\n", Duration::from_millis(300));
    let (reports, reporter) = collector();

    let result = detector(&runner).detect(reporter).await;
    assert_eq!(result, DetectionResult::Mode(DisplayMode::Mirror));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(*reports.lock().unwrap(), vec![(DisplayMode::Mirror, false)]);
}

#[tokio::test(start_paused = true)]
async fn timeout_resolves_unknown_then_reports_late_once() {
    let runner = ScriptedRunner::new();
    runner.reply_after(DETECT, "join", Duration::from_secs(3));
    let (reports, reporter) = collector();
    let detector = detector(&runner);
    assert_eq!(detector.timeout(), Duration::from_secs(2));

    let started = tokio::time::Instant::now();
    let result = detector.detect(reporter).await;
    assert_eq!(result, DetectionResult::Unknown);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(reports.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*reports.lock().unwrap(), vec![(DisplayMode::Extended, true)]);
    assert_eq!(runner.runs_of(DETECT), 1);
}

#[tokio::test(start_paused = true)]
async fn late_invalid_output_is_not_reported() {
    let runner = ScriptedRunner::new();
    runner.reply_after(DETECT, "extend", Duration::from_secs(3));
    let (reports, reporter) = collector();

    let result = detector(&runner)
        .detect_within(Duration::from_secs(1), reporter)
        .await;
    assert_eq!(result, DetectionResult::Unknown);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unrecognised_output_is_unknown() {
    for stdout in ["", "Mirror", "mirror join", "hdmi"] {
        let runner = ScriptedRunner::new();
        runner.reply(DETECT, stdout);
        assert_eq!(
            detector(&runner).detect(NoReport).await,
            DetectionResult::Unknown,
            "stdout {stdout:?}"
        );
    }
}

#[tokio::test]
async fn spawn_failure_is_unknown() {
    let runner = ScriptedRunner::new();
    runner.fail_spawn(DETECT);
    assert_eq!(detector(&runner).detect(NoReport).await, DetectionResult::Unknown);
}

#[tokio::test]
async fn surrounding_whitespace_is_trimmed() {
    let runner = ScriptedRunner::new();
    runner.reply(DETECT, "  external\n");
    assert_eq!(
        detector(&runner).detect(NoReport).await,
        DetectionResult::Mode(DisplayMode::External)
    );
}
