use std::path::PathBuf;
use trailersim::models::UnitKind;
use trailersim::output::{JsonLinesSink, MemorySink, PoseFrame, PoseSink};
use trailersim::scenario::{ScenarioConfig, ScenarioError};
use trailersim::simulation::SimulationEngine;

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(name)
}

fn load(name: &str, t_max: f64) -> ScenarioConfig {
    let mut config = ScenarioConfig::from_file(scenario_path(name)).expect("bundled scenario loads");
    config.sim.t_max_s = t_max;
    config.events.retain(|e| e.time_s < t_max);
    config
}

#[test]
fn bundled_scenarios_parse() {
    for name in ["figure_eight.yaml", "bounding_box.yaml", "manual_append.yaml"] {
        let config = ScenarioConfig::from_file(scenario_path(name)).expect("valid scenario");
        assert!(!config.meta.name.is_empty(), "{name}");
    }
}

#[test]
fn figure_eight_writes_json_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("poses.jsonl");

    let mut engine = SimulationEngine::new(load("figure_eight.yaml", 5.0), 0).expect("engine");
    let mut sink = JsonLinesSink::create(&path).expect("sink");
    let summary = engine.run(&mut sink).expect("run");
    assert_eq!(sink.frames_written(), summary.steps);
    drop(sink);

    let text = std::fs::read_to_string(&path).expect("read output");
    let frames: Vec<PoseFrame> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("frame json"))
        .collect();
    assert_eq!(frames.len() as u64, summary.steps);
    assert_eq!(frames.first().expect("frames").step, 1);
    for frame in &frames {
        assert_eq!(frame.units.len(), 3);
        assert_eq!(frame.units[0].kind, UnitKind::Leader);
        assert!(frame.units[1..].iter().all(|u| u.kind == UnitKind::Trailer));
    }
    // 直前 y = 4.9 から中心線 y = 10.5 上で開始するため初回サンプルで反転する
    assert!(frames[0].steer < 0.0);
}

#[test]
fn figure_eight_flips_steer_after_long_run() {
    let mut engine = SimulationEngine::new(load("figure_eight.yaml", 120.0), 0).expect("engine");
    let mut sink = MemorySink::default();
    engine.run(&mut sink).expect("run");

    let positive = sink.frames.iter().filter(|f| f.steer > 0.0).count();
    let negative = sink.frames.iter().filter(|f| f.steer < 0.0).count();
    assert!(positive > 0 && negative > 0, "+{positive} / -{negative}");
    assert!(sink.frames.iter().all(|f| f.units.iter().all(|u| u.x.is_finite() && u.y.is_finite())));
}

#[test]
fn manual_append_changes_chain_length() {
    let mut engine = SimulationEngine::new(load("manual_append.yaml", 30.0), 0).expect("engine");
    let mut sink = MemorySink::default();
    engine.run(&mut sink).expect("run");

    let max_len = sink.frames.iter().map(|f| f.units.len()).max().expect("frames");
    assert_eq!(sink.frames[0].units.len(), 1);
    assert_eq!(max_len, 4);
    assert_eq!(engine.chain().len(), 3);
    assert!((engine.chain().leader().speed - 0.5).abs() < 1e-12);
}

#[test]
fn bounding_box_caps_steps_per_frame() {
    let mut config = load("bounding_box.yaml", 10.0);
    config.sim.frame_dt_s = 0.5;
    let mut engine = SimulationEngine::new(config, 0).expect("engine");
    let summary = engine.run(&mut MemorySink::default()).expect("run");
    // 1フレーム最大4ステップ
    assert!(summary.steps <= summary.frames * 4);
    assert!(summary.sim_time >= 10.0);
}

#[test]
fn invalid_yaml_reports_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "meta: [not, a, map]\n").expect("write");
    match ScenarioConfig::from_file(&path) {
        Err(ScenarioError::Parse(p, _)) => assert_eq!(p, path),
        other => panic!("expected parse error, got {other:?}"),
    }
    assert!(matches!(
        ScenarioConfig::from_file(dir.path().join("missing.yaml")),
        Err(ScenarioError::FileNotFound(_))
    ));
}

#[test]
fn sink_errors_abort_the_run() {
    struct FailingSink;
    impl PoseSink for FailingSink {
        fn record(&mut self, _frame: &PoseFrame) -> Result<(), trailersim::output::SinkError> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    let mut engine = SimulationEngine::new(load("figure_eight.yaml", 1.0), 0).expect("engine");
    assert!(engine.run(&mut FailingSink).is_err());
    // 失敗したステップは時刻に加算されない
    assert_eq!(engine.sim_time(), 0.0);
}
