use flotilla_app::{CommandQueue, RunOptions, load_config, run_headless};
use flotilla_core::{Cohort, ControlCommand, FlotillaConfig, Simulation, SimulationState};
use std::io::Write;

fn small_config() -> FlotillaConfig {
    let mut config = FlotillaConfig {
        rng_seed: Some(21),
        generation_ticks: 15,
        ..FlotillaConfig::default()
    };
    for cohort in Cohort::ALL {
        config.cohort_mut(cohort).count = 4;
    }
    config
}

#[test]
fn headless_run_completes_requested_generations() {
    let mut simulation = Simulation::new(small_config()).expect("simulation");
    let options = RunOptions {
        generations: 3,
        pull_every: Some(5),
        ..RunOptions::default()
    };
    let report = run_headless(&mut simulation, &options).expect("run");
    assert_eq!(report.summaries.len(), 3);
    assert_eq!(report.ticks, 45);
    let generations: Vec<u32> = report.summaries.iter().map(|s| s.generation.0).collect();
    assert_eq!(generations, vec![0, 1, 2]);
    assert_eq!(simulation.state(), SimulationState::Stopped);
    assert!(simulation.world().agents().all(|(_, agent)| !agent.is_awake()));
}

#[test]
fn zero_pull_interval_never_fires() {
    let mut simulation = Simulation::new(small_config()).expect("simulation");
    let options = RunOptions {
        generations: 1,
        pull_every: Some(0),
        ..RunOptions::default()
    };
    let report = run_headless(&mut simulation, &options).expect("run");
    assert_eq!(report.pulls_fired, 0);
    assert_eq!(report.ticks, 15);
}

#[test]
fn config_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, r#"{{ "generation_ticks": 42, "elite_count": 4 }}"#).expect("write");
    let config = load_config(Some(file.path())).expect("load");
    assert_eq!(config.generation_ticks, 42);
    assert_eq!(config.elite_count, 4);
    assert_eq!(config.arena_width, FlotillaConfig::default().arena_width);
}

#[test]
fn malformed_config_reports_path() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "{{ not json").expect("write");
    let err = load_config(Some(file.path())).expect_err("parse failure");
    assert!(format!("{err:#}").contains("failed to parse config"));
}

#[test]
fn command_queue_is_bounded_and_ordered() {
    let mut simulation = Simulation::new(small_config()).expect("simulation");
    let mut queue = CommandQueue::new(2);
    assert!(queue.submit(ControlCommand::Start));
    assert!(queue.submit(ControlCommand::Stop));
    assert!(!queue.submit(ControlCommand::Continue));
    assert_eq!(queue.drain(&mut simulation).expect("drain"), 2);
    assert!(queue.is_empty());
    assert_eq!(simulation.state(), SimulationState::Stopped);
}
