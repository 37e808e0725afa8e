//! Custom assertion helpers for the pipeline integration tests.

use rr_core::state::PipelineRun;
use rr_protocol::pipeline_models::{RunOutcome, Stage};

/// Assert that the recorded stages are exactly the first `count` stages.
pub fn assert_stages_in_order(run: &PipelineRun, count: usize) {
    assert_eq!(
        run.stages_run(),
        Stage::ALL[..count].to_vec(),
        "unexpected stage sequence"
    );
}

/// Assert that the run was aborted by `stage`.
pub fn assert_aborted_at(run: &PipelineRun, stage: Stage) {
    match &run.outcome {
        Some(RunOutcome::Aborted { stage: at, .. }) => assert_eq!(*at, stage),
        other => panic!("Expected abort at {:?}, got {:?}", stage, other),
    }
}

/// Assert that some line contains `needle`.
pub fn assert_has_line(lines: &[String], needle: &str) {
    assert!(
        lines.iter().any(|line| line.contains(needle)),
        "No line contains {:?}; lines were:\n{}",
        needle,
        lines.join("\n")
    );
}

/// Assert that no line contains `needle`.
#[allow(dead_code)]
pub fn assert_no_line(lines: &[String], needle: &str) {
    if let Some(line) = lines.iter().find(|line| line.contains(needle)) {
        panic!("Unexpected line {:?}", line);
    }
}

/// Assert that lines containing each needle appear in the given order.
pub fn assert_lines_in_order(lines: &[String], needles: &[&str]) {
    let mut from = 0;
    for needle in needles {
        match lines[from..].iter().position(|line| line.contains(needle)) {
            Some(offset) => from += offset + 1,
            None => panic!(
                "{:?} not found after position {}; lines were:\n{}",
                needle,
                from,
                lines.join("\n")
            ),
        }
    }
}
