//! End-to-end runs of the `tabfit` binary against a generated job file.

use serde_json::{Value, json};
use std::process::Command;
use tabfit_core::numerics::spline::{NATURAL_BOUNDARY, SplineSlot};
use tabfit_core::{
    Atom, Configuration, FittingProblem, KnotGrid, Neighbor, PotentialTable, SyncMode, TableColumn,
};
use tempfile::TempDir;

fn two_atom_job() -> Value {
    let pair_values: Vec<f64> = (0..11).map(|i| 0.4 * (0.5 + 0.25 * i as f64) + 0.1).collect();
    let table = PotentialTable {
        species_count: 1,
        mode: SyncMode::Direct,
        columns: vec![
            TableColumn::new(
                KnotGrid::Uniform {
                    start: 0.5,
                    step: 0.25,
                },
                pair_values.clone(),
                NATURAL_BOUNDARY,
                NATURAL_BOUNDARY,
                3.0,
            ),
            TableColumn::new(
                KnotGrid::Uniform {
                    start: 0.0,
                    step: 0.2,
                },
                vec![0.0, 0.0],
                NATURAL_BOUNDARY,
                NATURAL_BOUNDARY,
                0.4,
            ),
            TableColumn::new(
                KnotGrid::Uniform {
                    start: -1.0,
                    step: 2.0,
                },
                vec![0.0, 0.0],
                NATURAL_BOUNDARY,
                NATURAL_BOUNDARY,
                1.0,
            ),
        ],
        with_charges: false,
    };

    let pair_slot = SplineSlot::locate_uniform(0.5, 0.25, 11, 1.0).expect("pair slot");
    let neighbor = |partner: usize, sign: f64| Neighbor {
        partner,
        species: 0,
        distance: 1.0,
        displacement: [sign, 0.0, 0.0],
        direction: [sign, 0.0, 0.0],
        inv_distance: 1.0,
        pair_column: 0,
        pair_slot,
        cutoff_column: 1,
        cutoff_slot: SplineSlot {
            interval: 0,
            fraction: 0.0,
            width: 0.2,
        },
    };
    let atom = |partner: usize, sign: f64| Atom {
        species: 0,
        reference_force_norm: 0.0,
        contributes: true,
        neighbors: vec![neighbor(partner, sign)],
        angles: Vec::new(),
    };
    let mut references = vec![0.0; 7];
    references[6] = 0.2;
    let problem = FittingProblem {
        species_count: 1,
        abundance: vec![1.0],
        atoms: vec![atom(1, 1.0), atom(0, -1.0)],
        configurations: vec![Configuration {
            first_atom: 0,
            atom_count: 2,
            weight: 1.0,
            volume: 1.0,
            use_forces: true,
            use_stress: false,
        }],
        references,
        electrostatics: None,
    };

    let mut parameters = pair_values;
    parameters.extend_from_slice(&[0.0, 0.0, 0.0, 0.0]);
    json!({
        "problem": serde_json::to_value(&problem).expect("problem json"),
        "table": serde_json::to_value(&table).expect("table json"),
        "parameters": parameters,
    })
}

fn write_job(dir: &TempDir, value: &Value) -> std::path::PathBuf {
    let path = dir.path().join("job.json");
    std::fs::write(&path, serde_json::to_string_pretty(value).expect("serialize"))
        .expect("write job file");
    path
}

#[test]
fn evaluate_command_reports_the_expected_residual() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_job(&dir, &two_atom_job());

    let output = Command::new(env!("CARGO_BIN_EXE_tabfit"))
        .arg("evaluate")
        .arg(&path)
        .output()
        .expect("binary runs");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: Value =
        serde_json::from_slice(&output.stdout).expect("stdout is a JSON report");
    let residual = report["residual"].as_f64().expect("residual field");
    // 2·(0.4)² force share plus (0.25 - 0.2)² energy share
    assert!(
        (residual - 0.3225).abs() < 1.0e-9,
        "residual was {residual}"
    );
    assert_eq!(report["ranks"], json!(1));
}

#[test]
fn evaluate_command_supports_multiple_ranks() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_job(&dir, &two_atom_job());

    let output = Command::new(env!("CARGO_BIN_EXE_tabfit"))
        .arg("evaluate")
        .arg(&path)
        .arg("--ranks")
        .arg("2")
        .output()
        .expect("binary runs");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: Value =
        serde_json::from_slice(&output.stdout).expect("stdout is a JSON report");
    let residual = report["residual"].as_f64().expect("residual field");
    assert!((residual - 0.3225).abs() < 1.0e-9);
}

#[test]
fn check_command_summarizes_a_consistent_job() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_job(&dir, &two_atom_job());

    let output = Command::new(env!("CARGO_BIN_EXE_tabfit"))
        .arg("check")
        .arg(&path)
        .output()
        .expect("binary runs");
    assert!(output.status.success());

    let report: Value =
        serde_json::from_slice(&output.stdout).expect("stdout is a JSON report");
    assert_eq!(report["atoms"], json!(2));
    assert_eq!(report["configurations"], json!(1));
    assert_eq!(report["columns"], json!(3));
    assert_eq!(report["parameters"], json!(15));
}

#[test]
fn check_command_rejects_a_short_parameter_vector() {
    let dir = TempDir::new().expect("tempdir");
    let mut job = two_atom_job();
    job["parameters"] = json!([1.0, 2.0]);
    let path = write_job(&dir, &job);

    let output = Command::new(env!("CARGO_BIN_EXE_tabfit"))
        .arg("check")
        .arg(&path)
        .output()
        .expect("binary runs");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parameter vector"), "stderr: {stderr}");
}

#[test]
fn missing_job_file_fails_with_a_readable_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_tabfit"))
        .arg("evaluate")
        .arg("does-not-exist.json")
        .output()
        .expect("binary runs");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("does-not-exist.json"),
        "stderr: {stderr}"
    );
}
