use halo_core::common::config::HaloModelConfig;
use halo_core::halos::write_halos;
use halo_core::table::read_table;
use halo_core::testing::{toy_config, toy_document};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_halo_ps(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_halo-ps"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("halo-ps should start")
}

fn write_inputs(directory: &Path, config: &HaloModelConfig) -> (PathBuf, PathBuf) {
    let config_path = directory.join("halo.json");
    let halos_path = directory.join("halos.json");
    fs::write(
        &config_path,
        serde_json::to_string_pretty(config).expect("config should serialize"),
    )
    .expect("config should be written");
    write_halos(&halos_path, &toy_document()).expect("halos should be written");
    (config_path, halos_path)
}

fn linear_config() -> HaloModelConfig {
    HaloModelConfig {
        linear_only: true,
        ..toy_config()
    }
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn tabulate_writes_a_table_that_inspect_and_query_can_read() {
    let temp = TempDir::new().expect("tempdir should be created");
    let (config_path, halos_path) = write_inputs(temp.path(), &linear_config());
    let output_path = temp.path().join("tables/linear.bin");

    let output = run_halo_ps(&[
        "tabulate",
        "--config",
        config_path.to_str().expect("utf-8 path"),
        "--halos",
        halos_path.to_str().expect("utf-8 path"),
        "--destination",
        temp.path().to_str().expect("utf-8 path"),
        "--output",
        output_path.to_str().expect("utf-8 path"),
    ]);
    assert!(
        output.status.success(),
        "tabulate should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary = stdout_json(&output);
    assert_eq!(summary["written"], Value::Bool(true));
    assert_eq!(summary["computed"].as_array().map(Vec::len), Some(3));
    let table = read_table(&output_path).expect("table should read back");
    assert_eq!(table.tab_z, vec![6.0, 8.0, 10.0]);

    let inspect = run_halo_ps(&["inspect", output_path.to_str().expect("utf-8 path")]);
    assert!(inspect.status.success());
    let summary = stdout_json(&inspect);
    assert_eq!(summary["redshift"]["count"], Value::from(3));
    assert_eq!(summary["mass_function"], Value::from("ST"));

    let query = run_halo_ps(&[
        "query",
        output_path.to_str().expect("utf-8 path"),
        "--z",
        "8",
        "--k",
        "0.1,1.0",
    ]);
    assert!(
        query.status.success(),
        "query should succeed, stderr: {}",
        String::from_utf8_lossy(&query.stderr)
    );
    let stdout = String::from_utf8_lossy(&query.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    let value: f64 = lines[0]
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .expect("query line should hold k and P(k)");
    let expected = table.ps_at(8.0, 0.1).expect("lookup");
    assert!((value - expected).abs() <= 1.0e-7 * expected.abs());
}

#[test]
fn existing_table_is_an_io_conflict_without_clobber() {
    let temp = TempDir::new().expect("tempdir should be created");
    let (config_path, halos_path) = write_inputs(temp.path(), &linear_config());
    let args = [
        "tabulate",
        "--config",
        config_path.to_str().expect("utf-8 path"),
        "--halos",
        halos_path.to_str().expect("utf-8 path"),
        "--destination",
        temp.path().to_str().expect("utf-8 path"),
        "--format",
        "bin",
    ];

    let first = run_halo_ps(&args);
    assert!(first.status.success());
    let path = stdout_json(&first)["path"]
        .as_str()
        .map(PathBuf::from)
        .expect("summary path");
    assert!(path.extension().is_some_and(|suffix| suffix == "bin"));

    let second = run_halo_ps(&args);
    assert_eq!(second.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&second.stderr).contains("ERROR: [IO.TABLE_EXISTS]"));

    let mut clobbering = args.to_vec();
    clobbering.push("--clobber");
    assert!(run_halo_ps(&clobbering).status.success());
}

#[test]
fn unknown_concentration_relation_exits_with_configuration_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = HaloModelConfig {
        concentration_relation: "prada".to_string(),
        ..toy_config()
    };
    let (config_path, halos_path) = write_inputs(temp.path(), &config);

    let output = run_halo_ps(&[
        "profile-table",
        "--config",
        config_path.to_str().expect("utf-8 path"),
        "--halos",
        halos_path.to_str().expect("utf-8 path"),
        "--destination",
        temp.path().to_str().expect("utf-8 path"),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR: [CONFIG.CMR]"));
}

#[test]
fn profile_table_writes_profile_and_surface_tables() {
    let temp = TempDir::new().expect("tempdir should be created");
    let (config_path, halos_path) = write_inputs(temp.path(), &toy_config());

    let output = run_halo_ps(&[
        "profile-table",
        "--config",
        config_path.to_str().expect("utf-8 path"),
        "--halos",
        halos_path.to_str().expect("utf-8 path"),
        "--destination",
        temp.path().to_str().expect("utf-8 path"),
        "--surface",
    ]);
    assert!(
        output.status.success(),
        "profile-table should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary = stdout_json(&output);
    for key in ["profile", "surface"] {
        let path = summary[key].as_str().map(PathBuf::from).expect("table path");
        assert!(path.exists(), "{key} table should exist at {}", path.display());
    }
}

#[test]
fn prefix_prints_every_derived_name() {
    let temp = TempDir::new().expect("tempdir should be created");
    let (config_path, _) = write_inputs(temp.path(), &toy_config());

    let output = run_halo_ps(&["prefix", "--config", config_path.to_str().expect("utf-8 path")]);
    assert!(output.status.success());
    let summary = stdout_json(&output);
    let table = summary["table"].as_str().expect("table prefix");
    let checkpoint = summary["checkpoint"].as_str().expect("checkpoint prefix");
    assert!(table.starts_with("halo_ps_ST_nfw_duffy_logM_70_8-15_z_3_6-10"));
    assert!(!checkpoint.contains("_z_"));
    assert!(summary["profile"].as_str().is_some_and(|prefix| prefix.starts_with("halo_prof_")));
}

#[test]
fn query_requires_a_scale_and_rejects_out_of_range_redshift() {
    let temp = TempDir::new().expect("tempdir should be created");
    let missing_scale = run_halo_ps(&["query", "table.dset", "--z", "8"]);
    assert_eq!(missing_scale.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&missing_scale.stderr).contains("ERROR: [CONFIG.CLI_USAGE]"));

    let (config_path, halos_path) = write_inputs(temp.path(), &linear_config());
    let table_path = temp.path().join("linear.dset");
    let tabulate = run_halo_ps(&[
        "tabulate",
        "--config",
        config_path.to_str().expect("utf-8 path"),
        "--halos",
        halos_path.to_str().expect("utf-8 path"),
        "--output",
        table_path.to_str().expect("utf-8 path"),
    ]);
    assert!(tabulate.status.success());

    let outside = run_halo_ps(&[
        "query",
        table_path.to_str().expect("utf-8 path"),
        "--z",
        "30",
        "--r",
        "1.0",
    ]);
    assert_eq!(outside.status.code(), Some(3));
}
