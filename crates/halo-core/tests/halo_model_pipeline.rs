use halo_core::common::config::{HaloModelConfig, load_config};
use halo_core::domain::HaloErrorCategory;
use halo_core::halos::{HaloPopulation, load_halos, write_halos};
use halo_core::power::{Occupation, PowerSpectrumEngine};
use halo_core::profiles::{
    TableSource, generate_profile_table, get_concentration, load_or_compute_profiles,
};
use halo_core::table::{TableFormat, read_table, write_table};
use halo_core::tabulation::{SoloCommunicator, TableRequest, generate_ps};
use halo_core::testing::{TOY_REDSHIFTS, toy_config, toy_document};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn assert_close(label: &str, expected: f64, actual: f64, abs_tol: f64, rel_tol: f64) {
    let diff = (expected - actual).abs();
    let scale = expected.abs().max(actual.abs()).max(1.0e-300);
    assert!(
        diff <= abs_tol || diff / scale <= rel_tol,
        "{label}: expected {expected}, got {actual} (abs diff {diff})"
    );
}

fn write_inputs(directory: &Path, config: &HaloModelConfig) -> (std::path::PathBuf, std::path::PathBuf) {
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

#[test]
fn nfw_duffy_table_over_three_redshifts() {
    let temp = TempDir::new().expect("tempdir should be created");
    let (config_path, halos_path) = write_inputs(temp.path(), &toy_config());
    let config = load_config(&config_path).expect("config should load");
    let halos = load_halos(&halos_path).expect("halos should load");
    assert_eq!(halos.tab_z(), TOY_REDSHIFTS.as_slice());

    generate_profile_table(&config, &halos, temp.path(), false, &SoloCommunicator)
        .expect("profile table");
    let lookup = load_or_compute_profiles(&config, &halos, temp.path(), false, &SoloCommunicator)
        .expect("profile lookup");
    assert_eq!(lookup.source, TableSource::Loaded);

    let engine = PowerSpectrumEngine::new(&config, &halos, lookup.profile).expect("engine");
    let generated = generate_ps(&config, &engine, &SoloCommunicator, &TableRequest::new(temp.path()))
        .expect("tabulation");
    assert!(generated.written);
    assert_eq!(generated.report.computed, TOY_REDSHIFTS.to_vec());

    let table = read_table(&generated.path).expect("table should read back");
    assert_eq!(table, generated.report.table);
    assert_eq!(table.provenance.mass_function, "ST");
    assert_eq!(table.tab_k.len(), engine.tab_k().len());

    let matter = engine.matter();
    for (z_index, z) in TOY_REDSHIFTS.iter().enumerate() {
        let row = table.ps_row(z_index);
        assert!(row.iter().all(|value| value.is_finite() && *value > 0.0), "z={z}");

        let k = table.tab_k[100];
        let direct = engine.get_ps_mm(*z, &[k], &matter, &matter).expect("direct")[0];
        assert_close(&format!("P(k={k}) at z={z}"), direct, row[100], 0.0, 1.0e-12);
        assert_close("table lookup", direct, table.ps_at(*z, k).expect("lookup"), 0.0, 1.0e-12);
    }

    let large_scale = table.ps_at(6.0, 0.05).expect("z=6");
    let earlier = table.ps_at(10.0, 0.05).expect("z=10");
    assert!(large_scale > earlier, "structure grows toward low redshift");
}

#[test]
fn cached_table_serves_the_correlation_function() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = HaloModelConfig {
        linear_only: true,
        ..toy_config()
    };
    let halos = load_halos({
        let (_, halos_path) = write_inputs(temp.path(), &config);
        halos_path
    })
    .expect("halos should load");

    let engine = PowerSpectrumEngine::from_config(&config, &halos).expect("engine");
    let generated = generate_ps(&config, &engine, &SoloCommunicator, &TableRequest::new(temp.path()))
        .expect("tabulation");

    let loading = HaloModelConfig {
        load_table: true,
        ..config.clone()
    };
    let cached = PowerSpectrumEngine::from_config(&loading, &halos)
        .expect("engine")
        .load_cached_table(&loading, temp.path())
        .expect("cached table");
    let (radii, cf) = cached.get_cf_mm(8.0, None).expect("tabulated row");
    assert_eq!(radii, generated.report.table.tab_r);
    assert_eq!(cf, generated.report.table.cf_row(1));
}

#[test]
fn shot_noise_and_linear_shortcut_hold_end_to_end() {
    let halos = halo_core::testing::toy_halos();
    let config = toy_config();
    let engine = PowerSpectrumEngine::from_config(&config, &halos).expect("engine");
    let k = [1.0e-3, 0.1, 10.0, 100.0];

    let shot = engine
        .get_ps_shot(10.0, &k, None, None, Occupation::Constant(2.0))
        .expect("shot noise");
    assert!(shot.windows(2).all(|pair| pair[0] == pair[1]));
    assert!(shot[0] > 0.0);

    let luminosity: Vec<f64> = halos.tab_m().iter().map(|mass| mass.sqrt()).collect();
    let weighted = engine
        .get_ps_shot(10.0, &k, Some(luminosity.as_slice()), None, Occupation::default())
        .expect("luminosity-weighted shot noise");
    assert!(weighted.windows(2).all(|pair| pair[0] == pair[1]));
    assert_ne!(weighted[0], shot[0]);

    let linear = HaloModelConfig {
        linear_only: true,
        ..config
    };
    let linear_engine = PowerSpectrumEngine::from_config(&linear, &halos).expect("engine");
    let matter = linear_engine.matter();
    assert_eq!(
        linear_engine.get_ps_mm(6.0, &k, &matter, &matter).expect("linear mm"),
        linear_engine.get_ps_lin(6.0, &k).expect("linear")
    );
}

#[test]
fn concentration_relation_is_validated_up_front() {
    assert_close(
        "Duffy pivot",
        6.71,
        get_concentration("duffy", 0.0, 2.0e12).expect("duffy"),
        1.0e-12,
        0.0,
    );

    let halos = halo_core::testing::toy_halos();
    let config = HaloModelConfig {
        concentration_relation: "prada".to_string(),
        ..toy_config()
    };
    let error = PowerSpectrumEngine::from_config(&config, &halos)
        .err()
        .expect("unknown relation");
    assert_eq!(error.category(), HaloErrorCategory::Configuration);
    assert_eq!(error.placeholder(), "CONFIG.CMR");
}

#[test]
fn population_must_match_the_grids_the_table_name_describes() {
    let halos = halo_core::testing::toy_halos();
    let narrower = HaloModelConfig {
        redshift_max: 8.0,
        log_mass_min: 9.0,
        ..toy_config()
    };
    let error = PowerSpectrumEngine::from_config(&narrower, &halos)
        .err()
        .expect("population holds z = 10 as well");
    assert_eq!(error.category(), HaloErrorCategory::Configuration);
    assert_eq!(error.placeholder(), "CONFIG.HALO_REDSHIFTS");

    let other_masses = HaloModelConfig {
        log_mass_min: 9.0,
        ..toy_config()
    };
    let error = PowerSpectrumEngine::from_config(&other_masses, &halos)
        .err()
        .expect("population starts at 10^8 Msun");
    assert_eq!(error.placeholder(), "CONFIG.HALO_MASSES");

    let temp = TempDir::new().expect("tempdir should be created");
    let error = load_or_compute_profiles(&other_masses, &halos, temp.path(), true, &SoloCommunicator)
        .expect_err("profile lookup shares the check");
    assert_eq!(error.placeholder(), "CONFIG.HALO_MASSES");
}

#[test]
fn both_table_formats_hold_the_same_table() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = HaloModelConfig {
        linear_only: true,
        ..toy_config()
    };
    let halos = halo_core::testing::toy_halos();
    let engine = PowerSpectrumEngine::from_config(&config, &halos).expect("engine");
    let table = generate_ps(
        &config,
        &engine,
        &SoloCommunicator,
        &TableRequest {
            output: Some(temp.path().join("linear.dset")),
            ..TableRequest::new(temp.path())
        },
    )
    .expect("tabulation")
    .report
    .table;

    let sequential = temp.path().join("linear.bin");
    write_table(&table, &sequential, TableFormat::Sequential, false).expect("bin");
    assert_eq!(read_table(&sequential).expect("read bin"), table);
    assert_eq!(read_table(temp.path().join("linear.dset")).expect("read dset"), table);

    let error = write_table(&table, &sequential, TableFormat::Sequential, false)
        .expect_err("existing table");
    assert_eq!(error.category(), HaloErrorCategory::IoConflict);
    write_table(&table, &sequential, TableFormat::Sequential, true).expect("overwrite");

    let bogus = temp.path().join("linear.h5");
    let error = write_table(&table, &bogus, TableFormat::Dataset, false).expect_err("suffix");
    assert_eq!(error.category(), HaloErrorCategory::Format);
    assert!(!bogus.exists());
}
