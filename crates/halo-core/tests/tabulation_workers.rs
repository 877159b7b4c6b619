use halo_core::common::config::HaloModelConfig;
use halo_core::common::naming::checkpoint_prefix;
use halo_core::power::PowerSpectrumEngine;
use halo_core::table::PsTable;
use halo_core::tabulation::{
    CheckpointLog, CheckpointRecord, Communicator, InProcessGroup, SoloCommunicator,
    TabulationManager, TabulationReport,
};
use halo_core::testing::{toy_config, toy_halos};
use std::path::Path;
use std::thread;
use tempfile::TempDir;

fn tabulate_solo(config: &HaloModelConfig, checkpoint_dir: &Path) -> TabulationReport {
    let halos = toy_halos();
    let engine = PowerSpectrumEngine::from_config(config, &halos).expect("engine");
    TabulationManager::new(config, &engine, &SoloCommunicator, checkpoint_dir)
        .expect("manager")
        .run()
        .expect("tabulation")
}

fn tabulate_group(config: &HaloModelConfig, size: usize, checkpoint_dir: &Path) -> Vec<TabulationReport> {
    let workers = InProcessGroup::new(size).expect("group");
    thread::scope(|scope| {
        let handles: Vec<_> = workers
            .iter()
            .map(|worker| {
                scope.spawn(move || {
                    let halos = toy_halos();
                    let engine = PowerSpectrumEngine::from_config(config, &halos).expect("engine");
                    let communicator: &dyn Communicator = worker;
                    TabulationManager::new(config, &engine, communicator, checkpoint_dir)
                        .expect("manager")
                        .run()
                        .expect("tabulation")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker thread"))
            .collect()
    })
}

fn assert_bit_identical(label: &str, expected: &PsTable, actual: &PsTable) {
    assert_eq!(expected.tab_z, actual.tab_z, "{label}: tab_z");
    for z_index in 0..expected.tab_z.len() {
        let pairs = expected
            .ps_row(z_index)
            .into_iter()
            .zip(actual.ps_row(z_index))
            .chain(expected.cf_row(z_index).into_iter().zip(actual.cf_row(z_index)));
        for (lhs, rhs) in pairs {
            assert_eq!(lhs.to_bits(), rhs.to_bits(), "{label}: row {z_index}");
        }
    }
}

#[test]
fn three_workers_reproduce_a_single_worker_bit_for_bit() {
    let config = HaloModelConfig {
        checkpoint: false,
        ..toy_config()
    };
    let scratch = TempDir::new().expect("tempdir should be created");

    let solo = tabulate_solo(&config, scratch.path());
    let group = tabulate_group(&config, 3, scratch.path());

    assert_eq!(group.len(), 3);
    for (rank, report) in group.iter().enumerate() {
        assert_eq!(report.computed, vec![solo.table.tab_z[rank]]);
        assert!(report.warnings.is_empty(), "three redshifts split evenly");
        assert_bit_identical(&format!("rank {rank}"), &solo.table, &report.table);
    }
}

#[test]
fn resumed_run_matches_an_uninterrupted_one() {
    let config = toy_config();
    let uninterrupted = {
        let scratch = TempDir::new().expect("tempdir should be created");
        tabulate_solo(&config, scratch.path())
    };

    let checkpoints = TempDir::new().expect("tempdir should be created");
    let prefix = checkpoint_prefix(&config).expect("prefix");
    let log = CheckpointLog::new(checkpoints.path(), &prefix, 0);
    for z_index in [0, 2] {
        log.append(&CheckpointRecord {
            z: uninterrupted.table.tab_z[z_index],
            ps: uninterrupted.table.ps_row(z_index),
            cf: uninterrupted.table.cf_row(z_index),
        })
        .expect("seed checkpoint");
    }

    let resumed = tabulate_solo(&config, checkpoints.path());
    assert_eq!(resumed.resumed, vec![6.0, 10.0]);
    assert_eq!(resumed.computed, vec![8.0]);
    assert_bit_identical("resumed", &uninterrupted.table, &resumed.table);
    assert_eq!(log.load().expect("log").records.len(), 3);
}

#[test]
fn worker_group_resumes_from_its_own_logs() {
    let config = toy_config();
    let checkpoints = TempDir::new().expect("tempdir should be created");
    let first = tabulate_group(&config, 2, checkpoints.path());

    let second = tabulate_group(&config, 2, checkpoints.path());
    for (before, after) in first.iter().zip(&second) {
        assert!(after.computed.is_empty());
        assert_eq!(after.resumed, before.computed);
        assert_bit_identical("second pass", &before.table, &after.table);
    }
}
