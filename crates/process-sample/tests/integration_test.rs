//! Drives the full sample topology to completion in-process.

use std::sync::atomic::Ordering;

use virtual_process::{ConcurrencyManager, MemoryLogSink, ProcessProperties, VirtualProcess};

use process_sample::database::DatabaseLogic;
use process_sample::player::PlayerLogic;
use process_sample::{SUBJECT_DATABASE, SUBJECT_PLAYER};

#[test]
fn player_completes_all_database_tasks() {
    let sink = MemoryLogSink::new();
    let mut manager = ConcurrencyManager::new(2, sink.clone()).unwrap();

    let player = PlayerLogic::new(vec![
        "select one two three".into(),
        "update gold".into(),
        String::new(),
    ]);
    let rows_total = player.rows_total();

    manager
        .spawn_process(VirtualProcess::boxed(
            ProcessProperties::new(SUBJECT_PLAYER),
            player,
        ))
        .unwrap();
    manager
        .spawn_process(VirtualProcess::boxed(
            ProcessProperties::new(SUBJECT_DATABASE),
            DatabaseLogic::default(),
        ))
        .unwrap();

    manager.run();

    // First statement has 4 words, second 2, third is empty and fails.
    assert_eq!(rows_total.load(Ordering::SeqCst), 6);

    let lines = sink.lines();
    assert!(lines
        .iter()
        .any(|line| line.ends_with(": all database tasks complete")));
    assert!(lines.iter().any(|line| line.contains("task 2 -> 0 rows (failed)")));
}

#[test]
fn empty_batch_shuts_down_immediately() {
    let mut manager = ConcurrencyManager::new(1, MemoryLogSink::new()).unwrap();
    manager
        .spawn_process(VirtualProcess::boxed(
            ProcessProperties::new(SUBJECT_PLAYER),
            PlayerLogic::new(Vec::new()),
        ))
        .unwrap();
    manager.run();
}
