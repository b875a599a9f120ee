//! Runs the sample topology: one player, one mock database, two workers.
//!
//! Runtime diagnostics go to stderr via `RUST_LOG`; the in-substrate log lines
//! land in `process-sample.log`.

use std::sync::atomic::Ordering;

use tracing::info;
use virtual_process::{
    ConcurrencyManager, FileLogSink, FrameworkError, ProcessProperties, VirtualProcess,
};

use process_sample::database::DatabaseLogic;
use process_sample::player::PlayerLogic;
use process_sample::{SUBJECT_DATABASE, SUBJECT_PLAYER};

#[derive(Debug, thiserror::Error)]
enum SampleError {
    #[error("log sink: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Framework(#[from] FrameworkError),
}

fn main() -> Result<(), SampleError> {
    virtual_process::observability::setup_tracing();

    let sink = FileLogSink::create("process-sample.log")?;
    let mut manager = ConcurrencyManager::new(2, sink)?;

    let player = PlayerLogic::new(vec![
        "select name from characters where realm = 1".into(),
        "update characters set gold = gold + 25".into(),
        "insert into session_log values (17, 42)".into(),
    ]);
    let rows_total = player.rows_total();

    manager.spawn_process(VirtualProcess::boxed(
        ProcessProperties::new(SUBJECT_PLAYER),
        player,
    ))?;
    manager.spawn_process(VirtualProcess::boxed(
        ProcessProperties::new(SUBJECT_DATABASE),
        DatabaseLogic::default(),
    ))?;

    manager.run();

    info!(
        rows = rows_total.load(Ordering::SeqCst),
        "sample finished; log lines written to process-sample.log"
    );
    Ok(())
}
