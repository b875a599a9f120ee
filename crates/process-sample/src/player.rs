//! Player process: drives a fixed batch of database tasks and a periodic
//! heartbeat, then shuts the runtime down.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::info;
use virtual_process::{
    HandlerRegistry, ProcessBody, ProcessCore, ProcessLogic, ProcessProperties, ScheduledTask,
};

use crate::messages::{RunDatabaseTaskRequest, RunDatabaseTaskResponse};
use crate::SUBJECT_DATABASE;

const HEARTBEAT_PERIOD: f64 = 0.05;

pub struct PlayerLogic {
    statements: Vec<String>,
    next_index: usize,
    started: bool,
    rows_total: Arc<AtomicU32>,
}

impl PlayerLogic {
    pub fn new(statements: Vec<String>) -> Self {
        Self {
            statements,
            next_index: 0,
            started: false,
            rows_total: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Shared running total of rows reported back, readable after the process
    /// has been handed to the manager.
    pub fn rows_total(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.rows_total)
    }

    fn database_pattern() -> ProcessProperties {
        ProcessProperties::with_parts(SUBJECT_DATABASE, 0, 0, 0)
    }

    fn send_next_task(&mut self, core: &mut ProcessCore, database: virtual_process::ProcessId) {
        let statement = self.statements[self.next_index].clone();
        core.send_message(
            database,
            RunDatabaseTaskRequest {
                task_id: self.next_index as u64,
                statement,
            },
        );
        self.next_index += 1;
    }
}

impl ProcessLogic for PlayerLogic {
    fn on_initialize(&mut self, core: &mut ProcessCore) {
        core.request_mailbox_by_properties(Self::database_pattern(), false);

        let heartbeat = ScheduledTask::new(
            HEARTBEAT_PERIOD,
            Box::new(|now: f64, core: &mut ProcessCore| {
                core.log(format!("heartbeat at {now:.3}"));
                Some(now + HEARTBEAT_PERIOD)
            }),
        );
        core.submit_task(&heartbeat);
    }

    fn register_handlers(&mut self, registry: &mut HandlerRegistry<ProcessBody<Self>>) {
        registry.register::<RunDatabaseTaskResponse, _>(|body, source, response| {
            let ProcessBody { core, logic } = body;
            logic.rows_total.fetch_add(response.rows, Ordering::SeqCst);
            info!(
                task_id = response.task_id,
                rows = response.rows,
                success = response.success,
                "database task finished"
            );
            if logic.next_index < logic.statements.len() {
                logic.send_next_task(core, source);
            } else {
                core.log("all database tasks complete");
                core.shutdown_manager();
            }
        });
    }

    fn on_run(&mut self, core: &mut ProcessCore) {
        if self.started {
            return;
        }
        if self.statements.is_empty() {
            self.started = true;
            core.shutdown_manager();
            return;
        }
        if let Some(&database) = core.process_ids_matching(&Self::database_pattern()).first() {
            self.started = true;
            self.send_next_task(core, database);
        }
    }
}
