//! Mock database process: executes statements by pretending convincingly.

use tracing::debug;
use virtual_process::{HandlerRegistry, ProcessBody, ProcessCore, ProcessLogic, ProcessProperties};

use crate::messages::{RunDatabaseTaskRequest, RunDatabaseTaskResponse};
use crate::SUBJECT_PLAYER;

/// Logic that answers every [`RunDatabaseTaskRequest`] with a synthetic row
/// count. Empty statements fail, everything else succeeds.
#[derive(Default)]
pub struct DatabaseLogic {
    executed: u64,
}

impl ProcessLogic for DatabaseLogic {
    fn on_initialize(&mut self, core: &mut ProcessCore) {
        // Track every player that ever spawns so responses can route back.
        core.request_mailbox_by_properties(
            ProcessProperties::with_parts(SUBJECT_PLAYER, 0, 0, 0),
            true,
        );
    }

    fn register_handlers(&mut self, registry: &mut HandlerRegistry<ProcessBody<Self>>) {
        registry.register::<RunDatabaseTaskRequest, _>(|body, source, request| {
            body.logic.executed += 1;
            let success = !request.statement.is_empty();
            let rows = if success {
                request.statement.split_whitespace().count() as u32
            } else {
                0
            };
            debug!(task_id = request.task_id, rows, success, "database task executed");
            body.core.log(format!(
                "task {} -> {} rows ({})",
                request.task_id,
                rows,
                if success { "ok" } else { "failed" }
            ));
            // The requester's mailbox may not be known yet; the response frame
            // waits in the pending table until it is.
            body.core.send_message(
                source,
                RunDatabaseTaskResponse {
                    task_id: request.task_id,
                    rows,
                    success,
                },
            );
        });
    }
}
