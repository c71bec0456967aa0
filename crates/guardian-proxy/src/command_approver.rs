//! Bridges the command approval queue (C5) to whatever surface invokes
//! `hostexec` from inside a cloister. The subprocess that actually runs an
//! approved command is host-side orchestration and lives outside this
//! crate; this type only owns the enqueue-and-block half of the flow.

use std::{sync::Arc, time::Duration};

use guardian_core::{
    events::{EventHub, UiEvent},
    queue::{wait_for_verdict, ApprovalQueue},
    types::{CommandVerdict, PendingCommandRequest},
    CommandQueue,
};

pub struct CommandApprover {
    queue: Arc<CommandQueue>,
    events: Arc<EventHub>,
}

impl CommandApprover {
    pub fn new(timeout: Duration, events: Arc<EventHub>) -> Self {
        Self {
            queue: Arc::new(ApprovalQueue::new(timeout)),
            events,
        }
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    #[tracing::instrument(skip(self, cmd), fields(cloister, project, agent))]
    pub async fn request_approval(&self, cloister: &str, project: &str, branch: &str, agent: &str, cmd: &str) -> CommandVerdict {
        let id = uuid::Uuid::new_v4().to_string();
        let request = PendingCommandRequest {
            id: id.clone(),
            cloister: cloister.to_string(),
            project: project.to_string(),
            branch: branch.to_string(),
            agent: agent.to_string(),
            cmd: cmd.to_string(),
            timestamp: time::OffsetDateTime::now_utc(),
        };
        let rx = self.queue.add(id.clone(), request.clone(), None);
        self.events.publish(UiEvent::RequestAdded(request));
        let verdict = wait_for_verdict(rx).await;
        self.events.publish(UiEvent::RequestRemoved(id));
        verdict
    }
}
