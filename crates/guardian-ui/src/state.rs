use std::sync::Arc;

use guardian_core::events::EventHub;
use guardian_proxy::{CommandApprover, DomainApprover};

/// Shared application state for the approval UI (C7). Holds the same
/// approver handles the proxy (C9) uses, so a verdict posted here and a
/// verdict posted from inside the proxy go through identical code paths.
#[derive(Clone)]
pub struct AppState {
    pub domain_approver: Arc<DomainApprover>,
    pub command_approver: Arc<CommandApprover>,
    pub events: Arc<EventHub>,
}

impl AppState {
    pub fn new(domain_approver: Arc<DomainApprover>, command_approver: Arc<CommandApprover>, events: Arc<EventHub>) -> Self {
        Self {
            domain_approver,
            command_approver,
            events,
        }
    }
}

impl axum::extract::FromRef<AppState> for Arc<EventHub> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.events)
    }
}
