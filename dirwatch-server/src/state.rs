use std::sync::Arc;

use dirwatch_core::Supervisor;

use crate::db::PostgresResultStore;

/// Shared handles for the control-surface handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub store: Arc<PostgresResultStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish()
    }
}
