use std::sync::Arc;

use crate::snapshot::SnapshotService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SnapshotService>,
}
