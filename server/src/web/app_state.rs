use std::sync::Arc;

use crate::engine::group_engine::GroupEngine;

/// Shared state for axum handlers.
pub struct AppState {
    pub engine: Arc<GroupEngine>,
}
