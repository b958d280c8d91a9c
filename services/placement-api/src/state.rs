//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::Store;
use crate::service::PlacementService;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: PlacementService,
}

impl AppState {
    /// Create a new application state over `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                service: PlacementService::new(store),
            }),
        }
    }

    pub fn service(&self) -> &PlacementService {
        &self.inner.service
    }
}
