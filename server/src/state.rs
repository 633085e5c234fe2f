//! Shared application state for the HTTP server.

use std::sync::Arc;

use coordinator::service::TestService;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TestService>,
}

impl AppState {
    pub fn new(service: TestService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
