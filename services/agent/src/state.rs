//! Application state shared across request handlers.

use std::sync::Arc;

use crate::switch::Switch;
use crate::workflow::GuestInterfaceService;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: Arc<dyn GuestInterfaceService>,
    switch: Arc<dyn Switch>,
    default_bridge: String,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        service: Arc<dyn GuestInterfaceService>,
        switch: Arc<dyn Switch>,
        default_bridge: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                service,
                switch,
                default_bridge: default_bridge.into(),
            }),
        }
    }

    /// Guest interface operations.
    pub fn service(&self) -> &dyn GuestInterfaceService {
        self.inner.service.as_ref()
    }

    /// Switch used for readiness checks.
    pub fn switch(&self) -> &dyn Switch {
        self.inner.switch.as_ref()
    }

    /// Bridge used when a nic does not name one.
    pub fn default_bridge(&self) -> &str {
        &self.inner.default_bridge
    }
}
