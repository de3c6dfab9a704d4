use std::sync::Arc;

use crate::config::Config;
use crate::labels::LabelPublisher;
use crate::run::lease::RunLease;
use crate::store::ScoringStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScoringStore>,
    pub publisher: Arc<dyn LabelPublisher>,
    /// Present only when REDIS_URL is configured.
    pub lease: Option<RunLease>,
    pub config: Config,
}
