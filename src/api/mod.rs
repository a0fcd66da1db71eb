//! API module for the Road Analyzer
//!
//! Exposes the upload endpoint that turns a video into an ingestion report.

use anyhow::Result;
use tracing::info;

pub mod handlers;
pub mod models;
pub mod server;

pub use server::{build_router, AppContext};

/// API Server for handling upload requests
pub struct ApiServer {
    context: AppContext,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(context: AppContext) -> Self {
        Self { context }
    }

    /// Start the API server and run until shutdown
    pub async fn start(self) -> Result<()> {
        info!("🚀 Starting API server ({} decoder, {} detector, frame_skip={})",
              self.context.coordinator.backend_name(),
              self.context.coordinator.detector_name(),
              self.context.coordinator.policy().frame_skip());

        server::start_http_server(self.context).await
    }
}
