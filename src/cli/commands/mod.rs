//! CLI command implementations
//!
//! Every command returns its process exit code: 0 success, 1 partial
//! failure, 2 configuration error, 4 host unreachable, 5 fatal error.

pub mod export;
pub mod init;
pub mod serve;
pub mod status;
pub mod validate;
pub mod watch;

use crate::adapters::command::{CommandRunner, ProcessRunner};
use crate::adapters::delivery::HttpDeliveryClient;
use crate::adapters::host::OrthancClient;
use crate::config::CourierConfig;
use crate::core::export::ExportCoordinator;
use crate::domain::Result;
use std::sync::Arc;

/// Wire the production adapters into a coordinator
pub(crate) fn build_coordinator(
    config: &CourierConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<ExportCoordinator>> {
    let host = Arc::new(OrthancClient::new(config.host.clone())?);
    let delivery = Arc::new(HttpDeliveryClient::new(config.export.clone())?);
    Ok(Arc::new(ExportCoordinator::from_config(
        config, host, runner, delivery,
    )))
}

pub(crate) fn process_runner() -> Arc<dyn CommandRunner> {
    Arc::new(ProcessRunner)
}
