//! Background services: one tokio task per running consumer, bounded
//! per-scope managers, and a rolling output buffer polled by the UI/CLI.

pub mod consume;
pub mod manager;
pub mod scopes;
pub mod wrapper;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::output::OutputBuffer;

pub use consume::ConsumeService;
pub use manager::ServiceManager;
pub use scopes::{Scope, ServiceScopes};
pub use wrapper::{ServiceWrapper, SID_UNSTARTED};

/// A long-running task that a [`ServiceWrapper`] can host.
///
/// Implementations write progress into `output` and must exit promptly
/// once `stop_signal` fires.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> String;

    async fn run(
        &self,
        output: Arc<OutputBuffer>,
        stop_signal: CancellationToken,
    ) -> anyhow::Result<()>;
}
