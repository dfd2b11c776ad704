use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::model::Attestation;
use crate::model::Watcher;
use crate::Result;

/// Performs the side effect named by a watcher's action kind and payload.
///
/// Timeouts belong to the implementation; the dispatcher waits for every
/// invocation it starts.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ActionInvoker: Send + Sync + 'static {
    async fn invoke(
        &self,
        watcher: &Watcher,
        attestation: &Attestation,
    ) -> Result<()>;
}
