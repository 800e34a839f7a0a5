//! Namespace setup and teardown.

use skiff_client::{ClientError, ResourceKind};
use skiff_core::{Namespace, RetryPolicy, new_namespace};
use tracing::info;

use crate::coordinator::Coordinator;
use crate::error::{RolloutError, RolloutResult};
use crate::retry::poll_until;

impl Coordinator {
    /// Create the namespace, or return it if it already exists.
    pub async fn create_namespace(&self, name: &str) -> RolloutResult<Namespace> {
        let applied = self.client().create(new_namespace(name).into(), true).await?;
        if applied.is_adopted() {
            info!(namespace = name, "namespace already exists");
        } else {
            info!(namespace = name, "namespace created");
        }
        Ok(applied.into_inner().into_namespace()?)
    }

    /// Delete the namespace and wait until the cluster no longer knows it.
    /// A namespace that does not exist is left alone.
    pub async fn delete_namespace_and_wait(
        &self,
        name: &str,
        policy: RetryPolicy,
    ) -> RolloutResult<()> {
        let client = self.client().as_ref();
        match client.get(ResourceKind::Namespace, name).await {
            Ok(_) => {}
            Err(ClientError::NotFound { .. }) => {
                info!(namespace = name, "namespace does not exist, nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        match client.delete(ResourceKind::Namespace, name).await {
            Ok(()) | Err(ClientError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        info!(namespace = name, "namespace deletion requested, waiting for termination");

        let gone = poll_until(policy, "namespace termination", |_| async move {
            match client.get(ResourceKind::Namespace, name).await {
                Err(ClientError::NotFound { .. }) => Ok(Some(())),
                Ok(_) => Ok(None),
                Err(e) => Err(RolloutError::from(e)),
            }
        })
        .await?;
        gone.ok_or_else(|| RolloutError::NamespaceNotTerminated(name.to_string(), policy.max_retries()))?;
        info!(namespace = name, "namespace terminated");
        Ok(())
    }
}
