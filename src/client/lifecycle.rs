//! Single-call lifecycle actions.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{Operation, VirtError};
use crate::instance::{Instance, InstanceSpec};
use crate::transport::{ApiRequest, ApiResponse, Transport};

use super::{INSTANCE_PATH, VirtClient, action_path, instance_path};

impl<T: Transport> VirtClient<T> {
    /// Creates an instance and returns its record when one can be obtained.
    ///
    /// Success is decided by status alone. The record comes from the
    /// response body, or from a lookup by name when the body is not an
    /// instance (a job id or an empty body); `None` means neither produced
    /// one although the backend accepted the call.
    ///
    /// # Errors
    ///
    /// Returns [`VirtError::Rejected`] unless the status is 200 or 201, and
    /// [`VirtError::InvalidResponse`] when the spec cannot be serialised.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create(&self, spec: &InstanceSpec) -> Result<Option<Instance>, VirtError> {
        let payload = serde_json::to_value(spec).map_err(|err| VirtError::InvalidResponse {
            operation: Operation::Create,
            message: err.to_string(),
        })?;
        let request = ApiRequest::post(INSTANCE_PATH).with_body(payload);
        let response = self.call_checked(Operation::Create, &request).await?;

        let created = match response.json::<Instance>() {
            Ok(instance) => Some(instance),
            Err(err) => {
                debug!(error = %err, "create response is not an instance record");
                self.lookup(&spec.name).await.into_instance()
            }
        };
        match &created {
            Some(instance) => info!(id = %instance.id, "instance created"),
            None => warn!("instance created but its record could not be found"),
        }
        Ok(created)
    }

    /// Starts an instance. A 409 means it was already running.
    ///
    /// # Errors
    ///
    /// Returns [`VirtError::Rejected`] for statuses other than 200, 202, 409.
    pub async fn start(&self, id: &str) -> Result<(), VirtError> {
        self.action(Operation::Start, id).await
    }

    /// Stops an instance. A 409 means it was already stopped.
    ///
    /// # Errors
    ///
    /// Returns [`VirtError::Rejected`] for statuses other than 200, 202, 409.
    pub async fn stop(&self, id: &str) -> Result<(), VirtError> {
        self.action(Operation::Stop, id).await
    }

    /// Restarts an instance.
    ///
    /// # Errors
    ///
    /// Returns [`VirtError::Rejected`] for statuses other than 200 and 202.
    pub async fn restart(&self, id: &str) -> Result<(), VirtError> {
        self.action(Operation::Restart, id).await
    }

    /// Stops the instance, then deletes it. The stop is issued whatever the
    /// current status is.
    ///
    /// # Errors
    ///
    /// Returns [`VirtError::Rejected`] when either the stop or the delete is
    /// rejected.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), VirtError> {
        self.stop(id).await?;
        let request = ApiRequest::delete(instance_path(id));
        self.call_checked(Operation::Delete, &request).await?;
        info!("instance deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn action(&self, operation: Operation, id: &str) -> Result<(), VirtError> {
        let request = ApiRequest::post(action_path(id, operation.as_str()));
        let response = self.call_checked(operation, &request).await?;
        info!(status = response.status, "action accepted");
        Ok(())
    }

    pub(crate) async fn call_checked(
        &self,
        operation: Operation,
        request: &ApiRequest,
    ) -> Result<ApiResponse, VirtError> {
        let response = self.transport.call(request).await;
        if response.status_in(operation.accepted_statuses()) {
            return Ok(response);
        }
        Err(VirtError::Rejected {
            operation,
            status: response.status,
            text: rejection_text(&response),
        })
    }
}

fn rejection_text(response: &ApiResponse) -> String {
    if !response.text.trim().is_empty() {
        return response.text.trim().to_owned();
    }
    match &response.body {
        Value::Null => format!("HTTP {}", response.status),
        body => body.to_string(),
    }
}
