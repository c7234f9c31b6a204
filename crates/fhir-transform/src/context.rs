//! Request and context of one inbound resource transformation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use fhir_model::{
    DhisResourceId, FhirResourceType, FhirVersion, Result, TransformDirection, TransformerError,
    TransformerOptions,
};
use serde::Serialize;

/// The inbound request a transformation serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirRequest {
    pub resource_type: FhirResourceType,
    pub resource_id: Option<String>,
    /// DHIS2 resource the request explicitly addresses.
    pub dhis_resource_id: Option<DhisResourceId>,
    pub version: FhirVersion,
    pub direction: TransformDirection,
    /// The request is processed synchronously for a client that waits.
    pub sync: bool,
    /// The resource has been received through a remote subscription.
    pub remote_subscription: bool,
}

impl FhirRequest {
    pub fn new(resource_type: FhirResourceType, version: FhirVersion) -> Self {
        Self {
            resource_type,
            resource_id: None,
            dhis_resource_id: None,
            version,
            direction: TransformDirection::Import,
            sync: false,
            remote_subscription: false,
        }
    }

    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    #[must_use]
    pub fn with_dhis_resource_id(mut self, id: DhisResourceId) -> Self {
        self.dhis_resource_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    #[must_use]
    pub fn with_remote_subscription(mut self, remote_subscription: bool) -> Self {
        self.remote_subscription = remote_subscription;
        self
    }
}

/// Cooperative cancellation of a transformation.
///
/// The flag is only checked between pipeline steps. A running script is
/// never interrupted.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct TransformerContext {
    pub request: FhirRequest,
    pub options: TransformerOptions,
    pub abort: AbortSignal,
    /// Current time of the transformation. Date fallbacks and future date
    /// checks use this value.
    pub now: DateTime<Utc>,
}

impl TransformerContext {
    pub fn new(request: FhirRequest, options: TransformerOptions) -> Self {
        Self {
            request,
            options,
            abort: AbortSignal::new(),
            now: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn direction(&self) -> TransformDirection {
        self.request.direction
    }

    pub fn is_creation_disabled(&self) -> bool {
        self.options.creation_disabled
    }

    pub fn check_aborted(&self) -> Result<()> {
        if self.abort.is_aborted() {
            return Err(TransformerError::Aborted);
        }
        Ok(())
    }

    /// Id of the DHIS2 resource addressed by the request.
    ///
    /// Remote subscriptions never address a DHIS2 resource directly.
    pub fn dhis_id(&self) -> Result<Option<&str>> {
        match &self.request.dhis_resource_id {
            Some(_) if self.request.remote_subscription => Err(TransformerError::request(
                "Requests that contain a resource ID while processing a remote subscription are not supported.",
            )),
            Some(id) => Ok(Some(id.id.as_str())),
            None => Ok(None),
        }
    }

    /// JSON value that scripts see as `context`.
    pub fn script_value(&self) -> serde_json::Value {
        serde_json::json!({
            "fhirRequest": self.request,
            "creationDisabled": self.options.creation_disabled,
            "contained": self.options.contained,
            "now": self.now,
        })
    }
}

#[cfg(test)]
mod tests {
    use fhir_model::DhisResourceType;

    use super::*;

    #[test]
    fn abort_signal_is_shared_between_clones() {
        let signal = AbortSignal::new();
        let context = TransformerContext::new(
            FhirRequest::new(FhirResourceType::Observation, FhirVersion::R4),
            TransformerOptions::default(),
        )
        .with_abort_signal(signal.clone());
        assert!(context.check_aborted().is_ok());
        signal.abort();
        assert_eq!(context.check_aborted(), Err(TransformerError::Aborted));
    }

    #[test]
    fn remote_subscription_must_not_address_dhis_resource() {
        let request = FhirRequest::new(FhirResourceType::CarePlan, FhirVersion::R4)
            .with_dhis_resource_id(DhisResourceId::new(DhisResourceType::Enrollment, "d7Ea9a8D1Ue"));
        let context = TransformerContext::new(request.clone(), TransformerOptions::default());
        assert_eq!(context.dhis_id().unwrap(), Some("d7Ea9a8D1Ue"));

        let context = TransformerContext::new(
            request.with_remote_subscription(true),
            TransformerOptions::default(),
        );
        assert!(matches!(context.dhis_id(), Err(TransformerError::Request(_))));
    }
}
