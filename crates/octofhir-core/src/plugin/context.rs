use crate::fhir::{FhirVersion, ResourceType};
use crate::plugin::descriptor::OperationType;
use crate::time::{FhirDateTime, now_utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Per-request mutable context threaded through the plugin orchestrator
/// (§3 "Plugin Context"). Lives for exactly one request.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub request_id: Uuid,
    pub timestamp: FhirDateTime,
    pub operation_type: OperationType,
    pub fhir_version: FhirVersion,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub operation_code: Option<String>,
    pub query_params: HashMap<String, String>,
    pub input_resource: Option<Value>,
    pub output_resource: Option<Value>,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    /// Free-form attribute bag shared across plugins in the same request.
    pub attributes: HashMap<String, Value>,
}

impl PluginContext {
    pub fn new(
        operation_type: OperationType,
        fhir_version: FhirVersion,
        resource_type: ResourceType,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timestamp: now_utc(),
            operation_type,
            fhir_version,
            resource_type,
            resource_id: None,
            operation_code: None,
            query_params: HashMap::new(),
            input_resource: None,
            output_resource: None,
            tenant_id: tenant_id.into(),
            user_id: None,
            client_id: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Ambient per-request values that must follow a request across the
/// sync→async boundary when a plugin is dispatched to the worker pool
/// (§4.3, §5). Carried as a task-local rather than a thread-local so it
/// survives being moved onto a fresh tokio task, and is automatically
/// scoped to the lifetime of the future it wraps — there is no separate
/// "clear" step to forget.
#[derive(Debug, Clone)]
pub struct AmbientContext {
    pub tenant_id: String,
    pub request_id: Uuid,
}

tokio::task_local! {
    static AMBIENT: AmbientContext;
}

pub mod ambient {
    use super::*;
    use std::future::Future;

    /// Runs `fut` with `ctx` installed as the ambient context for its
    /// entire lifetime, on whatever task polls it. Used both by the
    /// request pipeline (C9) for the original task and by the async
    /// plugin worker pool (C8), which captures `{tenant_id, request_id}`
    /// at dispatch time and re-installs them on the spawned task.
    pub async fn scope<F: Future>(ctx: AmbientContext, fut: F) -> F::Output {
        AMBIENT.scope(ctx, fut).await
    }

    /// The tenant id of the request currently executing on this task, if
    /// any ambient scope is active.
    pub fn try_tenant_id() -> Option<String> {
        AMBIENT.try_with(|c| c.tenant_id.clone()).ok()
    }

    /// The request id of the request currently executing on this task.
    pub fn try_request_id() -> Option<Uuid> {
        AMBIENT.try_with(|c| c.request_id).ok()
    }

    /// Panics if called outside an ambient scope; for call sites that are
    /// only ever reached from within the request pipeline.
    pub fn tenant_id() -> String {
        AMBIENT.with(|c| c.tenant_id.clone())
    }

    pub fn request_id() -> Uuid {
        AMBIENT.with(|c| c.request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn plugin_context_carries_fields() {
        let ctx = PluginContext::new(
            OperationType::Create,
            FhirVersion::R5,
            ResourceType::from_str("Patient").unwrap(),
            "default",
        );
        assert_eq!(ctx.tenant_id, "default");
        assert_eq!(ctx.operation_type, OperationType::Create);
        assert!(ctx.output_resource.is_none());
    }

    #[tokio::test]
    async fn ambient_scope_is_visible_inside_and_absent_outside() {
        assert_eq!(ambient::try_tenant_id(), None);

        let ctx = AmbientContext {
            tenant_id: "tenant-a".to_string(),
            request_id: Uuid::new_v4(),
        };
        let observed = ambient::scope(ctx.clone(), async { ambient::tenant_id() }).await;
        assert_eq!(observed, "tenant-a");

        // Scope ends when the future completes; no leakage afterward.
        assert_eq!(ambient::try_tenant_id(), None);
    }

    #[tokio::test]
    async fn ambient_scope_survives_task_spawn() {
        let ctx = AmbientContext {
            tenant_id: "tenant-b".to_string(),
            request_id: Uuid::new_v4(),
        };
        let expected_request_id = ctx.request_id;
        let handle = tokio::spawn(ambient::scope(ctx, async {
            (ambient::tenant_id(), ambient::request_id())
        }));
        let (tenant, request_id) = handle.await.unwrap();
        assert_eq!(tenant, "tenant-b");
        assert_eq!(request_id, expected_request_id);
    }
}
