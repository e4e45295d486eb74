use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::CoreError;
use crate::plugin::context::{AmbientContext, PluginContext, ambient};
use crate::plugin::descriptor::RequestDescriptor;
use crate::plugin::error::PluginError;
use crate::plugin::outcome::{BeforeOutcome, BeforePhaseResult};
use crate::plugin::registry::{PluginRegistration, PluginRegistry};
use crate::plugin::traits::ExecutionMode;

/// Knobs for the async worker pool and per-plugin timeout (§5: "size
/// configurable, default small — e.g., 4").
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub async_pool_size: usize,
    pub plugin_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            async_pool_size: 4,
            plugin_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Executes the `BEFORE`/`AFTER`/`ON_ERROR` phases against matching plugins
/// (§4.3). Sync plugins run on the caller's task; async plugins are
/// dispatched to a semaphore-bounded pool, each isolated by a timeout and a
/// caught panic so one misbehaving plugin cannot affect another or the
/// request that dispatched it.
pub struct PluginOrchestrator {
    registry: Arc<PluginRegistry>,
    config: OrchestratorConfig,
    pool_permits: Arc<Semaphore>,
    inflight: tokio::sync::Mutex<JoinSet<()>>,
}

impl PluginOrchestrator {
    pub fn new(registry: Arc<PluginRegistry>, config: OrchestratorConfig) -> Self {
        let pool_permits = Arc::new(Semaphore::new(config.async_pool_size.max(1)));
        Self {
            registry,
            config,
            pool_permits,
            inflight: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Runs the BEFORE phase: sync plugins only, strict ascending priority,
    /// each observing modifications made by earlier plugins.
    pub async fn dispatch_before(
        &self,
        descriptor: &RequestDescriptor,
        ctx: &mut PluginContext,
    ) -> BeforePhaseResult {
        let plugins = self.registry.matching(descriptor, ExecutionMode::Sync).await;
        for reg in &plugins {
            match self.invoke_before(reg, ctx).await {
                Ok(BeforeOutcome::Continue) => {}
                Ok(BeforeOutcome::ContinueWithModifiedResource(v)) => {
                    ctx.input_resource = Some(v);
                }
                Ok(BeforeOutcome::SkipRemaining) => break,
                Ok(BeforeOutcome::SkipRemainingWithModifiedResource(v)) => {
                    ctx.input_resource = Some(v);
                    break;
                }
                Ok(BeforeOutcome::Abort { status, outcome }) => {
                    debug!(plugin = %reg.name, status, "BEFORE plugin aborted request");
                    return BeforePhaseResult::Aborted { status, outcome };
                }
                Err(err) => {
                    error!(plugin = %reg.name, error = %err, "BEFORE plugin failed");
                    return BeforePhaseResult::Failed {
                        plugin_name: reg.name.clone(),
                        message: err.to_string(),
                    };
                }
            }
        }
        BeforePhaseResult::Proceed {
            resource: ctx.input_resource.clone(),
        }
    }

    /// Runs the AFTER phase: sync plugins serially, then async plugins
    /// dispatched to the pool without waiting for them. Returns the name
    /// and error of the first sync plugin that failed, if any — the
    /// request pipeline decides whether that escalates to ON_ERROR.
    pub async fn dispatch_after(
        &self,
        descriptor: &RequestDescriptor,
        ctx: &PluginContext,
    ) -> Result<(), (String, PluginError)> {
        let sync_plugins = self.registry.matching(descriptor, ExecutionMode::Sync).await;
        let mut first_failure = None;
        for reg in &sync_plugins {
            if let Err(err) = self.invoke_after(reg, ctx).await {
                error!(plugin = %reg.name, error = %err, "sync AFTER plugin failed");
                if first_failure.is_none() {
                    first_failure = Some((reg.name.clone(), err));
                }
            }
        }

        let async_plugins = self.registry.matching(descriptor, ExecutionMode::Async).await;
        for reg in async_plugins {
            self.spawn_async(reg, ctx.clone(), AsyncInvocation::After).await;
        }

        match first_failure {
            Some((name, err)) => Err((name, err)),
            None => Ok(()),
        }
    }

    /// Runs the ON_ERROR phase: sync plugins serially, then async plugins
    /// scheduled on the pool. Async on-error failures are logged but never
    /// re-raised (§4.3).
    pub async fn dispatch_on_error(
        &self,
        descriptor: &RequestDescriptor,
        ctx: &PluginContext,
        error: &CoreError,
    ) {
        let sync_plugins = self.registry.matching(descriptor, ExecutionMode::Sync).await;
        for reg in &sync_plugins {
            if let Err(err) = self.invoke_on_error(reg, ctx, error).await {
                error!(plugin = %reg.name, error = %err, "sync ON_ERROR plugin failed");
            }
        }

        let async_plugins = self.registry.matching(descriptor, ExecutionMode::Async).await;
        for reg in async_plugins {
            self.spawn_async(
                reg,
                ctx.clone(),
                AsyncInvocation::OnError {
                    message: error.to_string(),
                },
            )
            .await;
        }
    }

    /// Drains the async pool with a bounded grace period; remaining tasks
    /// are abandoned with a warning (§5 shutdown discipline).
    pub async fn shutdown(&self) {
        let mut set = self.inflight.lock().await;
        let deadline = self.config.shutdown_grace;
        let drain = async {
            while set.join_next().await.is_some() {}
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            warn!(
                remaining = set.len(),
                "async plugin pool did not drain within grace period; abandoning remaining tasks"
            );
            set.abort_all();
        }
    }

    async fn invoke_before(
        &self,
        reg: &PluginRegistration,
        ctx: &mut PluginContext,
    ) -> Result<BeforeOutcome, PluginError> {
        let fut = reg.plugin.before(ctx);
        self.isolate(&reg.name, fut).await?
    }

    async fn invoke_after(&self, reg: &PluginRegistration, ctx: &PluginContext) -> Result<(), PluginError> {
        let fut = reg.plugin.after(ctx);
        self.isolate(&reg.name, fut).await?
    }

    async fn invoke_on_error(
        &self,
        reg: &PluginRegistration,
        ctx: &PluginContext,
        error: &CoreError,
    ) -> Result<(), PluginError> {
        let fut = reg.plugin.on_error(ctx, error);
        self.isolate(&reg.name, fut).await?
    }

    /// Wraps a plugin invocation in a timeout plus a caught panic, so one
    /// misbehaving plugin can never hang or crash its caller.
    async fn isolate<F, T>(&self, name: &str, fut: F) -> Result<Result<T, PluginError>, PluginError>
    where
        F: std::future::Future<Output = Result<T, PluginError>>,
    {
        match tokio::time::timeout(self.config.plugin_timeout, AssertUnwindSafe(fut).catch_unwind())
            .await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(panic)) => Err(PluginError::Panic(name.to_string(), panic_message(panic))),
            Err(_) => Err(PluginError::Timeout(name.to_string())),
        }
    }

    async fn spawn_async(&self, reg: PluginRegistration, ctx: PluginContext, invocation: AsyncInvocation) {
        let permits = self.pool_permits.clone();
        let timeout = self.config.plugin_timeout;
        let ambient_ctx = AmbientContext {
            tenant_id: ctx.tenant_id.clone(),
            request_id: ctx.request_id,
        };

        let task = async move {
            // Async plugins receive a detached token: a full pool queues
            // the task rather than dropping it, and cancellation of the
            // originating request never cancels this task (§5).
            let _permit = permits.acquire_owned().await.ok();
            let name = reg.name.clone();
            let outcome = ambient::scope(ambient_ctx, async {
                let fut = match &invocation {
                    AsyncInvocation::After => reg.plugin.after(&ctx).boxed(),
                    AsyncInvocation::OnError { .. } => {
                        // Reconstructing a full CoreError across the task
                        // boundary isn't necessary: on_error plugins only
                        // need the message for logging/audit purposes in
                        // the async path, so we hand them an Internal
                        // error carrying it rather than threading the
                        // original typed error through a 'static task.
                        let err = CoreError::internal(match &invocation {
                            AsyncInvocation::OnError { message } => message.clone(),
                            AsyncInvocation::After => String::new(),
                        });
                        async move { reg.plugin.on_error(&ctx, &err).await }.boxed()
                    }
                };
                match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
                    Ok(Ok(Ok(()))) => debug!(plugin = %name, "async plugin completed"),
                    Ok(Ok(Err(err))) => error!(plugin = %name, error = %err, "async plugin failed"),
                    Ok(Err(panic)) => {
                        error!(plugin = %name, panic = %panic_message(panic), "async plugin panicked")
                    }
                    Err(_) => error!(plugin = %name, "async plugin timed out"),
                }
            })
            .await;
            outcome
        };

        let mut set = self.inflight.lock().await;
        set.spawn(task);
    }
}

enum AsyncInvocation {
    After,
    OnError { message: String },
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FhirVersion;
    use crate::plugin::descriptor::{OperationDescriptor, OperationType};
    use crate::plugin::registry::PluginRegistration;
    use crate::plugin::traits::Plugin;
    use async_trait::async_trait;
    use serde_json::json;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor {
            resource_type: crate::ResourceType::from_str("Patient").unwrap(),
            operation_type: OperationType::Create,
            operation_code: None,
            fhir_version: FhirVersion::R5,
        }
    }

    fn ctx() -> PluginContext {
        PluginContext::new(
            OperationType::Create,
            FhirVersion::R5,
            crate::ResourceType::from_str("Patient").unwrap(),
            "tenant-a",
        )
    }

    struct ModifyingPlugin;

    #[async_trait]
    impl Plugin for ModifyingPlugin {
        fn name(&self) -> &str {
            "modifier"
        }

        async fn before(&self, _ctx: &mut PluginContext) -> Result<BeforeOutcome, PluginError> {
            Ok(BeforeOutcome::ContinueWithModifiedResource(json!({"patched": true})))
        }
    }

    struct AbortingPlugin;

    #[async_trait]
    impl Plugin for AbortingPlugin {
        fn name(&self) -> &str {
            "aborter"
        }

        async fn before(&self, _ctx: &mut PluginContext) -> Result<BeforeOutcome, PluginError> {
            Ok(BeforeOutcome::Abort {
                status: 403,
                outcome: json!({"issue": "blocked"}),
            })
        }
    }

    struct PanickingPlugin;

    #[async_trait]
    impl Plugin for PanickingPlugin {
        fn name(&self) -> &str {
            "panicker"
        }

        async fn before(&self, _ctx: &mut PluginContext) -> Result<BeforeOutcome, PluginError> {
            panic!("boom");
        }
    }

    fn registration(name: &str, priority: i32, plugin: Arc<dyn Plugin>) -> PluginRegistration {
        PluginRegistration {
            name: name.to_string(),
            mode: ExecutionMode::Sync,
            priority,
            descriptors: vec![OperationDescriptor::default()],
            plugin,
        }
    }

    #[tokio::test]
    async fn before_phase_applies_modification_then_later_plugin_sees_it() {
        let registry = Arc::new(PluginRegistry::new());
        registry
            .register(registration("modify", 1, Arc::new(ModifyingPlugin)))
            .await;
        let orchestrator = PluginOrchestrator::new(registry, OrchestratorConfig::default());

        let mut context = ctx();
        let result = orchestrator.dispatch_before(&descriptor(), &mut context).await;
        match result {
            BeforePhaseResult::Proceed { resource } => {
                assert_eq!(resource, Some(json!({"patched": true})));
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn before_phase_abort_short_circuits() {
        let registry = Arc::new(PluginRegistry::new());
        registry
            .register(registration("abort", 1, Arc::new(AbortingPlugin)))
            .await;
        registry
            .register(registration("modify", 2, Arc::new(ModifyingPlugin)))
            .await;
        let orchestrator = PluginOrchestrator::new(registry, OrchestratorConfig::default());

        let mut context = ctx();
        let result = orchestrator.dispatch_before(&descriptor(), &mut context).await;
        match result {
            BeforePhaseResult::Aborted { status, .. } => assert_eq!(status, 403),
            other => panic!("expected Aborted, got {other:?}"),
        }
        // The later, higher-priority-number plugin never ran.
        assert!(context.input_resource.is_none());
    }

    #[tokio::test]
    async fn before_phase_panic_is_isolated_and_reported_as_failed() {
        let registry = Arc::new(PluginRegistry::new());
        registry
            .register(registration("panics", 1, Arc::new(PanickingPlugin)))
            .await;
        let orchestrator = PluginOrchestrator::new(registry, OrchestratorConfig::default());

        let mut context = ctx();
        let result = orchestrator.dispatch_before(&descriptor(), &mut context).await;
        match result {
            BeforePhaseResult::Failed { plugin_name, .. } => assert_eq!(plugin_name, "panicker"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    struct CountingAsyncPlugin(Arc<AtomicUsize>);

    #[async_trait]
    impl Plugin for CountingAsyncPlugin {
        fn name(&self) -> &str {
            "counter"
        }

        async fn after(&self, _ctx: &PluginContext) -> Result<(), PluginError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn async_after_plugins_observe_dispatch_time_tenant() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(PluginRegistry::new());
        registry
            .register(PluginRegistration {
                name: "counter".to_string(),
                mode: ExecutionMode::Async,
                priority: 1,
                descriptors: vec![OperationDescriptor::default()],
                plugin: Arc::new(CountingAsyncPlugin(counter.clone())),
            })
            .await;
        let orchestrator = PluginOrchestrator::new(registry, OrchestratorConfig::default());

        orchestrator.dispatch_after(&descriptor(), &ctx()).await.unwrap();
        orchestrator.shutdown().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
