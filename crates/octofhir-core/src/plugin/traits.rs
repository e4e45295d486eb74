use crate::CoreError;
use crate::plugin::context::PluginContext;
use crate::plugin::error::PluginError;
use crate::plugin::outcome::BeforeOutcome;
use async_trait::async_trait;

/// Whether a plugin blocks the request task or runs on the detached async
/// worker pool (§4.3, §5). Only sync plugins may run in `BEFORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sync,
    Async,
}

/// Behavior implemented by a registered plugin. Plugins never import core
/// types beyond [`PluginContext`] (§9 design note on the core↔plugin
/// cycle) — they see the request/response as data, not as storage rows.
///
/// All three phases have a default no-op implementation so a plugin that
/// only cares about one phase doesn't have to stub the others.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique name, used as the registry key and in logs/diagnostics.
    fn name(&self) -> &str;

    /// Runs only if this plugin's execution mode is `Sync` (enforced by the
    /// orchestrator, not by the plugin itself).
    async fn before(&self, _ctx: &mut PluginContext) -> Result<BeforeOutcome, PluginError> {
        Ok(BeforeOutcome::Continue)
    }

    /// Sync plugins run this serially on the request task; async plugins
    /// run it on the worker pool and their return value is ignored by the
    /// pipeline (logged on error only).
    async fn after(&self, _ctx: &PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Invoked only when the core operation or a sync BEFORE/AFTER plugin
    /// failed. `error` is the triggering failure.
    async fn on_error(&self, _ctx: &PluginContext, _error: &CoreError) -> Result<(), PluginError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time object-safety assertion, in the teacher's style: if
    // `Plugin` stops being object-safe this function fails to compile.
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn Plugin) {}

    struct Noop;

    #[async_trait]
    impl Plugin for Noop {
        fn name(&self) -> &str {
            "noop"
        }
    }

    #[tokio::test]
    async fn default_methods_are_inert() {
        let mut ctx = crate::plugin::context::PluginContext::new(
            crate::plugin::descriptor::OperationType::Create,
            crate::FhirVersion::R5,
            std::str::FromStr::from_str("Patient").unwrap(),
            "default",
        );
        let plugin = Noop;
        let outcome = plugin.before(&mut ctx).await.unwrap();
        assert!(matches!(outcome, BeforeOutcome::Continue));
        assert!(plugin.after(&ctx).await.is_ok());
        let err = CoreError::internal("boom");
        assert!(plugin.on_error(&ctx, &err).await.is_ok());
    }
}
