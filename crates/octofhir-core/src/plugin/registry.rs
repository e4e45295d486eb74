use crate::plugin::descriptor::{OperationDescriptor, RequestDescriptor};
use crate::plugin::traits::{ExecutionMode, Plugin};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A registered plugin: its name, execution mode, priority, and the
/// operation descriptors it subscribes to (§3 "Plugin Registration").
#[derive(Clone)]
pub struct PluginRegistration {
    pub name: String,
    pub mode: ExecutionMode,
    pub priority: i32,
    pub descriptors: Vec<OperationDescriptor>,
    pub plugin: Arc<dyn Plugin>,
}

/// Read-mostly registry of plugins keyed by name (§5 "Plugin registry").
/// Mutations take a short exclusive lock; dispatch takes a read lock and
/// operates on a cloned, consistent snapshot so a concurrent
/// register/unregister never produces a half-updated view mid-dispatch.
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, PluginRegistration>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, registration: PluginRegistration) {
        let mut guard = self.plugins.write().await;
        guard.insert(registration.name.clone(), registration);
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let mut guard = self.plugins.write().await;
        guard.remove(name).is_some()
    }

    pub async fn len(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Plugins whose descriptors match `request`, ordered by ascending
    /// priority (stable: equal-priority plugins keep registration order),
    /// restricted to the given execution mode.
    pub async fn matching(
        &self,
        request: &RequestDescriptor,
        mode: ExecutionMode,
    ) -> Vec<PluginRegistration> {
        let guard = self.plugins.read().await;
        // HashMap iteration order is unspecified; sort by name first so
        // that "stable" ordering among equal priorities is deterministic
        // rather than accidental.
        let mut matched: Vec<&PluginRegistration> = guard
            .values()
            .filter(|r| r.mode == mode && r.descriptors.iter().any(|d| d.matches(request)))
            .collect();
        matched.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        matched.into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FhirVersion;
    use crate::plugin::context::PluginContext;
    use crate::plugin::descriptor::OperationType;
    use crate::plugin::error::PluginError;
    use crate::plugin::outcome::BeforeOutcome;
    use crate::plugin::traits::Plugin;
    use async_trait::async_trait;
    use std::str::FromStr;

    struct Stub(&'static str);

    #[async_trait]
    impl Plugin for Stub {
        fn name(&self) -> &str {
            self.0
        }

        async fn before(&self, _ctx: &mut PluginContext) -> Result<BeforeOutcome, PluginError> {
            Ok(BeforeOutcome::Continue)
        }
    }

    fn registration(name: &'static str, priority: i32, mode: ExecutionMode) -> PluginRegistration {
        PluginRegistration {
            name: name.to_string(),
            mode,
            priority,
            descriptors: vec![OperationDescriptor::default()],
            plugin: Arc::new(Stub(name)),
        }
    }

    fn req() -> RequestDescriptor {
        RequestDescriptor {
            resource_type: crate::ResourceType::from_str("Patient").unwrap(),
            operation_type: OperationType::Create,
            operation_code: None,
            fhir_version: FhirVersion::R5,
        }
    }

    #[tokio::test]
    async fn matching_orders_by_priority_then_name() {
        let registry = PluginRegistry::new();
        registry
            .register(registration("b", 10, ExecutionMode::Sync))
            .await;
        registry
            .register(registration("a", 10, ExecutionMode::Sync))
            .await;
        registry
            .register(registration("z", 1, ExecutionMode::Sync))
            .await;

        let matched = registry.matching(&req(), ExecutionMode::Sync).await;
        let names: Vec<&str> = matched.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "b"]);
    }

    #[tokio::test]
    async fn matching_filters_by_mode() {
        let registry = PluginRegistry::new();
        registry
            .register(registration("sync-one", 1, ExecutionMode::Sync))
            .await;
        registry
            .register(registration("async-one", 1, ExecutionMode::Async))
            .await;

        let sync_matches = registry.matching(&req(), ExecutionMode::Sync).await;
        assert_eq!(sync_matches.len(), 1);
        assert_eq!(sync_matches[0].name, "sync-one");

        let async_matches = registry.matching(&req(), ExecutionMode::Async).await;
        assert_eq!(async_matches.len(), 1);
        assert_eq!(async_matches[0].name, "async-one");
    }

    #[tokio::test]
    async fn unregister_removes_plugin() {
        let registry = PluginRegistry::new();
        registry
            .register(registration("temp", 1, ExecutionMode::Sync))
            .await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.unregister("temp").await);
        assert_eq!(registry.len().await, 0);
        assert!(!registry.unregister("temp").await);
    }
}
