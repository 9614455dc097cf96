//! Common test utilities for xavyo-workflow integration tests.
//!
//! All tests run against in-memory stores and the recording process engine.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::{Arc, Once};

use xavyo_workflow::{
    ChangeProcessing, InMemoryAuditStore, InMemoryCompletionLedger, InMemoryJobStore,
    InMemoryObjectStore, InMemoryProcessEngine, ModelContext, ObjectDelta, ObjectId, ObjectRef,
    OperationResult, PrimaryChangeProcessor, Result, TaskHandle, TenantId, WorkflowConfig,
    WrapperRegistry,
};

static INIT: Once = Once::new();

/// Install a tracing subscriber once when `RUST_LOG` is set.
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Stores all the in-memory stores for test isolation.
#[derive(Clone)]
pub struct TestStores {
    pub objects: Arc<InMemoryObjectStore>,
    pub jobs: Arc<InMemoryJobStore>,
    pub ledger: Arc<InMemoryCompletionLedger>,
    pub audit: Arc<InMemoryAuditStore>,
    pub engine: Arc<InMemoryProcessEngine>,
}

impl TestStores {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(InMemoryObjectStore::new()),
            jobs: Arc::new(InMemoryJobStore::new()),
            ledger: Arc::new(InMemoryCompletionLedger::new()),
            audit: Arc::new(InMemoryAuditStore::new()),
            engine: Arc::new(InMemoryProcessEngine::new()),
        }
    }

    /// Processor over these stores with the given registry.
    pub fn processor(&self, registry: WrapperRegistry) -> PrimaryChangeProcessor {
        PrimaryChangeProcessor::new(
            Arc::new(registry),
            self.engine.clone(),
            self.jobs.clone(),
            self.ledger.clone(),
            self.audit.clone(),
        )
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}

/// Test context containing stores, the processor, and test principals.
pub struct TestContext {
    pub stores: TestStores,
    pub processor: PrimaryChangeProcessor,
    pub tenant_a: TenantId,
    pub tenant_b: TenantId,
    /// Principal requesting changes.
    pub requester: ObjectRef,
}

impl TestContext {
    /// Context with the default configuration (role approval only).
    pub fn new() -> Self {
        Self::with_config(&WorkflowConfig::default())
    }

    /// Context with every wrapper enabled; `telephoneNumber` and `costCenter`
    /// are watched.
    pub fn all_wrappers() -> Self {
        Self::with_config(&WorkflowConfig {
            create_user_enabled: true,
            watched_attributes: vec!["telephoneNumber".to_string(), "costCenter".to_string()],
            ..WorkflowConfig::default()
        })
    }

    pub fn with_config(config: &WorkflowConfig) -> Self {
        init_test_logging();
        let stores = TestStores::new();
        let registry = WrapperRegistry::from_config(config, stores.objects.clone());
        let processor = stores.processor(registry);
        Self {
            stores,
            processor,
            tenant_a: TenantId::new(),
            tenant_b: TenantId::new(),
            requester: ObjectRef::user(ObjectId::new()),
        }
    }

    /// Context whose processor uses a hand-built registry.
    pub fn with_registry(build: impl FnOnce(&TestStores) -> WrapperRegistry) -> Self {
        init_test_logging();
        let stores = TestStores::new();
        let processor = stores.processor(build(&stores));
        Self {
            stores,
            processor,
            tenant_a: TenantId::new(),
            tenant_b: TenantId::new(),
            requester: ObjectRef::user(ObjectId::new()),
        }
    }
}

impl TestContext {
    /// Run the processor on `change` with a fresh operation result.
    pub async fn process_change(
        &self,
        model_context: &ModelContext,
        change: &ObjectDelta,
        task: &TaskHandle,
    ) -> Result<ChangeProcessing> {
        let mut result = OperationResult::new("processChange");
        self.processor
            .process_change(model_context, change, task, &mut result)
            .await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
