//! Common test utilities shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use gatekit_core::access::AccessClientEntry;
use gatekit_core::{
    ConnectionRenderer, DeploymentConfig, GateKitError, GateKitResult, ProvisioningEngine,
};
use tempfile::TempDir;

/// Renderer that tags the URI so tests can tell it was invoked.
pub struct TaggingRenderer;

impl ConnectionRenderer for TaggingRenderer {
    fn render(&self, uri: &str) -> GateKitResult<String> {
        Ok(format!("qr:{uri}"))
    }
}

/// Renderer that always fails.
pub struct FailingRenderer;

impl ConnectionRenderer for FailingRenderer {
    fn render(&self, _uri: &str) -> GateKitResult<String> {
        Err(GateKitError::Validation("uri too long to encode".to_string()))
    }
}

/// Engine rooted in a scratch directory that lives as long as the value.
pub struct TestEngine {
    /// Scratch directory holding the database, document and lock.
    pub root: TempDir,
    /// Engine opened on `root`.
    pub engine: ProvisioningEngine,
}

/// Engine with the [`TaggingRenderer`].
pub fn test_engine() -> TestEngine {
    test_engine_with(Arc::new(TaggingRenderer))
}

/// Engine with a caller-chosen renderer.
pub fn test_engine_with(renderer: Arc<dyn ConnectionRenderer>) -> TestEngine {
    let root = tempfile::tempdir().expect("tempdir");
    let config = Arc::new(DeploymentConfig::with_root(root.path()));
    let engine = ProvisioningEngine::open(config, renderer).expect("open engine");
    TestEngine { root, engine }
}

/// Client list of the managed inbound as currently on disk.
pub fn managed_clients(engine: &ProvisioningEngine) -> Vec<AccessClientEntry> {
    let registry = engine.registry();
    let document = registry.load().expect("load access document");
    registry
        .locate_managed_clients(&document)
        .expect("managed clients")
}

/// Client ids of the managed inbound as currently on disk.
pub fn managed_ids(engine: &ProvisioningEngine) -> Vec<String> {
    managed_clients(engine)
        .into_iter()
        .map(|client| client.id)
        .collect()
}
