// Lifecycle of the shared (protocol server, transport) pair

use crate::error::InstanceError;
use crate::server::ProtocolServer;
use crate::tools::{ToolRegistry, ToolSource};
use crate::transport::{TransportAdapter, TransportConfig};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One constructed protocol server and the transport bound to it.
pub struct McpInstance {
    server: Arc<ProtocolServer>,
    transport: Arc<TransportAdapter>,
}

impl McpInstance {
    pub fn server(&self) -> &Arc<ProtocolServer> {
        &self.server
    }

    pub fn transport(&self) -> &Arc<TransportAdapter> {
        &self.transport
    }

    /// Transport first: it may still reach the server while winding down.
    async fn close(&self) {
        self.transport.close().await;
        self.server.close().await;
    }
}

type Construction = Shared<BoxFuture<'static, Result<Arc<McpInstance>, InstanceError>>>;

enum Slot {
    Empty,
    /// Running in its own task; callers await clones of the handle
    Building(Construction),
    Ready(Arc<McpInstance>),
}

/// Owns the canonical [`McpInstance`].
///
/// The instance is built on first demand and reused by every request and
/// stream until [`InstanceManager::teardown`] is called. Closing a stream
/// never tears it down.
pub struct InstanceManager {
    source: Arc<dyn ToolSource>,
    transport_config: TransportConfig,
    slot: RwLock<Slot>,
    constructions: AtomicU64,
}

impl InstanceManager {
    pub fn new(source: Arc<dyn ToolSource>, transport_config: TransportConfig) -> Self {
        Self {
            source,
            transport_config,
            slot: RwLock::new(Slot::Empty),
            constructions: AtomicU64::new(0),
        }
    }

    /// Return the canonical instance, building it if there is none.
    ///
    /// Construction runs in a spawned task and every cold caller awaits the
    /// same handle, so a caller dropped mid-build neither cancels it nor
    /// causes a second one. A failed construction leaves the manager empty
    /// and is retried by the next call.
    pub async fn acquire(&self) -> Result<Arc<McpInstance>, InstanceError> {
        if let Slot::Ready(instance) = &*self.slot.read().await {
            return Ok(instance.clone());
        }

        let pending = {
            let mut slot = self.slot.write().await;
            match &*slot {
                Slot::Ready(instance) => return Ok(instance.clone()),
                Slot::Building(pending) => pending.clone(),
                Slot::Empty => {
                    let pending = self.spawn_construction();
                    *slot = Slot::Building(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.clone().await;
        self.settle(&pending, &outcome).await;
        outcome
    }

    fn spawn_construction(&self) -> Construction {
        let attempt = self.constructions.fetch_add(1, Ordering::SeqCst) + 1;
        let source = self.source.clone();
        let transport_config = self.transport_config.clone();

        let task = tokio::spawn(construct(attempt, source, transport_config));
        async move {
            match task.await {
                Ok(outcome) => outcome.map(Arc::new),
                Err(e) => Err(InstanceError::Task(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }

    /// Record a finished construction, unless teardown replaced it meanwhile.
    async fn settle(
        &self,
        pending: &Construction,
        outcome: &Result<Arc<McpInstance>, InstanceError>,
    ) {
        let mut slot = self.slot.write().await;
        if let Slot::Building(current) = &*slot {
            if current.ptr_eq(pending) {
                *slot = match outcome {
                    Ok(instance) => Slot::Ready(instance.clone()),
                    Err(_) => Slot::Empty,
                };
            }
        }
    }

    /// Drop the canonical instance, closing its transport and then its server.
    ///
    /// A construction still in flight is awaited and closed as well. Calling
    /// this with no instance is a no-op.
    pub async fn teardown(&self) {
        let taken = std::mem::replace(&mut *self.slot.write().await, Slot::Empty);
        let instance = match taken {
            Slot::Ready(instance) => instance,
            Slot::Building(pending) => match pending.await {
                Ok(instance) => instance,
                Err(_) => return,
            },
            Slot::Empty => {
                tracing::debug!("Teardown requested with no live MCP instance");
                return;
            }
        };

        instance.close().await;
        tracing::info!("MCP instance torn down");
    }

    /// The canonical instance, without constructing one.
    pub async fn current(&self) -> Option<Arc<McpInstance>> {
        match &*self.slot.read().await {
            Slot::Ready(instance) => Some(instance.clone()),
            Slot::Building(pending) => pending
                .peek()
                .and_then(|outcome| outcome.as_ref().ok().cloned()),
            Slot::Empty => None,
        }
    }

    /// Number of construction attempts so far, failed ones included.
    pub fn constructions(&self) -> u64 {
        self.constructions.load(Ordering::SeqCst)
    }
}

async fn construct(
    attempt: u64,
    source: Arc<dyn ToolSource>,
    transport_config: TransportConfig,
) -> Result<McpInstance, InstanceError> {
    tracing::info!(attempt, source = source.name(), "Constructing MCP instance");

    let registry = ToolRegistry::discover(source.as_ref())
        .await
        .inspect_err(|e| tracing::error!("MCP instance construction failed: {}", e))?;

    let server = Arc::new(ProtocolServer::new(registry));
    let transport = Arc::new(TransportAdapter::new(server.clone(), transport_config));

    Ok(McpInstance { server, transport })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, Tool};
    use anyhow::Result;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Slow source that counts discovery passes.
    struct CountingSource {
        loads: AtomicUsize,
        broken: bool,
    }

    impl CountingSource {
        fn new(broken: bool) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                broken,
            }
        }
    }

    #[async_trait::async_trait]
    impl ToolSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn load(&self) -> Result<Vec<Arc<dyn Tool>>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;

            let tool: Arc<dyn Tool> = if self.broken {
                Arc::new(EchoTool::with_schema("echo", json!({"type": "array"})))
            } else {
                Arc::new(EchoTool::new("echo"))
            };
            Ok(vec![tool])
        }
    }

    fn create_manager(broken: bool) -> (InstanceManager, Arc<CountingSource>) {
        let source = Arc::new(CountingSource::new(broken));
        let manager = InstanceManager::new(source.clone(), TransportConfig::default());
        (manager, source)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cold_acquire_builds_once() {
        let (manager, source) = create_manager(false);

        let results =
            futures::future::join_all((0..16).map(|_| manager.acquire())).await;
        let instances: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(manager.constructions(), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_across_tasks() {
        let (manager, source) = create_manager(false);
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire().await.map_err(|e| e.to_string()) })
            })
            .collect();

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_first_caller_does_not_restart_construction() {
        let (manager, source) = create_manager(false);
        let manager = Arc::new(manager);

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager.acquire().await.map(|_| ()).map_err(|e| e.to_string())
            })
        };

        // The first caller is now waiting inside the 50ms load
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        let instance = manager.acquire().await.unwrap();

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(manager.constructions(), 1);
        assert!(Arc::ptr_eq(&instance, &manager.current().await.unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_during_construction_closes_result() {
        let (manager, _) = create_manager(false);
        let manager = Arc::new(manager);

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire().await.map_err(|e| e.to_string()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.teardown().await;
        let orphan = waiter.await.unwrap().unwrap();

        assert!(orphan.transport().is_closed());
        assert!(manager.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_construction_is_not_cached() {
        let (manager, source) = create_manager(true);

        assert!(manager.acquire().await.is_err());
        assert!(manager.current().await.is_none());
        assert!(manager.acquire().await.is_err());

        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert_eq!(manager.constructions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_is_idempotent() {
        let (manager, _) = create_manager(false);

        manager.teardown().await;
        let instance = manager.acquire().await.unwrap();
        manager.teardown().await;
        manager.teardown().await;

        assert!(manager.current().await.is_none());
        assert!(instance.transport().is_closed());
        assert!(instance.server().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_after_teardown_builds_fresh_instance() {
        let (manager, source) = create_manager(false);

        let first = manager.acquire().await.unwrap();
        let again = manager.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        manager.teardown().await;
        let second = manager.acquire().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.transport().is_closed());
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
