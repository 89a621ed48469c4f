//! Engine composition root.
//!
//! [`Coordinator`] wires the registry, queue, DLQ, coordination log,
//! session manager, workflow engine, and breaker registry together over a
//! shared [`Storage`] backend, all via explicit dependency injection: the
//! caller hands in the storage, task executor, and notification sink at
//! construction, and every subsystem is reachable through an accessor.
//! Nothing here is a global.

use crate::coordination::CoordinationLog;
use crate::dlq::DeadLetterQueue;
use crate::queue::WorkQueue;
use crate::registry::AgentRegistry;
use crate::resilience::{BreakerRegistry, RetryClassifier, RetryPolicy};
use crate::session::SessionManager;
use crate::worker::{AgentWorker, WorkerPool};
use crate::workflow::WorkflowEngine;
use plexus_core::config::PlexusConfig;
use plexus_core::id::AgentId;
use plexus_core::traits::{NotificationSink, Storage, TaskExecutor, TracingNotifier};
use plexus_core::Result;
use plexus_storage::MemoryStorage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Coordinator {
    config: PlexusConfig,
    storage: Arc<dyn Storage>,
    executor: Arc<dyn TaskExecutor>,
    registry: Arc<AgentRegistry>,
    dlq: Arc<DeadLetterQueue>,
    queue: Arc<WorkQueue>,
    coordination: Arc<CoordinationLog>,
    sessions: Arc<SessionManager>,
    workflows: Arc<WorkflowEngine>,
    breakers: Arc<BreakerRegistry>,
    workers: WorkerPool,
    shutdown: CancellationToken,
    background: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Coordinator {
    /// Wire the engine over the given storage, executor, and notifier.
    pub fn new(
        config: PlexusConfig,
        storage: Arc<dyn Storage>,
        executor: Arc<dyn TaskExecutor>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        info!("Initializing Plexus coordinator");

        let registry = Arc::new(AgentRegistry::new(storage.clone(), config.registry.clone()));
        let dlq = Arc::new(DeadLetterQueue::new(storage.clone(), notifier));
        let queue = Arc::new(WorkQueue::new(
            storage.clone(),
            dlq.clone(),
            config.queue.clone(),
            RetryPolicy::from_config(&config.retry),
        ));
        let coordination = Arc::new(CoordinationLog::new(storage.clone(), queue.clone()));
        let sessions = Arc::new(SessionManager::new(storage.clone()));
        let workflows = Arc::new(WorkflowEngine::new(storage.clone(), queue.clone()));
        let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));

        Self {
            config,
            storage,
            executor,
            registry,
            dlq,
            queue,
            coordination,
            sessions,
            workflows,
            breakers,
            workers: WorkerPool::new(),
            shutdown: CancellationToken::new(),
            background: parking_lot::Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Default configuration over in-memory storage, notifications to the
    /// log. Meant for tests and single-process embedding.
    pub fn in_memory(executor: Arc<dyn TaskExecutor>) -> Self {
        Self::new(
            PlexusConfig::default(),
            Arc::new(MemoryStorage::new()),
            executor,
            Arc::new(TracingNotifier),
        )
    }

    /// Start the background maintenance tasks: the queue's retry requeue
    /// sweeper and the breaker registry's idle pruner. Calling twice is a
    /// no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Coordinator already started");
            return;
        }
        let sweeper = self.queue.spawn_requeue_sweeper(self.shutdown.child_token());
        let prune_interval = Duration::from_secs(self.config.breaker.prune_idle_secs.max(1));
        let pruner = self
            .breakers
            .spawn_pruner(prune_interval, self.shutdown.child_token());
        self.background.lock().extend([sweeper, pruner]);
        info!("Plexus coordinator started");
    }

    /// Spawn a polling worker for a registered agent.
    pub async fn spawn_worker(&self, agent_id: &AgentId) -> Result<()> {
        // Surfaces NotFound before committing a task to a ghost agent
        self.registry.get(agent_id).await?;
        let worker = AgentWorker::new(
            agent_id.clone(),
            self.registry.clone(),
            self.queue.clone(),
            self.sessions.clone(),
            self.breakers.clone(),
            self.executor.clone(),
            RetryPolicy::from_config(&self.config.retry)
                .with_classifier(RetryClassifier::Transport),
            self.config.worker.clone(),
        );
        self.workers.attach(worker);
        info!("Spawned worker for agent '{}'", agent_id);
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.worker_count()
    }

    /// Stop workers and background tasks and wait for them to wind down.
    pub async fn shutdown(&self) {
        info!("Shutting down Plexus coordinator");
        self.shutdown.cancel();
        self.workers.shutdown().await;
        let background = std::mem::take(&mut *self.background.lock());
        for handle in background {
            if let Err(e) = handle.await {
                warn!("Background task did not shut down cleanly: {}", e);
            }
        }
        info!("Plexus coordinator shutdown complete");
    }

    // ========================================================================
    // Subsystem accessors
    // ========================================================================

    pub fn config(&self) -> &PlexusConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn dlq(&self) -> &Arc<DeadLetterQueue> {
        &self.dlq
    }

    pub fn coordination(&self) -> &Arc<CoordinationLog> {
        &self.coordination
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn workflows(&self) -> &Arc<WorkflowEngine> {
        &self.workflows
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }
}
