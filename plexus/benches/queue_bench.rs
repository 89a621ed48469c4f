//! Work Queue Performance Benchmarks
//!
//! Benchmarks for:
//! - Dispatch-order pending scans at increasing queue depths
//! - The claim/release round trip
//! - Atomic claims under contention

use chrono::{Duration as ChronoDuration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use plexus::dlq::DeadLetterQueue;
use plexus::queue::WorkQueue;
use plexus::RetryPolicy;
use plexus_core::config::QueueConfig;
use plexus_core::id::{AgentId, SessionId, WorkItemId};
use plexus_core::traits::{Storage, TracingNotifier};
use plexus_core::types::{NewWorkItem, Session};
use plexus_storage::MemoryStorage;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

// ==============================================================================
// Benchmark Setup Helpers
// ==============================================================================

async fn setup_queue() -> (Arc<WorkQueue>, SessionId) {
    let storage = Arc::new(MemoryStorage::new());
    let dlq = Arc::new(DeadLetterQueue::new(
        storage.clone(),
        Arc::new(TracingNotifier),
    ));
    let queue = Arc::new(WorkQueue::new(
        storage.clone(),
        dlq,
        QueueConfig::default(),
        RetryPolicy::default(),
    ));

    let session = Session::new("bench-user", AgentId::new("orchestrator-1"), json!({}));
    storage.put_session(&session).await.unwrap();
    (queue, session.session_id)
}

async fn seed_pending(queue: &WorkQueue, session: SessionId, count: usize) -> Vec<WorkItemId> {
    let mut ids = Vec::with_capacity(count);
    for n in 0..count {
        let mut spec = NewWorkItem::new(session, "scan", json!({"n": n}))
            .with_priority((n % 10) as i32);
        if n % 3 == 0 {
            spec = spec.with_deadline(Utc::now() + ChronoDuration::minutes((n % 60) as i64));
        }
        let item = queue.create(spec).await.unwrap();
        ids.push(item.id);
    }
    ids
}

// ==============================================================================
// Benchmarks
// ==============================================================================

fn bench_pending_scan(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("pending_scan");
    for depth in [100usize, 1_000, 5_000] {
        let (queue, session) = rt.block_on(setup_queue());
        rt.block_on(seed_pending(&queue, session, depth));

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.to_async(&rt).iter(|| {
                let queue = queue.clone();
                async move {
                    let items = queue.pending(None, None, Some(16)).await.unwrap();
                    black_box(items);
                }
            });
        });
    }
    group.finish();
}

fn bench_claim_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (queue, session) = rt.block_on(setup_queue());
    rt.block_on(seed_pending(&queue, session, 1_000));
    let target = rt.block_on(async {
        queue
            .create(NewWorkItem::new(session, "scan", json!({})))
            .await
            .unwrap()
            .id
    });
    let agent = AgentId::new("bench-agent");

    c.bench_function("claim_release_round_trip", |b| {
        b.to_async(&rt).iter(|| {
            let queue = queue.clone();
            let agent = agent.clone();
            async move {
                let claimed = queue.claim(target, &agent).await.unwrap();
                black_box(&claimed);
                queue.release(target).await.unwrap();
            }
        });
    });
}

fn bench_contended_claim(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (queue, session) = rt.block_on(setup_queue());
    let target = rt.block_on(async {
        queue
            .create(NewWorkItem::new(session, "scan", json!({})))
            .await
            .unwrap()
            .id
    });

    let mut group = c.benchmark_group("contended_claim");
    group.sample_size(50);
    group.bench_function("claimers_8", |b| {
        b.to_async(&rt).iter(|| {
            let queue = queue.clone();
            async move {
                let handles: Vec<_> = (0..8)
                    .map(|n| {
                        let queue = queue.clone();
                        tokio::spawn(async move {
                            queue.claim(target, &AgentId::new(format!("agent-{n}"))).await
                        })
                    })
                    .collect();
                let results = futures::future::join_all(handles).await;
                black_box(&results);
                queue.release(target).await.unwrap();
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_pending_scan,
    bench_claim_release,
    bench_contended_claim
);
criterion_main!(benches);
