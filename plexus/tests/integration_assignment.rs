//! Integration tests for capability-based assignment.
//!
//! Covers:
//! - Capacity-aware availability lookups
//! - Heartbeat freshness and tier filtering
//! - Atomic claims under contention
//! - Dispatch ordering by priority, then deadline

mod common;

use common::*;
use chrono::{Duration as ChronoDuration, Utc};
use plexus::prelude::*;
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Availability
// ============================================================================

#[tokio::test]
async fn test_capacity_scenario_two_slots() {
    let coordinator = harness(Arc::new(EchoExecutor));
    let session = open_session(&coordinator).await;
    let agent = register_specialist(&coordinator, "scanner-1", &["scan"], 2).await;

    let caps = vec!["scan".to_string()];
    let available = coordinator.registry().find_available(&caps, None).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].agent_id, agent);

    // Fill both slots
    for _ in 0..2 {
        let item = coordinator
            .queue()
            .create(NewWorkItem::new(session, "scan", json!({})))
            .await
            .unwrap();
        coordinator.queue().claim(item.id, &agent).await.unwrap();
    }
    assert_eq!(coordinator.registry().current_load(&agent).await.unwrap(), 2);

    let available = coordinator.registry().find_available(&caps, None).await.unwrap();
    assert!(available.is_empty());
}

#[tokio::test]
async fn test_stale_heartbeat_excludes_agent() {
    let coordinator = harness(Arc::new(EchoExecutor));
    let agent = register_specialist(&coordinator, "scanner-1", &["scan"], 2).await;

    // Age the heartbeat far past the freshness window
    let mut row = coordinator.registry().get(&agent).await.unwrap();
    row.last_heartbeat = Utc::now() - ChronoDuration::hours(1);
    coordinator.storage().put_agent(&row).await.unwrap();

    let caps = vec!["scan".to_string()];
    assert!(coordinator
        .registry()
        .find_available(&caps, None)
        .await
        .unwrap()
        .is_empty());

    // A heartbeat brings it back
    coordinator.registry().heartbeat(&agent).await.unwrap();
    assert_eq!(
        coordinator
            .registry()
            .find_available(&caps, None)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_tier_filter() {
    let coordinator = harness(Arc::new(EchoExecutor));
    register_specialist(&coordinator, "scanner-1", &["scan"], 2).await;
    coordinator
        .registry()
        .register(
            AgentId::new("manager-1"),
            AgentTier::Manager,
            ["scan".to_string()],
            4,
        )
        .await
        .unwrap();

    let caps = vec!["scan".to_string()];
    let managers = coordinator
        .registry()
        .find_available(&caps, Some(AgentTier::Manager))
        .await
        .unwrap();
    assert_eq!(managers.len(), 1);
    assert_eq!(managers[0].agent_id, AgentId::new("manager-1"));

    let everyone = coordinator.registry().find_available(&caps, None).await.unwrap();
    assert_eq!(everyone.len(), 2);
}

// ============================================================================
// Claims
// ============================================================================

#[tokio::test]
async fn test_claim_contention_single_winner() {
    let coordinator = Arc::new(harness(Arc::new(EchoExecutor)));
    let session = open_session(&coordinator).await;
    let item = coordinator
        .queue()
        .create(NewWorkItem::new(session, "scan", json!({})))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..8 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .queue()
                .claim(item.id, &AgentId::new(format!("agent-{n}")))
                .await
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected claim error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);

    let after = coordinator.queue().get(item.id).await.unwrap();
    assert_eq!(after.status, WorkItemStatus::Assigned);
    assert!(after.assigned_agent.is_some());
}

#[tokio::test]
async fn test_claim_honors_reservation() {
    let coordinator = harness(Arc::new(EchoExecutor));
    let session = open_session(&coordinator).await;
    let reserved = coordinator
        .queue()
        .create(
            NewWorkItem::new(session, "scan", json!({}))
                .with_assignee(AgentId::new("scanner-1")),
        )
        .await
        .unwrap();

    let err = coordinator
        .queue()
        .claim(reserved.id, &AgentId::new("interloper"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let claimed = coordinator
        .queue()
        .claim(reserved.id, &AgentId::new("scanner-1"))
        .await
        .unwrap();
    assert_eq!(claimed.status, WorkItemStatus::Assigned);
}

// ============================================================================
// Dispatch ordering
// ============================================================================

#[tokio::test]
async fn test_pending_ordered_by_priority_then_deadline() {
    let coordinator = harness(Arc::new(EchoExecutor));
    let session = open_session(&coordinator).await;
    let queue = coordinator.queue();

    let soon = Utc::now() + ChronoDuration::minutes(5);
    let later = Utc::now() + ChronoDuration::hours(5);

    let relaxed = queue
        .create(NewWorkItem::new(session, "scan", json!({})).with_priority(5))
        .await
        .unwrap();
    let urgent_later = queue
        .create(
            NewWorkItem::new(session, "scan", json!({}))
                .with_priority(1)
                .with_deadline(later),
        )
        .await
        .unwrap();
    let urgent_soon = queue
        .create(
            NewWorkItem::new(session, "scan", json!({}))
                .with_priority(1)
                .with_deadline(soon),
        )
        .await
        .unwrap();
    let urgent_no_deadline = queue
        .create(NewWorkItem::new(session, "scan", json!({})).with_priority(1))
        .await
        .unwrap();

    let pending = queue.pending(None, None, None).await.unwrap();
    let ids: Vec<_> = pending.iter().map(|i| i.id).collect();
    assert_eq!(
        ids,
        vec![urgent_soon.id, urgent_later.id, urgent_no_deadline.id, relaxed.id]
    );
}
