// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle tests: create, run, double-create, unknown instances.

mod common;

use common::*;
use weft_core::messages::{CreateInstanceRequest, StartOptions};
use weft_engine::{DefinitionHandle, WorkflowStatus};

#[tokio::test]
async fn test_start_workflow_runs_to_completion() {
    let ctx = TestContext::new();
    ctx.publish(plain_definition("order-archiver")).await;

    let result = ctx
        .runtime
        .start_workflow("order-archiver", StartOptions::default())
        .await
        .expect("start succeeds");

    assert!(result.bookmarks.is_empty());

    // The durable record reflects the terminal status.
    let record = ctx
        .store
        .find_instance(&result.instance_id)
        .await
        .unwrap()
        .expect("instance record exists");
    assert_eq!(record.status, "finished");
    assert!(record.finished_at.is_some());
}

#[tokio::test]
async fn test_start_workflow_suspends_on_wait_point() {
    let ctx = TestContext::new();
    ctx.host_factory.set_behavior(
        "order-intake",
        StubBehavior::waiting(vec![WaitPoint::new(
            "approval",
            "OrderApproval",
            serde_json::json!({"level": 1}),
        )]),
    );
    ctx.publish(plain_definition("order-intake")).await;

    let result = ctx
        .runtime
        .start_workflow("order-intake", StartOptions::default())
        .await
        .expect("start succeeds");

    assert_eq!(result.bookmarks.len(), 1);

    let record = ctx
        .store
        .find_instance(&result.instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "suspended");

    // The bookmark landed in the index under its hash.
    let hash = stimulus_hash("OrderApproval", &serde_json::json!({"level": 1}));
    let indexed = ctx.store.find_bookmarks(&hash, None).await.unwrap();
    assert_eq!(indexed.len(), 1);
    assert_eq!(indexed[0].instance_id, result.instance_id);
}

#[tokio::test]
async fn test_second_create_fails_and_leaves_first_intact() {
    let ctx = TestContext::new();
    ctx.publish(plain_definition("order-archiver")).await;

    let client = ctx.runtime.registry().client("wf-dup");
    let request = CreateInstanceRequest {
        instance_id: Some("wf-dup".to_string()),
        definition_handle: DefinitionHandle::published("order-archiver"),
        correlation_id: Some("first".to_string()),
        input: None,
        properties: None,
        parent_instance_id: None,
    };

    client.create(request.clone()).await.expect("first create succeeds");

    let error = client
        .create(CreateInstanceRequest {
            correlation_id: Some("second".to_string()),
            ..request
        })
        .await
        .expect_err("second create must fail");
    assert_eq!(error.error_code(), "INSTANCE_ALREADY_CREATED");

    // The first create's effects are unchanged.
    let record = ctx.store.find_instance("wf-dup").await.unwrap().unwrap();
    assert_eq!(record.correlation_id.as_deref(), Some("first"));
}

#[tokio::test]
async fn test_run_against_unknown_instance_is_fatal() {
    let ctx = TestContext::new();

    let error = ctx
        .runtime
        .resume_workflow("never-created", Default::default())
        .await
        .expect_err("running an unknown instance must fail");
    assert_eq!(error.error_code(), "INSTANCE_NOT_FOUND");
}

#[tokio::test]
async fn test_try_start_missing_definition_is_soft_none() {
    let ctx = TestContext::new();

    let result = ctx
        .runtime
        .try_start_workflow("no-such-definition", StartOptions::default())
        .await
        .expect("soft not-found is not an error");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_start_missing_definition_is_reported() {
    let ctx = TestContext::new();

    let error = ctx
        .runtime
        .start_workflow("no-such-definition", StartOptions::default())
        .await
        .expect_err("hard start of a missing definition fails");
    assert_eq!(error.error_code(), "DEFINITION_NOT_FOUND");
}

#[tokio::test]
async fn test_count_running_workflows() {
    let ctx = TestContext::new();
    ctx.host_factory.set_behavior(
        "order-intake",
        StubBehavior::waiting(vec![WaitPoint::new(
            "approval",
            "OrderApproval",
            serde_json::json!({}),
        )]),
    );
    ctx.publish(plain_definition("order-intake")).await;
    ctx.publish(plain_definition("order-archiver")).await;

    // Two suspended instances, one finished.
    ctx.runtime
        .start_workflow(
            "order-intake",
            StartOptions {
                correlation_id: Some("tenant-a".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    ctx.runtime
        .start_workflow("order-intake", StartOptions::default())
        .await
        .unwrap();
    ctx.runtime
        .start_workflow("order-archiver", StartOptions::default())
        .await
        .unwrap();

    use weft_core::messages::CountFilter;
    let all = ctx
        .runtime
        .count_running_workflows(&CountFilter::default())
        .await
        .unwrap();
    assert_eq!(all, 2);

    let by_definition = ctx
        .runtime
        .count_running_workflows(&CountFilter {
            definition_id: Some("order-intake".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_definition, 2);

    let by_correlation = ctx
        .runtime
        .count_running_workflows(&CountFilter {
            correlation_id: Some("tenant-a".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_correlation, 1);
}

#[tokio::test]
async fn test_cancel_workflow() {
    let ctx = TestContext::new();
    ctx.host_factory.set_behavior(
        "order-intake",
        StubBehavior::waiting(vec![WaitPoint::new(
            "approval",
            "OrderApproval",
            serde_json::json!({}),
        )]),
    );
    ctx.publish(plain_definition("order-intake")).await;

    let result = ctx
        .runtime
        .start_workflow("order-intake", StartOptions::default())
        .await
        .unwrap();

    ctx.runtime
        .cancel_workflow(&result.instance_id)
        .await
        .expect("cancel succeeds");

    let record = ctx
        .store
        .find_instance(&result.instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "cancelled");

    // Cancellation dropped the instance's bookmarks from the index.
    let hash = stimulus_hash("OrderApproval", &serde_json::json!({}));
    assert!(ctx.store.find_bookmarks(&hash, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_faulted_run_records_incidents() {
    let ctx = TestContext::new();
    ctx.host_factory
        .set_behavior("flaky", StubBehavior::faulting("downstream unavailable"));
    ctx.publish(plain_definition("flaky")).await;

    let client = ctx.runtime.registry().client("wf-faulty");
    client
        .create(CreateInstanceRequest {
            instance_id: Some("wf-faulty".to_string()),
            definition_handle: DefinitionHandle::published("flaky"),
            correlation_id: None,
            input: None,
            properties: None,
            parent_instance_id: None,
        })
        .await
        .unwrap();

    let response = client.run(Default::default()).await.expect("run returns a faulted outcome");
    assert_eq!(response.status, WorkflowStatus::Faulted);
    assert_eq!(response.incidents.len(), 1);
    assert!(response.incidents[0].message.contains("downstream unavailable"));

    // The actor survives the fault and can still serve exports.
    let state = ctx
        .runtime
        .export_workflow_state("wf-faulty")
        .await
        .unwrap();
    assert_eq!(state.status, WorkflowStatus::Faulted);
}
