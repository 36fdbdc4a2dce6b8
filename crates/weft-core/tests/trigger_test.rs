// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end trigger tests: publish, stimulate, re-index, retract.

mod common;

use common::*;
use serde_json::json;
use weft_core::messages::TriggerOptions;
use weft_engine::WorkflowDefinition;

fn orders_stimulus() -> serde_json::Value {
    json!({"path": "/orders"})
}

#[tokio::test]
async fn test_trigger_starts_exactly_one_instance() {
    let ctx = TestContext::new();

    // The triggered workflow suspends on an approval so the started
    // instance is observable as non-terminal.
    ctx.host_factory.set_behavior(
        "order-intake",
        StubBehavior::waiting(vec![WaitPoint::new(
            "approval",
            "OrderApproval",
            json!({"order": 1}),
        )]),
    );
    ctx.publish(http_definition("order-intake", "/orders")).await;

    let result = ctx
        .runtime
        .trigger_workflows("HttpEndpoint", &orders_stimulus(), &TriggerOptions::default())
        .await
        .expect("trigger succeeds");

    assert_eq!(result.started.len(), 1, "exactly one instance started");
    assert!(result.resumed.is_empty(), "no instance existed to resume");
    assert!(result.failures.is_empty());

    let record = ctx
        .store
        .find_instance(&result.started[0].instance_id)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(record.status.as_str(), "running" | "suspended"));
}

#[tokio::test]
async fn test_republish_without_trigger_stops_starts() {
    let ctx = TestContext::new();
    ctx.publish(http_definition("order-intake", "/orders")).await;

    let first = ctx
        .runtime
        .trigger_workflows("HttpEndpoint", &orders_stimulus(), &TriggerOptions::default())
        .await
        .unwrap();
    assert_eq!(first.started.len(), 1);

    // Re-publish the same definition with the trigger removed.
    let retriggered = WorkflowDefinition {
        version: 2,
        triggers: Vec::new(),
        ..http_definition("order-intake", "/orders")
    };
    ctx.publish(retriggered).await;

    let second = ctx
        .runtime
        .trigger_workflows("HttpEndpoint", &orders_stimulus(), &TriggerOptions::default())
        .await
        .unwrap();
    assert!(second.started.is_empty(), "trigger was removed");
}

#[tokio::test]
async fn test_rejected_candidate_is_not_started() {
    let ctx = TestContext::new();

    // Two definitions share the same trigger hash; one rejects admission.
    ctx.publish(http_definition("accepting", "/orders")).await;
    ctx.publish(http_definition("rejecting", "/orders")).await;
    ctx.host_factory
        .set_behavior("rejecting", StubBehavior::rejecting());

    let result = ctx
        .runtime
        .start_workflows("HttpEndpoint", &orders_stimulus(), &TriggerOptions::default())
        .await
        .unwrap();

    assert_eq!(result.succeeded.len(), 1);
    assert!(result.failures.is_empty(), "a rejection is not a failure");

    let record = ctx
        .store
        .find_instance(&result.succeeded[0].instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.definition_id, "accepting");
}

#[tokio::test]
async fn test_failed_candidate_does_not_abort_the_rest() {
    let ctx = TestContext::new();
    ctx.publish(http_definition("healthy", "/orders")).await;
    ctx.publish(http_definition("orphaned", "/orders")).await;

    // Leave the orphaned definition's triggers indexed but delete the
    // definition itself, so its can-start check fails.
    ctx.definitions.delete("orphaned");

    let result = ctx
        .runtime
        .start_workflows("HttpEndpoint", &orders_stimulus(), &TriggerOptions::default())
        .await
        .unwrap();

    assert_eq!(result.succeeded.len(), 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].definition_id.as_deref(), Some("orphaned"));
    assert_eq!(result.failures[0].error_code, "DEFINITION_NOT_FOUND");
}

#[tokio::test]
async fn test_trigger_starts_and_resumes_in_one_pass() {
    let ctx = TestContext::new();

    // An untriggered definition whose instances wait on the /orders
    // stimulus, plus a definition started by that same stimulus.
    ctx.host_factory.set_behavior(
        "order-waiter",
        StubBehavior::waiting(vec![WaitPoint::new(
            "next-order",
            "HttpEndpoint",
            orders_stimulus(),
        )]),
    );
    ctx.publish(plain_definition("order-waiter")).await;
    ctx.publish(http_definition("order-intake", "/orders")).await;

    let waiter = ctx
        .runtime
        .start_workflow("order-waiter", Default::default())
        .await
        .unwrap();

    // One stimulus starts a fresh order-intake instance AND resumes the
    // suspended waiter.
    let result = ctx
        .runtime
        .trigger_workflows("HttpEndpoint", &orders_stimulus(), &TriggerOptions::default())
        .await
        .unwrap();

    assert_eq!(result.started.len(), 1);
    assert_eq!(result.resumed.len(), 1);
    assert_eq!(result.resumed[0].instance_id, waiter.instance_id);
    assert!(result.failures.is_empty());

    let record = ctx
        .store
        .find_instance(&waiter.instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "finished");
}

#[tokio::test]
async fn test_find_workflows_collects_without_executing() {
    let ctx = TestContext::new();
    ctx.publish(http_definition("order-intake", "/orders")).await;

    let matches = ctx
        .runtime
        .find_workflows(&weft_core::messages::WorkflowsFilter {
            activity_type_name: "HttpEndpoint".to_string(),
            payload: orders_stimulus(),
            correlation_id: None,
            input: None,
        })
        .await
        .unwrap();

    assert_eq!(matches.len(), 1);
    assert!(matches!(
        matches[0],
        weft_core::messages::WorkflowMatch::Startable { .. }
    ));

    // Collecting did not create any durable instance.
    assert_eq!(ctx.store.count_running(None, None, None).await.unwrap(), 0);

    // Executing the match does.
    let executed = ctx
        .runtime
        .execute_workflow(&matches[0], None)
        .await
        .unwrap();
    assert!(
        ctx.store
            .find_instance(&executed.instance_id)
            .await
            .unwrap()
            .is_some()
    );
}
