//! Session registry behavior: lazy creation, per-session ordering, isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, Outbound};
use paperflow::events::{Choice, Command, InboundEvent};
use paperflow::operation::WorkflowKind;
use paperflow::registry::SessionRegistry;
use paperflow::session::SessionId;
use paperflow::storage::ItemRef;

fn submit(name: &str) -> InboundEvent {
    InboundEvent::ItemSubmitted {
        item: ItemRef::new(format!("remote://{name}")),
        display_name: name.to_string(),
    }
}

fn combine_script(output: &str) -> Vec<InboundEvent> {
    vec![
        InboundEvent::command(Command::Begin(WorkflowKind::Combine)),
        submit("a.pdf"),
        submit("b.pdf"),
        InboundEvent::command(Command::Done),
        InboundEvent::ChoiceSelected(Choice::ConfirmOrder),
        InboundEvent::freeform(output),
    ]
}

#[tokio::test]
async fn full_workflow_through_the_registry() {
    let harness = Harness::new();
    let registry = SessionRegistry::new(Arc::new(harness.engine), 8, Duration::from_secs(30));
    let alice = SessionId::from("alice");

    for event in combine_script("merged") {
        registry.dispatch(&alice, event).await.unwrap();
    }
    assert_eq!(registry.active_sessions().await, 1);
    registry.shutdown().await;

    assert_eq!(harness.operation.call_count(), 1);
    assert!(harness
        .transport
        .sent()
        .iter()
        .any(|outbound| matches!(outbound, Outbound::Deliver { .. })));
}

#[tokio::test]
async fn events_for_one_session_apply_in_dispatch_order() {
    let harness = Harness::new();
    let registry = SessionRegistry::new(Arc::new(harness.engine), 8, Duration::from_secs(30));
    let alice = SessionId::from("alice");

    registry
        .dispatch(
            &alice,
            InboundEvent::command(Command::Begin(WorkflowKind::Combine)),
        )
        .await
        .unwrap();
    for i in 0..5 {
        registry
            .dispatch(&alice, submit(&format!("file-{i}.pdf")))
            .await
            .unwrap();
    }
    registry
        .dispatch(&alice, InboundEvent::command(Command::Done))
        .await
        .unwrap();
    registry.shutdown().await;

    let confirmation = harness
        .transport
        .sent()
        .into_iter()
        .find_map(|outbound| match outbound {
            Outbound::Prompt { text, .. } if text.contains("in this order") => Some(text),
            _ => None,
        })
        .expect("confirmation prompt");
    // the numbered list reflects submission order
    for (index, name) in (1..=5).zip(["file-0", "file-1", "file-2", "file-3", "file-4"]) {
        assert!(confirmation.contains(&format!("{index}. {name}.pdf")));
    }
}

#[tokio::test]
async fn sessions_are_isolated() {
    let harness = Harness::new();
    let storage = harness.storage.clone();
    let registry = SessionRegistry::new(Arc::new(harness.engine), 8, Duration::from_secs(30));
    let alice = SessionId::from("alice");
    let bob = SessionId::from("bob");

    registry
        .dispatch(
            &alice,
            InboundEvent::command(Command::Begin(WorkflowKind::Combine)),
        )
        .await
        .unwrap();
    registry
        .dispatch(
            &bob,
            InboundEvent::command(Command::Begin(WorkflowKind::Combine)),
        )
        .await
        .unwrap();
    registry.dispatch(&alice, submit("a.pdf")).await.unwrap();
    registry.dispatch(&alice, submit("b.pdf")).await.unwrap();
    registry.dispatch(&bob, submit("z.pdf")).await.unwrap();

    assert_eq!(registry.active_sessions().await, 2);
    registry.shutdown().await;

    assert_eq!(storage.staged_count(&alice), 2);
    assert_eq!(storage.staged_count(&bob), 1);
}

#[tokio::test]
async fn idle_workers_expire_and_release_their_staging() {
    let harness = Harness::new();
    let storage = harness.storage.clone();
    let registry = SessionRegistry::new(
        Arc::new(harness.engine),
        8,
        Duration::from_millis(50),
    );
    let alice = SessionId::from("alice");

    registry
        .dispatch(
            &alice,
            InboundEvent::command(Command::Begin(WorkflowKind::Combine)),
        )
        .await
        .unwrap();
    registry.dispatch(&alice, submit("a.pdf")).await.unwrap();

    // let the worker drain its queue and then sit idle past the timeout
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(registry.active_sessions().await, 0);
    // expiry purged the abandoned staged file
    assert_eq!(storage.staged_count(&alice), 0);

    // a later event transparently gets a fresh worker
    registry
        .dispatch(
            &alice,
            InboundEvent::command(Command::Begin(WorkflowKind::Combine)),
        )
        .await
        .unwrap();
    assert_eq!(registry.active_sessions().await, 1);
    registry.shutdown().await;
}

#[tokio::test]
async fn cancel_queues_behind_earlier_events() {
    let harness = Harness::new();
    let storage = harness.storage.clone();
    let registry = SessionRegistry::new(Arc::new(harness.engine), 8, Duration::from_secs(30));
    let alice = SessionId::from("alice");

    registry
        .dispatch(
            &alice,
            InboundEvent::command(Command::Begin(WorkflowKind::Combine)),
        )
        .await
        .unwrap();
    registry.dispatch(&alice, submit("a.pdf")).await.unwrap();
    // the cancel does not preempt the staging event before it
    registry.dispatch(&alice, InboundEvent::Cancel).await.unwrap();
    registry.shutdown().await;

    assert_eq!(storage.staged_count(&alice), 0);
    assert!(harness
        .transport
        .sent()
        .iter()
        .any(|outbound| matches!(outbound, Outbound::Status(text) if text == "Operation cancelled.")));
    // the file was staged before the cancel purged it
    assert!(harness
        .transport
        .sent()
        .iter()
        .any(|outbound| matches!(outbound, Outbound::Status(text) if text.contains("Got it"))));
}
