use zaneops_common::models::{ChangeField, ChangeType, Slot};

#[test]
fn collection_deletes_sort_before_updates_and_adds() {
    use zaneops_common::ids::{DeploymentChangeId, ServiceId};
    use zaneops_common::models::DeploymentChange;

    let make = |field: ChangeField, change_type: ChangeType| DeploymentChange {
        id: DeploymentChangeId::new(),
        service_id: ServiceId::new(),
        field,
        change_type,
        old_value: serde_json::Value::Null,
        new_value: serde_json::Value::Null,
        item_id: None,
        applied: false,
        deployment_id: None,
        created_at: chrono::Utc::now(),
    };

    let mut changes = vec![
        make(ChangeField::Source, ChangeType::Update),
        make(ChangeField::Volumes, ChangeType::Add),
        make(ChangeField::Volumes, ChangeType::Delete),
        make(ChangeField::Command, ChangeType::Update),
        make(ChangeField::Volumes, ChangeType::Update),
    ];

    changes.sort_by_key(DeploymentChange::application_rank);

    let ranks: Vec<_> = changes.iter().map(DeploymentChange::application_rank).collect();
    assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
}

#[test]
fn slot_alternates() {
    assert_eq!(Slot::Blue.opposite(), Slot::Green);
    assert_eq!(Slot::Green.opposite(), Slot::Blue);
    assert_eq!(Slot::Blue.internal_alias(), "blue.zaneops.internal");
}
