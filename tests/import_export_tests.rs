use care_route::persistence::{
    load_resources_from_csv, load_snapshot_from_json, load_tasks_from_csv, save_resources_to_csv,
    save_snapshot_to_json, save_tasks_to_csv,
};
use care_route::{
    AssignmentStore, CancelToken, MemoryStore, Resource, RunRequest, Scheduler, StoreError, Task,
    VisitStatus,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Write;
use tempfile::NamedTempFile;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

fn sample_resources() -> Vec<Resource> {
    vec![
        Resource::new("r1", 480)
            .with_name("Ana Silva")
            .with_capabilities(["care", "nursing"]),
        Resource::new("r2", 240).with_capabilities(["care"]).inactive(),
    ]
}

fn sample_tasks() -> Vec<Task> {
    let mut first = Task::new(1, "care", at(8, 0), at(9, 15));
    first.client_id = Some("client-7".into());
    first.note = Some("Key in the lockbox".into());

    let mut second = Task::new(2, "nursing", at(10, 0), at(10, 45));
    second.resource_id = Some("r1".into());
    second.companion_id = Some("r2".into());

    let mut third = Task::new(3, "care", at(13, 0), at(14, 0));
    third.status = VisitStatus::Cancelled;

    vec![first, second, third]
}

#[test]
fn json_snapshot_keeps_routes_and_assignments() {
    let store = MemoryStore::with_records(sample_resources(), sample_tasks()).unwrap();
    let scheduler = Scheduler::new(store);
    let report = scheduler
        .run(&RunRequest::new(day()), &CancelToken::new())
        .unwrap();
    assert_eq!(report.assigned, 1);

    let file = NamedTempFile::new().unwrap();
    save_snapshot_to_json(scheduler.store(), file.path()).unwrap();

    let loaded = load_snapshot_from_json(file.path()).unwrap();
    assert_eq!(loaded.resources(), scheduler.store().resources());
    assert_eq!(loaded.tasks(), scheduler.store().tasks());
    assert_eq!(loaded.routes_for(day()).unwrap(), scheduler.store().routes_for(day()).unwrap());

    let reloaded = Scheduler::new(loaded);
    let again = reloaded
        .run(&RunRequest::new(day()), &CancelToken::new())
        .unwrap();
    assert_eq!(again.assigned, 0);
    assert_eq!(reloaded.store().route_count(), 1);
}

#[test]
fn json_snapshot_rejects_duplicate_task_ids() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "resources": [],
            "tasks": [
                {{"id": 1, "service_type": "care", "start": "2025-04-01T08:00:00", "end": "2025-04-01T09:00:00"}},
                {{"id": 1, "service_type": "care", "start": "2025-04-01T10:00:00", "end": "2025-04-01T11:00:00"}}
            ]
        }}"#
    )
    .unwrap();

    let err = load_snapshot_from_json(file.path()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(message) if message.contains("duplicate task id 1")));
}

#[test]
fn tasks_survive_a_csv_round_trip() {
    let tasks = sample_tasks();
    let file = NamedTempFile::new().unwrap();
    save_tasks_to_csv(&tasks, file.path()).unwrap();

    let loaded = load_tasks_from_csv(file.path()).unwrap();
    assert_eq!(loaded, tasks);
}

#[test]
fn resources_survive_a_csv_round_trip() {
    let resources = sample_resources();
    let file = NamedTempFile::new().unwrap();
    save_resources_to_csv(&resources, file.path()).unwrap();

    let loaded = load_resources_from_csv(file.path()).unwrap();
    assert_eq!(loaded, resources);
}

#[test]
fn hand_written_csv_uses_defaults_for_blank_columns() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,service_type,start,end,resource_id,companion_id,status,client_id,note").unwrap();
    writeln!(file, "5,care,2025-04-01 07:30,2025-04-01T08:30:00,,,,,").unwrap();
    writeln!(file, "6,care,2025-04-01 09:00,2025-04-01 09:30,r1,,canceled,c-1,").unwrap();

    let tasks = load_tasks_from_csv(file.path()).unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].duration_minutes(), 60);
    assert!(tasks[0].resource_id.is_none());
    assert_eq!(tasks[0].status, VisitStatus::Scheduled);
    assert_eq!(tasks[1].resource_id.as_deref(), Some("r1"));
    assert!(tasks[1].is_cancelled());
}

#[test]
fn csv_with_inverted_interval_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,service_type,start,end").unwrap();
    writeln!(file, "1,care,2025-04-01 10:00,2025-04-01 09:00").unwrap();

    let err = load_tasks_from_csv(file.path()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
}

#[test]
fn resource_csv_rejects_unknown_active_flag() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,name,capabilities,max_minutes_per_day,active").unwrap();
    writeln!(file, "r1,Ana,care;nursing,480,maybe").unwrap();

    let err = load_resources_from_csv(file.path()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(message) if message.contains("maybe")));
}

#[test]
fn resource_csv_splits_capability_tags() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,name,capabilities,max_minutes_per_day,active").unwrap();
    writeln!(file, "r1,Ana, care ; nursing ;,480,").unwrap();

    let resources = load_resources_from_csv(file.path()).unwrap();
    assert!(resources[0].active);
    assert!(resources[0].can_perform("care"));
    assert!(resources[0].can_perform("nursing"));
    assert_eq!(resources[0].capabilities.len(), 2);
}
