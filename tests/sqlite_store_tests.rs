#![cfg(feature = "sqlite")]

use care_route::persistence::{CommitRequest, CommittedAssignment, RouteTotal};
use care_route::{
    AssignmentStore, CancelToken, GeneratedBy, Resource, RouteStatus, RunRequest, Scheduler,
    SqliteStore, StoreError, Task, VisitStatus,
};
use chrono::{NaiveDate, NaiveDateTime};
use tempfile::NamedTempFile;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

fn seeded(store: &SqliteStore) {
    store
        .upsert_resource(&Resource::new("r1", 480).with_capabilities(["A"]).with_name("Ana"))
        .unwrap();
    store
        .upsert_resource(&Resource::new("r2", 480).with_capabilities(["B"]))
        .unwrap();
    store.upsert_task(&Task::new(1, "A", at(9, 0), at(10, 0))).unwrap();
    store.upsert_task(&Task::new(2, "A", at(11, 0), at(12, 30))).unwrap();
    store.upsert_task(&Task::new(3, "B", at(9, 0), at(10, 0))).unwrap();
}

#[test]
fn sqlite_snapshot_returns_tasks_of_the_date_only() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    let tomorrow = day().succ_opt().unwrap();
    store
        .upsert_task(&Task::new(
            4,
            "A",
            tomorrow.and_hms_opt(9, 0, 0).unwrap(),
            tomorrow.and_hms_opt(10, 0, 0).unwrap(),
        ))
        .unwrap();

    let snapshot = store.snapshot(day()).unwrap();
    let ids: Vec<i32> = snapshot.tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 3, 2]);
    assert_eq!(snapshot.resources.len(), 2);
    assert_eq!(snapshot.resources[0].name, "Ana");
}

#[test]
fn sqlite_run_persists_routes_across_reopen() {
    let file = NamedTempFile::new().unwrap();
    {
        let scheduler = Scheduler::new(SqliteStore::new(file.path()).unwrap());
        seeded(scheduler.store());
        let report = scheduler
            .run(&RunRequest::new(day()), &CancelToken::new())
            .unwrap();
        assert_eq!((report.assigned, report.considered), (3, 3));
        assert_eq!(report.routes_created, 2);
    }

    let scheduler = Scheduler::new(SqliteStore::new(file.path()).unwrap());
    let routes = scheduler.store().routes_for(day()).unwrap();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].resource_id(), "r1");
    assert_eq!(routes[0].total_minutes, 150);
    assert_eq!(routes[0].total_hours(), 2.5);
    assert_eq!(routes[0].task_ids, vec![1, 2]);
    assert_eq!(routes[1].task_ids, vec![3]);

    let report = scheduler
        .run(&RunRequest::new(day()), &CancelToken::new())
        .unwrap();
    assert_eq!(report.assigned, 0);
    assert_eq!(scheduler.store().route_count().unwrap(), 2);
    assert_eq!(scheduler.store().routes_for(day()).unwrap(), routes);
}

#[test]
fn sqlite_commit_is_all_or_nothing() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);

    let request = CommitRequest {
        date: day(),
        generated_by: GeneratedBy::Solver,
        assignments: vec![
            CommittedAssignment {
                task_id: 1,
                resource_id: "r1".to_string(),
            },
            CommittedAssignment {
                task_id: 42,
                resource_id: "r1".to_string(),
            },
        ],
        totals: vec![RouteTotal {
            resource_id: "r1".to_string(),
            total_minutes: 60,
        }],
    };
    let err = store.commit(&request).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert_eq!(store.route_count().unwrap(), 0);
    assert!(store.find_task(1).unwrap().unwrap().resource_id.is_none());
}

#[test]
fn sqlite_commit_rejects_already_assigned_task() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    store.assign_task(1, "r1").unwrap();

    let request = CommitRequest {
        date: day(),
        generated_by: GeneratedBy::Solver,
        assignments: vec![CommittedAssignment {
            task_id: 1,
            resource_id: "r1".to_string(),
        }],
        totals: Vec::new(),
    };
    assert!(matches!(store.commit(&request), Err(StoreError::InvalidData(_))));
}

#[test]
fn sqlite_manual_route_is_reused_by_commit() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    let manual = store.assign_task(1, "r1").unwrap();
    assert_eq!(manual.generated_by, GeneratedBy::Manual);
    assert_eq!(manual.total_minutes, 60);

    let receipt = store
        .commit(&CommitRequest {
            date: day(),
            generated_by: GeneratedBy::Solver,
            assignments: vec![CommittedAssignment {
                task_id: 2,
                resource_id: "r1".to_string(),
            }],
            totals: vec![RouteTotal {
                resource_id: "r1".to_string(),
                total_minutes: 150,
            }],
        })
        .unwrap();
    assert_eq!(receipt.created, 0);
    assert_eq!(receipt.routes.len(), 1);
    assert_eq!(receipt.routes[0].id, manual.id);
    assert_eq!(receipt.routes[0].task_ids, vec![1, 2]);
    assert_eq!(receipt.routes[0].total_minutes, 150);
}

#[test]
fn sqlite_reassignment_moves_visit_between_routes() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    store
        .upsert_resource(&Resource::new("r3", 480).with_capabilities(["A"]))
        .unwrap();
    let first = store.assign_task(1, "r1").unwrap();
    store.assign_task(2, "r1").unwrap();

    let moved = store.assign_task(2, "r3").unwrap();
    assert_eq!(moved.task_ids, vec![2]);
    assert_eq!(moved.total_minutes, 90);

    let routes = store.routes_for(day()).unwrap();
    let r1 = routes.iter().find(|r| r.id == first.id).unwrap();
    assert_eq!(r1.task_ids, vec![1]);
    assert_eq!(r1.total_minutes, 60);
}

#[test]
fn sqlite_cancelling_a_visit_drops_it_from_the_total() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    store.assign_task(1, "r1").unwrap();
    store.assign_task(2, "r1").unwrap();

    let mut task = store.find_task(2).unwrap().unwrap();
    task.status = VisitStatus::Cancelled;
    store.upsert_task(&task).unwrap();

    let routes = store.routes_for(day()).unwrap();
    assert_eq!(routes[0].total_minutes, 60);
}

#[test]
fn sqlite_route_status_updates_and_reports_missing_routes() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    let route = store.assign_task(1, "r1").unwrap();

    let confirmed = store.set_route_status(route.id, RouteStatus::Confirmed).unwrap();
    assert_eq!(confirmed.status, RouteStatus::Confirmed);
    assert!(matches!(
        store.set_route_status(route.id + 100, RouteStatus::Completed),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn sqlite_preassigned_visit_joins_the_committed_route() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    let mut early = Task::new(9, "A", at(7, 0), at(8, 0));
    early.resource_id = Some("r1".to_string());
    store.upsert_task(&early).unwrap();

    let scheduler = Scheduler::new(store);
    let report = scheduler
        .run(&RunRequest::new(day()), &CancelToken::new())
        .unwrap();
    assert_eq!(report.assigned, 3);

    let store = scheduler.store();
    let routes = store.routes_for(day()).unwrap();
    assert_eq!(routes[0].resource_id(), "r1");
    assert_eq!(routes[0].task_ids, vec![9, 1, 2]);
    assert_eq!(routes[0].total_minutes, 210);

    let mut noted = store.find_task(1).unwrap().unwrap();
    noted.note = Some("side entrance".to_string());
    store.upsert_task(&noted).unwrap();
    assert_eq!(store.routes_for(day()).unwrap()[0].total_minutes, 210);
}

#[test]
fn sqlite_commit_ignores_a_wrong_planned_total() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    let receipt = store
        .commit(&CommitRequest {
            date: day(),
            generated_by: GeneratedBy::Solver,
            assignments: vec![CommittedAssignment {
                task_id: 2,
                resource_id: "r1".to_string(),
            }],
            totals: vec![RouteTotal {
                resource_id: "r1".to_string(),
                total_minutes: 5,
            }],
        })
        .unwrap();
    assert_eq!(receipt.routes[0].total_minutes, 90);
    assert_eq!(store.routes_for(day()).unwrap()[0].total_minutes, 90);
}

#[test]
fn sqlite_delete_refreshes_the_route_total() {
    let store = SqliteStore::in_memory().unwrap();
    seeded(&store);
    store.assign_task(1, "r1").unwrap();
    store.assign_task(2, "r1").unwrap();

    let removed = store.delete_task(1).unwrap().unwrap();
    assert_eq!(removed.id, 1);
    assert!(store.find_task(1).unwrap().is_none());
    let routes = store.routes_for(day()).unwrap();
    assert_eq!(routes[0].task_ids, vec![2]);
    assert_eq!(routes[0].total_minutes, 90);
    assert!(store.delete_task(1).unwrap().is_none());
}
