use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::str::FromStr;

use super::{
    AssignmentStore, CommitReceipt, CommitRequest, DaySnapshot, StoreError, StoreResult,
};
use crate::resource::Resource;
use crate::route::{GeneratedBy, RouteKey, RouteStatus, RoutingContainer, total_minutes};
use crate::task::Task;
use crate::task_validation;

/// SQLite-backed store. `UNIQUE(resource_id, date)` on `routes` backs the
/// one-route-per-caregiver-per-day rule at the storage level as well.
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> StoreResult<Self> {
        let connection = Connection::open(path)?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn in_memory() -> StoreResult<Self> {
        let connection = Connection::open_in_memory()?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> StoreResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS resources (
                id TEXT PRIMARY KEY,
                resource_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS routes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id TEXT NOT NULL,
                date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                generated_by TEXT NOT NULL,
                total_minutes INTEGER NOT NULL DEFAULT 0,
                UNIQUE (resource_id, date)
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                date TEXT NOT NULL,
                start TEXT NOT NULL,
                resource_id TEXT,
                route_id INTEGER REFERENCES routes (id),
                task_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS tasks_by_date ON tasks (date);
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    pub fn route_count(&self) -> StoreResult<usize> {
        let conn = self.connection.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn write_task(conn: &Connection, task: &Task) -> StoreResult<()> {
    let json = serde_json::to_string(task)?;
    conn.execute(
        "INSERT INTO tasks (id, date, start, resource_id, route_id, task_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (id) DO UPDATE SET
            date = excluded.date,
            start = excluded.start,
            resource_id = excluded.resource_id,
            route_id = excluded.route_id,
            task_json = excluded.task_json",
        params![
            task.id,
            task.date().to_string(),
            task.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            task.resource_id,
            task.route_id,
            json
        ],
    )?;
    Ok(())
}

fn read_task(conn: &Connection, id: i32) -> StoreResult<Option<Task>> {
    let json: Option<String> = conn
        .query_row("SELECT task_json FROM tasks WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    json.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
        .transpose()
}

fn read_tasks_on(conn: &Connection, date: NaiveDate) -> StoreResult<Vec<Task>> {
    let mut stmt =
        conn.prepare("SELECT task_json FROM tasks WHERE date = ?1 ORDER BY start ASC, id ASC")?;
    let rows = stmt.query_map(params![date.to_string()], |row| row.get::<_, String>(0))?;
    let mut tasks = Vec::new();
    for json in rows {
        tasks.push(serde_json::from_str(&json?)?);
    }
    Ok(tasks)
}

fn read_route_tasks(conn: &Connection, route_id: i64) -> StoreResult<Vec<Task>> {
    let mut stmt =
        conn.prepare("SELECT task_json FROM tasks WHERE route_id = ?1 ORDER BY start ASC, id ASC")?;
    let rows = stmt.query_map(params![route_id], |row| row.get::<_, String>(0))?;
    let mut tasks = Vec::new();
    for json in rows {
        tasks.push(serde_json::from_str(&json?)?);
    }
    Ok(tasks)
}

fn resource_exists(conn: &Connection, id: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM resources WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

type RouteRow = (i64, String, String, String, String, i64);

fn route_from_row(conn: &Connection, row: RouteRow) -> StoreResult<RoutingContainer> {
    let (id, resource_id, date, status, generated_by, total) = row;
    let date = NaiveDate::from_str(&date)
        .map_err(|err| StoreError::InvalidData(format!("invalid route date '{date}': {err}")))?;
    let status = RouteStatus::from_str(&status).map_err(StoreError::InvalidData)?;
    let generated_by = GeneratedBy::from_str(&generated_by).map_err(StoreError::InvalidData)?;
    let task_ids = read_route_tasks(conn, id)?.iter().map(|task| task.id).collect();
    Ok(RoutingContainer {
        id,
        key: RouteKey::new(resource_id, date),
        status,
        generated_by,
        total_minutes: total,
        task_ids,
    })
}

fn route_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RouteRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

const ROUTE_COLUMNS: &str = "id, resource_id, date, status, generated_by, total_minutes";

fn read_route_where(
    conn: &Connection,
    clause: &str,
    args: impl rusqlite::Params,
) -> StoreResult<Option<RoutingContainer>> {
    let sql = format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE {clause}");
    let row: Option<RouteRow> = conn
        .query_row(&sql, args, route_row)
        .optional()?;
    row.map(|row| route_from_row(conn, row)).transpose()
}

fn read_route_by_key(conn: &Connection, key: &RouteKey) -> StoreResult<Option<RoutingContainer>> {
    read_route_where(
        conn,
        "resource_id = ?1 AND date = ?2",
        params![key.resource_id, key.date.to_string()],
    )
}

/// Inserts the route for `key` unless it exists; returns its id and whether
/// this call created it.
fn get_or_create_route(
    conn: &Connection,
    key: &RouteKey,
    generated_by: GeneratedBy,
) -> StoreResult<(i64, bool)> {
    let inserted = conn.execute(
        "INSERT INTO routes (resource_id, date, status, generated_by, total_minutes)
         VALUES (?1, ?2, 'draft', ?3, 0)
         ON CONFLICT (resource_id, date) DO NOTHING",
        params![key.resource_id, key.date.to_string(), generated_by.as_str()],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM routes WHERE resource_id = ?1 AND date = ?2",
        params![key.resource_id, key.date.to_string()],
        |row| row.get(0),
    )?;
    Ok((id, inserted > 0))
}

/// Routes the visits pre-assigned to `key`'s caregiver that have no route yet.
fn attach_unrouted(conn: &Connection, key: &RouteKey, route_id: i64) -> StoreResult<()> {
    let mut stmt = conn.prepare(
        "SELECT task_json FROM tasks
         WHERE date = ?1 AND resource_id = ?2 AND route_id IS NULL",
    )?;
    let rows = stmt.query_map(params![key.date.to_string(), key.resource_id], |row| {
        row.get::<_, String>(0)
    })?;
    let mut unrouted: Vec<Task> = Vec::new();
    for json in rows {
        unrouted.push(serde_json::from_str(&json?)?);
    }
    for mut task in unrouted {
        task.route_id = Some(route_id);
        write_task(conn, &task)?;
    }
    Ok(())
}

fn recompute_route(conn: &Connection, route_id: i64) -> StoreResult<()> {
    let members = read_route_tasks(conn, route_id)?;
    conn.execute(
        "UPDATE routes SET total_minutes = ?1 WHERE id = ?2",
        params![total_minutes(&members), route_id],
    )?;
    Ok(())
}

impl AssignmentStore for SqliteStore {
    fn snapshot(&self, date: NaiveDate) -> StoreResult<DaySnapshot> {
        let conn = self.connection.lock();
        let tasks = read_tasks_on(&conn, date)?;
        let mut stmt = conn.prepare("SELECT resource_json FROM resources ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut resources = Vec::new();
        for json in rows {
            resources.push(serde_json::from_str(&json?)?);
        }
        Ok(DaySnapshot {
            date,
            tasks,
            resources,
        })
    }

    fn routes_for(&self, date: NaiveDate) -> StoreResult<Vec<RoutingContainer>> {
        let conn = self.connection.lock();
        let sql = format!(
            "SELECT {ROUTE_COLUMNS} FROM routes WHERE date = ?1 ORDER BY resource_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![date.to_string()], route_row)?;
        let mut raw: Vec<RouteRow> = Vec::new();
        for row in rows {
            raw.push(row?);
        }
        raw.into_iter().map(|row| route_from_row(&conn, row)).collect()
    }

    fn commit(&self, request: &CommitRequest) -> StoreResult<CommitReceipt> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        let mut receipt = CommitReceipt::default();
        let mut touched: Vec<(RouteKey, i64)> = Vec::new();

        for assignment in &request.assignments {
            let mut task = read_task(&tx, assignment.task_id)?
                .ok_or_else(|| StoreError::NotFound(format!("task {}", assignment.task_id)))?;
            if let Some(current) = task.resource_id.as_deref() {
                return Err(StoreError::InvalidData(format!(
                    "task {} is already assigned to {}",
                    task.id, current
                )));
            }
            if task.date() != request.date {
                return Err(StoreError::InvalidData(format!(
                    "task {} is not on {}",
                    task.id, request.date
                )));
            }
            if !resource_exists(&tx, &assignment.resource_id)? {
                return Err(StoreError::NotFound(format!(
                    "resource {}",
                    assignment.resource_id
                )));
            }

            let key = RouteKey::new(assignment.resource_id.clone(), request.date);
            let (route_id, created) = get_or_create_route(&tx, &key, request.generated_by)?;
            if created {
                receipt.created += 1;
            }
            task.resource_id = Some(assignment.resource_id.clone());
            task.route_id = Some(route_id);
            write_task(&tx, &task)?;
            if !touched.iter().any(|(seen, _)| *seen == key) {
                touched.push((key, route_id));
            }
        }

        for (key, route_id) in &touched {
            attach_unrouted(&tx, key, *route_id)?;
            recompute_route(&tx, *route_id)?;
            if let Some(route) = read_route_by_key(&tx, key)? {
                super::check_planned_total(request, &route);
                receipt.routes.push(route);
            }
        }
        tx.commit()?;
        Ok(receipt)
    }

    fn upsert_task(&self, task: &Task) -> StoreResult<()> {
        task_validation::validate_task(task)?;
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        let previous_route = read_task(&tx, task.id)?.and_then(|previous| previous.route_id);
        write_task(&tx, task)?;
        for route_id in previous_route.into_iter().chain(task.route_id) {
            recompute_route(&tx, route_id)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_resource(&self, resource: &Resource) -> StoreResult<()> {
        task_validation::validate_resource(resource)?;
        let json = serde_json::to_string(resource)?;
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO resources (id, resource_json) VALUES (?1, ?2)
             ON CONFLICT (id) DO UPDATE SET resource_json = excluded.resource_json",
            params![resource.id, json],
        )?;
        Ok(())
    }

    fn find_task(&self, id: i32) -> StoreResult<Option<Task>> {
        let conn = self.connection.lock();
        read_task(&conn, id)
    }

    fn delete_task(&self, id: i32) -> StoreResult<Option<Task>> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        let Some(task) = read_task(&tx, id)? else {
            return Ok(None);
        };
        tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if let Some(route_id) = task.route_id {
            recompute_route(&tx, route_id)?;
        }
        tx.commit()?;
        Ok(Some(task))
    }

    fn assign_task(&self, task_id: i32, resource_id: &str) -> StoreResult<RoutingContainer> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        if !resource_exists(&tx, resource_id)? {
            return Err(StoreError::NotFound(format!("resource {resource_id}")));
        }
        let mut task =
            read_task(&tx, task_id)?.ok_or_else(|| StoreError::NotFound(format!("task {task_id}")))?;
        let previous_route = task.route_id;

        let key = RouteKey::new(resource_id, task.date());
        let (route_id, _) = get_or_create_route(&tx, &key, GeneratedBy::Manual)?;
        task.resource_id = Some(resource_id.to_string());
        task.route_id = Some(route_id);
        write_task(&tx, &task)?;

        if let Some(previous) = previous_route.filter(|id| *id != route_id) {
            recompute_route(&tx, previous)?;
        }
        recompute_route(&tx, route_id)?;
        let route = read_route_by_key(&tx, &key)?
            .ok_or_else(|| StoreError::NotFound(format!("route {key}")))?;
        tx.commit()?;
        Ok(route)
    }

    fn set_route_status(&self, route_id: i64, status: RouteStatus) -> StoreResult<RoutingContainer> {
        let conn = self.connection.lock();
        let changed = conn.execute(
            "UPDATE routes SET status = ?1 WHERE id = ?2",
            params![status.as_str(), route_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("route {route_id}")));
        }
        read_route_where(&conn, "id = ?1", params![route_id])?
            .ok_or_else(|| StoreError::NotFound(format!("route {route_id}")))
    }
}
