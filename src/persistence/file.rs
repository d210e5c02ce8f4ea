use super::{MemoryStore, StoreError, StoreResult};
use crate::resource::Resource;
use crate::route::RoutingContainer;
use crate::task::{Task, VisitStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Serializable image of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub routes: Vec<RoutingContainer>,
}

impl StoreSnapshot {
    pub fn from_store(store: &MemoryStore) -> StoreResult<Self> {
        let snapshot = Self {
            resources: store.resources(),
            tasks: store.tasks(),
            routes: store.routes(),
        };
        super::validate_resources(&snapshot.resources)?;
        super::validate_tasks(&snapshot.tasks)?;
        Ok(snapshot)
    }

    pub fn into_store(self) -> StoreResult<MemoryStore> {
        MemoryStore::from_parts(self.resources, self.tasks, self.routes)
    }
}

pub fn save_snapshot_to_json<P: AsRef<Path>>(store: &MemoryStore, path: P) -> StoreResult<()> {
    let snapshot = StoreSnapshot::from_store(store)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &snapshot)?;
    Ok(())
}

pub fn load_snapshot_from_json<P: AsRef<Path>>(path: P) -> StoreResult<MemoryStore> {
    let file = File::open(path)?;
    let snapshot: StoreSnapshot = serde_json::from_reader(file)?;
    snapshot.into_store()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskCsvRecord {
    id: i32,
    service_type: String,
    start: String,
    end: String,
    #[serde(default)]
    resource_id: String,
    #[serde(default)]
    companion_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    note: String,
}

impl From<&Task> for TaskCsvRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            service_type: task.service_type.clone(),
            start: task.start.format(DATETIME_FORMAT).to_string(),
            end: task.end.format(DATETIME_FORMAT).to_string(),
            resource_id: task.resource_id.clone().unwrap_or_default(),
            companion_id: task.companion_id.clone().unwrap_or_default(),
            status: task.status.as_str().to_string(),
            client_id: task.client_id.clone().unwrap_or_default(),
            note: task.note.clone().unwrap_or_default(),
        }
    }
}

impl TaskCsvRecord {
    fn into_task(self) -> StoreResult<Task> {
        let mut task = Task::new(
            self.id,
            self.service_type,
            parse_datetime(&self.start)?,
            parse_datetime(&self.end)?,
        );
        task.resource_id = parse_string_option(self.resource_id);
        task.companion_id = parse_string_option(self.companion_id);
        task.client_id = parse_string_option(self.client_id);
        task.note = parse_string_option(self.note);
        task.status = VisitStatus::from_str(&self.status).map_err(StoreError::InvalidData)?;
        Ok(task)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResourceCsvRecord {
    id: String,
    #[serde(default)]
    name: String,
    /// Capability tags separated by `;`.
    capabilities: String,
    max_minutes_per_day: i64,
    #[serde(default)]
    active: String,
}

impl From<&Resource> for ResourceCsvRecord {
    fn from(resource: &Resource) -> Self {
        Self {
            id: resource.id.clone(),
            name: resource.name.clone(),
            capabilities: resource
                .capabilities
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(";"),
            max_minutes_per_day: resource.max_minutes_per_day,
            active: resource.active.to_string(),
        }
    }
}

impl ResourceCsvRecord {
    fn into_resource(self) -> StoreResult<Resource> {
        let active = match self.active.trim().to_ascii_lowercase().as_str() {
            "" | "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(StoreError::InvalidData(format!(
                    "invalid active flag '{other}' for resource {}",
                    self.id
                )));
            }
        };
        let mut resource = Resource::new(self.id, self.max_minutes_per_day)
            .with_name(self.name)
            .with_capabilities(
                self.capabilities
                    .split(';')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty()),
            );
        resource.active = active;
        Ok(resource)
    }
}

pub fn save_tasks_to_csv<P: AsRef<Path>>(tasks: &[Task], path: P) -> StoreResult<()> {
    super::validate_tasks(tasks)?;
    let mut writer = csv::Writer::from_path(path)?;
    for task in tasks {
        writer.serialize(TaskCsvRecord::from(task))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_tasks_from_csv<P: AsRef<Path>>(path: P) -> StoreResult<Vec<Task>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut tasks = Vec::new();
    for record in reader.deserialize::<TaskCsvRecord>() {
        tasks.push(record?.into_task()?);
    }
    super::validate_tasks(&tasks)?;
    Ok(tasks)
}

pub fn save_resources_to_csv<P: AsRef<Path>>(resources: &[Resource], path: P) -> StoreResult<()> {
    super::validate_resources(resources)?;
    let mut writer = csv::Writer::from_path(path)?;
    for resource in resources {
        writer.serialize(ResourceCsvRecord::from(resource))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_resources_from_csv<P: AsRef<Path>>(path: P) -> StoreResult<Vec<Resource>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut resources = Vec::new();
    for record in reader.deserialize::<ResourceCsvRecord>() {
        resources.push(record?.into_resource()?);
    }
    super::validate_resources(&resources)?;
    Ok(resources)
}

fn parse_datetime(value: &str) -> StoreResult<NaiveDateTime> {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|err| StoreError::InvalidData(format!("invalid timestamp '{value}': {err}")))
}

fn parse_string_option(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
