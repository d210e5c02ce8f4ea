use crate::resource::Resource;
use crate::task::Task;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn validate_task(task: &Task) -> Result<(), ValidationError> {
    if task.start >= task.end {
        return Err(ValidationError::new(format!(
            "task {} must start before it ends (start {}, end {})",
            task.id, task.start, task.end
        )));
    }

    if task.service_type.trim().is_empty() {
        return Err(ValidationError::new(format!(
            "task {} requires a non-empty service_type",
            task.id
        )));
    }

    if let Some(resource_id) = task.resource_id.as_deref() {
        if resource_id.trim().is_empty() {
            return Err(ValidationError::new(format!(
                "task {} has an empty resource_id",
                task.id
            )));
        }
        if task.companion_id.as_deref() == Some(resource_id) {
            return Err(ValidationError::new(format!(
                "task {} lists {} as both primary and companion caregiver",
                task.id, resource_id
            )));
        }
    }

    Ok(())
}

pub fn validate_resource(resource: &Resource) -> Result<(), ValidationError> {
    if resource.id.trim().is_empty() {
        return Err(ValidationError::new("resource requires a non-empty id"));
    }
    if resource.max_minutes_per_day < 0 {
        return Err(ValidationError::new(format!(
            "resource {} has negative max_minutes_per_day {}",
            resource.id, resource.max_minutes_per_day
        )));
    }
    if let Some(tag) = resource.capabilities.iter().find(|tag| tag.trim().is_empty()) {
        return Err(ValidationError::new(format!(
            "resource {} has a blank capability tag '{}'",
            resource.id, tag
        )));
    }
    Ok(())
}

pub fn validate_task_collection(tasks: &[Task]) -> Result<(), ValidationError> {
    let mut seen_ids = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen_ids.insert(task.id) {
            return Err(ValidationError::new(format!(
                "duplicate task id {}",
                task.id
            )));
        }
        validate_task(task)?;
    }
    Ok(())
}

pub fn validate_resource_collection(resources: &[Resource]) -> Result<(), ValidationError> {
    let mut seen_ids = HashSet::with_capacity(resources.len());
    for resource in resources {
        if !seen_ids.insert(resource.id.as_str()) {
            return Err(ValidationError::new(format!(
                "duplicate resource id {}",
                resource.id
            )));
        }
        validate_resource(resource)?;
    }
    Ok(())
}
