use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A caregiver who can be routed through a day's visits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Identifier for the caregiver, e.g. a staff id.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Service types the caregiver is qualified for.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Upper bound on committed visit minutes per date. Must be non-negative.
    pub max_minutes_per_day: i64,
    /// Inactive caregivers are never scheduled.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Resource {
    pub fn new(id: impl Into<String>, max_minutes_per_day: i64) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            capabilities: BTreeSet::new(),
            max_minutes_per_day,
            active: true,
        }
    }

    pub fn with_capabilities<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.capabilities = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn can_perform(&self, service_type: &str) -> bool {
        self.capabilities.contains(service_type)
    }
}
