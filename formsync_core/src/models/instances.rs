use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{api::InstanceDbId, InstanceStatus};

/// A filled-in form. Instances resolve their form by `(form_id, form_version)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub db_id: Option<InstanceDbId>,
    pub form_id: String,
    pub form_version: Option<String>,
    pub instance_file_path: String,
    pub status: InstanceStatus,
    pub last_status_change: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Instance {
    pub fn new(form_id: &str, form_version: Option<&str>, instance_file_path: &str) -> Self {
        Instance {
            db_id: None,
            form_id: form_id.to_string(),
            form_version: form_version.map(|x| x.to_string()),
            instance_file_path: instance_file_path.to_string(),
            status: InstanceStatus::Incomplete,
            last_status_change: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
