use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StaffStatus {
    Active,
    Inactive,
    Terminated,
}

impl StaffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffStatus::Active => "active",
            StaffStatus::Inactive => "inactive",
            StaffStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for StaffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StaffStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(StaffStatus::Active),
            "inactive" => Ok(StaffStatus::Inactive),
            "terminated" => Ok(StaffStatus::Terminated),
            other => Err(format!("unsupported staff status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffRecord {
    pub id: String,
    pub salon_id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub status: StaffStatus,
    #[serde(default)]
    pub service_ids: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl StaffRecord {
    pub fn is_active(&self) -> bool {
        self.status == StaffStatus::Active
    }

    pub fn can_perform(&self, service_id: &str) -> bool {
        self.service_ids.iter().any(|id| id == service_id)
    }

    pub fn summary(&self) -> StaffSummary {
        StaffSummary {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffSummary {
    pub id: String,
    pub display_name: String,
    pub status: StaffStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffCreateInput {
    pub salon_id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub service_ids: Vec<String>,
}

/// Recurring working hours for one day of the week (0 = Sunday).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffScheduleRecord {
    pub id: String,
    pub staff_id: String,
    pub day_of_week: u8,
    pub start_minute: u32,
    pub end_minute: u32,
    #[serde(default)]
    pub break_start_minute: Option<u32>,
    #[serde(default)]
    pub break_end_minute: Option<u32>,
    #[serde(default)]
    pub effective_from: Option<String>,
    #[serde(default)]
    pub effective_until: Option<String>,
    pub is_available: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffScheduleInput {
    pub staff_id: String,
    pub day_of_week: u8,
    pub start_minute: u32,
    pub end_minute: u32,
    #[serde(default)]
    pub break_start_minute: Option<u32>,
    #[serde(default)]
    pub break_end_minute: Option<u32>,
    #[serde(default)]
    pub effective_from: Option<String>,
    #[serde(default)]
    pub effective_until: Option<String>,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}
