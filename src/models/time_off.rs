use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::schedule::ScheduleConflict;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockedTimeReason {
    TimeOff,
    Break,
    Meeting,
    Maintenance,
    Other,
}

impl BlockedTimeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedTimeReason::TimeOff => "time_off",
            BlockedTimeReason::Break => "break",
            BlockedTimeReason::Meeting => "meeting",
            BlockedTimeReason::Maintenance => "maintenance",
            BlockedTimeReason::Other => "other",
        }
    }
}

impl fmt::Display for BlockedTimeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for BlockedTimeReason {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "time_off" => Ok(BlockedTimeReason::TimeOff),
            "break" => Ok(BlockedTimeReason::Break),
            "meeting" => Ok(BlockedTimeReason::Meeting),
            "maintenance" => Ok(BlockedTimeReason::Maintenance),
            "other" => Ok(BlockedTimeReason::Other),
            other => Err(format!("unsupported blocked time reason: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockedTimeRecord {
    pub id: String,
    pub staff_id: String,
    pub salon_id: String,
    pub start_time: String,
    pub end_time: String,
    pub reason: BlockedTimeReason,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub time_off_request_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockedTimeCreateInput {
    pub staff_id: String,
    pub start_time: String,
    pub end_time: String,
    pub reason: BlockedTimeReason,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimeOffStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl TimeOffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOffStatus::Pending => "pending",
            TimeOffStatus::Approved => "approved",
            TimeOffStatus::Rejected => "rejected",
            TimeOffStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TimeOffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TimeOffStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(TimeOffStatus::Pending),
            "approved" => Ok(TimeOffStatus::Approved),
            "rejected" => Ok(TimeOffStatus::Rejected),
            "cancelled" => Ok(TimeOffStatus::Cancelled),
            other => Err(format!("unsupported time-off status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeOffRequestRecord {
    pub id: String,
    pub staff_id: String,
    /// Inclusive `YYYY-MM-DD` range.
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: TimeOffStatus,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<String>,
    #[serde(default)]
    pub review_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeOffRequestInput {
    pub staff_id: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A new blocked interval and the bookings it now collides with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockedTimeChange {
    pub blocked_time: BlockedTimeRecord,
    pub conflicts: Vec<ScheduleConflict>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeOffDecision {
    pub request: TimeOffRequestRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_time: Option<BlockedTimeRecord>,
    #[serde(default)]
    pub conflicts: Vec<ScheduleConflict>,
}
