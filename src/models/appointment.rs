use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::salon::ServiceRecord;
use crate::models::staff::StaffSummary;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }

    /// Cancelled bookings never take part in conflict detection or capacity.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// Pending, confirmed and previously rescheduled bookings can still be moved.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::Rescheduled
        )
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        match (self, next) {
            (Pending, Confirmed | Cancelled | Rescheduled | NoShow) => true,
            (Confirmed, Completed | Cancelled | Rescheduled | NoShow) => true,
            (Rescheduled, Confirmed | Completed | Cancelled | Rescheduled | NoShow) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AppointmentStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            "rescheduled" => Ok(AppointmentStatus::Rescheduled),
            other => Err(format!("unsupported appointment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRecord {
    pub id: String,
    pub salon_id: String,
    #[serde(default)]
    pub staff_id: Option<String>,
    pub customer_id: String,
    pub service_id: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub customer_rating: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

/// An appointment joined with its staff member and service. Each relation is
/// either fully loaded or `None`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub appointment: AppointmentRecord,
    pub staff: Option<StaffSummary>,
    pub service: Option<ServiceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentCreateInput {
    pub salon_id: String,
    #[serde(default)]
    pub staff_id: Option<String>,
    pub customer_id: String,
    pub service_id: String,
    pub start_time: String,
    /// Derived from the service duration when absent.
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub price: Option<f64>,
}
