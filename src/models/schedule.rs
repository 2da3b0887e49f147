use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::appointment::AppointmentRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    AppointmentOverlap,
    BlockedTimeOverlap,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::AppointmentOverlap => "appointment_overlap",
            ConflictType::BlockedTimeOverlap => "blocked_time_overlap",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConflictType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "appointment_overlap" => Ok(ConflictType::AppointmentOverlap),
            "blocked_time_overlap" => Ok(ConflictType::BlockedTimeOverlap),
            other => Err(format!("unsupported conflict type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl ConflictSeverity {
    pub fn rank(&self) -> u8 {
        match self {
            ConflictSeverity::High => 0,
            ConflictSeverity::Medium => 1,
            ConflictSeverity::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    RescheduleAppointment,
    ReassignStaff,
    CancelAppointment,
    SplitAppointment,
    ExtendWorkingHours,
    AddStaffBreak,
    BookDifferentResource,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::RescheduleAppointment => "reschedule_appointment",
            ResolutionStrategy::ReassignStaff => "reassign_staff",
            ResolutionStrategy::CancelAppointment => "cancel_appointment",
            ResolutionStrategy::SplitAppointment => "split_appointment",
            ResolutionStrategy::ExtendWorkingHours => "extend_working_hours",
            ResolutionStrategy::AddStaffBreak => "add_staff_break",
            ResolutionStrategy::BookDifferentResource => "book_different_resource",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected overlap. Computed on demand and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConflict {
    /// `<conflict_type>:<first entity>:<second entity>`.
    pub id: String,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub staff_id: String,
    pub entity_ids: Vec<String>,
    pub overlap_start: String,
    pub overlap_end: String,
    pub message: String,
    pub resolution_options: Vec<ResolutionStrategy>,
}

impl ScheduleConflict {
    pub fn involves(&self, entity_id: &str) -> bool {
        self.entity_ids.iter().any(|id| id == entity_id)
    }
}

/// A remediation for a conflict, keyed by strategy name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum ConflictResolution {
    #[serde(rename_all = "camelCase")]
    RescheduleAppointment {
        appointment_id: String,
        /// `HH:MM` on the appointment's current day, or an RFC 3339 timestamp.
        new_time: String,
        #[serde(default)]
        new_staff_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ReassignStaff {
        appointment_id: String,
        new_staff_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CancelAppointment {
        appointment_id: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    SplitAppointment {
        appointment_id: String,
        split_at: String,
    },
    #[serde(rename_all = "camelCase")]
    ExtendWorkingHours { staff_id: String, extra_minutes: i64 },
    #[serde(rename_all = "camelCase")]
    AddStaffBreak {
        staff_id: String,
        start_time: String,
        duration_minutes: i64,
    },
    #[serde(rename_all = "camelCase")]
    BookDifferentResource {
        appointment_id: String,
        resource_id: String,
    },
}

impl ConflictResolution {
    pub fn strategy(&self) -> ResolutionStrategy {
        match self {
            ConflictResolution::RescheduleAppointment { .. } => {
                ResolutionStrategy::RescheduleAppointment
            }
            ConflictResolution::ReassignStaff { .. } => ResolutionStrategy::ReassignStaff,
            ConflictResolution::CancelAppointment { .. } => ResolutionStrategy::CancelAppointment,
            ConflictResolution::SplitAppointment { .. } => ResolutionStrategy::SplitAppointment,
            ConflictResolution::ExtendWorkingHours { .. } => ResolutionStrategy::ExtendWorkingHours,
            ConflictResolution::AddStaffBreak { .. } => ResolutionStrategy::AddStaffBreak,
            ConflictResolution::BookDifferentResource { .. } => {
                ResolutionStrategy::BookDifferentResource
            }
        }
    }

    pub fn target_appointment(&self) -> Option<&str> {
        match self {
            ConflictResolution::RescheduleAppointment { appointment_id, .. }
            | ConflictResolution::ReassignStaff { appointment_id, .. }
            | ConflictResolution::CancelAppointment { appointment_id, .. }
            | ConflictResolution::SplitAppointment { appointment_id, .. }
            | ConflictResolution::BookDifferentResource { appointment_id, .. } => {
                Some(appointment_id.as_str())
            }
            ConflictResolution::ExtendWorkingHours { .. }
            | ConflictResolution::AddStaffBreak { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub success: bool,
    pub new_conflicts: Vec<ScheduleConflict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<AppointmentRecord>,
}

impl ResolutionOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            new_conflicts: Vec::new(),
            message: Some(message.into()),
            appointment: None,
        }
    }
}

/// A direct appointment edit together with the conflicts it now takes part in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentChange {
    pub appointment: AppointmentRecord,
    pub conflicts: Vec<ScheduleConflict>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveWeights {
    #[serde(default)]
    pub maximize_utilization: f64,
    #[serde(default)]
    pub minimize_wait_time: f64,
    #[serde(default)]
    pub maximize_revenue: f64,
    #[serde(default)]
    pub balance_workload: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            maximize_utilization: 0.25,
            minimize_wait_time: 0.25,
            maximize_revenue: 0.25,
            balance_workload: 0.25,
        }
    }
}

impl ObjectiveWeights {
    /// Weights scaled to sum to 1. Negative weights count as zero and an
    /// all-zero set falls back to equal weights.
    pub fn normalized(&self) -> Self {
        let clamp = |value: f64| if value.is_finite() { value.max(0.0) } else { 0.0 };
        let raw = [
            clamp(self.maximize_utilization),
            clamp(self.minimize_wait_time),
            clamp(self.maximize_revenue),
            clamp(self.balance_workload),
        ];
        let total: f64 = raw.iter().sum();
        if total <= f64::EPSILON {
            return Self::default();
        }
        Self {
            maximize_utilization: raw[0] / total,
            minimize_wait_time: raw[1] / total,
            maximize_revenue: raw[2] / total,
            balance_workload: raw[3] / total,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    pub start_minute: u32,
    pub end_minute: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardConstraints {
    #[serde(default)]
    pub working_hours: Option<WorkingHours>,
    #[serde(default)]
    pub minimum_break_minutes: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingCriteria {
    #[serde(default)]
    pub objectives: ObjectiveWeights,
    #[serde(default)]
    pub constraints: HardConstraints,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationMetrics {
    pub utilization_rate: f64,
    pub average_wait_minutes: f64,
    pub workload_balance: f64,
    pub conflict_count: usize,
    pub revenue: f64,
    #[serde(default)]
    pub satisfaction: Option<f64>,
    pub booked_minutes: i64,
    pub capacity_minutes: i64,
    pub active_staff_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleChangeType {
    MoveAppointment,
    ReassignStaff,
    AssignAppointment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleChange {
    pub id: String,
    pub change_type: ScheduleChangeType,
    /// Appointment id for moves and reassignments, pending id for assignments.
    pub target_id: String,
    pub staff_id: String,
    #[serde(default)]
    pub previous_staff_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub estimated_improvement: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub success: bool,
    pub metrics: OptimizationMetrics,
    pub conflicts: Vec<ScheduleConflict>,
    pub suggestions: Vec<ScheduleChange>,
    pub score: f64,
    pub computation_ms: u64,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How far an unassigned booking may drift from the requested start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Flexibility {
    None,
    Low,
    Medium,
    High,
}

impl Flexibility {
    /// Maximum delay in minutes; `None` means anywhere later that day.
    pub fn max_delay_minutes(&self) -> Option<i64> {
        match self {
            Flexibility::None => Some(0),
            Flexibility::Low => Some(30),
            Flexibility::Medium => Some(120),
            Flexibility::High => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAppointment {
    pub id: String,
    pub salon_id: String,
    pub customer_id: String,
    pub service_id: String,
    pub requested_start: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub priority: i32,
    pub flexibility: Flexibility,
    #[serde(default)]
    pub preferred_staff_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentOutcome {
    pub assigned: Vec<ScheduleChange>,
    pub failed: Vec<PendingAppointment>,
    pub failure_reasons: BTreeMap<String, String>,
}
