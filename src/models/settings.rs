use serde::{Deserialize, Serialize};

pub const DEFAULT_SLOT_MINUTES: u32 = 30;
pub const DEFAULT_OPEN_MINUTE: u32 = 9 * 60;
pub const DEFAULT_CLOSE_MINUTE: u32 = 18 * 60;
pub const DEFAULT_OPTIMIZER_DEADLINE_MS: u64 = 2_000;
pub const DEFAULT_MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingSettings {
    /// Booking granularity; must divide an hour evenly.
    pub slot_minutes: u32,
    pub default_open_minute: u32,
    pub default_close_minute: u32,
    pub minimum_break_minutes: i64,
    /// Time budget for one optimizer pass.
    pub optimizer_deadline_ms: u64,
    pub max_suggestions: usize,
    pub updated_at: String,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            slot_minutes: DEFAULT_SLOT_MINUTES,
            default_open_minute: DEFAULT_OPEN_MINUTE,
            default_close_minute: DEFAULT_CLOSE_MINUTE,
            minimum_break_minutes: 0,
            optimizer_deadline_ms: DEFAULT_OPTIMIZER_DEADLINE_MS,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            updated_at: String::new(),
        }
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingSettingsUpdate {
    #[serde(default)]
    pub slot_minutes: Option<u32>,
    #[serde(default)]
    pub default_open_minute: Option<u32>,
    #[serde(default)]
    pub default_close_minute: Option<u32>,
    #[serde(default)]
    pub minimum_break_minutes: Option<i64>,
    #[serde(default)]
    pub optimizer_deadline_ms: Option<u64>,
    #[serde(default)]
    pub max_suggestions: Option<usize>,
}
