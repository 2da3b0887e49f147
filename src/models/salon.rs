use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalonRecord {
    pub id: String,
    pub name: String,
    /// IANA timezone name, e.g. `Europe/Berlin`.
    pub timezone: String,
    pub open_minute: u32,
    pub close_minute: u32,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl SalonRecord {
    pub fn operating_minutes(&self) -> u32 {
        self.close_minute.saturating_sub(self.open_minute)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalonCreateInput {
    pub name: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub open_minute: Option<u32>,
    #[serde(default)]
    pub close_minute: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: String,
    pub salon_id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub price: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCreateInput {
    pub salon_id: String,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub price: Option<f64>,
}
