use serde::{Deserialize, Serialize};

/// One row of the shipment CSV.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShipmentRecord {
    pub id: u32,
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    /// `EOD` (or blank) for end of day, otherwise a clock time like `10:30 AM`.
    #[serde(default)]
    pub deadline: String,
    #[serde(default)]
    pub mass: f64,
    #[serde(default)]
    pub note: String,
}
