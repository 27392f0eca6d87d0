use serde::Serialize;

/// One row of the per-tick status table.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub time: f64,
    pub age: f64,
    pub ignore: bool,
    pub id: String,
    pub loss: f64,
    pub progress: Option<f64>,
    pub growth: Option<f64>,
    pub limit: Option<f64>,
    pub limit_norm: Option<f64>,
    pub watching: bool,
    pub completing: bool,
}
