use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapyRecord {
    pub name: String,
    pub phase: String,
    pub patent_factor: f64,
    pub time_to_market_years: f64,
    pub strategic_score: u32,
    pub max_funding: f64,
}

impl TherapyRecord {
    pub fn base_value(&self) -> f64 {
        f64::from(self.strategic_score) * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationInput {
    amounts: HashMap<String, f64>,
}

impl AllocationInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, therapy: impl Into<String>, amount: f64) {
        self.amounts.insert(therapy.into(), amount);
    }

    /// Amount allocated to `therapy`; therapies never set count as 0.0.
    pub fn get(&self, therapy: &str) -> f64 {
        self.amounts.get(therapy).copied().unwrap_or(0.0)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for AllocationInput {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut input = AllocationInput::new();
        for (name, amount) in iter {
            input.set(name, amount);
        }
        input
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalParameters {
    pub discount_rate: f64,
    pub available_funding: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub globals: GlobalParameters,
    pub allocations: AllocationInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResult {
    pub therapy_name: String,
    pub investment: f64,
    pub progress_fraction: f64,
    pub net_present_value: f64,
    pub return_ratio: f64,
    pub risk_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_allocated: f64,
    pub available_funding: f64,
    pub within_budget: bool,
    pub overage: f64,
}

#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub discount_rate: f64,
    pub results: Vec<ValuationResult>,
    pub summary: PortfolioSummary,
}
