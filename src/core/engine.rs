use rand::Rng;
use tracing::{debug, warn};

use super::catalog::Catalog;
use super::types::{
    AllocationInput, PortfolioSummary, SimulationParams, SimulationRun, TherapyRecord,
    ValuationResult,
};

pub const RISK_MIN: f64 = 0.6;
pub const RISK_MAX: f64 = 0.9;

/// Values every therapy in catalog order. Risk comes from the thread-local RNG,
/// so two calls with the same inputs only agree on the deterministic fields.
pub fn compute(
    catalog: &[TherapyRecord],
    allocations: &AllocationInput,
    discount_rate: f64,
) -> Vec<ValuationResult> {
    compute_with_rng(catalog, allocations, discount_rate, &mut rand::thread_rng())
}

pub fn compute_with_rng<R: Rng + ?Sized>(
    catalog: &[TherapyRecord],
    allocations: &AllocationInput,
    discount_rate: f64,
    rng: &mut R,
) -> Vec<ValuationResult> {
    let mut results = Vec::with_capacity(catalog.len());
    for therapy in catalog {
        let investment = allocations.get(&therapy.name);
        results.push(value_therapy(therapy, investment, discount_rate, rng));
    }
    results
}

pub fn summarize(
    catalog: &[TherapyRecord],
    allocations: &AllocationInput,
    available_funding: f64,
) -> PortfolioSummary {
    let total_allocated: f64 = catalog.iter().map(|t| allocations.get(&t.name)).sum();
    PortfolioSummary {
        total_allocated,
        available_funding,
        within_budget: total_allocated <= available_funding,
        overage: (total_allocated - available_funding).max(0.0),
    }
}

pub fn run_simulation(catalog: &Catalog, params: &SimulationParams) -> SimulationRun {
    let therapies = catalog.therapies();
    let results = compute(therapies, &params.allocations, params.globals.discount_rate);
    let summary = summarize(
        therapies,
        &params.allocations,
        params.globals.available_funding,
    );

    debug!(
        therapies = therapies.len(),
        discount_rate = params.globals.discount_rate,
        total_allocated = summary.total_allocated,
        "simulation run complete"
    );
    if !summary.within_budget {
        warn!(
            total_allocated = summary.total_allocated,
            available_funding = summary.available_funding,
            overage = summary.overage,
            "allocation exceeds available funding"
        );
    }

    SimulationRun {
        discount_rate: params.globals.discount_rate,
        results,
        summary,
    }
}

fn value_therapy<R: Rng + ?Sized>(
    therapy: &TherapyRecord,
    investment: f64,
    discount_rate: f64,
    rng: &mut R,
) -> ValuationResult {
    let progress = progress_fraction(investment, therapy.max_funding);
    let npv = net_present_value(therapy, progress, discount_rate);
    ValuationResult {
        therapy_name: therapy.name.clone(),
        investment,
        progress_fraction: progress,
        net_present_value: npv,
        return_ratio: return_ratio(npv, investment),
        risk_fraction: draw_risk(rng),
    }
}

fn progress_fraction(investment: f64, max_funding: f64) -> f64 {
    (investment / max_funding).min(1.0)
}

// The catalog's time-to-market value is the compounding exponent as-is.
fn discount_factor(discount_rate: f64, periods: f64) -> f64 {
    (1.0 + discount_rate).powf(periods)
}

fn net_present_value(therapy: &TherapyRecord, progress: f64, discount_rate: f64) -> f64 {
    therapy.base_value() * progress / discount_factor(discount_rate, therapy.time_to_market_years)
        * therapy.patent_factor
}

fn return_ratio(npv: f64, investment: f64) -> f64 {
    if investment > 0.0 { npv / investment } else { 0.0 }
}

fn draw_risk<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(RISK_MIN..RISK_MAX)
}
