mod catalog;
mod engine;
mod report;
mod types;

pub use catalog::{Catalog, CatalogError};
pub use engine::{RISK_MAX, RISK_MIN, compute, compute_with_rng, run_simulation, summarize};
pub use report::{
    BudgetLevel, BudgetStatus, CSV_CONTENT_TYPE, CSV_FILE_NAME, CSV_HEADERS, DisplayRow,
    ExportError, budget_status, display_rows, encode_csv, encode_csv_string, render_npv_chart,
    render_table, write_csv,
};
pub use types::{
    AllocationInput, GlobalParameters, PortfolioSummary, SimulationParams, SimulationRun,
    TherapyRecord, ValuationResult,
};
