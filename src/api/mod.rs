use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::core::{
    AllocationInput, BudgetLevel, BudgetStatus, CSV_CONTENT_TYPE, CSV_FILE_NAME, Catalog,
    CatalogError, DisplayRow, ExportError, GlobalParameters, PortfolioSummary, SimulationParams,
    SimulationRun, TherapyRecord, ValuationResult, budget_status, display_rows,
    encode_csv_string, render_npv_chart, render_table, run_simulation, write_csv,
};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

const CSV_DISPOSITION: &str = "attachment; filename=\"resultados_portfolio.csv\"";

const DISCOUNT_RATE_MIN_PCT: f64 = 5.0;
const DISCOUNT_RATE_MAX_PCT: f64 = 20.0;
const DEFAULT_DISCOUNT_RATE_PCT: f64 = 12.0;
const DEFAULT_AVAILABLE_FUNDING: f64 = 6.0;
const CHART_WIDTH: usize = 40;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Input(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(
    name = "c4c",
    about = "Cells for Cells investment scenario simulator (therapy NPV, ROI and risk)"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "C4C_CATALOG",
        help = "TOML catalog replacing the built-in therapy list"
    )]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one simulation and print the results table
    Run(RunArgs),
    /// Serve the web dashboard and JSON API
    Serve {
        #[arg(long, env = "C4C_PORT", default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(
        long,
        default_value_t = DEFAULT_DISCOUNT_RATE_PCT,
        help = "Discount rate in percent, between 5 and 20"
    )]
    discount_rate: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_AVAILABLE_FUNDING,
        help = "Capital available to allocate (MM USD)"
    )]
    available_funding: f64,
    #[arg(
        long = "allocate",
        value_name = "THERAPY=AMOUNT",
        value_parser = parse_allocation,
        help = "Investment in one therapy (MM USD); repeat per therapy"
    )]
    allocations: Vec<(String, f64)>,
    #[arg(long, value_name = "PATH", help = "Also write the results as CSV")]
    csv: Option<PathBuf>,
}

/// Unvalidated inputs in the units a person types them: discount rate in
/// percent, amounts in MM USD.
#[derive(Debug, Clone)]
struct RawInputs {
    discount_rate_pct: f64,
    available_funding: f64,
    allocations: Vec<(String, f64)>,
}

fn default_raw_inputs() -> RawInputs {
    RawInputs {
        discount_rate_pct: DEFAULT_DISCOUNT_RATE_PCT,
        available_funding: DEFAULT_AVAILABLE_FUNDING,
        allocations: Vec::new(),
    }
}

fn parse_allocation(raw: &str) -> Result<(String, f64), String> {
    let Some((name, amount)) = raw.rsplit_once('=') else {
        return Err(format!("expected THERAPY=AMOUNT, got {raw:?}"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing therapy name in {raw:?}"));
    }
    let amount = amount
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid amount in {raw:?}: {e}"))?;
    Ok((name.to_string(), amount))
}

fn parse_allocation_list(raw: &str) -> Result<Vec<(String, f64)>, String> {
    raw.split(';')
        .filter(|item| !item.trim().is_empty())
        .map(parse_allocation)
        .collect()
}

fn build_params(catalog: &Catalog, raw: RawInputs) -> Result<SimulationParams, String> {
    if !raw.discount_rate_pct.is_finite()
        || !(DISCOUNT_RATE_MIN_PCT..=DISCOUNT_RATE_MAX_PCT).contains(&raw.discount_rate_pct)
    {
        return Err(format!(
            "--discount-rate must be between {DISCOUNT_RATE_MIN_PCT} and {DISCOUNT_RATE_MAX_PCT}"
        ));
    }

    if !raw.available_funding.is_finite() || raw.available_funding < 0.0 {
        return Err("--available-funding must be >= 0".to_string());
    }

    let mut allocations: AllocationInput = catalog
        .therapies()
        .iter()
        .map(|t| (t.name.clone(), 0.0))
        .collect();

    for (name, amount) in raw.allocations {
        let Some(therapy) = catalog.get(&name) else {
            return Err(format!("--allocate: unknown therapy {name:?}"));
        };
        if !amount.is_finite() {
            return Err(format!("--allocate: amount for {name:?} must be a number"));
        }
        let clamped = amount.clamp(0.0, therapy.max_funding);
        if clamped != amount {
            debug!(
                therapy = %name,
                requested = amount,
                clamped,
                "allocation clamped to funding range"
            );
        }
        allocations.set(name, clamped);
    }

    Ok(SimulationParams {
        globals: GlobalParameters {
            discount_rate: raw.discount_rate_pct / 100.0,
            available_funding: raw.available_funding,
        },
        allocations,
    })
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog, CatalogError> {
    match path {
        Some(path) => {
            let catalog = Catalog::load(path)?;
            info!(path = %path.display(), therapies = catalog.len(), "loaded catalog");
            Ok(catalog)
        }
        None => Ok(Catalog::builtin()),
    }
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    let catalog = load_catalog(cli.catalog.as_deref())?;
    match cli.command {
        Command::Run(args) => {
            let report = run_once(&catalog, args)?;
            print!("{report}");
            Ok(())
        }
        Command::Serve { port } => Ok(run_http_server(port, catalog).await?),
    }
}

fn run_once(catalog: &Catalog, args: RunArgs) -> Result<String, AppError> {
    let raw = RawInputs {
        discount_rate_pct: args.discount_rate,
        available_funding: args.available_funding,
        allocations: args.allocations,
    };
    let params = build_params(catalog, raw).map_err(AppError::Input)?;
    let run = run_simulation(catalog, &params);
    let rows = display_rows(&run.results);

    if let Some(path) = &args.csv {
        write_csv(path, &rows)?;
        info!(path = %path.display(), rows = rows.len(), "wrote CSV export");
    }

    Ok(render_run_report(&run, &rows))
}

fn render_run_report(run: &SimulationRun, rows: &[DisplayRow]) -> String {
    let budget = budget_status(&run.summary);
    let tag = match budget.level {
        BudgetLevel::Success => "OK",
        BudgetLevel::Warning => "WARNING",
    };
    format!(
        "Discount rate: {:.1}%\n\n{}\n[{tag}] {}\n\nNPV by therapy (MM USD)\n{}",
        run.discount_rate * 100.0,
        render_table(rows),
        budget.message,
        render_npv_chart(rows, CHART_WIDTH),
    )
}

#[derive(Clone)]
struct AppState {
    catalog: Arc<Catalog>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    discount_rate: Option<f64>,
    available_funding: Option<f64>,
    allocations: Option<BTreeMap<String, f64>>,
}

/// Query-string form of [`SimulatePayload`]; allocations are written as
/// `Name=1.5;Other=2`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulateQuery {
    discount_rate: Option<f64>,
    available_funding: Option<f64>,
    allocations: Option<String>,
}

impl TryFrom<SimulateQuery> for SimulatePayload {
    type Error = String;

    fn try_from(query: SimulateQuery) -> Result<Self, Self::Error> {
        let allocations: Option<BTreeMap<String, f64>> = match query.allocations {
            Some(raw) => Some(parse_allocation_list(&raw)?.into_iter().collect()),
            None => None,
        };
        Ok(SimulatePayload {
            discount_rate: query.discount_rate,
            available_funding: query.available_funding,
            allocations,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogResponse<'a> {
    therapies: &'a [TherapyRecord],
    discount_rate_min: f64,
    discount_rate_max: f64,
    default_discount_rate: f64,
    default_available_funding: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    discount_rate: f64,
    results: Vec<ValuationResult>,
    rows: Vec<DisplayRow>,
    summary: PortfolioSummary,
    budget: BudgetStatus,
    csv_file_name: &'static str,
    csv: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16, catalog: Catalog) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let state = AppState {
        catalog: Arc::new(catalog),
    };
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route("/api/catalog", get(catalog_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/export.csv",
            get(export_get_handler).post(export_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "simulator HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn catalog_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, catalog_response(&state.catalog))
}

async fn simulate_get_handler(
    State(state): State<AppState>,
    Query(query): Query<SimulateQuery>,
) -> Response {
    match SimulatePayload::try_from(query) {
        Ok(payload) => simulate_handler_impl(&state.catalog, payload),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn simulate_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state.catalog, payload)
}

async fn export_get_handler(
    State(state): State<AppState>,
    Query(query): Query<SimulateQuery>,
) -> Response {
    match SimulatePayload::try_from(query) {
        Ok(payload) => export_handler_impl(&state.catalog, payload),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn export_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    export_handler_impl(&state.catalog, payload)
}

fn simulate_handler_impl(catalog: &Catalog, payload: SimulatePayload) -> Response {
    let params = match params_from_payload(catalog, payload) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let run = run_simulation(catalog, &params);
    match build_simulate_response(run) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn export_handler_impl(catalog: &Catalog, payload: SimulatePayload) -> Response {
    let params = match params_from_payload(catalog, payload) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let run = run_simulation(catalog, &params);
    match encode_csv_string(&display_rows(&run.results)) {
        Ok(body) => with_cache_control((
            [
                (header::CONTENT_TYPE, CSV_CONTENT_TYPE),
                (header::CONTENT_DISPOSITION, CSV_DISPOSITION),
            ],
            body,
        )),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn params_from_json(catalog: &Catalog, json: &str) -> Result<SimulationParams, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    params_from_payload(catalog, payload)
}

fn params_from_payload(
    catalog: &Catalog,
    payload: SimulatePayload,
) -> Result<SimulationParams, String> {
    let mut raw = default_raw_inputs();

    if let Some(v) = payload.discount_rate {
        raw.discount_rate_pct = v;
    }
    if let Some(v) = payload.available_funding {
        raw.available_funding = v;
    }
    if let Some(v) = payload.allocations {
        raw.allocations = v.into_iter().collect();
    }

    build_params(catalog, raw)
}

fn catalog_response(catalog: &Catalog) -> CatalogResponse<'_> {
    CatalogResponse {
        therapies: catalog.therapies(),
        discount_rate_min: DISCOUNT_RATE_MIN_PCT,
        discount_rate_max: DISCOUNT_RATE_MAX_PCT,
        default_discount_rate: DEFAULT_DISCOUNT_RATE_PCT,
        default_available_funding: DEFAULT_AVAILABLE_FUNDING,
    }
}

fn build_simulate_response(run: SimulationRun) -> Result<SimulateResponse, ExportError> {
    let rows = display_rows(&run.results);
    let csv = encode_csv_string(&rows)?;
    Ok(SimulateResponse {
        discount_rate: run.discount_rate,
        budget: budget_status(&run.summary),
        summary: run.summary,
        results: run.results,
        rows,
        csv_file_name: CSV_FILE_NAME,
        csv,
    })
}
