//! Presentation of a simulation run: display rows, budget banner, CSV export
//! and a terminal bar chart.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{PortfolioSummary, ValuationResult};

pub const CSV_FILE_NAME: &str = "resultados_portfolio.csv";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

pub const CSV_HEADERS: [&str; 6] = [
    "Therapy",
    "Investment (MM USD)",
    "Progress (%)",
    "NPV (MM USD)",
    "ROI",
    "Risk (%)",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// One table/CSV row. Percentages are rounded to the nearest whole percent;
/// NPV and ROI keep full precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRow {
    #[serde(rename = "Therapy")]
    pub therapy: String,
    #[serde(rename = "Investment (MM USD)")]
    pub investment: f64,
    #[serde(rename = "Progress (%)")]
    pub progress_pct: u32,
    #[serde(rename = "NPV (MM USD)")]
    pub npv: f64,
    #[serde(rename = "ROI")]
    pub roi: f64,
    #[serde(rename = "Risk (%)")]
    pub risk_pct: u32,
}

impl From<&ValuationResult> for DisplayRow {
    fn from(result: &ValuationResult) -> Self {
        DisplayRow {
            therapy: result.therapy_name.clone(),
            investment: result.investment,
            progress_pct: whole_percent(result.progress_fraction),
            npv: result.net_present_value,
            roi: result.return_ratio,
            risk_pct: whole_percent(result.risk_fraction),
        }
    }
}

pub fn display_rows(results: &[ValuationResult]) -> Vec<DisplayRow> {
    results.iter().map(DisplayRow::from).collect()
}

fn whole_percent(fraction: f64) -> u32 {
    // Halves go to the even neighbour: 12.5% shows as 12%, 37.5% as 38%.
    (fraction * 100.0).round_ties_even().max(0.0) as u32
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetLevel {
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub over_budget: bool,
    pub level: BudgetLevel,
    pub message: String,
}

pub fn budget_status(summary: &PortfolioSummary) -> BudgetStatus {
    let over_budget = summary.total_allocated > summary.available_funding;
    if over_budget {
        BudgetStatus {
            over_budget,
            level: BudgetLevel::Warning,
            message: format!(
                "Over budget! Allocated {:.2} MM USD (max {:.2} MM USD)",
                summary.total_allocated, summary.available_funding
            ),
        }
    } else {
        BudgetStatus {
            over_budget,
            level: BudgetLevel::Success,
            message: format!(
                "Budget allocated: {:.2} MM USD of {:.2} MM USD",
                summary.total_allocated, summary.available_funding
            ),
        }
    }
}

pub fn encode_csv(rows: &[DisplayRow]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_rows(&mut writer, rows)?;
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

pub fn encode_csv_string(rows: &[DisplayRow]) -> Result<String, ExportError> {
    Ok(String::from_utf8(encode_csv(rows)?)?)
}

pub fn write_csv(path: &Path, rows: &[DisplayRow]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    write_rows(&mut writer, rows)?;
    writer.flush()?;
    Ok(())
}

fn write_rows<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    rows: &[DisplayRow],
) -> Result<(), ExportError> {
    // An empty row set still gets its header line.
    if rows.is_empty() {
        writer.write_record(CSV_HEADERS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    Ok(())
}

pub fn render_table(rows: &[DisplayRow]) -> String {
    let cells: Vec<[String; 6]> = rows
        .iter()
        .map(|row| {
            [
                row.therapy.clone(),
                format!("{:.2}", row.investment),
                format!("{}%", row.progress_pct),
                format!("{:.2}", row.npv),
                format!("{:.2}", row.roi),
                format!("{}%", row.risk_pct),
            ]
        })
        .collect();

    let mut widths = CSV_HEADERS.map(|h| h.chars().count());
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &CSV_HEADERS.map(str::to_string), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));
    for line in &cells {
        push_line(&mut out, line, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let mut parts = Vec::with_capacity(cells.len());
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        let pad = width.saturating_sub(cell.chars().count());
        // Therapy names are left-aligned, numbers right-aligned.
        if i == 0 {
            parts.push(format!("{cell}{}", " ".repeat(pad)));
        } else {
            parts.push(format!("{}{cell}", " ".repeat(pad)));
        }
    }
    let _ = writeln!(out, "{}", parts.join(" | "));
}

/// Horizontal NPV bars, one per therapy, scaled so the largest NPV spans
/// `width` cells.
pub fn render_npv_chart(rows: &[DisplayRow], width: usize) -> String {
    let label_width = rows
        .iter()
        .map(|r| r.therapy.chars().count())
        .max()
        .unwrap_or(0);
    let max_npv = rows.iter().map(|r| r.npv).fold(0.0_f64, f64::max);

    let mut out = String::new();
    for row in rows {
        let len = if max_npv > 0.0 {
            ((row.npv.max(0.0) / max_npv) * width as f64).round() as usize
        } else {
            0
        };
        let pad = label_width - row.therapy.chars().count();
        let _ = writeln!(
            out,
            "{}{} | {} {:.2}",
            row.therapy,
            " ".repeat(pad),
            "#".repeat(len),
            row.npv
        );
    }
    out
}
