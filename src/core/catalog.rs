//! The investable therapy catalog.
//!
//! The built-in catalog mirrors the Cells for Cells pipeline. A TOML file with
//! one `[[therapy]]` table per record can replace it at startup; the file is
//! validated here because the valuation engine trusts its catalog.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::types::TherapyRecord;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("catalog must contain at least one therapy")]
    Empty,
    #[error("therapy name must not be empty")]
    EmptyName,
    #[error("duplicate therapy name: {0}")]
    DuplicateName(String),
    #[error("therapy {name}: {field} {reason}")]
    InvalidField {
        name: String,
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    therapies: Vec<TherapyRecord>,
}

impl Catalog {
    pub fn new(therapies: Vec<TherapyRecord>) -> Result<Self, CatalogError> {
        if therapies.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for therapy in &therapies {
            validate_record(therapy)?;
            if !seen.insert(therapy.name.as_str()) {
                return Err(CatalogError::DuplicateName(therapy.name.clone()));
            }
        }

        Ok(Self { therapies })
    }

    pub fn builtin() -> Self {
        let therapies = vec![
            record("CELLISTEM®OA", "Lab completed", 1.0, 11.0, 5, 12.0),
            record("CELLISTEM®OA 2.0", "Lab completed", 0.8, 11.0, 5, 12.0),
            record("Veintis", "Pre-lab", 1.0, 10.0, 5, 10.0),
            record("Exosoma Cancer", "Lab completed", 1.0, 7.0, 2, 24.0),
            record("CELLISTEM-ER", "Phase II", 1.0, 3.5, 1, 2.0),
            record("Exosoma OA", "Lab completed", 0.3, 11.0, 4, 12.0),
        ];
        Self { therapies }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.therapy.into_iter().map(TherapyRecord::from).collect())
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn therapies(&self) -> &[TherapyRecord] {
        &self.therapies
    }

    pub fn get(&self, name: &str) -> Option<&TherapyRecord> {
        self.therapies.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.therapies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.therapies.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    therapy: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    phase: String,
    patent_factor: f64,
    time_to_market: f64,
    strategic_score: u32,
    max_funding: f64,
}

impl From<CatalogEntry> for TherapyRecord {
    fn from(entry: CatalogEntry) -> Self {
        TherapyRecord {
            name: entry.name,
            phase: entry.phase,
            patent_factor: entry.patent_factor,
            time_to_market_years: entry.time_to_market,
            strategic_score: entry.strategic_score,
            max_funding: entry.max_funding,
        }
    }
}

fn record(
    name: &str,
    phase: &str,
    patent_factor: f64,
    time_to_market_years: f64,
    strategic_score: u32,
    max_funding: f64,
) -> TherapyRecord {
    TherapyRecord {
        name: name.to_string(),
        phase: phase.to_string(),
        patent_factor,
        time_to_market_years,
        strategic_score,
        max_funding,
    }
}

fn validate_record(therapy: &TherapyRecord) -> Result<(), CatalogError> {
    if therapy.name.trim().is_empty() {
        return Err(CatalogError::EmptyName);
    }

    let invalid = |field, reason| CatalogError::InvalidField {
        name: therapy.name.clone(),
        field,
        reason,
    };

    if !therapy.patent_factor.is_finite()
        || therapy.patent_factor <= 0.0
        || therapy.patent_factor > 1.0
    {
        return Err(invalid("patent_factor", "must be in (0, 1]"));
    }
    if !therapy.time_to_market_years.is_finite() || therapy.time_to_market_years <= 0.0 {
        return Err(invalid("time_to_market", "must be > 0"));
    }
    if therapy.strategic_score == 0 {
        return Err(invalid("strategic_score", "must be > 0"));
    }
    if !therapy.max_funding.is_finite() || therapy.max_funding <= 0.0 {
        return Err(invalid("max_funding", "must be > 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[therapy]]
        name = "Alpha"
        phase = "Phase I"
        patent_factor = 0.5
        time_to_market = 4.0
        strategic_score = 3
        max_funding = 8.0

        [[therapy]]
        name = "Beta"
        patent_factor = 1.0
        time_to_market = 2.5
        strategic_score = 1
        max_funding = 1.5
    "#;

    #[test]
    fn builtin_catalog_has_six_unique_valid_therapies() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.len(), 6);
        let rebuilt = Catalog::new(catalog.therapies().to_vec()).expect("builtin is valid");
        assert_eq!(rebuilt, catalog);
    }

    #[test]
    fn builtin_catalog_preserves_pipeline_order() {
        let catalog = Catalog::builtin();
        let names: Vec<&str> = catalog
            .therapies()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "CELLISTEM®OA",
                "CELLISTEM®OA 2.0",
                "Veintis",
                "Exosoma Cancer",
                "CELLISTEM-ER",
                "Exosoma OA",
            ]
        );
    }

    #[test]
    fn example_catalog_file_matches_builtin() {
        let catalog = Catalog::from_toml_str(include_str!("../../catalog.example.toml"))
            .expect("example catalog is valid");
        assert_eq!(catalog, Catalog::builtin());
    }

    #[test]
    fn lookup_by_name() {
        let catalog = Catalog::builtin();
        let er = catalog.get("CELLISTEM-ER").expect("present");
        assert_eq!(er.phase, "Phase II");
        assert_eq!(er.time_to_market_years, 3.5);
        assert_eq!(er.base_value(), 100.0);
        assert!(catalog.get("Unknown").is_none());
    }

    #[test]
    fn parses_toml_catalog_in_file_order() {
        let catalog = Catalog::from_toml_str(SAMPLE).expect("valid catalog");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.therapies()[0].name, "Alpha");
        assert_eq!(catalog.therapies()[0].patent_factor, 0.5);
        assert_eq!(catalog.therapies()[1].phase, "");
        assert_eq!(catalog.therapies()[1].max_funding, 1.5);
    }

    #[test]
    fn load_reads_catalog_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, SAMPLE).expect("write catalog");

        let catalog = Catalog::load(&path).expect("loads");
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Catalog::load(Path::new("/nonexistent/catalog.toml")).expect_err("missing");
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn rejects_empty_catalog() {
        let err = Catalog::from_toml_str("").expect_err("empty");
        assert!(matches!(err, CatalogError::Empty));
    }

    #[test]
    fn rejects_duplicate_names() {
        let toml = format!(
            "{SAMPLE}\n[[therapy]]\nname = \"Alpha\"\npatent_factor = 1.0\n\
             time_to_market = 1.0\nstrategic_score = 1\nmax_funding = 1.0\n"
        );
        let err = Catalog::from_toml_str(&toml).expect_err("duplicate");
        assert!(matches!(err, CatalogError::DuplicateName(name) if name == "Alpha"));
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let mut bad = Catalog::builtin().therapies().to_vec();
        bad[0].patent_factor = 1.5;
        let err = Catalog::new(bad).expect_err("patent factor");
        assert!(err.to_string().contains("patent_factor"));

        let mut bad = Catalog::builtin().therapies().to_vec();
        bad[2].max_funding = 0.0;
        let err = Catalog::new(bad).expect_err("max funding");
        assert!(err.to_string().contains("max_funding"));

        let mut bad = Catalog::builtin().therapies().to_vec();
        bad[3].strategic_score = 0;
        assert!(Catalog::new(bad).is_err());

        let mut bad = Catalog::builtin().therapies().to_vec();
        bad[4].time_to_market_years = f64::NAN;
        assert!(Catalog::new(bad).is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        let toml = "[[therapy]]\nname = \"A\"\npatent_factor = 1.0\ntime_to_market = 1.0\n\
                    strategic_score = 1\nmax_funding = 1.0\ncolour = \"red\"\n";
        let err = Catalog::from_toml_str(toml).expect_err("unknown key");
        assert!(matches!(err, CatalogError::Parse(_)));
    }
}
