use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How solid a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Viability {
    Confirmed,
    Probable,
    Speculative,
    Dismissed,
}

/// Something surfaced mid-workflow that was not templated in advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub discovered_at: DateTime<Utc>,
    /// Which agent surfaced it.
    pub discovered_by: String,
    pub subject: String,
    pub viability: Viability,
    /// Estimated size/impact, in whatever unit the workflow uses.
    pub magnitude: f64,
    /// References supporting the finding (document ids, URLs, case numbers).
    #[serde(default)]
    pub citations: Vec<String>,
}

impl Finding {
    pub fn new(
        discovered_by: impl Into<String>,
        subject: impl Into<String>,
        viability: Viability,
        magnitude: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            discovered_at: Utc::now(),
            discovered_by: discovered_by.into(),
            subject: subject.into(),
            viability,
            magnitude,
            citations: Vec::new(),
        }
    }
}

/// Derived registry aggregates, recomputed on every append.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub by_viability: HashMap<Viability, usize>,
    pub total_magnitude: f64,
}

/// Append-only collection of findings with derived aggregates.
///
/// Findings are never updated or removed; the summary is recomputed from
/// scratch on each append so it can never drift from the contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    findings: Vec<Finding>,
    summary: RegistrySummary,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, finding: Finding) {
        self.findings.push(finding);
        self.summary = self.recompute();
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn summary(&self) -> &RegistrySummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    fn recompute(&self) -> RegistrySummary {
        let mut by_viability: HashMap<Viability, usize> = HashMap::new();
        let mut total_magnitude = 0.0;
        for f in &self.findings {
            *by_viability.entry(f.viability).or_insert(0) += 1;
            total_magnitude += f.magnitude;
        }
        RegistrySummary {
            total: self.findings.len(),
            by_viability,
            total_magnitude,
        }
    }
}
