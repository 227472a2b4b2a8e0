//! Year-over-year change of one metric per organization.

use crate::config::RankSource;
use crate::error::{LeagueTableError, Result};
use crate::ranking::rank_partition;
use crate::schema::{ChangeDirection, LeagueTableRow, MetricColumn, ProductCode};
use crate::tables::LeagueTable;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub organization: String,
    pub year1_value: f64,
    pub year2_value: f64,
    /// `year2_value - year1_value`.
    pub delta: f64,
    pub direction: ChangeDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub product: ProductCode,
    pub metric: MetricColumn,
    pub year1: i32,
    pub year2: i32,
    /// Sorted by absolute delta, largest first.
    pub improved: Vec<ComparisonEntry>,
    pub declined: Vec<ComparisonEntry>,
    /// Organizations present in both years with no change.
    pub unchanged: Vec<String>,
}

impl ComparisonReport {
    /// Number of organizations present in both years.
    pub fn joined_count(&self) -> usize {
        self.improved.len() + self.declined.len() + self.unchanged.len()
    }

    /// Keeps only the named organizations. Classification is untouched.
    pub fn retain_organizations(&mut self, organizations: &[String]) {
        if organizations.is_empty() {
            return;
        }
        self.improved.retain(|e| organizations.contains(&e.organization));
        self.declined.retain(|e| organizations.contains(&e.organization));
        self.unchanged.retain(|o| organizations.contains(o));
    }

    /// Keeps the first `n` entries of each direction.
    pub fn truncate(&mut self, n: usize) {
        self.improved.truncate(n);
        self.declined.truncate(n);
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "### {} {} {} → {}\n\n",
            self.product,
            self.metric.header(),
            self.year1,
            self.year2
        ));
        for (title, entries) in [("상승", &self.improved), ("하락", &self.declined)] {
            output.push_str(&format!("**{}**\n\n", title));
            if entries.is_empty() {
                output.push_str("- 없음\n\n");
                continue;
            }
            output.push_str(&format!("| 증권사 | {} | {} | 변화 |\n", self.year1, self.year2));
            output.push_str("|---|---|---|---|\n");
            for e in entries.iter() {
                output.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    e.organization,
                    format_value(e.year1_value),
                    format_value(e.year2_value),
                    format_delta(e.delta)
                ));
            }
            output.push('\n');
        }

        output
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn format_delta(delta: f64) -> String {
    if delta.fract() == 0.0 {
        format!("{:+.0}", delta)
    } else {
        format!("{:+.2}", delta)
    }
}

pub struct ComparisonEngine {
    rank_source: RankSource,
}

impl ComparisonEngine {
    pub fn new(rank_source: RankSource) -> Self {
        Self { rank_source }
    }

    /// Inner-joins `year1` and `year2` by organization and classifies each
    /// nonzero change with the metric's own sort direction, so a falling rank
    /// number is an improvement.
    pub fn compare(
        &self,
        table: LeagueTable<'_>,
        year1: i32,
        year2: i32,
        metric: MetricColumn,
    ) -> Result<ComparisonReport> {
        let before = self.values(&table.partition(year1), metric);
        let after = self.values(&table.partition(year2), metric);
        if before.is_empty() || after.is_empty() {
            return Err(LeagueTableError::InsufficientYears {
                product: table.product.to_string(),
                year1,
                year2,
            });
        }

        let direction = metric.direction();
        let mut report = ComparisonReport {
            product: table.product,
            metric,
            year1,
            year2,
            improved: Vec::new(),
            declined: Vec::new(),
            unchanged: Vec::new(),
        };

        for (organization, &year1_value) in &before {
            let Some(&year2_value) = after.get(organization) else {
                continue;
            };
            let delta = year2_value - year1_value;
            match direction.classify(delta) {
                Some(dir) => {
                    let entry = ComparisonEntry {
                        organization: organization.to_string(),
                        year1_value,
                        year2_value,
                        delta,
                        direction: dir,
                    };
                    match dir {
                        ChangeDirection::Improved => report.improved.push(entry),
                        ChangeDirection::Declined => report.declined.push(entry),
                    }
                }
                None => report.unchanged.push(organization.to_string()),
            }
        }

        report.improved.sort_by(by_magnitude);
        report.declined.sort_by(by_magnitude);

        debug!(
            "{} {} {}→{}: {} improved, {} declined, {} unchanged",
            table.product,
            metric,
            year1,
            year2,
            report.improved.len(),
            report.declined.len(),
            report.unchanged.len()
        );
        Ok(report)
    }

    fn values<'a>(&self, partition: &[&'a LeagueTableRow], metric: MetricColumn) -> BTreeMap<&'a str, f64> {
        if metric == MetricColumn::Rank {
            let (ranked, _) = rank_partition(partition, metric, self.rank_source);
            return ranked
                .into_iter()
                .map(|r| (r.row.organization.as_str(), f64::from(r.active_rank)))
                .collect();
        }
        partition
            .iter()
            .filter_map(|row| metric.raw_value(row).map(|v| (row.organization.as_str(), v)))
            .collect()
    }
}

fn by_magnitude(a: &ComparisonEntry, b: &ComparisonEntry) -> Ordering {
    b.delta
        .abs()
        .partial_cmp(&a.delta.abs())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.organization.cmp(&b.organization))
}
