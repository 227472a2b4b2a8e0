use crate::error::{LeagueTableError, Result};
use crate::schema::{LeagueTableRow, ProductCode};
use crate::tables::DataProvider;
use log::info;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// In-memory [`DataProvider`] holding one validated table per product.
#[derive(Debug, Clone, Default)]
pub struct LeagueTableSnapshot {
    tables: BTreeMap<ProductCode, Vec<LeagueTableRow>>,
}

impl LeagueTableSnapshot {
    /// Groups rows by product, orders each table by year (stable within a
    /// year) and checks the partition invariants.
    pub fn from_rows(rows: impl IntoIterator<Item = LeagueTableRow>) -> Result<Self> {
        let mut tables: BTreeMap<ProductCode, Vec<LeagueTableRow>> = BTreeMap::new();

        for mut row in rows {
            row.organization = row.organization.trim().to_string();
            tables.entry(row.product).or_default().push(row);
        }

        for (product, rows) in tables.iter_mut() {
            rows.sort_by_key(|r| r.year);
            validate_table(*product, rows)?;
            info!("{} table loaded with {} rows", product, rows.len());
        }

        Ok(Self { tables })
    }

    /// Loads a JSON array of rows.
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: Vec<LeagueTableRow> = serde_json::from_str(json)?;
        Self::from_rows(rows)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn products(&self) -> impl Iterator<Item = ProductCode> + '_ {
        self.tables.keys().copied()
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

impl DataProvider for LeagueTableSnapshot {
    fn get_table(&self, product: ProductCode) -> &[LeagueTableRow] {
        self.tables
            .get(&product)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn validate_table(product: ProductCode, rows: &[LeagueTableRow]) -> Result<()> {
    let invalid = |year: i32, details: String| LeagueTableError::InvalidTable {
        product: product.to_string(),
        year,
        details,
    };

    let mut seen_orgs: HashSet<(i32, &str)> = HashSet::new();
    let mut seen_ranks: HashSet<(i32, u32)> = HashSet::new();

    for row in rows {
        if row.organization.is_empty() {
            return Err(invalid(row.year, "row with empty organization".to_string()));
        }
        if !seen_orgs.insert((row.year, row.organization.as_str())) {
            return Err(invalid(
                row.year,
                format!("organization '{}' appears more than once", row.organization),
            ));
        }
        if let Some(rank) = row.rank {
            if rank == 0 {
                return Err(invalid(
                    row.year,
                    format!("'{}' has rank 0; ranks start at 1", row.organization),
                ));
            }
            if !seen_ranks.insert((row.year, rank)) {
                return Err(invalid(row.year, format!("rank {} is used twice", rank)));
            }
        }
        if !row.amount.is_finite() || !row.share_percent.is_finite() {
            return Err(invalid(
                row.year,
                format!("'{}' has a non-finite amount or share", row.organization),
            ));
        }
    }

    Ok(())
}
