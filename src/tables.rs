use crate::schema::{LeagueTableRow, ProductCode};
use std::collections::BTreeSet;

/// Supplies immutable, already-normalized league table snapshots.
///
/// A product without data yields an empty slice, never an error.
pub trait DataProvider: Send + Sync {
    fn get_table(&self, product: ProductCode) -> &[LeagueTableRow];
}

/// One product's full table across all years.
#[derive(Debug, Clone, Copy)]
pub struct LeagueTable<'a> {
    pub product: ProductCode,
    pub rows: &'a [LeagueTableRow],
}

impl<'a> LeagueTable<'a> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn years(&self) -> BTreeSet<i32> {
        self.rows.iter().map(|r| r.year).collect()
    }

    /// Rows of one year in stored order.
    pub fn partition(&self, year: i32) -> Vec<&'a LeagueTableRow> {
        self.rows.iter().filter(|r| r.year == year).collect()
    }
}

/// Read-only view over a [`DataProvider`]. Every accessor returns borrowed
/// rows; nothing here can mutate the snapshot.
#[derive(Clone, Copy)]
pub struct TableAccess<'a> {
    provider: &'a dyn DataProvider,
}

impl<'a> TableAccess<'a> {
    pub fn new(provider: &'a dyn DataProvider) -> Self {
        Self { provider }
    }

    pub fn table(&self, product: ProductCode) -> LeagueTable<'a> {
        LeagueTable {
            product,
            rows: self.provider.get_table(product),
        }
    }

    pub fn has_product(&self, product: ProductCode) -> bool {
        !self.table(product).is_empty()
    }

    pub fn years(&self, product: ProductCode) -> BTreeSet<i32> {
        self.table(product).years()
    }

    pub fn partition(&self, product: ProductCode, year: i32) -> Vec<&'a LeagueTableRow> {
        self.table(product).partition(year)
    }
}
