//! Runs a [`QueryPlan`] against the table snapshot.
//!
//! Per-product and per-year problems never abort a query. They are turned
//! into [`Notice`]s next to whatever rows could be produced.

use crate::aliases::AliasCatalog;
use crate::config::RankSource;
use crate::error::{LeagueTableError, Result};
use crate::planner::QueryPlan;
use crate::ranking::{apply_slice, rank_partition, RankedRow};
use crate::schema::{MetricColumn, ProductCode};
use crate::tables::TableAccess;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    UnknownProduct,
    UnsupportedColumn,
    InvalidMetric,
    NoDataForYear,
    OrganizationNotFound,
    InsufficientYears,
    Other,
}

/// A recoverable problem reported alongside results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub product: Option<ProductCode>,
    pub year: Option<i32>,
    pub message: String,
}

impl Notice {
    pub fn from_error(err: &LeagueTableError, product: Option<ProductCode>) -> Self {
        let (kind, year) = match err {
            LeagueTableError::UnknownProduct(_) => (NoticeKind::UnknownProduct, None),
            LeagueTableError::InvalidMetric { .. } => (NoticeKind::InvalidMetric, None),
            LeagueTableError::NoDataForYear { year, .. } => (NoticeKind::NoDataForYear, Some(*year)),
            LeagueTableError::OrganizationNotFound(_) => (NoticeKind::OrganizationNotFound, None),
            LeagueTableError::InsufficientYears { .. } => (NoticeKind::InsufficientYears, None),
            _ => (NoticeKind::Other, None),
        };
        Self {
            kind,
            product,
            year,
            message: err.to_string(),
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

/// One output line. Metrics the product does not carry are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub product: ProductCode,
    pub year: i32,
    /// Active rank within the full (product, year) partition.
    pub rank: u32,
    pub organization: String,
    pub amount: Option<f64>,
    pub deal_count: Option<u32>,
    pub share_percent: Option<f64>,
}

impl ResultRow {
    pub fn value(&self, metric: MetricColumn) -> Option<f64> {
        match metric {
            MetricColumn::Amount => self.amount,
            MetricColumn::DealCount => self.deal_count.map(f64::from),
            MetricColumn::SharePercent => self.share_percent,
            MetricColumn::Rank => Some(f64::from(self.rank)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub rows: Vec<ResultRow>,
    pub notices: Vec<Notice>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_notice(&mut self, notice: Notice) {
        warn!("{}", notice.message);
        self.notices.push(notice);
    }
}

pub struct QueryExecutor<'a> {
    catalog: &'a AliasCatalog,
    tables: TableAccess<'a>,
    rank_source: RankSource,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(catalog: &'a AliasCatalog, tables: TableAccess<'a>, rank_source: RankSource) -> Self {
        Self {
            catalog,
            tables,
            rank_source,
        }
    }

    pub fn execute(&self, plan: &QueryPlan) -> ResultSet {
        let mut result = ResultSet::default();
        let mut found: HashSet<&str> = HashSet::new();

        for &product in &plan.products {
            if let Err(e) = self.execute_product(plan, product, &mut result, &mut found) {
                result.push_notice(Notice::from_error(&e, Some(product)));
            }
        }

        // implicit sweeps report a missing organization once, not per table
        if plan.products_implicit {
            for org in &plan.organizations {
                if !found.contains(org.as_str()) {
                    let err = LeagueTableError::OrganizationNotFound(org.clone());
                    result.push_notice(Notice::from_error(&err, None));
                }
            }
        }

        debug!(
            "Executed {:?}: {} rows, {} notices",
            plan.shape,
            result.rows.len(),
            result.notices.len()
        );
        result
    }

    fn execute_product<'p>(
        &self,
        plan: &'p QueryPlan,
        product: ProductCode,
        result: &mut ResultSet,
        found: &mut HashSet<&'p str>,
    ) -> Result<()> {
        let info = self
            .catalog
            .product(product)
            .ok_or_else(|| LeagueTableError::UnknownProduct(product.to_string()))?;
        let table = self.tables.table(product);
        if table.is_empty() {
            return Err(LeagueTableError::UnknownProduct(product.to_string()));
        }

        let mut usable: Vec<MetricColumn> = Vec::new();
        for &metric in &plan.metrics {
            if info.supports(metric) {
                usable.push(metric);
            } else {
                let err = LeagueTableError::InvalidMetric {
                    product: product.to_string(),
                    metric: metric.to_string(),
                };
                result.push_notice(Notice {
                    kind: NoticeKind::UnsupportedColumn,
                    ..Notice::from_error(&err, Some(product))
                });
            }
        }
        let ranking_metric = match usable.first() {
            Some(&metric) => metric,
            None => {
                let requested: Vec<String> = plan.metrics.iter().map(|m| m.to_string()).collect();
                return Err(LeagueTableError::InvalidMetric {
                    product: product.to_string(),
                    metric: requested.join(", "),
                });
            }
        };

        let requested = plan.shape.years(&plan.years);
        let years: Vec<i32> = if requested.is_empty() {
            table.years().into_iter().collect()
        } else {
            requested
        };
        let slice = plan.shape.slice();

        for year in years {
            let partition = table.partition(year);
            if partition.is_empty() {
                let err = LeagueTableError::NoDataForYear {
                    product: product.to_string(),
                    year,
                };
                result.push_notice(Notice::from_error(&err, Some(product)));
                continue;
            }

            // ranks are assigned over the whole partition before filtering
            let (ranked, _) = rank_partition(&partition, ranking_metric, self.rank_source);
            let ranked = self.filter_organizations(plan, product, year, ranked, result, found);

            for entry in apply_slice(ranked, slice) {
                result.rows.push(mask_row(entry, product, |m| info.supports(m)));
            }
        }
        Ok(())
    }

    fn filter_organizations<'r, 'p>(
        &self,
        plan: &'p QueryPlan,
        product: ProductCode,
        year: i32,
        ranked: Vec<RankedRow<'r>>,
        result: &mut ResultSet,
        found: &mut HashSet<&'p str>,
    ) -> Vec<RankedRow<'r>> {
        if plan.organizations.is_empty() {
            return ranked;
        }

        for org in &plan.organizations {
            let present = ranked.iter().any(|r| r.row.organization == *org);
            if present {
                found.insert(org.as_str());
            } else if !plan.products_implicit {
                let err = LeagueTableError::OrganizationNotFound(org.clone());
                result.push_notice(Notice::from_error(&err, Some(product)).with_year(year));
            }
        }

        ranked
            .into_iter()
            .filter(|r| plan.organizations.contains(&r.row.organization))
            .collect()
    }
}

fn mask_row(entry: RankedRow<'_>, product: ProductCode, supports: impl Fn(MetricColumn) -> bool) -> ResultRow {
    let row = entry.row;
    ResultRow {
        product,
        year: row.year,
        rank: entry.active_rank,
        organization: row.organization.clone(),
        amount: supports(MetricColumn::Amount).then_some(row.amount),
        deal_count: supports(MetricColumn::DealCount).then_some(row.deal_count),
        share_percent: supports(MetricColumn::SharePercent).then_some(row.share_percent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::ingestion::LeagueTableSnapshot;
    use crate::planner::QueryShape;
    use crate::schema::LeagueTableRow;

    fn row(product: ProductCode, year: i32, rank: Option<u32>, org: &str, amount: f64) -> LeagueTableRow {
        LeagueTableRow {
            year,
            product,
            rank,
            organization: org.to_string(),
            amount,
            deal_count: 2,
            share_percent: amount / 10.0,
        }
    }

    fn snapshot() -> LeagueTableSnapshot {
        LeagueTableSnapshot::from_rows(vec![
            row(ProductCode::Ecm, 2022, Some(1), "KB증권", 90.0),
            row(ProductCode::Ecm, 2022, Some(2), "삼성증권", 50.0),
            row(ProductCode::Ecm, 2023, Some(1), "삼성증권", 80.0),
            row(ProductCode::Ecm, 2023, Some(2), "KB증권", 70.0),
            row(ProductCode::Ecm, 2023, Some(3), "대신증권", 10.0),
            row(ProductCode::Fo, 2023, None, "KB증권", 30.0),
            row(ProductCode::Fo, 2023, None, "대신증권", 40.0),
        ])
        .unwrap()
    }

    fn plan(products: Vec<ProductCode>, implicit: bool) -> QueryPlan {
        QueryPlan {
            shape: QueryShape::FullTable,
            products,
            products_implicit: implicit,
            years: vec![2023],
            organizations: vec![],
            metrics: vec![MetricColumn::Amount],
        }
    }

    fn run(plan: &QueryPlan) -> ResultSet {
        run_with(plan, CatalogConfig::default())
    }

    fn run_with(plan: &QueryPlan, config: CatalogConfig) -> ResultSet {
        let catalog = AliasCatalog::from_config(&config).unwrap();
        let snapshot = snapshot();
        let executor = QueryExecutor::new(&catalog, TableAccess::new(&snapshot), RankSource::PreferExplicit);
        executor.execute(plan)
    }

    #[test]
    fn test_full_table_rows_in_rank_order() {
        let result = run(&plan(vec![ProductCode::Ecm], false));
        let orgs: Vec<&str> = result.rows.iter().map(|r| r.organization.as_str()).collect();
        assert_eq!(orgs, vec!["삼성증권", "KB증권", "대신증권"]);
        assert!(result.notices.is_empty());
    }

    #[test]
    fn test_rank_is_kept_after_organization_filter() {
        let mut p = plan(vec![ProductCode::Ecm], false);
        p.organizations = vec!["대신증권".to_string()];
        let result = run(&p);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].rank, 3);
    }

    #[test]
    fn test_derived_rank_for_table_without_rank_column() {
        let result = run(&plan(vec![ProductCode::Fo], false));
        assert_eq!(result.rows[0].organization, "대신증권");
        assert_eq!(result.rows[0].rank, 1);
    }

    #[test]
    fn test_unsupported_metric_is_masked_and_noticed() {
        let mut config = CatalogConfig::default();
        for product in config.products.iter_mut() {
            if product.code == ProductCode::Fo {
                product.metrics = vec![MetricColumn::Amount];
            }
        }
        let mut p = plan(vec![ProductCode::Fo], false);
        p.metrics = vec![MetricColumn::DealCount, MetricColumn::Amount];
        let result = run_with(&p, config);

        assert!(result
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::UnsupportedColumn && n.product == Some(ProductCode::Fo)));
        assert_eq!(result.rows.len(), 2);
        assert!(result.rows.iter().all(|r| r.deal_count.is_none() && r.amount.is_some()));
    }

    #[test]
    fn test_no_usable_metric_skips_product() {
        let mut config = CatalogConfig::default();
        for product in config.products.iter_mut() {
            if product.code == ProductCode::Fo {
                product.metrics = vec![MetricColumn::Amount];
            }
        }
        let mut p = plan(vec![ProductCode::Fo, ProductCode::Ecm], false);
        p.metrics = vec![MetricColumn::SharePercent];
        let result = run_with(&p, config);

        assert!(result.rows.iter().all(|r| r.product == ProductCode::Ecm));
        assert_eq!(result.rows.len(), 3);
        let kinds: Vec<NoticeKind> = result.notices.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NoticeKind::UnsupportedColumn, NoticeKind::InvalidMetric]);
    }

    #[test]
    fn test_missing_year_is_a_notice() {
        let mut p = plan(vec![ProductCode::Ecm], false);
        p.years = vec![2019, 2023];
        let result = run(&p);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.notices.len(), 1);
        assert_eq!(result.notices[0].kind, NoticeKind::NoDataForYear);
        assert_eq!(result.notices[0].year, Some(2019));
    }

    #[test]
    fn test_empty_years_means_all_years() {
        let mut p = plan(vec![ProductCode::Ecm], false);
        p.years.clear();
        assert_eq!(run(&p).rows.len(), 5);
    }

    #[test]
    fn test_organization_not_found_explicit_product() {
        let mut p = plan(vec![ProductCode::Ecm], false);
        p.organizations = vec!["없는증권".to_string()];
        let result = run(&p);
        assert!(result.rows.is_empty());
        assert_eq!(result.notices.len(), 1);
        assert_eq!(result.notices[0].kind, NoticeKind::OrganizationNotFound);
        assert_eq!(result.notices[0].year, Some(2023));
    }

    #[test]
    fn test_implicit_sweep_aggregates_notices() {
        let products: Vec<ProductCode> = ProductCode::ALL.to_vec();
        let mut p = plan(products, true);
        p.organizations = vec!["대신증권".to_string(), "없는증권".to_string()];
        let result = run(&p);

        assert_eq!(result.rows.len(), 2);
        let missing: Vec<&Notice> = result
            .notices
            .iter()
            .filter(|n| n.kind == NoticeKind::OrganizationNotFound)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].product, None);
        assert!(result
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::UnknownProduct && n.product == Some(ProductCode::Abs)));
    }

    #[test]
    fn test_top_n_slice() {
        let mut p = plan(vec![ProductCode::Ecm], false);
        p.shape = QueryShape::TopN(2);
        let result = run(&p);
        assert_eq!(result.rows.len(), 2);
        assert!(result.rows.iter().all(|r| r.rank <= 2));
    }

    #[test]
    fn test_rank_range_shape() {
        let mut p = plan(vec![ProductCode::Ecm], false);
        p.shape = QueryShape::RankRange { start: 2, end: 3 };
        let result = run(&p);
        let orgs: Vec<&str> = result.rows.iter().map(|r| r.organization.as_str()).collect();
        assert_eq!(orgs, vec!["KB증권", "대신증권"]);
    }

    #[test]
    fn test_compare_shape_reads_both_years() {
        let mut p = plan(vec![ProductCode::Ecm], false);
        p.shape = QueryShape::Compare {
            years: Some((2022, 2023)),
        };
        let result = run(&p);
        let years: Vec<i32> = result.rows.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2022, 2022, 2023, 2023, 2023]);
        assert!(result.notices.is_empty());
    }
}
