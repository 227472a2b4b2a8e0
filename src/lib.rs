//! # League Table Query
//!
//! A library for answering questions about underwriting league tables: yearly
//! rankings of securities firms by amount, deal count and market share within
//! product categories (ECM, ABS, FB, DCM, SB, IPO, FO).
//!
//! ## Core Concepts
//!
//! - **Alias Resolution**: "KB", "kb 증권" and "KB증권" all name the same organization
//! - **Query Intent**: A validated description of years, products, organizations, metrics and rank slicing
//! - **Active Rank**: The explicit rank column when a table carries one, otherwise a rank derived from the metric
//! - **Notices**: Per-product and per-year problems are reported next to results instead of aborting
//! - **Comparison**: Year-over-year deltas classified with each metric's own sort direction
//!
//! ## Example
//!
//! ```rust,ignore
//! use league_table_query::*;
//!
//! let snapshot = LeagueTableSnapshot::from_file("tables.json")?;
//! let assistant = LeagueTableAssistant::with_defaults(snapshot)?;
//!
//! let answer = assistant.answer_natural("2021~2023년 ECM에서 신한 순위")?;
//! println!("{}", answer.to_markdown());
//!
//! let answer = assistant.answer_structured("2020, ECM, 대표주관, KB, 순위")?;
//! assert_eq!(answer.projection.tables[0].rows.len(), 1);
//! ```

pub mod aliases;
pub mod comparison;
pub mod config;
pub mod error;
pub mod executor;
pub mod ingestion;
pub mod intent;
pub mod planner;
pub mod projection;
pub mod ranking;
pub mod schema;
pub mod tables;

#[cfg(feature = "gemini")]
pub mod llm;

pub use aliases::{normalize, AliasCatalog, AliasResolver, MetricResolution, OrgResolution};
pub use comparison::{ComparisonEngine, ComparisonEntry, ComparisonReport};
pub use config::{CatalogConfig, EngineConfig, OrganizationConfig, ProductConfig, RankSource};
pub use error::{LeagueTableError, Result};
pub use executor::{Notice, NoticeKind, QueryExecutor, ResultRow, ResultSet};
pub use ingestion::LeagueTableSnapshot;
pub use intent::{IntentExtractor, IntentParser, QuestionMode};
pub use planner::{QueryPlan, QueryShape};
pub use projection::{project, Cell, ProjectedTable, Projection, SeriesPoint};
pub use schema::*;
pub use tables::{DataProvider, LeagueTable, TableAccess};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Everything produced for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub intent: QueryIntent,
    pub shape: QueryShape,
    pub projection: Projection,
    pub comparisons: Vec<ComparisonReport>,
}

impl Answer {
    pub fn notices(&self) -> &[Notice] {
        &self.projection.notices
    }

    pub fn to_markdown(&self) -> String {
        let mut output = self.projection.to_markdown();
        for report in &self.comparisons {
            output.push_str(&report.to_markdown());
        }
        output
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Wires extraction, planning, execution, comparison and projection over one
/// immutable table snapshot.
pub struct LeagueTableAssistant<P: DataProvider> {
    resolver: AliasResolver,
    provider: P,
    config: EngineConfig,
}

impl<P: DataProvider> LeagueTableAssistant<P> {
    pub fn new(catalog: &CatalogConfig, provider: P, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let resolver = AliasResolver::new(AliasCatalog::from_config(catalog)?);
        Ok(Self {
            resolver,
            provider,
            config,
        })
    }

    /// Built-in brokerage catalog and default engine settings.
    pub fn with_defaults(provider: P) -> Result<Self> {
        Self::new(&CatalogConfig::default(), provider, EngineConfig::default())
    }

    pub fn resolver(&self) -> &AliasResolver {
        &self.resolver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn extractor(&self) -> IntentExtractor<'_> {
        IntentExtractor::new(&self.resolver, &self.config)
    }

    pub fn answer_structured(&self, question: &str) -> Result<Answer> {
        info!("Answering structured question: {}", question);
        let intent = self.extractor().extract(question, QuestionMode::Structured)?;
        Ok(self.answer_intent(intent))
    }

    pub fn answer_natural(&self, question: &str) -> Result<Answer> {
        info!("Answering question: {}", question);
        let intent = self.extractor().extract(question, QuestionMode::NaturalLanguage)?;
        Ok(self.answer_intent(intent))
    }

    pub async fn answer_assisted(&self, question: &str, parser: &dyn IntentParser) -> Result<Answer> {
        info!("Answering question with external parser: {}", question);
        let intent = self.extractor().extract_assisted(question, parser).await?;
        Ok(self.answer_intent(intent))
    }

    /// Runs an already validated intent.
    pub fn answer_intent(&self, intent: QueryIntent) -> Answer {
        let catalog = self.resolver.catalog();
        let tables = TableAccess::new(&self.provider);

        let plan = QueryPlan::build(&intent, catalog);
        debug!("Plan: {:?}", plan);

        let executor = QueryExecutor::new(catalog, tables, self.config.rank_source);
        let mut result = executor.execute(&plan);

        let comparisons = match plan.shape {
            QueryShape::Compare { years } => self.compare_products(&intent, &plan, years, tables, &mut result),
            _ => Vec::new(),
        };

        let projection = project(&result, &intent);
        Answer {
            intent,
            shape: plan.shape,
            projection,
            comparisons,
        }
    }

    fn compare_products(
        &self,
        intent: &QueryIntent,
        plan: &QueryPlan,
        years: Option<(i32, i32)>,
        tables: TableAccess<'_>,
        result: &mut ResultSet,
    ) -> Vec<ComparisonReport> {
        let engine = ComparisonEngine::new(self.config.rank_source);
        let metric = intent.primary_metric();
        let mut reports = Vec::new();

        for &product in &plan.products {
            let table = tables.table(product);
            let supported = self
                .resolver
                .catalog()
                .product(product)
                .is_some_and(|p| p.supports(metric));
            // the executor has already reported missing tables and columns
            if table.is_empty() || !supported {
                continue;
            }

            let (year1, year2) = match years {
                Some(pair) => pair,
                None => {
                    let available: Vec<i32> = table.years().into_iter().collect();
                    match available.as_slice() {
                        [.., a, b] => (*a, *b),
                        [only] => (only - 1, *only),
                        [] => continue,
                    }
                }
            };

            match engine.compare(table, year1, year2, metric) {
                Ok(mut report) => {
                    report.retain_organizations(&plan.organizations);
                    if let Some(n) = intent.top_n() {
                        report.truncate(n as usize);
                    }
                    reports.push(report);
                }
                Err(e) => result.push_notice(Notice::from_error(&e, Some(product))),
            }
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(product: ProductCode, year: i32, rank: Option<u32>, org: &str, amount: f64) -> LeagueTableRow {
        LeagueTableRow {
            year,
            product,
            rank,
            organization: org.to_string(),
            amount,
            deal_count: 3,
            share_percent: amount / 10.0,
        }
    }

    fn assistant() -> LeagueTableAssistant<LeagueTableSnapshot> {
        let snapshot = LeagueTableSnapshot::from_rows(vec![
            row(ProductCode::Ecm, 2022, Some(1), "KB증권", 90.0),
            row(ProductCode::Ecm, 2022, Some(2), "NH투자증권", 60.0),
            row(ProductCode::Ecm, 2022, Some(3), "삼성증권", 30.0),
            row(ProductCode::Ecm, 2023, Some(1), "NH투자증권", 95.0),
            row(ProductCode::Ecm, 2023, Some(2), "삼성증권", 70.0),
            row(ProductCode::Ecm, 2023, Some(3), "KB증권", 20.0),
            row(ProductCode::Ipo, 2023, None, "KB증권", 40.0),
            row(ProductCode::Ipo, 2023, None, "삼성증권", 50.0),
        ])
        .unwrap();
        let config = EngineConfig {
            reference_year: Some(2024),
            ..Default::default()
        };
        LeagueTableAssistant::new(&CatalogConfig::default(), snapshot, config).unwrap()
    }

    #[test]
    fn test_structured_answer() {
        let answer = assistant().answer_structured("2023, ECM, 대표주관, KB, 순위").unwrap();
        assert_eq!(answer.shape, QueryShape::SingleLookup);
        let table = &answer.projection.tables[0];
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][1], Cell::Integer(3));
        assert!(answer.notices().is_empty());
    }

    #[test]
    fn test_compare_answer_reports_both_directions() {
        let answer = assistant()
            .answer_natural("2022년과 2023년 ECM 순위 비교")
            .unwrap();
        assert_eq!(
            answer.shape,
            QueryShape::Compare {
                years: Some((2022, 2023))
            }
        );
        assert_eq!(answer.comparisons.len(), 1);
        let report = &answer.comparisons[0];
        assert_eq!(report.metric, MetricColumn::Rank);
        assert_eq!(report.improved.len(), 2);
        assert_eq!(report.declined[0].organization, "KB증권");
        assert!(answer.to_markdown().contains("하락"));
    }

    #[test]
    fn test_compare_with_missing_year_becomes_notice() {
        let answer = assistant().answer_natural("2023년 IPO 순위 비교").unwrap();
        assert!(answer.comparisons.is_empty());
        assert!(answer
            .notices()
            .iter()
            .any(|n| n.kind == NoticeKind::InsufficientYears && n.product == Some(ProductCode::Ipo)));
        // the 2023 table is still answered
        assert_eq!(answer.projection.tables[0].rows.len(), 2);
    }

    #[test]
    fn test_organization_only_question_sweeps_products() {
        let answer = assistant().answer_natural("2023년 삼성 실적").unwrap();
        let products: Vec<ProductCode> = answer.projection.tables.iter().map(|t| t.product).collect();
        assert_eq!(products, vec![ProductCode::Ecm, ProductCode::Ipo]);
        assert!(answer
            .notices()
            .iter()
            .all(|n| n.kind == NoticeKind::UnknownProduct));
    }

    #[test]
    fn test_answer_serializes() {
        let answer = assistant().answer_natural("2023년 ECM 상위 2").unwrap();
        let json: serde_json::Value = serde_json::from_str(&answer.to_json().unwrap()).unwrap();
        assert_eq!(json["shape"]["TopN"], 2);
        assert_eq!(json["projection"]["tables"][0]["rows"].as_array().unwrap().len(), 2);
    }
}
