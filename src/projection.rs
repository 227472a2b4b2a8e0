//! Reshapes executor output into renderer-ready tables and chart series.

use crate::executor::{Notice, ResultRow, ResultSet};
use crate::schema::{MetricColumn, ProductCode, QueryIntent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Integer(v) => v.to_string(),
            Cell::Number(v) => format!("{:.2}", v),
            Cell::Text(v) => v.clone(),
            Cell::Missing => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedTable {
    pub product: ProductCode,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// One long-format chart point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub year: i32,
    pub product: ProductCode,
    pub organization: String,
    pub metric: MetricColumn,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub tables: Vec<ProjectedTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<SeriesPoint>>,
    pub notices: Vec<Notice>,
}

/// Metric columns shown after `[year, rank, organization]`. Rank already has
/// its own column.
fn value_columns(intent: &QueryIntent) -> Vec<MetricColumn> {
    intent
        .metrics
        .iter()
        .copied()
        .filter(|m| *m != MetricColumn::Rank)
        .collect()
}

fn metric_cell(row: &ResultRow, metric: MetricColumn) -> Cell {
    match metric {
        MetricColumn::Amount => row.amount.map(Cell::Number),
        MetricColumn::DealCount => row.deal_count.map(|v| Cell::Integer(i64::from(v))),
        MetricColumn::SharePercent => row.share_percent.map(Cell::Number),
        MetricColumn::Rank => Some(Cell::Integer(i64::from(row.rank))),
    }
    .unwrap_or(Cell::Missing)
}

pub fn project(result: &ResultSet, intent: &QueryIntent) -> Projection {
    let metrics = value_columns(intent);
    let mut columns = vec!["연도".to_string(), "순위".to_string(), "증권사".to_string()];
    columns.extend(metrics.iter().map(|m| m.header().to_string()));

    let mut tables: Vec<ProjectedTable> = Vec::new();
    for row in &result.rows {
        let mut cells = vec![
            Cell::Integer(i64::from(row.year)),
            Cell::Integer(i64::from(row.rank)),
            Cell::Text(row.organization.clone()),
        ];
        cells.extend(metrics.iter().map(|&m| metric_cell(row, m)));

        match tables.iter_mut().find(|t| t.product == row.product) {
            Some(table) => table.rows.push(cells),
            None => tables.push(ProjectedTable {
                product: row.product,
                columns: columns.clone(),
                rows: vec![cells],
            }),
        }
    }

    let has_axis = !intent.organizations.is_empty() || !intent.products.is_empty();
    let series = (intent.wants_chart && has_axis).then(|| build_series(&result.rows, &intent.metrics));

    Projection {
        tables,
        series,
        notices: result.notices.clone(),
    }
}

fn build_series(rows: &[ResultRow], metrics: &[MetricColumn]) -> Vec<SeriesPoint> {
    let mut points: Vec<SeriesPoint> = rows
        .iter()
        .flat_map(|row| {
            metrics.iter().filter_map(move |&metric| {
                row.value(metric).map(|value| SeriesPoint {
                    year: row.year,
                    product: row.product,
                    organization: row.organization.clone(),
                    metric,
                    value,
                })
            })
        })
        .collect();
    points.sort_by(|a, b| {
        (&a.organization, a.metric, a.product, a.year).cmp(&(&b.organization, b.metric, b.product, b.year))
    });
    points
}

fn csv_field(text: &str) -> String {
    if text.contains(',') || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

impl Projection {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// All tables in one CSV with a leading product column.
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        let mut header_written = false;

        for table in &self.tables {
            if !header_written {
                let header: Vec<String> = table.columns.iter().map(|c| csv_field(c)).collect();
                output.push_str(&format!("상품,{}\n", header.join(",")));
                header_written = true;
            }
            for row in &table.rows {
                let cells: Vec<String> = row.iter().map(|c| csv_field(&c.render())).collect();
                output.push_str(&format!("{},{}\n", table.product, cells.join(",")));
            }
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        for table in &self.tables {
            output.push_str(&format!("### {}\n\n", table.product));
            output.push_str(&format!("| {} |\n", table.columns.join(" | ")));
            output.push_str(&format!("|{}\n", "---|".repeat(table.columns.len())));
            for row in &table.rows {
                let cells: Vec<String> = row.iter().map(Cell::render).collect();
                output.push_str(&format!("| {} |\n", cells.join(" | ")));
            }
            output.push('\n');
        }

        if !self.notices.is_empty() {
            output.push_str("**참고**\n\n");
            for notice in &self.notices {
                output.push_str(&format!("- {}\n", notice.message));
            }
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LeagueTableError;
    use std::collections::BTreeSet;

    fn result_row(product: ProductCode, year: i32, rank: u32, org: &str) -> ResultRow {
        ResultRow {
            product,
            year,
            rank,
            organization: org.to_string(),
            amount: Some(1000.0 * f64::from(rank)),
            deal_count: None,
            share_percent: Some(12.5),
        }
    }

    fn result() -> ResultSet {
        ResultSet {
            rows: vec![
                result_row(ProductCode::Ecm, 2022, 1, "KB증권"),
                result_row(ProductCode::Ecm, 2023, 2, "KB증권"),
                result_row(ProductCode::Abs, 2023, 1, "KB증권"),
            ],
            notices: vec![Notice::from_error(
                &LeagueTableError::NoDataForYear {
                    product: "ABS".to_string(),
                    year: 2022,
                },
                Some(ProductCode::Abs),
            )],
        }
    }

    fn intent(metrics: Vec<MetricColumn>, wants_chart: bool) -> QueryIntent {
        QueryIntent {
            organizations: vec!["KB증권".to_string()],
            metrics,
            wants_chart,
            ..Default::default()
        }
    }

    #[test]
    fn test_one_table_per_product_with_fixed_column_order() {
        let p = project(&result(), &intent(vec![MetricColumn::Rank, MetricColumn::DealCount], false));
        assert_eq!(p.tables.len(), 2);
        assert_eq!(p.tables[0].product, ProductCode::Ecm);
        assert_eq!(p.tables[0].columns, vec!["연도", "순위", "증권사", "건수"]);
        assert_eq!(p.tables[0].rows[1][3], Cell::Missing);
        assert!(p.series.is_none());
        assert_eq!(p.notices.len(), 1);
    }

    #[test]
    fn test_series_only_when_chart_requested() {
        let p = project(&result(), &intent(vec![MetricColumn::Amount], true));
        let series = p.series.unwrap();
        assert_eq!(series.len(), 3);
        // grouped by organization and metric, then product and year
        assert_eq!(series[0].product, ProductCode::Ecm);
        assert_eq!(series[0].year, 2022);
        assert_eq!(series[1].year, 2023);
        assert_eq!(series[2].product, ProductCode::Abs);
    }

    #[test]
    fn test_series_needs_an_axis() {
        let mut i = intent(vec![MetricColumn::Amount], true);
        i.organizations.clear();
        assert!(project(&result(), &i).series.is_none());

        i.products = BTreeSet::from([ProductCode::Ecm]);
        assert!(project(&result(), &i).series.is_some());
    }

    #[test]
    fn test_renderings() {
        let p = project(&result(), &intent(vec![MetricColumn::Amount, MetricColumn::SharePercent], false));

        let md = p.to_markdown();
        assert!(md.contains("### ECM"));
        assert!(md.contains("| 연도 | 순위 | 증권사 | 금액(원) | 점유율(%) |"));
        assert!(md.contains("| 2022 | 1 | KB증권 | 1000.00 | 12.50 |"));
        assert!(md.contains("**참고**"));

        let csv = p.to_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("상품,연도,순위,증권사,금액(원),점유율(%)"));
        assert_eq!(lines.next(), Some("ECM,2022,1,KB증권,1000.00,12.50"));

        let json: serde_json::Value = serde_json::from_str(&p.to_json().unwrap()).unwrap();
        assert_eq!(json["tables"][0]["rows"][0][2], "KB증권");
        assert!(json.get("series").is_none());
    }
}
