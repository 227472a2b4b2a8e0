//! Classifies a validated intent into one query shape.
//!
//! Shapes are tried in a fixed order and the first matcher whose precondition
//! holds decides; [`QueryShape::FullTable`] always matches.

use crate::aliases::AliasCatalog;
use crate::schema::{MetricColumn, ProductCode, QueryIntent, RankSlice};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryShape {
    /// Year-over-year comparison. `None` compares the latest two years each
    /// product table holds.
    Compare { years: Option<(i32, i32)> },
    RankRange { start: u32, end: u32 },
    TopN(u32),
    /// Per-organization series across years, for charting.
    ChartSeries,
    SingleLookup,
    FullTable,
}

impl QueryShape {
    /// Rank window applied to each partition. Comparisons apply their own top
    /// N after classification, so they keep every rank here.
    pub fn slice(&self) -> RankSlice {
        match *self {
            QueryShape::RankRange { start, end } => RankSlice::Range { start, end },
            QueryShape::TopN(n) => RankSlice::Top(n),
            QueryShape::Compare { .. } | QueryShape::ChartSeries | QueryShape::SingleLookup | QueryShape::FullTable => {
                RankSlice::All
            }
        }
    }

    /// Years a product is read for. A comparison reads exactly its two years;
    /// every other shape reads the requested years.
    pub fn years(&self, requested: &[i32]) -> Vec<i32> {
        match *self {
            QueryShape::Compare { years: Some((a, b)) } => vec![a, b],
            _ => requested.to_vec(),
        }
    }
}

type ShapeMatcher = fn(&QueryIntent) -> Option<QueryShape>;

const MATCHERS: &[(&str, ShapeMatcher)] = &[
    ("compare", match_compare),
    ("rank_range", match_rank_range),
    ("top_n", match_top_n),
    ("chart_series", match_chart_series),
    ("single_lookup", match_single_lookup),
    ("full_table", match_full_table),
];

fn match_compare(intent: &QueryIntent) -> Option<QueryShape> {
    if !intent.wants_compare {
        return None;
    }
    let first = intent.years.first().copied();
    let last = intent.years.last().copied();
    let years = match (first, last) {
        (Some(a), Some(b)) if a != b => Some((a, b)),
        // a single year is compared against the year before it
        (Some(y), _) => Some((y - 1, y)),
        _ => None,
    };
    Some(QueryShape::Compare { years })
}

fn match_rank_range(intent: &QueryIntent) -> Option<QueryShape> {
    intent
        .rank_range()
        .map(|(start, end)| QueryShape::RankRange { start, end })
}

fn match_top_n(intent: &QueryIntent) -> Option<QueryShape> {
    intent.top_n().map(QueryShape::TopN)
}

fn match_chart_series(intent: &QueryIntent) -> Option<QueryShape> {
    (intent.wants_chart && !intent.organizations.is_empty()).then_some(QueryShape::ChartSeries)
}

fn match_single_lookup(intent: &QueryIntent) -> Option<QueryShape> {
    (!intent.organizations.is_empty()).then_some(QueryShape::SingleLookup)
}

fn match_full_table(_intent: &QueryIntent) -> Option<QueryShape> {
    Some(QueryShape::FullTable)
}

pub fn classify(intent: &QueryIntent) -> QueryShape {
    for (name, matcher) in MATCHERS {
        if let Some(shape) = matcher(intent) {
            debug!("Intent matched shape '{}'", name);
            return shape;
        }
    }
    QueryShape::FullTable
}

/// Everything the executor needs, fixed before any table is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub shape: QueryShape,
    /// Products in declared order.
    pub products: Vec<ProductCode>,
    /// True when the question named no product and every catalog product is
    /// swept.
    pub products_implicit: bool,
    /// Empty means every year a table holds.
    pub years: Vec<i32>,
    pub organizations: Vec<String>,
    pub metrics: Vec<MetricColumn>,
}

impl QueryPlan {
    pub fn build(intent: &QueryIntent, catalog: &AliasCatalog) -> Self {
        let shape = classify(intent);
        let products_implicit = intent.products.is_empty();
        let products = if products_implicit {
            catalog.products().iter().map(|p| p.code).collect()
        } else {
            intent.products.iter().copied().collect()
        };
        let metrics = if intent.metrics.is_empty() {
            vec![MetricColumn::Amount]
        } else {
            intent.metrics.clone()
        };

        Self {
            shape,
            products,
            products_implicit,
            years: intent.years.iter().copied().collect(),
            organizations: intent.organizations.clone(),
            metrics,
        }
    }
}
