use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Product categories that carry their own yearly league table.
///
/// The declaration order is the catalog's scan order and the order in which
/// products appear in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductCode {
    Ecm,
    Abs,
    Fb,
    Dcm,
    Sb,
    Ipo,
    Fo,
}

impl ProductCode {
    pub const ALL: [ProductCode; 7] = [
        ProductCode::Ecm,
        ProductCode::Abs,
        ProductCode::Fb,
        ProductCode::Dcm,
        ProductCode::Sb,
        ProductCode::Ipo,
        ProductCode::Fo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCode::Ecm => "ECM",
            ProductCode::Abs => "ABS",
            ProductCode::Fb => "FB",
            ProductCode::Dcm => "DCM",
            ProductCode::Sb => "SB",
            ProductCode::Ipo => "IPO",
            ProductCode::Fo => "FO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for ProductCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a larger or a smaller value of a metric is the better position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    HigherIsBetter,
    LowerIsBetter,
}

/// Outcome of a year-over-year move for one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeDirection {
    Improved,
    Declined,
}

impl SortDirection {
    /// Orders two metric values so that the better one comes first.
    ///
    /// NaN sorts after every real number regardless of direction.
    pub fn better_first(&self, a: f64, b: f64) -> Ordering {
        let ord = match self {
            SortDirection::HigherIsBetter => b.partial_cmp(&a),
            SortDirection::LowerIsBetter => a.partial_cmp(&b),
        };
        ord.unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
    }

    /// True when `a` is strictly better than `b`.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        self.better_first(a, b) == Ordering::Less
    }

    /// Classifies `delta = later - earlier`. Zero (or NaN) is neither.
    pub fn classify(&self, delta: f64) -> Option<ChangeDirection> {
        if delta == 0.0 || delta.is_nan() {
            return None;
        }
        let improved = match self {
            SortDirection::HigherIsBetter => delta > 0.0,
            SortDirection::LowerIsBetter => delta < 0.0,
        };
        Some(if improved {
            ChangeDirection::Improved
        } else {
            ChangeDirection::Declined
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricColumn {
    /// Total underwritten amount in KRW.
    Amount,
    DealCount,
    SharePercent,
    /// League table position; 1 is best.
    Rank,
}

impl MetricColumn {
    pub const ALL: [MetricColumn; 4] = [
        MetricColumn::Amount,
        MetricColumn::DealCount,
        MetricColumn::SharePercent,
        MetricColumn::Rank,
    ];

    pub fn direction(&self) -> SortDirection {
        match self {
            MetricColumn::Rank => SortDirection::LowerIsBetter,
            _ => SortDirection::HigherIsBetter,
        }
    }

    /// Column header used by the source spreadsheets and by rendered tables.
    pub fn header(&self) -> &'static str {
        match self {
            MetricColumn::Amount => "금액(원)",
            MetricColumn::DealCount => "건수",
            MetricColumn::SharePercent => "점유율(%)",
            MetricColumn::Rank => "순위",
        }
    }

    /// Raw value of this metric on a stored row. `Rank` is `None` when the
    /// table has no explicit rank column.
    pub fn raw_value(&self, row: &LeagueTableRow) -> Option<f64> {
        match self {
            MetricColumn::Amount => Some(row.amount),
            MetricColumn::DealCount => Some(f64::from(row.deal_count)),
            MetricColumn::SharePercent => Some(row.share_percent),
            MetricColumn::Rank => row.rank.map(f64::from),
        }
    }
}

impl fmt::Display for MetricColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricColumn::Amount => "Amount",
            MetricColumn::DealCount => "DealCount",
            MetricColumn::SharePercent => "SharePercent",
            MetricColumn::Rank => "Rank",
        };
        f.write_str(name)
    }
}

/// One organization's line in a (product, year) league table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueTableRow {
    pub year: i32,
    pub product: ProductCode,
    /// Explicit rank from the source table, if it has a rank column.
    #[serde(default)]
    pub rank: Option<u32>,
    /// Canonical organization name.
    pub organization: String,
    pub amount: f64,
    pub deal_count: u32,
    pub share_percent: f64,
}

/// Rank-based slicing. Holding `top_n` and `rank_range` in one enum makes them
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RankSlice {
    #[default]
    All,
    Top(u32),
    Range { start: u32, end: u32 },
}

impl RankSlice {
    /// Builds a range slice, swapping reversed bounds. Rank 0 is rejected.
    pub fn range(start: u32, end: u32) -> Option<Self> {
        if start == 0 || end == 0 {
            return None;
        }
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Some(RankSlice::Range { start, end })
    }

    pub fn top(n: u32) -> Option<Self> {
        (n > 0).then_some(RankSlice::Top(n))
    }

    pub fn contains(&self, rank: u32) -> bool {
        match *self {
            RankSlice::All => true,
            RankSlice::Top(n) => rank <= n,
            RankSlice::Range { start, end } => (start..=end).contains(&rank),
        }
    }
}

/// Validated representation of what a question asks for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryIntent {
    pub years: BTreeSet<i32>,
    pub products: BTreeSet<ProductCode>,
    /// Canonical organization names, or the raw text when it did not resolve.
    pub organizations: Vec<String>,
    pub metrics: Vec<MetricColumn>,
    pub slice: RankSlice,
    pub wants_chart: bool,
    pub wants_compare: bool,
}

impl QueryIntent {
    pub fn top_n(&self) -> Option<u32> {
        match self.slice {
            RankSlice::Top(n) => Some(n),
            _ => None,
        }
    }

    pub fn rank_range(&self) -> Option<(u32, u32)> {
        match self.slice {
            RankSlice::Range { start, end } => Some((start, end)),
            _ => None,
        }
    }

    /// First requested metric, which drives ranking and comparison.
    pub fn primary_metric(&self) -> MetricColumn {
        self.metrics.first().copied().unwrap_or(MetricColumn::Amount)
    }

    /// True when nothing usable was extracted.
    pub fn is_underspecified(&self) -> bool {
        self.years.is_empty() && self.products.is_empty() && self.organizations.is_empty()
    }

    pub fn add_metric(&mut self, metric: MetricColumn) {
        if !self.metrics.contains(&metric) {
            self.metrics.push(metric);
        }
    }

    pub fn add_organization(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.organizations.contains(&name) {
            self.organizations.push(name);
        }
    }

    /// Fills the default metric. Called by every extraction path before an
    /// intent is handed out.
    pub fn finalize(mut self, default_metric: MetricColumn) -> Self {
        if self.metrics.is_empty() {
            self.metrics.push(default_metric);
        }
        self
    }
}

/// Shape of the JSON object the external intent parser is asked to return.
///
/// Only used to generate the response schema; the returned object is
/// validated field by field rather than deserialized into this type.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExternalIntentFields {
    #[schemars(description = "Four-digit years the question asks about, e.g. [2021, 2022, 2023] for '2021~2023년'")]
    pub years: Vec<i32>,

    #[schemars(description = "Product codes mentioned: ECM, ABS, FB, DCM (국내채권), SB, IPO, FO")]
    pub product: Vec<String>,

    #[schemars(description = "Securities firms mentioned, exactly as written in the question")]
    pub company: Vec<String>,

    #[schemars(description = "Requested columns: 금액, 건수, 점유율, 순위")]
    pub columns: Vec<String>,

    #[schemars(description = "N for '상위 N개' style questions; omit otherwise")]
    pub top_n: Option<u32>,

    #[schemars(description = "[start, end] for 'A~B위' style questions; omit otherwise")]
    pub rank_range: Option<Vec<u32>>,

    #[schemars(description = "True when a graph or chart is requested")]
    pub is_chart: bool,

    #[schemars(description = "True when the question compares years (비교, 상승, 하락)")]
    pub is_compare: bool,
}

impl ExternalIntentFields {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ExternalIntentFields)
    }

    /// Response schema with `$ref`s inlined and `$schema`/`definitions`
    /// stripped, which is the form Gemini accepts.
    pub fn response_schema() -> serde_json::Result<serde_json::Value> {
        clean_schema(Self::generate_json_schema())
    }
}

pub fn clean_schema(root: schemars::schema::RootSchema) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(&root)?;
    let definitions = value
        .as_object_mut()
        .and_then(|obj| obj.remove("definitions"))
        .unwrap_or(serde_json::Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    inline_refs(&mut value, &definitions);
    Ok(value)
}

fn inline_refs(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(target) = map
                .get("$ref")
                .and_then(|r| r.as_str())
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
            {
                let mut replacement = target.clone();
                inline_refs(&mut replacement, definitions);
                *value = replacement;
                return;
            }
            for child in map.values_mut() {
                inline_refs(child, definitions);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}
