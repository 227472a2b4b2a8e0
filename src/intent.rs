//! Turns a question into a validated [`QueryIntent`].
//!
//! Three entry points share one output type:
//!
//! - structured keyword questions (`2020, ECM, 대표주관, KB, 순위`),
//! - natural-language questions handled by deterministic rules,
//! - assisted questions, where an external [`IntentParser`] is tried first
//!   and its untyped JSON is validated field by field. Any failure on that
//!   path falls back to the rules.

use crate::aliases::{normalize, AliasResolver, MetricResolution};
use crate::config::EngineConfig;
use crate::error::{LeagueTableError, Result};
use crate::schema::{MetricColumn, QueryIntent, RankSlice};
use async_trait::async_trait;
use log::{debug, info, warn};
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const STRUCTURED_FIELDS: usize = 5;
const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

const CHART_WORDS: &[&str] = &["그래프", "차트", "추이", "chart", "graph"];
const COMPARE_WORDS: &[&str] = &["비교", "오른", "하락", "상승", "compare"];
const ALL_WORDS: &[&str] = &["", "-", "전체", "all"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionMode {
    Structured,
    NaturalLanguage,
}

/// External collaborator that turns a question into loosely structured JSON.
///
/// The returned value is treated as untrusted data.
#[async_trait]
pub trait IntentParser: Send + Sync {
    async fn parse(&self, question: &str) -> Result<Value>;
}

fn year_range_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(\d{4})\s*년?\s*(?:~|-|–|부터)\s*(\d{4})").expect("year range pattern")
    })
}

fn digit_run_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\d+").expect("digit pattern"))
}

fn recent_years_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"최근\s*(\d{1,2})\s*(?:개년|년)").expect("recent years pattern"))
}

fn rank_range_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?:^|[^\d])(\d{1,3})\s*위?\s*(?:~|-|부터)\s*(\d{1,3})\s*위")
            .expect("rank range pattern")
    })
}

fn top_n_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)(?:상위|top)\s*(\d{1,3})").expect("top n pattern"))
}

fn single_rank_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?:^|[^\d])(\d{1,3})\s*위").expect("single rank pattern"))
}

fn valid_year(year: i64) -> Option<i32> {
    i32::try_from(year)
        .ok()
        .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
}

fn inclusive_years(a: i32, b: i32) -> BTreeSet<i32> {
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    (start..=end).collect()
}

fn is_all(text: &str) -> bool {
    ALL_WORDS.contains(&normalize(text).as_str())
}

pub struct IntentExtractor<'a> {
    resolver: &'a AliasResolver,
    config: &'a EngineConfig,
}

impl<'a> IntentExtractor<'a> {
    pub fn new(resolver: &'a AliasResolver, config: &'a EngineConfig) -> Self {
        Self { resolver, config }
    }

    pub fn extract(&self, question: &str, mode: QuestionMode) -> Result<QueryIntent> {
        let intent = match mode {
            QuestionMode::Structured => self.extract_structured(question)?,
            QuestionMode::NaturalLanguage => self.extract_natural(question)?,
        };
        debug!("Extracted intent: {:?}", intent);
        Ok(intent)
    }

    /// `year-or-range, product, column, org[/org...], rank-or-range`
    pub fn extract_structured(&self, question: &str) -> Result<QueryIntent> {
        let fields: Vec<&str> = question.split(',').map(str::trim).collect();
        if fields.len() != STRUCTURED_FIELDS {
            return Err(LeagueTableError::MalformedInput {
                expected: STRUCTURED_FIELDS,
                found: fields.len(),
            });
        }

        let mut intent = QueryIntent {
            years: parse_year_field(fields[0])?,
            ..Default::default()
        };

        if !is_all(fields[1]) {
            let product = self
                .resolver
                .resolve_product(fields[1])
                .ok_or_else(|| LeagueTableError::InvalidField {
                    field: "product".to_string(),
                    details: format!("'{}' is not a known product", fields[1]),
                })?;
            intent.products.insert(product.code);
        }

        match self.resolver.resolve_metric(fields[2]) {
            MetricResolution::Known(metric) => intent.add_metric(metric),
            // table categories such as "대표주관" name no column
            MetricResolution::Unknown(label) => debug!("Column label '{}' keeps the default metric", label),
        }

        if !is_all(fields[3]) {
            for part in fields[3].split('/').filter(|p| !p.trim().is_empty()) {
                let org = self.resolver.resolve_organization(part)?;
                intent.add_organization(org.into_name());
            }
        }

        intent.slice = parse_rank_field(fields[4])?;

        if intent.is_underspecified() {
            return Err(LeagueTableError::UnderspecifiedQuery(question.trim().to_string()));
        }
        Ok(intent.finalize(MetricColumn::Amount))
    }

    pub fn extract_natural(&self, question: &str) -> Result<QueryIntent> {
        let compact = normalize(question);

        let mut intent = QueryIntent {
            years: self.scan_years(question),
            products: self.resolver.scan_products(question),
            slice: scan_rank_slice(question),
            wants_chart: CHART_WORDS.iter().any(|w| compact.contains(w)),
            wants_compare: COMPARE_WORDS.iter().any(|w| compact.contains(w)),
            ..Default::default()
        };
        for org in self.resolver.scan_organizations(question) {
            intent.add_organization(org);
        }
        // firms outside the catalog flow on raw and surface as notices
        for org in self.resolver.scan_unlisted_organizations(question) {
            intent.add_organization(org);
        }
        for metric in self.resolver.scan_metrics(question) {
            intent.add_metric(metric);
        }

        if intent.is_underspecified() {
            return Err(LeagueTableError::UnderspecifiedQuery(question.trim().to_string()));
        }
        Ok(intent.finalize(MetricColumn::Amount))
    }

    /// Explicit ranges win over loose years; relative phrases are added on
    /// top. A previous-year phrase is relative to a single explicit year and
    /// is otherwise resolved against the configured reference year.
    fn scan_years(&self, question: &str) -> BTreeSet<i32> {
        let mut years = BTreeSet::new();

        if let Some(caps) = year_range_regex().captures(question) {
            let start = caps[1].parse::<i64>().ok().and_then(valid_year);
            let end = caps[2].parse::<i64>().ok().and_then(valid_year);
            if let (Some(start), Some(end)) = (start, end) {
                years.extend(inclusive_years(start, end));
            }
        }
        if years.is_empty() {
            years.extend(
                digit_run_regex()
                    .find_iter(question)
                    .filter(|m| m.as_str().len() == 4)
                    .filter_map(|m| m.as_str().parse::<i64>().ok())
                    .filter_map(valid_year),
            );
        }

        // "전년 대비" after an explicit year means the year before it
        let anchor = match (years.first(), years.len()) {
            (Some(&year), 1) => Some(year),
            _ => None,
        };
        let explicit = !years.is_empty();

        let reference = self.config.reference_year();
        if let Some(caps) = recent_years_regex().captures(question) {
            if let Ok(n) = caps[1].parse::<i32>() {
                if n > 0 {
                    years.extend(inclusive_years(reference - n + 1, reference));
                }
            }
        }
        let compact = normalize(question);
        if compact.contains("올해") || compact.contains("금년") {
            years.insert(reference);
        }
        if compact.contains("작년") || compact.contains("지난해") || compact.contains("전년") {
            match anchor {
                Some(year) => {
                    years.insert(year - 1);
                }
                None if explicit => debug!("Previous-year phrase ignored next to several explicit years"),
                None => {
                    years.insert(reference - 1);
                }
            }
        }

        years
    }

    /// Tries the external parser under the configured timeout and falls back
    /// to rule extraction when it fails or returns nothing usable.
    pub async fn extract_assisted(&self, question: &str, parser: &dyn IntentParser) -> Result<QueryIntent> {
        match self.try_external(question, parser).await {
            Ok(intent) => {
                info!("Using external parser intent");
                debug!("External intent: {:?}", intent);
                Ok(intent)
            }
            Err(e) => {
                warn!("{}; falling back to rule extraction", e);
                self.extract_natural(question)
            }
        }
    }

    async fn try_external(&self, question: &str, parser: &dyn IntentParser) -> Result<QueryIntent> {
        let timeout = self.config.parser_timeout();
        let value = tokio::time::timeout(timeout, parser.parse(question))
            .await
            .map_err(|_| {
                LeagueTableError::ExternalParserFailure(format!(
                    "no response within {} ms",
                    timeout.as_millis()
                ))
            })?
            .map_err(|e| match e {
                LeagueTableError::ExternalParserFailure(_) => e,
                other => LeagueTableError::ExternalParserFailure(other.to_string()),
            })?;

        let intent = self.validate_external(&value)?;
        if intent.is_underspecified() {
            return Err(LeagueTableError::ExternalParserFailure(
                "response named no product, organization or year".to_string(),
            ));
        }
        Ok(intent)
    }

    /// Builds an intent from external parser output, keeping only the fields
    /// that validate. Unknown keys are dropped.
    pub fn validate_external(&self, value: &Value) -> Result<QueryIntent> {
        let obj = value.as_object().ok_or_else(|| {
            LeagueTableError::ExternalParserFailure(format!("expected a JSON object, got {}", value))
        })?;

        let mut intent = QueryIntent::default();
        let mut top_n: Option<RankSlice> = None;
        let mut rank_range: Option<RankSlice> = None;

        for (key, field) in obj {
            match key.as_str() {
                "years" => {
                    for item in items(field) {
                        match item.as_i64().and_then(valid_year) {
                            Some(year) => {
                                intent.years.insert(year);
                            }
                            None => discard("years", item),
                        }
                    }
                }
                "product" => {
                    for item in items(field) {
                        match item.as_str() {
                            Some(text) if is_all(text) => {}
                            Some(text) => match self.resolver.resolve_product(text) {
                                Some(product) => {
                                    intent.products.insert(product.code);
                                }
                                None => discard("product", item),
                            },
                            None => discard("product", item),
                        }
                    }
                }
                "company" => {
                    for item in items(field) {
                        let text = match item.as_str() {
                            Some(text) if !text.trim().is_empty() => text,
                            _ => {
                                discard("company", item);
                                continue;
                            }
                        };
                        match self.resolver.resolve_organization(text) {
                            Ok(org) => intent.add_organization(org.into_name()),
                            Err(e) => warn!("Discarding external field 'company': {}", e),
                        }
                    }
                }
                "columns" => {
                    for item in items(field) {
                        match item.as_str().map(|text| self.resolver.resolve_metric(text)) {
                            Some(MetricResolution::Known(metric)) => intent.add_metric(metric),
                            _ => discard("columns", item),
                        }
                    }
                }
                "top_n" => match field.as_u64().and_then(|n| u32::try_from(n).ok()) {
                    Some(n) => top_n = RankSlice::top(n),
                    None if field.is_null() => {}
                    None => discard("top_n", field),
                },
                "rank_range" => match parse_external_range(field) {
                    Some(slice) => rank_range = Some(slice),
                    None if field.is_null() => {}
                    None => discard("rank_range", field),
                },
                "is_chart" => match field.as_bool() {
                    Some(flag) => intent.wants_chart = flag,
                    None => discard("is_chart", field),
                },
                "is_compare" => match field.as_bool() {
                    Some(flag) => intent.wants_compare = flag,
                    None => discard("is_compare", field),
                },
                other => debug!("Dropping unknown external field '{}'", other),
            }
        }

        if let (Some(_), Some(_)) = (top_n, rank_range) {
            debug!("Both top_n and rank_range present; keeping rank_range");
        }
        intent.slice = rank_range.or(top_n).unwrap_or_default();

        Ok(intent.finalize(MetricColumn::Amount))
    }
}

/// A scalar is treated as a one-element list.
fn items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(values) => values.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn discard(field: &str, value: &Value) {
    warn!("Discarding invalid external field '{}': {}", field, value);
}

fn parse_external_range(value: &Value) -> Option<RankSlice> {
    match value {
        Value::Array(bounds) if bounds.len() == 2 => {
            let start = u32::try_from(bounds[0].as_u64()?).ok()?;
            let end = u32::try_from(bounds[1].as_u64()?).ok()?;
            RankSlice::range(start, end)
        }
        Value::String(text) => parse_rank_range_text(&normalize(text)),
        _ => None,
    }
}

fn parse_year_field(field: &str) -> Result<BTreeSet<i32>> {
    if is_all(field) {
        return Ok(BTreeSet::new());
    }
    let invalid = || LeagueTableError::InvalidField {
        field: "year".to_string(),
        details: format!("'{}' is not a year or year range", field),
    };
    let parse = |text: &str| -> Result<i32> {
        text.trim()
            .trim_end_matches('년')
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(valid_year)
            .ok_or_else(invalid)
    };

    match field.split_once(['~', '-']) {
        Some((start, end)) => Ok(inclusive_years(parse(start)?, parse(end)?)),
        None => Ok(BTreeSet::from([parse(field)?])),
    }
}

fn parse_rank_range_text(compact: &str) -> Option<RankSlice> {
    let (start, end) = compact.split_once(['~', '-'])?;
    let start = start.trim_end_matches('위').parse::<u32>().ok()?;
    let end = end.trim_end_matches('위').parse::<u32>().ok()?;
    RankSlice::range(start, end)
}

fn parse_rank_field(field: &str) -> Result<RankSlice> {
    let compact = normalize(field);
    if is_all(&compact) || compact == "순위" {
        return Ok(RankSlice::All);
    }

    let top = compact
        .strip_prefix("상위")
        .or_else(|| compact.strip_prefix("top"));
    let slice = match top {
        Some(rest) => rest
            .trim_end_matches(['위', '개'])
            .parse::<u32>()
            .ok()
            .and_then(RankSlice::top),
        None if compact.contains(['~', '-']) => parse_rank_range_text(&compact),
        None => compact
            .trim_end_matches('위')
            .parse::<u32>()
            .ok()
            .and_then(|n| RankSlice::range(n, n)),
    };

    slice.ok_or_else(|| LeagueTableError::InvalidField {
        field: "rank".to_string(),
        details: format!("'{}' is not a rank, rank range or top-N", field),
    })
}

fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps[group].parse::<u32>().ok()
}

/// Range beats top-N, which beats a lone "N위".
fn scan_rank_slice(question: &str) -> RankSlice {
    if let Some(caps) = rank_range_regex().captures(question) {
        if let Some(slice) = number(&caps, 1)
            .zip(number(&caps, 2))
            .and_then(|(a, b)| RankSlice::range(a, b))
        {
            return slice;
        }
    }
    if let Some(slice) = top_n_regex()
        .captures(question)
        .and_then(|caps| number(&caps, 1))
        .and_then(RankSlice::top)
    {
        return slice;
    }
    single_rank_regex()
        .captures(question)
        .and_then(|caps| number(&caps, 1))
        .and_then(|n| RankSlice::range(n, n))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::AliasCatalog;
    use crate::config::CatalogConfig;
    use crate::schema::ProductCode;
    use serde_json::json;
    use std::time::Duration;

    fn resolver() -> AliasResolver {
        AliasResolver::new(AliasCatalog::from_config(&CatalogConfig::default()).unwrap())
    }

    fn config() -> EngineConfig {
        EngineConfig {
            reference_year: Some(2024),
            parser_timeout_ms: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_structured_keywords() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let intent = extractor
            .extract("2020, ECM, 대표주관, KB, 순위", QuestionMode::Structured)
            .unwrap();

        assert_eq!(intent.years, BTreeSet::from([2020]));
        assert_eq!(intent.products, BTreeSet::from([ProductCode::Ecm]));
        assert_eq!(intent.organizations, vec!["KB증권".to_string()]);
        assert_eq!(intent.metrics, vec![MetricColumn::Amount]);
        assert_eq!(intent.slice, RankSlice::All);
    }

    #[test]
    fn test_structured_ranges_and_lists() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let intent = extractor
            .extract_structured("2020~2022, 국내채권, 점유율, 한투/NH, 2~5")
            .unwrap();

        assert_eq!(intent.years, BTreeSet::from([2020, 2021, 2022]));
        assert_eq!(intent.products, BTreeSet::from([ProductCode::Dcm]));
        assert_eq!(intent.metrics, vec![MetricColumn::SharePercent]);
        assert_eq!(
            intent.organizations,
            vec!["한국투자증권".to_string(), "NH투자증권".to_string()]
        );
        assert_eq!(intent.slice, RankSlice::Range { start: 2, end: 5 });

        let top = extractor.extract_structured("2023, 전체, 금액, -, 상위3").unwrap();
        assert!(top.products.is_empty());
        assert_eq!(top.slice, RankSlice::Top(3));

        let single = extractor.extract_structured("2023, ABS, 건수, -, 1위").unwrap();
        assert_eq!(single.slice, RankSlice::Range { start: 1, end: 1 });
    }

    #[test]
    fn test_structured_errors() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);

        assert!(matches!(
            extractor.extract_structured("2020, ECM, 대표주관, KB"),
            Err(LeagueTableError::MalformedInput { expected: 5, found: 4 })
        ));
        assert!(matches!(
            extractor.extract_structured("2020, 주식, 금액, KB, 순위"),
            Err(LeagueTableError::InvalidField { .. })
        ));
        assert!(matches!(
            extractor.extract_structured("2020, ECM, 금액, 투자증권, 순위"),
            Err(LeagueTableError::AmbiguousIntent { .. })
        ));
        assert!(matches!(
            extractor.extract_structured("-, 전체, 금액, -, 순위"),
            Err(LeagueTableError::UnderspecifiedQuery(_))
        ));
    }

    #[test]
    fn test_structured_unknown_org_is_kept_raw() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let intent = extractor.extract_structured("2020, ECM, 금액, 없는회사, 순위").unwrap();
        assert_eq!(intent.organizations, vec!["없는회사".to_string()]);
    }

    #[test]
    fn test_natural_language_year_range() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let intent = extractor
            .extract("2021~2023년 ECM에서 신한 순위", QuestionMode::NaturalLanguage)
            .unwrap();

        assert_eq!(intent.years, BTreeSet::from([2021, 2022, 2023]));
        assert_eq!(intent.products, BTreeSet::from([ProductCode::Ecm]));
        assert_eq!(intent.organizations, vec!["신한투자증권".to_string()]);
        assert_eq!(intent.metrics, vec![MetricColumn::Rank]);
        assert_eq!(intent.slice, RankSlice::All);
    }

    #[test]
    fn test_natural_language_slices() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);

        let top = extractor
            .extract_natural("2020~2024년 ABS 대표주관 상위 3개사 보여줘")
            .unwrap();
        assert_eq!(top.slice, RankSlice::Top(3));
        assert_eq!(top.years.len(), 5);

        let range = extractor.extract_natural("2023년 ECM 2~4위 알려줘").unwrap();
        assert_eq!(range.slice, RankSlice::Range { start: 2, end: 4 });

        let single = extractor.extract_natural("2022년 FB 대표주관 1위는 어디야?").unwrap();
        assert_eq!(single.slice, RankSlice::Range { start: 1, end: 1 });
        assert_eq!(single.products, BTreeSet::from([ProductCode::Fb]));

        let english = extractor.extract_natural("IPO 2023 top 5").unwrap();
        assert_eq!(english.slice, RankSlice::Top(5));
    }

    #[test]
    fn test_natural_language_flags_and_metrics() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let intent = extractor
            .extract_natural("2023년 ECM 금액과 건수 기준 순위를 그래프로 보여줘")
            .unwrap();

        assert!(intent.wants_chart);
        assert!(!intent.wants_compare);
        assert_eq!(
            intent.metrics,
            vec![MetricColumn::Amount, MetricColumn::DealCount, MetricColumn::Rank]
        );

        let compare = extractor
            .extract_natural("2022년 대비 2023년 ABS 순위 오른 증권사")
            .unwrap();
        assert!(compare.wants_compare);
        assert_eq!(compare.years, BTreeSet::from([2022, 2023]));
    }

    #[test]
    fn test_relative_years() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);

        let recent = extractor.extract_natural("최근 3년 KB증권 ECM 실적").unwrap();
        assert_eq!(recent.years, BTreeSet::from([2022, 2023, 2024]));

        let last_year = extractor.extract_natural("작년 DCM 순위").unwrap();
        assert_eq!(last_year.years, BTreeSet::from([2023]));
    }

    #[test]
    fn test_previous_year_follows_explicit_year() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);

        let intent = extractor.extract_natural("2023년 ECM 순위 전년 대비 비교").unwrap();
        assert!(intent.wants_compare);
        assert_eq!(intent.years, BTreeSet::from([2022, 2023]));

        let intent = extractor.extract_natural("2020년 DCM 작년 대비 점유율").unwrap();
        assert_eq!(intent.years, BTreeSet::from([2019, 2020]));

        // several explicit years leave nothing to anchor on
        let intent = extractor
            .extract_natural("2021년과 2023년 ECM 전년 대비 비교")
            .unwrap();
        assert_eq!(intent.years, BTreeSet::from([2021, 2023]));
    }

    #[test]
    fn test_ascii_keyword_not_matched_inside_words() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let result = extractor.extract_natural("show me information please");
        assert!(matches!(result, Err(LeagueTableError::UnderspecifiedQuery(_))));
    }

    #[test]
    fn test_validate_external_fields() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let value = json!({
            "years": [2022, "abc", 1800, 2023],
            "product": ["ECM", "주식"],
            "company": "신한",
            "columns": ["점유율", "bogus"],
            "top_n": 3,
            "rank_range": [5, 2],
            "is_chart": "yes",
            "is_compare": true,
            "extra": {"anything": 1}
        });
        let intent = extractor.validate_external(&value).unwrap();

        assert_eq!(intent.years, BTreeSet::from([2022, 2023]));
        assert_eq!(intent.products, BTreeSet::from([ProductCode::Ecm]));
        assert_eq!(intent.organizations, vec!["신한투자증권".to_string()]);
        assert_eq!(intent.metrics, vec![MetricColumn::SharePercent]);
        assert_eq!(intent.slice, RankSlice::Range { start: 2, end: 5 });
        assert!(!intent.wants_chart);
        assert!(intent.wants_compare);
    }

    #[test]
    fn test_validate_external_rejects_non_object() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        assert!(matches!(
            extractor.validate_external(&json!(["ECM"])),
            Err(LeagueTableError::ExternalParserFailure(_))
        ));
    }

    struct FixedParser(Value);

    #[async_trait]
    impl IntentParser for FixedParser {
        async fn parse(&self, _question: &str) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct FailingParser;

    #[async_trait]
    impl IntentParser for FailingParser {
        async fn parse(&self, _question: &str) -> Result<Value> {
            Err(LeagueTableError::ExternalParserFailure("service unavailable".to_string()))
        }
    }

    struct SlowParser;

    #[async_trait]
    impl IntentParser for SlowParser {
        async fn parse(&self, _question: &str) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({"product": ["ABS"]}))
        }
    }

    #[tokio::test]
    async fn test_assisted_uses_valid_external_intent() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let parser = FixedParser(json!({"years": [2021], "product": ["IPO"], "top_n": 2}));
        let intent = extractor
            .extract_assisted("2023년 ECM 순위", &parser)
            .await
            .unwrap();

        assert_eq!(intent.products, BTreeSet::from([ProductCode::Ipo]));
        assert_eq!(intent.slice, RankSlice::Top(2));
    }

    #[tokio::test]
    async fn test_assisted_falls_back_on_failure_timeout_and_garbage() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let question = "2023년 ECM 순위";

        let parsers: Vec<Box<dyn IntentParser>> = vec![
            Box::new(FailingParser),
            Box::new(SlowParser),
            Box::new(FixedParser(json!("not an object"))),
            Box::new(FixedParser(json!({"is_chart": true}))),
        ];
        for parser in parsers {
            let intent = extractor.extract_assisted(question, parser.as_ref()).await.unwrap();
            assert_eq!(intent.products, BTreeSet::from([ProductCode::Ecm]));
            assert_eq!(intent.years, BTreeSet::from([2023]));
        }
    }

    #[tokio::test]
    async fn test_assisted_fallback_error_is_the_rule_error() {
        let (r, c) = (resolver(), config());
        let extractor = IntentExtractor::new(&r, &c);
        let result = extractor.extract_assisted("안녕하세요", &FailingParser).await;
        assert!(matches!(result, Err(LeagueTableError::UnderspecifiedQuery(_))));
    }
}
