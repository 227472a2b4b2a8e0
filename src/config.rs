use crate::error::{LeagueTableError, Result};
use crate::schema::{MetricColumn, ProductCode};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    /// Canonical name as it appears in the league tables.
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub code: ProductCode,
    pub display_name: String,
    /// Abbreviations and full-form synonyms, scanned in declared order.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Columns the product's table carries. `Rank` means an explicit rank column.
    pub metrics: Vec<MetricColumn>,
}

/// Declared organizations and products the alias catalog is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub organizations: Vec<OrganizationConfig>,
    pub products: Vec<ProductConfig>,
}

impl CatalogConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

fn org(name: &str, aliases: &[&str]) -> OrganizationConfig {
    OrganizationConfig {
        name: name.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

fn product(
    code: ProductCode,
    display_name: &str,
    keywords: &[&str],
    explicit_rank: bool,
) -> ProductConfig {
    let mut metrics = vec![
        MetricColumn::Amount,
        MetricColumn::DealCount,
        MetricColumn::SharePercent,
    ];
    if explicit_rank {
        metrics.push(MetricColumn::Rank);
    }
    ProductConfig {
        code,
        display_name: display_name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        metrics,
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            organizations: vec![
                org("KB증권", &["KB", "케이비증권", "KB투자증권"]),
                org("NH투자증권", &["NH", "NH증권", "농협증권", "엔에이치투자증권"]),
                org("한국투자증권", &["한투", "한국투자", "한국투자증권"]),
                org("미래에셋증권", &["미래에셋", "미래에셋대우"]),
                org("삼성증권", &["삼성"]),
                org("신한투자증권", &["신한", "신한증권", "신한금융투자", "신한금투"]),
                org("키움증권", &["키움"]),
                org("하나증권", &["하나금투", "하나금융투자"]),
                org("대신증권", &[]),
                org("메리츠증권", &["메리츠"]),
                org("한화투자증권", &["한화", "한화증권"]),
                org("유안타증권", &["유안타"]),
                org("교보증권", &["교보"]),
                org("SK증권", &["SK"]),
                org("DB금융투자", &["DB", "DB투자증권"]),
                org("IBK투자증권", &["IBK"]),
                org("현대차증권", &["현대차"]),
            ],
            products: vec![
                product(ProductCode::Ecm, "ECM", &["ECM", "주식자본시장", "주식발행"], true),
                product(ProductCode::Abs, "ABS", &["ABS", "자산유동화증권", "자산유동화"], true),
                product(ProductCode::Fb, "FB", &["FB", "여전채", "여신전문금융채"], true),
                product(ProductCode::Dcm, "국내채권", &["DCM", "국내채권", "채권"], true),
                product(ProductCode::Sb, "SB", &["SB", "일반회사채", "회사채"], false),
                product(ProductCode::Ipo, "IPO", &["IPO", "기업공개", "상장"], false),
                product(ProductCode::Fo, "FO", &["FO", "유상증자"], false),
            ],
        }
    }
}

/// Which source is authoritative for a row's active rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSource {
    /// Use the stored rank column when every row of the partition has one,
    /// otherwise derive from the ranking metric.
    #[default]
    PreferExplicit,
    /// Always derive from the ranking metric.
    AlwaysDerive,
}

fn default_parser_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rank_source: RankSource,

    /// Upper bound for one external intent parser call.
    #[serde(default = "default_parser_timeout_ms")]
    pub parser_timeout_ms: u64,

    /// Year that "올해", "작년" and "최근 N년" are resolved against. Defaults to
    /// the current calendar year.
    #[serde(default)]
    pub reference_year: Option<i32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rank_source: RankSource::default(),
            parser_timeout_ms: default_parser_timeout_ms(),
            reference_year: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parser_timeout_ms == 0 {
            return Err(LeagueTableError::Config(
                "parser_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn parser_timeout(&self) -> Duration {
        Duration::from_millis(self.parser_timeout_ms)
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}
