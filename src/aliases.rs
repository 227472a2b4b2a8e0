//! Alias resolution for organizations, products and metric columns.
//!
//! All lookups go through [`normalize`]: lowercase with every whitespace
//! character removed, so "kb 증권" and "KB증권" are the same key.

use crate::config::{CatalogConfig, ProductConfig};
use crate::error::{LeagueTableError, Result};
use crate::schema::{MetricColumn, ProductCode};
use log::debug;
use std::collections::{BTreeSet, HashMap};

pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub code: ProductCode,
    pub display_name: String,
    pub keywords: Vec<String>,
    pub metrics: BTreeSet<MetricColumn>,
}

impl Product {
    /// Rank is always available: explicit when the table carries it,
    /// derived otherwise.
    pub fn supports(&self, metric: MetricColumn) -> bool {
        metric == MetricColumn::Rank || self.metrics.contains(&metric)
    }

    pub fn has_explicit_rank(&self) -> bool {
        self.metrics.contains(&MetricColumn::Rank)
    }

    fn from_config(config: &ProductConfig) -> Self {
        Self {
            code: config.code,
            display_name: config.display_name.clone(),
            keywords: config.keywords.clone(),
            metrics: config.metrics.iter().copied().collect(),
        }
    }
}

/// Outcome of organization resolution: a canonical name, or the input handed
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgResolution {
    Canonical(String),
    Unresolved(String),
}

impl OrgResolution {
    pub fn name(&self) -> &str {
        match self {
            OrgResolution::Canonical(name) | OrgResolution::Unresolved(name) => name,
        }
    }

    pub fn into_name(self) -> String {
        match self {
            OrgResolution::Canonical(name) | OrgResolution::Unresolved(name) => name,
        }
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, OrgResolution::Canonical(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricResolution {
    Known(MetricColumn),
    Unknown(String),
}

const METRIC_KEYWORDS: &[(&str, MetricColumn)] = &[
    ("금액", MetricColumn::Amount),
    ("금액(원)", MetricColumn::Amount),
    ("규모", MetricColumn::Amount),
    ("amount", MetricColumn::Amount),
    ("건수", MetricColumn::DealCount),
    ("딜수", MetricColumn::DealCount),
    ("count", MetricColumn::DealCount),
    ("dealcount", MetricColumn::DealCount),
    ("점유율", MetricColumn::SharePercent),
    ("점유율(%)", MetricColumn::SharePercent),
    ("share", MetricColumn::SharePercent),
    ("sharepercent", MetricColumn::SharePercent),
    ("순위", MetricColumn::Rank),
    ("랭킹", MetricColumn::Rank),
    ("rank", MetricColumn::Rank),
    ("ranking", MetricColumn::Rank),
];

/// A catalog term found inside a question. Offsets are byte offsets into the
/// normalized question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermMatch<T> {
    pub value: T,
    pub start: usize,
    pub end: usize,
}

/// Finds catalog terms in an already-normalized haystack.
///
/// Longer terms are placed first and claim their span; a shorter term that
/// overlaps a claimed span is skipped. A term starting or ending with an ASCII
/// letter must not touch another ASCII letter on that side. Results are in
/// order of appearance.
pub fn scan_terms<T: Copy>(haystack: &str, terms: &[(String, T)]) -> Vec<TermMatch<T>> {
    let mut ordered: Vec<&(String, T)> = terms.iter().filter(|(t, _)| !t.is_empty()).collect();
    ordered.sort_by_key(|(t, _)| std::cmp::Reverse(t.chars().count()));

    let mut matches: Vec<TermMatch<T>> = Vec::new();
    for (term, value) in ordered {
        for (start, _) in haystack.match_indices(term.as_str()) {
            let end = start + term.len();
            if !has_ascii_boundaries(haystack, start, end) {
                continue;
            }
            if matches.iter().any(|m| start < m.end && m.start < end) {
                continue;
            }
            matches.push(TermMatch {
                value: *value,
                start,
                end,
            });
        }
    }
    matches.sort_by_key(|m| m.start);
    matches
}

fn has_ascii_boundaries(haystack: &str, start: usize, end: usize) -> bool {
    let term = &haystack[start..end];
    let first_is_letter = term.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let last_is_letter = term.chars().last().is_some_and(|c| c.is_ascii_alphabetic());
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();

    !(first_is_letter && before.is_some_and(|c| c.is_ascii_alphabetic()))
        && !(last_is_letter && after.is_some_and(|c| c.is_ascii_alphabetic()))
}

/// Endings that mark a word as a firm name, longest first.
const FIRM_SUFFIXES: &[&str] = &["금융투자", "투자증권", "증권", "투자"];
/// Particles that may trail a firm name inside a question.
const PARTICLES: &[&str] = &["에서", "은", "는", "이", "가", "을", "를", "와", "과", "의", "도", "만"];

/// The firm name a question word spells, if any. The part before the ending
/// must be non-empty, so "증권" or "투자증권" alone never count.
fn firm_like(word: &str) -> Option<&str> {
    let word = word.trim_matches(|c: char| !c.is_alphanumeric());
    std::iter::once(word)
        .chain(PARTICLES.iter().filter_map(|p| word.strip_suffix(p)))
        .find(|w| {
            FIRM_SUFFIXES
                .iter()
                .find(|suffix| w.ends_with(*suffix))
                .is_some_and(|suffix| w.len() > suffix.len())
        })
}

/// Immutable lookup tables built once from a [`CatalogConfig`].
#[derive(Debug, Clone)]
pub struct AliasCatalog {
    organizations: Vec<Organization>,
    org_index: HashMap<String, usize>,
    org_terms: Vec<(String, usize)>,
    products: Vec<Product>,
    product_terms: Vec<(String, ProductCode)>,
    metric_terms: Vec<(String, MetricColumn)>,
}

impl AliasCatalog {
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let mut organizations = Vec::with_capacity(config.organizations.len());
        let mut org_index: HashMap<String, usize> = HashMap::new();
        let mut org_terms = Vec::new();

        for (idx, entry) in config.organizations.iter().enumerate() {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(LeagueTableError::Config(format!(
                    "organization #{} has an empty name",
                    idx
                )));
            }
            for alias in std::iter::once(&name).chain(entry.aliases.iter()) {
                let key = normalize(alias);
                if key.is_empty() {
                    continue;
                }
                if let Some(&existing) = org_index.get(&key) {
                    if existing != idx {
                        return Err(LeagueTableError::Config(format!(
                            "alias '{}' is declared for both '{}' and '{}'",
                            alias, organizations_name(config, existing), name
                        )));
                    }
                    continue;
                }
                org_index.insert(key.clone(), idx);
                org_terms.push((key, idx));
            }
            organizations.push(Organization {
                name,
                aliases: entry.aliases.clone(),
            });
        }

        let mut products: Vec<Product> = Vec::with_capacity(config.products.len());
        for entry in &config.products {
            if products.iter().any(|p| p.code == entry.code) {
                return Err(LeagueTableError::Config(format!(
                    "product {} is declared twice",
                    entry.code
                )));
            }
            products.push(Product::from_config(entry));
        }

        let product_terms = products
            .iter()
            .flat_map(|p| {
                std::iter::once(p.code.as_str().to_string())
                    .chain(std::iter::once(p.display_name.clone()))
                    .chain(p.keywords.iter().cloned())
                    .map(move |k| (normalize(&k), p.code))
            })
            .collect();

        let metric_terms = METRIC_KEYWORDS
            .iter()
            .map(|(k, m)| (normalize(k), *m))
            .collect();

        debug!(
            "Alias catalog built with {} organizations ({} aliases) and {} products",
            organizations.len(),
            org_index.len(),
            products.len()
        );

        Ok(Self {
            organizations,
            org_index,
            org_terms,
            products,
            product_terms,
            metric_terms,
        })
    }

    pub fn organizations(&self) -> &[Organization] {
        &self.organizations
    }

    /// Products in declared order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, code: ProductCode) -> Option<&Product> {
        self.products.iter().find(|p| p.code == code)
    }
}

fn organizations_name(config: &CatalogConfig, idx: usize) -> &str {
    config
        .organizations
        .get(idx)
        .map(|o| o.name.as_str())
        .unwrap_or_default()
}

/// Resolves free text against an injected [`AliasCatalog`].
#[derive(Debug, Clone)]
pub struct AliasResolver {
    catalog: AliasCatalog,
}

impl AliasResolver {
    pub fn new(catalog: AliasCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &AliasCatalog {
        &self.catalog
    }

    /// Exact alias first, then containment against canonical names.
    ///
    /// A containment candidate scores the length of the overlap (the shorter
    /// of the two strings). The highest score wins; a tie between two
    /// organizations is an [`LeagueTableError::AmbiguousIntent`].
    pub fn resolve_organization(&self, text: &str) -> Result<OrgResolution> {
        let key = normalize(text);
        if key.is_empty() {
            return Ok(OrgResolution::Unresolved(text.trim().to_string()));
        }
        if let Some(&idx) = self.catalog.org_index.get(&key) {
            return Ok(OrgResolution::Canonical(
                self.catalog.organizations[idx].name.clone(),
            ));
        }

        let key_len = key.chars().count();
        let mut best_score = 0;
        let mut best: Vec<&Organization> = Vec::new();
        for org in &self.catalog.organizations {
            let canonical = normalize(&org.name);
            if !(canonical.contains(&key) || key.contains(&canonical)) {
                continue;
            }
            let score = key_len.min(canonical.chars().count());
            if score > best_score {
                best_score = score;
                best.clear();
                best.push(org);
            } else if score == best_score {
                best.push(org);
            }
        }

        match best.as_slice() {
            [] => Ok(OrgResolution::Unresolved(text.trim().to_string())),
            [only] => Ok(OrgResolution::Canonical(only.name.clone())),
            tied => Err(LeagueTableError::AmbiguousIntent {
                text: text.trim().to_string(),
                candidates: tied.iter().map(|o| o.name.clone()).collect(),
            }),
        }
    }

    /// Exact keyword match in declared order, then keyword containment in
    /// declared order.
    pub fn resolve_product(&self, text: &str) -> Option<&Product> {
        let key = normalize(text);
        if key.is_empty() {
            return None;
        }
        let code = self
            .catalog
            .product_terms
            .iter()
            .find(|(term, _)| *term == key)
            .or_else(|| {
                self.catalog
                    .product_terms
                    .iter()
                    .find(|(term, _)| !scan_terms(&key, &[(term.clone(), ())]).is_empty())
            })
            .map(|(_, code)| *code)?;
        self.catalog.product(code)
    }

    pub fn resolve_metric(&self, text: &str) -> MetricResolution {
        let key = normalize(text);
        let found = self
            .catalog
            .metric_terms
            .iter()
            .find(|(term, _)| *term == key)
            .or_else(|| {
                self.catalog
                    .metric_terms
                    .iter()
                    .find(|(term, _)| !key.is_empty() && key.contains(term.as_str()))
            });
        match found {
            Some((_, metric)) => MetricResolution::Known(*metric),
            None => MetricResolution::Unknown(text.trim().to_string()),
        }
    }

    /// Canonical names of organizations mentioned in a question, in order of
    /// first appearance.
    pub fn scan_organizations(&self, question: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for m in scan_terms(&normalize(question), &self.catalog.org_terms) {
            let name = &self.catalog.organizations[m.value].name;
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Firm-like words that no catalog term covers. Each is run through
    /// [`Self::resolve_organization`]; unresolved names are kept raw so the
    /// executor can report them. Ambiguous words are skipped.
    pub fn scan_unlisted_organizations(&self, question: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for word in question.split_whitespace() {
            let candidate = match firm_like(word) {
                Some(candidate) => candidate,
                None => continue,
            };
            if !scan_terms(&normalize(candidate), &self.catalog.org_terms).is_empty() {
                continue;
            }
            match self.resolve_organization(candidate) {
                Ok(resolution) => {
                    let name = resolution.into_name();
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                Err(e) => debug!("Skipping firm-like word '{}': {}", candidate, e),
            }
        }
        names
    }

    /// Products mentioned in a question, in declared order.
    pub fn scan_products(&self, question: &str) -> BTreeSet<ProductCode> {
        scan_terms(&normalize(question), &self.catalog.product_terms)
            .into_iter()
            .map(|m| m.value)
            .collect()
    }

    /// Metrics mentioned in a question, in order of first appearance.
    pub fn scan_metrics(&self, question: &str) -> Vec<MetricColumn> {
        let mut metrics = Vec::new();
        for m in scan_terms(&normalize(question), &self.catalog.metric_terms) {
            if !metrics.contains(&m.value) {
                metrics.push(m.value);
            }
        }
        metrics
    }
}
