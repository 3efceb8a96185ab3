use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::lead::{FilterFingerprint, Lead};

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static CARD: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[data-view-name="search-entity-result"]"#));
static NAME: LazyLock<Selector> =
    LazyLock::new(|| selector(r#".artdeco-entity-lockup__title a span[aria-hidden="true"]"#));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| selector(r#".artdeco-entity-lockup__subtitle span[aria-hidden="true"]"#));
static CAPTION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#".artdeco-entity-lockup__caption span[aria-hidden="true"]"#));
static LOCATION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#".artdeco-entity-lockup__meta span[aria-hidden="true"]"#));
static PROFILE_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(".artdeco-entity-lockup__title a"));
static FILTER_PILL: LazyLock<Selector> =
    LazyLock::new(|| selector(".artdeco-pill--selected"));

static IN_ROLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d+\s+months?\s+in\s+role\b").unwrap());
static IN_COMPANY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d+\s+months?\s+in\s+company\b").unwrap());

const COMPANY_SEPARATOR: char = '·';
const RECENTLY_HIRED_MARKER: &str = "recently hired";

/// Why a single card produced no lead.
#[derive(Debug, Error, PartialEq)]
pub enum CardError {
    /// Ads and locked profiles leave out one of the required fields.
    #[error("missing {0}")]
    Missing(&'static str),
}

/// Leads read from one page plus a tally of the cards that were dropped.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub leads: Vec<Lead>,
    pub skipped: usize,
}

/// Reads lead records out of a rendered results page.
#[derive(Debug, Clone)]
pub struct ResultReader {
    parse_tenure: bool,
    base_url: Option<Url>,
}

impl Default for ResultReader {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ResultReader {
    pub fn new(parse_tenure: bool) -> Self {
        Self {
            parse_tenure,
            base_url: None,
        }
    }

    /// Base for resolving relative profile links.
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    pub fn card_count(&self, html: &str) -> usize {
        Html::parse_document(html).select(&CARD).count()
    }

    pub fn read(&self, html: &str) -> ReadOutcome {
        let doc = Html::parse_document(html);
        let mut out = ReadOutcome::default();

        for (idx, card) in doc.select(&CARD).enumerate() {
            match self.read_card(card) {
                Ok(lead) => {
                    debug!("Extracted: {} - {} at {}", lead.name, lead.title, lead.company);
                    out.leads.push(lead);
                }
                Err(e) => {
                    debug!("Card {} skipped: {}", idx, e);
                    out.skipped += 1;
                }
            }
        }

        out
    }

    fn read_card(&self, card: ElementRef) -> Result<Lead, CardError> {
        let name = first_text(card, &NAME).ok_or(CardError::Missing("name"))?;
        let title = first_text(card, &TITLE).ok_or(CardError::Missing("title"))?;
        let company = first_text(card, &CAPTION)
            .as_deref()
            .and_then(company_from_caption)
            .ok_or(CardError::Missing("company"))?;
        let location = first_text(card, &LOCATION);
        let profile_url = card
            .select(&PROFILE_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| self.resolve(href));

        let text = normalize_ws(&card.text().collect::<Vec<_>>().join(" "));
        let (time_in_role, time_at_company) = if self.parse_tenure {
            (find(&IN_ROLE_RE, &text), find(&IN_COMPANY_RE, &text))
        } else {
            (String::new(), String::new())
        };
        let recently_hired =
            !time_in_role.is_empty() || text.to_lowercase().contains(RECENTLY_HIRED_MARKER);

        Ok(Lead {
            name,
            title,
            company,
            location,
            profile_url,
            time_in_role,
            time_at_company,
            recently_hired,
            extracted_at: Utc::now(),
        })
    }

    /// The link is optional: a lead with an unusable one is still a lead.
    fn resolve(&self, href: &str) -> Option<String> {
        let parsed = match &self.base_url {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        match parsed {
            Ok(u) => Some(u.to_string()),
            // Relative link with nothing to resolve it against: keep as-is.
            Err(url::ParseError::RelativeUrlWithoutBase) if href.starts_with('/') => {
                Some(href.to_string())
            }
            Err(e) => {
                warn!("Dropping profile link {:?}: {}", href, e);
                None
            }
        }
    }
}

/// Active search filters on the page, as a fingerprint.
pub fn filter_fingerprint(html: &str) -> FilterFingerprint {
    let doc = Html::parse_document(html);
    let labels: Vec<String> = doc
        .select(&FILTER_PILL)
        .map(|el| normalize_ws(&el.text().collect::<String>()))
        .collect();
    FilterFingerprint::from_labels(labels)
}

/// `"Acme Corp · 501-1000 employees"` → `"Acme Corp"`.
pub fn company_from_caption(caption: &str) -> Option<String> {
    let company = caption.split(COMPANY_SEPARATOR).next()?.trim();
    if company.is_empty() {
        None
    } else {
        Some(company.to_string())
    }
}

fn first_text(card: ElementRef, sel: &Selector) -> Option<String> {
    card.select(sel)
        .next()
        .map(|el| normalize_ws(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn find(re: &Regex, text: &str) -> String {
    re.find(text).map(|m| m.as_str().to_string()).unwrap_or_default()
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
