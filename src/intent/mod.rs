// Intent parsing module
// Keyword-driven extraction of structured predicates from free text


use chrono::{DateTime, Duration, Utc};
use fancy_regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::filter::PredicateSet;

/// Ordered keyword tables. Within a table the first keyword found wins.
pub type KeywordTable = &'static [(&'static str, &'static str)];

pub const CATEGORY_KEYWORDS: KeywordTable = &[
    ("payment", "Payment"),
    ("billing", "Payment"),
    ("refund", "Payment"),
    ("invoice", "Payment"),
    ("charge", "Payment"),
    ("login", "Login"),
    ("log in", "Login"),
    ("sign in", "Login"),
    ("password", "Login"),
    ("order", "Order"),
    ("purchase", "Order"),
    ("checkout", "Order"),
    ("shipping", "Shipping"),
    ("shipment", "Shipping"),
    ("delivery", "Shipping"),
    ("tracking", "Shipping"),
];

pub const PRIORITY_KEYWORDS: KeywordTable = &[
    ("urgent", "High"),
    ("critical", "High"),
    ("emergency", "High"),
    ("asap", "High"),
    ("high", "High"),
    ("medium", "Medium"),
    ("normal", "Medium"),
    ("moderate", "Medium"),
    ("low", "Low"),
    ("minor", "Low"),
];

pub const STATUS_KEYWORDS: KeywordTable = &[
    ("unresolved", "Open"),
    ("open", "Open"),
    ("pending", "Open"),
    ("closed", "Closed"),
    ("resolved", "Resolved"),
    ("fixed", "Resolved"),
];

static RELATIVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\blast\s+(\d+)(?:\s*(days?|weeks?|months?))?\b").expect("valid regex")
});

const DAYS_PER_MONTH: i64 = 30;

/// Deterministic keyword-based intent parser.
///
/// Ambiguity is resolved by table order rather than by scoring, so the same
/// text always yields the same predicates.
#[derive(Debug, Clone, Copy)]
pub struct IntentParser {
    categories: KeywordTable,
    priorities: KeywordTable,
    statuses: KeywordTable,
}

impl IntentParser {
    #[inline]
    pub const fn new() -> Self {
        Self {
            categories: CATEGORY_KEYWORDS,
            priorities: PRIORITY_KEYWORDS,
            statuses: STATUS_KEYWORDS,
        }
    }

    /// Parser with custom keyword tables
    #[inline]
    pub const fn with_tables(
        categories: KeywordTable,
        priorities: KeywordTable,
        statuses: KeywordTable,
    ) -> Self {
        Self {
            categories,
            priorities,
            statuses,
        }
    }

    /// Parse relative to the current time
    #[inline]
    pub fn parse(&self, query: &str) -> PredicateSet {
        self.parse_at(query, Utc::now())
    }

    /// Parse relative to `now`; never fails, unrecognized text gives an empty set
    #[inline]
    pub fn parse_at(&self, query: &str, now: DateTime<Utc>) -> PredicateSet {
        let text = query.to_lowercase();

        let mut predicates = PredicateSet {
            category: first_keyword(&text, self.categories),
            priority: first_keyword(&text, self.priorities),
            status: first_keyword(&text, self.statuses),
            ..PredicateSet::default()
        };

        if let Some(span) = relative_span(&text) {
            if let Some(start) = now.checked_sub_signed(span) {
                predicates.start_date = Some(start);
                predicates.end_date = Some(now);
            }
        }

        debug!("Parsed intent for '{}': {:?}", query, predicates);
        predicates
    }
}

impl Default for IntentParser {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// First table entry whose keyword occurs in `text` at the start of a word
fn first_keyword(text: &str, table: KeywordTable) -> Option<String> {
    table
        .iter()
        .find(|(keyword, _)| contains_word_prefix(text, keyword))
        .map(|(_, value)| (*value).to_string())
}

fn contains_word_prefix(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(start, _)| {
        text.get(..start)
            .and_then(|before| before.chars().next_back())
            .is_none_or(|c| !c.is_alphanumeric())
    })
}

/// Span named by a "last N [days|weeks|months]" phrase
fn relative_span(text: &str) -> Option<Duration> {
    let captures = match RELATIVE_DATE.captures(text) {
        Ok(Some(captures)) => captures,
        Ok(None) => return None,
        Err(e) => {
            warn!("Relative date pattern failed: {}", e);
            return None;
        }
    };

    let amount: i64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2).map_or("days", |m| m.as_str());

    if unit.starts_with("week") {
        Duration::try_weeks(amount)
    } else if unit.starts_with("month") {
        Duration::try_days(amount.checked_mul(DAYS_PER_MONTH)?)
    } else {
        Duration::try_days(amount)
    }
}
