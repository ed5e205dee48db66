// Response synthesis module
// Turns a result list into a one-paragraph summary with aggregate insights

#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;

use crate::records::{Category, Priority, Record, Status};

pub const NO_MATCHES: &str = "No matching tickets found.";
pub const DEFAULT_RECENT_WINDOW_DAYS: u32 = 2;
pub const DEFAULT_TITLE_PREVIEW_CHARS: usize = 30;

/// Only the first few records are checked for the "recent" clause
const RECENT_SCAN_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct ResponseSynthesizer {
    recent_window_days: u32,
    title_preview_chars: usize,
}

impl ResponseSynthesizer {
    #[inline]
    pub const fn new(recent_window_days: u32, title_preview_chars: usize) -> Self {
        Self {
            recent_window_days,
            title_preview_chars,
        }
    }

    #[inline]
    pub fn summarize(&self, query: &str, records: &[&Record]) -> String {
        self.summarize_at(query, records, Utc::now())
    }

    /// Build the summary relative to `now`.
    ///
    /// Layout: count sentence, then an insights clause (high priority, open,
    /// dominant category), then a recent clause. Clauses with nothing to say
    /// are omitted.
    pub fn summarize_at(&self, query: &str, records: &[&Record], now: DateTime<Utc>) -> String {
        if records.is_empty() {
            return NO_MATCHES.to_string();
        }

        let count = records.len();
        let mut sentences = vec![format!(
            "Found {} {} for \"{}\".",
            count,
            if count == 1 { "ticket" } else { "tickets" },
            query.trim()
        )];

        let high = records
            .iter()
            .filter(|r| r.priority == Priority::High)
            .count();
        let open = records.iter().filter(|r| r.status == Status::Open).count();

        let mut insights = Vec::new();
        if high > 0 {
            insights.push(format!("{} high priority", high));
        }
        if open > 0 {
            insights.push(format!("{} open", open));
        }
        if let Some((category, occurrences)) = dominant_category(records) {
            if occurrences > 1 {
                insights.push(format!("mostly {} ({})", category, occurrences));
            }
        }
        if !insights.is_empty() {
            sentences.push(format!("Insights: {}.", insights.iter().join(", ")));
        }

        let cutoff = Duration::try_days(i64::from(self.recent_window_days))
            .and_then(|window| now.checked_sub_signed(window));
        let recent: Vec<String> = records
            .iter()
            .take(RECENT_SCAN_LIMIT)
            .filter(|r| cutoff.is_none_or(|cutoff| r.created_at >= cutoff))
            .map(|r| r.title.chars().take(self.title_preview_chars).collect())
            .collect();
        if !recent.is_empty() {
            sentences.push(format!("Recent: {}.", recent.iter().join("; ")));
        }

        sentences.join(" ")
    }
}

impl Default for ResponseSynthesizer {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_WINDOW_DAYS, DEFAULT_TITLE_PREVIEW_CHARS)
    }
}

/// Most frequent category; ties go to the one encountered first
fn dominant_category<'a>(records: &[&'a Record]) -> Option<(&'a Category, usize)> {
    let mut counts: Vec<(&Category, usize)> = Vec::new();
    for &record in records {
        match counts
            .iter()
            .position(|(category, _)| **category == record.category)
        {
            Some(position) => counts[position].1 += 1,
            None => counts.push((&record.category, 1)),
        }
    }

    counts
        .into_iter()
        .fold(None, |best: Option<(&Category, usize)>, (category, count)| {
            match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((category, count)),
            }
        })
}
