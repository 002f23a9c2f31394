//! Candidate filtering.
//!
//! Categories combine with logical AND; terms within a category are an OR
//! group, split on commas or ideographic commas. Matching is
//! case-insensitive substring; an unset category always passes.

use serde::{Deserialize, Serialize};

use crate::model::Candidate;

/// Keyword criteria for one run. Immutable once constructed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Matched against the title or the source name.
    pub title_terms: Vec<String>,
    /// Matched against the location text.
    pub location_terms: Vec<String>,
    /// Matched against the location text (city-level list).
    pub city_terms: Vec<String>,
    /// Applied inside the worker against the detail body text.
    pub description_terms: Vec<String>,
    /// Reject candidates tagged as intermediary postings.
    pub exclude_intermediary: bool,
}

impl FilterCriteria {
    /// Build criteria from raw comma-separated option strings, the way they
    /// arrive from the configuration surface.
    pub fn from_raw(
        title: &str,
        location: &str,
        city: &str,
        description: &str,
        exclude_intermediary: bool,
    ) -> Self {
        Self {
            title_terms: split_terms(title),
            location_terms: split_terms(location),
            city_terms: split_terms(city),
            description_terms: split_terms(description),
            exclude_intermediary,
        }
    }
}

/// Split a raw term list on `,` or `，`, trimming and dropping empties.
pub fn split_terms(raw: &str) -> Vec<String> {
    raw.split([',', '，'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// First term matching `haystack`, case-insensitive substring.
pub fn matched_term<'a>(haystack: &str, terms: &'a [String]) -> Option<&'a str> {
    let lowered = haystack.to_lowercase();
    terms
        .iter()
        .find(|t| lowered.contains(&t.to_lowercase()))
        .map(String::as_str)
}

/// All terms matching `haystack`, in term order.
pub fn matched_terms<'a>(haystack: &str, terms: &'a [String]) -> Vec<&'a str> {
    let lowered = haystack.to_lowercase();
    terms
        .iter()
        .filter(|t| lowered.contains(&t.to_lowercase()))
        .map(String::as_str)
        .collect()
}

/// Whether a candidate passes the list-side criteria.
///
/// Pure besides debug logging of the matched or missing term.
pub fn passes_filter(candidate: &Candidate, criteria: &FilterCriteria) -> bool {
    if !criteria.title_terms.is_empty() {
        let in_title = matched_term(&candidate.title, &criteria.title_terms);
        let in_source = matched_term(&candidate.source_name, &criteria.title_terms);
        match in_title.or(in_source) {
            Some(term) => {
                let field = if in_title.is_some() { "title" } else { "source" };
                tracing::debug!(candidate = %candidate.title, term, field, "title term matched");
            }
            None => {
                tracing::debug!(candidate = %candidate.title, "skip: no title term matched");
                return false;
            }
        }
    }

    if !criteria.location_terms.is_empty() {
        match matched_term(&candidate.location_text, &criteria.location_terms) {
            Some(term) => {
                tracing::debug!(candidate = %candidate.title, term, "location term matched");
            }
            None => {
                tracing::debug!(
                    candidate = %candidate.title,
                    location = %candidate.location_text,
                    "skip: no location term matched"
                );
                return false;
            }
        }
    }

    if !criteria.city_terms.is_empty() {
        match matched_term(&candidate.location_text, &criteria.city_terms) {
            Some(term) => {
                tracing::debug!(candidate = %candidate.title, term, "city term matched");
            }
            None => {
                tracing::debug!(
                    candidate = %candidate.title,
                    location = %candidate.location_text,
                    "skip: no city term matched"
                );
                return false;
            }
        }
    }

    if criteria.exclude_intermediary && candidate.intermediary {
        tracing::debug!(candidate = %candidate.title, "skip: intermediary posting");
        return false;
    }

    true
}
