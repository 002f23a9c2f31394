//! Listing-view scanner.
//!
//! Re-queries the full card set each pass and extracts one `Candidate` per
//! card with the profile's ordered per-field strategies. Extraction is
//! degraded, never failing: a field whose strategies all miss stays empty.

use std::collections::HashSet;
use std::sync::Arc;

use crate::board::{Element, SourceProfile, Surface};
use crate::filter::{passes_filter, FilterCriteria};
use crate::ledger::Ledger;
use crate::model::{strip_query, Candidate};

pub struct Scanner {
    surface: Arc<dyn Surface>,
    profile: Arc<SourceProfile>,
}

impl Scanner {
    pub fn new(surface: Arc<dyn Surface>, profile: Arc<SourceProfile>) -> Self {
        Self { surface, profile }
    }

    /// One scan pass: every candidate currently extractable from the view.
    ///
    /// View state is never cached across passes; content may have grown or
    /// reordered since the last call.
    pub async fn scan(&self) -> Vec<Candidate> {
        let cards = self.query_cards().await;
        let mut candidates = Vec::with_capacity(cards.len());
        for card in &cards {
            candidates.push(self.extract(card).await);
        }
        tracing::debug!(cards = cards.len(), "scan pass complete");
        candidates
    }

    /// First candidate in view order that is unprocessed, not yet attempted
    /// this run, and passes the criteria, together with the current view
    /// size. `attempted` keeps failed dispatches from looping within a run
    /// while leaving them eligible for the next one.
    pub async fn next_eligible(
        &self,
        ledger: &Ledger,
        criteria: &FilterCriteria,
        attempted: &HashSet<String>,
    ) -> (Option<Candidate>, usize) {
        let candidates = self.scan().await;
        let total = candidates.len();
        let next = candidates.into_iter().find(|c| {
            if ledger.has(&c.id) {
                tracing::debug!(id = %c.id, "already processed");
                return false;
            }
            if attempted.contains(&c.id) {
                tracing::debug!(id = %c.id, "already attempted this run");
                return false;
            }
            passes_filter(c, criteria)
        });
        (next, total)
    }

    async fn query_cards(&self) -> Vec<Element> {
        for selector in &self.profile.card_selectors {
            let cards = self.surface.query_all(selector).await;
            if !cards.is_empty() {
                return cards;
            }
        }
        vec![]
    }

    async fn extract(&self, card: &Element) -> Candidate {
        let title = self.first_text(card, &self.profile.title_selectors).await;
        let source_name = self.first_text(card, &self.profile.source_selectors).await;
        let location_text = self.extract_location(card, &title, &source_name).await;

        let detail_link = match self.surface.query_in(card, &self.profile.link_selector).await {
            Some(el) => el.value.unwrap_or(el.text),
            None => String::new(),
        };
        let intermediary = self
            .surface
            .query_in(card, &self.profile.intermediary_selector)
            .await
            .is_some();

        let id = if detail_link.is_empty() {
            format!("{title}|{source_name}")
        } else {
            strip_query(&detail_link).to_string()
        };

        Candidate {
            id,
            title,
            source_name,
            location_text,
            intermediary,
            detail_link,
        }
    }

    /// First strategy yielding a non-empty trimmed text.
    async fn first_text(&self, card: &Element, selectors: &[String]) -> String {
        for selector in selectors {
            if let Some(el) = self.surface.query_in(card, selector).await {
                let text = el.text.trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
        String::new()
    }

    /// Location extraction rejects mis-hits: texts equal to the already
    /// extracted title or source, and texts at or beyond the profile's
    /// length cutoff.
    async fn extract_location(&self, card: &Element, title: &str, source: &str) -> String {
        for selector in &self.profile.location_selectors {
            for el in self.surface.query_all_in(card, selector).await {
                let text = el.text.trim();
                if text.is_empty()
                    || text == title
                    || text == source
                    || text.chars().count() >= self.profile.max_location_len
                {
                    continue;
                }
                return text.to_string();
            }
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::sim::{SimBoard, SimCard};
    use crate::model::OutcomeKind;
    use crate::store::MemoryKv;

    fn profile() -> Arc<SourceProfile> {
        Arc::new(SourceProfile::default())
    }

    fn scanner(cards: Vec<SimCard>) -> Scanner {
        let p = profile();
        let board = SimBoard::new(&p, cards);
        Scanner::new(Arc::new(board), p)
    }

    async fn empty_ledger() -> Ledger {
        Ledger::load(Arc::new(MemoryKv::new()), 100).await.unwrap()
    }

    #[tokio::test]
    async fn extracts_all_fields() {
        let s = scanner(vec![SimCard::new(
            "Rust Engineer",
            "Acme",
            "Berlin",
            "https://x/job/1?from=list",
        )]);
        let candidates = s.scan().await;
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.title, "Rust Engineer");
        assert_eq!(c.source_name, "Acme");
        assert_eq!(c.location_text, "Berlin");
        assert_eq!(c.detail_link, "https://x/job/1?from=list");
        // Identity is the link without its query string.
        assert_eq!(c.id, "https://x/job/1");
        assert!(!c.intermediary);
    }

    #[tokio::test]
    async fn missing_link_falls_back_to_title_and_source() {
        let s = scanner(vec![SimCard::new("Engineer", "Acme", "Berlin", "")]);
        let candidates = s.scan().await;
        assert_eq!(candidates[0].id, "Engineer|Acme");
        assert!(candidates[0].detail_link.is_empty());
    }

    #[tokio::test]
    async fn overlong_location_is_rejected_as_mis_hit() {
        let s = scanner(vec![SimCard::new(
            "Engineer",
            "Acme",
            "a string much too long to be a location text",
            "https://x/job/1",
        )]);
        let candidates = s.scan().await;
        assert_eq!(candidates[0].location_text, "");
    }

    #[tokio::test]
    async fn intermediary_tag_is_detected() {
        let s = scanner(vec![
            SimCard::new("A", "Acme", "Berlin", "https://x/job/1").intermediary(),
        ]);
        assert!(s.scan().await[0].intermediary);
    }

    #[tokio::test]
    async fn next_eligible_skips_processed_and_filtered() {
        let s = scanner(vec![
            SimCard::new("Java Dev", "Acme", "Berlin", "https://x/job/1"),
            SimCard::new("Rust Dev", "Acme", "Berlin", "https://x/job/2"),
            SimCard::new("Rust Lead", "Acme", "Berlin", "https://x/job/3"),
        ]);
        let mut ledger = empty_ledger().await;
        ledger
            .add("https://x/job/2", OutcomeKind::Chat)
            .await
            .unwrap();
        let criteria = FilterCriteria::from_raw("rust", "", "", "", false);

        let (next, total) = s.next_eligible(&ledger, &criteria, &HashSet::new()).await;
        assert_eq!(total, 3);
        assert_eq!(next.unwrap().id, "https://x/job/3");
    }

    #[tokio::test]
    async fn next_eligible_honors_attempted_set() {
        let s = scanner(vec![
            SimCard::new("Rust Dev", "Acme", "Berlin", "https://x/job/1"),
            SimCard::new("Rust Lead", "Acme", "Berlin", "https://x/job/2"),
        ]);
        let ledger = empty_ledger().await;
        let criteria = FilterCriteria::from_raw("rust", "", "", "", false);
        let attempted: HashSet<String> = ["https://x/job/1".to_string()].into();

        let (next, _) = s.next_eligible(&ledger, &criteria, &attempted).await;
        assert_eq!(next.unwrap().id, "https://x/job/2");
    }

    #[tokio::test]
    async fn next_eligible_none_when_exhausted() {
        let s = scanner(vec![SimCard::new(
            "Java Dev",
            "Acme",
            "Berlin",
            "https://x/job/1",
        )]);
        let ledger = empty_ledger().await;
        let criteria = FilterCriteria::from_raw("rust", "", "", "", false);
        let (next, total) = s.next_eligible(&ledger, &criteria, &HashSet::new()).await;
        assert!(next.is_none());
        assert_eq!(total, 1);
    }
}
