//! Listing-board abstraction: the content-query and context-spawn
//! primitives the pipeline drives, plus the per-source capability profile.
//!
//! The pipeline is generic over one `Surface` per context and one
//! `SourceProfile` per listing source; everything source-specific is data in
//! the profile, never code in the pipeline.

pub mod sim;

use async_trait::async_trait;

use crate::error::SpawnError;

/// A queried content element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Surface-assigned handle, opaque to the pipeline.
    pub id: u64,
    pub text: String,
    /// Attribute payload, e.g. a link target.
    pub value: Option<String>,
    pub visible: bool,
    pub enabled: bool,
}

impl Element {
    /// Whether the element can be activated right now.
    pub fn actionable(&self) -> bool {
        self.visible && self.enabled
    }
}

/// Content-query primitive over one context's current view.
#[async_trait]
pub trait Surface: Send + Sync {
    /// All elements matching `selector` in the current view.
    async fn query_all(&self, selector: &str) -> Vec<Element>;

    /// First element matching `selector`.
    async fn query(&self, selector: &str) -> Option<Element> {
        self.query_all(selector).await.into_iter().next()
    }

    /// All elements matching `selector` inside `scope`.
    async fn query_all_in(&self, scope: &Element, selector: &str) -> Vec<Element>;

    /// First element matching `selector` inside `scope`.
    async fn query_in(&self, scope: &Element, selector: &str) -> Option<Element> {
        self.query_all_in(scope, selector).await.into_iter().next()
    }

    /// Full body text of the view.
    async fn body_text(&self) -> String;

    /// Activate an element. Returns false when the surface rejected the
    /// activation (gone, hidden, disabled).
    async fn activate(&self, element: &Element) -> bool;

    /// Item-count/size proxy used to detect content growth.
    async fn content_size(&self) -> usize;

    /// Trigger incremental loading (scroll to end).
    async fn extend(&self);
}

/// Handle to a spawned execution context.
#[async_trait]
pub trait ContextHandle: Send + Sync {
    fn is_closed(&self) -> bool;

    /// Best-effort close; closing an already-closed context is a no-op.
    async fn close(&self);
}

/// Context-spawn primitive.
#[async_trait]
pub trait ContextSpawner: Send + Sync {
    /// Open a context addressed at `address`. `active` controls whether the
    /// context takes focus; the dispatcher always opens inactive.
    async fn open(
        &self,
        address: &str,
        active: bool,
    ) -> Result<Box<dyn ContextHandle>, SpawnError>;
}

/// Per-source capability profile: extraction strategies, filter field
/// mapping, and control patterns. One value per listing source, threaded
/// through the generic pipeline.
#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub name: String,
    /// Candidate card selectors, tried in order on the listing view.
    pub card_selectors: Vec<String>,
    /// Ordered per-field extraction strategies; first non-empty hit wins.
    pub title_selectors: Vec<String>,
    pub source_selectors: Vec<String>,
    pub location_selectors: Vec<String>,
    /// Location texts at or beyond this length are rejected as mis-hits.
    pub max_location_len: usize,
    pub link_selector: String,
    /// Marker present on cards posted by an intermediary.
    pub intermediary_selector: String,
    /// Selector covering every action control on a detail page.
    pub action_selector: String,
    pub contact_patterns: Vec<String>,
    pub apply_patterns: Vec<String>,
    pub confirm_patterns: Vec<String>,
    /// Body-text markers meaning the item was already handled.
    pub done_markers: Vec<String>,
    /// Label fragment marking an already-done control variant.
    pub done_variant_marker: String,
    /// Explicit advance controls, highest priority first.
    pub advance_selectors: Vec<String>,
    /// Textual fallback labels for an advance control.
    pub advance_texts: Vec<String>,
}

impl Default for SourceProfile {
    /// Selector and pattern lists of the listing sources this pipeline was
    /// built against.
    fn default() -> Self {
        Self {
            name: "default".into(),
            card_selectors: strings(&[
                ".job-list-item",
                ".sojob-item-main",
                "[data-selector=\"job-card\"]",
            ]),
            title_selectors: strings(&[
                ".job-title",
                ".job-name",
                ".title-text",
                "[data-selector=\"job-title\"]",
                ".ellipsis-1",
                "h3",
            ]),
            source_selectors: strings(&[
                ".company-name",
                ".company-text",
                ".job-company-name",
                "[data-selector=\"comp-name\"]",
                "h4",
            ]),
            location_selectors: strings(&[
                ".job-dq-box",
                ".area",
                ".job-area",
                ".job-address",
                "[data-selector=\"job-dq\"]",
                ".area-text",
            ]),
            max_location_len: 20,
            link_selector: "a[href*=\"/job/\"], a[href*=\"/a/\"]".into(),
            intermediary_selector: "img[alt=\"猎头\"], .hunt-tag".into(),
            action_selector: "a, button, div.btn-group span, .btn-container .btn, \
                              .apply-btn-container .btn"
                .into(),
            contact_patterns: strings(&["聊一聊", "立即沟通"]),
            apply_patterns: strings(&["投简历", "立即应聘"]),
            confirm_patterns: strings(&["立即投递"]),
            done_markers: strings(&["已投递", "已沟通"]),
            done_variant_marker: "已".into(),
            advance_selectors: strings(&[
                ".ant-pagination-next:not([aria-disabled=\"true\"])",
                ".pager .next:not(.disabled)",
                ".rc-pagination-next:not([aria-disabled=\"true\"])",
                ".el-pagination .btn-next:not(:disabled)",
                ".next-page-btn",
                "[data-selector=\"pager-next\"]",
            ]),
            advance_texts: strings(&["下一页", "Next", ">"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
