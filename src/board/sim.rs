//! In-memory board and spawner.
//!
//! Backs the demo binary and the test suites with a listing view, detail
//! pages, and a spawner that runs the real `WorkerExecutor` on a tokio task
//! sharing the driver's key-value store — the same handoff shape as a real
//! deployment, minus the browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::board::{ContextHandle, ContextSpawner, Element, SourceProfile, Surface};
use crate::channel::Channel;
use crate::config::RunConfig;
use crate::error::SpawnError;
use crate::model::strip_query;
use crate::worker::WorkerExecutor;

/// One listing card in the simulated view.
#[derive(Debug, Clone)]
pub struct SimCard {
    pub title: String,
    pub source: String,
    pub location: String,
    pub intermediary: bool,
    pub link: String,
}

impl SimCard {
    pub fn new(title: &str, source: &str, location: &str, link: &str) -> Self {
        Self {
            title: title.to_string(),
            source: source.to_string(),
            location: location.to_string(),
            intermediary: false,
            link: link.to_string(),
        }
    }

    pub fn intermediary(mut self) -> Self {
        self.intermediary = true;
        self
    }
}

/// Bind a role to one selector from a strategy list. Deliberately not the
/// first entry where the list allows, so ordered fallback stays exercised.
fn bind(roles: &mut HashMap<String, Role>, list: &[String], idx: usize, role: Role) {
    if let Some(sel) = list.get(idx).or_else(|| list.first()) {
        roles.insert(sel.clone(), role);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Card,
    Title,
    Source,
    Location,
    Link,
    Intermediary,
    Advance,
    ActionScan,
}

struct BoardState {
    cards: Vec<SimCard>,
    revealed: usize,
    /// Cards revealed per extend() call (0 = incremental loading broken).
    scroll_step: usize,
    /// Incremental loading stops at this many cards.
    scroll_limit: usize,
    next_enabled: bool,
    advances: u32,
}

struct BoardInner {
    roles: HashMap<String, Role>,
    advance_text: String,
    state: Mutex<BoardState>,
}

/// Simulated listing view.
///
/// Responds to one selector per field — deliberately not the first in the
/// profile's strategy list, so the scanner's ordered fallback is exercised.
#[derive(Clone)]
pub struct SimBoard {
    inner: Arc<BoardInner>,
}

impl SimBoard {
    pub fn new(profile: &SourceProfile, cards: Vec<SimCard>) -> Self {
        let mut roles = HashMap::new();
        bind(&mut roles, &profile.card_selectors, 0, Role::Card);
        bind(&mut roles, &profile.title_selectors, 1, Role::Title);
        bind(&mut roles, &profile.source_selectors, 1, Role::Source);
        bind(&mut roles, &profile.location_selectors, 2, Role::Location);
        roles.insert(profile.link_selector.clone(), Role::Link);
        roles.insert(profile.intermediary_selector.clone(), Role::Intermediary);
        bind(&mut roles, &profile.advance_selectors, 0, Role::Advance);
        roles.insert(profile.action_selector.clone(), Role::ActionScan);

        let total = cards.len();
        Self {
            inner: Arc::new(BoardInner {
                roles,
                advance_text: profile
                    .advance_texts
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "Next".to_string()),
                state: Mutex::new(BoardState {
                    cards,
                    revealed: total,
                    scroll_step: 0,
                    scroll_limit: total,
                    next_enabled: false,
                    advances: 0,
                }),
            }),
        }
    }

    /// Show only the first `n` cards initially.
    pub fn revealed(self, n: usize) -> Self {
        self.inner.state.lock().unwrap().revealed = n;
        self
    }

    /// Reveal `step` more cards per extend(), up to `limit`.
    pub fn scrollable(self, step: usize, limit: usize) -> Self {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.scroll_step = step;
            state.scroll_limit = limit;
        }
        self
    }

    /// Enable the explicit advance control; activating it reveals the rest.
    pub fn with_next_control(self) -> Self {
        self.inner.state.lock().unwrap().next_enabled = true;
        self
    }

    /// Number of times the advance control was activated.
    pub fn advances(&self) -> u32 {
        self.inner.state.lock().unwrap().advances
    }

    fn role(&self, selector: &str) -> Option<Role> {
        self.inner.roles.get(selector).copied()
    }

    fn advance_element(&self) -> Element {
        Element {
            id: u64::MAX,
            text: self.inner.advance_text.clone(),
            value: None,
            visible: true,
            enabled: true,
        }
    }
}

#[async_trait]
impl Surface for SimBoard {
    async fn query_all(&self, selector: &str) -> Vec<Element> {
        match self.role(selector) {
            Some(Role::Card) => {
                let state = self.inner.state.lock().unwrap();
                (0..state.revealed.min(state.cards.len()))
                    .map(|i| Element {
                        id: i as u64,
                        text: String::new(),
                        value: None,
                        visible: true,
                        enabled: true,
                    })
                    .collect()
            }
            Some(Role::Advance | Role::ActionScan) => {
                let state = self.inner.state.lock().unwrap();
                if state.next_enabled {
                    vec![self.advance_element()]
                } else {
                    vec![]
                }
            }
            _ => vec![],
        }
    }

    async fn query_all_in(&self, scope: &Element, selector: &str) -> Vec<Element> {
        let state = self.inner.state.lock().unwrap();
        let Some(card) = state.cards.get(scope.id as usize) else {
            return vec![];
        };
        let text = match self.role(selector) {
            Some(Role::Title) => card.title.clone(),
            Some(Role::Source) => card.source.clone(),
            Some(Role::Location) => card.location.clone(),
            Some(Role::Link) => card.link.clone(),
            Some(Role::Intermediary) if card.intermediary => "intermediary".to_string(),
            _ => return vec![],
        };
        if text.is_empty() {
            return vec![];
        }
        let value = matches!(self.role(selector), Some(Role::Link)).then(|| card.link.clone());
        vec![Element {
            id: scope.id,
            text,
            value,
            visible: true,
            enabled: true,
        }]
    }

    async fn body_text(&self) -> String {
        let state = self.inner.state.lock().unwrap();
        state.cards[..state.revealed.min(state.cards.len())]
            .iter()
            .map(|c| format!("{} {} {}", c.title, c.source, c.location))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn activate(&self, element: &Element) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if element.id == u64::MAX && state.next_enabled {
            state.revealed = state.cards.len();
            state.next_enabled = false;
            state.advances += 1;
            return true;
        }
        false
    }

    async fn content_size(&self) -> usize {
        let state = self.inner.state.lock().unwrap();
        state.revealed.min(state.cards.len())
    }

    async fn extend(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.scroll_step == 0 {
            return;
        }
        let cap = state.scroll_limit.min(state.cards.len());
        if state.revealed < cap {
            state.revealed = (state.revealed + state.scroll_step).min(cap);
        }
    }
}

struct DetailState {
    body: String,
    controls: Vec<String>,
    confirmation: Option<String>,
    confirm_raised: bool,
    activations: Vec<String>,
    /// Controls only appear after this many action scans.
    appear_after: u32,
    scans: u32,
    unresponsive: bool,
}

/// Simulated detail page for one candidate.
#[derive(Clone)]
pub struct SimDetail {
    state: Arc<Mutex<DetailState>>,
}

impl SimDetail {
    pub fn new(body: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(DetailState {
                body: body.to_string(),
                controls: vec![],
                confirmation: None,
                confirm_raised: false,
                activations: vec![],
                appear_after: 0,
                scans: 0,
                unresponsive: false,
            })),
        }
    }

    pub fn with_control(self, label: &str) -> Self {
        self.state.lock().unwrap().controls.push(label.to_string());
        self
    }

    /// A confirmation control raised by the first activation.
    pub fn with_confirmation(self, label: &str) -> Self {
        self.state.lock().unwrap().confirmation = Some(label.to_string());
        self
    }

    /// Hide the controls for the first `n` action scans.
    pub fn appearing_after(self, n: u32) -> Self {
        self.state.lock().unwrap().appear_after = n;
        self
    }

    /// The spawned context never reaches ready; its worker never runs.
    pub fn unresponsive(self) -> Self {
        self.state.lock().unwrap().unresponsive = true;
        self
    }

    fn is_unresponsive(&self) -> bool {
        self.state.lock().unwrap().unresponsive
    }

    /// Labels activated so far, in order.
    pub fn activations(&self) -> Vec<String> {
        self.state.lock().unwrap().activations.clone()
    }
}

#[async_trait]
impl Surface for SimDetail {
    async fn query_all(&self, _selector: &str) -> Vec<Element> {
        let mut state = self.state.lock().unwrap();
        state.scans += 1;
        if state.scans <= state.appear_after {
            return vec![];
        }
        let mut labels = state.controls.clone();
        if state.confirm_raised {
            if let Some(conf) = &state.confirmation {
                labels.push(conf.clone());
            }
        }
        labels
            .into_iter()
            .enumerate()
            .map(|(i, text)| Element {
                id: i as u64,
                text,
                value: None,
                visible: true,
                enabled: true,
            })
            .collect()
    }

    async fn query_all_in(&self, _scope: &Element, _selector: &str) -> Vec<Element> {
        vec![]
    }

    async fn body_text(&self) -> String {
        self.state.lock().unwrap().body.clone()
    }

    async fn activate(&self, element: &Element) -> bool {
        let mut state = self.state.lock().unwrap();
        state.activations.push(element.text.clone());
        state.confirm_raised = true;
        true
    }

    async fn content_size(&self) -> usize {
        0
    }

    async fn extend(&self) {}
}

/// Handle over a spawned worker task.
struct SimHandle {
    closed: Arc<AtomicBool>,
    abort: tokio::task::AbortHandle,
}

#[async_trait]
impl ContextHandle for SimHandle {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.abort.abort();
        }
    }
}

/// Spawner running the worker executor on a tokio task per opened context.
pub struct SimSpawner {
    channel: Channel,
    profile: Arc<SourceProfile>,
    config: RunConfig,
    details: Mutex<HashMap<String, SimDetail>>,
    opened: Mutex<Vec<String>>,
    closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl SimSpawner {
    pub fn new(channel: Channel, profile: Arc<SourceProfile>, config: RunConfig) -> Self {
        Self {
            channel,
            profile,
            config,
            details: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            closed_flags: Mutex::new(Vec::new()),
        }
    }

    /// Register the detail page behind a candidate link.
    pub fn insert_detail(&self, link: &str, detail: SimDetail) {
        self.details
            .lock()
            .unwrap()
            .insert(strip_query(link).to_string(), detail);
    }

    /// Addresses opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    /// Closed state of every handle issued so far, in open order.
    pub fn closed_states(&self) -> Vec<bool> {
        self.closed_flags
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.load(Ordering::SeqCst))
            .collect()
    }
}

#[async_trait]
impl ContextSpawner for SimSpawner {
    async fn open(
        &self,
        address: &str,
        _active: bool,
    ) -> Result<Box<dyn ContextHandle>, SpawnError> {
        let detail = self
            .details
            .lock()
            .unwrap()
            .get(strip_query(address))
            .cloned()
            .ok_or_else(|| SpawnError::OpenFailed {
                address: address.to_string(),
                reason: "no such page".to_string(),
            })?;
        self.opened.lock().unwrap().push(address.to_string());

        let closed = Arc::new(AtomicBool::new(false));
        self.closed_flags.lock().unwrap().push(Arc::clone(&closed));
        let closed_in_task = Arc::clone(&closed);

        let join = if detail.is_unresponsive() {
            // Context opened but never reaches ready; only the driver's
            // force-close ends it.
            tokio::spawn(std::future::pending::<()>())
        } else {
            let worker = WorkerExecutor::new(
                self.channel.clone(),
                Arc::new(detail),
                Arc::clone(&self.profile),
                self.config.clone(),
                address,
            );
            tokio::spawn(async move {
                // Guaranteed-run finalizer: the handle reports closed as
                // soon as the worker elects to self-terminate.
                if worker.run().await {
                    closed_in_task.store(true, Ordering::SeqCst);
                }
            })
        };

        Ok(Box::new(SimHandle {
            closed,
            abort: join.abort_handle(),
        }))
    }
}
