//! One-shot visibility watchers.
//!
//! Each watcher owns an arena of tracked elements. An element moves
//! `observing -> fired` the first time an entry reports it intersecting at or
//! above the threshold, and leaves the active set in the same step. The state
//! field, not the entry source, is what keeps a fired element from firing
//! again.

use std::collections::{BTreeSet, HashMap};

use super::page::{ElementId, Page, Rect};
use super::trigger::{Trigger, TriggerKind};

/// Grows (positive) or shrinks (negative) the viewport before intersecting,
/// in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RootMargin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl RootMargin {
    pub fn bottom(bottom: f64) -> Self {
        Self {
            bottom,
            ..Self::default()
        }
    }

    pub fn uniform(margin: f64) -> Self {
        Self {
            top: margin,
            right: margin,
            bottom: margin,
            left: margin,
        }
    }

    pub fn apply(&self, root: Rect) -> Rect {
        Rect::new(
            root.x - self.left,
            root.y - self.top,
            root.width + self.left + self.right,
            root.height + self.top + self.bottom,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverOptions {
    pub threshold: f64,
    pub root_margin: RootMargin,
}

impl ObserverOptions {
    pub fn new(threshold: f64, root_margin: RootMargin) -> Self {
        Self {
            threshold,
            root_margin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub element: ElementId,
    pub is_intersecting: bool,
    pub ratio: f64,
}

impl IntersectionEntry {
    /// Intersect `target` with `root` after applying `margin`.
    pub fn compute(element: ElementId, target: Rect, root: Rect, margin: RootMargin) -> Self {
        let root = margin.apply(root);
        let left = target.x.max(root.x);
        let top = target.y.max(root.y);
        let right = target.right().min(root.right());
        let bottom = target.bottom().min(root.bottom());

        let is_intersecting = right >= left && bottom >= top;
        let ratio = if !is_intersecting {
            0.0
        } else if target.area() == 0.0 {
            1.0
        } else {
            ((right - left) * (bottom - top) / target.area()).min(1.0)
        };

        Self {
            element,
            is_intersecting,
            ratio,
        }
    }

    pub fn crosses(&self, threshold: f64) -> bool {
        self.is_intersecting && self.ratio >= threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Observing,
    Fired,
}

#[derive(Debug, Clone)]
struct Tracked {
    element: ElementId,
    trigger: Trigger,
    state: TrackState,
}

/// An element whose trigger just fired.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired {
    pub element: ElementId,
    pub trigger: Trigger,
}

pub struct VisibilityWatcher {
    kind: TriggerKind,
    options: ObserverOptions,
    arena: Vec<Tracked>,
    index: HashMap<ElementId, TrackingHandle>,
    active: BTreeSet<usize>,
}

impl VisibilityWatcher {
    pub fn new(kind: TriggerKind) -> Self {
        Self::with_options(kind, kind.options())
    }

    pub fn with_options(kind: TriggerKind, options: ObserverOptions) -> Self {
        Self {
            kind,
            options,
            arena: Vec::new(),
            index: HashMap::new(),
            active: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn options(&self) -> ObserverOptions {
        self.options
    }

    /// Start watching `element`. An element seen before keeps its handle and
    /// state; a fired element is never observed again.
    pub fn observe(&mut self, element: ElementId, trigger: Trigger) -> TrackingHandle {
        if let Some(handle) = self.index.get(&element) {
            return *handle;
        }
        let handle = TrackingHandle(self.arena.len());
        self.arena.push(Tracked {
            element,
            trigger,
            state: TrackState::Observing,
        });
        self.index.insert(element, handle);
        self.active.insert(handle.0);
        handle
    }

    pub fn state(&self, element: ElementId) -> Option<TrackState> {
        self.index
            .get(&element)
            .and_then(|h| self.arena.get(h.0))
            .map(|t| t.state)
    }

    pub fn is_observing(&self, element: ElementId) -> bool {
        self.state(element) == Some(TrackState::Observing)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Compute current entries for every active element from page geometry.
    pub fn evaluate<P: Page + ?Sized>(&self, page: &P) -> Vec<IntersectionEntry> {
        let root = page.viewport().rect();
        self.active
            .iter()
            .map(|&i| {
                let element = self.arena[i].element;
                IntersectionEntry::compute(
                    element,
                    page.bounding_rect(element),
                    root,
                    self.options.root_margin,
                )
            })
            .collect()
    }

    /// Apply a batch of entries. Returns the elements that fired, each at
    /// most once over the watcher's lifetime.
    pub fn process(&mut self, entries: &[IntersectionEntry]) -> Vec<Fired> {
        let mut fired = Vec::new();
        for entry in entries {
            if !entry.crosses(self.options.threshold) {
                continue;
            }
            let Some(handle) = self.index.get(&entry.element).copied() else {
                continue;
            };
            let tracked = &mut self.arena[handle.0];
            if tracked.state != TrackState::Observing {
                continue;
            }
            tracked.state = TrackState::Fired;
            self.active.remove(&handle.0);
            fired.push(Fired {
                element: tracked.element,
                trigger: tracked.trigger.clone(),
            });
        }
        fired
    }
}
