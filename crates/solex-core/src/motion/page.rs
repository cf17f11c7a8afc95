//! The page as the animation dispatcher sees it.
//!
//! `Page` is the narrow slice of a document the dispatcher needs: selector
//! queries, per-element data attributes, geometry, two capability checks and
//! a handful of mutations. `MemoryPage` implements it in memory and records every
//! mutation in order, which is what tests and the CLI replay inspect.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Opaque handle of an element on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u32);

/// The document body; always present.
pub const BODY: ElementId = ElementId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// `.name`
    Class(&'static str),
    /// `[data-name]`
    Data(&'static str),
    /// `tag[data-name]`
    TagData(&'static str, &'static str),
}

/// Axis-aligned box in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub scroll_y: f64,
}

impl Viewport {
    /// The visible region in document coordinates.
    pub fn rect(&self) -> Rect {
        Rect::new(0.0, self.scroll_y, self.width, self.height)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            scroll_y: 0.0,
        }
    }
}

pub trait Page: Send + Sync {
    fn query_all(&self, selector: Selector) -> Vec<ElementId>;

    fn query_first(&self, selector: Selector) -> Option<ElementId> {
        self.query_all(selector).into_iter().next()
    }

    /// Descendants of `parent` carrying `class`, in document order.
    fn children(&self, parent: ElementId, class: &str) -> Vec<ElementId>;

    fn data(&self, element: ElementId, key: &str) -> Option<String>;
    fn text(&self, element: ElementId) -> String;
    fn bounding_rect(&self, element: ElementId) -> Rect;
    fn viewport(&self) -> Viewport;

    fn supports_visibility_observation(&self) -> bool;
    fn prefers_reduced_motion(&self) -> bool;

    fn add_class(&self, element: ElementId, class: &str);
    fn set_text(&self, element: ElementId, text: &str);
    fn set_style(&self, element: ElementId, property: &str, value: &str);
    fn set_attribute(&self, element: ElementId, name: &str, value: &str);
    fn remove_data(&self, element: ElementId, key: &str);
}

// ============================================================================
// In-memory page
// ============================================================================

/// One recorded page mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddClass { element: ElementId, class: String },
    SetText { element: ElementId, text: String },
    SetStyle { element: ElementId, property: String, value: String },
    SetAttribute { element: ElementId, name: String, value: String },
    RemoveData { element: ElementId, key: String },
}

impl Mutation {
    pub fn element(&self) -> ElementId {
        match self {
            Mutation::AddClass { element, .. }
            | Mutation::SetText { element, .. }
            | Mutation::SetStyle { element, .. }
            | Mutation::SetAttribute { element, .. }
            | Mutation::RemoveData { element, .. } => *element,
        }
    }
}

/// Declarative description of an element, used to build a [`MemoryPage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementSpec {
    /// Lowercase tag name, e.g. `img`; empty for a generic element
    pub tag: String,
    pub classes: Vec<String>,
    pub data: BTreeMap<String, String>,
    pub text: String,
    pub rect: Rect,
    pub children: Vec<ElementSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSpec {
    pub viewport: Viewport,
    pub reduced_motion: bool,
    pub visibility_observation: bool,
    pub elements: Vec<ElementSpec>,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            reduced_motion: false,
            visibility_observation: true,
            elements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    id: ElementId,
    parent: Option<ElementId>,
    tag: String,
    classes: Vec<String>,
    data: BTreeMap<String, String>,
    attributes: BTreeMap<String, String>,
    text: String,
    rect: Rect,
    style: BTreeMap<String, String>,
}

impl Node {
    fn matches(&self, selector: Selector) -> bool {
        match selector {
            Selector::Class(class) => self.classes.iter().any(|c| c == class),
            Selector::Data(key) => self.data.contains_key(key),
            Selector::TagData(tag, key) => {
                self.tag.eq_ignore_ascii_case(tag) && self.data.contains_key(key)
            }
        }
    }
}

pub struct MemoryPage {
    nodes: RwLock<Vec<Node>>,
    viewport: RwLock<Viewport>,
    reduced_motion: bool,
    visibility_observation: bool,
    log: Mutex<Vec<Mutation>>,
}

impl MemoryPage {
    pub fn new(viewport: Viewport) -> Self {
        Self::from_spec(&PageSpec {
            viewport,
            ..PageSpec::default()
        })
    }

    pub fn from_spec(spec: &PageSpec) -> Self {
        let mut nodes = vec![Node {
            id: BODY,
            parent: None,
            tag: "body".to_string(),
            classes: Vec::new(),
            data: BTreeMap::new(),
            attributes: BTreeMap::new(),
            text: String::new(),
            rect: Rect::default(),
            style: BTreeMap::new(),
        }];
        for element in &spec.elements {
            Self::push_spec(&mut nodes, BODY, element);
        }

        Self {
            nodes: RwLock::new(nodes),
            viewport: RwLock::new(spec.viewport),
            reduced_motion: spec.reduced_motion,
            visibility_observation: spec.visibility_observation,
            log: Mutex::new(Vec::new()),
        }
    }

    fn push_spec(nodes: &mut Vec<Node>, parent: ElementId, spec: &ElementSpec) -> ElementId {
        let id = ElementId(nodes.len() as u32);
        nodes.push(Node {
            id,
            parent: Some(parent),
            tag: spec.tag.to_ascii_lowercase(),
            classes: spec.classes.clone(),
            data: spec.data.clone(),
            attributes: BTreeMap::new(),
            text: spec.text.clone(),
            rect: spec.rect,
            style: BTreeMap::new(),
        });
        for child in &spec.children {
            Self::push_spec(nodes, id, child);
        }
        id
    }

    /// Append an element under `parent` and return its handle.
    pub fn add_element(&self, parent: ElementId, spec: ElementSpec) -> ElementId {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        Self::push_spec(&mut nodes, parent, &spec)
    }

    pub fn scroll_to(&self, scroll_y: f64) {
        self.viewport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .scroll_y = scroll_y;
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every text value written to `element`, oldest first.
    pub fn text_history(&self, element: ElementId) -> Vec<String> {
        self.mutations()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::SetText { element: e, text } if e == element => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.with_node(element, |n| n.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn style(&self, element: ElementId, property: &str) -> Option<String> {
        self.with_node(element, |n| n.style.get(property).cloned())
            .flatten()
    }

    pub fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        self.with_node(element, |n| n.attributes.get(name).cloned())
            .flatten()
    }

    fn with_node<T>(&self, element: ElementId, f: impl FnOnce(&Node) -> T) -> Option<T> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.get(element.0 as usize).map(f)
    }

    fn with_node_mut(&self, element: ElementId, f: impl FnOnce(&mut Node)) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = nodes.get_mut(element.0 as usize) {
            f(node);
        }
    }

    fn record(&self, mutation: Mutation) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mutation);
    }

    fn is_descendant(nodes: &[Node], node: &Node, ancestor: ElementId) -> bool {
        let mut current = node.parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = nodes.get(id.0 as usize).and_then(|n| n.parent);
        }
        false
    }
}

impl Page for MemoryPage {
    fn query_all(&self, selector: Selector) -> Vec<ElementId> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .iter()
            .filter(|n| n.id != BODY && n.matches(selector))
            .map(|n| n.id)
            .collect()
    }

    fn children(&self, parent: ElementId, class: &str) -> Vec<ElementId> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .iter()
            .filter(|n| n.classes.iter().any(|c| c == class))
            .filter(|n| Self::is_descendant(&nodes, n, parent))
            .map(|n| n.id)
            .collect()
    }

    fn data(&self, element: ElementId, key: &str) -> Option<String> {
        self.with_node(element, |n| n.data.get(key).cloned()).flatten()
    }

    fn text(&self, element: ElementId) -> String {
        self.with_node(element, |n| n.text.clone()).unwrap_or_default()
    }

    fn bounding_rect(&self, element: ElementId) -> Rect {
        self.with_node(element, |n| n.rect).unwrap_or_default()
    }

    fn viewport(&self) -> Viewport {
        *self.viewport.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn supports_visibility_observation(&self) -> bool {
        self.visibility_observation
    }

    fn prefers_reduced_motion(&self) -> bool {
        self.reduced_motion
    }

    fn add_class(&self, element: ElementId, class: &str) {
        self.with_node_mut(element, |n| {
            if !n.classes.iter().any(|c| c == class) {
                n.classes.push(class.to_string());
            }
        });
        self.record(Mutation::AddClass {
            element,
            class: class.to_string(),
        });
    }

    fn set_text(&self, element: ElementId, text: &str) {
        self.with_node_mut(element, |n| n.text = text.to_string());
        self.record(Mutation::SetText {
            element,
            text: text.to_string(),
        });
    }

    fn set_style(&self, element: ElementId, property: &str, value: &str) {
        self.with_node_mut(element, |n| {
            n.style.insert(property.to_string(), value.to_string());
        });
        self.record(Mutation::SetStyle {
            element,
            property: property.to_string(),
            value: value.to_string(),
        });
    }

    fn set_attribute(&self, element: ElementId, name: &str, value: &str) {
        self.with_node_mut(element, |n| {
            n.attributes.insert(name.to_string(), value.to_string());
        });
        self.record(Mutation::SetAttribute {
            element,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_data(&self, element: ElementId, key: &str) {
        self.with_node_mut(element, |n| {
            n.data.remove(key);
        });
        self.record(Mutation::RemoveData {
            element,
            key: key.to_string(),
        });
    }
}
