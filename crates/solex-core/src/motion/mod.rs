//! Scroll-driven page animations.
//!
//! `AnimationDispatcher` registers one-shot visibility watchers for every
//! `TriggerKind` and a frame-coalesced parallax controller. Lazy image
//! loading rides on the same watchers but is not an animation. It works against the `Page` trait;
//! `MemoryPage` is the in-memory implementation used by tests and by the
//! CLI's scenario replay.

pub mod attrs;
pub mod dispatcher;
pub mod effects;
pub mod observer;
pub mod page;
pub mod parallax;
pub mod trigger;

pub use dispatcher::AnimationDispatcher;
pub use observer::{IntersectionEntry, ObserverOptions, RootMargin, TrackState, VisibilityWatcher};
pub use page::{ElementId, ElementSpec, MemoryPage, Mutation, Page, PageSpec, Rect, Selector, Viewport, BODY};
pub use parallax::ParallaxController;
pub use trigger::{HeroVariant, Trigger, TriggerKind};
