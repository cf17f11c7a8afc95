//! Trigger kinds and their per-element configuration.

use std::fmt;
use std::time::Duration;

use super::attrs::{parse_integer, parse_positive_integer};
use super::observer::{ObserverOptions, RootMargin};
use super::page::{ElementId, Page, Selector};

const DEFAULT_SCROLL_VARIANT: &str = "slideUp";
const DEFAULT_COUNTER_DURATION_MS: u64 = 2000;
const DEFAULT_TYPEWRITER_SPEED_MS: u64 = 50;

/// The one-shot visibility watchers, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    FadeIn,
    ScrollReveal,
    AnimateOnScroll,
    Counter,
    Typewriter,
    Hero,
    LazyImage,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 7] = [
        TriggerKind::FadeIn,
        TriggerKind::ScrollReveal,
        TriggerKind::AnimateOnScroll,
        TriggerKind::Counter,
        TriggerKind::Typewriter,
        TriggerKind::Hero,
        TriggerKind::LazyImage,
    ];

    /// Animation kinds claim their elements and are switched off by the
    /// reduced motion preference. Image loading is neither.
    pub fn is_animation(&self) -> bool {
        !matches!(self, TriggerKind::LazyImage)
    }

    pub fn selector(&self) -> Selector {
        match self {
            TriggerKind::FadeIn => Selector::Class("fade-in"),
            TriggerKind::ScrollReveal => Selector::Class("scroll-animate"),
            TriggerKind::AnimateOnScroll => Selector::Class("animate-on-scroll"),
            TriggerKind::Counter => Selector::Class("counter"),
            TriggerKind::Typewriter => Selector::Class("typewriter"),
            TriggerKind::Hero => Selector::Data("animation"),
            TriggerKind::LazyImage => Selector::TagData("img", "src"),
        }
    }

    pub fn options(&self) -> ObserverOptions {
        match self {
            TriggerKind::FadeIn => ObserverOptions::new(0.15, RootMargin::bottom(-50.0)),
            TriggerKind::ScrollReveal => ObserverOptions::new(0.1, RootMargin::bottom(-30.0)),
            TriggerKind::AnimateOnScroll => ObserverOptions::new(0.1, RootMargin::bottom(-50.0)),
            TriggerKind::Counter => ObserverOptions::new(0.5, RootMargin::default()),
            TriggerKind::Typewriter => ObserverOptions::new(0.5, RootMargin::default()),
            TriggerKind::Hero => ObserverOptions::new(0.1, RootMargin::bottom(-50.0)),
            TriggerKind::LazyImage => ObserverOptions::new(0.0, RootMargin::uniform(50.0)),
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::FadeIn => write!(f, "fade-in"),
            TriggerKind::ScrollReveal => write!(f, "scroll-reveal"),
            TriggerKind::AnimateOnScroll => write!(f, "animate-on-scroll"),
            TriggerKind::Counter => write!(f, "counter"),
            TriggerKind::Typewriter => write!(f, "typewriter"),
            TriggerKind::Hero => write!(f, "hero"),
            TriggerKind::LazyImage => write!(f, "lazy-image"),
        }
    }
}

/// Paused hero entrance animations released on first sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeroVariant {
    FadeUp,
    FadeLeft,
    FadeIn,
}

/// What happens to one element when it first becomes visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    FadeIn { delay: Duration },
    ScrollReveal { variant: String },
    AnimateOnScroll,
    Counter { target: u64, duration: Duration },
    Typewriter { speed: Duration },
    HeroStagger,
    HeroRelease(HeroVariant),
    /// `data-animation` value with no known behavior; deregistered silently
    HeroNone,
    /// Deferred image sources; either may be absent
    LazyImage {
        src: Option<String>,
        srcset: Option<String>,
    },
}

impl Trigger {
    /// Read the configuration of `element` for `kind` from its data attributes.
    pub fn configure<P: Page + ?Sized>(kind: TriggerKind, page: &P, element: ElementId) -> Self {
        let data = |key: &str| page.data(element, key);
        let non_empty = |key: &str| data(key).filter(|v| !v.trim().is_empty());
        match kind {
            TriggerKind::FadeIn => Trigger::FadeIn {
                delay: Duration::from_millis(parse_integer(data("delay").as_deref(), 0)),
            },
            TriggerKind::ScrollReveal => Trigger::ScrollReveal {
                variant: data("animation")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_SCROLL_VARIANT.to_string()),
            },
            TriggerKind::AnimateOnScroll => Trigger::AnimateOnScroll,
            TriggerKind::Counter => Trigger::Counter {
                target: parse_integer(data("target").as_deref(), 0),
                duration: Duration::from_millis(parse_positive_integer(
                    data("duration").as_deref(),
                    DEFAULT_COUNTER_DURATION_MS,
                )),
            },
            TriggerKind::Typewriter => Trigger::Typewriter {
                speed: Duration::from_millis(parse_positive_integer(
                    data("speed").as_deref(),
                    DEFAULT_TYPEWRITER_SPEED_MS,
                )),
            },
            TriggerKind::Hero => match data("animation").as_deref().map(str::trim) {
                Some("stagger") => Trigger::HeroStagger,
                Some("fade-up") => Trigger::HeroRelease(HeroVariant::FadeUp),
                Some("fade-left") => Trigger::HeroRelease(HeroVariant::FadeLeft),
                Some("fade-in") => Trigger::HeroRelease(HeroVariant::FadeIn),
                _ => Trigger::HeroNone,
            },
            TriggerKind::LazyImage => Trigger::LazyImage {
                src: non_empty("src"),
                srcset: non_empty("srcset"),
            },
        }
    }

    /// Hero releases start out paused until their element is seen.
    pub fn starts_paused(&self) -> bool {
        matches!(self, Trigger::HeroRelease(_))
    }
}
