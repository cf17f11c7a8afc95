//! Page-level coordination of every animation trigger.
//!
//! At page-ready the dispatcher queries each trigger kind's selector once and
//! hands the matches to that kind's watcher. An element matched by several
//! animation selectors belongs to the first kind in `TriggerKind::ALL` order;
//! lazy images are watched regardless of any animation on them. Observer
//! callbacks (`deliver`) or geometry passes (`observe_viewport`) fire
//! triggers; timed effects run as Tokio tasks that `settle` can wait on.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use super::effects;
use super::observer::{Fired, IntersectionEntry, TrackState, VisibilityWatcher};
use super::page::{ElementId, Page, Selector, BODY};
use super::parallax::ParallaxController;
use super::trigger::{Trigger, TriggerKind};

const HERO_CONTENT_DELAY: Duration = Duration::from_millis(300);
const ANNOUNCEMENT_DELAY: Duration = Duration::from_millis(600);

pub struct AnimationDispatcher<P: ?Sized> {
    page: Arc<P>,
    watchers: Mutex<Vec<VisibilityWatcher>>,
    parallax: Option<ParallaxController<P>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    enabled: bool,
}

impl<P: Page + ?Sized + 'static> AnimationDispatcher<P> {
    /// Register every trigger on `page`. Must run inside a Tokio runtime.
    pub fn start(page: Arc<P>) -> Self {
        let enabled = !page.prefers_reduced_motion();
        if !enabled {
            info!("Reduced motion preference detected. Animations disabled.");
        }

        let kinds: Vec<TriggerKind> = TriggerKind::ALL
            .into_iter()
            .filter(|kind| enabled || !kind.is_animation())
            .collect();
        let watchers = if page.supports_visibility_observation() {
            Self::register(page.as_ref(), &kinds)
        } else {
            debug!("Visibility observation unavailable, scroll triggers disabled");
            Self::load_all_images(page.as_ref());
            Vec::new()
        };

        if !enabled {
            return Self {
                page,
                watchers: Mutex::new(watchers),
                parallax: None,
                tasks: Mutex::new(Vec::new()),
                enabled: false,
            };
        }

        let parallax = ParallaxController::attach(Arc::clone(&page));

        let dispatcher = Self {
            page,
            watchers: Mutex::new(watchers),
            parallax,
            tasks: Mutex::new(Vec::new()),
            enabled: true,
        };
        dispatcher.on_ready();
        dispatcher
    }

    fn register(page: &P, kinds: &[TriggerKind]) -> Vec<VisibilityWatcher> {
        let mut claimed = HashSet::new();
        kinds
            .iter()
            .map(|&kind| {
                let mut watcher = VisibilityWatcher::new(kind);
                for element in page.query_all(kind.selector()) {
                    if kind.is_animation() && !claimed.insert(element) {
                        continue;
                    }
                    let trigger = Trigger::configure(kind, page, element);
                    if trigger.starts_paused() {
                        effects::hero_pause(page, element);
                    }
                    watcher.observe(element, trigger);
                }
                debug!(kind = %kind, elements = watcher.active_count(), "Registered watcher");
                watcher
            })
            .collect()
    }

    /// Without visibility observation every deferred image loads at once.
    fn load_all_images(page: &P) {
        let kind = TriggerKind::LazyImage;
        for element in page.query_all(kind.selector()) {
            if let Trigger::LazyImage { src, srcset } = Trigger::configure(kind, page, element) {
                effects::load_image(page, element, src.as_deref(), srcset.as_deref());
            }
        }
    }

    fn on_ready(&self) {
        let page = self.page.as_ref();
        for (selector, class, delay) in [
            (Selector::Class("hero__content"), "hero-animate-in", HERO_CONTENT_DELAY),
            (
                Selector::Class("hero__announcement"),
                "announcement-animate-in",
                ANNOUNCEMENT_DELAY,
            ),
        ] {
            if let Some(element) = page.query_first(selector) {
                let page = Arc::clone(&self.page);
                self.spawn(async move {
                    sleep(delay).await;
                    page.add_class(element, class);
                });
            }
        }
        page.add_class(BODY, "animations-ready");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn parallax(&self) -> Option<&ParallaxController<P>> {
        self.parallax.as_ref()
    }

    /// Number of elements still waiting to be seen, across all kinds.
    pub fn active_count(&self) -> usize {
        self.lock_watchers().iter().map(|w| w.active_count()).sum()
    }

    /// Which watcher tracks `element`, and where it is in its lifecycle.
    pub fn tracking(&self, element: ElementId) -> Option<(TriggerKind, TrackState)> {
        self.lock_watchers()
            .iter()
            .find_map(|w| w.state(element).map(|s| (w.kind(), s)))
    }

    /// Feed one observer callback for `kind`. Returns how many triggers fired.
    pub fn deliver(&self, kind: TriggerKind, entries: &[IntersectionEntry]) -> usize {
        let fired = {
            let mut watchers = self.lock_watchers();
            match watchers.iter_mut().find(|w| w.kind() == kind) {
                Some(watcher) => watcher.process(entries),
                None => Vec::new(),
            }
        };
        self.fire_all(fired)
    }

    /// Evaluate every active element against the current viewport.
    pub fn observe_viewport(&self) -> usize {
        let fired: Vec<Fired> = {
            let mut watchers = self.lock_watchers();
            watchers
                .iter_mut()
                .flat_map(|w| {
                    let entries = w.evaluate(self.page.as_ref());
                    w.process(&entries)
                })
                .collect()
        };
        self.fire_all(fired)
    }

    /// Forward a scroll event to the parallax layers.
    pub fn on_scroll(&self) -> bool {
        self.parallax
            .as_ref()
            .map(|p| p.on_scroll())
            .unwrap_or(false)
    }

    /// Wait for every running effect to finish.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(
                &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    fn fire_all(&self, fired: Vec<Fired>) -> usize {
        let count = fired.len();
        for f in fired {
            self.fire(f);
        }
        count
    }

    fn fire(&self, fired: Fired) {
        let element = fired.element;
        debug!(element = element.0, trigger = ?fired.trigger, "Trigger fired");

        let page = Arc::clone(&self.page);
        match fired.trigger {
            Trigger::FadeIn { delay } => {
                self.spawn(async move { effects::run_fade_in(page.as_ref(), element, delay).await })
            }
            Trigger::ScrollReveal { variant } => {
                effects::scroll_reveal(page.as_ref(), element, &variant)
            }
            Trigger::AnimateOnScroll => effects::animate_in(page.as_ref(), element),
            Trigger::Counter { target, duration } => self.spawn(async move {
                effects::run_counter(page.as_ref(), element, target, duration).await
            }),
            Trigger::Typewriter { speed } => self.spawn(async move {
                effects::run_typewriter(page.as_ref(), element, speed).await
            }),
            Trigger::HeroStagger => effects::hero_stagger(page.as_ref(), element),
            Trigger::HeroRelease(variant) => effects::hero_release(page.as_ref(), element, variant),
            Trigger::HeroNone => {}
            Trigger::LazyImage { src, srcset } => {
                effects::load_image(page.as_ref(), element, src.as_deref(), srcset.as_deref())
            }
        }
    }

    fn spawn(&self, effect: impl Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(effect);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, Vec<VisibilityWatcher>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::page::{ElementSpec, MemoryPage, Mutation, PageSpec, Rect, Viewport};
    use std::collections::BTreeMap;

    fn el(classes: &[&str], data: &[(&str, &str)], y: f64) -> ElementSpec {
        ElementSpec {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            data: data
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            rect: Rect::new(0.0, y, 600.0, 100.0),
            ..ElementSpec::default()
        }
    }

    fn page(elements: Vec<ElementSpec>) -> Arc<MemoryPage> {
        Arc::new(MemoryPage::from_spec(&PageSpec {
            viewport: Viewport {
                width: 1280.0,
                height: 800.0,
                scroll_y: 0.0,
            },
            elements,
            ..PageSpec::default()
        }))
    }

    fn hit(element: ElementId) -> IntersectionEntry {
        IntersectionEntry {
            element,
            is_intersecting: true,
            ratio: 1.0,
        }
    }

    fn mutations_for(page: &MemoryPage, element: ElementId) -> Vec<Mutation> {
        page.mutations()
            .into_iter()
            .filter(|m| m.element() == element)
            .collect()
    }

    fn img(src: &str, y: f64) -> ElementSpec {
        let mut spec = el(&[], &[("src", src)], y);
        spec.tag = "img".into();
        spec
    }

    #[tokio::test(start_paused = true)]
    async fn test_reduced_motion_disables_everything() {
        let page = Arc::new(MemoryPage::from_spec(&PageSpec {
            reduced_motion: true,
            elements: vec![el(&["fade-in"], &[], 0.0), el(&["parallax"], &[], 0.0)],
            ..PageSpec::default()
        }));
        let dispatcher = AnimationDispatcher::start(page.clone());

        assert!(!dispatcher.is_enabled());
        assert_eq!(dispatcher.active_count(), 0);
        assert!(dispatcher.parallax().is_none());
        assert_eq!(dispatcher.observe_viewport(), 0);
        assert!(page.mutations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_visibility_observation_degrades() {
        let page = Arc::new(MemoryPage::from_spec(&PageSpec {
            visibility_observation: false,
            elements: vec![el(&["fade-in"], &[], 0.0), el(&["parallax"], &[], 0.0)],
            ..PageSpec::default()
        }));
        let dispatcher = AnimationDispatcher::start(page.clone());

        assert!(dispatcher.is_enabled());
        assert_eq!(dispatcher.active_count(), 0);
        assert_eq!(dispatcher.observe_viewport(), 0);
        assert!(dispatcher.parallax().is_some());
        assert!(page.has_class(BODY, "animations-ready"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reduced_motion_still_loads_images() {
        let page = Arc::new(MemoryPage::from_spec(&PageSpec {
            reduced_motion: true,
            elements: vec![el(&["animate-on-scroll"], &[], 0.0), img("/images/map.webp", 0.0)],
            ..PageSpec::default()
        }));
        let dispatcher = AnimationDispatcher::start(page.clone());
        let image = ElementId(2);

        assert!(!dispatcher.is_enabled());
        assert_eq!(dispatcher.tracking(ElementId(1)), None);
        assert_eq!(dispatcher.observe_viewport(), 1);
        assert_eq!(page.attribute(image, "src").as_deref(), Some("/images/map.webp"));
        assert!(!page.has_class(ElementId(1), "animate-in"));
        assert!(!page.has_class(BODY, "animations-ready"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_visibility_observation_loads_images_immediately() {
        let mut with_srcset = img("/images/b.webp", 5000.0);
        with_srcset.data.insert("srcset".into(), "/images/b@2x.webp 2x".into());
        let page = Arc::new(MemoryPage::from_spec(&PageSpec {
            visibility_observation: false,
            elements: vec![img("/images/a.webp", 4000.0), with_srcset],
            ..PageSpec::default()
        }));
        let dispatcher = AnimationDispatcher::start(page.clone());

        assert_eq!(dispatcher.active_count(), 0);
        assert_eq!(page.attribute(ElementId(1), "src").as_deref(), Some("/images/a.webp"));
        assert_eq!(
            page.attribute(ElementId(2), "srcset").as_deref(),
            Some("/images/b@2x.webp 2x")
        );
        assert!(page.has_class(ElementId(1), "loaded"));
        assert!(page.has_class(ElementId(2), "loaded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_image_loads_within_margin() {
        // viewport ends at 800; the 50px margin reaches 850
        let page = page(vec![img("/images/fleet.webp", 840.0), img("/images/far.webp", 900.0)]);
        let dispatcher = AnimationDispatcher::start(page.clone());
        let near = ElementId(1);
        let far = ElementId(2);

        assert_eq!(dispatcher.observe_viewport(), 1);
        assert_eq!(
            mutations_for(&page, near),
            vec![
                Mutation::SetAttribute {
                    element: near,
                    name: "src".into(),
                    value: "/images/fleet.webp".into(),
                },
                Mutation::RemoveData { element: near, key: "src".into() },
                Mutation::AddClass { element: near, class: "loaded".into() },
            ]
        );
        assert_eq!(
            dispatcher.tracking(far),
            Some((TriggerKind::LazyImage, TrackState::Observing))
        );

        page.scroll_to(100.0);
        assert_eq!(dispatcher.observe_viewport(), 1);
        assert!(page.has_class(far, "loaded"));
        assert_eq!(dispatcher.observe_viewport(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_animated_lazy_image_gets_both() {
        let mut spec = img("/images/port.webp", 100.0);
        spec.classes.push("fade-in".into());
        let page = page(vec![spec]);
        let dispatcher = AnimationDispatcher::start(page.clone());
        let element = ElementId(1);

        assert_eq!(dispatcher.active_count(), 2);
        assert_eq!(dispatcher.observe_viewport(), 2);
        dispatcher.settle().await;

        assert!(page.has_class(element, "fade-in-active"));
        assert!(page.has_class(element, "loaded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_animate_on_scroll_respects_bottom_margin() {
        // 30px of a 100px element inside the viewport, but the -50px margin hides it
        let page = page(vec![el(&["animate-on-scroll"], &[], 770.0)]);
        let dispatcher = AnimationDispatcher::start(page.clone());
        let element = ElementId(1);

        assert_eq!(dispatcher.observe_viewport(), 0);
        page.scroll_to(100.0);
        assert_eq!(dispatcher.observe_viewport(), 1);
        assert_eq!(
            mutations_for(&page, element),
            vec![Mutation::AddClass { element, class: "animate-in".into() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_fires_at_most_once() {
        let page = page(vec![el(&["scroll-animate"], &[], 2000.0)]);
        let dispatcher = AnimationDispatcher::start(page.clone());
        let element = ElementId(1);

        assert_eq!(dispatcher.deliver(TriggerKind::ScrollReveal, &[hit(element)]), 1);
        assert_eq!(dispatcher.deliver(TriggerKind::ScrollReveal, &[hit(element)]), 0);

        assert_eq!(
            mutations_for(&page, element),
            vec![
                Mutation::AddClass { element, class: "animate-in".into() },
                Mutation::AddClass { element, class: "animate-slideUp".into() },
            ]
        );
        assert_eq!(
            dispatcher.tracking(element),
            Some((TriggerKind::ScrollReveal, TrackState::Fired))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_for_other_kinds_are_ignored() {
        let page = page(vec![el(&["scroll-animate"], &[], 0.0)]);
        let dispatcher = AnimationDispatcher::start(page.clone());
        assert_eq!(dispatcher.deliver(TriggerKind::FadeIn, &[hit(ElementId(1))]), 0);
        assert_eq!(dispatcher.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_in_waits_until_scrolled_into_view() {
        let page = page(vec![el(&["fade-in"], &[("delay", "200")], 1500.0)]);
        let dispatcher = AnimationDispatcher::start(page.clone());
        let element = ElementId(1);

        assert_eq!(dispatcher.observe_viewport(), 0);
        page.scroll_to(1000.0);
        assert_eq!(dispatcher.observe_viewport(), 1);
        assert!(!page.has_class(element, "fade-in-active"));

        dispatcher.settle().await;
        assert!(page.has_class(element, "fade-in-active"));
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_lands_on_target() {
        let page = page(vec![el(&["counter"], &[("target", "100"), ("duration", "1000")], 100.0)]);
        let dispatcher = AnimationDispatcher::start(page.clone());

        assert_eq!(dispatcher.observe_viewport(), 1);
        dispatcher.settle().await;

        let history = page.text_history(ElementId(1));
        assert_eq!(history.last().map(String::as_str), Some("100"));
        assert!(history.iter().all(|v| v.parse::<u64>().unwrap() <= 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typewriter_reveals_in_order() {
        let mut spec = el(&["typewriter"], &[("speed", "10")], 100.0);
        spec.text = "ABC".into();
        let page = page(vec![spec]);
        let dispatcher = AnimationDispatcher::start(page.clone());

        // nothing is typed before the element is seen
        assert!(page.text_history(ElementId(1)).is_empty());
        dispatcher.observe_viewport();
        dispatcher.settle().await;

        assert_eq!(page.text_history(ElementId(1)), vec!["", "A", "AB", "ABC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hero_release_and_stagger() {
        let mut title = el(&["hero__title"], &[("animation", "stagger")], 100.0);
        title.children = vec![
            el(&["hero__title-word"], &[], 100.0),
            el(&["hero__title-word"], &[], 100.0),
        ];
        let subtitle = el(&["hero__subtitle"], &[("animation", "fade-up")], 300.0);
        let page = page(vec![title, subtitle]);
        let title_id = ElementId(1);
        let subtitle_id = ElementId(4);

        let dispatcher = AnimationDispatcher::start(page.clone());
        assert_eq!(page.style(subtitle_id, "animation-play-state").as_deref(), Some("paused"));
        assert_eq!(page.style(title_id, "animation-play-state"), None);

        assert_eq!(dispatcher.observe_viewport(), 2);

        assert_eq!(page.style(subtitle_id, "animation-play-state").as_deref(), Some("running"));
        assert_eq!(page.style(ElementId(2), "animation-delay").as_deref(), Some("0s"));
        assert_eq!(page.style(ElementId(3), "animation-delay").as_deref(), Some("0.1s"));
        assert_eq!(page.style(ElementId(3), "animation-play-state").as_deref(), Some("running"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_element_has_single_owner() {
        let page = page(vec![el(&["scroll-animate"], &[("animation", "slideLeft")], 100.0)]);
        let dispatcher = AnimationDispatcher::start(page.clone());
        let element = ElementId(1);

        assert_eq!(dispatcher.active_count(), 1);
        assert_eq!(
            dispatcher.tracking(element),
            Some((TriggerKind::ScrollReveal, TrackState::Observing))
        );

        dispatcher.observe_viewport();
        assert!(page.has_class(element, "animate-slideLeft"));
        assert_eq!(page.style(element, "animation-play-state"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_ready_animations() {
        let page = page(vec![
            el(&["hero__content"], &[], 0.0),
            el(&["hero__announcement"], &[], 0.0),
        ]);
        let dispatcher = AnimationDispatcher::start(page.clone());
        assert!(page.has_class(BODY, "animations-ready"));
        assert!(!page.has_class(ElementId(1), "hero-animate-in"));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(page.has_class(ElementId(1), "hero-animate-in"));
        assert!(!page.has_class(ElementId(2), "announcement-animate-in"));

        dispatcher.settle().await;
        assert!(page.has_class(ElementId(2), "announcement-animate-in"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_burst_drives_one_parallax_frame() {
        let page = page(vec![el(&["parallax"], &[], 0.0)]);
        let dispatcher = AnimationDispatcher::start(page.clone());

        page.scroll_to(40.0);
        let requested = (0..10).filter(|_| dispatcher.on_scroll()).count();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(requested, 1);
        let parallax = dispatcher.parallax().unwrap();
        assert_eq!(parallax.recompute_count(), 1);
        assert_eq!(
            page.style(ElementId(1), "transform").as_deref(),
            Some("translate3d(0, -20px, 0)")
        );
    }
}
