//! The state transitions fired triggers run.
//!
//! Counter and typewriter effects are plain steppers driven by an async
//! runner that sleeps between steps. Every effect runs to completion once
//! started; there is no cancel path.

use std::time::Duration;

use tokio::time::sleep;

use super::page::{ElementId, Page};
use super::trigger::HeroVariant;

/// One rendered frame at 60 fps.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

const FADE_IN_ACTIVE: &str = "fade-in-active";
const ANIMATE_IN: &str = "animate-in";
const IMAGE_LOADED: &str = "loaded";
const HERO_WORD: &str = "hero__title-word";

// ============================================================================
// Counter
// ============================================================================

/// Linear count from 0 to `target`, one increment per frame.
#[derive(Debug, Clone)]
pub struct CounterAnimation {
    target: u64,
    increment: f64,
    current: f64,
    done: bool,
}

impl CounterAnimation {
    pub fn new(target: u64, duration: Duration) -> Self {
        let frames = duration.as_secs_f64() / FRAME_INTERVAL.as_secs_f64();
        let increment = if frames > 0.0 {
            target as f64 / frames
        } else {
            target as f64
        };
        Self {
            target,
            increment,
            current: 0.0,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance one frame and return the value to display. The last frame
    /// shows exactly `target`.
    pub fn step(&mut self) -> u64 {
        if self.done {
            return self.target;
        }
        self.current += self.increment;
        if self.current < self.target as f64 {
            (self.current.floor() as u64).min(self.target)
        } else {
            self.done = true;
            self.target
        }
    }
}

pub async fn run_counter<P: Page + ?Sized>(page: &P, element: ElementId, target: u64, duration: Duration) {
    let mut counter = CounterAnimation::new(target, duration);
    loop {
        let value = counter.step();
        page.set_text(element, &value.to_string());
        if counter.is_done() {
            break;
        }
        sleep(FRAME_INTERVAL).await;
    }
}

// ============================================================================
// Typewriter
// ============================================================================

/// Reveals `text` one character at a time.
#[derive(Debug, Clone)]
pub struct Typewriter {
    chars: Vec<char>,
    shown: usize,
}

impl Typewriter {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            shown: 0,
        }
    }

    /// The next prefix, or `None` once the whole text is shown.
    pub fn next_frame(&mut self) -> Option<String> {
        if self.shown >= self.chars.len() {
            return None;
        }
        self.shown += 1;
        Some(self.chars[..self.shown].iter().collect())
    }
}

pub async fn run_typewriter<P: Page + ?Sized>(page: &P, element: ElementId, speed: Duration) {
    let mut typewriter = Typewriter::new(&page.text(element));
    page.set_text(element, "");
    page.set_style(element, "border-right", "2px solid");
    page.set_style(element, "animation", "blink 1s infinite");

    while let Some(prefix) = typewriter.next_frame() {
        page.set_text(element, &prefix);
        sleep(speed).await;
    }

    // leave a blinking cursor behind
    page.set_style(element, "border-right", "2px solid transparent");
    page.set_style(element, "animation", "blink 1s infinite");
}

// ============================================================================
// One-step transitions
// ============================================================================

pub async fn run_fade_in<P: Page + ?Sized>(page: &P, element: ElementId, delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
    page.add_class(element, FADE_IN_ACTIVE);
}

pub fn scroll_reveal<P: Page + ?Sized>(page: &P, element: ElementId, variant: &str) {
    page.add_class(element, ANIMATE_IN);
    page.add_class(element, &format!("animate-{}", variant));
}

pub fn animate_in<P: Page + ?Sized>(page: &P, element: ElementId) {
    page.add_class(element, ANIMATE_IN);
}

/// Swap deferred `data-src`/`data-srcset` into the live attributes.
pub fn load_image<P: Page + ?Sized>(
    page: &P,
    element: ElementId,
    src: Option<&str>,
    srcset: Option<&str>,
) {
    if let Some(src) = src {
        page.set_attribute(element, "src", src);
        page.remove_data(element, "src");
    }
    if let Some(srcset) = srcset {
        page.set_attribute(element, "srcset", srcset);
        page.remove_data(element, "srcset");
    }
    page.add_class(element, IMAGE_LOADED);
}

/// Give each title word a growing delay and start them in index order.
pub fn hero_stagger<P: Page + ?Sized>(page: &P, element: ElementId) {
    for (index, word) in page.children(element, HERO_WORD).into_iter().enumerate() {
        let delay = index as f64 / 10.0;
        page.set_style(word, "animation-delay", &format!("{}s", delay));
        page.set_style(word, "animation-play-state", "running");
    }
}

pub fn hero_pause<P: Page + ?Sized>(page: &P, element: ElementId) {
    page.set_style(element, "animation-play-state", "paused");
}

pub fn hero_release<P: Page + ?Sized>(page: &P, element: ElementId, _variant: HeroVariant) {
    page.set_style(element, "animation-play-state", "running");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::page::{ElementSpec, MemoryPage, Viewport, BODY};

    fn page_with_text(text: &str) -> (MemoryPage, ElementId) {
        let page = MemoryPage::new(Viewport::default());
        let el = page.add_element(
            BODY,
            ElementSpec {
                text: text.to_string(),
                ..ElementSpec::default()
            },
        );
        (page, el)
    }

    #[test]
    fn test_counter_reaches_target_exactly() {
        let mut counter = CounterAnimation::new(100, Duration::from_millis(1000));
        let mut values = Vec::new();
        while !counter.is_done() {
            values.push(counter.step());
        }

        assert_eq!(values.last(), Some(&100));
        assert!(values.iter().all(|&v| v <= 100));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        // 1000ms / 16ms = 62.5 frames
        assert!(values.len() >= 62 && values.len() <= 64, "frames: {}", values.len());
    }

    #[test]
    fn test_counter_zero_target() {
        let mut counter = CounterAnimation::new(0, Duration::from_millis(2000));
        assert_eq!(counter.step(), 0);
        assert!(counter.is_done());
    }

    #[test]
    fn test_counter_shorter_than_a_frame() {
        let mut counter = CounterAnimation::new(7, Duration::from_millis(5));
        assert_eq!(counter.step(), 7);
        assert!(counter.is_done());
    }

    #[test]
    fn test_typewriter_prefixes() {
        let mut tw = Typewriter::new("配送");
        assert_eq!(tw.next_frame().as_deref(), Some("配"));
        assert_eq!(tw.next_frame().as_deref(), Some("配送"));
        assert_eq!(tw.next_frame(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_typewriter_sequence() {
        let (page, el) = page_with_text("ABC");
        run_typewriter(&page, el, Duration::from_millis(10)).await;

        assert_eq!(page.text_history(el), vec!["", "A", "AB", "ABC"]);
        assert_eq!(page.style(el, "border-right").as_deref(), Some("2px solid transparent"));
        assert_eq!(page.style(el, "animation").as_deref(), Some("blink 1s infinite"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_typewriter_paces_characters() {
        let (page, el) = page_with_text("ABC");
        let start = tokio::time::Instant::now();
        run_typewriter(&page, el, Duration::from_millis(10)).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30) && elapsed < Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_counter_final_value() {
        let (page, el) = page_with_text("0");
        run_counter(&page, el, 100, Duration::from_millis(1000)).await;

        let history = page.text_history(el);
        assert_eq!(history.last().map(String::as_str), Some("100"));
        assert!(history.iter().all(|v| v.parse::<u64>().unwrap() <= 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fade_in_waits_for_delay() {
        let (page, el) = page_with_text("");
        let start = tokio::time::Instant::now();
        run_fade_in(&page, el, Duration::from_millis(300)).await;
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(page.has_class(el, "fade-in-active"));
    }

    #[test]
    fn test_hero_stagger_delays() {
        let page = MemoryPage::new(Viewport::default());
        let title = page.add_element(BODY, ElementSpec::default());
        let words: Vec<_> = (0..4)
            .map(|_| {
                page.add_element(
                    title,
                    ElementSpec {
                        classes: vec!["hero__title-word".into()],
                        ..ElementSpec::default()
                    },
                )
            })
            .collect();

        hero_stagger(&page, title);

        let delays: Vec<_> = words
            .iter()
            .map(|w| page.style(*w, "animation-delay").unwrap())
            .collect();
        assert_eq!(delays, vec!["0s", "0.1s", "0.2s", "0.3s"]);
        assert!(words
            .iter()
            .all(|w| page.style(*w, "animation-play-state").as_deref() == Some("running")));
    }

    #[test]
    fn test_load_image_moves_sources() {
        let page = MemoryPage::new(Viewport::default());
        let img = page.add_element(
            BODY,
            ElementSpec {
                tag: "img".into(),
                data: [("src", "/images/truck.webp"), ("srcset", "/images/truck@2x.webp 2x")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..ElementSpec::default()
            },
        );

        load_image(&page, img, Some("/images/truck.webp"), Some("/images/truck@2x.webp 2x"));

        assert_eq!(page.attribute(img, "src").as_deref(), Some("/images/truck.webp"));
        assert_eq!(page.attribute(img, "srcset").as_deref(), Some("/images/truck@2x.webp 2x"));
        assert_eq!(page.data(img, "src"), None);
        assert_eq!(page.data(img, "srcset"), None);
        assert!(page.has_class(img, "loaded"));
    }

    #[test]
    fn test_load_image_without_srcset_keeps_it_unset() {
        let (page, img) = page_with_text("");
        load_image(&page, img, Some("/a.png"), None);
        assert_eq!(page.attribute(img, "srcset"), None);
        assert!(page.has_class(img, "loaded"));
    }

    #[test]
    fn test_scroll_reveal_classes() {
        let (page, el) = page_with_text("");
        scroll_reveal(&page, el, "slideLeft");
        assert!(page.has_class(el, "animate-in"));
        assert!(page.has_class(el, "animate-slideLeft"));
    }
}
