//! Scroll session replay for `solex motion`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use solex_core::motion::effects::FRAME_INTERVAL;
use solex_core::motion::{AnimationDispatcher, MemoryPage, Mutation, PageSpec};

/// A page plus the scroll positions visited, in order.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub page: PageSpec,
    #[serde(default)]
    pub steps: Vec<ScrollStep>,
}

#[derive(Debug, Deserialize)]
pub struct ScrollStep {
    pub scroll_y: f64,
    /// Time spent at this position before the next step
    #[serde(default)]
    pub dwell_ms: u64,
}

#[derive(Debug, Serialize)]
struct Report {
    mutations: Vec<Mutation>,
    /// Elements that were never seen
    unseen: usize,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse scenario: {}", path.display()))
    }
}

pub async fn run(path: &Path) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let page = Arc::new(MemoryPage::from_spec(&scenario.page));
    let dispatcher = AnimationDispatcher::start(Arc::clone(&page));

    dispatcher.observe_viewport();
    for step in &scenario.steps {
        page.scroll_to(step.scroll_y);
        dispatcher.on_scroll();
        let fired = dispatcher.observe_viewport();
        debug!(scroll_y = step.scroll_y, fired, "Scroll step");
        sleep(Duration::from_millis(step.dwell_ms)).await;
    }

    dispatcher.settle().await;
    while dispatcher.parallax().is_some_and(|p| p.is_pending()) {
        sleep(FRAME_INTERVAL).await;
    }

    let report = Report {
        mutations: page.mutations(),
        unseen: dispatcher.active_count(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "page": {
                    "viewport": {"width": 375, "height": 667},
                    "elements": [
                        {"classes": ["counter"], "data": {"target": "120"}, "rect": {"x": 0, "y": 900, "width": 300, "height": 80}}
                    ]
                },
                "steps": [{"scroll_y": 500, "dwell_ms": 100}, {"scroll_y": 900}]
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.page.elements.len(), 1);
        assert_eq!(scenario.steps.len(), 2);
        assert_eq!(scenario.steps[1].dwell_ms, 0);
    }

    #[test]
    fn test_steps_are_optional() {
        let scenario: Scenario = serde_json::from_str(r#"{"page": {}}"#).unwrap();
        assert!(scenario.steps.is_empty());
        assert!(scenario.page.visibility_observation);
    }
}
