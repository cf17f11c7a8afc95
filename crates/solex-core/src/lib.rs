//! Solex site runtime.
//!
//! Two independent pieces of the SOLEX LOGISTICS marketing site:
//! - `worker`: the offline cache worker (install, activate, fetch, push)
//! - `motion`: the scroll animation dispatcher
//!
//! Both are driven by the `solex` CLI.

pub mod config;
pub mod motion;
pub mod utils;
pub mod worker;

pub use config::SiteConfig;
