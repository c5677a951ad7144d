//! decap: a headless-browser automation service for scraping dynamic web
//! pages, aimed at job advertisements.
//!
//! Clients POST declarative JSON scripts; the daemon drives a real browser
//! through them (navigate, click, wait for lifecycle events, scrape, print)
//! and returns the captured artifacts. A separate distillation endpoint
//! boils scraped HTML down to its main content.

pub mod browser;
pub mod distill;
pub mod error;
pub mod models;
pub mod query;
pub mod registry;
pub mod service;
