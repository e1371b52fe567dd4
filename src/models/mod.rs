//! Core data models for harvested research items and crawl positions.

mod item;
mod locator;

pub use item::{ResearchItem, ResearchItemBuilder, RESEARCH_ITEM_TYPE};
pub use locator::{CrawlLocator, LocatorError};
