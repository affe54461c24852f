//! Robots.txt parsing and rule selection
//!
//! This module parses robots.txt content into per-user-agent rule groups
//! and answers the two questions the scheduler asks: is this path allowed,
//! and how long must we wait between requests.

mod parser;

pub use parser::{parse, RobotsData, RobotsRules};
