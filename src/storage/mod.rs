//! Storage module for persisting trained maps.

mod format;

pub use format::{MapFormat, MapHeader, MapSnapshot};
