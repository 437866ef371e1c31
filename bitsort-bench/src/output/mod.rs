//! Output modules for rendering benchmark results.
//!
//! Supports table (comfy-table), JSON, and progress spinner output.

pub mod json;
pub mod progress;
pub mod table;
