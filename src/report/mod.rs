//! Report generation.

pub mod generator;

pub use generator::{render_json, render_markdown, write_json, write_new, ReportMetadata};
