//! # editkb Core
//!
//! Pure logic for editkb: the document model, markdown segmentation,
//! document parsing and kind resolution, chunking, the embedding encoder,
//! the vector index, the reference graph, and the two plan validators.
//!
//! This crate performs no filesystem I/O. Scanning, caching, and the
//! repository façade live in the `editkb` application crate.

pub mod catalog;
pub mod chunk;
pub mod document;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod index;
pub mod markdown;
pub mod models;
pub mod plan;
pub mod rules;
pub mod schema;

pub use error::{CoreError, Result};
