//! # editkb
//!
//! A local knowledge base for automated video editing. It ingests curated
//! reference documents (guidelines, element definitions, worked examples,
//! asset catalogs), serves ranked retrieval over them, and validates
//! machine-generated editing plans against the corpus schema and domain
//! rules.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Corpus    │──▶│   Ingestor   │──▶│    Cache     │
//! │  MD + JSON  │   │ parse+embed  │   │ docs/vectors │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐         ┌────────────┐
//!                 │  search  │         │  validate  │
//!                 │  (index) │         │ schema+rules│
//!                 └──────────┘         └────────────┘
//! ```
//!
//! Parsing, chunking, encoding, indexing and validation are pure and live
//! in `editkb-core`. This crate adds the filesystem, the cache, and the
//! [`repository::KnowledgeRepository`] façade.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Corpus scanner |
//! | [`ingest`] | Change-detection ingestion |
//! | [`cache`] | On-disk cache artifacts |
//! | [`catalogs`] | Asset catalog loading |
//! | [`embedding`] | Encoder selection |
//! | [`repository`] | Loaded state, search and validation |
//! | [`sync_cmd`], [`search`], [`validate`], [`docs`], [`stats`] | CLI commands |

pub mod cache;
pub mod catalogs;
pub mod config;
pub mod connector_fs;
pub mod docs;
pub mod embedding;
pub mod ingest;
pub mod repository;
pub mod search;
pub mod stats;
pub mod sync_cmd;
pub mod validate;
