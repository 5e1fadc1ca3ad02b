//! Core DTE issuance logic for Tributo.
//!
//! This crate contains the whole electronic-tax-document pipeline with ZERO
//! web-server or database dependencies. Persistence is reached through the
//! `FolioAllocator` and `DocumentStore` trait seams implemented elsewhere.
//!
//! # Modules
//!
//! - `dte` - document types, stamping, building, signing, authority
//!   clients, and the lifecycle orchestrator

pub mod dte;
