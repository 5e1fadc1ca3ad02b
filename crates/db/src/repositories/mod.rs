//! Repository abstractions for data access.
//!
//! The repositories implement the core issuance seams
//! ([`tributo_core::dte::FolioAllocator`],
//! [`tributo_core::dte::DocumentStore`]) over `SeaORM`.

pub mod caf;
pub mod document;

pub use caf::CafRepository;
pub use document::DocumentRepository;

use tributo_shared::DteError;

/// Maps a database error into the issuance taxonomy (retryable).
pub(crate) fn db_err(err: sea_orm::DbErr) -> DteError {
    DteError::Database(err.to_string())
}
