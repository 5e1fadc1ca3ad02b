//! `SeaORM` entity definitions.

pub mod cafs;
pub mod fiscal_documents;
pub mod submissions;
