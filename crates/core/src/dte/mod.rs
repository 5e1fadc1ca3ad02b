//! Electronic tax document (DTE) issuance.
//!
//! Pipeline: reserve folio -> stamp ([`ted`]) -> build ([`builder`]) ->
//! sign ([`xmldsig`]) -> submit/poll ([`authority`]), sequenced by the
//! [`service::DteService`] orchestrator and the background [`sweep`].

pub mod authority;
pub mod builder;
pub mod caf;
pub mod credentials;
pub mod crypto;
pub mod service;
pub mod sweep;
pub mod ted;
pub mod totals;
pub mod types;
pub mod xml;
pub mod xmldsig;

pub use caf::Caf;
pub use credentials::Credentials;
pub use service::{
    DteService, DocumentStore, FolioAllocator, IssueOutcome, IssuerMode, ReservedFolio,
    SubmitOutcome,
};
pub use totals::TotalsPolicy;
pub use types::{
    AuthorityState, DteStatus, DteType, FiscalDocument, LineItem, Party, Reference,
    SentDocument, SignedDocument, Totals,
};
