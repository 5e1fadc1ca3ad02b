//! `SeaORM` Entity for the cafs table.
//!
//! One row per registered folio authorization. `next_folio` is the only
//! mutable column: it walks from `folio_start` to `folio_end + 1`, at
//! which point the CAF is spent.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "cafs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub issuer_rut: String,
    pub dte_type: i32,
    pub folio_start: i64,
    pub folio_end: i64,
    pub next_folio: i64,
    pub private_key_pem: String,
    pub authorization_xml: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
