//! `SeaORM` Entity for the submissions table.
//!
//! Audit trail of upload attempts: one row per accepted upload, updated
//! in place when the authority's verdict arrives.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub document_id: Uuid,
    pub track_id: String,
    /// SENT, ACCEPTED, or REJECTED.
    pub state: String,
    pub message: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fiscal_documents::Entity",
        from = "Column::DocumentId",
        to = "super::fiscal_documents::Column::Id"
    )]
    FiscalDocuments,
}

impl Related<super::fiscal_documents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FiscalDocuments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
