//! `SeaORM` Entity for the fiscal_documents table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "fiscal_documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub dte_type: i32,
    pub issuer_rut: String,
    pub receiver_rut: String,
    /// Lifecycle status in its stable string form.
    pub status: String,
    /// Assigned folio; also present on REJECTED rows whose folio was
    /// burnt by a failed issuance.
    pub folio: Option<i64>,
    /// Signed XML body, present from GENERATED onward.
    #[sea_orm(column_type = "Text", nullable)]
    pub xml: Option<String>,
    /// Authority tracking identifier, present from SENT onward.
    pub track_id: Option<String>,
    /// Last recorded diagnostic (rejection cause, authority gloss).
    pub status_message: Option<String>,
    pub generated_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::submissions::Entity")]
    Submissions,
}

impl Related<super::submissions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submissions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
