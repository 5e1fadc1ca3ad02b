//! Fiscal document lifecycle persistence.
//!
//! Status updates are guarded at the SQL level: every write filters on
//! the status it expects to leave, so a lost race surfaces as an
//! `InvalidTransition` instead of silently overwriting a verdict.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use tributo_core::dte::{
    AuthorityState, DocumentStore, DteStatus, FiscalDocument, SentDocument, SignedDocument,
};
use tributo_shared::{DteError, DteResult, Rut};
use uuid::Uuid;

use crate::entities::{fiscal_documents, submissions};
use crate::repositories::db_err;

/// Fiscal document repository.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    db: DatabaseConnection,
}

impl DocumentRepository {
    /// Creates a new document repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Registers a new PENDING document, as handed over by the invoice
    /// layer.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Database` on storage failures.
    pub async fn create_pending(&self, document: &FiscalDocument) -> DteResult<()> {
        fiscal_documents::ActiveModel {
            id: Set(document.id),
            organization_id: Set(document.organization_id),
            dte_type: Set(document.dte_type.code()),
            issuer_rut: Set(document.issuer.rut.to_string()),
            receiver_rut: Set(document.receiver.rut.to_string()),
            status: Set(DteStatus::Pending.as_str().to_string()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Loads a document row.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Database` on storage failures.
    pub async fn fetch(&self, document_id: Uuid) -> DteResult<Option<fiscal_documents::Model>> {
        fiscal_documents::Entity::find_by_id(document_id)
            .one(&self.db)
            .await
            .map_err(db_err)
    }

    /// Builds the `InvalidTransition` error for a guarded update that
    /// matched no row.
    async fn transition_conflict(&self, document_id: Uuid, to: DteStatus) -> DteError {
        match self.fetch(document_id).await {
            Ok(Some(row)) => DteError::InvalidTransition {
                from: row.status,
                to: to.as_str().to_string(),
            },
            Ok(None) => DteError::Internal(format!("Unknown document: {document_id}")),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl DocumentStore for DocumentRepository {
    async fn status_of(&self, document_id: Uuid) -> DteResult<DteStatus> {
        let row = self
            .fetch(document_id)
            .await?
            .ok_or_else(|| DteError::Internal(format!("Unknown document: {document_id}")))?;
        DteStatus::parse(&row.status)
    }

    async fn record_generated(
        &self,
        document: &FiscalDocument,
        signed: &SignedDocument,
    ) -> DteResult<()> {
        let now = Utc::now().fixed_offset();
        let result = fiscal_documents::Entity::update_many()
            .col_expr(
                fiscal_documents::Column::Status,
                Expr::value(DteStatus::Generated.as_str()),
            )
            .col_expr(fiscal_documents::Column::Folio, Expr::value(signed.folio))
            .col_expr(
                fiscal_documents::Column::Xml,
                Expr::value(signed.xml.clone()),
            )
            .col_expr(
                fiscal_documents::Column::GeneratedAt,
                Expr::value(signed.generated_at.fixed_offset()),
            )
            .col_expr(fiscal_documents::Column::UpdatedAt, Expr::value(now))
            .filter(fiscal_documents::Column::Id.eq(document.id))
            .filter(fiscal_documents::Column::Status.eq(DteStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(self
                .transition_conflict(document.id, DteStatus::Generated)
                .await);
        }
        Ok(())
    }

    async fn record_rejected(
        &self,
        document_id: Uuid,
        folio: Option<i64>,
        message: &str,
    ) -> DteResult<()> {
        let now = Utc::now().fixed_offset();
        let mut update = fiscal_documents::Entity::update_many()
            .col_expr(
                fiscal_documents::Column::Status,
                Expr::value(DteStatus::Rejected.as_str()),
            )
            .col_expr(
                fiscal_documents::Column::StatusMessage,
                Expr::value(message),
            )
            .col_expr(fiscal_documents::Column::UpdatedAt, Expr::value(now));
        if let Some(folio) = folio {
            // A burnt folio is recorded even though issuance failed
            update = update.col_expr(fiscal_documents::Column::Folio, Expr::value(folio));
        }

        let result = update
            .filter(fiscal_documents::Column::Id.eq(document_id))
            .filter(fiscal_documents::Column::Status.is_in([
                DteStatus::Pending.as_str(),
                DteStatus::Generated.as_str(),
                DteStatus::Sent.as_str(),
            ]))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(self
                .transition_conflict(document_id, DteStatus::Rejected)
                .await);
        }
        Ok(())
    }

    async fn load_generated(&self, document_id: Uuid) -> DteResult<SignedDocument> {
        let row = self
            .fetch(document_id)
            .await?
            .ok_or_else(|| DteError::Internal(format!("Unknown document: {document_id}")))?;

        if row.status != DteStatus::Generated.as_str() {
            return Err(DteError::InvalidTransition {
                from: row.status,
                to: DteStatus::Sent.as_str().to_string(),
            });
        }

        let folio = row
            .folio
            .ok_or_else(|| DteError::Internal(format!("Document {document_id} has no folio")))?;
        let xml = row
            .xml
            .ok_or_else(|| DteError::Internal(format!("Document {document_id} has no XML")))?;
        let generated_at = row
            .generated_at
            .ok_or_else(|| DteError::Internal(format!("Document {document_id} has no timestamp")))?;

        Ok(SignedDocument {
            document_id,
            folio,
            xml,
            generated_at: generated_at.to_utc(),
        })
    }

    async fn record_sent(&self, document_id: Uuid, track_id: &str) -> DteResult<()> {
        let now = Utc::now().fixed_offset();
        let result = fiscal_documents::Entity::update_many()
            .col_expr(
                fiscal_documents::Column::Status,
                Expr::value(DteStatus::Sent.as_str()),
            )
            .col_expr(fiscal_documents::Column::TrackId, Expr::value(track_id))
            .col_expr(fiscal_documents::Column::UpdatedAt, Expr::value(now))
            .filter(fiscal_documents::Column::Id.eq(document_id))
            .filter(fiscal_documents::Column::Status.eq(DteStatus::Generated.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(self.transition_conflict(document_id, DteStatus::Sent).await);
        }

        submissions::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(document_id),
            track_id: Set(track_id.to_string()),
            state: Set(DteStatus::Sent.as_str().to_string()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn record_verdict(
        &self,
        document_id: Uuid,
        state: AuthorityState,
        message: Option<&str>,
    ) -> DteResult<()> {
        let status = match state {
            AuthorityState::Accepted => DteStatus::Accepted,
            AuthorityState::Rejected => DteStatus::Rejected,
            AuthorityState::Processing => return Ok(()),
        };

        let now = Utc::now().fixed_offset();
        let result = fiscal_documents::Entity::update_many()
            .col_expr(
                fiscal_documents::Column::Status,
                Expr::value(status.as_str()),
            )
            .col_expr(
                fiscal_documents::Column::StatusMessage,
                Expr::value(message),
            )
            .col_expr(fiscal_documents::Column::UpdatedAt, Expr::value(now))
            .filter(fiscal_documents::Column::Id.eq(document_id))
            .filter(fiscal_documents::Column::Status.eq(DteStatus::Sent.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(self.transition_conflict(document_id, status).await);
        }

        submissions::Entity::update_many()
            .col_expr(submissions::Column::State, Expr::value(status.as_str()))
            .col_expr(submissions::Column::Message, Expr::value(message))
            .col_expr(submissions::Column::UpdatedAt, Expr::value(now))
            .filter(submissions::Column::DocumentId.eq(document_id))
            .filter(submissions::Column::State.eq(DteStatus::Sent.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_sent(&self, limit: u64) -> DteResult<Vec<SentDocument>> {
        let rows = fiscal_documents::Entity::find()
            .filter(fiscal_documents::Column::Status.eq(DteStatus::Sent.as_str()))
            .order_by_asc(fiscal_documents::Column::UpdatedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let issuer = Rut::parse(&row.issuer_rut).map_err(|e| {
                    DteError::Internal(format!("Stored document has invalid RUT: {e}"))
                })?;
                let track_id = row.track_id.ok_or_else(|| {
                    DteError::Internal(format!("SENT document {} has no track id", row.id))
                })?;
                Ok(SentDocument {
                    document_id: row.id,
                    organization_id: row.organization_id,
                    issuer,
                    track_id,
                })
            })
            .collect()
    }
}
