//! Initial database migration.
//!
//! Creates the issuance tables: CAFs, fiscal documents, and submissions.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(CAFS_SQL).await?;
        db.execute_unprepared(FISCAL_DOCUMENTS_SQL).await?;
        db.execute_unprepared(SUBMISSIONS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("DROP TABLE IF EXISTS submissions;")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS fiscal_documents;")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS cafs;").await?;

        Ok(())
    }
}

const CAFS_SQL: &str = r"
CREATE TABLE cafs (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    issuer_rut TEXT NOT NULL,
    dte_type INTEGER NOT NULL,
    folio_start BIGINT NOT NULL,
    folio_end BIGINT NOT NULL,
    next_folio BIGINT NOT NULL,
    private_key_pem TEXT NOT NULL,
    authorization_xml TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT cafs_valid_range CHECK (folio_start >= 1 AND folio_end >= folio_start),
    CONSTRAINT cafs_next_in_range CHECK (next_folio >= folio_start AND next_folio <= folio_end + 1),
    CONSTRAINT cafs_unique_range UNIQUE (organization_id, dte_type, folio_start)
);

CREATE INDEX idx_cafs_allocation ON cafs (organization_id, dte_type, folio_start)
    WHERE next_folio <= folio_end;
";

const FISCAL_DOCUMENTS_SQL: &str = r"
CREATE TABLE fiscal_documents (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    dte_type INTEGER NOT NULL,
    issuer_rut TEXT NOT NULL,
    receiver_rut TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    folio BIGINT,
    xml TEXT,
    track_id TEXT,
    status_message TEXT,
    generated_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT fiscal_documents_status CHECK
        (status IN ('PENDING', 'GENERATED', 'SENT', 'ACCEPTED', 'REJECTED')),
    -- A folio is assigned to at most one document of a type per org
    CONSTRAINT fiscal_documents_unique_folio UNIQUE (organization_id, dte_type, folio)
);

CREATE INDEX idx_fiscal_documents_status ON fiscal_documents (status, updated_at);
CREATE INDEX idx_fiscal_documents_org ON fiscal_documents (organization_id, created_at);
";

const SUBMISSIONS_SQL: &str = r"
CREATE TABLE submissions (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES fiscal_documents(id),
    track_id TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'SENT',
    message TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT submissions_state CHECK (state IN ('SENT', 'ACCEPTED', 'REJECTED'))
);

CREATE INDEX idx_submissions_document ON submissions (document_id, created_at);
";
