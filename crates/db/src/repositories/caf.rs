//! CAF registry and atomic folio allocation.

use async_trait::async_trait;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, Statement,
};
use tributo_core::dte::{Caf, DteType, FolioAllocator, ReservedFolio};
use tributo_shared::{DteError, DteResult, Rut};
use uuid::Uuid;

use crate::entities::cafs;
use crate::repositories::db_err;

/// Reserves the lowest unused folio across the organization's CAFs for a
/// type, lowest range first. The row lock serializes concurrent
/// reservations; the single statement makes increment-and-read atomic.
const RESERVE_SQL: &str = r"
UPDATE cafs SET next_folio = next_folio + 1
WHERE id = (
    SELECT id FROM cafs
    WHERE organization_id = $1 AND dte_type = $2 AND next_folio <= folio_end
    ORDER BY folio_start
    LIMIT 1
    FOR UPDATE
)
RETURNING next_folio - 1 AS folio,
    issuer_rut, dte_type, folio_start, folio_end,
    private_key_pem, authorization_xml;
";

/// CAF repository.
#[derive(Debug, Clone)]
pub struct CafRepository {
    db: DatabaseConnection,
}

impl CafRepository {
    /// Creates a new CAF repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Registers a parsed CAF for an organization. Allocation starts at
    /// the beginning of its range.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Database` on storage failures (including a
    /// duplicate registration of the same range).
    pub async fn register(&self, organization_id: Uuid, caf: &Caf) -> DteResult<Uuid> {
        let id = Uuid::new_v4();
        cafs::ActiveModel {
            id: Set(id),
            organization_id: Set(organization_id),
            issuer_rut: Set(caf.issuer_rut.to_string()),
            dte_type: Set(caf.dte_type.code()),
            folio_start: Set(caf.folio_start),
            folio_end: Set(caf.folio_end),
            next_folio: Set(caf.folio_start),
            private_key_pem: Set(caf.private_key_pem.clone()),
            authorization_xml: Set(caf.authorization_xml.clone()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    /// Folios still available for an organization and document type,
    /// summed across all registered CAFs.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Database` on storage failures.
    pub async fn remaining_folios(
        &self,
        organization_id: Uuid,
        dte_type: DteType,
    ) -> DteResult<i64> {
        let rows = cafs::Entity::find()
            .filter(cafs::Column::OrganizationId.eq(organization_id))
            .filter(cafs::Column::DteType.eq(dte_type.code()))
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|caf| (caf.folio_end - caf.next_folio + 1).max(0))
            .sum())
    }

    /// Whether any CAF is registered for the pair, spent or not.
    async fn any_registered(&self, organization_id: Uuid, dte_type: DteType) -> DteResult<bool> {
        let count = cafs::Entity::find()
            .filter(cafs::Column::OrganizationId.eq(organization_id))
            .filter(cafs::Column::DteType.eq(dte_type.code()))
            .count(&self.db)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl FolioAllocator for CafRepository {
    async fn reserve_folio(
        &self,
        organization_id: Uuid,
        dte_type: DteType,
    ) -> DteResult<ReservedFolio> {
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            RESERVE_SQL,
            [organization_id.into(), dte_type.code().into()],
        );

        let Some(row) = self.db.query_one(statement).await.map_err(db_err)? else {
            return if self.any_registered(organization_id, dte_type).await? {
                Err(DteError::FolioRangeExhausted {
                    dte_type: dte_type.code(),
                })
            } else {
                Err(DteError::NoCafRegistered {
                    organization_id,
                    dte_type: dte_type.code(),
                })
            };
        };

        let folio: i64 = row.try_get("", "folio").map_err(db_err)?;
        let issuer_rut: String = row.try_get("", "issuer_rut").map_err(db_err)?;
        let type_code: i32 = row.try_get("", "dte_type").map_err(db_err)?;

        let caf = Caf {
            issuer_rut: Rut::parse(&issuer_rut)
                .map_err(|e| DteError::Internal(format!("Stored CAF has invalid RUT: {e}")))?,
            dte_type: DteType::from_code(type_code)?,
            folio_start: row.try_get("", "folio_start").map_err(db_err)?,
            folio_end: row.try_get("", "folio_end").map_err(db_err)?,
            private_key_pem: row.try_get("", "private_key_pem").map_err(db_err)?,
            authorization_xml: row.try_get("", "authorization_xml").map_err(db_err)?,
        };

        Ok(ReservedFolio { folio, caf })
    }
}
