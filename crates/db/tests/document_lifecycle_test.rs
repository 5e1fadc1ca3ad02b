//! Document lifecycle persistence tests.
//!
//! Exercise the status machine as persisted by `DocumentRepository`:
//! guarded transitions, burnt-folio recording, the submission audit
//! trail, and the sweep's SENT listing.
//!
//! They need a live Postgres; set `DATABASE_URL` (or
//! `TRIBUTO__DATABASE__URL`) to run them.

use std::env;

use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tributo_core::dte::{
    AuthorityState, DocumentStore, DteStatus, DteType, FiscalDocument, LineItem, Party,
    SignedDocument, Totals,
};
use tributo_db::entities::submissions;
use tributo_db::migration::{Migrator, MigratorTrait};
use tributo_db::DocumentRepository;
use tributo_shared::{DteError, Rut};
use uuid::Uuid;

fn database_url() -> Option<String> {
    env::var("DATABASE_URL")
        .or_else(|_| env::var("TRIBUTO__DATABASE__URL"))
        .ok()
}

async fn setup() -> Option<sea_orm::DatabaseConnection> {
    let Some(url) = database_url() else {
        eprintln!("Skipping: DATABASE_URL not set");
        return None;
    };
    let db = tributo_db::connect(&url).await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");
    Some(db)
}

fn document(org: Uuid) -> FiscalDocument {
    FiscalDocument {
        id: Uuid::new_v4(),
        organization_id: org,
        dte_type: DteType::Invoice,
        issue_date: Utc::now().date_naive(),
        issuer: Party {
            rut: Rut::parse("76192083-9").unwrap(),
            legal_name: "Empresa de Prueba SA".to_string(),
            activity: None,
            address: None,
            commune: None,
        },
        receiver: Party {
            rut: Rut::parse("12345678-5").unwrap(),
            legal_name: "Cliente Uno".to_string(),
            activity: None,
            address: None,
            commune: None,
        },
        items: vec![LineItem {
            description: "Servicio".to_string(),
            quantity: dec!(1),
            unit_price: dec!(10000),
            total: dec!(10000),
            exempt: false,
        }],
        totals: Totals {
            net: dec!(10000),
            exempt: dec!(0),
            tax: dec!(1900),
            discount: dec!(0),
            total: dec!(11900),
        },
        reference: None,
    }
}

fn signed(document_id: Uuid, folio: i64) -> SignedDocument {
    SignedDocument {
        document_id,
        folio,
        xml: format!("<DTE><Documento ID=\"DTE-33-{folio}\"/></DTE>"),
        generated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_full_lifecycle_to_acceptance() {
    let Some(db) = setup().await else { return };
    let repo = DocumentRepository::new(db.clone());
    let doc = document(Uuid::new_v4());

    repo.create_pending(&doc).await.unwrap();
    assert_eq!(repo.status_of(doc.id).await.unwrap(), DteStatus::Pending);

    repo.record_generated(&doc, &signed(doc.id, 7)).await.unwrap();
    let loaded = repo.load_generated(doc.id).await.unwrap();
    assert_eq!(loaded.folio, 7);
    assert!(loaded.xml.contains("DTE-33-7"));

    repo.record_sent(doc.id, "9001").await.unwrap();
    assert_eq!(repo.status_of(doc.id).await.unwrap(), DteStatus::Sent);

    repo.record_verdict(doc.id, AuthorityState::Accepted, Some("Procesado"))
        .await
        .unwrap();
    assert_eq!(repo.status_of(doc.id).await.unwrap(), DteStatus::Accepted);

    // The submission audit row followed the verdict
    let submission = submissions::Entity::find()
        .filter(submissions::Column::DocumentId.eq(doc.id))
        .one(&db)
        .await
        .unwrap()
        .expect("submission row");
    assert_eq!(submission.track_id, "9001");
    assert_eq!(submission.state, "ACCEPTED");
    assert_eq!(submission.message.as_deref(), Some("Procesado"));
}

#[tokio::test]
async fn test_rejection_records_burnt_folio() {
    let Some(db) = setup().await else { return };
    let repo = DocumentRepository::new(db);
    let doc = document(Uuid::new_v4());

    repo.create_pending(&doc).await.unwrap();
    repo.record_rejected(doc.id, Some(42), "SIGNING: key unusable")
        .await
        .unwrap();

    let row = repo.fetch(doc.id).await.unwrap().unwrap();
    assert_eq!(row.status, "REJECTED");
    assert_eq!(row.folio, Some(42));
    assert_eq!(row.status_message.as_deref(), Some("SIGNING: key unusable"));
}

#[tokio::test]
async fn test_guarded_transitions_reject_races() {
    let Some(db) = setup().await else { return };
    let repo = DocumentRepository::new(db);
    let doc = document(Uuid::new_v4());

    repo.create_pending(&doc).await.unwrap();

    // SENT requires GENERATED first
    let err = repo.record_sent(doc.id, "1").await.unwrap_err();
    assert!(matches!(err, DteError::InvalidTransition { .. }));

    repo.record_generated(&doc, &signed(doc.id, 1)).await.unwrap();

    // A second generation of the same document must lose the race
    let err = repo
        .record_generated(&doc, &signed(doc.id, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, DteError::InvalidTransition { .. }));

    repo.record_sent(doc.id, "1").await.unwrap();
    repo.record_verdict(doc.id, AuthorityState::Rejected, Some("RCT"))
        .await
        .unwrap();

    // Terminal states accept no further writes
    let err = repo
        .record_verdict(doc.id, AuthorityState::Accepted, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DteError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_folio_uniqueness_is_enforced() {
    let Some(db) = setup().await else { return };
    let repo = DocumentRepository::new(db);
    let org = Uuid::new_v4();

    let first = document(org);
    let second = document(org);
    repo.create_pending(&first).await.unwrap();
    repo.create_pending(&second).await.unwrap();

    repo.record_generated(&first, &signed(first.id, 7)).await.unwrap();
    let err = repo
        .record_generated(&second, &signed(second.id, 7))
        .await
        .unwrap_err();
    assert!(matches!(err, DteError::Database(_)));
}

#[tokio::test]
async fn test_list_sent_is_bounded_and_ordered() {
    let Some(db) = setup().await else { return };
    let repo = DocumentRepository::new(db);
    let org = Uuid::new_v4();

    let mut ids = Vec::new();
    for folio in 1..=3 {
        let doc = document(org);
        repo.create_pending(&doc).await.unwrap();
        repo.record_generated(&doc, &signed(doc.id, folio)).await.unwrap();
        repo.record_sent(doc.id, &format!("T{folio}")).await.unwrap();
        ids.push(doc.id);
    }

    let sent = repo.list_sent(2).await.unwrap();
    let ours: Vec<_> = sent
        .iter()
        .filter(|s| s.organization_id == org)
        .collect();
    assert!(ours.len() <= 2);
    for entry in ours {
        assert!(entry.track_id.starts_with('T'));
        assert_eq!(entry.issuer, Rut::parse("76192083-9").unwrap());
    }
}
