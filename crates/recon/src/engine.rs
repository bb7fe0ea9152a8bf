use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use cuadra_core::{BankMovement, Document, DocumentRef, DocumentState, Flow, ReconcileState};
use cuadra_import::{normalize, partition_new, Cell, NormalizeError};
use cuadra_storage::{self as storage, DbPool, LinkAudit};

use crate::matcher::{self, CandidateSet};

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("movement {0} not found")]
    MovementNotFound(i64),
    #[error("movement {0} is already reconciled")]
    AlreadyReconciled(i64),
    #[error("document {0:?} not found")]
    DocumentNotFound(DocumentRef),
    #[error("document {0:?} is not pending")]
    DocumentNotPending(DocumentRef),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Full statement import: normalize, sieve against persisted operation
/// references, bulk-insert the remainder oldest-first. A parse failure
/// aborts before anything is written.
pub async fn import_rows(pool: &DbPool, rows: &[Vec<Cell>]) -> Result<ImportSummary, ReconError> {
    let statement = normalize(rows)?;
    let skipped = statement.skipped;
    debug!(parsed = statement.movements.len(), skipped, "statement normalized");

    let existing = storage::existing_references(pool).await?;
    let partition = partition_new(statement.movements, &existing);
    let inserted = storage::insert_movements(pool, &partition.to_insert).await?;

    info!(
        inserted,
        duplicates = partition.duplicate_count,
        skipped,
        "statement import finished"
    );
    Ok(ImportSummary {
        inserted: inserted as usize,
        duplicates: partition.duplicate_count,
        skipped,
    })
}

async fn require_movement(pool: &DbPool, id: i64) -> Result<BankMovement, ReconError> {
    storage::get_movement(pool, id)
        .await?
        .ok_or(ReconError::MovementNotFound(id))
}

async fn fetch_document(pool: &DbPool, document: DocumentRef) -> Result<Document, ReconError> {
    let found = match document {
        DocumentRef::Invoice(id) => storage::get_invoice(pool, id).await?.map(Document::Invoice),
        DocumentRef::Reimbursement(id) => storage::get_reimbursement(pool, id)
            .await?
            .map(Document::Reimbursement),
    };
    found.ok_or(ReconError::DocumentNotFound(document))
}

async fn set_document_state(
    pool: &DbPool,
    document: DocumentRef,
    state: DocumentState,
) -> Result<(), sqlx::Error> {
    match document {
        DocumentRef::Invoice(id) => storage::set_invoice_state(pool, id, state).await,
        DocumentRef::Reimbursement(id) => storage::set_reimbursement_state(pool, id, state).await,
    }
}

/// Loads the eligible document population for a movement and ranks it.
pub async fn candidates_for(pool: &DbPool, movement_id: i64) -> Result<CandidateSet, ReconError> {
    let movement = require_movement(pool, movement_id).await?;
    let documents = eligible_documents(pool, &movement).await?;
    Ok(matcher::rank_candidates(&movement, &documents))
}

/// Manual free-text search over the same population, run on demand.
pub async fn search_candidates(
    pool: &DbPool,
    movement_id: i64,
    query: &str,
) -> Result<Vec<Document>, ReconError> {
    let movement = require_movement(pool, movement_id).await?;
    let documents = eligible_documents(pool, &movement).await?;
    Ok(matcher::search(&movement, &documents, query))
}

async fn eligible_documents(
    pool: &DbPool,
    movement: &BankMovement,
) -> Result<Vec<Document>, ReconError> {
    let mut documents = Vec::new();
    match movement.flow() {
        Some(Flow::Debit) => {
            documents.extend(
                storage::pending_invoices(pool, cuadra_core::InvoiceDirection::Purchase)
                    .await?
                    .into_iter()
                    .map(Document::Invoice),
            );
            documents.extend(
                storage::pending_reimbursements(pool)
                    .await?
                    .into_iter()
                    .map(Document::Reimbursement),
            );
        }
        Some(Flow::Credit) => {
            documents.extend(
                storage::pending_invoices(pool, cuadra_core::InvoiceDirection::Sale)
                    .await?
                    .into_iter()
                    .map(Document::Invoice),
            );
        }
        None => {}
    }
    Ok(documents)
}

/// Commits a match: payment link, document → paid, movement →
/// reconciled. The three writes are sequential, not transactional; a
/// failure part-way leaves a half-committed triad that [`audit_links`]
/// reports. Preconditions (movement unreconciled, document pending) make
/// the operation safe to retry from scratch.
pub async fn confirm_match(
    pool: &DbPool,
    movement_id: i64,
    document: DocumentRef,
) -> Result<i64, ReconError> {
    let movement = require_movement(pool, movement_id).await?;
    if movement.is_reconciled() {
        return Err(ReconError::AlreadyReconciled(movement_id));
    }
    let doc = fetch_document(pool, document).await?;
    if !doc.is_pending() {
        return Err(ReconError::DocumentNotPending(document));
    }

    let link_id = storage::insert_payment_link(pool, document, movement_id, doc.amount()).await?;
    set_document_state(pool, document, DocumentState::Paid).await?;
    storage::set_movement_state(pool, movement_id, ReconcileState::Reconciled).await?;

    info!(movement_id, ?document, link_id, "movement reconciled against document");
    Ok(link_id)
}

/// Resolves a movement that has no matching document (payroll, misc.
/// transfers): annotated `[Otros: <reason>]`, no payment link.
pub async fn resolve_other(pool: &DbPool, movement_id: i64, reason: &str) -> Result<(), ReconError> {
    resolve_manual(pool, movement_id, &format!("[Otros: {reason}]")).await
}

/// Resolves a movement under a fixed label, e.g. `[Remuneraciones]`.
pub async fn resolve_direct(pool: &DbPool, movement_id: i64, label: &str) -> Result<(), ReconError> {
    resolve_manual(pool, movement_id, &format!("[{label}]")).await
}

async fn resolve_manual(pool: &DbPool, movement_id: i64, tag: &str) -> Result<(), ReconError> {
    let movement = require_movement(pool, movement_id).await?;
    if movement.is_reconciled() {
        return Err(ReconError::AlreadyReconciled(movement_id));
    }

    storage::append_movement_description(pool, movement_id, tag).await?;
    storage::set_movement_state(pool, movement_id, ReconcileState::Reconciled).await?;

    info!(movement_id, tag, "movement resolved without document");
    Ok(())
}

/// Reverses a committed match: every linked document back to pending,
/// links deleted, movement back to unreconciled. The only reversal path;
/// there is no partial undo.
pub async fn undo(pool: &DbPool, movement_id: i64) -> Result<(), ReconError> {
    require_movement(pool, movement_id).await?;

    let links = storage::links_for_movement(pool, movement_id).await?;
    for link in &links {
        set_document_state(pool, link.document, DocumentState::Pending).await?;
    }
    storage::delete_links_for_movement(pool, movement_id).await?;
    storage::set_movement_state(pool, movement_id, ReconcileState::Unreconciled).await?;

    info!(movement_id, links = links.len(), "reconciliation undone");
    Ok(())
}

/// Irreversible hard delete, independent of reconciliation state. Links
/// cascade at the store level.
pub async fn delete_movement(pool: &DbPool, movement_id: i64) -> Result<(), ReconError> {
    require_movement(pool, movement_id).await?;
    storage::delete_movement(pool, movement_id).await?;
    info!(movement_id, "movement deleted");
    Ok(())
}

/// Reports payment links whose triad is inconsistent — the manual
/// detector for failures inside the non-transactional commit.
pub async fn audit_links(pool: &DbPool) -> Result<Vec<LinkAudit>, ReconError> {
    Ok(storage::audit_inconsistent_links(pool).await?)
}
