use chrono::NaiveDate;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::path::Path;

use cuadra_core::{
    BankMovement, DocumentRef, DocumentState, Invoice, InvoiceDirection, Money, NewMovement,
    PaymentLink, ReconcileState, Reimbursement,
};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_movements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sequence INTEGER NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            branch TEXT NOT NULL DEFAULT '',
            reference TEXT NOT NULL DEFAULT '',
            amount_cents INTEGER NOT NULL,
            balance_cents INTEGER,
            state TEXT NOT NULL DEFAULT 'unreconciled',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Non-empty operation references are the natural de-duplication key.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_movements_reference
        ON bank_movements(reference) WHERE reference <> ''
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            direction TEXT NOT NULL,
            number TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            issue_date TEXT NOT NULL,
            due_date TEXT,
            counterparty TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reimbursements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            total_cents INTEGER NOT NULL,
            counterparty TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payment_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id INTEGER REFERENCES invoices(id),
            reimbursement_id INTEGER REFERENCES reimbursements(id),
            movement_id INTEGER NOT NULL REFERENCES bank_movements(id) ON DELETE CASCADE,
            amount_cents INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK ((invoice_id IS NULL) <> (reimbursement_id IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ── bank movements ────────────────────────────────────────────────────────────

/// Bulk insert in the order given. Sequence numbers continue from the
/// current maximum, so callers must pass rows oldest-first.
pub async fn insert_movements(pool: &DbPool, rows: &[NewMovement]) -> Result<u64, sqlx::Error> {
    let (next,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(sequence), 0) + 1 FROM bank_movements")
            .fetch_one(pool)
            .await?;

    let mut inserted = 0u64;
    for (offset, row) in rows.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO bank_movements
                (sequence, date, description, branch, reference, amount_cents, balance_cents, state)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'unreconciled')
            "#,
        )
        .bind(next + offset as i64)
        .bind(row.date)
        .bind(&row.description)
        .bind(&row.branch)
        .bind(&row.reference)
        .bind(row.amount.to_cents())
        .bind(row.balance.map(Money::to_cents))
        .execute(pool)
        .await?;
        inserted += 1;
    }
    Ok(inserted)
}

/// All non-empty operation references currently persisted.
pub async fn existing_references(pool: &DbPool) -> Result<HashSet<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT reference FROM bank_movements WHERE reference <> ''")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

type MovementRow = (
    i64,
    i64,
    NaiveDate,
    String,
    String,
    String,
    i64,
    Option<i64>,
    String,
    String,
);

fn movement_from_row(r: MovementRow) -> BankMovement {
    BankMovement {
        id: r.0,
        sequence: r.1,
        date: r.2,
        description: r.3,
        branch: r.4,
        reference: r.5,
        amount: Money::from_cents(r.6),
        balance: r.7.map(Money::from_cents),
        state: ReconcileState::parse(&r.8),
        created_at: r.9,
    }
}

const MOVEMENT_COLUMNS: &str =
    "id, sequence, date, description, branch, reference, amount_cents, balance_cents, state, created_at";

pub async fn get_movement(pool: &DbPool, id: i64) -> Result<Option<BankMovement>, sqlx::Error> {
    let row: Option<MovementRow> = sqlx::query_as(&format!(
        "SELECT {MOVEMENT_COLUMNS} FROM bank_movements WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(movement_from_row))
}

/// Movements ordered most recent first, optionally filtered by state.
pub async fn get_movements(
    pool: &DbPool,
    state: Option<ReconcileState>,
) -> Result<Vec<BankMovement>, sqlx::Error> {
    let rows: Vec<MovementRow> = match state {
        Some(state) => {
            sqlx::query_as(&format!(
                "SELECT {MOVEMENT_COLUMNS} FROM bank_movements WHERE state = ? ORDER BY sequence DESC"
            ))
            .bind(state.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {MOVEMENT_COLUMNS} FROM bank_movements ORDER BY sequence DESC"
            ))
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.into_iter().map(movement_from_row).collect())
}

pub async fn count_movements(
    pool: &DbPool,
    state: Option<ReconcileState>,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = match state {
        Some(state) => {
            sqlx::query_as("SELECT COUNT(*) FROM bank_movements WHERE state = ?")
                .bind(state.as_str())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT COUNT(*) FROM bank_movements")
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count)
}

pub async fn set_movement_state(
    pool: &DbPool,
    id: i64,
    state: ReconcileState,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bank_movements SET state = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Appends an audit tag to the movement description.
pub async fn append_movement_description(
    pool: &DbPool,
    id: i64,
    text: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bank_movements SET description = TRIM(description || ' ' || ?) WHERE id = ?")
        .bind(text)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Hard delete. Payment links cascade at the schema level.
pub async fn delete_movement(pool: &DbPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM bank_movements WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ── invoices ──────────────────────────────────────────────────────────────────

type InvoiceRow = (
    i64,
    String,
    String,
    i64,
    NaiveDate,
    Option<NaiveDate>,
    String,
    String,
);

fn invoice_from_row(r: InvoiceRow) -> Invoice {
    Invoice {
        id: r.0,
        direction: InvoiceDirection::parse(&r.1),
        number: r.2,
        amount: Money::from_cents(r.3),
        issue_date: r.4,
        due_date: r.5,
        counterparty: r.6,
        state: DocumentState::parse(&r.7),
    }
}

const INVOICE_COLUMNS: &str =
    "id, direction, number, amount_cents, issue_date, due_date, counterparty, state";

pub async fn insert_invoice(
    pool: &DbPool,
    direction: InvoiceDirection,
    number: &str,
    amount: Money,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    counterparty: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO invoices (direction, number, amount_cents, issue_date, due_date, counterparty)
        VALUES (?, ?, ?, ?, ?, ?) RETURNING id
        "#,
    )
    .bind(direction.as_str())
    .bind(number)
    .bind(amount.to_cents())
    .bind(issue_date)
    .bind(due_date)
    .bind(counterparty)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn get_invoice(pool: &DbPool, id: i64) -> Result<Option<Invoice>, sqlx::Error> {
    let row: Option<InvoiceRow> = sqlx::query_as(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(invoice_from_row))
}

pub async fn pending_invoices(
    pool: &DbPool,
    direction: InvoiceDirection,
) -> Result<Vec<Invoice>, sqlx::Error> {
    let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE state = 'pending' AND direction = ? ORDER BY id"
    ))
    .bind(direction.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(invoice_from_row).collect())
}

pub async fn set_invoice_state(
    pool: &DbPool,
    id: i64,
    state: DocumentState,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE invoices SET state = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ── reimbursements ────────────────────────────────────────────────────────────

type ReimbursementRow = (i64, i64, String, String);

fn reimbursement_from_row(r: ReimbursementRow) -> Reimbursement {
    Reimbursement {
        id: r.0,
        total: Money::from_cents(r.1),
        counterparty: r.2,
        state: DocumentState::parse(&r.3),
    }
}

pub async fn insert_reimbursement(
    pool: &DbPool,
    total: Money,
    counterparty: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO reimbursements (total_cents, counterparty) VALUES (?, ?) RETURNING id",
    )
    .bind(total.to_cents())
    .bind(counterparty)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn get_reimbursement(
    pool: &DbPool,
    id: i64,
) -> Result<Option<Reimbursement>, sqlx::Error> {
    let row: Option<ReimbursementRow> = sqlx::query_as(
        "SELECT id, total_cents, counterparty, state FROM reimbursements WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(reimbursement_from_row))
}

pub async fn pending_reimbursements(pool: &DbPool) -> Result<Vec<Reimbursement>, sqlx::Error> {
    let rows: Vec<ReimbursementRow> = sqlx::query_as(
        "SELECT id, total_cents, counterparty, state FROM reimbursements WHERE state = 'pending' ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(reimbursement_from_row).collect())
}

pub async fn set_reimbursement_state(
    pool: &DbPool,
    id: i64,
    state: DocumentState,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE reimbursements SET state = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ── payment links ─────────────────────────────────────────────────────────────

pub async fn insert_payment_link(
    pool: &DbPool,
    document: DocumentRef,
    movement_id: i64,
    amount: Money,
) -> Result<i64, sqlx::Error> {
    let (invoice_id, reimbursement_id) = match document {
        DocumentRef::Invoice(id) => (Some(id), None),
        DocumentRef::Reimbursement(id) => (None, Some(id)),
    };
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO payment_links (invoice_id, reimbursement_id, movement_id, amount_cents)
        VALUES (?, ?, ?, ?) RETURNING id
        "#,
    )
    .bind(invoice_id)
    .bind(reimbursement_id)
    .bind(movement_id)
    .bind(amount.to_cents())
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

type LinkRow = (i64, Option<i64>, Option<i64>, i64, i64, String);

fn link_from_row(r: LinkRow) -> Option<PaymentLink> {
    let document = match (r.1, r.2) {
        (Some(invoice_id), _) => DocumentRef::Invoice(invoice_id),
        (None, Some(reimbursement_id)) => DocumentRef::Reimbursement(reimbursement_id),
        (None, None) => return None,
    };
    Some(PaymentLink {
        id: r.0,
        document,
        movement_id: r.3,
        amount: Money::from_cents(r.4),
        created_at: r.5,
    })
}

pub async fn links_for_movement(
    pool: &DbPool,
    movement_id: i64,
) -> Result<Vec<PaymentLink>, sqlx::Error> {
    let rows: Vec<LinkRow> = sqlx::query_as(
        r#"
        SELECT id, invoice_id, reimbursement_id, movement_id, amount_cents, created_at
        FROM payment_links WHERE movement_id = ?
        "#,
    )
    .bind(movement_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter_map(link_from_row).collect())
}

pub async fn delete_links_for_movement(
    pool: &DbPool,
    movement_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM payment_links WHERE movement_id = ?")
        .bind(movement_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// A payment link whose triad (link, document, movement) is out of step:
/// the document is not paid, the movement is not reconciled, or the
/// document row is gone. This is the detector for the non-transactional
/// three-step commit.
#[derive(Debug, Clone, Serialize)]
pub struct LinkAudit {
    pub link_id: i64,
    pub movement_id: i64,
    pub movement_state: ReconcileState,
    pub document: Option<DocumentRef>,
    pub document_state: Option<DocumentState>,
}

pub async fn audit_inconsistent_links(pool: &DbPool) -> Result<Vec<LinkAudit>, sqlx::Error> {
    let rows: Vec<(i64, i64, String, Option<i64>, Option<i64>, Option<String>)> = sqlx::query_as(
        r#"
        SELECT pl.id, pl.movement_id, bm.state, pl.invoice_id, pl.reimbursement_id,
               COALESCE(i.state, r.state)
        FROM payment_links pl
        JOIN bank_movements bm ON bm.id = pl.movement_id
        LEFT JOIN invoices i ON i.id = pl.invoice_id
        LEFT JOIN reimbursements r ON r.id = pl.reimbursement_id
        WHERE bm.state <> 'reconciled' OR COALESCE(i.state, r.state, 'missing') <> 'paid'
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LinkAudit {
            link_id: r.0,
            movement_id: r.1,
            movement_state: ReconcileState::parse(&r.2),
            document: match (r.3, r.4) {
                (Some(id), _) => Some(DocumentRef::Invoice(id)),
                (None, Some(id)) => Some(DocumentRef::Reimbursement(id)),
                (None, None) => None,
            },
            document_state: r.5.as_deref().map(DocumentState::parse),
        })
        .collect())
}
