use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use cuadra_core::{Money, NewMovement};

use crate::sheet::Cell;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("input table is empty")]
    EmptyInput,
}

/// Resolved position of each canonical field in the header row. Any
/// field the header does not carry stays `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMap {
    pub date: Option<usize>,
    pub description: Option<usize>,
    pub branch: Option<usize>,
    pub reference: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub amount: Option<usize>,
    pub balance: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct NormalizedStatement {
    /// Retained rows in source order (typically most-recent-first).
    pub movements: Vec<NewMovement>,
    /// Rows after the header that were dropped as unparseable.
    pub skipped: usize,
}

/// A row containing any of these fragments is taken as the header.
const HEADER_KEYWORDS: &[&str] = &["fecha", "monto", "descripci", "cargo", "abono"];
const HEADER_SCAN_LIMIT: usize = 20;

// Synonym groups carry both accented and plain spellings; bank exports
// are inconsistent about diacritics.
const DATE_SYNONYMS: &[&str] = &["fecha", "date"];
const DESCRIPTION_SYNONYMS: &[&str] = &[
    "descripción",
    "descripcion",
    "description",
    "detalle",
    "concepto",
];
const BRANCH_SYNONYMS: &[&str] = &["sucursal", "oficina", "canal"];
const REFERENCE_SYNONYMS: &[&str] = &[
    "n° doc",
    "nro doc",
    "documento",
    "operación",
    "operacion",
    "referencia",
];
const DEBIT_SYNONYMS: &[&str] = &["cargos", "cargo", "débito", "debito", "salida"];
const CREDIT_SYNONYMS: &[&str] = &[
    "abonos", "abono", "crédito", "credito", "depósito", "deposito", "entrada",
];
const AMOUNT_SYNONYMS: &[&str] = &["monto", "valor", "importe", "monto total"];
const BALANCE_SYNONYMS: &[&str] = &["saldo", "balance", "remanente"];

/// Normalizes a raw cell grid into movement records.
///
/// Best-effort by design: header detection falls back to row 0 rather
/// than failing, and individual bad rows are counted, not fatal. Only a
/// grid with no content at all is an error.
pub fn normalize(rows: &[Vec<Cell>]) -> Result<NormalizedStatement, NormalizeError> {
    if rows.iter().all(|row| row.iter().all(Cell::is_empty)) {
        return Err(NormalizeError::EmptyInput);
    }

    let header_idx = detect_header(rows);
    let map = resolve_columns(&rows[header_idx]);

    let mut movements = Vec::new();
    let mut skipped = 0;
    for row in &rows[header_idx + 1..] {
        match normalize_row(row, &map) {
            Some(movement) => movements.push(movement),
            None => skipped += 1,
        }
    }

    Ok(NormalizedStatement { movements, skipped })
}

/// Scans at most the first 20 rows for a header keyword; otherwise the
/// first row with more than two non-empty cells; otherwise row 0.
pub fn detect_header(rows: &[Vec<Cell>]) -> usize {
    let keyword_hit = rows.iter().take(HEADER_SCAN_LIMIT).position(|row| {
        row.iter().any(|cell| match cell.text() {
            Some(t) => {
                let lower = t.to_lowercase();
                HEADER_KEYWORDS.iter().any(|kw| lower.contains(kw))
            }
            None => false,
        })
    });
    if let Some(idx) = keyword_hit {
        return idx;
    }

    rows.iter()
        .position(|row| row.iter().filter(|c| !c.is_empty()).count() > 2)
        .unwrap_or(0)
}

pub fn resolve_columns(header: &[Cell]) -> ColumnMap {
    ColumnMap {
        date: find_column(header, DATE_SYNONYMS),
        description: find_column(header, DESCRIPTION_SYNONYMS),
        branch: find_column(header, BRANCH_SYNONYMS),
        reference: find_column(header, REFERENCE_SYNONYMS),
        debit: find_column(header, DEBIT_SYNONYMS),
        credit: find_column(header, CREDIT_SYNONYMS),
        amount: find_column(header, AMOUNT_SYNONYMS),
        balance: find_column(header, BALANCE_SYNONYMS),
    }
}

/// Exact case-insensitive synonym match wins over substring containment,
/// so a "Cargo" column is not shadowed by "Cargos del mes" sitting to
/// its left.
fn find_column(header: &[Cell], synonyms: &[&str]) -> Option<usize> {
    let lowered: Vec<Option<String>> = header
        .iter()
        .map(|c| c.text().map(|t| t.trim().to_lowercase()))
        .collect();

    for (i, cell) in lowered.iter().enumerate() {
        if let Some(t) = cell {
            if synonyms.iter().any(|s| t == s) {
                return Some(i);
            }
        }
    }
    for (i, cell) in lowered.iter().enumerate() {
        if let Some(t) = cell {
            if synonyms.iter().any(|s| t.contains(s)) {
                return Some(i);
            }
        }
    }
    None
}

/// A row survives only with a parseable date and either a non-zero
/// amount or a non-empty operation reference.
fn normalize_row(row: &[Cell], map: &ColumnMap) -> Option<NewMovement> {
    let date = cell_at(row, map.date).and_then(parse_date_cell)?;

    let description = string_at(row, map.description);
    let branch = string_at(row, map.branch);
    let reference = string_at(row, map.reference);
    let amount = resolve_amount(row, map);
    let balance = cell_at(row, map.balance).and_then(parse_amount_cell);

    if amount.is_zero() && reference.is_empty() {
        return None;
    }

    Some(NewMovement {
        date,
        description,
        branch,
        reference,
        amount,
        balance,
    })
}

/// A generic amount column is authoritative when it parses to a
/// non-zero value; otherwise the amount is credit − debit (absolute
/// values), so inflows come out positive and outflows negative.
fn resolve_amount(row: &[Cell], map: &ColumnMap) -> Money {
    if let Some(value) = cell_at(row, map.amount).and_then(parse_amount_cell) {
        if !value.is_zero() {
            return value;
        }
    }

    let debit = cell_at(row, map.debit)
        .and_then(parse_amount_cell)
        .unwrap_or_else(Money::zero);
    let credit = cell_at(row, map.credit)
        .and_then(parse_amount_cell)
        .unwrap_or_else(Money::zero);

    credit.abs() - debit.abs()
}

fn cell_at<'a>(row: &'a [Cell], col: Option<usize>) -> Option<&'a Cell> {
    col.and_then(|i| row.get(i))
}

fn string_at(row: &[Cell], col: Option<usize>) -> String {
    match cell_at(row, col) {
        Some(Cell::Text(t)) => t.trim().to_string(),
        // References sometimes arrive as numeric cells.
        Some(Cell::Number(f)) if f.fract() == 0.0 => format!("{}", *f as i64),
        Some(Cell::Number(f)) => format!("{f}"),
        _ => String::new(),
    }
}

fn parse_amount_cell(cell: &Cell) -> Option<Money> {
    match cell {
        Cell::Number(f) => Decimal::try_from(*f).ok().map(Money::from_decimal),
        Cell::Text(t) => parse_amount_str(t),
        Cell::Empty => None,
    }
}

/// Strips currency symbols and thousands separators (space, dot, tab)
/// and converts a decimal comma to a point: "$ 1.234.567,89" → 1234567.89.
fn parse_amount_str(s: &str) -> Option<Money> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ' ' | '.' | '\t'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok().map(Money::from_decimal)
}

fn parse_date_cell(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Number(serial) => date_from_serial(*serial),
        Cell::Text(t) => parse_date_str(t),
        Cell::Empty => None,
    }
}

/// Spreadsheet date serials count days from the 1899-12-30 epoch.
fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if serial < 1.0 || serial > 200_000.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial as u64))
}

/// Accepts `YYYY-MM-DD` / `YYYY/MM/DD` and the day-first `DD-MM-YYYY` /
/// `DD/MM/YYYY` common in Chilean exports.
fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let s = s.split_whitespace().next()?;
    let normalized = s.replace('/', "-");
    let parts: Vec<&str> = normalized.split('-').collect();
    if parts.len() != 3 {
        return None;
    }

    let (y, m, d) = if parts[0].len() == 4 {
        (parts[0], parts[1], parts[2])
    } else if parts[2].len() == 4 {
        (parts[2], parts[1], parts[0])
    } else {
        return None;
    };

    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Cell::Empty
                } else {
                    text(s)
                }
            })
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── amount parsing ────────────────────────────────────────────────────────

    #[test]
    fn parse_amount_plain() {
        assert_eq!(parse_amount_str("120000").unwrap(), Money::from_cents(12_000_000));
    }

    #[test]
    fn parse_amount_chilean_locale() {
        assert_eq!(
            parse_amount_str("$ 1.234.567,89").unwrap(),
            Money::from_decimal(Decimal::from_str("1234567.89").unwrap())
        );
    }

    #[test]
    fn parse_amount_negative() {
        assert_eq!(parse_amount_str("-15000").unwrap(), Money::from_cents(-1_500_000));
    }

    #[test]
    fn parse_amount_garbage_and_empty() {
        assert!(parse_amount_str("s/i").is_none());
        assert!(parse_amount_str("").is_none());
        assert!(parse_amount_str("   ").is_none());
    }

    // ── date parsing ──────────────────────────────────────────────────────────

    #[test]
    fn parse_date_iso_and_slash() {
        assert_eq!(parse_date_str("2024-01-05").unwrap(), date(2024, 1, 5));
        assert_eq!(parse_date_str("2024/01/05").unwrap(), date(2024, 1, 5));
    }

    #[test]
    fn parse_date_day_first() {
        assert_eq!(parse_date_str("05-01-2024").unwrap(), date(2024, 1, 5));
        assert_eq!(parse_date_str("05/01/2024").unwrap(), date(2024, 1, 5));
    }

    #[test]
    fn parse_date_with_time_suffix() {
        assert_eq!(parse_date_str("2024-01-05 10:32").unwrap(), date(2024, 1, 5));
    }

    #[test]
    fn parse_date_invalid() {
        assert!(parse_date_str("sin fecha").is_none());
        assert!(parse_date_str("05-01").is_none());
    }

    #[test]
    fn date_serial_epoch() {
        assert_eq!(date_from_serial(45292.0).unwrap(), date(2024, 1, 1));
        assert!(date_from_serial(0.0).is_none());
    }

    // ── header detection ──────────────────────────────────────────────────────

    #[test]
    fn header_found_by_keyword_beyond_preamble() {
        let rows = vec![
            row(&["Cartola Histórica"]),
            row(&["Cuenta", "000-123"]),
            row(&[]),
            row(&["Fecha Valuta", "Detalle", "Monto Abono"]),
        ];
        assert_eq!(detect_header(&rows), 3);
    }

    #[test]
    fn header_falls_back_to_wide_row() {
        let rows = vec![
            row(&["x"]),
            row(&["a", "b", "c", "d"]),
            row(&["1", "2", "3", "4"]),
        ];
        assert_eq!(detect_header(&rows), 1);
    }

    #[test]
    fn header_falls_back_to_row_zero() {
        let rows = vec![row(&["a", "b"]), row(&["c"])];
        assert_eq!(detect_header(&rows), 0);
    }

    // ── column resolution ─────────────────────────────────────────────────────

    #[test]
    fn exact_synonym_beats_containment() {
        let header = row(&["Total Cargos del Periodo", "Cargo", "Abono"]);
        let map = resolve_columns(&header);
        assert_eq!(map.debit, Some(1));
        assert_eq!(map.credit, Some(2));
    }

    #[test]
    fn containment_used_when_no_exact_match() {
        let header = row(&["Fecha Valuta", "Detalle Movimiento", "Monto Cheque o Cargo"]);
        let map = resolve_columns(&header);
        assert_eq!(map.date, Some(0));
        assert_eq!(map.description, Some(1));
        assert_eq!(map.debit, Some(2));
    }

    // ── full normalization ────────────────────────────────────────────────────

    #[test]
    fn normalize_debit_row_is_negative() {
        let rows = vec![
            row(&["Fecha", "Descripcion", "Cargo", "Abono"]),
            row(&["2024-01-05", "Pago Proveedor X", "120000", "0"]),
        ];
        let result = normalize(&rows).unwrap();
        assert_eq!(result.skipped, 0);
        assert_eq!(result.movements.len(), 1);
        let m = &result.movements[0];
        assert_eq!(m.date, date(2024, 1, 5));
        assert_eq!(m.description, "Pago Proveedor X");
        assert_eq!(m.amount, Money::from_cents(-12_000_000));
    }

    #[test]
    fn normalize_credit_minus_debit_sign_convention() {
        let rows = vec![
            row(&["Fecha", "Cargo", "Abono"]),
            row(&["2024-01-05", "15000", "0"]),
            row(&["2024-01-06", "0", "80000"]),
        ];
        let result = normalize(&rows).unwrap();
        assert_eq!(result.movements[0].amount, Money::from_cents(-1_500_000));
        assert_eq!(result.movements[1].amount, Money::from_cents(8_000_000));
    }

    #[test]
    fn generic_amount_column_wins_when_nonzero() {
        let rows = vec![
            row(&["Fecha", "Monto", "Cargo", "Abono"]),
            row(&["2024-01-05", "-45000", "99999", "0"]),
        ];
        let result = normalize(&rows).unwrap();
        assert_eq!(result.movements[0].amount, Money::from_cents(-4_500_000));
    }

    #[test]
    fn zero_generic_amount_falls_back_to_debit_credit() {
        let rows = vec![
            row(&["Fecha", "Monto", "Cargo", "Abono"]),
            row(&["2024-01-05", "0", "30000", "0"]),
        ];
        let result = normalize(&rows).unwrap();
        assert_eq!(result.movements[0].amount, Money::from_cents(-3_000_000));
    }

    #[test]
    fn rows_without_date_or_substance_are_skipped() {
        let rows = vec![
            row(&["Fecha", "Monto", "Referencia"]),
            row(&["", "1000", "OP-1"]),       // no date
            row(&["2024-01-05", "0", ""]),    // zero amount, no reference
            row(&["2024-01-06", "0", "OP-2"]), // zero amount but referenced
        ];
        let result = normalize(&rows).unwrap();
        assert_eq!(result.skipped, 2);
        assert_eq!(result.movements.len(), 1);
        assert_eq!(result.movements[0].reference, "OP-2");
    }

    #[test]
    fn numeric_reference_cell_becomes_text() {
        let rows = vec![
            row(&["Fecha", "Monto", "Nro Doc"]),
            vec![text("2024-01-05"), text("5000"), Cell::Number(789456.0)],
        ];
        let result = normalize(&rows).unwrap();
        assert_eq!(result.movements[0].reference, "789456");
    }

    #[test]
    fn balance_column_is_captured() {
        let rows = vec![
            row(&["Fecha", "Monto", "Saldo"]),
            row(&["2024-01-05", "5000", "1.250.000"]),
        ];
        let result = normalize(&rows).unwrap();
        assert_eq!(
            result.movements[0].balance,
            Some(Money::from_cents(125_000_000))
        );
    }

    #[test]
    fn empty_grid_is_an_error() {
        let empty: Vec<Vec<Cell>> = vec![];
        assert!(matches!(normalize(&empty), Err(NormalizeError::EmptyInput)));

        let blank = vec![vec![Cell::Empty, Cell::Empty], vec![]];
        assert!(matches!(normalize(&blank), Err(NormalizeError::EmptyInput)));
    }
}
