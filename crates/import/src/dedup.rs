use std::collections::HashSet;

use cuadra_core::NewMovement;

/// Outcome of sieving a normalized statement against the persisted
/// ledger.
#[derive(Debug, Clone, Default)]
pub struct ImportPartition {
    /// Rows to persist, already in insertion order: the parse order is
    /// reversed so the store's monotonic sequence assigns the highest
    /// numbers to the most recent movements.
    pub to_insert: Vec<NewMovement>,
    pub duplicate_count: usize,
}

/// A row is a duplicate iff its operation reference is non-empty and
/// already persisted (or repeated earlier in the same batch, which
/// would otherwise trip the store's unique index). Rows without a
/// reference always insert: a missed duplicate beats silently dropping
/// a real movement.
pub fn partition_new(rows: Vec<NewMovement>, existing: &HashSet<String>) -> ImportPartition {
    let mut seen: HashSet<String> = HashSet::new();
    let mut fresh = Vec::new();
    let mut duplicate_count = 0;

    for row in rows {
        if !row.reference.is_empty()
            && (existing.contains(&row.reference) || !seen.insert(row.reference.clone()))
        {
            duplicate_count += 1;
        } else {
            fresh.push(row);
        }
    }

    fresh.reverse();
    ImportPartition {
        to_insert: fresh,
        duplicate_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cuadra_core::Money;

    fn movement(reference: &str, cents: i64) -> NewMovement {
        NewMovement {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            description: "mov".to_string(),
            branch: String::new(),
            reference: reference.to_string(),
            amount: Money::from_cents(cents),
            balance: None,
        }
    }

    fn refs(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn known_references_are_filtered_out() {
        let rows = vec![movement("OP-1", 100), movement("OP-2", 200)];
        let result = partition_new(rows, &refs(&["OP-1"]));
        assert_eq!(result.duplicate_count, 1);
        assert_eq!(result.to_insert.len(), 1);
        assert_eq!(result.to_insert[0].reference, "OP-2");
    }

    #[test]
    fn reimport_of_fully_referenced_file_is_idempotent() {
        let rows = vec![movement("OP-1", 100), movement("OP-2", 200)];
        let result = partition_new(rows, &refs(&["OP-1", "OP-2"]));
        assert_eq!(result.duplicate_count, 2);
        assert!(result.to_insert.is_empty());
    }

    #[test]
    fn unreferenced_rows_always_insert() {
        let rows = vec![movement("", 100), movement("", 100)];
        let result = partition_new(rows, &refs(&[]));
        assert_eq!(result.duplicate_count, 0);
        assert_eq!(result.to_insert.len(), 2);
    }

    #[test]
    fn in_batch_repeats_count_as_duplicates() {
        let rows = vec![movement("OP-1", 100), movement("OP-1", 100)];
        let result = partition_new(rows, &refs(&[]));
        assert_eq!(result.duplicate_count, 1);
        assert_eq!(result.to_insert.len(), 1);
    }

    #[test]
    fn insertion_order_is_reversed() {
        let rows = vec![
            movement("OP-3", 300), // most recent, first in the file
            movement("OP-2", 200),
            movement("OP-1", 100),
        ];
        let result = partition_new(rows, &refs(&[]));
        let order: Vec<&str> = result
            .to_insert
            .iter()
            .map(|m| m.reference.as_str())
            .collect();
        assert_eq!(order, vec!["OP-1", "OP-2", "OP-3"]);
    }
}
