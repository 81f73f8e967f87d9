//! Delete/undo ledger over immutable table snapshots

use crate::core::{RowId, Table};
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Append `batch` to the ledger and recompute the visible rows
///
/// Ids already deleted by an earlier batch stay deleted once. An empty batch
/// leaves the table untouched so it never becomes an undo step.
pub fn apply_deletion(table: Table, batch: impl IntoIterator<Item = RowId>) -> Table {
    let batch: BTreeSet<RowId> = batch.into_iter().collect();
    if batch.is_empty() {
        trace!(table = %table.id, "Ignoring empty deletion batch");
        return table;
    }

    let mut table = table;
    debug!(table = %table.id, rows = batch.len(), "Deleting rows");
    table.deleted_rows.push(batch);
    table.rebuild_body()
}

/// Drop the most recent batch. No-op when nothing was deleted.
pub fn undo_last(table: Table) -> Table {
    let mut table = table;
    match table.deleted_rows.pop() {
        Some(batch) => {
            debug!(table = %table.id, rows = batch.len(), "Undoing deletion");
            table.rebuild_body()
        }
        None => table,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Row, Translatable};
    use pretty_assertions::assert_eq;

    fn ids(values: &[&str]) -> Vec<RowId> {
        values.iter().map(|v| RowId::from(*v)).collect()
    }

    fn table() -> Table {
        Table::new(
            "likes",
            Translatable::new(),
            vec!["data_type".into(), "value".into()],
            vec![
                Row::new("0", vec!["TypeA".into(), "x".into()]),
                Row::new("1", vec!["TypeB".into(), "y".into()]),
                Row::new("2", vec!["TypeA".into(), "z".into()]),
            ],
        )
    }

    fn body_ids(table: &Table) -> Vec<&str> {
        table.body().iter().map(|r| r.id.as_str()).collect()
    }

    fn assert_count_invariant(table: &Table) {
        assert_eq!(
            table.deleted_row_count(),
            table.original_body().len() - table.body().len()
        );
    }

    #[test]
    fn test_delete_keeps_original_order() {
        let table = apply_deletion(table(), ids(&["1"]));
        assert_eq!(body_ids(&table), vec!["0", "2"]);
        assert_eq!(table.deleted_row_count(), 1);
        assert_eq!(table.original_body().len(), 3);
    }

    #[test]
    fn test_duplicate_ids_are_idempotent() {
        let table = apply_deletion(table(), ids(&["0", "0"]));
        let table = apply_deletion(table, ids(&["0", "2"]));

        assert_eq!(body_ids(&table), vec!["1"]);
        assert_eq!(table.deleted_row_count(), 2);
        assert_eq!(table.deleted_rows().len(), 2);
    }

    #[test]
    fn test_undo_restores_exact_body() {
        let before = apply_deletion(table(), ids(&["2"]));
        let after = undo_last(apply_deletion(before.clone(), ids(&["0", "2"])));

        assert_eq!(after.body(), before.body());
        assert_eq!(after.deleted_row_count(), before.deleted_row_count());
    }

    #[test]
    fn test_undo_on_empty_ledger_is_noop() {
        let original = table();
        let undone = undo_last(original.clone());
        assert_eq!(undone, original);
    }

    #[test]
    fn test_empty_batch_is_not_recorded() {
        let table = apply_deletion(table(), Vec::new());
        assert!(table.deleted_rows().is_empty());
        assert_eq!(table.body().len(), 3);
    }

    #[test]
    fn test_unknown_ids_do_not_change_body() {
        let table = apply_deletion(table(), ids(&["99"]));
        assert_eq!(table.body().len(), 3);
        assert_eq!(table.deleted_row_count(), 0);
    }

    #[test]
    fn test_count_invariant_over_operation_sequence() {
        let mut table = table();
        let steps: Vec<Option<Vec<RowId>>> = vec![
            Some(ids(&["0"])),
            Some(ids(&["0", "1"])),
            None,
            Some(ids(&["2"])),
            None,
            None,
            None,
            Some(ids(&["1", "2"])),
        ];
        for step in steps {
            table = match step {
                Some(batch) => apply_deletion(table, batch),
                None => undo_last(table),
            };
            assert_count_invariant(&table);
        }
        assert_eq!(body_ids(&table), vec!["0"]);
    }

    #[test]
    fn test_end_to_end_delete_then_undo() {
        let table = Table::new(
            "t",
            Translatable::new(),
            vec!["type".into(), "value".into()],
            vec![
                Row::new("0", vec!["TypeA".into(), "x".into()]),
                Row::new("1", vec!["TypeB".into(), "y".into()]),
            ],
        );

        let deleted = apply_deletion(table, ids(&["0"]));
        assert_eq!(deleted.body(), &[Row::new("1", vec!["TypeB".into(), "y".into()])]);
        assert_eq!(deleted.deleted_row_count(), 1);

        let restored = undo_last(deleted);
        assert_eq!(body_ids(&restored), vec!["0", "1"]);
        assert_eq!(restored.deleted_row_count(), 0);
    }
}
