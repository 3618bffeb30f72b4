//! Merge-by-key over newest-first notification lists.
//!
//! These functions know nothing about where records came from. Pushed and
//! fetched records go through the same insert, which keeps the list sorted by
//! `created_at` descending and ignores ids it has already seen.

use std::collections::HashSet;

use super::record::NotificationRecord;

/// Inserts `record` at its newest-first position unless its id is present.
///
/// Records with an equal timestamp keep their arrival order. Returns `true`
/// when the record was inserted.
pub fn insert_sorted(records: &mut Vec<NotificationRecord>, record: NotificationRecord) -> bool {
    if records.iter().any(|r| r.id == record.id) {
        return false;
    }
    let at = records.partition_point(|r| r.created_at >= record.created_at);
    records.insert(at, record);
    true
}

/// Merges `incoming` into `records`, returning how many were new.
///
/// Known ids are left untouched, so local changes (read flags) survive.
pub fn merge_by_key(
    records: &mut Vec<NotificationRecord>,
    incoming: impl IntoIterator<Item = NotificationRecord>,
) -> usize {
    let mut added = 0;
    for record in incoming {
        if insert_sorted(records, record) {
            added += 1;
        }
    }
    added
}

/// Sorts newest-first and drops repeated ids, keeping the first occurrence.
pub fn normalize(records: Vec<NotificationRecord>) -> Vec<NotificationRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut unique: Vec<NotificationRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();
    unique.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    unique
}
