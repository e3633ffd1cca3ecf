use std::collections::HashMap;

use super::record::DebtorRecord;

/// Two-level mapping: creditor id -> debtor id -> debtor record.
pub type CreditorMap = HashMap<String, HashMap<String, DebtorRecord>>;

pub(super) fn has_creditor(map: &CreditorMap, creditor: &str) -> bool {
    map.contains_key(creditor)
}

pub(super) fn has_debtor(map: &CreditorMap, creditor: &str, debtor: &str) -> bool {
    map.get(creditor)
        .map(|debtors| debtors.contains_key(debtor))
        .unwrap_or(false)
}

/// Idempotent creation: ensures `map[creditor][debtor]` exists and returns it.
pub(super) fn ensure_debtor<'a>(
    map: &'a mut CreditorMap,
    creditor: &str,
    debtor: &str,
) -> &'a mut DebtorRecord {
    map.entry(creditor.to_string())
        .or_default()
        .entry(debtor.to_string())
        .or_insert_with(DebtorRecord::new)
}

/// Ensures both `map[a][b]` and `map[b][a]` exist (invariant 1: symmetric
/// presence).
pub(super) fn ensure_two_way_relation(map: &mut CreditorMap, a: &str, b: &str) {
    ensure_debtor(map, a, b);
    ensure_debtor(map, b, a);
}

/// Looks up `map[creditor][debtor]` for mutation. Both sides are expected to
/// already exist (via `ensure_two_way_relation`); a missing creditor or
/// debtor at this point is a programmer error, not a recoverable condition.
pub(super) fn debtor_mut<'a>(
    map: &'a mut CreditorMap,
    creditor: &str,
    debtor: &str,
) -> &'a mut DebtorRecord {
    map.get_mut(creditor)
        .unwrap_or_else(|| panic!("ledger: missing creditor {creditor:?}"))
        .get_mut(debtor)
        .unwrap_or_else(|| panic!("ledger: missing debtor {debtor:?} under creditor {creditor:?}"))
}

/// Read-only lookup. A missing creditor is a programmer error (the caller is
/// expected to know which creditors exist); a missing debtor under an
/// existing creditor is a legitimate absent relationship and is returned as
/// `None`, distinct from `Some` record with `owes == 0`.
pub(super) fn get_debtor<'a>(
    map: &'a CreditorMap,
    creditor: &str,
    debtor: &str,
) -> Option<&'a DebtorRecord> {
    let debtors = map
        .get(creditor)
        .unwrap_or_else(|| panic!("ledger: missing creditor {creditor:?}"));
    debtors.get(debtor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_two_way_relation_creates_both_sides_empty() {
        let mut map = CreditorMap::new();
        ensure_two_way_relation(&mut map, "A", "B");
        assert!(has_debtor(&map, "A", "B"));
        assert!(has_debtor(&map, "B", "A"));
        assert_eq!(get_debtor(&map, "A", "B").unwrap().owes, 0);
        assert!(get_debtor(&map, "A", "B").unwrap().debts.is_empty());
    }

    #[test]
    fn get_debtor_returns_none_for_absent_relation_under_existing_creditor() {
        let mut map = CreditorMap::new();
        ensure_debtor(&mut map, "A", "B");
        assert!(has_creditor(&map, "A"));
        assert!(get_debtor(&map, "A", "C").is_none());
    }

    #[test]
    #[should_panic(expected = "missing creditor")]
    fn get_debtor_panics_on_missing_creditor() {
        let map = CreditorMap::new();
        get_debtor(&map, "A", "B");
    }
}
