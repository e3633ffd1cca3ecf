use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::record::DebtorRecord;
use super::store::CreditorMap;

/// A keyed mapping tagged so it can be told apart from an ordinary record
/// when reconstituting the two-level ledger structure (spec §4.5). The entry
/// list is an ordered sequence of `[key, value]` pairs, same as `serde_json`
/// already renders a `Vec<(K, V)>`.
#[derive(Serialize, Deserialize)]
#[serde(tag = "__type", rename_all = "PascalCase")]
enum TaggedMap<V> {
    Map { entries: Vec<(String, V)> },
}

pub(super) fn to_text(map: &CreditorMap) -> String {
    let outer = TaggedMap::Map {
        entries: map
            .iter()
            .map(|(creditor, debtors)| {
                let inner = TaggedMap::Map {
                    entries: debtors
                        .iter()
                        .map(|(debtor, record)| (debtor.clone(), record.clone()))
                        .collect(),
                };
                (creditor.clone(), inner)
            })
            .collect(),
    };
    serde_json::to_string(&outer).expect("ledger text is always representable as JSON")
}

pub(super) fn from_text(s: &str) -> Result<CreditorMap, LedgerError> {
    let outer: TaggedMap<TaggedMap<DebtorRecord>> =
        serde_json::from_str(s).map_err(|e| LedgerError::Deserialize(e.to_string()))?;

    let TaggedMap::Map { entries } = outer;
    let mut result = CreditorMap::new();
    for (creditor, inner) in entries {
        let TaggedMap::Map {
            entries: inner_entries,
        } = inner;
        let mut debtors: HashMap<String, DebtorRecord> = HashMap::with_capacity(inner_entries.len());
        for (debtor, record) in inner_entries {
            debtors.insert(debtor, record);
        }
        result.insert(creditor, debtors);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::super::Ledger;

    #[test]
    fn round_trips_a_populated_ledger() {
        let mut ledger = Ledger::new();
        ledger.add("A", "B", 10, 0);
        ledger.add("A", "B", 5, 1);
        ledger.add("B", "A", 7, 2);

        let text = ledger.to_text();
        assert!(text.contains("__type"));

        let mut restored = Ledger::new();
        restored.from_text(&text).expect("valid ledger text");

        assert_eq!(restored.get_creditors(), ledger.get_creditors());
    }

    #[test]
    fn restored_ledger_keeps_behaving_under_further_adds() {
        let mut ledger = Ledger::new();
        ledger.add("A", "B", 10, 0);
        let text = ledger.to_text();

        let mut restored = Ledger::new();
        restored.from_text(&text).unwrap();
        restored.add("B", "A", 4, 1);

        assert_eq!(restored.get_debtor("A", "B").unwrap().owes, 6);
        assert_eq!(restored.get_debtor("B", "A").unwrap().owes, 0);
    }

    #[test]
    fn malformed_text_fails_without_touching_existing_state() {
        let mut ledger = Ledger::new();
        ledger.add("A", "B", 10, 0);
        let before = ledger.get_creditors().clone();

        let err = ledger.from_text("not json at all");
        assert!(err.is_err());
        assert_eq!(ledger.get_creditors(), &before);
    }

    #[test]
    fn empty_ledger_round_trips() {
        let ledger = Ledger::new();
        let text = ledger.to_text();
        let mut restored = Ledger::new();
        restored.from_text(&text).unwrap();
        assert_eq!(restored.get_creditors(), ledger.get_creditors());
    }
}
