//! Incremental pairwise debt netting engine.
//!
//! Each call to [`Ledger::add`] folds a new claim from one participant
//! against any opposing outstanding claims between the same pair, so that at
//! most one side of a pair ever owes a non-zero balance. The per-expense
//! audit trail (which claims were offset against which, and when) is kept in
//! full — nothing is ever deleted, only appended to.
//!
//! This module is synchronous, performs no I/O, and holds no global state:
//! every [`Ledger`] is an independent, plain value. Multi-hop simplification
//! across three or more parties, currency conversion, persistence, and
//! concurrent writers are out of scope; see the surrounding service layer for
//! how a caller wires real payments into `add`.

mod error;
mod record;
mod search;
mod serialize;
mod simplify;
mod store;

pub use error::LedgerError;
pub use record::{Debt, DebtorRecord, HistoryEntry};
pub use store::CreditorMap;

use std::collections::HashMap;

/// An in-process pairwise debt ledger keyed by participant identifier.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    creditors: CreditorMap,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            creditors: HashMap::new(),
        }
    }

    /// Records a new claim: `creditor` is owed `amount` by `debtor`, booked
    /// under `expense_id`. The claim is immediately netted against any
    /// outstanding opposing claims between the same pair.
    ///
    /// `amount` is expected to be positive; `amount <= 0` is treated as a
    /// no-op that still ensures symmetric presence between the pair, per
    /// spec §6/§9. Reusing an `expense_id` already present on this side of
    /// the pair appends another history entry to the existing debt rather
    /// than creating a new one — a choice the spec leaves undefined beyond
    /// that append-adjustment semantics.
    pub fn add(&mut self, creditor: &str, debtor: &str, amount: i64, expense_id: i64) {
        store::ensure_two_way_relation(&mut self.creditors, creditor, debtor);
        if amount > 0 {
            store::debtor_mut(&mut self.creditors, creditor, debtor).upsert(
                expense_id,
                expense_id,
                amount,
            );
            simplify::simplify(&mut self.creditors, creditor, debtor);
        }
    }

    /// Read-only view of the full two-level ledger.
    pub fn get_creditors(&self) -> &CreditorMap {
        &self.creditors
    }

    /// Looks up the debtor record between an ordered pair, if the pair has
    /// ever been referenced. Panics if `creditor` itself is unknown — see
    /// [`store::get_debtor`]'s doc comment for the reasoning.
    pub fn get_debtor(&self, creditor: &str, debtor: &str) -> Option<&DebtorRecord> {
        store::get_debtor(&self.creditors, creditor, debtor)
    }

    /// Serializes the full ledger to a self-describing textual form.
    pub fn to_text(&self) -> String {
        serialize::to_text(&self.creditors)
    }

    /// Replaces this ledger's state with the one encoded in `text`. On
    /// failure the ledger is left untouched.
    pub fn from_text(&mut self, text: &str) -> Result<(), LedgerError> {
        self.creditors = serialize::from_text(text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ledger_has_no_creditors() {
        let ledger = Ledger::new();
        assert!(ledger.get_creditors().is_empty());
    }

    #[test]
    fn add_ensures_symmetric_presence_even_with_zero_amount() {
        let mut ledger = Ledger::new();
        ledger.add("A", "B", 0, 0);
        assert_eq!(ledger.get_debtor("A", "B").unwrap().owes, 0);
        assert_eq!(ledger.get_debtor("B", "A").unwrap().owes, 0);
    }

    #[test]
    fn scalar_agreement_holds_after_a_run_of_adds() {
        let mut ledger = Ledger::new();
        ledger.add("A", "B", 10, 0);
        ledger.add("A", "B", 5, 1);
        ledger.add("B", "A", 7, 2);
        ledger.add("A", "B", 12, 3);
        ledger.add("B", "A", 3, 4);

        for (creditor, debtor) in [("A", "B"), ("B", "A")] {
            let record = ledger.get_debtor(creditor, debtor).unwrap();
            let sum: i64 = record.debts.iter().map(|d| d.current_amount()).sum();
            assert_eq!(record.owes, sum, "P1 violated for {creditor}->{debtor}");
            for debt in &record.debts {
                assert!(debt.current_amount() >= 0, "P2 violated");
            }
        }
    }

    #[test]
    fn pair_exclusivity_holds_after_every_add() {
        let mut ledger = Ledger::new();
        let ops: &[(&str, &str, i64, i64)] = &[
            ("A", "B", 10, 0),
            ("A", "B", 5, 1),
            ("A", "C", 5, 2),
            ("B", "A", 7, 3),
            ("B", "A", 3, 4),
            ("C", "B", 10, 5),
            ("C", "A", 10, 6),
        ];
        for (c, d, amount, id) in ops {
            ledger.add(c, d, *amount, *id);
            let forward = ledger.get_debtor(c, d).unwrap().owes;
            let backward = ledger.get_debtor(d, c).unwrap().owes;
            assert!(forward == 0 || backward == 0, "P3 violated for {c}/{d}");
        }
    }
}
