use serde::{Deserialize, Serialize};

/// One atomic adjustment applied to a single debt.
///
/// `expense_id` names the *opposing* expense that caused the adjustment — for
/// a debt's very first entry it is the debt's own expense id (the initial
/// booking). `amount` is the debt's resulting current amount, not a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub expense_id: i64,
    pub grants: i64,
    pub amount: i64,
}

/// The lifetime of a single expense's claim between one ordered pair of
/// participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debt {
    pub expense_id: i64,
    pub history: Vec<HistoryEntry>,
}

impl Debt {
    pub(super) fn new(expense_id: i64) -> Self {
        Debt {
            expense_id,
            history: Vec::new(),
        }
    }

    /// The amount field of the last history entry, or zero if untouched.
    pub fn current_amount(&self) -> i64 {
        self.history.last().map(|h| h.amount).unwrap_or(0)
    }
}

/// The claim one participant holds against another: a scalar cache plus the
/// per-expense debts that back it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtorRecord {
    pub owes: i64,
    pub debts: Vec<Debt>,
}

impl DebtorRecord {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Upsert a debt transaction (spec §4.2): locate or create the debt keyed
    /// by `to_expense`, append one history entry recording `grants`, and keep
    /// `owes` in sync.
    ///
    /// The caller must choose `grants` such that `prev + grants >= 0`; the
    /// netting algorithm guarantees this by construction.
    pub(super) fn upsert(&mut self, from_expense: i64, to_expense: i64, grants: i64) {
        let debt = match self.debts.iter().position(|d| d.expense_id == to_expense) {
            Some(idx) => &mut self.debts[idx],
            None => {
                self.debts.push(Debt::new(to_expense));
                self.debts.last_mut().unwrap()
            }
        };
        let prev = debt.history.last().map(|h| h.amount).unwrap_or(0);
        let amount = prev + grants;
        debug_assert!(
            amount >= 0,
            "debt {to_expense} went negative: prev={prev} grants={grants}"
        );
        debt.history.push(HistoryEntry {
            expense_id: from_expense,
            grants,
            amount,
        });
        self.owes += grants;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_creates_debt_on_first_reference() {
        let mut rec = DebtorRecord::new();
        rec.upsert(0, 0, 10);
        assert_eq!(rec.owes, 10);
        assert_eq!(rec.debts.len(), 1);
        assert_eq!(rec.debts[0].current_amount(), 10);
        assert_eq!(rec.debts[0].history, vec![HistoryEntry { expense_id: 0, grants: 10, amount: 10 }]);
    }

    #[test]
    fn upsert_appends_to_existing_debt_with_same_expense_id() {
        let mut rec = DebtorRecord::new();
        rec.upsert(0, 0, 10);
        rec.upsert(7, 0, -4);
        assert_eq!(rec.owes, 6);
        assert_eq!(rec.debts.len(), 1);
        assert_eq!(rec.debts[0].current_amount(), 6);
        assert_eq!(
            rec.debts[0].history,
            vec![
                HistoryEntry { expense_id: 0, grants: 10, amount: 10 },
                HistoryEntry { expense_id: 7, grants: -4, amount: 6 },
            ]
        );
    }

    #[test]
    fn current_amount_of_untouched_debt_is_zero() {
        let debt = Debt::new(3);
        assert_eq!(debt.current_amount(), 0);
    }
}
