use thiserror::Error;

/// The one recoverable failure mode of the ledger core: malformed input to
/// `from_text`. Everything else the engine can hit (a missing creditor, a
/// missing debtor where one is assumed present) is a programmer error and
/// surfaces as a panic instead, per spec §7.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("malformed ledger text: {0}")]
    Deserialize(String),
}
