use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{auth::ProjectMember, error::AppResult, services::DebtSummary, AppState};

#[derive(Deserialize)]
struct DebtsQuery {
    date: Option<String>,
    include_drafts: Option<bool>,
}

#[derive(Deserialize)]
struct AuditPath {
    #[allow(dead_code)]
    id: i64,
    participant_id: i64,
    other_id: i64,
}

#[derive(Deserialize)]
struct AuditQuery {
    include_drafts: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AuditHistoryEntry {
    expense_id: i64,
    grants: i64,
    amount: i64,
}

#[derive(Debug, Serialize)]
struct AuditDebt {
    expense_id: i64,
    history: Vec<AuditHistoryEntry>,
}

#[derive(Debug, Serialize)]
struct AuditSide {
    /// What the debtor side of this record owes the creditor side, in
    /// minor units (cents).
    owes: i64,
    debts: Vec<AuditDebt>,
}

#[derive(Debug, Serialize)]
struct AuditResponse {
    participant_id: i64,
    other_id: i64,
    /// What `other_id` owes `participant_id`.
    other_owes_participant: AuditSide,
    /// What `participant_id` owes `other_id` — per spec.md's pair
    /// exclusivity invariant at most one of these two sides is ever
    /// non-zero, but the zero side can still carry a fully-paid-down
    /// history that is exactly what this endpoint exists to surface.
    participant_owes_other: AuditSide,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_debts))
        .route("/audit/{participant_id}/{other_id}", get(get_audit))
}

async fn get_debts(
    member: ProjectMember,
    State(pool): State<SqlitePool>,
    Query(query): Query<DebtsQuery>,
) -> AppResult<Json<DebtSummary>> {
    let include_drafts = query.include_drafts.unwrap_or(false);

    let summary = match query.date {
        Some(target_date) => {
            crate::services::calculate_debts_at_date(
                &pool,
                member.project_id,
                &target_date,
                include_drafts,
            )
            .await?
        }
        None => crate::services::calculate_debts(&pool, member.project_id, include_drafts).await?,
    };
    Ok(Json(summary))
}

/// Returns the full append-only offset history between an ordered pair of
/// participants, as kept by the pairwise ledger — not just the current net
/// amount. Useful for auditing how a balance came to be what it is.
async fn get_audit(
    member: ProjectMember,
    State(pool): State<SqlitePool>,
    Path(path): Path<AuditPath>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditResponse>> {
    let include_drafts = query.include_drafts.unwrap_or(false);
    let ledger =
        crate::services::ledger_for_project(&pool, member.project_id, include_drafts).await?;

    let participant_id = path.participant_id.to_string();
    let other_id = path.other_id.to_string();

    // The pair may never have shown up in any payment at all, which is not
    // the same as the ledger's "creditor known, debtor absent" case — guard
    // against it here rather than relying on get_debtor's panic-on-missing
    // behavior, which assumes an internally-consistent caller.
    let lookup = |creditor: &str, debtor: &str| {
        if ledger.get_creditors().contains_key(creditor) {
            ledger.get_debtor(creditor, debtor)
        } else {
            None
        }
    };

    let to_side = |record: Option<&crate::services::ledger::DebtorRecord>| match record {
        Some(record) => AuditSide {
            owes: record.owes,
            debts: record
                .debts
                .iter()
                .map(|d| AuditDebt {
                    expense_id: d.expense_id,
                    history: d
                        .history
                        .iter()
                        .map(|h| AuditHistoryEntry {
                            expense_id: h.expense_id,
                            grants: h.grants,
                            amount: h.amount,
                        })
                        .collect(),
                })
                .collect(),
        },
        None => AuditSide {
            owes: 0,
            debts: Vec::new(),
        },
    };

    // Both directions of the pair: the spec's pair-exclusivity invariant
    // only says at most one side's `owes` is non-zero, not that the zero
    // side has no history — a fully offset debt still belongs in the audit.
    //
    // `ledger.get_debtor(creditor, debtor)` holds what `debtor` owes
    // `creditor` (per `Ledger::add`'s "creditor is owed amount by debtor"),
    // so "what other_id owes participant_id" is looked up with
    // participant_id as creditor, other_id as debtor, and vice versa.
    let other_owes_participant = to_side(lookup(&participant_id, &other_id));
    let participant_owes_other = to_side(lookup(&other_id, &participant_id));

    Ok(Json(AuditResponse {
        participant_id: path.participant_id,
        other_id: path.other_id,
        other_owes_participant,
        participant_owes_other,
    }))
}
