pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt_secret: String,
    pub config: Config,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for String {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_secret.clone()
    }
}

/// Marker wrapper so the snapshot-cache write toggle can be extracted via
/// `FromRef` without colliding with any other `bool` a future state field
/// might need.
#[derive(Clone, Copy)]
pub struct LedgerSnapshotOnWrite(pub bool);

impl FromRef<AppState> for LedgerSnapshotOnWrite {
    fn from_ref(state: &AppState) -> Self {
        LedgerSnapshotOnWrite(state.config.ledger_snapshot_on_write)
    }
}
