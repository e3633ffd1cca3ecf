/// Rebuilds the `ledger_snapshots` cache table for every project by
/// replaying its payments/contributions through the pairwise ledger, and
/// checks each rebuilt ledger's `to_text`/`from_text` round-trip as a sanity
/// check on the serialization format.
///
/// Usage: cargo run --bin recalculate_ledger_snapshots
use sqlx::SqlitePool;

use bonscompte_backend::services::ledger::Ledger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "data/bonscompte.db".to_string());

    println!("Connecting to database: {}", database_url);
    let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", database_url)).await?;
    bonscompte_backend::db::run_migrations(&pool).await?;

    let project_ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM projects")
        .fetch_all(&pool)
        .await?;

    println!("Found {} projects to process", project_ids.len());

    let mut total_ok = 0;
    let mut total_errors = 0;

    for (project_id,) in project_ids {
        let ledger =
            bonscompte_backend::services::ledger_for_project(&pool, project_id, true).await?;

        let text = ledger.to_text();

        // Round-trip check: a serialized ledger must deserialize back to an
        // identical ledger, or the snapshot cache cannot be trusted later.
        let mut restored = Ledger::new();
        match restored.from_text(&text) {
            Ok(()) if restored.get_creditors() == ledger.get_creditors() => {
                sqlx::query(
                    "INSERT INTO ledger_snapshots (project_id, ledger_text, updated_at)
                     VALUES (?, ?, datetime('now'))
                     ON CONFLICT(project_id) DO UPDATE SET
                        ledger_text = excluded.ledger_text,
                        updated_at = excluded.updated_at",
                )
                .bind(project_id)
                .bind(&text)
                .execute(&pool)
                .await?;
                total_ok += 1;
            }
            Ok(()) => {
                eprintln!(
                    "Project {}: round-trip mismatch after from_text, skipping snapshot",
                    project_id
                );
                total_errors += 1;
            }
            Err(e) => {
                eprintln!("Project {}: failed to round-trip ledger text: {}", project_id, e);
                total_errors += 1;
            }
        }
    }

    println!("\nSnapshot recalculation complete!");
    println!("  Projects updated: {}", total_ok);
    println!("  Errors/skipped: {}", total_errors);

    Ok(())
}
