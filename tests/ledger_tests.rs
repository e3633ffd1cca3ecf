use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    Router,
};
use bonscompte_backend::{
    auth::{jwt, middleware::JwtSecret},
    config::Config,
    db, services, AppState,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

/// Sets up an in-memory project with two regular participants and runs
/// migrations, returning (pool, project_id, participant_a_id, participant_b_id).
async fn setup_project() -> (SqlitePool, i64, i64, i64) {
    let pool = db::init_pool("sqlite::memory:")
        .await
        .expect("failed to create test database pool");
    db::run_migrations(&pool).await.expect("failed to run migrations");

    let user_result =
        sqlx::query("INSERT INTO users (username, password_hash) VALUES ('owner', 'hash')")
            .execute(&pool)
            .await
            .unwrap();
    let user_id = user_result.last_insert_rowid();

    let project_result = sqlx::query("INSERT INTO projects (name, created_by) VALUES ('Trip', ?)")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();
    let project_id = project_result.last_insert_rowid();

    let alice_result =
        sqlx::query("INSERT INTO participants (project_id, name) VALUES (?, 'Alice')")
            .bind(project_id)
            .execute(&pool)
            .await
            .unwrap();
    let alice_id = alice_result.last_insert_rowid();

    let bob_result = sqlx::query("INSERT INTO participants (project_id, name) VALUES (?, 'Bob')")
        .bind(project_id)
        .execute(&pool)
        .await
        .unwrap();
    let bob_id = bob_result.last_insert_rowid();

    (pool, project_id, alice_id, bob_id)
}

async fn insert_expense(
    pool: &SqlitePool,
    project_id: i64,
    payer_id: i64,
    amount: f64,
    contributors: &[(i64, f64)],
) -> i64 {
    let payment_result = sqlx::query(
        "INSERT INTO payments (project_id, payer_id, amount, description) VALUES (?, ?, ?, 'expense')",
    )
    .bind(project_id)
    .bind(payer_id)
    .bind(amount)
    .execute(pool)
    .await
    .unwrap();
    let payment_id = payment_result.last_insert_rowid();

    for (participant_id, share) in contributors {
        sqlx::query(
            "INSERT INTO contributions (participant_id, payment_id, amount) VALUES (?, ?, ?)",
        )
        .bind(participant_id)
        .bind(payment_id)
        .bind(share)
        .execute(pool)
        .await
        .unwrap();
    }

    payment_id
}

#[tokio::test]
async fn ledger_for_project_nets_a_single_expense() {
    let (pool, project_id, alice, bob) = setup_project().await;

    // Alice pays 20.00, Bob owes his half.
    insert_expense(&pool, project_id, alice, 20.0, &[(bob, 10.0)]).await;

    let ledger = services::ledger_for_project(&pool, project_id, false).await.unwrap();

    let record = ledger.get_debtor(&alice.to_string(), &bob.to_string()).unwrap();
    assert_eq!(record.owes, 1000);
}

#[tokio::test]
async fn ledger_for_project_nets_reciprocal_expenses_down_to_the_difference() {
    let (pool, project_id, alice, bob) = setup_project().await;

    insert_expense(&pool, project_id, alice, 20.0, &[(bob, 10.0)]).await;
    insert_expense(&pool, project_id, bob, 30.0, &[(alice, 15.0)]).await;

    let ledger = services::ledger_for_project(&pool, project_id, false).await.unwrap();

    // Bob owed Alice 10.00 from the first expense; Alice then owed Bob 15.00.
    // The pairwise netting should reduce what Bob owes Alice before flipping
    // the relationship, leaving only the 5.00 difference as Alice's debt.
    let bob_owes_alice = ledger.get_debtor(&alice.to_string(), &bob.to_string());
    let alice_owes_bob = ledger.get_debtor(&bob.to_string(), &alice.to_string());

    assert!(bob_owes_alice.is_none() || bob_owes_alice.unwrap().owes == 0);
    assert_eq!(alice_owes_bob.unwrap().owes, 500);
}

#[tokio::test]
async fn ledger_for_project_excludes_pool_participants() {
    let (pool, project_id, alice, bob) = setup_project().await;

    let pool_result = sqlx::query(
        "INSERT INTO participants (project_id, name, account_type) VALUES (?, 'Shared Pool', 'pool')",
    )
    .bind(project_id)
    .execute(&pool)
    .await
    .unwrap();
    let pool_id = pool_result.last_insert_rowid();

    // An expense paid by the pool should never create a pairwise claim.
    insert_expense(&pool, project_id, pool_id, 20.0, &[(alice, 10.0), (bob, 10.0)]).await;

    let ledger = services::ledger_for_project(&pool, project_id, false).await.unwrap();
    assert!(ledger.get_creditors().is_empty());
}

#[tokio::test]
async fn refresh_ledger_snapshot_writes_a_round_trippable_row() {
    let (pool, project_id, alice, bob) = setup_project().await;
    insert_expense(&pool, project_id, alice, 20.0, &[(bob, 10.0)]).await;

    services::refresh_ledger_snapshot(&pool, project_id).await.unwrap();

    let text: String =
        sqlx::query_scalar("SELECT ledger_text FROM ledger_snapshots WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&pool)
            .await
            .unwrap();

    let mut restored = services::ledger::Ledger::new();
    restored.from_text(&text).unwrap();
    assert_eq!(
        restored.get_debtor(&alice.to_string(), &bob.to_string()).unwrap().owes,
        1000
    );
}

#[tokio::test]
async fn draft_payments_are_excluded_unless_requested() {
    let (pool, project_id, alice, bob) = setup_project().await;
    let payment_id = insert_expense(&pool, project_id, alice, 20.0, &[(bob, 10.0)]).await;
    sqlx::query("UPDATE payments SET is_final = 0 WHERE id = ?")
        .bind(payment_id)
        .execute(&pool)
        .await
        .unwrap();

    let final_only = services::ledger_for_project(&pool, project_id, false).await.unwrap();
    assert!(final_only.get_creditors().is_empty());

    let with_drafts = services::ledger_for_project(&pool, project_id, true).await.unwrap();
    assert_eq!(
        with_drafts
            .get_debtor(&alice.to_string(), &bob.to_string())
            .unwrap()
            .owes,
        1000
    );
}

/// Mirrors `main.rs`'s `inject_extensions` middleware: the `ProjectMember`
/// extractor reads the JWT secret and database pool out of request
/// extensions rather than out of app state directly.
async fn inject_extensions(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: middleware::Next,
) -> axum::response::Response {
    request
        .extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    request.extensions_mut().insert(state.pool.clone());
    next.run(request).await
}

/// Builds the `/projects/{id}/debts` slice of the real router, nested the
/// same way `main.rs` nests it under `/projects/{id}`.
fn build_app(state: AppState) -> Router {
    let project_routes =
        Router::new().nest("/debts", bonscompte_backend::routes::debts::router());

    Router::new()
        .nest("/projects/{id}", project_routes)
        .layer(middleware::from_fn_with_state(state.clone(), inject_extensions))
        .with_state(state)
}

#[tokio::test]
async fn audit_endpoint_returns_both_directions_via_the_real_router() {
    let (pool, project_id, alice, bob) = setup_project().await;

    // Alice pays 20.00 (Bob's half is 10.00), then Bob pays 30.00 (Alice's
    // half is 15.00): netting leaves Bob's side fully paid down and Alice
    // owing Bob the 5.00 difference.
    insert_expense(&pool, project_id, alice, 20.0, &[(bob, 10.0)]).await;
    insert_expense(&pool, project_id, bob, 30.0, &[(alice, 15.0)]).await;

    let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = 'owner'")
        .fetch_one(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO project_members (project_id, user_id, role) VALUES (?, ?, 'admin')")
        .bind(project_id)
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

    let jwt_secret = "test-secret-key-for-testing".to_string();
    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: jwt_secret.clone(),
        host: "127.0.0.1".to_string(),
        port: 8000,
        max_projects_per_user: None,
        ledger_snapshot_on_write: true,
    };
    let app = build_app(AppState {
        pool: pool.clone(),
        jwt_secret: jwt_secret.clone(),
        config,
    });

    let token = jwt::create_token(user_id, "owner", &jwt_secret).unwrap();

    let uri = format!("/projects/{project_id}/debts/audit/{alice}/{bob}");
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap();

    assert_eq!(body["participant_id"], alice);
    assert_eq!(body["other_id"], bob);

    // What Bob (other) owes Alice (participant): fully netted to zero, but
    // the paid-down history — exactly what this endpoint exists to
    // surface — is still present.
    assert_eq!(body["other_owes_participant"]["owes"], 0);
    assert!(
        !body["other_owes_participant"]["debts"]
            .as_array()
            .unwrap()
            .is_empty()
    );

    // What Alice (participant) owes Bob (other): the 5.00 remainder.
    assert_eq!(body["participant_owes_other"]["owes"], 500);
}
