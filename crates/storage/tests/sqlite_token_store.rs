use course_core::model::SessionToken;
use storage::repository::{Storage, TokenStore};
use storage::sqlite::SqliteRepository;

#[tokio::test]
async fn sqlite_token_survives_reconnect() {
    let url = "sqlite:file:memdb_token_reconnect?mode=memory&cache=shared";
    let first = SqliteRepository::connect(url).await.expect("connect");
    first.migrate().await.expect("migrate");
    first
        .save(&SessionToken::new("jwt-abc"))
        .await
        .expect("save");

    // A second pool on the same shared-cache database sees the row.
    let second = Storage::sqlite(url).await.expect("reopen");
    let stored = second.tokens.load().await.expect("load").expect("token");
    assert_eq!(stored.token.expose(), "jwt-abc");
}

#[tokio::test]
async fn sqlite_keeps_a_single_slot() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_token_slot?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    repo.save(&SessionToken::new("one")).await.unwrap();
    repo.save(&SessionToken::new("two")).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_token")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(repo.load().await.unwrap().unwrap().token.expose(), "two");
}

#[tokio::test]
async fn sqlite_clear_removes_token() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_token_clear?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    // Migrations are re-runnable.
    repo.migrate().await.expect("migrate twice");

    repo.save(&SessionToken::new("gone-soon")).await.unwrap();
    repo.clear().await.unwrap();
    repo.clear().await.unwrap();
    assert!(repo.load().await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_connections_wait_on_a_busy_database() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_token_busy?mode=memory&cache=shared")
        .await
        .expect("connect");

    let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(timeout, 5000);
}
