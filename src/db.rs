use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use crate::error::AppResult;

const MIGRATION_001: &str = include_str!("../migrations/001_initial.sql");

pub async fn connect_and_migrate(database_url: &str) -> AppResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA journal_mode=WAL".to_string(),
    ))
    .await?;

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA synchronous=NORMAL".to_string(),
    ))
    .await?;

    run_sql(&db, MIGRATION_001).await?;
    Ok(db)
}

async fn run_sql(db: &DatabaseConnection, sql: &str) -> AppResult<()> {
    for stmt in sql.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        db.execute(Statement::from_string(db.get_database_backend(), stmt.to_string())).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sea_orm::{EntityTrait, Set};

    use super::*;
    use crate::entities::graph_movie;

    #[tokio::test]
    async fn migration_creates_schema() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        for table in
            ["movies", "tv_series", "people", "movie_credits", "tv_credits", "graph_movie", "graph_tv"]
        {
            let count = db
                .query_one(Statement::from_string(
                    db.get_database_backend(),
                    format!("SELECT COUNT(*) AS n FROM {table}"),
                ))
                .await
                .unwrap();
            assert!(count.is_some(), "table {table} missing");
        }
    }

    #[tokio::test]
    async fn connects_to_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let db = connect_and_migrate(&url).await.unwrap();
        let edge = graph_movie::ActiveModel { a: Set(1), b: Set(2), e: Set(603) };
        graph_movie::Entity::insert(edge).exec(&db).await.unwrap();
        drop(db);

        // reopening sees the persisted row
        let db = connect_and_migrate(&url).await.unwrap();
        let edges = graph_movie::Entity::find().all(&db).await.unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[tokio::test]
    async fn migration_is_idempotent() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        run_sql(&db, MIGRATION_001).await.unwrap();
    }

    #[tokio::test]
    async fn graph_check_constraint_rejects_bad_edges() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();

        // self loop
        let loop_edge =
            graph_movie::ActiveModel { a: Set(7), b: Set(7), e: Set(1) };
        assert!(graph_movie::Entity::insert(loop_edge).exec(&db).await.is_err());

        // wrong order
        let reversed =
            graph_movie::ActiveModel { a: Set(9), b: Set(3), e: Set(1) };
        assert!(graph_movie::Entity::insert(reversed).exec(&db).await.is_err());

        // canonical edge is fine
        let edge = graph_movie::ActiveModel { a: Set(3), b: Set(9), e: Set(1) };
        graph_movie::Entity::insert(edge).exec(&db).await.unwrap();
    }
}
