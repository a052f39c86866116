//! Database migrations
//!
//! Versioned SQLite schema for the entity graph and the passage index.
//! Each migration runs in its own transaction together with its `_migrations`
//! row, so a failed step leaves the previous version intact.

use sqlx::SqlitePool;

/// One schema step
struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "entity graph",
        sql: r#"
            -- One collection per 3D model
            CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                subject TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            -- Parts; membership is the collection_id column
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                external_id TEXT UNIQUE,
                description TEXT,
                collection_id TEXT REFERENCES collections(id) ON DELETE CASCADE,
                UNIQUE (collection_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_entities_collection ON entities(collection_id);

            CREATE TABLE IF NOT EXISTS labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL CHECK (kind IN ('function', 'process')),
                name TEXT NOT NULL,
                UNIQUE (kind, name)
            );

            -- PERFORMS for function labels, PART_OF for process labels
            CREATE TABLE IF NOT EXISTS entity_labels (
                entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
                PRIMARY KEY (entity_id, label_id)
            );

            CREATE INDEX IF NOT EXISTS idx_entity_labels_label ON entity_labels(label_id);

            -- CONNECTS_TO, directed
            CREATE TABLE IF NOT EXISTS entity_links (
                source_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                target_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                PRIMARY KEY (source_id, target_id)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "passage index",
        sql: r#"
            CREATE TABLE IF NOT EXISTS passages (
                id TEXT PRIMARY KEY NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_passages_dimensions ON passages(dimensions);
        "#,
    },
];

/// Latest schema version
pub const CURRENT_VERSION: i32 = 2;

/// Schema version recorded in the database, creating the bookkeeping table if needed
async fn applied_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the recorded version
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let from = applied_version(pool).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();

    if pending.is_empty() {
        tracing::debug!(version = from, "Database schema is up to date");
        return Ok(());
    }

    for migration in pending {
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying database migration"
        );

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    tracing::info!(from = from, to = CURRENT_VERSION, "Database migrations completed");
    Ok(())
}

/// Recorded and latest schema versions
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = applied_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[test]
    fn test_versions_are_sequential() {
        for (idx, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, idx as i32 + 1, "{}", migration.name);
        }
        assert_eq!(MIGRATIONS.last().map(|m| m.version), Some(CURRENT_VERSION));
    }

    #[tokio::test]
    async fn test_fresh_database_migrates_to_latest() {
        let pool = pool().await;

        let before = migration_status(&pool).await.unwrap();
        assert_eq!(before.current_version, 0);
        assert!(before.needs_migration);

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let after = migration_status(&pool).await.unwrap();
        assert_eq!(after.current_version, CURRENT_VERSION);
        assert!(!after.needs_migration);

        let recorded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(recorded, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_schema_constraints() {
        let pool = pool().await;
        run_migrations(&pool).await.unwrap();

        let bad_kind = sqlx::query("INSERT INTO labels (kind, name) VALUES ('color', 'Red')")
            .execute(&pool)
            .await;
        assert!(bad_kind.is_err());

        sqlx::query("INSERT INTO collections (id, name) VALUES ('jet', 'Jet Engine')")
            .execute(&pool)
            .await
            .unwrap();
        let insert = "INSERT INTO entities (name, collection_id) VALUES ('Engine Mount', 'jet')";
        sqlx::query(insert).execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).execute(&pool).await.is_err());

        let passages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(passages, 0);
    }
}
