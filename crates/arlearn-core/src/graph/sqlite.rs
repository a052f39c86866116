//! SQLite implementation of the entity graph
//!
//! `HAS_PART` is the `collection_id` column, `PERFORMS` / `PART_OF` live in
//! `entity_labels` and `CONNECTS_TO` in `entity_links`.

use async_trait::async_trait;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::error::{Error, Result, StoreKind};

use super::entity::{Entity, EntityContext, Label, LabelKind};
use super::resolver::NameProbe;
use super::seed::{GraphSeed, SeedReport};
use super::store::GraphStore;

#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

fn unavailable(e: sqlx::Error) -> Error {
    Error::unavailable(StoreKind::Graph, e.to_string())
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a seed document in one transaction
    pub async fn apply_seed(&self, seed: &GraphSeed) -> Result<SeedReport> {
        seed.validate()?;

        let mut tx = self.pool.begin().await?;
        let mut report = SeedReport {
            collections: seed.collections.len(),
            ..Default::default()
        };

        for collection in &seed.collections {
            sqlx::query(
                r#"
                INSERT INTO collections (id, name, subject) VALUES (?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    subject = excluded.subject
                "#,
            )
            .bind(&collection.id)
            .bind(&collection.name)
            .bind(&collection.subject)
            .execute(&mut *tx)
            .await?;
        }

        let labels = seed.all_labels();
        report.labels = labels.len();
        for label in &labels {
            sqlx::query("INSERT OR IGNORE INTO labels (kind, name) VALUES (?, ?)")
                .bind(label.kind.as_str())
                .bind(&label.name)
                .execute(&mut *tx)
                .await?;
        }

        for (scope, entity) in seed.scoped_entities() {
            let entity_id = match find_entity_id(&mut tx, &entity.name, scope).await? {
                Some(id) => {
                    sqlx::query(
                        r#"
                        UPDATE entities SET
                            external_id = COALESCE(?, external_id),
                            description = COALESCE(?, description)
                        WHERE id = ?
                        "#,
                    )
                    .bind(&entity.external_id)
                    .bind(&entity.description)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    id
                }
                None => sqlx::query(
                    "INSERT INTO entities (name, external_id, description, collection_id) VALUES (?, ?, ?, ?)",
                )
                .bind(&entity.name)
                .bind(&entity.external_id)
                .bind(&entity.description)
                .bind(scope)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid(),
            };

            for label in entity.labels() {
                let result = sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO entity_labels (entity_id, label_id)
                    SELECT ?, id FROM labels WHERE kind = ? AND name = ?
                    "#,
                )
                .bind(entity_id)
                .bind(label.kind.as_str())
                .bind(&label.name)
                .execute(&mut *tx)
                .await?;
                report.relations += result.rows_affected() as usize;
            }
            report.entities += 1;
        }

        // Links need every entity in place first
        for (scope, entity) in seed.scoped_entities() {
            let Some(source_id) = find_entity_id(&mut tx, &entity.name, scope).await? else {
                continue;
            };
            for target in &entity.connects_to {
                let Some(target_id) = find_entity_id(&mut tx, target, scope).await? else {
                    warn!(source = %entity.name, target = %target, "Skipping link to unknown entity");
                    report.skipped_links += 1;
                    continue;
                };
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO entity_links (source_id, target_id) VALUES (?, ?)",
                )
                .bind(source_id)
                .bind(target_id)
                .execute(&mut *tx)
                .await?;
                report.relations += result.rows_affected() as usize;
            }
        }

        tx.commit().await?;

        info!(
            collections = report.collections,
            entities = report.entities,
            labels = report.labels,
            relations = report.relations,
            skipped_links = report.skipped_links,
            "Graph seed applied"
        );
        Ok(report)
    }

    pub async fn count_entities(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

async fn find_entity_id(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    scope: Option<&str>,
) -> Result<Option<i64>> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM entities WHERE name = ? AND collection_id IS ?")
            .bind(name)
            .bind(scope)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row.map(|(id,)| id))
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn entity_candidates(
        &self,
        probe: &NameProbe,
        scope: Option<&str>,
    ) -> Result<Vec<Entity>> {
        // SQLite's lower() only folds ASCII, so matching stays in Rust
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT id, name, external_id, description, collection_id
            FROM entities
            WHERE (? IS NULL OR collection_id = ?)
            "#,
        )
        .bind(scope)
        .bind(scope)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        debug!(probe = probe.normalized(), rows = rows.len(), "Scanning entity candidates");

        Ok(rows
            .into_iter()
            .map(EntityRow::into_entity)
            .filter(|entity| probe.tier(entity).is_some())
            .collect())
    }

    async fn entity_context(
        &self,
        name: &str,
        scope: Option<&str>,
    ) -> Result<Option<EntityContext>> {
        let row: Option<EntityRow> = sqlx::query_as(
            r#"
            SELECT id, name, external_id, description, collection_id
            FROM entities
            WHERE name = ? AND (? IS NULL OR collection_id = ?)
            ORDER BY collection_id
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(scope)
        .bind(scope)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let labels: Vec<LabelRow> = sqlx::query_as(
            r#"
            SELECT l.kind, l.name
            FROM entity_labels el
            JOIN labels l ON l.id = el.label_id
            WHERE el.entity_id = ?
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let neighbors: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT e.name
            FROM entity_links k
            JOIN entities e ON e.id = k.target_id
            WHERE k.source_id = ?
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut context = EntityContext {
            name: row.name,
            description: row.description,
            collection_id: row.collection_id,
            connects_to: neighbors.into_iter().map(|(name,)| name).collect(),
            ..Default::default()
        };
        for label in labels.into_iter().filter_map(LabelRow::into_label) {
            match label.kind {
                LabelKind::Function => context.functions.push(label.name),
                LabelKind::Process => context.processes.push(label.name),
            }
        }

        Ok(Some(context.normalized()))
    }

    async fn labels(&self) -> Result<Vec<Label>> {
        let rows: Vec<LabelRow> = sqlx::query_as("SELECT kind, name FROM labels ORDER BY kind, name")
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(rows.into_iter().filter_map(LabelRow::into_label).collect())
    }

    async fn label_owners(&self, label: &Label) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT e.id, e.name, e.external_id, e.description, e.collection_id
            FROM entities e
            JOIN entity_labels el ON el.entity_id = e.id
            JOIN labels l ON l.id = el.label_id
            WHERE l.kind = ? AND l.name = ?
            "#,
        )
        .bind(label.kind.as_str())
        .bind(&label.name)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(rows.into_iter().map(EntityRow::into_entity).collect())
    }
}

#[derive(FromRow)]
struct EntityRow {
    id: i64,
    name: String,
    external_id: Option<String>,
    description: Option<String>,
    collection_id: Option<String>,
}

impl EntityRow {
    fn into_entity(self) -> Entity {
        Entity {
            name: self.name,
            external_id: self.external_id,
            description: self.description,
            collection_id: self.collection_id,
        }
    }
}

#[derive(FromRow)]
struct LabelRow {
    kind: String,
    name: String,
}

impl LabelRow {
    fn into_label(self) -> Option<Label> {
        match self.kind.parse::<LabelKind>() {
            Ok(kind) => Some(Label {
                name: self.name,
                kind,
            }),
            Err(e) => {
                warn!(label = %self.name, error = %e, "Ignoring label with unknown kind");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::facts::{GraphFactFetcher, GraphLookup};
    use crate::graph::resolver::{EntityResolver, MatchTier};
    use crate::storage::Database;
    use std::sync::Arc;

    const SEED: &str = r#"{
        "collections": [{
            "id": "jet-engine-v1",
            "name": "Jet Engine",
            "subject": "Aerospace",
            "entities": [
                {"name": "Combustion Canister", "external_id": "canister_turbine_011",
                 "description": "Chamber where fuel mixes with compressed air and ignites.",
                 "performs": ["Fuel Burning"], "part_of": ["Combustion"],
                 "connects_to": ["Turbine Blades", "Turbine Blades", "Afterburner"]},
                {"name": "Turbine Blades", "external_id": "blades_turbine_001",
                 "performs": ["Energy Extraction"]},
                {"name": "Turbine Dividers", "external_id": "blades_dividers_turbine_017",
                 "performs": ["Flow Guidance"]}
            ]
        }],
        "entities": [{"name": "Divider"}],
        "processes": ["Combustion"]
    }"#;

    async fn seeded() -> (Database, SqliteGraphStore) {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteGraphStore::new(db.pool().clone());
        store
            .apply_seed(&GraphSeed::from_json(SEED).unwrap())
            .await
            .unwrap();
        (db, store)
    }

    #[tokio::test]
    async fn test_apply_seed_counts() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteGraphStore::new(db.pool().clone());
        let seed = GraphSeed::from_json(SEED).unwrap();

        let report = store.apply_seed(&seed).await.unwrap();
        assert_eq!(report.collections, 1);
        assert_eq!(report.entities, 4);
        assert_eq!(report.labels, 4);
        assert_eq!(report.relations, 5);
        assert_eq!(report.skipped_links, 1);

        let again = store.apply_seed(&seed).await.unwrap();
        assert_eq!(again.relations, 0);
        assert_eq!(store.count_entities().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_entity_context() {
        let (_db, store) = seeded().await;
        let context = store
            .entity_context("Combustion Canister", Some("jet-engine-v1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(context.functions, vec!["Fuel Burning"]);
        assert_eq!(context.processes, vec!["Combustion"]);
        assert_eq!(context.connects_to, vec!["Turbine Blades"]);
        assert_eq!(
            context.description.as_deref(),
            Some("Chamber where fuel mixes with compressed air and ignites.")
        );

        assert!(store.entity_context("Combustion Canister", Some("v8")).await.unwrap().is_none());
        assert!(store.entity_context("Divider", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resolver_over_sqlite() {
        let (_db, store) = seeded().await;
        let resolver = EntityResolver::new(Arc::new(store));

        assert_eq!(resolver.resolve("dividers", None).await.unwrap().as_deref(), Some("Divider"));
        assert_eq!(
            resolver.resolve("dividers", Some("jet-engine-v1")).await.unwrap().as_deref(),
            Some("Turbine Dividers")
        );
        assert_eq!(
            resolver.resolve("CANISTER_TURBINE_011", None).await.unwrap().as_deref(),
            Some("Combustion Canister")
        );
        assert_eq!(
            resolver.resolve("turbine blade", None).await.unwrap().as_deref(),
            Some("Turbine Blades")
        );
    }

    #[tokio::test]
    async fn test_resolver_folds_non_ascii_case() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteGraphStore::new(db.pool().clone());
        let seed = GraphSeed::from_json(
            r#"{"entities": [
                {"name": "Écrou", "external_id": "ÉCROU_M8"},
                {"name": "Ölpumpe"}
            ]}"#,
        )
        .unwrap();
        store.apply_seed(&seed).await.unwrap();
        let resolver = EntityResolver::new(Arc::new(store));

        for (raw, expected) in [
            ("Écrou", "Écrou"),
            ("ÉCROU", "Écrou"),
            ("écrous", "Écrou"),
            ("écrou_m8", "Écrou"),
            ("ÖLPUMPE", "Ölpumpe"),
            ("ölpumpen", "Ölpumpe"),
        ] {
            assert_eq!(
                resolver.resolve(raw, None).await.unwrap().as_deref(),
                Some(expected),
                "{raw}"
            );
        }

        let (_, tier) = resolver.resolve_entity("ÉCROUS", None).await.unwrap().unwrap();
        assert_eq!(tier, MatchTier::PluralFlip);
    }

    #[tokio::test]
    async fn test_hint_fetch_stays_in_resolved_collection() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteGraphStore::new(db.pool().clone());
        let seed = GraphSeed::from_json(
            r#"{"collections": [
                {"id": "a-front", "name": "Front", "entities": [
                    {"name": "Fan", "external_id": "fan_front_001", "description": "Front intake fan."}]},
                {"id": "b-rear", "name": "Rear", "entities": [
                    {"name": "Fan", "external_id": "fan_rear_002", "description": "Rear cooling fan."}]}
            ]}"#,
        )
        .unwrap();
        store.apply_seed(&seed).await.unwrap();
        let fetcher = GraphFactFetcher::new(Arc::new(store));

        let context = fetcher
            .resolve_and_fetch(Some("FAN_REAR_002"), "what is this?", None)
            .await
            .found()
            .unwrap();
        assert_eq!(context.description.as_deref(), Some("Rear cooling fan."));
    }

    #[tokio::test]
    async fn test_inference_over_sqlite() {
        let (_db, store) = seeded().await;
        let fetcher = GraphFactFetcher::new(Arc::new(store));

        assert_eq!(
            fetcher
                .infer_entity("Where does combustion happen?", Some("jet-engine-v1"))
                .await,
            GraphLookup::Found("Combustion Canister".to_string())
        );
    }

    #[tokio::test]
    async fn test_closed_pool_is_store_unavailable() {
        let (db, store) = seeded().await;
        db.close().await;

        let err = store.labels().await.unwrap_err();
        assert!(matches!(
            err,
            Error::StoreUnavailable {
                store: StoreKind::Graph,
                ..
            }
        ));
    }
}
