use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, sea_query::{Expr, OnConflict},
};
use serde_json::Value;
use tracing::debug;

use crate::{
    entities::{graph_movie, graph_tv, movie, movie_credit, person, tv_credit, tv_series},
    error::{AppError, AppResult},
    models::{CachedObject, CreditFilter, EpisodeRef, MediaKind, ObjectId},
    tmdb::TmdbClient,
};

/// Local SQLite cache of TMDB entities, credits and co-appearance edges.
///
/// The cache is append/update only: rows are created on first lookup,
/// metadata is replaced on deeper re-fetches, nothing is ever deleted.
#[derive(Clone)]
pub struct CacheStore {
    db: DatabaseConnection,
}

impl CacheStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn get(&self, oid: ObjectId) -> AppResult<Option<CachedObject>> {
        let row = match oid.kind {
            MediaKind::Person => person::Entity::find_by_id(oid.id)
                .one(&self.db)
                .await?
                .map(|m| (m.metadata, m.explored_depth)),
            MediaKind::Movie => movie::Entity::find_by_id(oid.id)
                .one(&self.db)
                .await?
                .map(|m| (m.metadata, m.explored_depth)),
            MediaKind::Tv => tv_series::Entity::find_by_id(oid.id)
                .one(&self.db)
                .await?
                .map(|m| (m.metadata, m.explored_depth)),
        };
        match row {
            Some((metadata, explored_depth)) => {
                let metadata: Value = serde_json::from_str(&metadata)?;
                Ok(Some(CachedObject::new(oid, metadata, explored_depth)))
            },
            None => Ok(None),
        }
    }

    /// Return the cached entity, fetching it from TMDB only on a miss.
    /// A cached entity never triggers a network call.
    pub async fn load(&self, tmdb: &TmdbClient, oid: ObjectId) -> AppResult<CachedObject> {
        if let Some(cached) = self.get(oid).await? {
            debug!(id = %oid, depth = cached.explored_depth, "cache hit");
            return Ok(cached);
        }

        let metadata = match oid.kind {
            MediaKind::Person => tmdb.person_bundle(oid.id).await?,
            MediaKind::Movie => tmdb.movie_bundle(oid.id).await?,
            MediaKind::Tv => tmdb.tv_bundle(oid.id).await?,
        };
        self.insert(oid, &metadata).await?;
        debug!(id = %oid, "cached new entity");
        Ok(CachedObject::new(oid, metadata, 0))
    }

    pub(crate) async fn insert(&self, oid: ObjectId, metadata: &Value) -> AppResult<()> {
        let blob = serde_json::to_string(metadata)?;
        let now = now_sec();
        match oid.kind {
            MediaKind::Person => {
                let model = person::ActiveModel {
                    id: Set(oid.id),
                    metadata: Set(blob),
                    explored_depth: Set(0),
                    updated_at: Set(now),
                };
                person::Entity::insert(model).exec(&self.db).await?;
            },
            MediaKind::Movie => {
                let model = movie::ActiveModel {
                    id: Set(oid.id),
                    metadata: Set(blob),
                    explored_depth: Set(0),
                    updated_at: Set(now),
                };
                movie::Entity::insert(model).exec(&self.db).await?;
            },
            MediaKind::Tv => {
                let model = tv_series::ActiveModel {
                    id: Set(oid.id),
                    metadata: Set(blob),
                    explored_depth: Set(0),
                    updated_at: Set(now),
                };
                tv_series::Entity::insert(model).exec(&self.db).await?;
            },
        }
        Ok(())
    }

    /// Replace the metadata blob after season/episode enrichment.
    pub async fn save_metadata(&self, oid: ObjectId, metadata: &Value) -> AppResult<()> {
        let blob = serde_json::to_string(metadata)?;
        let now = now_sec();
        match oid.kind {
            MediaKind::Person => {
                person::Entity::update_many()
                    .col_expr(person::Column::Metadata, Expr::value(blob))
                    .col_expr(person::Column::UpdatedAt, Expr::value(now))
                    .filter(person::Column::Id.eq(oid.id))
                    .exec(&self.db)
                    .await?;
            },
            MediaKind::Movie => {
                movie::Entity::update_many()
                    .col_expr(movie::Column::Metadata, Expr::value(blob))
                    .col_expr(movie::Column::UpdatedAt, Expr::value(now))
                    .filter(movie::Column::Id.eq(oid.id))
                    .exec(&self.db)
                    .await?;
            },
            MediaKind::Tv => {
                tv_series::Entity::update_many()
                    .col_expr(tv_series::Column::Metadata, Expr::value(blob))
                    .col_expr(tv_series::Column::UpdatedAt, Expr::value(now))
                    .filter(tv_series::Column::Id.eq(oid.id))
                    .exec(&self.db)
                    .await?;
            },
        }
        Ok(())
    }

    /// Raise the exploration-depth marker. Depths never decrease: an update
    /// only happens when `depth` exceeds the stored value.
    pub async fn mark_explored(&self, oid: ObjectId, depth: i32) -> AppResult<()> {
        match oid.kind {
            MediaKind::Person => {
                person::Entity::update_many()
                    .col_expr(person::Column::ExploredDepth, Expr::value(depth))
                    .filter(person::Column::Id.eq(oid.id))
                    .filter(person::Column::ExploredDepth.lt(depth))
                    .exec(&self.db)
                    .await?;
            },
            MediaKind::Movie => {
                movie::Entity::update_many()
                    .col_expr(movie::Column::ExploredDepth, Expr::value(depth))
                    .filter(movie::Column::Id.eq(oid.id))
                    .filter(movie::Column::ExploredDepth.lt(depth))
                    .exec(&self.db)
                    .await?;
            },
            MediaKind::Tv => {
                tv_series::Entity::update_many()
                    .col_expr(tv_series::Column::ExploredDepth, Expr::value(depth))
                    .filter(tv_series::Column::Id.eq(oid.id))
                    .filter(tv_series::Column::ExploredDepth.lt(depth))
                    .exec(&self.db)
                    .await?;
            },
        }
        Ok(())
    }

    /// All ids of one kind currently in the cache.
    pub async fn all_ids(&self, kind: MediaKind) -> AppResult<Vec<ObjectId>> {
        let ids: Vec<i64> = match kind {
            MediaKind::Person => person::Entity::find()
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| m.id)
                .collect(),
            MediaKind::Movie => {
                movie::Entity::find().all(&self.db).await?.into_iter().map(|m| m.id).collect()
            },
            MediaKind::Tv => {
                tv_series::Entity::find().all(&self.db).await?.into_iter().map(|m| m.id).collect()
            },
        };
        Ok(ids.into_iter().map(|id| ObjectId::new(kind, id)).collect())
    }

    /// Project the cast/credit entries of a cached entity into the credit
    /// join tables, skipping credit kinds outside `filter`. Existing rows
    /// are left untouched.
    pub async fn record_credits(
        &self,
        obj: &CachedObject,
        filter: CreditFilter,
    ) -> AppResult<usize> {
        let mut pairs: Vec<(MediaKind, i64, i64)> = Vec::new();
        match obj.oid.kind {
            MediaKind::Person => {
                for credit in obj.person_credits()? {
                    if let Some(job) = credit.object_id() {
                        if filter.allows(job.kind) {
                            pairs.push((job.kind, obj.oid.id, job.id));
                        }
                    }
                }
            },
            MediaKind::Movie | MediaKind::Tv => {
                if filter.allows(obj.oid.kind) {
                    for cast in obj.cast()? {
                        pairs.push((obj.oid.kind, cast.id, obj.oid.id));
                    }
                }
            },
        }

        let count = pairs.len();
        for (kind, actor, job) in pairs {
            match kind {
                MediaKind::Movie => {
                    let model = movie_credit::ActiveModel { actor: Set(actor), job: Set(job) };
                    movie_credit::Entity::insert(model)
                        .on_conflict(
                            OnConflict::columns([
                                movie_credit::Column::Actor,
                                movie_credit::Column::Job,
                            ])
                            .do_nothing()
                            .to_owned(),
                        )
                        .exec_without_returning(&self.db)
                        .await?;
                },
                MediaKind::Tv => {
                    let model = tv_credit::ActiveModel { actor: Set(actor), job: Set(job) };
                    tv_credit::Entity::insert(model)
                        .on_conflict(
                            OnConflict::columns([
                                tv_credit::Column::Actor,
                                tv_credit::Column::Job,
                            ])
                            .do_nothing()
                            .to_owned(),
                        )
                        .exec_without_returning(&self.db)
                        .await?;
                },
                MediaKind::Person => unreachable!("credit jobs are productions"),
            }
        }
        Ok(count)
    }

    /// Actor/production pairs from one credit table.
    pub async fn credits(&self, kind: MediaKind) -> AppResult<Vec<(i64, i64)>> {
        let rows = match kind {
            MediaKind::Movie => movie_credit::Entity::find()
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| (m.actor, m.job))
                .collect(),
            MediaKind::Tv => tv_credit::Entity::find()
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| (m.actor, m.job))
                .collect(),
            MediaKind::Person => Vec::new(),
        };
        Ok(rows)
    }

    /// Record that actors `x` and `y` co-appeared in production `e`. The pair
    /// is canonicalized to `a < b`; self loops and duplicates are no-ops.
    /// Returns whether a new edge was written.
    pub async fn insert_edge(
        &self,
        kind: MediaKind,
        x: i64,
        y: i64,
        e: i64,
    ) -> AppResult<bool> {
        if x == y {
            return Ok(false);
        }
        let (a, b) = (x.min(y), x.max(y));
        let inserted = match kind {
            MediaKind::Movie => {
                let model = graph_movie::ActiveModel { a: Set(a), b: Set(b), e: Set(e) };
                graph_movie::Entity::insert(model)
                    .on_conflict(
                        OnConflict::columns([
                            graph_movie::Column::A,
                            graph_movie::Column::B,
                            graph_movie::Column::E,
                        ])
                        .do_nothing()
                        .to_owned(),
                    )
                    .exec_without_returning(&self.db)
                    .await?
            },
            MediaKind::Tv => {
                let model = graph_tv::ActiveModel { a: Set(a), b: Set(b), e: Set(e) };
                graph_tv::Entity::insert(model)
                    .on_conflict(
                        OnConflict::columns([
                            graph_tv::Column::A,
                            graph_tv::Column::B,
                            graph_tv::Column::E,
                        ])
                        .do_nothing()
                        .to_owned(),
                    )
                    .exec_without_returning(&self.db)
                    .await?
            },
            MediaKind::Person => 0,
        };
        Ok(inserted > 0)
    }

    /// Season blob for a series, fetched and merged into the cached metadata
    /// when the slot is still empty.
    pub async fn ensure_season(
        &self,
        tmdb: &TmdbClient,
        obj: &mut CachedObject,
        season: i64,
    ) -> AppResult<Value> {
        debug_assert_eq!(obj.oid.kind, MediaKind::Tv);
        if season < 1 {
            return Err(AppError::InvalidEpisode(format!("season {season}")));
        }
        if let Some(existing) = slot(&obj.metadata["seasons"], season) {
            return Ok(existing.clone());
        }

        debug!(id = %obj.oid, season = season, "loading season");
        let fetched = tmdb.tv_season(obj.oid.id, season).await?;
        set_slot(&mut obj.metadata["seasons"], season, fetched.clone());
        self.save_metadata(obj.oid, &obj.metadata).await?;
        Ok(fetched)
    }

    /// Episode blob for a series, fetching season and episode as needed.
    pub async fn ensure_episode(
        &self,
        tmdb: &TmdbClient,
        obj: &mut CachedObject,
        ep: EpisodeRef,
    ) -> AppResult<Value> {
        self.ensure_season(tmdb, obj, ep.season).await?;
        let season_slot = &obj.metadata["seasons"][(ep.season - 1) as usize];
        if let Some(existing) = slot(&season_slot["episodes"], ep.episode) {
            return Ok(existing.clone());
        }

        debug!(id = %obj.oid, season = ep.season, episode = ep.episode, "loading episode");
        let fetched = tmdb.tv_episode(obj.oid.id, ep.season, ep.episode).await?;
        set_slot(
            &mut obj.metadata["seasons"][(ep.season - 1) as usize]["episodes"],
            ep.episode,
            fetched.clone(),
        );
        self.save_metadata(obj.oid, &obj.metadata).await?;
        Ok(fetched)
    }
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

fn slot(raw: &Value, index_1: i64) -> Option<&Value> {
    raw.as_array()
        .and_then(|arr| arr.get((index_1 - 1) as usize))
        .filter(|v| !v.is_null())
}

/// Store `value` at 1-based `index_1`, growing the array with null
/// placeholders for any slots not yet fetched.
fn set_slot(raw: &mut Value, index_1: i64, value: Value) {
    if !raw.is_array() {
        *raw = Value::Array(Vec::new());
    }
    let arr = raw.as_array_mut().unwrap();
    let idx = (index_1 - 1) as usize;
    while arr.len() <= idx {
        arr.push(Value::Null);
    }
    arr[idx] = value;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db;

    async fn test_store() -> CacheStore {
        CacheStore::new(db::connect_and_migrate("sqlite::memory:").await.unwrap())
    }

    fn offline_client() -> TmdbClient {
        // Unroutable base URL: any attempted fetch fails fast, so tests can
        // prove an operation was served from the cache alone.
        TmdbClient::new(
            reqwest::Client::new(),
            "test-key".to_string(),
            "http://127.0.0.1:1/3".to_string(),
            100,
        )
    }

    fn movie_blob(title: &str, cast: &[(i64, &str, &str)]) -> Value {
        let cast: Vec<Value> = cast
            .iter()
            .map(|(id, name, ch)| json!({"id": id, "name": name, "character": ch}))
            .collect();
        json!({"info": {"title": title}, "credits": {"cast": cast}})
    }

    #[tokio::test]
    async fn load_is_idempotent_for_cached_entities() {
        let store = test_store().await;
        let tmdb = offline_client();
        let oid = ObjectId::movie(603);
        store.insert(oid, &movie_blob("The Matrix", &[(1, "Keanu Reeves", "Neo")])).await.unwrap();

        // hit: must not touch the network even though the client is offline
        let obj = store.load(&tmdb, oid).await.unwrap();
        assert_eq!(obj.display_name(), "The Matrix");
        assert_eq!(obj.explored_depth, 0);

        // miss: would need the network, so it fails
        assert!(store.load(&tmdb, ObjectId::movie(604)).await.is_err());
    }

    #[tokio::test]
    async fn explored_depth_never_decreases() {
        let store = test_store().await;
        let oid = ObjectId::person(7);
        store.insert(oid, &json!({"info": {"name": "X"}, "credits": {"cast": []}})).await.unwrap();

        store.mark_explored(oid, 2).await.unwrap();
        assert_eq!(store.get(oid).await.unwrap().unwrap().explored_depth, 2);

        store.mark_explored(oid, 1).await.unwrap();
        assert_eq!(store.get(oid).await.unwrap().unwrap().explored_depth, 2);

        store.mark_explored(oid, 3).await.unwrap();
        assert_eq!(store.get(oid).await.unwrap().unwrap().explored_depth, 3);
    }

    #[tokio::test]
    async fn save_metadata_keeps_explored_depth() {
        let store = test_store().await;
        let oid = ObjectId::tv(9);
        store.insert(oid, &json!({"info": {"name": "A"}, "credits": {"cast": []}, "seasons": []}))
            .await
            .unwrap();
        store.mark_explored(oid, 2).await.unwrap();

        store
            .save_metadata(oid, &json!({"info": {"name": "A2"}, "credits": {"cast": []}, "seasons": []}))
            .await
            .unwrap();
        let obj = store.get(oid).await.unwrap().unwrap();
        assert_eq!(obj.display_name(), "A2");
        assert_eq!(obj.explored_depth, 2);
    }

    #[tokio::test]
    async fn record_credits_from_movie_cast() {
        let store = test_store().await;
        let oid = ObjectId::movie(603);
        let blob = movie_blob("The Matrix", &[(1, "Keanu Reeves", "Neo"), (2, "Laurence Fishburne", "Morpheus")]);
        store.insert(oid, &blob).await.unwrap();

        let obj = store.get(oid).await.unwrap().unwrap();
        assert_eq!(store.record_credits(&obj, CreditFilter::All).await.unwrap(), 2);
        // re-recording is a no-op
        assert_eq!(store.record_credits(&obj, CreditFilter::All).await.unwrap(), 2);

        let mut rows = store.credits(MediaKind::Movie).await.unwrap();
        rows.sort_unstable();
        assert_eq!(rows, vec![(1, 603), (2, 603)]);
    }

    #[tokio::test]
    async fn record_credits_from_person_combined_credits() {
        let store = test_store().await;
        let oid = ObjectId::person(1);
        let blob = json!({
            "info": {"name": "Dylan Moran"},
            "credits": {"cast": [
                {"id": 10, "media_type": "tv", "name": "Black Books", "character": "Bernard"},
                {"id": 20, "media_type": "movie", "title": "Shaun of the Dead", "character": "David"},
                {"id": 30, "media_type": "podcast"},
            ]},
        });
        store.insert(oid, &blob).await.unwrap();

        let obj = store.get(oid).await.unwrap().unwrap();
        assert_eq!(store.record_credits(&obj, CreditFilter::All).await.unwrap(), 2);
        assert_eq!(store.credits(MediaKind::Tv).await.unwrap(), vec![(1, 10)]);
        assert_eq!(store.credits(MediaKind::Movie).await.unwrap(), vec![(1, 20)]);
    }

    #[tokio::test]
    async fn record_credits_skips_kinds_outside_the_filter() {
        let store = test_store().await;
        let oid = ObjectId::person(1);
        let blob = json!({
            "info": {"name": "Dylan Moran"},
            "credits": {"cast": [
                {"id": 10, "media_type": "tv", "name": "Black Books", "character": "Bernard"},
                {"id": 20, "media_type": "movie", "title": "Shaun of the Dead", "character": "David"},
            ]},
        });
        store.insert(oid, &blob).await.unwrap();

        let obj = store.get(oid).await.unwrap().unwrap();
        assert_eq!(store.record_credits(&obj, CreditFilter::Movie).await.unwrap(), 1);
        assert_eq!(store.credits(MediaKind::Tv).await.unwrap(), vec![]);
        assert_eq!(store.credits(MediaKind::Movie).await.unwrap(), vec![(1, 20)]);
    }

    #[tokio::test]
    async fn edges_are_canonical_and_deduplicated() {
        let store = test_store().await;

        assert!(store.insert_edge(MediaKind::Movie, 9, 3, 603).await.unwrap());
        // same pair, other direction
        assert!(!store.insert_edge(MediaKind::Movie, 3, 9, 603).await.unwrap());
        // self loop
        assert!(!store.insert_edge(MediaKind::Movie, 5, 5, 603).await.unwrap());
        // same pair, different production
        assert!(store.insert_edge(MediaKind::Movie, 9, 3, 604).await.unwrap());

        let edges = graph_movie::Entity::find().all(store.db()).await.unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|edge| edge.a < edge.b));
    }

    #[tokio::test]
    async fn ensure_season_uses_cached_slot() {
        let store = test_store().await;
        let tmdb = offline_client();
        let oid = ObjectId::tv(100);
        let blob = json!({
            "info": {"name": "Black Books"},
            "credits": {"cast": []},
            "seasons": [{"info": {"season_number": 1, "episodes": []}, "episodes": []}],
        });
        store.insert(oid, &blob).await.unwrap();

        let mut obj = store.get(oid).await.unwrap().unwrap();
        // season 1 is cached, offline client must not be consulted
        let season = store.ensure_season(&tmdb, &mut obj, 1).await.unwrap();
        assert_eq!(season["info"]["season_number"], 1);
        // season 2 is not cached, so this needs the network and fails
        assert!(store.ensure_season(&tmdb, &mut obj, 2).await.is_err());
    }

    #[test]
    fn set_slot_grows_sparse_arrays() {
        let mut seasons = json!([]);
        set_slot(&mut seasons, 3, json!({"info": {}}));
        assert_eq!(seasons.as_array().unwrap().len(), 3);
        assert!(seasons[0].is_null());
        assert!(seasons[1].is_null());
        assert!(slot(&seasons, 3).is_some());
        assert!(slot(&seasons, 1).is_none());

        set_slot(&mut seasons, 1, json!({"info": {"season_number": 1}}));
        assert_eq!(seasons[0]["info"]["season_number"], 1);
        assert_eq!(seasons.as_array().unwrap().len(), 3);
    }
}
