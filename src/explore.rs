use std::collections::{HashMap, VecDeque};

use tracing::{debug, info};

use crate::{
    cache::CacheStore,
    error::AppResult,
    models::{CachedObject, CreditFilter, EpisodeRef, MediaKind, ObjectId},
    tmdb::TmdbClient,
};

/// How much of a series to pull in when loading it: `0` leaves the main
/// credits as-is, `1` fetches all seasons, `2` fetches every episode too.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Thoroughness(pub u8);

impl Thoroughness {
    pub fn seasons(self) -> bool {
        self.0 >= 1
    }

    pub fn episodes(self) -> bool {
        self.0 >= 2
    }
}

/// Load an entity, pulling seasons/episodes for series according to
/// `thorough`.
pub async fn load_thorough(
    store: &CacheStore,
    tmdb: &TmdbClient,
    oid: ObjectId,
    thorough: Thoroughness,
) -> AppResult<CachedObject> {
    let mut obj = store.load(tmdb, oid).await?;
    if obj.oid.kind == MediaKind::Tv && thorough.seasons() {
        load_all_seasons(store, tmdb, &mut obj, thorough.episodes()).await?;
    }
    Ok(obj)
}

/// Fetch every season listed in the series info (specials excluded), and
/// optionally every episode of each season.
pub async fn load_all_seasons(
    store: &CacheStore,
    tmdb: &TmdbClient,
    obj: &mut CachedObject,
    episodes: bool,
) -> AppResult<()> {
    let season_numbers: Vec<i64> = obj.metadata["info"]["seasons"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|s| s["season_number"].as_i64())
        .filter(|&n| n != 0)
        .collect();

    for season_number in season_numbers {
        let season = store.ensure_season(tmdb, obj, season_number).await?;
        if !episodes {
            continue;
        }
        let refs: Vec<EpisodeRef> = season["info"]["episodes"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|ep| {
                Some(EpisodeRef {
                    season: ep["season_number"].as_i64()?,
                    episode: ep["episode_number"].as_i64()?,
                })
            })
            .collect();
        for ep in refs {
            store.ensure_episode(tmdb, obj, ep).await?;
        }
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct ExploreOptions {
    pub max_depth: i32,
    pub credits: CreditFilter,
    pub thorough: Thoroughness,
}

#[derive(Debug, Default)]
pub struct ExploreSummary {
    pub visited: usize,
    pub fetched_people: usize,
    pub fetched_productions: usize,
}

/// Breadth-first exploration of the credit graph starting from `seeds`.
///
/// Depth counts person hops: a seed production's cast is depth 1, their other
/// productions cost nothing extra, the casts of those are depth 2, and so on.
/// Entities whose recorded `explored_depth` already covers the remaining
/// budget are not expanded again; every visited entity gets its depth marker
/// raised to the depth it was explored to this run.
pub async fn explore(
    store: &CacheStore,
    tmdb: &TmdbClient,
    seeds: &[ObjectId],
    opts: &ExploreOptions,
) -> AppResult<ExploreSummary> {
    let mut queue: VecDeque<(ObjectId, i32)> = seeds.iter().map(|&oid| (oid, 0)).collect();
    let mut visited: HashMap<ObjectId, i32> = HashMap::new();
    let mut best_start: HashMap<ObjectId, i32> = HashMap::new();
    let mut summary = ExploreSummary::default();

    while let Some((oid, start_depth)) = queue.pop_front() {
        let remaining = opts.max_depth - start_depth;
        let obj = load_thorough(store, tmdb, oid, opts.thorough).await?;
        let known = visited.get(&oid).copied().unwrap_or(obj.explored_depth);

        if remaining <= 0 {
            debug!(id = %oid, depth = known, "depth budget exhausted");
            visited.insert(oid, known.max(0));
            continue;
        }

        debug!(id = %oid, name = %obj.display_name(), remaining = remaining, "exploring");
        for rel in obj.related()? {
            let rel_depth = match rel.kind {
                MediaKind::Person => start_depth + 1,
                kind if !opts.credits.allows(kind) => continue,
                _ => start_depth,
            };

            if best_start.get(&rel).is_some_and(|&seen| seen <= rel_depth) {
                continue;
            }

            let rel_obj = store.load(tmdb, rel).await?;
            match rel.kind {
                MediaKind::Person => summary.fetched_people += 1,
                _ => summary.fetched_productions += 1,
            }
            let rel_known = visited.get(&rel).copied().unwrap_or(rel_obj.explored_depth);
            if rel_known >= opts.max_depth {
                debug!(id = %rel, depth = rel_known, "already explored deep enough");
                continue;
            }

            best_start.insert(rel, rel_depth);
            queue.push_back((rel, rel_depth));
        }

        visited.insert(oid, known.max(remaining));
    }

    for (&oid, &depth) in &visited {
        store.mark_explored(oid, depth).await?;
    }
    summary.visited = visited.len();
    info!(
        visited = summary.visited,
        people = summary.fetched_people,
        productions = summary.fetched_productions,
        "exploration finished"
    );
    Ok(summary)
}

#[derive(Debug, Default, Eq, PartialEq)]
pub struct GraphStats {
    pub vertices: usize,
    pub edges_added: usize,
    pub credits_recorded: usize,
}

/// Project every cached entity's credits into the join tables, then derive
/// canonical co-appearance edges per production.
pub async fn build_graph(store: &CacheStore, credits: CreditFilter) -> AppResult<GraphStats> {
    let mut stats = GraphStats::default();

    let mut kinds = vec![MediaKind::Person];
    kinds.extend_from_slice(credits.kinds());
    for kind in kinds {
        for oid in store.all_ids(kind).await? {
            if let Some(obj) = store.get(oid).await? {
                stats.credits_recorded += store.record_credits(&obj, credits).await?;
            }
        }
    }

    let mut vertices: std::collections::HashSet<i64> = std::collections::HashSet::new();
    for &kind in credits.kinds() {
        let mut by_job: HashMap<i64, Vec<i64>> = HashMap::new();
        for (actor, job) in store.credits(kind).await? {
            by_job.entry(job).or_default().push(actor);
        }

        for (job, mut actors) in by_job {
            actors.sort_unstable();
            actors.dedup();
            for (i, &a) in actors.iter().enumerate() {
                vertices.insert(a);
                for &b in &actors[i + 1..] {
                    if store.insert_edge(kind, a, b, job).await? {
                        stats.edges_added += 1;
                    }
                }
            }
        }
    }

    stats.vertices = vertices.len();
    info!(
        vertices = stats.vertices,
        edges = stats.edges_added,
        credits = stats.credits_recorded,
        "graph build finished"
    );
    Ok(stats)
}
