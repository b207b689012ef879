use std::collections::BTreeSet;

use clap::{ArgAction, Args, ValueEnum};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    App,
    error::{AppError, AppResult},
    explore::{self, ExploreOptions, Thoroughness},
    matcher,
    models::{self, CachedObject, CastEntry, CreditFilter, EpisodeRef, MediaKind, ObjectId},
};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum CreditsArg {
    #[default]
    All,
    Movie,
    Tv,
}

impl From<CreditsArg> for CreditFilter {
    fn from(arg: CreditsArg) -> Self {
        match arg {
            CreditsArg::All => CreditFilter::All,
            CreditsArg::Movie => CreditFilter::Movie,
            CreditsArg::Tv => CreditFilter::Tv,
        }
    }
}

#[derive(Debug, Args)]
pub struct RoleArgs {
    /// Movie title or TMDB id.
    #[arg(short = 'M', long, value_name = "TITLE", conflicts_with = "tv_series")]
    pub movie: Option<String>,

    /// TV series title or TMDB id.
    #[arg(short = 'T', long, value_name = "TITLE")]
    pub tv_series: Option<String>,

    /// Season of a TV series.
    #[arg(short = 's', long, value_name = "SEASON_NUMBER", conflicts_with = "episode")]
    pub season: Option<i64>,

    /// Episode of a TV series. Accepted formats: NxM, sNeM.
    #[arg(short = 'e', long, value_name = "EPISODE_ID")]
    pub episode: Option<String>,

    /// Perform a thorough search. Repeat to be more thorough.
    #[arg(short = 't', long, action = ArgAction::Count)]
    pub thorough: u8,

    /// Maximum number of results. 0 means unlimited.
    #[arg(short = 'l', long, default_value_t = 0)]
    pub limit: usize,

    /// Print more detailed information (e.g. actor IMDb links).
    #[arg(short = 'D', long)]
    pub detailed: bool,

    /// Print the TMDB id of matched actors to stdout.
    #[arg(short = 'i', long)]
    pub print_id: bool,

    /// Character name to match; omit to list the full cast.
    #[arg(value_name = "CHARACTER_NAME")]
    pub character: Option<String>,
}

#[derive(Debug, Args)]
pub struct PlayedArgs {
    /// Movie title or TMDB id to restrict the credits to.
    #[arg(short = 'M', long, value_name = "TITLE", conflicts_with = "tv_series")]
    pub movie: Option<String>,

    /// TV series title or TMDB id to restrict the credits to.
    #[arg(short = 'T', long, value_name = "TITLE")]
    pub tv_series: Option<String>,

    /// Season of a TV series.
    #[arg(short = 's', long, value_name = "SEASON_NUMBER", conflicts_with = "episode")]
    pub season: Option<i64>,

    /// Episode of a TV series. Accepted formats: NxM, sNeM.
    #[arg(short = 'e', long, value_name = "EPISODE_ID")]
    pub episode: Option<String>,

    /// Print more detailed information (e.g. credit IMDb links).
    #[arg(short = 'D', long)]
    pub detailed: bool,

    /// Actor name or TMDB id.
    #[arg(value_name = "ACTOR_NAME")]
    pub actor: String,
}

#[derive(Debug, Args)]
pub struct ExploreArgs {
    /// Maximum degree of separation to consider.
    #[arg(short = 'D', long, default_value_t = 1)]
    pub degree: i32,

    /// Type of credits to consider.
    #[arg(short = 'c', long, value_enum, default_value_t = CreditsArg::All)]
    pub credits: CreditsArg,

    /// Perform a thorough search. Repeat to be more thorough.
    #[arg(short = 't', long, action = ArgAction::Count)]
    pub thorough: u8,

    /// Name or TMDB id of a seed actor. Repeatable.
    #[arg(short = 'A', long = "actor", value_name = "ACTOR")]
    pub actors: Vec<String>,

    /// Name or TMDB id of a seed movie. Repeatable.
    #[arg(short = 'M', long = "movie", value_name = "MOVIE")]
    pub movies: Vec<String>,

    /// Name or TMDB id of a seed TV series. Repeatable.
    #[arg(short = 'T', long = "tv-series", value_name = "TV_SERIES")]
    pub tv_series: Vec<String>,
}

#[derive(Debug, Args)]
pub struct GraphArgs {
    /// Type of credits to build edges from.
    #[arg(short = 'c', long, value_enum, default_value_t = CreditsArg::All)]
    pub credits: CreditsArg,
}

/// Resolve a user-supplied term to a cached entity: a numeric TMDB id loads
/// directly, anything else goes through the TMDB search endpoint.
async fn resolve(
    app: &App,
    query: &str,
    kind: MediaKind,
    thorough: Thoroughness,
) -> AppResult<CachedObject> {
    let id = match query.trim().parse::<i64>() {
        Ok(id) => id,
        Err(_) => {
            let hits = match kind {
                MediaKind::Person => app.tmdb.search_person(query, 1).await?,
                MediaKind::Movie => app.tmdb.search_movie(query, 1).await?,
                MediaKind::Tv => app.tmdb.search_tv(query, 1).await?,
            };
            *hits.first().ok_or_else(|| AppError::not_found(kind, query))?
        },
    };
    let obj =
        explore::load_thorough(&app.cache, &app.tmdb, ObjectId::new(kind, id), thorough).await?;
    debug!(id = %obj.oid, name = %obj.display_name(), "resolved '{query}'");
    Ok(obj)
}

fn production_term(movie: &Option<String>, tv_series: &Option<String>) -> AppResult<(MediaKind, String)> {
    match (movie, tv_series) {
        (Some(m), None) => Ok((MediaKind::Movie, m.clone())),
        (None, Some(t)) => Ok((MediaKind::Tv, t.clone())),
        _ => Err(anyhow::anyhow!("no movie or tv series specified").into()),
    }
}

/// One `role` result: an actor matched through a character name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoleMatch {
    pub score: u32,
    pub person_id: i64,
    pub person_name: String,
    pub character: String,
}

/// Rank a cast list against a character query. With no query, the whole cast
/// is returned as full-score matches. The second element is the deduplicated
/// credit list, used for reporting candidates when nothing matched.
fn match_characters(
    cast: &[CastEntry],
    query: Option<&str>,
) -> (Vec<RoleMatch>, Vec<(String, i64, String)>) {
    let credits: BTreeSet<(String, i64, String)> = cast
        .iter()
        .map(|c| (c.character_name().to_string(), c.id, c.name.clone()))
        .collect();

    let mut matches: Vec<RoleMatch> = match query {
        Some(query) => {
            let characters: BTreeSet<&str> =
                credits.iter().map(|(ch, _, _)| ch.as_str()).collect();
            let best = matcher::extract_best(
                query,
                characters.iter().copied(),
                matcher::MATCH_THRESHOLD,
                5,
            );
            best.iter()
                .flat_map(|&(ch_name, score)| {
                    credits.iter().filter(move |(ch, _, _)| ch == ch_name).map(
                        move |(ch, pid, pname)| RoleMatch {
                            score,
                            person_id: *pid,
                            person_name: pname.clone(),
                            character: ch.clone(),
                        },
                    )
                })
                .collect()
        },
        None => credits
            .iter()
            .map(|(ch, pid, pname)| RoleMatch {
                score: 100,
                person_id: *pid,
                person_name: pname.clone(),
                character: ch.clone(),
            })
            .collect(),
    };

    matches.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.person_name.cmp(&b.person_name))
            .then_with(|| a.character.cmp(&b.character))
    });
    matches.dedup();

    (matches, credits.into_iter().collect())
}

/// Cast entries in scope for a `role` lookup: a single episode, a season, or
/// the whole production depending on the flags.
async fn scoped_cast(
    app: &App,
    obj: &mut CachedObject,
    season: Option<i64>,
    episode: Option<&str>,
    thorough: Thoroughness,
) -> AppResult<Vec<CastEntry>> {
    if (season.is_some() || episode.is_some()) && obj.oid.kind != MediaKind::Tv {
        return Err(anyhow::anyhow!("season/episode filters require a TV series").into());
    }

    if let Some(spec) = episode {
        let ep = EpisodeRef::parse(spec)?;
        let blob = app.cache.ensure_episode(&app.tmdb, obj, ep).await?;
        return models::episode_cast(&blob);
    }

    if let Some(season_number) = season {
        app.cache.ensure_season(&app.tmdb, obj, season_number).await?;
        if thorough.episodes() {
            let refs = season_episode_refs(&obj.metadata, season_number);
            for ep in refs {
                app.cache.ensure_episode(&app.tmdb, obj, ep).await?;
            }
            let season_blob = obj.metadata["seasons"][(season_number - 1) as usize].clone();
            return models::season_cast(&season_blob, true);
        }
        let season_blob = obj.metadata["seasons"][(season_number - 1) as usize].clone();
        let mut cast = models::season_cast(&season_blob, false)?;
        cast.extend(models::parse_cast(&obj.metadata["credits"]["cast"])?);
        return Ok(cast);
    }

    if obj.oid.kind == MediaKind::Tv && thorough.seasons() {
        explore::load_all_seasons(&app.cache, &app.tmdb, obj, thorough.episodes()).await?;
        return obj.cast();
    }

    // Main credits only. Season data already merged into the blob by earlier
    // runs still counts.
    obj.cast()
}

fn season_episode_refs(metadata: &Value, season_number: i64) -> Vec<EpisodeRef> {
    metadata["seasons"][(season_number - 1) as usize]["info"]["episodes"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|ep| {
            Some(EpisodeRef {
                season: ep["season_number"].as_i64()?,
                episode: ep["episode_number"].as_i64()?,
            })
        })
        .collect()
}

/// `role`: who played a character in a production.
pub async fn role(app: &App, args: &RoleArgs) -> AppResult<()> {
    let (kind, term) = production_term(&args.movie, &args.tv_series)?;
    let thorough = Thoroughness(args.thorough);
    let mut production = resolve(app, &term, kind, Thoroughness::default()).await?;

    let cast =
        scoped_cast(app, &mut production, args.season, args.episode.as_deref(), thorough).await?;
    let query = args.character.as_deref();
    let (mut matches, candidates) = match_characters(&cast, query);

    if matches.is_empty() {
        eprintln!(
            "no characters found in '{}'{}",
            production.display_name(),
            query.map(|q| format!(" matching '{q}'")).unwrap_or_default(),
        );
        if !candidates.is_empty() {
            eprintln!("{} characters found in '{}':", candidates.len(), production.display_name());
            let mut by_actor = candidates;
            by_actor.sort_by(|a, b| a.2.cmp(&b.2));
            for (i, (ch, _, pname)) in by_actor.iter().enumerate() {
                eprintln!("{}. '{}' played '{}'", i + 1, pname, ch);
            }
        }
        return Err(AppError::NoMatchingCharacters);
    }

    if args.limit > 0 {
        matches.truncate(args.limit);
    }

    println!(
        "{} character{} in '{}' ({}){}",
        matches.len(),
        if matches.len() == 1 { "" } else { "s" },
        production.display_name(),
        production.imdb_url(),
        query.map(|q| format!(" match '{q}'")).unwrap_or_default(),
    );
    for (i, m) in matches.iter().enumerate() {
        let detailed_str = if args.detailed {
            let actor = app.cache.load(&app.tmdb, ObjectId::person(m.person_id)).await?;
            format!(" ({})", actor.imdb_url())
        } else {
            String::new()
        };
        println!(
            "{}/{}. '{}' played '{}'{}{}",
            i + 1,
            matches.len(),
            m.person_name,
            m.character,
            if query.is_some() { format!(" ({}% match)", m.score) } else { String::new() },
            detailed_str,
        );
        if args.print_id {
            println!("{}", m.person_id);
        }
    }

    Ok(())
}

/// `played`: the roles an actor has played, optionally in one production.
pub async fn played(app: &App, args: &PlayedArgs) -> AppResult<()> {
    let actor = resolve(app, &args.actor, MediaKind::Person, Thoroughness::default()).await?;

    let production = match (&args.movie, &args.tv_series) {
        (None, None) => None,
        _ => {
            let (kind, term) = production_term(&args.movie, &args.tv_series)?;
            Some(resolve(app, &term, kind, Thoroughness::default()).await?)
        },
    };
    if (args.season.is_some() || args.episode.is_some()) && production.is_none() {
        return Err(anyhow::anyhow!("season/episode filters require a TV series").into());
    }

    match production {
        Some(mut p) => {
            // Within a production the roles come from its cast list (scoped
            // down to a season or episode when asked); the actor's combined
            // credits only know about the production as a whole.
            let characters: BTreeSet<String> = match (args.season, &args.episode) {
                (None, None) => actor
                    .person_credits()?
                    .iter()
                    .filter(|c| c.object_id() == Some(p.oid))
                    .map(|c| c.character_name().to_string())
                    .collect(),
                _ => {
                    let cast = scoped_cast(
                        app,
                        &mut p,
                        args.season,
                        args.episode.as_deref(),
                        Thoroughness::default(),
                    )
                    .await?;
                    cast.iter()
                        .filter(|c| c.id == actor.oid.id)
                        .map(|c| c.character_name().to_string())
                        .collect()
                },
            };

            if characters.is_empty() {
                eprintln!(
                    "it doesn't seem like '{}' ({}) was in '{}' ({})",
                    actor.display_name(),
                    actor.imdb_url(),
                    p.display_name(),
                    p.imdb_url(),
                );
                return Err(AppError::not_found(p.oid.kind, p.display_name()));
            }

            if characters.len() == 1 {
                println!(
                    "'{}' ({}) was in '{}' ({}) as '{}'",
                    actor.display_name(),
                    actor.imdb_url(),
                    p.display_name(),
                    p.imdb_url(),
                    characters.first().unwrap(),
                );
            } else {
                println!(
                    "'{}' ({}) was in '{}' ({}) as {} characters:",
                    actor.display_name(),
                    actor.imdb_url(),
                    p.display_name(),
                    p.imdb_url(),
                    characters.len(),
                );
                for (i, ch) in characters.iter().enumerate() {
                    println!("{}/{}. '{}'", i + 1, characters.len(), ch);
                }
            }
        },
        None => {
            let credits = actor.person_credits()?;
            let matched: Vec<_> =
                credits.iter().filter(|c| c.object_id().is_some()).collect();
            if matched.is_empty() {
                eprintln!(
                    "it doesn't seem like '{}' ({}) has acted in anything",
                    actor.display_name(),
                    actor.imdb_url(),
                );
                return Err(AppError::not_found(MediaKind::Person, actor.display_name()));
            }

            println!(
                "showing {} role{} played by '{}' ({}):",
                matched.len(),
                if matched.len() == 1 { "" } else { "s" },
                actor.display_name(),
                actor.imdb_url(),
            );
            for (i, credit) in matched.iter().enumerate() {
                let detailed_str = if args.detailed {
                    match credit.object_id() {
                        Some(oid) => {
                            let production = app.cache.load(&app.tmdb, oid).await?;
                            format!(" ({})", production.imdb_url())
                        },
                        None => String::new(),
                    }
                } else {
                    String::new()
                };
                println!(
                    "{}/{}. '{}' ({}), as '{}'{}",
                    i + 1,
                    matched.len(),
                    credit.display_title(),
                    credit.date(),
                    credit.character_name(),
                    detailed_str,
                );
            }
        },
    }

    Ok(())
}

/// `explore`: breadth-first pre-fetch of related entities into the cache.
pub async fn explore_cmd(app: &App, args: &ExploreArgs) -> AppResult<()> {
    let thorough = Thoroughness(args.thorough);
    let mut seeds = Vec::new();
    for term in &args.actors {
        seeds.push(resolve(app, term, MediaKind::Person, thorough).await?.oid);
    }
    for term in &args.movies {
        seeds.push(resolve(app, term, MediaKind::Movie, thorough).await?.oid);
    }
    for term in &args.tv_series {
        seeds.push(resolve(app, term, MediaKind::Tv, thorough).await?.oid);
    }
    if seeds.is_empty() {
        return Err(anyhow::anyhow!("no seed actors, movies, or tv series specified").into());
    }

    info!(seeds = seeds.len(), degree = args.degree, "exploring");
    let opts =
        ExploreOptions { max_depth: args.degree, credits: args.credits.into(), thorough };
    let summary = explore::explore(&app.cache, &app.tmdb, &seeds, &opts).await?;

    println!(
        "explored {} entities at degree {} ({} people, {} productions fetched)",
        summary.visited, args.degree, summary.fetched_people, summary.fetched_productions,
    );
    Ok(())
}

/// `graph`: build the credit join tables and co-appearance edges.
pub async fn graph(app: &App, args: &GraphArgs) -> AppResult<()> {
    let stats = explore::build_graph(&app.cache, args.credits.into()).await?;
    println!(
        "graph: {} vertices, {} new edges ({} credits recorded)",
        stats.vertices, stats.edges_added, stats.credits_recorded,
    );
    Ok(())
}
