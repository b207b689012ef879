use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    Person,
    Movie,
    Tv,
}

impl MediaKind {
    pub fn parse_media_type(media_type: &str) -> Option<Self> {
        match media_type.to_ascii_lowercase().as_str() {
            "movie" => Some(MediaKind::Movie),
            "tv" => Some(MediaKind::Tv),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaKind::Person => "Person",
            MediaKind::Movie => "Movie",
            MediaKind::Tv => "Tv",
        };
        f.write_str(name)
    }
}

/// Which credit kinds an operation should consider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreditFilter {
    All,
    Movie,
    Tv,
}

impl CreditFilter {
    pub fn kinds(self) -> &'static [MediaKind] {
        match self {
            CreditFilter::All => &[MediaKind::Movie, MediaKind::Tv],
            CreditFilter::Movie => &[MediaKind::Movie],
            CreditFilter::Tv => &[MediaKind::Tv],
        }
    }

    pub fn allows(self, kind: MediaKind) -> bool {
        self.kinds().contains(&kind)
    }
}

/// A TMDB object reference: the catalog kind plus its numeric id.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub kind: MediaKind,
    pub id: i64,
}

impl ObjectId {
    pub fn new(kind: MediaKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn person(id: i64) -> Self {
        Self::new(MediaKind::Person, id)
    }

    pub fn movie(id: i64) -> Self {
        Self::new(MediaKind::Movie, id)
    }

    pub fn tv(id: i64) -> Self {
        Self::new(MediaKind::Tv, id)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}

/// A season/episode reference, parsed from `NxM` or `sNeM`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EpisodeRef {
    pub season: i64,
    pub episode: i64,
}

impl EpisodeRef {
    pub fn parse(spec: &str) -> AppResult<Self> {
        let s = spec.trim().to_ascii_lowercase();
        let (season_str, episode_str) = if let Some(rest) = s.strip_prefix('s') {
            rest.split_once('e').ok_or_else(|| AppError::InvalidEpisode(spec.to_string()))?
        } else {
            s.split_once('x').ok_or_else(|| AppError::InvalidEpisode(spec.to_string()))?
        };
        let season: i64 =
            season_str.parse().map_err(|_| AppError::InvalidEpisode(spec.to_string()))?;
        let episode: i64 =
            episode_str.parse().map_err(|_| AppError::InvalidEpisode(spec.to_string()))?;
        // seasons and episodes are numbered from 1
        if season < 1 || episode < 1 {
            return Err(AppError::InvalidEpisode(spec.to_string()));
        }
        Ok(Self { season, episode })
    }
}

impl std::str::FromStr for EpisodeRef {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One cast row as returned by TMDB credit listings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Hash)]
pub struct CastEntry {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
}

impl CastEntry {
    pub fn character_name(&self) -> &str {
        match self.character.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => "<unknown>",
        }
    }
}

/// One entry of a person's combined credits.
#[derive(Clone, Debug, Deserialize)]
pub struct CombinedCredit {
    pub id: i64,
    pub media_type: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
}

impl CombinedCredit {
    pub fn object_id(&self) -> Option<ObjectId> {
        MediaKind::parse_media_type(&self.media_type).map(|kind| ObjectId::new(kind, self.id))
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().or(self.name.as_deref()).unwrap_or("<untitled>")
    }

    /// First air date for series, release date for movies.
    pub fn date(&self) -> &str {
        self.first_air_date.as_deref().or(self.release_date.as_deref()).unwrap_or("")
    }

    pub fn character_name(&self) -> &str {
        match self.character.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => "<unknown>",
        }
    }
}

/// A cached catalog entity: the verbatim metadata blob plus the
/// exploration-depth marker stored alongside it.
#[derive(Clone, Debug)]
pub struct CachedObject {
    pub oid: ObjectId,
    pub metadata: Value,
    pub explored_depth: i32,
}

impl CachedObject {
    pub fn new(oid: ObjectId, metadata: Value, explored_depth: i32) -> Self {
        Self { oid, metadata, explored_depth }
    }

    fn info(&self) -> &Value {
        &self.metadata["info"]
    }

    pub fn display_name(&self) -> &str {
        let info = self.info();
        let name = match self.oid.kind {
            MediaKind::Movie => info["title"].as_str(),
            MediaKind::Person | MediaKind::Tv => info["name"].as_str(),
        };
        name.unwrap_or("<unknown>")
    }

    pub fn imdb_id(&self) -> Option<&str> {
        self.info()["imdb_id"].as_str().filter(|s| !s.is_empty())
    }

    pub fn imdb_url(&self) -> String {
        match self.imdb_id() {
            Some(imdb_id) => {
                let path = if self.oid.kind == MediaKind::Person { "name" } else { "title" };
                format!("https://www.imdb.com/{path}/{imdb_id}/")
            },
            None => {
                format!("https://www.imdb.com/find/?q={}", urlencoding::encode(self.display_name()))
            },
        }
    }

    /// Main cast of a movie or series. For series this also includes guest
    /// stars from any season/episode data already merged into the blob.
    pub fn cast(&self) -> AppResult<Vec<CastEntry>> {
        let mut cast = parse_cast(&self.metadata["credits"]["cast"])?;
        if self.oid.kind == MediaKind::Tv {
            for season in iter_slots(&self.metadata["seasons"]) {
                cast.extend(season_cast(season, true)?);
            }
        }
        Ok(cast)
    }

    /// Combined acting credits of a person, ordered by date.
    pub fn person_credits(&self) -> AppResult<Vec<CombinedCredit>> {
        let raw = &self.metadata["credits"]["cast"];
        let mut credits: Vec<CombinedCredit> = match raw {
            Value::Array(_) => serde_json::from_value(raw.clone())?,
            _ => Vec::new(),
        };
        credits.sort_by(|a, b| a.date().cmp(b.date()));
        Ok(credits)
    }

    /// Object ids reachable from this entity in one hop: a person's credited
    /// productions, or a production's cast members.
    pub fn related(&self) -> AppResult<Vec<ObjectId>> {
        match self.oid.kind {
            MediaKind::Person => Ok(self
                .person_credits()?
                .iter()
                .filter_map(CombinedCredit::object_id)
                .collect()),
            MediaKind::Movie | MediaKind::Tv => {
                Ok(self.cast()?.iter().map(|c| ObjectId::person(c.id)).collect())
            },
        }
    }
}

pub(crate) fn parse_cast(raw: &Value) -> AppResult<Vec<CastEntry>> {
    match raw {
        Value::Array(_) => Ok(serde_json::from_value(raw.clone())?),
        _ => Ok(Vec::new()),
    }
}

/// Iterate non-null entries of a sparse slot array (seasons/episodes are
/// stored 1-indexed with null placeholders for unfetched slots).
pub(crate) fn iter_slots(raw: &Value) -> impl Iterator<Item = &Value> {
    raw.as_array().into_iter().flatten().filter(|v| !v.is_null())
}

/// Cast of one season blob: episode guest stars, plus full episode credits
/// when individual episodes have been fetched.
pub(crate) fn season_cast(season: &Value, include_episodes: bool) -> AppResult<Vec<CastEntry>> {
    let mut cast = Vec::new();
    for ep in iter_slots(&season["info"]["episodes"]) {
        cast.extend(parse_cast(&ep["guest_stars"])?);
    }
    if include_episodes {
        for ep in iter_slots(&season["episodes"]) {
            cast.extend(episode_cast(ep)?);
        }
    }
    Ok(cast)
}

/// Cast of one fully fetched episode blob: credited cast plus guest stars.
pub(crate) fn episode_cast(episode: &Value) -> AppResult<Vec<CastEntry>> {
    let mut cast = parse_cast(&episode["credits"])?;
    cast.extend(parse_cast(&episode["info"]["guest_stars"])?);
    Ok(cast)
}
