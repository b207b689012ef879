use std::{num::NonZeroU32, sync::Arc};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::AppResult;

/// Thin TMDB v3 client. Every call is throttled through a shared rate
/// limiter; payloads are returned as raw JSON so the cache can store them
/// verbatim.
pub struct TmdbClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(client: reqwest::Client, api_key: String, base_url: String, rps: u32) -> Self {
        let limiter =
            Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::new(rps.max(1)).unwrap())));
        Self { client, api_key, base_url, limiter }
    }

    async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> AppResult<Value> {
        self.limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        debug!(path = %path, "TMDB request");
        let resp = self
            .client
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    async fn search(&self, endpoint: &str, query: &str, limit: usize) -> AppResult<Vec<i64>> {
        let raw = self.get_json(&format!("search/{endpoint}"), &[("query", query)]).await?;
        let resp: SearchResponse = serde_json::from_value(raw)?;
        Ok(resp.results.into_iter().take(limit).map(|hit| hit.id).collect())
    }

    pub async fn search_movie(&self, query: &str, limit: usize) -> AppResult<Vec<i64>> {
        self.search("movie", query, limit).await
    }

    pub async fn search_tv(&self, query: &str, limit: usize) -> AppResult<Vec<i64>> {
        self.search("tv", query, limit).await
    }

    pub async fn search_person(&self, query: &str, limit: usize) -> AppResult<Vec<i64>> {
        self.search("person", query, limit).await
    }

    /// Movie metadata bundle: details merged with external ids, plus credits.
    pub async fn movie_bundle(&self, id: i64) -> AppResult<Value> {
        let mut info = self.get_json(&format!("movie/{id}"), &[]).await?;
        let external_ids = self.get_json(&format!("movie/{id}/external_ids"), &[]).await?;
        merge_objects(&mut info, external_ids);
        let credits = self.get_json(&format!("movie/{id}/credits"), &[]).await?;
        Ok(json!({ "info": info, "credits": credits }))
    }

    /// Series metadata bundle. `seasons` starts empty and is filled in the
    /// cached blob as seasons get fetched on demand.
    pub async fn tv_bundle(&self, id: i64) -> AppResult<Value> {
        let mut info = self.get_json(&format!("tv/{id}"), &[]).await?;
        let external_ids = self.get_json(&format!("tv/{id}/external_ids"), &[]).await?;
        merge_objects(&mut info, external_ids);
        let credits = self.get_json(&format!("tv/{id}/credits"), &[]).await?;
        Ok(json!({ "info": info, "credits": credits, "seasons": [] }))
    }

    /// Person metadata bundle: details plus combined movie/TV credits.
    pub async fn person_bundle(&self, id: i64) -> AppResult<Value> {
        let info = self.get_json(&format!("person/{id}"), &[]).await?;
        let credits = self.get_json(&format!("person/{id}/combined_credits"), &[]).await?;
        Ok(json!({ "info": info, "credits": credits }))
    }

    pub async fn tv_season(&self, id: i64, season: i64) -> AppResult<Value> {
        let info = self.get_json(&format!("tv/{id}/season/{season}"), &[]).await?;
        Ok(json!({ "info": info, "episodes": [] }))
    }

    pub async fn tv_episode(&self, id: i64, season: i64, episode: i64) -> AppResult<Value> {
        let info = self.get_json(&format!("tv/{id}/season/{season}/episode/{episode}"), &[]).await?;
        let credits =
            self.get_json(&format!("tv/{id}/season/{season}/episode/{episode}/credits"), &[]).await?;
        Ok(json!({ "info": info, "credits": credits["cast"] }))
    }
}

fn merge_objects(into: &mut Value, from: Value) {
    if let (Value::Object(into), Value::Object(from)) = (into, from) {
        into.extend(from);
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: i64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn search_response_keeps_result_order() {
        let raw = json!({
            "page": 1,
            "results": [{"id": 396, "name": "Black Books"}, {"id": 2, "name": "Other"}],
            "total_results": 2,
        });
        let resp: SearchResponse = serde_json::from_value(raw).unwrap();
        let ids: Vec<i64> = resp.results.into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![396, 2]);
    }

    #[test]
    fn merge_objects_overlays_external_ids() {
        let mut info = json!({"id": 603, "title": "The Matrix", "imdb_id": null});
        merge_objects(&mut info, json!({"imdb_id": "tt0133093", "wikidata_id": "Q83495"}));
        assert_eq!(info["imdb_id"], "tt0133093");
        assert_eq!(info["title"], "The Matrix");
        assert_eq!(info["wikidata_id"], "Q83495");
    }
}
