//! Fuzzy scoring for character and title lookups.
//!
//! Scores are 0-100. Matching is tiered: exact normalized equality beats
//! token-set equality, which beats containment, which beats partial token
//! overlap. Tokens compare case-insensitively and a short query token also
//! matches as a prefix ("bern" finds "Bernard Black").

use std::collections::BTreeSet;

pub const MATCH_THRESHOLD: u32 = 75;

fn tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn token_matches(query_token: &str, candidate_token: &str) -> bool {
    query_token == candidate_token
        || (query_token.len() >= 3 && candidate_token.starts_with(query_token))
}

pub fn score(query: &str, candidate: &str) -> u32 {
    let qt = tokens(query);
    let ct = tokens(candidate);
    if qt.is_empty() || ct.is_empty() {
        return 0;
    }

    if qt == ct {
        return 100;
    }

    let q_set: BTreeSet<&str> = qt.iter().map(String::as_str).collect();
    let c_set: BTreeSet<&str> = ct.iter().map(String::as_str).collect();
    if q_set == c_set {
        return 95;
    }

    let matched = q_set
        .iter()
        .filter(|q| c_set.iter().any(|c| token_matches(q, c)))
        .count();
    if matched == q_set.len() {
        return 90;
    }

    // Substring tier; very short queries are excluded so "be" does not
    // match every Bernard and Beatrice in the cast.
    let q_joined = qt.join(" ");
    if q_joined.len() >= 3 && ct.join(" ").contains(&q_joined) {
        return 85;
    }

    (80 * matched as u32) / (q_set.len().max(c_set.len()) as u32)
}

/// Best-scoring candidates at or above `cutoff`, strongest first.
pub fn extract_best<'a, I>(query: &str, candidates: I, cutoff: u32, limit: usize) -> Vec<(&'a str, u32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(&str, u32)> = candidates
        .into_iter()
        .map(|c| (c, score(query, c)))
        .filter(|(_, s)| *s >= cutoff)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins() {
        assert_eq!(score("Bernard Black", "bernard black"), 100);
        assert_eq!(score("black, bernard", "Bernard Black"), 95);
    }

    #[test]
    fn single_name_matches_full_character() {
        assert!(score("bernard", "Bernard Black") >= MATCH_THRESHOLD);
        assert!(score("bern", "Bernard Black") >= MATCH_THRESHOLD);
    }

    #[test]
    fn unrelated_names_fall_below_threshold() {
        assert!(score("bernard", "Manny Bianco") < MATCH_THRESHOLD);
        assert!(score("fran", "Customer #2") < MATCH_THRESHOLD);
        assert_eq!(score("", "Bernard"), 0);
        assert_eq!(score("bernard", ""), 0);
    }

    #[test]
    fn extract_best_ranks_and_limits() {
        let candidates = ["Bernard Black", "Bernard", "Manny Bianco", "Fran Katzenjammer"];
        let best = extract_best("bernard", candidates, MATCH_THRESHOLD, 5);
        assert_eq!(best.first().map(|(name, _)| *name), Some("Bernard"));
        assert_eq!(best.len(), 2);

        let limited = extract_best("bernard", candidates, MATCH_THRESHOLD, 1);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn prefix_matching_requires_three_chars() {
        assert!(score("be", "Bernard") < MATCH_THRESHOLD);
    }
}
