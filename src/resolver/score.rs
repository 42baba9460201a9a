// Candidate confidence scoring.
//
// The score is the sum of an ordered list of independent rules, each a
// pure function of the prepared input returning a signed contribution,
// clamped to [0, 1] at the end. Rules can be tested and tuned in
// isolation; thresholds and the more debatable constants live in
// `MatchTuning` rather than in the rule bodies.

use std::collections::HashSet;

use serde::Deserialize;

use crate::services::tmdb::MovieCandidate;

use super::normalize::normalize_title;

/// Thresholds and tunable constants for matching. The year-forgiveness
/// constants in particular are heuristics, not laws; deployments can
/// override them from the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchTuning {
    /// Minimum confidence to accept a fresh candidate.
    pub accept_threshold: f64,
    /// Stricter acceptance for broadcast-brand titles.
    pub broadcast_accept_threshold: f64,
    /// Threshold a cached entry must re-reach on lookup.
    pub revalidate_threshold: f64,
    /// Year gap beyond which a candidate is penalized heavily.
    pub year_gap_limit: i32,
    /// Similarity ratio treated as a near-exact title match.
    pub near_exact_ratio: f64,
    /// Runtime tolerance for detail validation and cache re-validation.
    pub runtime_tolerance_min: i32,
    /// Declared runtime above which the relaxed tolerance applies
    /// (intermission-inclusive listings).
    pub long_film_runtime_min: i32,
    pub long_film_tolerance_min: i32,
    /// Confidence added to variants from the curated alias table.
    pub alias_bonus: f64,
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self {
            accept_threshold: 0.65,
            broadcast_accept_threshold: 0.70,
            revalidate_threshold: 0.70,
            year_gap_limit: 20,
            near_exact_ratio: 0.90,
            runtime_tolerance_min: 30,
            long_film_runtime_min: 180,
            long_film_tolerance_min: 45,
            alias_bonus: 0.20,
        }
    }
}

/// Runtime tolerance for a declared runtime, relaxed for long films whose
/// cinema listings often include an intermission.
pub fn runtime_tolerance(declared_runtime: i32, tuning: &MatchTuning) -> i32 {
    if declared_runtime > tuning.long_film_runtime_min {
        tuning.long_film_tolerance_min
    } else {
        tuning.runtime_tolerance_min
    }
}

/// Listing-side context a candidate is scored against.
#[derive(Debug, Clone, Default)]
pub struct ScoreContext {
    pub declared_year: Option<i32>,
    pub declared_runtime: Option<i32>,
    /// Broadcast-brand titles never get the screening-year forgiveness.
    pub strict_year: bool,
    /// The query variant came from the curated alias table.
    pub alias_sourced: bool,
    pub current_year: i32,
}

/// Candidate-side facts, independent of where the candidate came from
/// (fresh search hit or cached film re-validated as a pseudo-candidate).
#[derive(Debug, Clone)]
pub struct CandidateFacts<'a> {
    pub title: &'a str,
    pub original_title: Option<&'a str>,
    pub release_year: Option<i32>,
    pub runtime: Option<i32>,
    pub vote_count: i64,
}

impl<'a> From<&'a MovieCandidate> for CandidateFacts<'a> {
    fn from(candidate: &'a MovieCandidate) -> Self {
        Self {
            title: &candidate.title,
            original_title: candidate.original_title.as_deref(),
            release_year: candidate.release_year(),
            // Search hits do not carry a runtime; it only becomes known
            // at detail validation.
            runtime: None,
            vote_count: candidate.vote_count.unwrap_or(0),
        }
    }
}

/// Prepared input shared by all scoring rules: similarity ratios are
/// computed once, rules only read them.
struct ScoreInput<'a> {
    title_ratio: f64,
    original_ratio: f64,
    best_ratio: f64,
    token_overlap: f64,
    original_has_non_ascii: bool,
    query_token_count: usize,
    facts: &'a CandidateFacts<'a>,
    ctx: &'a ScoreContext,
    tuning: &'a MatchTuning,
}

type ScoreRule = fn(&ScoreInput) -> f64;

const RULES: &[(&str, ScoreRule)] = &[
    ("title_similarity", title_similarity),
    ("foreign_original", foreign_original),
    ("year_proximity", year_proximity),
    ("runtime_proximity", runtime_proximity),
    ("vote_sanity", vote_sanity),
    ("short_query", short_query),
    ("alias_confidence", alias_confidence),
];

/// Confidence that `facts` is the film the query names, in [0, 1].
pub fn score_candidate(
    query: &str,
    facts: &CandidateFacts<'_>,
    ctx: &ScoreContext,
    tuning: &MatchTuning,
) -> f64 {
    let query_norm = normalize_title(query);
    if query_norm.is_empty() {
        return 0.0;
    }

    let title_norm = normalize_title(facts.title);
    let original_norm = facts
        .original_title
        .map(normalize_title)
        .filter(|o| !o.is_empty() && *o != title_norm);

    let title_ratio = if title_norm.is_empty() {
        0.0
    } else {
        lcs_ratio(&query_norm, &title_norm)
    };
    let original_ratio = original_norm
        .as_deref()
        .map(|o| lcs_ratio(&query_norm, o))
        .unwrap_or(0.0);

    if title_norm.is_empty() && original_norm.is_none() {
        return 0.0;
    }

    let best_ratio = title_ratio.max(original_ratio);
    // Token overlap against whichever title produced the best ratio.
    let overlap_target: &str = if original_ratio > title_ratio {
        original_norm.as_deref().unwrap_or(title_norm.as_str())
    } else if !title_norm.is_empty() {
        title_norm.as_str()
    } else {
        original_norm.as_deref().unwrap_or("")
    };
    let token_overlap = token_jaccard(&query_norm, overlap_target);

    let input = ScoreInput {
        title_ratio,
        original_ratio,
        best_ratio,
        token_overlap,
        original_has_non_ascii: facts
            .original_title
            .map(|o| !o.is_ascii())
            .unwrap_or(false),
        query_token_count: query_norm.split_whitespace().count(),
        facts,
        ctx,
        tuning,
    };

    let mut score = 0.0;
    for &(name, rule) in RULES {
        let contribution = rule(&input);
        if contribution != 0.0 {
            tracing::trace!(rule = name, contribution, "score contribution");
        }
        score += contribution;
    }
    score.clamp(0.0, 1.0)
}

fn title_similarity(input: &ScoreInput) -> f64 {
    0.7 * input.best_ratio + 0.3 * input.token_overlap
}

/// Matching a foreign film by its native title is a strong signal, not a
/// weak one.
fn foreign_original(input: &ScoreInput) -> f64 {
    let mut bonus = 0.0;
    if input.original_ratio > input.title_ratio + 0.1 {
        bonus += 0.10;
    }
    if input.original_has_non_ascii && (input.original_ratio > 0.7 || input.title_ratio > 0.85) {
        bonus += 0.05;
    }
    bonus
}

fn year_proximity(input: &ScoreInput) -> f64 {
    let (Some(declared), Some(release)) = (input.ctx.declared_year, input.facts.release_year)
    else {
        return 0.0;
    };
    let diff = (release - declared).abs();

    // A declared year at or past the current year is usually the screening
    // date, not the release date: an old film legitimately screened this
    // year. Forgive the gap when the title match leaves little doubt.
    let forgiven = declared >= input.ctx.current_year
        && input.best_ratio > input.tuning.near_exact_ratio
        && !input.ctx.strict_year;

    if diff == 0 {
        0.15
    } else if diff == 1 {
        0.05
    } else if diff > input.tuning.year_gap_limit {
        if forgiven {
            0.0
        } else {
            -0.3
        }
    } else if forgiven {
        0.0
    } else {
        -0.1
    }
}

/// Separates short films and featurettes from features sharing a title.
fn runtime_proximity(input: &ScoreInput) -> f64 {
    let (Some(declared), Some(runtime)) = (input.ctx.declared_runtime, input.facts.runtime) else {
        return 0.0;
    };
    let diff = (declared - runtime).abs();
    if diff <= 15 {
        0.10
    } else if diff > 40 {
        -0.25
    } else {
        0.0
    }
}

/// Obscure homonym entries have almost no votes; well-known films have
/// thousands.
fn vote_sanity(input: &ScoreInput) -> f64 {
    if input.facts.vote_count > 5000 {
        0.05
    } else if input.facts.vote_count < 5 {
        -0.05
    } else {
        0.0
    }
}

/// One-word titles collide constantly; demand more evidence.
fn short_query(input: &ScoreInput) -> f64 {
    if input.query_token_count > 1 {
        return 0.0;
    }
    let mut penalty = 0.0;
    if input.facts.vote_count < 50 {
        penalty -= 0.25;
    } else if input.facts.vote_count < 200 {
        penalty -= 0.10;
    }
    if input.best_ratio < 0.95 {
        penalty -= 0.10;
    }
    penalty
}

/// Curated aliases assert the mapping is correct; trust them past the
/// noise floor that raw similarity alone cannot clear.
fn alias_confidence(input: &ScoreInput) -> f64 {
    if input.ctx.alias_sourced {
        input.tuning.alias_bonus
    } else {
        0.0
    }
}

/// Character-level longest-common-subsequence ratio, `2·lcs/(|a|+|b|)`.
/// Equivalent measure to difflib-style sequence matching.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            curr[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(curr[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[b.len()];
    (2.0 * lcs as f64) / ((a.len() + b.len()) as f64)
}

/// Jaccard overlap of whitespace-split tokens.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(title: &str) -> CandidateFacts<'_> {
        CandidateFacts {
            title,
            original_title: None,
            release_year: None,
            runtime: None,
            vote_count: 1000,
        }
    }

    fn ctx() -> ScoreContext {
        ScoreContext {
            current_year: 2026,
            ..Default::default()
        }
    }

    #[test]
    fn test_lcs_ratio() {
        assert_eq!(lcs_ratio("abc", "abc"), 1.0);
        assert_eq!(lcs_ratio("abc", "xyz"), 0.0);
        assert_eq!(lcs_ratio("", ""), 1.0);
        assert_eq!(lcs_ratio("abc", ""), 0.0);
        // "hausu" vs "house": common subsequence "hus"
        let r = lcs_ratio("hausu", "house");
        assert!((r - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_token_jaccard() {
        assert_eq!(token_jaccard("the red shoes", "the red shoes"), 1.0);
        assert_eq!(token_jaccard("red shoes", "blue shoes"), 1.0 / 3.0);
        assert_eq!(token_jaccard("", "anything"), 0.0);
    }

    #[test]
    fn test_exact_match_scores_high() {
        let tuning = MatchTuning::default();
        let score = score_candidate("Amélie", &facts("Amélie"), &ctx(), &tuning);
        assert!(score >= tuning.accept_threshold, "score {score}");
    }

    #[test]
    fn test_score_is_clamped() {
        let tuning = MatchTuning::default();
        let mut f = facts("Amélie");
        f.vote_count = 10_000;
        f.release_year = Some(2001);
        let context = ScoreContext {
            declared_year: Some(2001),
            ..ctx()
        };
        let score = score_candidate("Amélie", &f, &context, &tuning);
        assert!(score <= 1.0);
        assert!(score > 0.9);

        let zero = score_candidate("Amélie", &facts("Zzzz Qqqq"), &ctx(), &tuning);
        assert!((0.0..=1.0).contains(&zero));
    }

    #[test]
    fn test_year_mismatch_penalized() {
        let tuning = MatchTuning::default();
        let mut f = facts("Hamlet");
        f.release_year = Some(1948);
        let context = ScoreContext {
            declared_year: Some(1996),
            ..ctx()
        };
        let with_gap = score_candidate("Hamlet", &f, &context, &tuning);
        let without = score_candidate("Hamlet", &f, &ctx(), &tuning);
        assert!(with_gap < without);
    }

    #[test]
    fn test_screening_year_forgiveness() {
        let tuning = MatchTuning::default();
        let mut f = facts("The Red Shoes");
        f.release_year = Some(1948);

        // 2026 declared for a 1948 film: screening year, near-exact title.
        let screening = ScoreContext {
            declared_year: Some(2026),
            ..ctx()
        };
        let forgiven = score_candidate("The Red Shoes", &f, &screening, &tuning);

        // Same gap but declared 1996: a real year mismatch.
        let mismatched = ScoreContext {
            declared_year: Some(1996),
            ..ctx()
        };
        let penalized = score_candidate("The Red Shoes", &f, &mismatched, &tuning);

        assert!(forgiven > penalized);
        assert!(forgiven >= tuning.accept_threshold);

        // Broadcast titles never get the forgiveness.
        let strict = ScoreContext {
            declared_year: Some(2026),
            strict_year: true,
            ..ctx()
        };
        let strict_score = score_candidate("The Red Shoes", &f, &strict, &tuning);
        assert!(strict_score < forgiven);
    }

    #[test]
    fn test_runtime_gap_separates_short_from_feature() {
        let tuning = MatchTuning::default();
        let mut f = facts("The Heist");
        f.runtime = Some(11);
        let context = ScoreContext {
            declared_runtime: Some(95),
            ..ctx()
        };
        let short_film = score_candidate("The Heist", &f, &context, &tuning);

        f.runtime = Some(98);
        let feature = score_candidate("The Heist", &f, &context, &tuning);
        assert!(feature - short_film >= 0.2);
    }

    #[test]
    fn test_short_query_penalty() {
        let tuning = MatchTuning::default();
        let mut f = facts("Pi");
        f.vote_count = 3;
        let obscure = score_candidate("Pi", &f, &ctx(), &tuning);

        f.vote_count = 9000;
        let known = score_candidate("Pi", &f, &ctx(), &tuning);
        assert!(known > obscure);
    }

    #[test]
    fn test_foreign_original_bonus() {
        let tuning = MatchTuning::default();
        let with_original = CandidateFacts {
            title: "Spirited Away",
            original_title: Some("千と千尋の神隠し"),
            release_year: None,
            runtime: None,
            vote_count: 3,
        };
        let mut plain = facts("Spirited Away");
        plain.vote_count = 3;
        let a = score_candidate("Spirited Away", &with_original, &ctx(), &tuning);
        let b = score_candidate("Spirited Away", &plain, &ctx(), &tuning);
        assert!(a > b);
    }

    #[test]
    fn test_alias_bonus_lifts_marginal_match() {
        let tuning = MatchTuning::default();
        let mut f = facts("House");
        f.original_title = Some("ハウス");
        f.release_year = Some(1977);
        f.vote_count = 700;

        let direct = score_candidate("Hausu", &f, &ctx(), &tuning);
        assert!(direct < tuning.accept_threshold);

        let via_alias = ScoreContext {
            declared_year: Some(1977),
            alias_sourced: true,
            ..ctx()
        };
        let aliased = score_candidate("Hausu", &f, &via_alias, &tuning);
        assert!(aliased >= tuning.accept_threshold, "score {aliased}");
    }

    #[test]
    fn test_runtime_tolerance_relaxed_for_long_films() {
        let tuning = MatchTuning::default();
        assert_eq!(runtime_tolerance(95, &tuning), 30);
        assert_eq!(runtime_tolerance(181, &tuning), 45);
    }
}
