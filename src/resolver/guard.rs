// Non-film guard.
//
// Two classes of listing must never reach the metadata service: events
// that are not screenings at all (quizzes, talks, club nights), and
// composite titles that name a festival shorts programme rather than a
// single film. Broadcast recordings (NT Live, Met Opera, ...) do proceed,
// but only under the brand token gate.

use std::fmt;

use super::market::MarketProfile;
use super::normalize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyTitle,
    NonFilmEvent(String),
    ShortsProgramme,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyTitle => write!(f, "empty title"),
            SkipReason::NonFilmEvent(keyword) => {
                write!(f, "non-film event keyword: '{}'", keyword)
            }
            SkipReason::ShortsProgramme => write!(f, "festival shorts programme"),
        }
    }
}

/// Decide whether a title should skip resolution entirely.
pub fn skip_reason(title: &str, profile: &MarketProfile) -> Option<SkipReason> {
    if title.trim().is_empty() {
        return Some(SkipReason::EmptyTitle);
    }

    let norm = normalize::normalize_title(title);

    for keyword in profile.non_film_keywords() {
        if contains_phrase(&norm, keyword) {
            return Some(SkipReason::NonFilmEvent(keyword.clone()));
        }
    }

    // "LSFF: New Shorts Selection" names a slate, not a film. Either
    // keyword alone is fine ("Shorts" can be a film title; so can a
    // festival name); the combination is what marks a programme.
    let programme = profile
        .programme_keywords()
        .iter()
        .any(|k| contains_phrase(&norm, k));
    let festival = profile
        .festival_keywords()
        .iter()
        .any(|k| contains_phrase(&norm, k));
    if programme && festival {
        return Some(SkipReason::ShortsProgramme);
    }

    None
}

/// Whole-token phrase containment: "talk" must not match "talking heads".
fn contains_phrase(haystack_norm: &str, phrase_norm: &str) -> bool {
    if phrase_norm.is_empty() {
        return false;
    }
    format!(" {} ", haystack_norm).contains(&format!(" {} ", phrase_norm))
}

/// Hard gate for broadcast-brand titles: an accepted candidate must carry
/// at least one required token in its display or original title,
/// regardless of how well it scored.
pub fn passes_brand_gate(
    required_tokens: &[String],
    title: &str,
    original_title: Option<&str>,
) -> bool {
    if required_tokens.is_empty() {
        return true;
    }

    let mut haystack = title.to_lowercase();
    if let Some(original) = original_title {
        haystack.push(' ');
        haystack.push_str(&original.to_lowercase());
    }

    required_tokens.iter().any(|t| haystack.contains(t.as_str()))
}
