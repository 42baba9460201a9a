// Per-market matching vocabulary.
//
// The vocabularies that differ between deployments (London, Manchester,
// Tokyo) all live here: what counts as a non-film event, which composite
// titles name a festival slate, which broadcast brands need gating, which
// event prefixes get stripped, and the hand-curated alias table. One
// shared engine, parameterised by profile, instead of per-market forks.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use super::normalize;

/// A recognized live-broadcast series (theatre, opera, ballet).
///
/// `phrases` recognize the brand in a listing title; `required_tokens` must
/// appear in an accepted candidate's display or original title, so a
/// broadcast listing can never resolve to an unrelated narrative film that
/// happens to share the play's name.
#[derive(Debug, Clone, Deserialize)]
pub struct BrandRule {
    pub phrases: Vec<String>,
    pub required_tokens: Vec<String>,
}

/// Raw TOML shape of a profile file. Any omitted list falls back to the
/// built-in defaults rather than to empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ProfileFile {
    non_film_keywords: Option<Vec<String>>,
    programme_keywords: Option<Vec<String>>,
    festival_keywords: Option<Vec<String>>,
    event_prefixes: Option<Vec<String>>,
    brands: Option<Vec<BrandRule>>,
    aliases: Option<HashMap<String, String>>,
}

#[derive(Debug)]
pub struct MarketProfile {
    non_film_keywords: Vec<String>,
    programme_keywords: Vec<String>,
    festival_keywords: Vec<String>,
    brands: Vec<BrandRule>,
    aliases: HashMap<String, String>,
    prefix_re: Regex,
}

const DEFAULT_NON_FILM_KEYWORDS: &[&str] = &[
    "open mic",
    "free entry",
    "quiz",
    "trivia",
    "workshop",
    "masterclass",
    "panel",
    "discussion",
    "in conversation",
    "live podcast",
    "book launch",
    "stand up",
    "comedy night",
    "live music",
    "dj set",
    "club night",
    "karaoke",
    "an evening with",
    "film quiz",
];

const DEFAULT_PROGRAMME_KEYWORDS: &[&str] = &[
    "shorts",
    "short film",
    "spotlight",
    "programme",
    "program",
    "selection",
    "showcase",
];

const DEFAULT_FESTIVAL_KEYWORDS: &[&str] = &[
    "festival",
    "film fest",
    "lsff",
    "anz",
    "docfest",
    "fringe",
];

const DEFAULT_EVENT_PREFIXES: &[&str] = &[
    "Preview",
    "Premiere",
    "UK Premiere",
    "Relaxed Screening",
    "Family Screening",
    "Staff Pick",
    "Member's Request",
    "Member's Preview",
    "Members' Preview",
    "In Focus",
    "Throwback",
    "Babykino",
    "Carers & Babies",
    "Toddler Club",
    "Club Room",
    "Dog-Friendly Screening",
    "Dog-Friendly",
    "Sensory Friendly",
    "Autism Friendly",
    "Drink & Dine",
    "Mystery Movie",
    "Secret Movie",
    "Surprise Movie",
    "Bar Trash",
    "OffBeat",
    "Pink Palace",
    "Films For Workers",
    "Phoenix Classics",
    "Cine-Real presents",
    "Green Screen",
    "Video Bazaar presents",
    "TV Preview",
    "DocFest Spotlights",
    "DOCHOUSE",
    "Scanners Inc. Presents",
    "Deleted Scenes Presents",
    "Holocaust Memorial Day",
    "Saturday Morning Picture Club",
    "Queer East presents",
    "Narrow Margin presents",
    "Crafty Movie Night",
    "LSFF",
    "London Short Film Festival",
    "ANZ Film Festival",
    "ANZ FF",
];

impl Default for MarketProfile {
    fn default() -> Self {
        Self::build(ProfileFile::default()).expect("built-in market profile is valid")
    }
}

impl MarketProfile {
    /// Load a profile from a TOML file, filling omitted lists with defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read market profile {}", path.display()))?;
        let file: ProfileFile = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse market profile {}", path.display()))?;
        Self::build(file)
    }

    fn build(file: ProfileFile) -> Result<Self> {
        let defaults = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let non_film = file
            .non_film_keywords
            .unwrap_or_else(|| defaults(DEFAULT_NON_FILM_KEYWORDS));
        let programme = file
            .programme_keywords
            .unwrap_or_else(|| defaults(DEFAULT_PROGRAMME_KEYWORDS));
        let festival = file
            .festival_keywords
            .unwrap_or_else(|| defaults(DEFAULT_FESTIVAL_KEYWORDS));
        let prefixes = file
            .event_prefixes
            .unwrap_or_else(|| defaults(DEFAULT_EVENT_PREFIXES));
        let brands = file.brands.unwrap_or_else(default_brands);
        let aliases = file.aliases.unwrap_or_else(default_aliases);

        // Vocabulary matching happens in normalized space.
        let normalize_all =
            |list: Vec<String>| -> Vec<String> {
                list.iter()
                    .map(|k| normalize::normalize_title(k))
                    .filter(|k| !k.is_empty())
                    .collect()
            };

        let brands = brands
            .into_iter()
            .map(|rule| BrandRule {
                phrases: rule.phrases.iter().map(|p| p.to_lowercase()).collect(),
                required_tokens: rule
                    .required_tokens
                    .iter()
                    .map(|t| t.to_lowercase())
                    .collect(),
            })
            .collect();

        let aliases = aliases
            .into_iter()
            .map(|(k, v)| (normalize::normalize_title(&k), v))
            .collect();

        let alternation = prefixes
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        let prefix_re = Regex::new(&format!(r"(?i)^\s*(?:{})\s*[:\-–—]\s*", alternation))
            .context("Failed to compile event prefix pattern")?;

        Ok(Self {
            non_film_keywords: normalize_all(non_film),
            programme_keywords: normalize_all(programme),
            festival_keywords: normalize_all(festival),
            brands,
            aliases,
            prefix_re,
        })
    }

    pub fn non_film_keywords(&self) -> &[String] {
        &self.non_film_keywords
    }

    pub fn programme_keywords(&self) -> &[String] {
        &self.programme_keywords
    }

    pub fn festival_keywords(&self) -> &[String] {
        &self.festival_keywords
    }

    /// Strip leading event prefixes bound to a colon or dash. Stacked
    /// prefixes ("Preview: Relaxed Screening: X") are stripped in turn.
    pub fn strip_event_prefix<'a>(&self, title: &'a str) -> &'a str {
        let mut rest = title;
        while let Some(m) = self.prefix_re.find(rest) {
            rest = &rest[m.end()..];
        }
        rest
    }

    /// Curated replacement for a known misspelling or localized title.
    pub fn alias_for(&self, text: &str) -> Option<&str> {
        let key = normalize::normalize_title(text);
        self.aliases.get(&key).map(String::as_str)
    }

    fn brand_rule_for(&self, title: &str) -> Option<&BrandRule> {
        let lower = title.to_lowercase();
        self.brands
            .iter()
            .find(|rule| rule.phrases.iter().any(|p| lower.contains(p.as_str())))
    }

    pub fn has_broadcast_brand(&self, title: &str) -> bool {
        self.brand_rule_for(title).is_some()
    }

    /// Tokens an accepted candidate must carry for this title; empty for
    /// ordinary film listings.
    pub fn required_brand_tokens(&self, title: &str) -> Vec<String> {
        self.brand_rule_for(title)
            .map(|rule| rule.required_tokens.clone())
            .unwrap_or_default()
    }

    /// True when the text before the first colon ends with a broadcast
    /// brand phrase ("NT Live: Hamlet" -> true, "Avatar: Fire and Ash" ->
    /// false). Used to emit the colon suffix as its own query variant.
    pub fn brand_before_colon(&self, title: &str) -> bool {
        let Some((before, _)) = title.split_once(':') else {
            return false;
        };
        let before = before.trim().to_lowercase();
        self.brands
            .iter()
            .any(|rule| rule.phrases.iter().any(|p| before.ends_with(p.as_str())))
    }
}

fn default_brands() -> Vec<BrandRule> {
    let rule = |phrases: &[&str], tokens: &[&str]| BrandRule {
        phrases: phrases.iter().map(|s| s.to_string()).collect(),
        required_tokens: tokens.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        rule(
            &["nt live", "national theatre live"],
            &["national theatre", "nt live", "theatre"],
        ),
        rule(
            &["met opera"],
            &["met opera", "metropolitan opera", "opera"],
        ),
        rule(&["royal opera", "rbo live", "rbo encore"], &["royal opera", "opera"]),
        rule(&["royal ballet"], &["royal ballet", "ballet"]),
        rule(&["bolshoi ballet"], &["bolshoi", "ballet"]),
        rule(
            &["exhibition on screen"],
            &["exhibition on screen", "exhibition"],
        ),
    ]
}

fn default_aliases() -> HashMap<String, String> {
    [
        // Romanized Japanese title used by several repertory cinemas.
        ("Hausu", "Hausu (1977)"),
        // Localized release title that confuses fuzzy search.
        ("Les Diaboliques", "Diabolique (1955)"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
