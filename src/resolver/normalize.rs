// Title cleaning and search query generation.
//
// Listing titles arrive wrapped in event prefixes, format suffixes,
// bracketed alternate-language titles and double-bill separators. This
// module reduces them to the ordered search query variants the engine
// feeds to the metadata service, plus the comparison-only normalized form
// used for scoring and cache keys.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::parse_year_value;

use super::market::MarketProfile;

static CLEAN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)4K\s+Restor.*$",
        r"(?i)4K\s+Digital\s+Remaster.*$",
        r"(?i)Director['’]s\s+Cut",
        r"(?i)Extended\s+Edition",
        r"(?i)Anniversary\s+Edition",
        r"(?i)Special\s+Edition",
        r"(?i)Remastered",
        r"(?i)\d+(?:st|nd|rd|th)\s+Anniversary.*$",
        r"(?i)Double\s+Bill.*$",
        r"(?i)Double\s+Feature.*$",
        // UK/US rating suffixes, anywhere in the title
        r"(?i)\(\s*(?:U|PG|12A|12|15|15\*|18|R)\s*\)",
        r"(?i)\(\s*(?:2D|3D|4DX|IMAX)\s*\)",
        // (2026 Encore)
        r"(?i)\(\s*\d{4}\s*Encore\s*\)\s*$",
        // (1990)
        r"\(\s*\d{4}\s*\)\s*$",
        r"(?i)\(.*?version\)",
        // [XXX] - e.g. [Kimi no Na wa.]
        r"\[.*?\]",
        r"(?i)\s+Encore\s*$",
        // 2025-26 Season
        r"(?i)\s+\d{4}-\d{2,4}\s+Season\s*$",
        r"(?i)\s+Sing[- ]?A[- ]?Long!?\s*$",
        // Accessibility noise words at end of string
        r"(?i)\b(?:parent and baby|carer|hard of hearing|captioned|subtitled|relaxed|autism|dementia|HOH|babes-in-arms)(?:\s+screening)?\s*$",
        r"(?i)\s+UK\s+PREMIERE\s*$",
        // " + director Q&A" and similar post-film event tails
        r"(?i)\s(?:\+|–|—|-)\s+(?:intro|discussion|q\s*&\s*a|qa|panel|talk|shorts|live score|live music|director|presented by|hosted by|with|screening|recorded|cast).*$",
        r"(?i)\s(?:2D|3D)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("clean pattern is valid"))
    .collect()
});

static RE_SPACE_COLLAPSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_BRACKET_ALT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());
static RE_AKA_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^aka[\s:]+").unwrap());
static RE_AKA_TAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\baka\s+(.+)$").unwrap());
static RE_YEAR_PAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d{4})\)").unwrap());
static RE_TRAILING_YEAR_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*(\d{4})\s*\)\s*$").unwrap());
static RE_BILL_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+[+&]\s+").unwrap());
static RE_NOISE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)doors|film|certificate|digital|book here|not for the easily").unwrap()
});

const TRIM_CHARS: &[char] = &[' ', '.', ',', ':', ';'];

/// Fragments that survive a double-bill split but name post-film events,
/// not films.
const STOP_FRAGMENTS: &[&str] = &[
    "intro",
    "q",
    "a",
    "qa",
    "discussion",
    "panel",
    "talk",
    "with",
    "recorded",
    "cast",
];

/// One candidate search string derived from a raw listing title. Earlier
/// variants are tried first and preferred on tie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryVariant {
    pub text: String,
    /// Release year embedded in the variant text, e.g. from an alias
    /// value like "Hausu (1977)".
    pub year_hint: Option<i32>,
    /// Variant came from the curated alias table.
    pub from_alias: bool,
}

/// Comparison-only canonical form: diacritics folded to ASCII, lowercased,
/// punctuation collapsed to single spaces. Never shown to users.
pub fn normalize_title(title: &str) -> String {
    let mut folded = String::with_capacity(title.len());
    for c in title.chars() {
        fold_char(c, &mut folded);
    }

    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Fold common Latin diacritics to their ASCII base letter. Characters
/// outside Latin scripts fall through untouched and are dropped by the
/// alphanumeric filter in `normalize_title`, matching the behavior of an
/// NFKD decomposition followed by an ASCII re-encode.
fn fold_char(c: char, out: &mut String) {
    match c {
        'À'..='Å' | 'à'..='å' | 'Ā' | 'ā' | 'Ă' | 'ă' | 'Ą' | 'ą' => out.push('a'),
        'Ç' | 'ç' | 'Ć' | 'ć' | 'Č' | 'č' => out.push('c'),
        'È'..='Ë' | 'è'..='ë' | 'Ē' | 'ē' | 'Ė' | 'ė' | 'Ę' | 'ę' | 'Ě' | 'ě' => out.push('e'),
        'Ì'..='Ï' | 'ì'..='ï' | 'Ī' | 'ī' | 'İ' | 'ı' => out.push('i'),
        'Ñ' | 'ñ' | 'Ń' | 'ń' | 'Ň' | 'ň' => out.push('n'),
        'Ò'..='Ö' | 'ò'..='ö' | 'Ø' | 'ø' | 'Ō' | 'ō' | 'Ő' | 'ő' => out.push('o'),
        'Ù'..='Ü' | 'ù'..='ü' | 'Ū' | 'ū' | 'Ů' | 'ů' => out.push('u'),
        'Ý' | 'ý' | 'ÿ' => out.push('y'),
        'Š' | 'š' | 'Ś' | 'ś' | 'Ş' | 'ş' => out.push('s'),
        'Ž' | 'ž' | 'Ź' | 'ź' | 'Ż' | 'ż' => out.push('z'),
        'Ð' | 'ð' | 'Ď' | 'ď' => out.push('d'),
        'Ł' | 'ł' => out.push('l'),
        'Ţ' | 'ţ' | 'Ť' | 'ť' => out.push('t'),
        'Ř' | 'ř' => out.push('r'),
        'Ğ' | 'ğ' => out.push('g'),
        'ß' => out.push_str("ss"),
        'Æ' | 'æ' => out.push_str("ae"),
        'Œ' | 'œ' => out.push_str("oe"),
        _ => out.push(c),
    }
}

/// Strip event prefixes, rating/format suffixes and bracketed segments.
/// Returns the trimmed input unchanged if cleaning would remove everything.
pub fn clean_title(title: &str, profile: &MarketProfile) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut cleaned = profile.strip_event_prefix(trimmed).to_string();
    for re in CLEAN_PATTERNS.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = RE_SPACE_COLLAPSE.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim_matches(TRIM_CHARS);

    if cleaned.is_empty() {
        trimmed.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Some venues publish whole event blurbs as the title. Cut at the first
/// marketing marker once the title is implausibly long.
pub fn truncate_noisy_title(title: &str) -> &str {
    if title.len() < 80 {
        return title;
    }
    if let Some(m) = RE_NOISE_MARKER.find(title) {
        return title[..m.start()].trim_end();
    }
    title
}

/// First plausible `(YYYY)` parenthetical in the title, if any.
pub fn extract_year_from_title(title: &str) -> Option<i32> {
    RE_YEAR_PAREN
        .captures_iter(title)
        .find_map(|caps| parse_year_value(&caps[1]))
}

/// Build the ordered, de-duplicated search query variants for a raw
/// listing title. Empty input yields an empty list; anything else yields
/// at least one variant.
pub fn generate_queries(title: &str, profile: &MarketProfile) -> Vec<QueryVariant> {
    let raw = title.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let base = truncate_noisy_title(raw);

    let mut variants: Vec<QueryVariant> = Vec::new();

    let cleaned = clean_title(base, profile);
    push_variant(&mut variants, &cleaned, false);
    if let Some(alias) = profile.alias_for(&cleaned) {
        push_variant(&mut variants, alias, true);
    }

    // Bracketed alternate titles, extracted before cleaning strips them.
    for caps in RE_BRACKET_ALT.captures_iter(base) {
        let alt = RE_AKA_PREFIX.replace(caps[1].trim(), "");
        let alt_clean = clean_title(&alt, profile);
        push_variant(&mut variants, &alt_clean, false);
        if let Some(alias) = profile.alias_for(&alt_clean) {
            push_variant(&mut variants, alias, true);
        }
    }

    // "Title aka Other Title" outside brackets.
    if let Some(caps) = RE_AKA_TAIL.captures(base) {
        let alt_clean = clean_title(&caps[1], profile);
        push_variant(&mut variants, &alt_clean, false);
        if let Some(alias) = profile.alias_for(&alt_clean) {
            push_variant(&mut variants, alias, true);
        }
    }

    // Double bills: each side is its own film.
    if cleaned.contains(" + ") || cleaned.contains(" & ") {
        for part in RE_BILL_SPLIT.split(&cleaned) {
            let part_clean = clean_title(part, profile);
            if part_clean.len() <= 3 {
                continue;
            }
            if STOP_FRAGMENTS.contains(&part_clean.to_lowercase().as_str()) {
                continue;
            }
            push_variant(&mut variants, &part_clean, false);
        }
    }

    // "NT Live: Hamlet" -> also search "Hamlet"; the brand gate keeps the
    // suffix variant from matching an unrelated drama.
    if profile.brand_before_colon(&cleaned) {
        if let Some((_, suffix)) = cleaned.split_once(':') {
            push_variant(&mut variants, suffix, false);
        }
    }

    variants
}

fn push_variant(variants: &mut Vec<QueryVariant>, text: &str, from_alias: bool) {
    let mut text = text.trim_matches(TRIM_CHARS).to_string();
    let mut year_hint = None;

    if let Some(caps) = RE_TRAILING_YEAR_PAREN.captures(&text) {
        year_hint = parse_year_value(&caps[1]);
        let start = caps.get(0).map(|m| m.start()).unwrap_or(text.len());
        text.truncate(start);
        text = text.trim_matches(TRIM_CHARS).to_string();
    }

    if text.is_empty() {
        return;
    }
    let duplicate = variants.iter().any(|v| {
        v.text.eq_ignore_ascii_case(&text) && v.year_hint == year_hint && v.from_alias == from_alias
    });
    if !duplicate {
        variants.push(QueryVariant {
            text,
            year_hint,
            from_alias,
        });
    }
}
