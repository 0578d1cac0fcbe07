//! Fuzzy case-name to folder resolution.
//!
//! Raw case names ("Smith v. Jones") rarely equal folder names verbatim
//! ("Smith v. Jones Manufacturing Inc."), so matching reduces a case name to
//! its party names first, then scores each party against every catalog path
//! with a token-sort ratio. Noise words and corporate suffixes are stripped
//! before scoring since they are the dominant source of score dilution.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches " v. ", " v ", " vs. ", " vs " between parties.
static VS_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+vs?\.?\s+").unwrap());
static IN_RE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^in\s+re:?\s+").unwrap());
static MATTER_OF_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^matter\s+of:?\s+").unwrap());
static CORPORATE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i),?\s+(Inc\.?|LLC\.?|Corp\.?|Ltd\.?|Co\.?)$").unwrap());

const NOISE_WORDS: [&str; 14] = [
    "the",
    "of",
    "and",
    "or",
    "inc",
    "llc",
    "corp",
    "ltd",
    "co",
    "estate",
    "trust",
    "case",
    "matter",
    "proceeding",
];

/// Result of resolving a case name: the winning folder, its confidence
/// score (0-100), and the party token that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseMatch {
    pub folder_path: String,
    pub score: f64,
    pub matched_on: String,
}

/// Extract party names from a case name (1-2 tokens).
///
/// "In re:" and "Matter of:" cases yield a single party; a "v."/"vs"
/// separator splits once into two; anything else is one party. Each party
/// is cleaned of corporate suffixes and noise words, preserving word order.
pub fn extract_parties(case_name: &str) -> Vec<String> {
    let case_name = case_name.split_whitespace().collect::<Vec<_>>().join(" ");

    for prefix in [&*IN_RE_PREFIX, &*MATTER_OF_PREFIX] {
        if let Some(found) = prefix.find(&case_name) {
            let party = clean_party(&case_name[found.end()..]);
            return if party.is_empty() { Vec::new() } else { vec![party] };
        }
    }

    if let Some(separator) = VS_SEPARATOR.find(&case_name) {
        return [
            &case_name[..separator.start()],
            &case_name[separator.end()..],
        ]
        .iter()
        .map(|side| clean_party(side))
        .filter(|party| !party.is_empty())
        .collect();
    }

    let party = clean_party(&case_name);
    if party.is_empty() {
        Vec::new()
    } else {
        vec![party]
    }
}

fn clean_party(party: &str) -> String {
    let party = CORPORATE_SUFFIX.replace(party.trim(), "");
    party
        .split_whitespace()
        .filter(|word| word.len() > 1 && !NOISE_WORDS.contains(&word.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-sort similarity ratio on a 0-100 scale.
///
/// Both sides are lowercased, stripped of punctuation, and their tokens
/// sorted before an indel ratio is taken, so word order and decoration do
/// not dilute the score.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    indel_ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn sorted_tokens(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            normalized.extend(c.to_lowercase());
        } else {
            normalized.push(' ');
        }
    }
    let mut tokens: Vec<&str> = normalized.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    let common = lcs_length(&a, &b);
    100.0 * 2.0 * common as f64 / (a.len() + b.len()) as f64
}

fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                current[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut current);
        current.fill(0);
    }
    prev[b.len()]
}

/// Matches extracted parties against catalog folder paths.
pub struct FolderMatcher {
    min_score: f64,
}

impl FolderMatcher {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }

    /// The single best-scoring folder across all party tokens, or `None`
    /// when nothing reaches the minimum score. Parties are scored against
    /// the final path segment of each folder. Comparison is strictly
    /// greater, so the first token to reach a score wins ties in extraction
    /// order, and earlier catalog paths win ties within a token.
    pub fn find_best_match(&self, case_name: &str, folder_paths: &[String]) -> Option<CaseMatch> {
        let parties = extract_parties(case_name);
        if parties.is_empty() {
            log::warn!("no parties extracted from case name '{case_name}'");
            return None;
        }

        let mut best: Option<CaseMatch> = None;
        for party in &parties {
            for path in folder_paths {
                let score = token_sort_ratio(party, folder_basename(path));
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(CaseMatch {
                        folder_path: path.clone(),
                        score,
                        matched_on: party.clone(),
                    });
                }
            }
        }

        match best {
            Some(found) if found.score >= self.min_score => {
                log::info!(
                    "matched '{}' to '{}' (score {:.1}, via '{}')",
                    case_name,
                    found.folder_path,
                    found.score,
                    found.matched_on
                );
                Some(found)
            }
            Some(found) => {
                log::warn!(
                    "no folder match for '{}' (best {:.1} below minimum {:.1})",
                    case_name,
                    found.score,
                    self.min_score
                );
                None
            }
            None => None,
        }
    }
}

fn folder_basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}
