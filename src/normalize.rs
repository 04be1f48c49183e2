//! Canonical comparison keys for custodian and instrument names
//!
//! Imports spell the same entity in different ways ("RUMO S.A.", "Rumo SA",
//! "BANCO X LTDA" vs "Banco X"). The merge pass groups entities by the key
//! produced here. The rules are a heuristic: two different bond issues of the
//! same issuer can collide, and a ticker rename is not detected.

use once_cell::sync::Lazy;
use regex::Regex;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[./-]").expect("valid regex"));

/// Trailing corporate suffixes, tried in this order
static SUFFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"\s+S\s*A\s*$", r"\s+SA\s*$", r"\s+LTDA\s*$"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid regex"))
        .collect()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Map a display name to its canonical comparison key.
///
/// Upper-cases, turns `.`, `-` and `/` into spaces, strips trailing `S A`,
/// `SA` and `LTDA` tokens, collapses whitespace and trims. Suffix stripping
/// repeats until nothing changes so that `normalize(normalize(x)) ==
/// normalize(x)` also holds for stacked suffixes like "X SA LTDA".
///
/// # Examples
/// ```
/// use holdings::normalize::normalize;
///
/// assert_eq!(normalize("RUMO S.A."), "RUMO");
/// assert_eq!(normalize("rumo SA"), "RUMO");
/// assert_eq!(normalize("Banco X LTDA"), "BANCO X");
/// ```
pub fn normalize(name: &str) -> String {
    let upper = name.to_uppercase();
    let mut key = PUNCTUATION.replace_all(&upper, " ").into_owned();

    loop {
        let before = key.len();
        for suffix in SUFFIXES.iter() {
            key = suffix.replace(&key, "").into_owned();
        }
        if key.len() == before {
            break;
        }
    }

    WHITESPACE.replace_all(&key, " ").trim().to_string()
}
