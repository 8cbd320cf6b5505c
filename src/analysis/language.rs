//! Language tag resolution for stemming.

use rust_stemmers::Algorithm;

/// Resolve a language tag to a Snowball stemming algorithm.
///
/// Accepts ISO 639-1 codes (`en`), ISO 639-3 codes (`eng`), English names
/// (`english`) and script-qualified corpus tags (`eng_Latn`, `pt-BR`).
/// Returns `None` for languages without a stemming table; those are only
/// lowercased.
pub fn stemming_algorithm(tag: &str) -> Option<Algorithm> {
    let base = tag
        .split(['_', '-'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let algorithm = match base.as_str() {
        "ar" | "ara" | "arb" | "arabic" => Algorithm::Arabic,
        "da" | "dan" | "danish" => Algorithm::Danish,
        "nl" | "nld" | "dut" | "dutch" => Algorithm::Dutch,
        "en" | "eng" | "english" => Algorithm::English,
        "fi" | "fin" | "finnish" => Algorithm::Finnish,
        "fr" | "fra" | "fre" | "french" => Algorithm::French,
        "de" | "deu" | "ger" | "german" => Algorithm::German,
        "el" | "ell" | "gre" | "greek" => Algorithm::Greek,
        "hu" | "hun" | "hungarian" => Algorithm::Hungarian,
        "it" | "ita" | "italian" => Algorithm::Italian,
        "no" | "nb" | "nn" | "nor" | "nob" | "nno" | "norwegian" => Algorithm::Norwegian,
        "pt" | "por" | "portuguese" => Algorithm::Portuguese,
        "ro" | "ron" | "rum" | "romanian" => Algorithm::Romanian,
        "ru" | "rus" | "russian" => Algorithm::Russian,
        "es" | "spa" | "spanish" => Algorithm::Spanish,
        "sv" | "swe" | "swedish" => Algorithm::Swedish,
        "ta" | "tam" | "tamil" => Algorithm::Tamil,
        "tr" | "tur" | "turkish" => Algorithm::Turkish,
        _ => return None,
    };
    Some(algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_forms() {
        assert!(matches!(stemming_algorithm("en"), Some(Algorithm::English)));
        assert!(matches!(stemming_algorithm("eng_Latn"), Some(Algorithm::English)));
        assert!(matches!(stemming_algorithm("English"), Some(Algorithm::English)));
        assert!(matches!(stemming_algorithm("pt-BR"), Some(Algorithm::Portuguese)));
        assert!(matches!(stemming_algorithm("deu_Latn"), Some(Algorithm::German)));
    }

    #[test]
    fn test_unsupported_language() {
        assert!(stemming_algorithm("vie_Latn").is_none());
        assert!(stemming_algorithm("ja").is_none());
        assert!(stemming_algorithm("").is_none());
    }
}
