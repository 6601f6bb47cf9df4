//! Text normalization
//!
//! Single normalization routine shared by extraction validation, natural
//! keys, the matching phases and the canonical key columns. Matching breaks
//! silently if two call sites normalize differently, so nothing outside this
//! module is allowed to lowercase/fold text for comparison purposes.

use unicode_normalization::UnicodeNormalization;

/// Normalize a string into a comparison key.
///
/// - lowercases
/// - folds diacritics (NFD decomposition, combining marks stripped)
/// - expands the French ligatures œ/æ, which NFD leaves intact
/// - collapses internal whitespace runs to a single space
/// - trims leading/trailing whitespace
///
/// Total and pure: empty input yields an empty key.
pub fn normalize(s: &str) -> String {
    let lowered = s.to_lowercase();

    let folded: String = lowered
        .chars()
        .flat_map(|c| match c {
            'œ' => vec!['o', 'e'],
            'æ' => vec!['a', 'e'],
            other => vec![other],
        })
        .collect();

    let stripped: String = folded
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_lowercase_and_trim() {
        assert_eq!(normalize("  Pascal QUIGNARD "), "pascal quignard");
    }

    #[test]
    fn test_accent_folding() {
        assert_eq!(normalize("Trésors Cachés"), "tresors caches");
        assert_eq!(normalize("Les Particules élémentaires"), "les particules elementaires");
        assert_eq!(normalize("Jamaïque"), "jamaique");
    }

    #[test]
    fn test_ligature_expansion() {
        assert_eq!(normalize("Coups de Cœur"), "coups de coeur");
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(normalize("Harlem,  Jamaïque,\t Marseille"), "harlem, jamaique, marseille");
    }

    #[test]
    fn test_deterministic() {
        let a = normalize("Éditions du Seuil");
        let b = normalize("Éditions du Seuil");
        assert_eq!(a, b);
    }
}
