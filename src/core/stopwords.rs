//! Static stopword tables used to filter word-cloud tokens

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Languages with a built-in stopword table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    Nl,
    En,
    De,
}

const DUTCH: &[&str] = &[
    "aan", "al", "alles", "als", "altijd", "andere", "ben", "bij", "daar", "dan", "dat", "de",
    "der", "deze", "die", "dit", "doch", "doen", "door", "dus", "een", "eens", "en", "er", "ge",
    "geen", "geweest", "haar", "had", "heb", "hebben", "heeft", "hem", "het", "hier", "hij",
    "hoe", "hun", "iemand", "iets", "ik", "in", "is", "ja", "je", "kan", "kon", "kunnen", "maar",
    "me", "meer", "men", "met", "mij", "mijn", "moet", "na", "naar", "niet", "niets", "nog", "nu",
    "of", "om", "omdat", "onder", "ons", "ook", "op", "over", "reeds", "te", "tegen", "toch",
    "toen", "tot", "u", "uit", "uw", "van", "veel", "voor", "want", "waren", "was", "wat", "werd",
    "wezen", "wie", "wil", "worden", "wordt", "zal", "ze", "zelf", "zich", "zij", "zijn", "zo",
    "zonder", "zou",
];

const ENGLISH: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

const GERMAN: &[&str] = &[
    "aber", "alle", "allem", "allen", "aller", "als", "also", "am", "an", "ander", "andere", "auch",
    "auf", "aus", "bei", "bin", "bis", "bist", "da", "damit", "dann", "das", "dass", "dein", "dem",
    "den", "der", "des", "dich", "die", "dir", "doch", "dort", "du", "durch", "ein", "eine",
    "einem", "einen", "einer", "eines", "er", "es", "etwas", "euch", "euer", "für", "gegen",
    "gewesen", "hab", "habe", "haben", "hat", "hatte", "hier", "hin", "ich", "ihm", "ihn", "ihr",
    "im", "in", "indem", "ins", "ist", "jede", "jetzt", "kann", "kein", "man", "mein", "mich",
    "mir", "mit", "muss", "nach", "nicht", "nichts", "noch", "nun", "nur", "ob", "oder", "ohne",
    "sehr", "sein", "sich", "sie", "sind", "so", "solche", "soll", "sondern", "über", "um", "und",
    "uns", "unser", "unter", "viel", "vom", "von", "vor", "war", "waren", "was", "weil", "wenn",
    "werden", "wie", "wieder", "will", "wir", "wird", "zu", "zum", "zur", "zwar", "zwischen",
];

lazy_static! {
    static ref DUTCH_SET: HashSet<&'static str> = DUTCH.iter().copied().collect();
    static ref ENGLISH_SET: HashSet<&'static str> = ENGLISH.iter().copied().collect();
    static ref GERMAN_SET: HashSet<&'static str> = GERMAN.iter().copied().collect();
}

impl Language {
    /// The built-in stopword table for this language
    pub fn stopwords(&self) -> &'static HashSet<&'static str> {
        match self {
            Language::Nl => &DUTCH_SET,
            Language::En => &ENGLISH_SET,
            Language::De => &GERMAN_SET,
        }
    }

    pub fn all() -> Vec<Language> {
        Language::iter().collect()
    }
}

/// Union of the stopword tables of the active languages
#[derive(Debug, Clone)]
pub struct StopwordSet {
    languages: Vec<Language>,
}

impl StopwordSet {
    pub fn new(languages: &[Language]) -> Self {
        let mut active = Vec::with_capacity(languages.len());
        for language in languages {
            if !active.contains(language) {
                active.push(*language);
            }
        }
        Self { languages: active }
    }

    /// Expects an already lowercased token
    pub fn contains(&self, token: &str) -> bool {
        self.languages
            .iter()
            .any(|language| language.stopwords().contains(token))
    }
}

impl Default for StopwordSet {
    fn default() -> Self {
        Self::new(&Language::all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_str("nl").unwrap(), Language::Nl);
        assert_eq!(Language::De.to_string(), "de");
        assert!(Language::from_str("fr").is_err());
    }

    #[test]
    fn test_default_set_covers_all_languages() {
        let set = StopwordSet::default();
        assert!(set.contains("het"));
        assert!(set.contains("the"));
        assert!(set.contains("und"));
        assert!(!set.contains("amsterdam"));
    }

    #[test]
    fn test_restricted_set() {
        let set = StopwordSet::new(&[Language::En, Language::En]);
        assert!(set.contains("with"));
        assert!(!set.contains("niet"));
    }
}
