//! Movies tracked on Kalshi and the rules used to match markets to them

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A movie and the names that identify its markets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub name: String,
    pub director: String,
    pub year: i32,
    pub keywords: Vec<String>,
}

impl Movie {
    fn new(name: &str, director: &str, year: i32, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            director: director.to_string(),
            year,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// The movies compared on the dashboard, in display order
pub fn default_watchlist() -> Vec<Movie> {
    vec![
        Movie::new(
            "One Battle After Another",
            "Paul Thomas Anderson",
            2025,
            &[
                "One Battle After Another", "Battle After Another", "OBAA",
                "Paul Thomas Anderson", "PTA",
                "Leonardo DiCaprio", "Leo DiCaprio", "DiCaprio",
                "Sean Penn", "Benicio Del Toro", "Benicio del Toro", "Del Toro",
                "Regina Hall", "Teyana Taylor", "Chase Infiniti", "Alana Haim", "Wood Harris",
                "Jonny Greenwood", "Michael Bauman", "Florencia Martin",
                "Andy Jurgensen", "Colleen Atwood", "Chris Scarabosio",
                "Vineland", "Thomas Pynchon",
            ],
        ),
        Movie::new(
            "Sinners",
            "Ryan Coogler",
            2025,
            &[
                "Sinners",
                "Ryan Coogler", "Coogler",
                "Michael B. Jordan", "Michael B Jordan", "Michael Jordan",
                "Hailee Steinfeld", "Jack O'Connell", "Wunmi Mosaku",
                "Delroy Lindo", "Omar Benson Miller", "Jayme Lawson",
                "Ludwig Goransson", "Autumn Durald", "Hannah Beachler", "Ruth E. Carter",
            ],
        ),
        Movie::new(
            "Hamnet",
            "Chloe Zhao",
            2025,
            &[
                "Hamnet",
                "Chloe Zhao", "Zhao",
                "Paul Mescal", "Mescal", "Jessie Buckley", "Buckley",
                "Emily Watson", "Joe Alwyn",
                "Joshua James Richards",
                "Maggie O'Farrell", "O'Farrell",
            ],
        ),
    ]
}

/// Keywords found in `text`, in watchlist order.
///
/// Short keywords (4 chars or fewer) must match on word boundaries so that
/// "PTA" does not hit "adaptation"; longer ones match as substrings.
pub fn match_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let text_lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|keyword| {
            let keyword_lower = keyword.to_lowercase();
            if keyword.chars().count() <= 4 {
                let pattern = format!(r"\b{}\b", regex::escape(&keyword_lower));
                Regex::new(&pattern)
                    .map(|re| re.is_match(&text_lower))
                    .unwrap_or(false)
            } else {
                text_lower.contains(&keyword_lower)
            }
        })
        .cloned()
        .collect()
}

/// Oscar category named by a market title
pub fn extract_category(title: &str) -> &'static str {
    let has = |s: &str| title.contains(s);

    if has("Best Picture") {
        "Best Picture"
    } else if has("Best Director") {
        "Best Director"
    } else if has("Best Actor") && !has("Supporting") {
        "Best Actor"
    } else if has("Best Actress") && !has("Supporting") {
        "Best Actress"
    } else if has("Supporting Actor") {
        "Supporting Actor"
    } else if has("Supporting Actress") {
        "Supporting Actress"
    } else if has("Original Screenplay") {
        "Original Screenplay"
    } else if has("Adapted Screenplay") {
        "Adapted Screenplay"
    } else if has("Screenplay") {
        "Screenplay"
    } else if has("Score") || has("Music") {
        "Original Score"
    } else if has("Cinematography") {
        "Cinematography"
    } else if has("Editing") {
        "Film Editing"
    } else if has("Visual Effects") {
        "Visual Effects"
    } else if has("Production Design") {
        "Production Design"
    } else if has("Costume") {
        "Costume Design"
    } else if has("Makeup") {
        "Makeup"
    } else if has("Sound") {
        "Sound"
    } else if has("Song") {
        "Original Song"
    } else if has("How many") {
        "Total Wins"
    } else {
        "Other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_short_keyword_needs_word_boundary() {
        let keywords = kw(&["PTA", "OBAA"]);
        assert!(match_keywords("Best Adapted Screenplay adaptation", &keywords).is_empty());
        assert_eq!(match_keywords("Will PTA win Best Director?", &keywords), vec!["PTA"]);
    }

    #[test]
    fn test_long_keyword_substring_case_insensitive() {
        let keywords = kw(&["DiCaprio", "Sean Penn"]);
        let matched = match_keywords("Best Actor: Leonardo DICAPRIO", &keywords);
        assert_eq!(matched, vec!["DiCaprio"]);
    }

    #[test]
    fn test_empty_text_matches_nothing() {
        assert!(match_keywords("", &kw(&["Sinners"])).is_empty());
    }

    #[test]
    fn test_extract_category_order() {
        assert_eq!(extract_category("Oscar for Best Picture?"), "Best Picture");
        assert_eq!(extract_category("Best Supporting Actor 2026"), "Supporting Actor");
        assert_eq!(extract_category("Best Supporting Actress"), "Supporting Actress");
        assert_eq!(extract_category("Best Actress winner"), "Best Actress");
        assert_eq!(extract_category("Best Adapted Screenplay"), "Adapted Screenplay");
        assert_eq!(extract_category("Best Screenplay"), "Screenplay");
        assert_eq!(extract_category("Best Original Music"), "Original Score");
        assert_eq!(extract_category("Best Film Editing"), "Film Editing");
        assert_eq!(extract_category("Best Original Song"), "Original Song");
        assert_eq!(extract_category("Best Sound"), "Sound");
        assert_eq!(extract_category("How many Oscars will Sinners win?"), "Total Wins");
        assert_eq!(extract_category("Host of the ceremony"), "Other");
    }

    #[test]
    fn test_default_watchlist_order() {
        let names: Vec<_> = default_watchlist().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["One Battle After Another", "Sinners", "Hamnet"]);
    }
}
