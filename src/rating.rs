//! Rating extraction from detail-page text
//!
//! Sites embed IMDb and Douban scores in their description blocks in a handful
//! of layouts. [`RatingExtractor::extract`] tries the labelled forms first and
//! falls back to the generic `Rating: x/10 from` form when neither is found.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

static IMDB_RATING: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    RegexBuilder::new(r"IMDb.*?([0-9.]+)\s*/\s*10")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static DOUBAN_RATING: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"豆瓣评分.*?([0-9.]+)/10").unwrap()
});

static GENERIC_RATING: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    RegexBuilder::new(r"Rating:.*?([0-9.]+)\s*/\s*10\s*from")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static IMDB_ID: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"www\.imdb\.com/title/(tt[0-9]+)").unwrap()
});

/// Scores found on a detail page; 0.0 means "not found"
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Ratings {
    /// IMDb score
    pub imdb: f64,
    /// Douban score
    pub douban: f64,
}

impl Ratings {
    /// Whether either score reaches `threshold`
    pub fn meets(&self, threshold: f64) -> bool {
        self.imdb >= threshold || self.douban >= threshold
    }
}

/// Pulls scores and identifiers out of detail-page text
#[derive(Clone, Copy, Debug, Default)]
pub struct RatingExtractor;

impl RatingExtractor {
    /// Create an extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract both scores from `text`
    ///
    /// Never fails: an absent or unparseable number yields 0.0 for that scale.
    /// When both labelled forms come up below 1.0, every `Rating: x/10 from`
    /// occurrence is collected. Two or more matches assign the first to
    /// Douban and the second to IMDb; a single match is assigned to both.
    pub fn extract(&self, text: &str) -> Ratings {
        let mut ratings = Ratings {
            imdb: first_number(&IMDB_RATING, text),
            douban: first_number(&DOUBAN_RATING, text),
        };

        if ratings.imdb < 1.0 && ratings.douban < 1.0 {
            let generic: Vec<f64> = GENERIC_RATING
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| parse_score(m.as_str()))
                .collect();
            match generic.as_slice() {
                [] => {}
                [only] => {
                    ratings.imdb = *only;
                    ratings.douban = *only;
                }
                [first, second, ..] => {
                    ratings.douban = *first;
                    ratings.imdb = *second;
                }
            }
        }

        ratings
    }

    /// First IMDb title id (`tt` followed by digits) linked from `text`
    pub fn extract_imdb_id(&self, text: &str) -> Option<String> {
        IMDB_ID
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

fn first_number(pattern: &Regex, text: &str) -> f64 {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| parse_score(m.as_str()))
        .unwrap_or(0.0)
}

// `[0-9.]+` happily matches "." or "7.5.1"
fn parse_score(raw: &str) -> f64 {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labelled_scores_are_extracted() {
        let text = "◎IMDb评分  8.1/10 from 120,000 users\n◎豆瓣评分　7.9/10 from 5000 users";
        let ratings = RatingExtractor::new().extract(text);
        assert_eq!(ratings.imdb, 8.1);
        assert_eq!(ratings.douban, 7.9);
    }

    #[test]
    fn imdb_label_is_case_insensitive_and_allows_spaces() {
        let ratings = RatingExtractor::new().extract("imdb rating: 6.4 / 10");
        assert_eq!(ratings.imdb, 6.4);
        assert_eq!(ratings.douban, 0.0);
    }

    #[test]
    fn fallback_assigns_first_to_douban_and_second_to_imdb() {
        let text = "Rating: 8.5/10 from 3000 users\nRating: 7.2/10 from 90000 users";
        let ratings = RatingExtractor::new().extract(text);
        assert_eq!(ratings.douban, 8.5);
        assert_eq!(ratings.imdb, 7.2);
    }

    #[test]
    fn single_fallback_match_fills_both_scales() {
        let ratings = RatingExtractor::new().extract("Rating: 6.6 / 10 from 800 users");
        assert_eq!(ratings.imdb, 6.6);
        assert_eq!(ratings.douban, 6.6);
    }

    #[test]
    fn fallback_is_skipped_when_a_labelled_score_exists() {
        let text = "IMDb 7.0/10\nRating: 9.9/10 from 1 users";
        let ratings = RatingExtractor::new().extract(text);
        assert_eq!(ratings.imdb, 7.0);
        assert_eq!(ratings.douban, 0.0);
    }

    #[test]
    fn missing_or_garbled_scores_are_zero() {
        let extractor = RatingExtractor::new();
        assert_eq!(extractor.extract("no scores here"), Ratings::default());
        assert_eq!(extractor.extract("IMDb .../10").imdb, 0.0);
    }

    #[test]
    fn meets_is_an_or_across_scales() {
        let ratings = Ratings {
            imdb: 6.0,
            douban: 8.0,
        };
        assert!(ratings.meets(7.0));
        assert!(!ratings.meets(8.5));
    }

    #[test]
    fn imdb_id_is_taken_from_title_link() {
        let extractor = RatingExtractor::new();
        assert_eq!(
            extractor
                .extract_imdb_id("see https://www.imdb.com/title/tt0111161/ for details")
                .as_deref(),
            Some("tt0111161")
        );
        assert!(extractor.extract_imdb_id("imdb.com/name/nm0000151").is_none());
    }

    #[test]
    fn imdb_id_digits_are_ascii_only() {
        let extractor = RatingExtractor::new();
        assert!(
            extractor
                .extract_imdb_id("www.imdb.com/title/tt０１１１１６１/")
                .is_none()
        );
        assert_eq!(
            extractor
                .extract_imdb_id("www.imdb.com/title/tt123４")
                .as_deref(),
            Some("tt123")
        );
    }
}
