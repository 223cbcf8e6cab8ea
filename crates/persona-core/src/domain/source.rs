//! Data sources a job can collect from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One independent data-collection unit.
///
/// The serialized name doubles as the data-type key in the job store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Content of the product's primary web page.
    Website,
    /// Customer reviews from a marketplace listing.
    Reviews,
    /// Social discussion matching the job's social keywords.
    Social,
    /// Competitor product pages.
    Competitor,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Website,
        Source::Reviews,
        Source::Social,
        Source::Competitor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Website => "website",
            Source::Reviews => "reviews",
            Source::Social => "social",
            Source::Competitor => "competitor",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source: {0}")]
pub struct UnknownSource(pub String);

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::website(Source::Website, "website")]
    #[case::reviews(Source::Reviews, "reviews")]
    #[case::social(Source::Social, "social")]
    #[case::competitor(Source::Competitor, "competitor")]
    fn name_matches_serde_and_from_str(#[case] source: Source, #[case] name: &str) {
        assert_eq!(source.as_str(), name);
        assert_eq!(serde_json::to_value(source).unwrap(), serde_json::json!(name));
        assert_eq!(name.parse::<Source>().unwrap(), source);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            "forum".parse::<Source>(),
            Err(UnknownSource("forum".to_string()))
        );
    }
}
