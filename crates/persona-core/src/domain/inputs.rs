//! User inputs for a persona research job.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::PersonaError;
use super::source::Source;

/// The original request parameters. Immutable once a job is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInputs {
    #[serde(default)]
    pub primary_url: Option<String>,

    #[serde(default)]
    pub marketplace_url: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// Phrases to search social discussion for.
    #[serde(default)]
    pub social_keywords: Vec<String>,

    #[serde(default)]
    pub competitor_urls: Vec<String>,
}

impl JobInputs {
    pub fn new(primary_url: impl Into<String>) -> Self {
        Self {
            primary_url: Some(primary_url.into()),
            ..Self::default()
        }
    }

    pub fn with_marketplace_url(mut self, url: impl Into<String>) -> Self {
        self.marketplace_url = Some(url.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_social_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.social_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_competitor_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.competitor_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Trims every field and drops blanks, then checks that the primary URL and
    /// any optional URLs are absolute http(s) URLs.
    pub fn normalized(self) -> Result<Self, PersonaError> {
        let primary_url = non_blank(self.primary_url)
            .ok_or_else(|| PersonaError::Validation("primaryUrl is required".to_string()))?;
        check_url("primaryUrl", &primary_url)?;

        let marketplace_url = non_blank(self.marketplace_url);
        if let Some(url) = &marketplace_url {
            check_url("marketplaceUrl", url)?;
        }

        let competitor_urls = clean_list(self.competitor_urls);
        for url in &competitor_urls {
            check_url("competitorUrls", url)?;
        }

        Ok(Self {
            primary_url: Some(primary_url),
            marketplace_url,
            keywords: clean_list(self.keywords),
            social_keywords: clean_list(self.social_keywords),
            competitor_urls,
        })
    }

    /// Sources this job must collect, derived from which inputs were supplied.
    ///
    /// Plain keywords feed the website collector and never add a source on their own.
    pub fn expected_sources(&self) -> BTreeSet<Source> {
        let mut sources = BTreeSet::new();
        if self.primary_url.is_some() {
            sources.insert(Source::Website);
        }
        if self.marketplace_url.is_some() {
            sources.insert(Source::Reviews);
        }
        if !self.social_keywords.is_empty() {
            sources.insert(Source::Social);
        }
        if !self.competitor_urls.is_empty() {
            sources.insert(Source::Competitor);
        }
        sources
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn check_url(field: &str, value: &str) -> Result<(), PersonaError> {
    let url = Url::parse(value)
        .map_err(|e| PersonaError::Validation(format!("{field} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PersonaError::Validation(format!(
            "{field} must use http or https, got {other}"
        ))),
    }
}
