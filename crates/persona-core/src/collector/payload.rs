//! Typed collector payloads.
//!
//! Each source has one payload type. The associated `SOURCE` ties the type to the
//! source it is enqueued under, so a collector registered for `WebsitePayload` can
//! only ever be handed website descriptors.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{JobInputs, PersonaError, Source};

pub trait CollectorPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const SOURCE: Source;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsitePayload {
    pub url: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl CollectorPayload for WebsitePayload {
    const SOURCE: Source = Source::Website;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewsPayload {
    pub marketplace_url: String,
}

impl CollectorPayload for ReviewsPayload {
    const SOURCE: Source = Source::Reviews;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialPayload {
    pub keywords: Vec<String>,
}

impl CollectorPayload for SocialPayload {
    const SOURCE: Source = Source::Social;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorPayload {
    pub urls: Vec<String>,
}

impl CollectorPayload for CompetitorPayload {
    const SOURCE: Source = Source::Competitor;
}

/// Builds the descriptor payload for `source` from a job's (normalized) inputs.
pub fn payload_for(source: Source, inputs: &JobInputs) -> Result<serde_json::Value, PersonaError> {
    let missing = |field: &str| {
        PersonaError::Validation(format!("{field} is required for the {source} source"))
    };

    match source {
        Source::Website => encode(&WebsitePayload {
            url: inputs.primary_url.clone().ok_or_else(|| missing("primaryUrl"))?,
            keywords: inputs.keywords.clone(),
        }),
        Source::Reviews => encode(&ReviewsPayload {
            marketplace_url: inputs
                .marketplace_url
                .clone()
                .ok_or_else(|| missing("marketplaceUrl"))?,
        }),
        Source::Social => {
            if inputs.social_keywords.is_empty() {
                return Err(missing("socialKeywords"));
            }
            encode(&SocialPayload {
                keywords: inputs.social_keywords.clone(),
            })
        }
        Source::Competitor => {
            if inputs.competitor_urls.is_empty() {
                return Err(missing("competitorUrls"));
            }
            encode(&CompetitorPayload {
                urls: inputs.competitor_urls.clone(),
            })
        }
    }
}

fn encode<P: CollectorPayload>(payload: &P) -> Result<serde_json::Value, PersonaError> {
    serde_json::to_value(payload)
        .map_err(|e| PersonaError::Internal(format!("encode {} payload: {e}", P::SOURCE)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn website_payload_carries_keywords() {
        let inputs = JobInputs::new("https://example.com").with_keywords(["coffee", "grinder"]);
        let value = payload_for(Source::Website, &inputs).unwrap();
        let payload: WebsitePayload = serde_json::from_value(value).unwrap();
        assert_eq!(payload.url, "https://example.com");
        assert_eq!(payload.keywords, vec!["coffee", "grinder"]);
    }

    #[test]
    fn every_expected_source_gets_a_payload() {
        let inputs = JobInputs::new("https://example.com")
            .with_marketplace_url("https://shop.example.com/item/1")
            .with_social_keywords(["burr grinder"])
            .with_competitor_urls(["https://rival.example.com"]);

        for source in inputs.expected_sources() {
            assert!(payload_for(source, &inputs).is_ok(), "{source}");
        }
    }

    #[test]
    fn missing_input_is_a_validation_error() {
        let inputs = JobInputs::new("https://example.com");
        let err = payload_for(Source::Reviews, &inputs).unwrap_err();
        assert!(matches!(err, PersonaError::Validation(msg) if msg.contains("marketplaceUrl")));
    }
}
