use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::recognition::domain::descriptor::Descriptor;
use crate::recognition::domain::match_service::{MatchOutcome, MatchService};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("descriptor has {actual} values, the service expects {expected}")]
    DescriptorLength { expected: usize, actual: usize },
    #[error("match request timed out")]
    Timeout,
    #[error("match request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("malformed match response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for MatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MatchError::Timeout
        } else {
            MatchError::Request(e)
        }
    }
}

#[derive(Deserialize)]
struct FindFaceResponse {
    status: String,
    #[serde(default)]
    person: Option<String>,
}

/// Client for the face-match service's `GET /find_face` endpoint.
///
/// Every request is bounded by the configured timeout. Failures of any kind
/// are logged and reported as [`MatchOutcome::NoMatch`].
pub struct HttpMatchClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    descriptor_len: usize,
}

impl HttpMatchClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        descriptor_len: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/find_face", base_url.trim_end_matches('/')),
            descriptor_len,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn query(&self, descriptor: &Descriptor) -> Result<MatchOutcome, MatchError> {
        if descriptor.len() != self.descriptor_len {
            return Err(MatchError::DescriptorLength {
                expected: self.descriptor_len,
                actual: descriptor.len(),
            });
        }

        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("embedding_str", descriptor.to_query_string())])
            .send()?
            .error_for_status()?
            .text()?;

        parse_response(&body)
    }
}

impl MatchService for HttpMatchClient {
    fn find(&self, descriptor: &Descriptor) -> MatchOutcome {
        match self.query(descriptor) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Face match via {} failed: {e}", self.endpoint);
                MatchOutcome::NoMatch
            }
        }
    }
}

fn parse_response(body: &str) -> Result<MatchOutcome, MatchError> {
    let response: FindFaceResponse =
        serde_json::from_str(body).map_err(|e| MatchError::Malformed(e.to_string()))?;
    match response.status.as_str() {
        "success" => match response.person {
            Some(name) if !name.trim().is_empty() => Ok(MatchOutcome::Matched(name)),
            _ => Err(MatchError::Malformed("success without a person".to_string())),
        },
        "not_found" => Ok(MatchOutcome::NoMatch),
        other => Err(MatchError::Malformed(format!("unknown status '{other}'"))),
    }
}
