use crate::{
    Error,
    Result,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{
    Value,
    json,
};
use std::{
    future::Future,
    time::Duration,
};

/// Upper bound on one node-service round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Batched read of every field the mirror tracks.
pub const MATCH_VIEW_QUERY: &str = r#"query {
  game {
    matchId
    hostChainId
    status
    players { chainId name }
    round
    hostScore
    guestScore
    lastOutcome
    winnerChainId
    history { round hostChoice guestChoice outcome hostScore guestScore timestamp }
  }
  matchStatus
  isHost
  opponentChainId
  myReady
  opponentReady
  myChoice
  opponentChoice
  myScore
  opponentScore
  lastRoundRecord { round hostChoice guestChoice outcome hostScore guestScore timestamp }
  roundHistory { round hostChoice guestChoice outcome hostScore guestScore timestamp }
  lastNotification
}"#;

pub const CHOICE_ENUM_QUERY: &str =
    r#"query { __type(name: "Choice") { enumValues { name } } }"#;

/// Executes a GraphQL document against the game application and yields the
/// `data` member of the response.
pub trait GraphQlTransport: Send + Sync {
    fn execute(&self, query: &str) -> impl Future<Output = Result<Value>> + Send;
}

/// Escapes a value for interpolation inside a double-quoted GraphQL string.
pub fn escape_gql_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[derive(Deserialize)]
struct ResponseDto {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<ErrorDto>,
}

#[derive(Deserialize)]
struct ErrorDto {
    message: String,
}

/// Splits a raw GraphQL response into its data or its error messages. Some
/// transports hand the response back as a JSON-encoded string.
pub fn extract_data(response: Value) -> Result<Value> {
    let response = match response {
        Value::String(raw) => serde_json::from_str(&raw)?,
        other => other,
    };
    let dto: ResponseDto = serde_json::from_value(response)?;
    if !dto.errors.is_empty() {
        return Err(Error::GraphQl(
            dto.errors.into_iter().map(|e| e.message).collect(),
        ));
    }
    Ok(dto.data.unwrap_or(Value::Null))
}

/// Talks to a Linera node service over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { endpoint, http })
    }

    /// Endpoint of `application_id` on `chain_id` as served by the node service.
    pub fn for_application(
        node_url: &str,
        chain_id: &str,
        application_id: &str,
    ) -> Result<Self> {
        let node_url = node_url.trim_end_matches('/');
        Self::new(format!(
            "{node_url}/chains/{chain_id}/applications/{application_id}"
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl GraphQlTransport for HttpTransport {
    async fn execute(&self, query: &str) -> Result<Value> {
        let res = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query }))
            .send()
            .await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        if status == StatusCode::NOT_FOUND {
            return Err(Error::Transport(format!(
                "no application served at {}",
                self.endpoint
            )));
        }
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(Error::Transport(format!(
                "node service responded with {status}: {body}"
            )));
        }
        let response: Value = serde_json::from_slice(&bytes)?;
        extract_data(response)
    }
}
