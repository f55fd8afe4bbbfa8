use crate::SimError;
use crate::route::{ResponseNode, RouteNode};
use std::time::Duration;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// One completed hop: the exact bytes sent and received plus the decoded reply.
#[derive(Clone, Debug, PartialEq)]
pub struct Exchange {
    pub request_body: Vec<u8>,
    pub response_body: Vec<u8>,
    pub response: ResponseNode,
    pub status: u16,
}

#[derive(Clone, Debug)]
pub struct HopClient {
    client: reqwest::Client,
}

impl HopClient {
    pub fn new(timeout: Duration) -> Result<Self, SimError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SimError::Runtime(format!("http client build failed: {err}")))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// POSTs `node` to its designation. Any status is accepted as long as the
    /// body decodes as a response tree; services answer decode failures with a
    /// 400 carrying the error.
    pub async fn send(&self, node: &RouteNode, request_id: &str) -> Result<Exchange, SimError> {
        let request_body = serde_json::to_vec(node)
            .map_err(|err| SimError::Transport(format!("encode route for {} failed: {err}", node.designation)))?;

        let response = self
            .client
            .post(&node.designation)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, request_id)
            .body(request_body.clone())
            .send()
            .await
            .map_err(|err| SimError::Transport(format!("post {} failed: {err}", node.designation)))?;
        let status = response.status();
        let response_body = response
            .bytes()
            .await
            .map_err(|err| {
                SimError::Transport(format!("read body from {} failed: {err}", node.designation))
            })?
            .to_vec();
        let decoded: ResponseNode = serde_json::from_slice(&response_body).map_err(|err| {
            SimError::Transport(format!(
                "decode response from {} (status {status}) failed: {err}",
                node.designation
            ))
        })?;

        Ok(Exchange {
            request_body,
            response_body,
            response: decoded,
            status: status.as_u16(),
        })
    }
}
