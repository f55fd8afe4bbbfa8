use crate::client::{Exchange, HopClient};
use crate::route::{ResponseNode, RouteNode};
use futures::future::join_all;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Child replies in declaration order. A failed child leaves `None` in its
/// slot and one message in `errors`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ForwardOutcome {
    pub responses: Vec<Option<ResponseNode>>,
    pub errors: Vec<String>,
}

pub async fn forward_children(
    client: &HopClient,
    children: &[RouteNode],
    request_id: &str,
) -> ForwardOutcome {
    let handles = children.iter().cloned().map(|child| {
        let client = client.clone();
        let request_id = request_id.to_string();
        tokio::spawn(async move { client.send(&child, &request_id).await })
    });
    let joined = join_all(handles).await;

    let mut outcome = ForwardOutcome::default();
    for (child, result) in children.iter().zip(joined) {
        match result {
            Ok(Ok(exchange)) => outcome.responses.push(Some(exchange.response)),
            Ok(Err(error)) => {
                tracing::warn!(
                    request_id,
                    designation = %child.designation,
                    %error,
                    "error while forwarding request"
                );
                outcome.responses.push(None);
                outcome.errors.push(error.to_string());
            }
            Err(join_error) => {
                tracing::warn!(
                    request_id,
                    designation = %child.designation,
                    error = %join_error,
                    "forwarding task did not complete"
                );
                outcome.responses.push(None);
                outcome.errors.push(format!(
                    "forwarding to {} did not complete: {join_error}",
                    child.designation
                ));
            }
        }
    }
    outcome
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaExchange {
    pub request_id: String,
    pub exchange: Exchange,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoundReport {
    pub exchanges: Vec<ReplicaExchange>,
    pub failures: Vec<String>,
    pub elapsed: Duration,
}

/// Sends the prepared tree `replicas` times in parallel, each under a fresh
/// request id, and waits for all of them.
pub async fn dispatch_round(client: &HopClient, prepared: &RouteNode, replicas: u32) -> RoundReport {
    let started = Instant::now();
    let handles = (0..replicas.max(1)).map(|_| {
        let client = client.clone();
        let prepared = prepared.clone();
        let request_id = Uuid::new_v4().to_string();
        tokio::spawn(async move {
            let result = client.send(&prepared, &request_id).await;
            (request_id, result)
        })
    });
    let joined = join_all(handles).await;

    let mut report = RoundReport::default();
    for result in joined {
        match result {
            Ok((request_id, Ok(exchange))) => {
                report.exchanges.push(ReplicaExchange {
                    request_id,
                    exchange,
                })
            }
            Ok((request_id, Err(error))) => {
                tracing::warn!(
                    request_id = %request_id,
                    designation = %prepared.designation,
                    %error,
                    "replica request failed"
                );
                report.failures.push(error.to_string());
            }
            Err(join_error) => {
                tracing::warn!(error = %join_error, "replica task did not complete");
                report.failures.push(join_error.to_string());
            }
        }
    }
    report.elapsed = started.elapsed();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_address() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("addr should be known");
        drop(listener);
        format!("http://{addr}/")
    }

    #[tokio::test(flavor = "current_thread")]
    async fn forward_children_no_children_expected_empty_outcome() {
        let client = HopClient::new(Duration::from_secs(1)).expect("client should build");
        let outcome = forward_children(&client, &[], "req").await;
        assert_eq!(outcome, ForwardOutcome::default());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn forward_children_all_unreachable_expected_slot_per_child() {
        let client = HopClient::new(Duration::from_secs(1)).expect("client should build");
        let children = vec![RouteNode::new(closed_address()), RouteNode::new("unresolved")];

        let outcome = forward_children(&client, &children, "req").await;

        assert_eq!(outcome.responses, vec![None, None]);
        assert_eq!(outcome.errors.len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dispatch_round_unreachable_root_expected_all_replicas_failed() {
        let client = HopClient::new(Duration::from_secs(1)).expect("client should build");

        let report = dispatch_round(&client, &RouteNode::new(closed_address()), 3).await;

        assert!(report.exchanges.is_empty());
        assert_eq!(report.failures.len(), 3);
    }
}
