use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{ClientError, WatchEvent, WatchFrom};

/// Resource version asking the server to start from its cache, so a pod that
/// already reached the target phase shows up as the initial Added event.
const FROM_CACHE: &str = "0";

/// Pause before reopening a watch the server closed.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Used when the requested timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The state a pod wait is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    PodRunning,
    PodDeleted,
}

impl WaitCondition {
    pub fn is_met(&self, event: &WatchEvent<Pod>) -> bool {
        match (self, event) {
            (WaitCondition::PodRunning, WatchEvent::Added(pod) | WatchEvent::Modified(pod)) => {
                pod.status
                    .as_ref()
                    .and_then(|status| status.phase.as_deref())
                    == Some("Running")
            }
            (WaitCondition::PodDeleted, WatchEvent::Deleted(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::PodRunning => f.write_str("running"),
            WaitCondition::PodDeleted => f.write_str("deleted"),
        }
    }
}

#[derive(Debug)]
pub enum WaitError {
    Timeout,
    Watch(ClientError),
    Cancelled,
}

enum Segment {
    Matched,
    Closed,
}

fn resource_version_of(event: &WatchEvent<Pod>) -> Option<String> {
    match event {
        WatchEvent::Added(pod) | WatchEvent::Modified(pod) | WatchEvent::Deleted(pod) => {
            pod.resource_version()
        }
        WatchEvent::Bookmark(bookmark) => Some(bookmark.metadata.resource_version.clone()),
        WatchEvent::Error(_) => None,
    }
}

/// Drain one watch session. `resource_version` tracks where a follow-up
/// session should resume.
async fn consume<S>(
    mut events: S,
    condition: WaitCondition,
    resource_version: &mut String,
) -> Result<Segment, WaitError>
where
    S: Stream<Item = Result<WatchEvent<Pod>, ClientError>> + Unpin,
{
    while let Some(event) = events.next().await {
        match event.map_err(WaitError::Watch)? {
            // 410 Gone: the resume point was compacted away.
            WatchEvent::Error(response) if response.code == 410 => {
                *resource_version = FROM_CACHE.to_string();
                return Ok(Segment::Closed);
            }
            WatchEvent::Error(response) => {
                return Err(WaitError::Watch(ClientError::stream_failed(
                    response.message,
                )));
            }
            event if condition.is_met(&event) => return Ok(Segment::Matched),
            event => {
                if let Some(version) = resource_version_of(&event) {
                    *resource_version = version;
                }
            }
        }
    }

    Ok(Segment::Closed)
}

async fn watch_until<F, Fut, S>(
    open: &mut F,
    condition: WaitCondition,
    deadline: Instant,
) -> Result<(), WaitError>
where
    F: FnMut(WatchFrom) -> Fut,
    Fut: Future<Output = Result<S, ClientError>>,
    S: Stream<Item = Result<WatchEvent<Pod>, ClientError>> + Unpin,
{
    let mut resource_version = FROM_CACHE.to_string();

    loop {
        let from = WatchFrom {
            resource_version: resource_version.clone(),
            timeout: deadline.saturating_duration_since(Instant::now()),
        };
        let events = open(from).await.map_err(WaitError::Watch)?;

        match consume(events, condition, &mut resource_version).await? {
            Segment::Matched => return Ok(()),
            Segment::Closed => {
                debug!(%resource_version, %condition, "watch closed early, resubscribing");
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
            }
        }
    }
}

/// Watch until an event satisfies `condition`, the timeout elapses or
/// `cancel` fires, whichever comes first.
///
/// `open` starts a watch session. Servers end sessions on their own
/// schedule, so a session that closes cleanly is reopened from the last seen
/// resource version until the overall deadline. Each stream is dropped as
/// soon as its session ends, and the current one is dropped on every exit
/// path, which closes the watch behind it.
pub async fn wait_for<F, Fut, S>(
    mut open: F,
    condition: WaitCondition,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), WaitError>
where
    F: FnMut(WatchFrom) -> Fut,
    Fut: Future<Output = Result<S, ClientError>>,
    S: Stream<Item = Result<WatchEvent<Pod>, ClientError>> + Unpin,
{
    let now = Instant::now();
    let deadline = now
        .checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE);

    tokio::select! {
        result = tokio::time::timeout_at(deadline, watch_until(&mut open, condition, deadline)) => {
            result.unwrap_or(Err(WaitError::Timeout))
        }
        _ = cancel.cancelled() => Err(WaitError::Cancelled),
    }
}
