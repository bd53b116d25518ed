use std::io::{ErrorKind, Read};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::ResourceExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

pub use kube::api::WatchEvent;

use crate::client::ClientError;
use crate::crd::VolumeSnapshot;

/// Events from a single watch session on one pod.
///
/// Dropping the stream closes the underlying watch connection.
pub type PodEventStream = BoxStream<'static, Result<WatchEvent<Pod>, ClientError>>;

/// Where a pod watch starts and how long the session may stay open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFrom {
    pub resource_version: String,
    pub timeout: Duration,
}

/// Local ends of an exec session.
pub struct ExecIo {
    pub stdin: Pin<Box<dyn AsyncRead + Send>>,
    pub stdout: Pin<Box<dyn AsyncWrite + Send>>,
    pub stderr: Pin<Box<dyn AsyncWrite + Send>>,
}

impl ExecIo {
    /// Wire the session to this process' standard streams.
    pub fn stdio() -> Self {
        Self {
            stdin: Box::pin(blocking_reader(std::io::stdin())),
            stdout: Box::pin(tokio::io::stdout()),
            stderr: Box::pin(tokio::io::stderr()),
        }
    }
}

const READ_CHUNK: usize = 8 * 1024;

/// Feed a blocking reader through a plain thread.
///
/// A read the thread is stuck in does not hold up runtime shutdown, which a
/// pending `tokio::io::stdin` read would.
pub(crate) fn blocking_reader<R>(mut reader: R) -> impl AsyncRead + Send
where
    R: Read + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<std::io::Result<Bytes>>(4);

    std::thread::spawn(move || {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let chunk = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };

            let failed = chunk.is_err();
            if tx.blocking_send(chunk).is_err() || failed {
                break;
            }
        }
    });

    StreamReader::new(stream::poll_fn(move |cx| rx.poll_recv(cx)))
}

/// The identity and coarse status of an object returned by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub namespace: String,
    pub name: String,
    pub creation_timestamp: Option<String>,
    pub phase: Option<String>,
}

pub trait Handle {
    fn handle(&self) -> ResourceHandle;
}

fn base_handle<K: ResourceExt>(object: &K) -> ResourceHandle {
    ResourceHandle {
        namespace: object.namespace().unwrap_or_default(),
        name: object.name_any(),
        creation_timestamp: object
            .creation_timestamp()
            .map(|time| time.0.to_rfc3339()),
        phase: None,
    }
}

impl Handle for Pod {
    fn handle(&self) -> ResourceHandle {
        ResourceHandle {
            phase: self.status.as_ref().and_then(|status| status.phase.clone()),
            ..base_handle(self)
        }
    }
}

impl Handle for PersistentVolumeClaim {
    fn handle(&self) -> ResourceHandle {
        ResourceHandle {
            phase: self.status.as_ref().and_then(|status| status.phase.clone()),
            ..base_handle(self)
        }
    }
}

impl Handle for VolumeSnapshot {
    fn handle(&self) -> ResourceHandle {
        let phase = match self.status {
            Some(_) if self.is_ready() => "Ready",
            Some(_) => "Pending",
            None => "Unknown",
        };

        ResourceHandle {
            phase: Some(phase.to_string()),
            ..base_handle(self)
        }
    }
}
