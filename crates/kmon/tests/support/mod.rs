//! In-memory stand-in for the cluster facade.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimStatus, Pod, PodStatus};
use kmon::client::{
    ClientError, CoreClient, ExecIo, PodEventStream, SnapshotClient, WatchEvent, WatchFrom,
};
use kmon::config::{Config, PodConfig, PvcConfig};
use kmon::VolumeSnapshot;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tokio::io::AsyncWriteExt;

pub const EXEC_OUTPUT: &[u8] = b"total 0\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreatePod,
    DeletePod,
    WatchPod,
    Exec,
    CreatePvc,
    GetPvc,
    DeletePvc,
    CreateSnapshot,
}

#[derive(Debug, Clone)]
pub enum Call {
    CreatePod(Pod),
    DeletePod { namespace: String, name: String },
    WatchPod { namespace: String, name: String, from: WatchFrom },
    Exec { namespace: String, name: String, command: Vec<String> },
    CreatePvc(PersistentVolumeClaim),
    GetPvc { namespace: String, name: String },
    DeletePvc { namespace: String, name: String },
    CreateSnapshot(VolumeSnapshot),
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::CreatePod(_) => Op::CreatePod,
            Call::DeletePod { .. } => Op::DeletePod,
            Call::WatchPod { .. } => Op::WatchPod,
            Call::Exec { .. } => Op::Exec,
            Call::CreatePvc(_) => Op::CreatePvc,
            Call::GetPvc { .. } => Op::GetPvc,
            Call::DeletePvc { .. } => Op::DeletePvc,
            Call::CreateSnapshot(_) => Op::CreateSnapshot,
        }
    }
}

type Key = (String, String);

struct WatchScript {
    events: Vec<WatchEvent<Pod>>,
    /// End the session after the events instead of staying open.
    closes: bool,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    pods: BTreeMap<Key, Pod>,
    pvcs: BTreeMap<Key, PersistentVolumeClaim>,
    snapshots: BTreeMap<Key, VolumeSnapshot>,
    calls: Vec<Call>,
    failures: HashMap<Op, ClientError>,
    watch_scripts: VecDeque<WatchScript>,
    hang_exec: bool,
    generated: usize,
}

impl State {
    fn record(&mut self, call: Call) -> Result<(), ClientError> {
        let op = call.op();
        self.calls.push(call);
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Mimic the API server's generateName handling.
    fn assign_name(&mut self, metadata: &mut ObjectMeta) {
        if metadata.name.is_none() {
            if let Some(prefix) = &metadata.generate_name {
                self.generated += 1;
                metadata.name = Some(format!("{prefix}{:05x}", 0x7c3a1 + self.generated));
            }
        }
    }
}

struct WatchGuard(Arc<AtomicUsize>);

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    open_watches: Arc<AtomicUsize>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every call of `op` fail with `err`.
    pub fn fail(&self, op: Op, err: ClientError) {
        self.state.lock().unwrap().failures.insert(op, err);
    }

    /// Events served to the next watch, after which it stays silent.
    pub fn script_watch(&self, events: Vec<WatchEvent<Pod>>) {
        self.push_watch(events, false);
    }

    /// Events served to the next watch, after which the server ends it.
    pub fn script_closing_watch(&self, events: Vec<WatchEvent<Pod>>) {
        self.push_watch(events, true);
    }

    fn push_watch(&self, events: Vec<WatchEvent<Pod>>, closes: bool) {
        self.state
            .lock()
            .unwrap()
            .watch_scripts
            .push_back(WatchScript { events, closes });
    }

    /// Make exec sessions run until the caller gives up on them.
    pub fn hang_exec(&self) {
        self.state.lock().unwrap().hang_exec = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().iter().map(Call::op).collect()
    }

    pub fn open_watches(&self) -> usize {
        self.open_watches.load(Ordering::SeqCst)
    }

    pub fn add_pvc(&self, namespace: &str, name: &str) {
        let pvc = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            status: Some(PersistentVolumeClaimStatus {
                phase: Some("Bound".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .pvcs
            .insert(key(namespace, name), pvc);
    }

    pub fn add_pod(&self, namespace: &str, name: &str) {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .pods
            .insert(key(namespace, name), pod);
    }

    pub fn has_pod(&self, namespace: &str, name: &str) -> bool {
        self.state.lock().unwrap().pods.contains_key(&key(namespace, name))
    }

    pub fn has_pvc(&self, namespace: &str, name: &str) -> bool {
        self.state.lock().unwrap().pvcs.contains_key(&key(namespace, name))
    }
}

fn already_exists(kind: &str, name: &str) -> ClientError {
    ClientError::AlreadyExists {
        message: format!("{kind} \"{name}\" already exists"),
    }
}

fn not_found(kind: &str, name: &str) -> ClientError {
    ClientError::NotFound {
        message: format!("{kind} \"{name}\" not found"),
    }
}

#[async_trait]
impl CoreClient for FakeCluster {
    async fn create_pod(&self, mut pod: Pod) -> Result<Pod, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::CreatePod(pod.clone()))?;

        let key = key(&pod.namespace().unwrap_or_default(), &pod.name_any());
        if state.pods.contains_key(&key) {
            return Err(already_exists("pods", &key.1));
        }

        pod.status = Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });
        state.pods.insert(key, pod.clone());
        Ok(pod)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DeletePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

        state
            .pods
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found("pods", name))
    }

    async fn watch_pod(
        &self,
        namespace: &str,
        name: &str,
        from: WatchFrom,
    ) -> Result<PodEventStream, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::WatchPod {
            namespace: namespace.to_string(),
            name: name.to_string(),
            from,
        })?;

        let script = state.watch_scripts.pop_front().unwrap_or(WatchScript {
            events: Vec::new(),
            closes: false,
        });
        self.open_watches.fetch_add(1, Ordering::SeqCst);
        let guard = WatchGuard(self.open_watches.clone());

        let events = stream::iter(script.events.into_iter().map(Ok::<_, ClientError>));
        let events = if script.closes {
            events.boxed()
        } else {
            events.chain(stream::pending()).boxed()
        };

        Ok(events
            .map(move |event| {
                let _held = &guard;
                event
            })
            .boxed())
    }

    async fn exec_in_pod(
        &self,
        namespace: &str,
        name: &str,
        command: Vec<String>,
        io: ExecIo,
    ) -> Result<(), ClientError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.record(Call::Exec {
                namespace: namespace.to_string(),
                name: name.to_string(),
                command,
            })?;

            if !state.pods.contains_key(&key(namespace, name)) {
                return Err(not_found("pods", name));
            }
            state.hang_exec
        };

        if hang {
            std::future::pending::<()>().await;
        }

        let mut stdout = io.stdout;
        stdout
            .write_all(EXEC_OUTPUT)
            .await
            .map_err(|e| ClientError::stream_failed(e.to_string()))?;
        stdout
            .shutdown()
            .await
            .map_err(|e| ClientError::stream_failed(e.to_string()))
    }

    async fn create_pvc(
        &self,
        pvc: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::CreatePvc(pvc.clone()))?;

        let key = key(&pvc.namespace().unwrap_or_default(), &pvc.name_any());
        if state.pvcs.contains_key(&key) {
            return Err(already_exists("persistentvolumeclaims", &key.1));
        }

        state.pvcs.insert(key, pvc.clone());
        Ok(pvc)
    }

    async fn get_pvc(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::GetPvc {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

        state
            .pvcs
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("persistentvolumeclaims", name))
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DeletePvc {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

        state
            .pvcs
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found("persistentvolumeclaims", name))
    }
}

#[async_trait]
impl SnapshotClient for FakeCluster {
    async fn create_snapshot(
        &self,
        mut snapshot: VolumeSnapshot,
    ) -> Result<VolumeSnapshot, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::CreateSnapshot(snapshot.clone()))?;

        state.assign_name(&mut snapshot.metadata);
        let key = key(&snapshot.namespace().unwrap_or_default(), &snapshot.name_any());
        if state.snapshots.contains_key(&key) {
            return Err(already_exists("volumesnapshots", &key.1));
        }

        state.snapshots.insert(key, snapshot.clone());
        Ok(snapshot)
    }
}

pub fn pod_in_phase(name: &str, phase: &str) -> Pod {
    pod_at_version(name, phase, "1")
}

pub fn pod_at_version(name: &str, phase: &str, resource_version: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pod_config(mode: &str) -> Config {
    Config {
        pod: PodConfig {
            mode: mode.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn pvc_config(mode: &str) -> Config {
    Config {
        pvc: PvcConfig {
            mode: mode.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}
