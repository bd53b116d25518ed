//! One-shot Kubernetes workflows over pods, PersistentVolumeClaims and
//! VolumeSnapshots.

pub mod client;
pub mod config;
pub mod crd;
pub mod k8s_helper;
pub mod lifecycle;
pub mod workflow;

pub use crd::VolumeSnapshot;
pub use workflow::{handle_pod_command, handle_pvc_command, Context, WorkflowError};
