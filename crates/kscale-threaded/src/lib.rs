//! Concurrent lifecycle orchestration for Kubernetes scale tests
//!
//! - [`runner`]: fan one operation out across a batch, results in input order
//! - [`unwind`]: reverse-order teardown stack
//! - [`scale`]: scoped create/wait/delete cycle over a batch
//! - [`kube_resource`] and [`objects`]: kube-rs backed resources to scale

#![deny(missing_docs)]

pub mod kube_resource;
pub mod objects;
pub mod resource;
pub mod runner;
pub mod scale;
pub mod unwind;

pub use kube_resource::KubeResource;
pub use resource::{RequestResource, ResourceHandle, ResourceStatus, SharedRequest, SharedResource};
pub use scale::{
    CollectPoint, DataCollector, NoopCollector, PhaseTiming, ScaleFlags, ScalePhase,
    ScaleResources, TimingRecord,
};
pub use unwind::UnwindStack;
