//! Cluster-backed scale stories
//!
//! - `pods`: pause pods created, observed Running, and torn down
//! - `projects`: OpenShift projects created through ProjectRequests

mod helpers;
mod pods;
mod projects;
