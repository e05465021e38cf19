/*!

Provides utilities for running the pod security policy harness against a live cluster from Rust
tests. We call this testing modality `selftest` to distinguish it from the checks the harness
itself performs.

!*/

pub mod cluster;
mod test_settings;

pub use cluster::{Cluster, Error};
pub use test_settings::TestSettings;
