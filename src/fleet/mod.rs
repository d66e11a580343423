//! Fleet coordination — multi-region workload replication and failover
//!
//! Coordinates replicated workloads across geographic regions with
//! eventual consistency:
//!
//! - **DistributedState**: per-region logical clocks, a bounded state-change
//!   log, key-set conflict detection, last-writer-wins resolution
//! - **FailoverDriver**: backup-region selection and scripted failover
//! - **RegionCoordinator**: parallel fan-out execution with replica
//!   recording and coordination results
//! - **LoadBalancer**: capacity-weighted allocation across healthy regions
//!
//! Causal order within one region's clock is preserved; cross-region order
//! resolves by change timestamp with logical-clock ties broken by region id.

mod state;
mod failover;
mod coordinator;
mod balancer;

pub use balancer::LoadBalancer;
pub use coordinator::RegionCoordinator;
pub use failover::FailoverDriver;
pub use state::{DistributedState, ReplicationStatus};
