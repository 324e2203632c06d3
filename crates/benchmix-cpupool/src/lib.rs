//! CPU-topology-aware resource pool.
//!
//! Benchmark processes are pinned to disjoint groups of logical CPUs
//! so concurrent measurements do not share cores or SMT siblings.
//! [`topology`] turns the sysfs topology tree into pinning groups and
//! [`pool`] hands them out to workers, blocking when every group is in
//! use.

pub mod pool;
pub mod topology;

pub use pool::{CpuLease, CpuPool, PoolConfig, PoolSnapshot};
pub use topology::{discover_groups, fallback_partition, parse_cpu_list, SYSFS_CPU_ROOT};
