//! Blocking pool of disjoint CPU pinning groups.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::topology;

/// Resource budgets that bound how many benchmark processes may run at
/// once. Defaults describe the measurement host this pipeline was
/// sized for: 400 GiB of memory and 72 logical CPUs, with each process
/// given 8 GiB and a 4-CPU pinning group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub mem_budget_gib: u64,
    pub mem_per_task_gib: u64,
    pub cpu_budget: usize,
    pub cpus_per_task: usize,
    /// Lower bound on concurrent tasks regardless of the budgets.
    pub min_tasks: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mem_budget_gib: 400,
            mem_per_task_gib: 8,
            cpu_budget: 72,
            cpus_per_task: 4,
            min_tasks: 50,
        }
    }
}

impl PoolConfig {
    /// Concurrency cap derived from the budgets, floored at `min_tasks`.
    #[must_use]
    pub fn max_tasks(&self) -> usize {
        let by_memory = usize::try_from(self.mem_budget_gib / self.mem_per_task_gib.max(1))
            .unwrap_or(usize::MAX);
        let by_cpu = self.cpu_budget / self.cpus_per_task.max(1);
        by_memory.min(by_cpu).max(self.min_tasks)
    }
}

/// Summary of a pool's composition, for operator inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub max_tasks: usize,
    pub groups: Vec<Vec<u32>>,
    /// True when the groups came from a sysfs topology scan rather
    /// than the sequential fallback partition.
    pub topology_aware: bool,
}

struct PoolShared {
    free: Mutex<Vec<Vec<u32>>>,
    available: Condvar,
}

/// Pool of disjoint CPU groups handed out one per benchmark process.
///
/// [`CpuPool::acquire`] blocks until a group is free; dropping the
/// returned [`CpuLease`] returns the group to the pool. The pool never
/// runs dry permanently because every lease is tied to the borrow
/// scope of its task.
pub struct CpuPool {
    shared: Arc<PoolShared>,
    snapshot: PoolSnapshot,
}

impl CpuPool {
    /// Builds a pool from explicit groups, capped at `max_tasks`.
    #[must_use]
    pub fn with_groups(mut groups: Vec<Vec<u32>>, max_tasks: usize, topology_aware: bool) -> Self {
        groups.truncate(max_tasks);
        let snapshot = PoolSnapshot { max_tasks, groups: groups.clone(), topology_aware };
        debug!(groups = snapshot.groups.len(), max_tasks, "cpu pool ready");
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(groups),
                available: Condvar::new(),
            }),
            snapshot,
        }
    }

    /// Builds a pool for this host.
    ///
    /// Tries a sysfs topology scan first and falls back to a
    /// sequential partition of the online CPUs when the scan fails,
    /// logging the reason.
    #[must_use]
    pub fn for_host(config: &PoolConfig) -> Self {
        let max_tasks = config.max_tasks();
        match topology::discover_groups(
            std::path::Path::new(topology::SYSFS_CPU_ROOT),
            config.cpus_per_task,
        ) {
            Ok(groups) => Self::with_groups(groups, max_tasks, true),
            Err(error) => {
                warn!(%error, "cpu topology scan failed, using sequential partition");
                let cpu_count = std::thread::available_parallelism()
                    .map_or(config.cpus_per_task, std::num::NonZeroUsize::get);
                let groups = topology::fallback_partition(cpu_count, config.cpus_per_task);
                Self::with_groups(groups, max_tasks, false)
            }
        }
    }

    /// Blocks until a group is free and leases it to the caller.
    #[must_use]
    pub fn acquire(&self) -> CpuLease {
        let mut free = self.shared.free.lock();
        while free.is_empty() {
            self.shared.available.wait(&mut free);
        }
        let cpus = free.pop().unwrap_or_default();
        CpuLease { cpus, shared: Arc::clone(&self.shared) }
    }

    /// Number of groups currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.shared.free.lock().len()
    }

    #[must_use]
    pub fn snapshot(&self) -> &PoolSnapshot {
        &self.snapshot
    }
}

/// Exclusive lease on one pinning group. Returned to the pool on drop.
pub struct CpuLease {
    cpus: Vec<u32>,
    shared: Arc<PoolShared>,
}

impl CpuLease {
    #[must_use]
    pub fn cpus(&self) -> &[u32] {
        &self.cpus
    }

    /// Comma-joined CPU list in the form `taskset -c` accepts.
    #[must_use]
    pub fn cpu_list(&self) -> String {
        self.cpus.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    }
}

impl Drop for CpuLease {
    fn drop(&mut self) {
        let mut free = self.shared.free.lock();
        free.push(std::mem::take(&mut self.cpus));
        self.shared.available.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_budgets_floor_the_task_cap_at_fifty() {
        let config = PoolConfig::default();
        // min(400 / 8, 72 / 4) = 18, floored to 50.
        assert_eq!(config.max_tasks(), 50);
    }

    #[test]
    fn wider_budgets_raise_the_cap_past_the_floor() {
        let config = PoolConfig {
            mem_budget_gib: 1024,
            mem_per_task_gib: 8,
            cpu_budget: 384,
            cpus_per_task: 4,
            min_tasks: 50,
        };
        assert_eq!(config.max_tasks(), 96);
    }

    #[test]
    fn acquire_and_drop_cycle_returns_groups_to_the_pool() {
        let pool = CpuPool::with_groups(vec![vec![0, 1], vec![2, 3]], 50, false);
        assert_eq!(pool.available(), 2);
        let lease = pool.acquire();
        assert_eq!(pool.available(), 1);
        assert_eq!(lease.cpus().len(), 2);
        drop(lease);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn cpu_list_is_comma_joined() {
        let pool = CpuPool::with_groups(vec![vec![0, 36, 18, 54]], 50, true);
        let lease = pool.acquire();
        assert_eq!(lease.cpu_list(), "0,36,18,54");
    }

    #[test]
    fn group_count_is_capped_at_max_tasks() {
        let groups: Vec<Vec<u32>> = (0..10).map(|i| vec![i]).collect();
        let pool = CpuPool::with_groups(groups, 3, false);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.snapshot().groups.len(), 3);
    }

    #[test]
    fn concurrent_holders_never_share_a_group() {
        let pool = Arc::new(CpuPool::with_groups(vec![vec![0, 1], vec![2, 3]], 50, false));
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            let peak = Arc::clone(&peak);
            let active = Arc::clone(&active);
            handles.push(std::thread::spawn(move || {
                let lease = pool.acquire();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let cpus: BTreeSet<u32> = lease.cpus().iter().copied().collect();
                std::thread::sleep(std::time::Duration::from_millis(5));
                active.fetch_sub(1, Ordering::SeqCst);
                cpus
            }));
        }
        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.join().expect("worker should not panic"));
        }
        assert!(peak.load(Ordering::SeqCst) <= 2, "more holders than groups");
        for cpus in seen {
            assert!(cpus == BTreeSet::from([0, 1]) || cpus == BTreeSet::from([2, 3]));
        }
    }
}
