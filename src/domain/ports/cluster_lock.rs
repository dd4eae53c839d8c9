//! Cluster-wide named lock port.
//!
//! Guards periodic jobs so at most one instance runs across the worker
//! fleet. Acquisition never blocks; the lease bounds how long a crashed
//! holder can wedge the lock.

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::errors::DomainResult;

#[async_trait]
pub trait ClusterLock: Send + Sync {
    /// Take the named lock for `lease` if it is free or expired.
    /// Returns `false` when another holder has a live lease.
    async fn try_acquire(&self, name: &str, holder: &str, lease: Duration) -> DomainResult<bool>;

    /// Release the lock if still held by `holder`. Returns `false` when the
    /// lease had already expired or been taken over.
    async fn release(&self, name: &str, holder: &str) -> DomainResult<bool>;
}
