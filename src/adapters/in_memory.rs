//! In-Memory Session Adapter
//!
//! Implements the `RemoteSession` port over a fixed inventory held in
//! memory. Useful for tests and for exercising the exporter without vCenter.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::ports::{
    CounterInfo, EntityMetric, HostRef, ManagedObjectRef, PerfQuerySpec, RemoteSession,
    ScopeHandle,
};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inventory {
    counters: Vec<CounterInfo>,
    datacenters: Vec<(String, ManagedObjectRef)>,
    hosts: Vec<(HostRef, Vec<EntityMetric>)>,
    failing_hosts: HashSet<String>,
}

/// In-memory vCenter stand-in.
#[derive(Debug, Default)]
pub struct InMemorySession {
    inventory: RwLock<Inventory>,
    fail_catalogue: AtomicBool,
    fail_host_listing: AtomicBool,
    catalogue_calls: AtomicUsize,
    query_calls: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemorySession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the performance counter catalogue.
    pub fn with_counters(self, counters: Vec<CounterInfo>) -> Self {
        self.inventory.write().counters = counters;
        self
    }

    /// Add a datacenter.
    pub fn with_datacenter(self, name: &str, id: &str) -> Self {
        self.inventory
            .write()
            .datacenters
            .push((name.to_string(), ManagedObjectRef::new("Datacenter", id)));
        self
    }

    /// Add a host and the performance data it reports.
    pub fn with_host(self, host: HostRef, metrics: Vec<EntityMetric>) -> Self {
        self.inventory.write().hosts.push((host, metrics));
        self
    }

    /// Delay every counter catalogue response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the counter catalogue call fail.
    pub fn fail_counter_catalogue(self, fail: bool) -> Self {
        self.set_fail_counter_catalogue(fail);
        self
    }

    pub fn set_fail_counter_catalogue(&self, fail: bool) {
        self.fail_catalogue.store(fail, Ordering::SeqCst);
    }

    /// Make host enumeration fail.
    pub fn set_fail_host_listing(&self, fail: bool) {
        self.fail_host_listing.store(fail, Ordering::SeqCst);
    }

    /// Make performance queries for one host fail.
    pub fn set_fail_query_for(&self, host_name: &str, fail: bool) {
        let mut inventory = self.inventory.write();
        if fail {
            inventory.failing_hosts.insert(host_name.to_string());
        } else {
            inventory.failing_hosts.remove(host_name);
        }
    }

    /// Number of counter catalogue requests served.
    pub fn counter_catalogue_calls(&self) -> usize {
        self.catalogue_calls.load(Ordering::SeqCst)
    }

    /// Number of performance queries served.
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSession for InMemorySession {
    async fn list_performance_counters(&self) -> Result<Vec<CounterInfo>> {
        self.catalogue_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_catalogue.load(Ordering::SeqCst) {
            return Err(Error::RemoteApi {
                status: 503,
                message: "performance manager unavailable".into(),
            });
        }
        Ok(self.inventory.read().counters.clone())
    }

    async fn resolve_scope(&self, name: &str) -> Result<ScopeHandle> {
        let inventory = self.inventory.read();
        let name = name.trim_start_matches('/');

        if name.is_empty() {
            return match inventory.datacenters.as_slice() {
                [(dc_name, reference)] => Ok(ScopeHandle {
                    name: dc_name.clone(),
                    reference: reference.clone(),
                }),
                [] => Err(Error::ScopeNotFound("no datacenter found".into())),
                _ => Err(Error::ScopeNotFound(
                    "default datacenter resolves to multiple instances".into(),
                )),
            };
        }

        inventory
            .datacenters
            .iter()
            .find(|(dc_name, _)| dc_name == name)
            .map(|(dc_name, reference)| ScopeHandle {
                name: dc_name.clone(),
                reference: reference.clone(),
            })
            .ok_or_else(|| Error::ScopeNotFound(name.to_string()))
    }

    async fn list_hosts(&self, _scope: &ScopeHandle) -> Result<Vec<HostRef>> {
        if self.fail_host_listing.load(Ordering::SeqCst) {
            return Err(Error::RemoteApi {
                status: 500,
                message: "container view failed".into(),
            });
        }
        Ok(self
            .inventory
            .read()
            .hosts
            .iter()
            .map(|(host, _)| host.clone())
            .collect())
    }

    async fn query_performance(
        &self,
        host: &HostRef,
        _spec: &PerfQuerySpec,
    ) -> Result<Vec<EntityMetric>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let inventory = self.inventory.read();

        if inventory.failing_hosts.contains(&host.name) {
            return Err(Error::RemoteApi {
                status: 500,
                message: format!("QueryPerf failed for {}", host.name),
            });
        }

        Ok(inventory
            .hosts
            .iter()
            .find(|(h, _)| h.reference == host.reference)
            .map(|(_, metrics)| metrics.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_default_scope_requires_single_datacenter() {
        let none = InMemorySession::new();
        assert_matches!(none.resolve_scope("").await, Err(Error::ScopeNotFound(_)));

        let one = InMemorySession::new().with_datacenter("dc1", "datacenter-2");
        assert_eq!(one.resolve_scope("").await.unwrap().name, "dc1");

        let two = InMemorySession::new()
            .with_datacenter("dc1", "datacenter-2")
            .with_datacenter("dc2", "datacenter-3");
        assert_matches!(two.resolve_scope("").await, Err(Error::ScopeNotFound(_)));
        assert_eq!(
            two.resolve_scope("/dc2").await.unwrap().reference.value,
            "datacenter-3"
        );
    }

    #[tokio::test]
    async fn test_query_failure_toggle() {
        let session = InMemorySession::new().with_host(HostRef::new("esx01", "host-1"), vec![]);
        let host = HostRef::new("esx01", "host-1");

        session.set_fail_query_for("esx01", true);
        assert!(session
            .query_performance(&host, &PerfQuerySpec::latest())
            .await
            .is_err());

        session.set_fail_query_for("esx01", false);
        assert!(session
            .query_performance(&host, &PerfQuerySpec::latest())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(session.query_calls(), 2);
    }
}
