//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::{RegistryError, RuntimeError};
use crate::registry::Registry;
use crate::runtime::ContainerRuntime;
use crate::types::{ContainerEvent, ContainerSnapshot, RegistryEntry, ServiceSpec};

#[derive(Default)]
pub struct FakeRegistry {
    records: Mutex<HashMap<String, ServiceSpec>>,
    deleted: Mutex<Vec<String>>,
    put_attempts: AtomicU32,
    delete_attempts: AtomicU32,
    delete_failures: AtomicU32,
    fail_puts: Mutex<bool>,
    fail_list: Mutex<bool>,
}

impl FakeRegistry {
    pub fn insert(&self, spec: ServiceSpec) {
        self.records.lock().unwrap().insert(spec.id.clone(), spec);
    }

    pub fn spec(&self, id: &str) -> Option<ServiceSpec> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn entries(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.records.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids passed to a successful delete, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Fail the next `n` deletes.
    pub fn fail_deletes(&self, n: u32) {
        self.delete_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        *self.fail_puts.lock().unwrap() = fail;
    }

    pub fn fail_list(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    pub fn put_attempts(&self) -> u32 {
        self.put_attempts.load(Ordering::SeqCst)
    }

    pub fn delete_attempts(&self) -> u32 {
        self.delete_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn put(&self, spec: &ServiceSpec) -> Result<(), RegistryError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if *self.fail_puts.lock().unwrap() {
            return Err(RegistryError::Unavailable("put refused".into()));
        }
        self.insert(spec.clone());
        Ok(())
    }

    async fn delete(&self, service_id: &str) -> Result<(), RegistryError> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .delete_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RegistryError::Unavailable("delete refused".into()));
        }
        self.records.lock().unwrap().remove(service_id);
        self.deleted.lock().unwrap().push(service_id.to_string());
        Ok(())
    }

    async fn list_all(&self) -> Result<HashMap<String, RegistryEntry>, RegistryError> {
        if *self.fail_list.lock().unwrap() {
            return Err(RegistryError::Unavailable("list refused".into()));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .map(|spec| {
                let entry = RegistryEntry {
                    id: spec.id.clone(),
                    address: spec.address.clone(),
                    port: spec.port,
                    tags: spec.tags.clone(),
                };
                (spec.id.clone(), entry)
            })
            .collect())
    }
}

pub fn docker_unavailable() -> RuntimeError {
    RuntimeError::Docker(bollard::errors::Error::DockerResponseServerError {
        status_code: 500,
        message: "daemon unavailable".into(),
    })
}

type Subscription = Vec<Result<ContainerEvent, RuntimeError>>;

#[derive(Default)]
pub struct FakeRuntime {
    running: Mutex<Vec<ContainerSnapshot>>,
    fail_list: Mutex<bool>,
    fail_inspect: Mutex<bool>,
    subscriptions: Mutex<VecDeque<Subscription>>,
    subscribe_count: AtomicU32,
}

impl FakeRuntime {
    pub fn with_containers(containers: Vec<ContainerSnapshot>) -> Self {
        Self {
            running: Mutex::new(containers),
            ..Default::default()
        }
    }

    pub fn add(&self, snapshot: ContainerSnapshot) {
        self.running.lock().unwrap().push(snapshot);
    }

    pub fn remove(&self, id: &str) {
        self.running.lock().unwrap().retain(|c| c.id != id);
    }

    pub fn fail_list(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    /// Make `get_container` fail with a daemon error instead of a miss.
    pub fn fail_inspect(&self, fail: bool) {
        *self.fail_inspect.lock().unwrap() = fail;
    }

    /// Queue the items the next call to `events` yields before ending.
    pub fn push_subscription(&self, items: Subscription) {
        self.subscriptions.lock().unwrap().push_back(items);
    }

    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_running(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError> {
        if *self.fail_list.lock().unwrap() {
            return Err(docker_unavailable());
        }
        Ok(self.running.lock().unwrap().clone())
    }

    async fn get_container(&self, id: &str) -> Result<Option<ContainerSnapshot>, RuntimeError> {
        if *self.fail_inspect.lock().unwrap() {
            return Err(docker_unavailable());
        }
        Ok(self
            .running
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn events(&self) -> BoxStream<'static, Result<ContainerEvent, RuntimeError>> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        match self.subscriptions.lock().unwrap().pop_front() {
            Some(items) => stream::iter(items).boxed(),
            None => stream::pending().boxed(),
        }
    }
}
