use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::HarnessError;

#[derive(Debug, Default)]
struct Devices {
    known: BTreeSet<String>,
    used: BTreeSet<String>,
}

/// Which cameras are connected and which are held by an open harness.
///
/// Clones share the same bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct DeviceRegistry {
    devices: Arc<Mutex<Devices>>,
}

impl DeviceRegistry {
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::default();
        for id in known {
            registry.register(id);
        }
        registry
    }

    fn lock(&self) -> MutexGuard<'_, Devices> {
        self.devices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, id: impl Into<String>) {
        self.lock().known.insert(id.into());
    }

    pub fn list_cameras(&self) -> Vec<String> {
        self.lock().known.iter().cloned().collect()
    }

    pub fn used_cameras(&self) -> Vec<String> {
        self.lock().used.iter().cloned().collect()
    }

    pub fn unused_cameras(&self) -> Vec<String> {
        let devices = self.lock();
        devices.known.difference(&devices.used).cloned().collect()
    }

    /// Marks `id` as used until the returned lease is dropped.
    pub fn claim(&self, id: &str) -> Result<DeviceLease, HarnessError> {
        let mut devices = self.lock();
        if !devices.used.insert(id.to_owned()) {
            return Err(HarnessError::DeviceInUse(id.to_owned()));
        }
        devices.known.insert(id.to_owned());
        log::debug!("camera {id} claimed");
        Ok(DeviceLease {
            registry: self.clone(),
            id: id.to_owned(),
        })
    }
}

#[derive(Debug)]
pub struct DeviceLease {
    registry: DeviceRegistry,
    id: String,
}

impl DeviceLease {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.registry.lock().used.remove(&self.id);
        log::debug!("camera {} released", self.id);
    }
}
