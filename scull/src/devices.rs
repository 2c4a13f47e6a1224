//! Devices - the set of stores, pipes and access-policy devices built from one config
//!
//! Construction stands in for device registration, [`Devices::teardown`]
//! for module unload.

use std::sync::Arc;

use crate::access::{AccessPolicy, PrivateClone, SingleOpen, SingleUser, WaitingUser};
use crate::caller::Caller;
use crate::config::ScullConfig;
use crate::error::{Result, ScullError};
use crate::pipe::Pipe;
use crate::store::Store;

pub const SINGLE_OPEN: &str = "scullsingle";
pub const SINGLE_USER: &str = "sculluid";
pub const WAITING_USER: &str = "scullwuid";
pub const PRIVATE_CLONE: &str = "scullpriv";

pub struct Devices {
    config: ScullConfig,
    stores: Vec<Arc<Store>>,
    pipes: Vec<Arc<Pipe>>,
    policies: Vec<Box<dyn AccessPolicy>>,
}

impl Devices {
    /// # Errors
    ///
    /// `Config` if `config` fails validation.
    pub fn new(config: ScullConfig) -> Result<Self> {
        config.validate()?;

        let stores = (0..config.nr_devs)
            .map(|i| Arc::new(Store::new(&format!("scull{i}"), &config)))
            .collect();
        let pipes = (0..config.nr_pipe_devs)
            .map(|i| Arc::new(Pipe::new(&format!("scullpipe{i}"), &config)))
            .collect();
        let policies: Vec<Box<dyn AccessPolicy>> = vec![
            Box::new(SingleOpen::new(SINGLE_OPEN, &config)),
            Box::new(SingleUser::new(SINGLE_USER, &config)),
            Box::new(WaitingUser::new(WAITING_USER, &config)),
            Box::new(PrivateClone::new(PRIVATE_CLONE, &config)),
        ];

        log::info!(
            "devices: {} stores (quantum {}, qset {}), {} pipes ({} bytes), {} access devices",
            config.nr_devs,
            config.quantum,
            config.qset,
            config.nr_pipe_devs,
            config.pipe_buffer,
            policies.len()
        );

        Ok(Self {
            config,
            stores,
            pipes,
            policies,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ScullConfig {
        &self.config
    }

    /// # Errors
    ///
    /// `NoDevice` if `index` is out of range.
    pub fn store(&self, index: usize) -> Result<Arc<Store>> {
        self.stores
            .get(index)
            .cloned()
            .ok_or(ScullError::NoDevice(index))
    }

    /// # Errors
    ///
    /// `NoDevice` if `index` is out of range.
    pub fn pipe(&self, index: usize) -> Result<Arc<Pipe>> {
        self.pipes
            .get(index)
            .cloned()
            .ok_or(ScullError::NoDevice(index))
    }

    /// Access-policy device by name (`scullsingle`, `sculluid`, `scullwuid`, `scullpriv`)
    #[must_use]
    pub fn policy(&self, name: &str) -> Option<&dyn AccessPolicy> {
        self.policies
            .iter()
            .find(|p| p.name() == name)
            .map(|p| &**p as &dyn AccessPolicy)
    }

    pub fn policies(&self) -> impl Iterator<Item = &dyn AccessPolicy> {
        self.policies.iter().map(|p| &**p as &dyn AccessPolicy)
    }

    /// Text dump of every plain store, taken under each store's lock
    ///
    /// # Errors
    ///
    /// `Interrupted` if a lock wait was interrupted.
    pub fn dump(&self, caller: &Caller) -> Result<String> {
        let mut out = String::new();
        for store in &self.stores {
            out.push_str(&store.dump(caller)?.to_string());
        }
        for pipe in &self.pipes {
            out.push_str(&pipe.status().to_string());
        }
        Ok(out)
    }

    /// Free every store, pipe buffer and clone
    pub fn teardown(&self) {
        for store in &self.stores {
            store.teardown();
        }
        for pipe in &self.pipes {
            pipe.teardown();
        }
        for policy in &self.policies {
            policy.teardown();
        }
        log::info!("devices: torn down");
    }
}

impl Drop for Devices {
    fn drop(&mut self) {
        self.teardown();
    }
}
