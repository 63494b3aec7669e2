// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed run keys in the key-value store.
//!
//! Values are stored as JSON so a key round-trips its Rust type.

use serde::Serialize;
use serde::de::DeserializeOwned;

use scrapeyard_protocol::Stage;

use crate::error::Result;
use crate::kvstore::KvStore;

/// A key under a run's `{run_id}/` namespace.
pub(crate) struct Key<'a> {
    kv: &'a dyn KvStore,
    path: String,
}

impl<'a> Key<'a> {
    fn new(kv: &'a dyn KvStore, run_id: &str, name: &str) -> Self {
        Self {
            kv,
            path: format!("{}/{}", run_id, name),
        }
    }

    pub(crate) fn created(kv: &'a dyn KvStore, run_id: &str) -> Self {
        Self::new(kv, run_id, "created")
    }

    pub(crate) fn token(kv: &'a dyn KvStore, run_id: &str) -> Self {
        Self::new(kv, run_id, "token")
    }

    pub(crate) fn callback_url(kv: &'a dyn KvStore, run_id: &str) -> Self {
        Self::new(kv, run_id, "url")
    }

    pub(crate) fn memory(kv: &'a dyn KvStore, run_id: &str) -> Self {
        Self::new(kv, run_id, "memory")
    }

    pub(crate) fn first_time(kv: &'a dyn KvStore, run_id: &str) -> Self {
        Self::new(kv, run_id, "first_time")
    }

    pub(crate) fn exit_data_stage(kv: &'a dyn KvStore, run_id: &str, stage: Stage) -> Self {
        Self::new(kv, run_id, &format!("exit_data/{}", stage))
    }

    pub(crate) fn exit_data_finished(kv: &'a dyn KvStore, run_id: &str) -> Self {
        Self::new(kv, run_id, "exit_data/finished")
    }

    pub(crate) fn api_network_in(kv: &'a dyn KvStore, run_id: &str) -> Self {
        Self::new(kv, run_id, "exit_data/api/network_in")
    }

    pub(crate) fn api_network_out(kv: &'a dyn KvStore, run_id: &str) -> Self {
        Self::new(kv, run_id, "exit_data/api/network_out")
    }

    /// Every key a run may own, for teardown.
    pub(crate) fn all(kv: &'a dyn KvStore, run_id: &str) -> Vec<Self> {
        vec![
            Self::exit_data_stage(kv, run_id, Stage::Build),
            Self::exit_data_stage(kv, run_id, Stage::Execute),
            Self::exit_data_finished(kv, run_id),
            Self::api_network_in(kv, run_id),
            Self::api_network_out(kv, run_id),
            Self::callback_url(kv, run_id),
            Self::memory(kv, run_id),
            Self::first_time(kv, run_id),
            Self::token(kv, run_id),
            Self::created(kv, run_id),
        ]
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) async fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.kv.set(&self.path, &json).await?;
        Ok(())
    }

    /// Read and decode. A missing key is [`crate::Error::NotFound`].
    pub(crate) async fn get<T: DeserializeOwned>(&self) -> Result<T> {
        let json = self.kv.get(&self.path).await?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Like [`Key::get`], mapping a missing key to `None`.
    pub(crate) async fn get_opt<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.get().await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn increment(&self, delta: u64) -> Result<u64> {
        let delta = i64::try_from(delta).unwrap_or(i64::MAX);
        let value = self.kv.increment(&self.path, delta).await?;
        Ok(value.max(0) as u64)
    }

    pub(crate) async fn delete(&self) -> Result<()> {
        self.kv.delete(&self.path).await?;
        Ok(())
    }
}
