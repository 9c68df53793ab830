// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Source of certificates and CRLs, keyed by URL
pub trait DistributionPoint {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, Error>;
}

impl<T: DistributionPoint + ?Sized> DistributionPoint for &T {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
        (**self).get_bytes(url)
    }
}

/// In-memory distribution point.  Objects are indexed by their full URL.
#[derive(Debug)]
pub struct MemoDistributionPoint {
    p: RwLock<HashMap<String, Vec<u8>>>,
}

impl Default for MemoDistributionPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoDistributionPoint {
    /// Returns a new empty distribution point
    pub fn new() -> Self {
        Self {
            p: Default::default(),
        }
    }

    /// Publish `bytes` under `url`, replacing anything already there
    pub fn insert(&self, url: &str, bytes: &[u8]) -> Result<(), Error> {
        self.p
            .write()
            .map_err(|e| Error::FetchFailure(format!("distribution point lock: {e}")))?
            .insert(url.to_string(), bytes.to_vec());

        Ok(())
    }
}

impl DistributionPoint for MemoDistributionPoint {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
        self.p
            .read()
            .map_err(|e| Error::FetchFailure(format!("distribution point lock: {e}")))?
            .get(url)
            .cloned()
            .ok_or_else(|| Error::FetchFailure(format!("{url}: not found")))
    }
}

/// Distribution point backed by a local mirror directory: the last path
/// segment of a URL names the file to read
#[derive(Debug, Clone)]
pub struct MirrorDistributionPoint {
    root: PathBuf,
}

impl MirrorDistributionPoint {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn local_path(&self, url: &str) -> Result<PathBuf, Error> {
        let name = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|n| !n.is_empty() && *n != "." && *n != "..")
            .ok_or_else(|| Error::FetchFailure(format!("{url}: no file name in URL")))?;

        Ok(self.root.join(name))
    }
}

impl DistributionPoint for MirrorDistributionPoint {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
        let path = self.local_path(url)?;

        tracing::debug!("fetching {url} from {}", path.display());

        std::fs::read(&path).map_err(|e| Error::FetchFailure(format!("{url}: {e}")))
    }
}
