use std::path::{Path, PathBuf};

use log::debug;

use crate::Error;

/// Names the bookkeeping files the controller shares with external tooling, all under one
/// directory and named after the topology file.
#[derive(Debug, Clone)]
pub struct StateFiles {
    dir: PathBuf,
    base: String,
}

impl StateFiles {
    /// Uses the stem of `topology` as the base name: `nets/tri.json` gives `tri`.
    pub fn new(dir: impl Into<PathBuf>, topology: impl AsRef<Path>) -> Result<Self, Error> {
        let topology = topology.as_ref();
        let base = topology
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::InvalidPath(topology.into()))?;
        Ok(Self {
            dir: dir.into(),
            base: base.to_owned(),
        })
    }

    /// The topology base name.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Holds the base name of the running topology.
    pub fn current(&self) -> PathBuf {
        self.dir.join("~current.state")
    }

    /// The readiness marker: one line per switch that finished bootstrapping.
    pub fn marker(&self) -> PathBuf {
        self.dir.join("~current.sws.state")
    }

    /// The runtime state file.
    pub fn state(&self) -> PathBuf {
        self.dir.join(format!("{}.state", self.base))
    }

    /// The alternate-path cache.
    pub fn alternates(&self) -> PathBuf {
        self.dir.join(format!("{}.apa.json", self.base))
    }

    /// Announces the topology, empties the readiness marker and removes the state file of a
    /// previous run.
    pub fn prepare(&self) -> Result<(), Error> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.current(), &self.base)?;
        std::fs::write(self.marker(), "")?;
        let stale = self.state();
        if stale.exists() {
            debug!("Removing stale state file {}", stale.display());
            std::fs::remove_file(stale)?;
        }
        Ok(())
    }
}
