//! Utilities for reading controller inputs and writing the files external tooling consumes.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::ProgressBar;
use log::info;
use loadroute_core::network::paths::Graph;
use loadroute_core::{
    AlternatePaths, AlternatesError, Config, ConfigError, Link, Mbps, NodeId, PathCache,
    Topology, TopologyError,
};

mod files;
pub mod state;

pub use files::StateFiles;

/// Reads a [`Topology`] from a file containing a [`TopologySpec`] in JSON format.
pub fn read_topology(topology_spec: impl AsRef<Path>) -> Result<Topology, Error> {
    let spec = read_topology_spec(topology_spec)?;
    Ok(spec.build()?)
}

/// Reads a [`TopologySpec`] from a file in JSON format.
pub fn read_topology_spec(path: impl AsRef<Path>) -> Result<TopologySpec, Error> {
    let path = path.as_ref();
    match extension(path) {
        Some("json") => {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        }
        _ => Err(Error::UnknownFileType(path.into())),
    }
}

/// Reads and validates a [`Config`] from a file in JSON format.
pub fn read_config(path: impl AsRef<Path>) -> Result<Config, Error> {
    let path = path.as_ref();
    let config: Config = match extension(path) {
        Some("json") => {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        }
        _ => return Err(Error::UnknownFileType(path.into())),
    };
    config.validate()?;
    Ok(config)
}

/// A topology specification, stored as `[hosts, switches, links]` where every link is
/// `[a, b, capacity]` and a `null` capacity means unlimited.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(from = "RawTopology", into = "RawTopology")]
pub struct TopologySpec {
    /// Hosts.
    pub hosts: Vec<NodeId>,
    /// Switches.
    pub switches: Vec<NodeId>,
    /// Links.
    pub links: Vec<Link>,
}

impl TopologySpec {
    /// Validates the specification into a [`Topology`].
    pub fn build(&self) -> Result<Topology, TopologyError> {
        Topology::new(&self.hosts, &self.switches, &self.links)
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RawTopology(
    Vec<NodeId>,
    Vec<NodeId>,
    Vec<(NodeId, NodeId, Option<Mbps>)>,
);

impl From<RawTopology> for TopologySpec {
    fn from(RawTopology(hosts, switches, links): RawTopology) -> Self {
        let links = links
            .into_iter()
            .map(|(a, b, capacity)| Link::new(a, b, capacity))
            .collect();
        Self {
            hosts,
            switches,
            links,
        }
    }
}

impl From<TopologySpec> for RawTopology {
    fn from(spec: TopologySpec) -> Self {
        let links = spec
            .links
            .into_iter()
            .map(|l| (l.a, l.b, l.capacity))
            .collect();
        RawTopology(spec.hosts, spec.switches, links)
    }
}

/// An alternate-path matrix in storable form: `matrix[i][j]` lists every path between hosts
/// `i` and `j`.
pub type Matrix = Vec<Vec<Vec<Vec<NodeId>>>>;

/// Loads the alternate-path matrix cached at `path` if there is one, or enumerates it from
/// `topology` and caches it there. The format follows the extension: JSON or MsgPack.
///
/// A cache that does not fit `topology` is an error rather than being silently recomputed.
pub fn load_or_compute_alternates(
    path: impl AsRef<Path>,
    topology: &Topology,
) -> Result<PathCache, Error> {
    let path = path.as_ref();
    if path.is_file() {
        info!("Loading alternate paths from {}", path.display());
        let matrix = read_alternates(path)?;
        let alternates = AlternatePaths::from_matrix(topology.hosts(), matrix)?;
        return Ok(PathCache::new(Graph::from_topology(topology), alternates));
    }
    info!(
        "Enumerating alternate paths between {} hosts",
        topology.hosts().len()
    );
    let bar = ProgressBar::new_spinner();
    bar.set_message("Enumerating simple paths");
    bar.enable_steady_tick(Duration::from_millis(100));
    let cache = PathCache::compute(topology);
    bar.finish_and_clear();
    write_alternates(path, cache.alternates())?;
    info!("Cached alternate paths at {}", path.display());
    Ok(cache)
}

/// Reads an alternate-path matrix in JSON or MsgPack format.
pub fn read_alternates(path: impl AsRef<Path>) -> Result<Matrix, Error> {
    let path = path.as_ref();
    let matrix = match extension(path) {
        Some("json") => {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        }
        Some("msgpack") => {
            let f = File::open(path)?;
            let reader = BufReader::new(f);
            rmp_serde::decode::from_read(reader)?
        }
        _ => return Err(Error::UnknownFileType(path.into())),
    };
    Ok(matrix)
}

/// Writes an alternate-path matrix in JSON or MsgPack format.
pub fn write_alternates(path: impl AsRef<Path>, alternates: &AlternatePaths) -> Result<(), Error> {
    let path = path.as_ref();
    let matrix = alternates.to_matrix();
    match extension(path) {
        Some("json") => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer(&mut writer, &matrix)?;
            writer.flush()?;
        }
        Some("msgpack") => {
            let mut writer = BufWriter::new(File::create(path)?);
            rmp_serde::encode::write(&mut writer, &matrix)?;
            writer.flush()?;
        }
        _ => return Err(Error::UnknownFileType(path.into())),
    }
    Ok(())
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Error kinds for input files and I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown file type.
    #[error("unknown file type: {0}")]
    UnknownFileType(PathBuf),

    /// A path with no usable file name.
    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),

    /// Error serializing/deserializing JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// Error deserializing MsgPack.
    #[error("MsgPack decode error")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Error serializing MsgPack.
    #[error("MsgPack encode error")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// I/O error.
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// Error constructing a valid topology.
    #[error("invalid topology")]
    Topology(#[from] TopologyError),

    /// A cached alternate-path matrix that does not fit the topology.
    #[error("invalid alternate-path cache")]
    Alternates(#[from] AlternatesError),

    /// Invalid configuration values.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
}
