use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::warn;
use loadroute_core::NodeId;
use rand::Rng;

/// The file external orchestration polls to learn which switches finished bootstrapping.
///
/// Every switch appends its name once, then again `retries` times after a random pause, so a
/// reader racing a write still sees the name eventually. Appends are serialized.
#[derive(Debug, Clone)]
pub struct ReadinessMarker {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    retries: u32,
    min_pause: Duration,
    max_pause: Duration,
}

impl ReadinessMarker {
    pub fn new(path: impl Into<PathBuf>, retries: u32) -> Self {
        Self {
            path: path.into(),
            lock: Arc::default(),
            retries,
            min_pause: Duration::from_millis(500),
            max_pause: Duration::from_millis(2500),
        }
    }

    /// Changes the range of the pause between repeated appends.
    pub fn with_pause(mut self, min: Duration, max: Duration) -> Self {
        self.min_pause = min;
        self.max_pause = max.max(min);
        self
    }

    /// Appends one line with `name`.
    pub fn append(&self, name: NodeId) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{name}")
    }

    /// Appends `name` and its repetitions on a background thread.
    pub fn announce(&self, name: NodeId) -> JoinHandle<()> {
        let marker = self.clone();
        thread::spawn(move || {
            for attempt in 0..=marker.retries {
                if let Err(e) = marker.append(name) {
                    warn!("Failed to mark {name} as ready: {e}");
                }
                if attempt < marker.retries {
                    let pause = rand::thread_rng().gen_range(marker.min_pause..=marker.max_pause);
                    thread::sleep(pause);
                }
            }
        })
    }
}
