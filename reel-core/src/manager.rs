//! Registry of open streams, keyed by path.
//!
//! Opening a container and probing it is expensive, so callers that touch
//! the same file repeatedly go through a [`Manager`]: the first
//! `get_stream` opens the stream, later ones hand back the cached instance,
//! and `release_stream` drops one reference, closing the stream when the
//! last holder lets go.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::media::{MediaBackend, StreamOptions};
use crate::stream::{Stream, StreamError};

static GLOBAL: OnceCell<Manager> = OnceCell::new();

/// Install the process-wide manager used by [`global`]. The first call wins;
/// later calls return false and drop the candidate.
pub fn install(manager: Manager) -> bool {
    GLOBAL.set(manager).is_ok()
}

/// The process-wide manager, when one has been installed.
pub fn global() -> Option<&'static Manager> {
    GLOBAL.get()
}

struct ManagedStream {
    stream: Arc<Stream>,
    references: usize,
}

pub struct Manager {
    backend: Box<dyn MediaBackend>,
    options: StreamOptions,
    streams: Mutex<HashMap<PathBuf, ManagedStream>>,
}

impl Manager {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self::with_options(backend, StreamOptions::default())
    }

    /// A manager whose streams all open with the given options.
    pub fn with_options(backend: Box<dyn MediaBackend>, options: StreamOptions) -> Self {
        Self { backend, options, streams: Mutex::new(HashMap::new()) }
    }

    /// Return the open stream for `path`, opening it on first use.
    pub fn get_stream(&self, path: impl AsRef<Path>) -> Result<Arc<Stream>, StreamError> {
        let path = path.as_ref();
        let mut streams = self.streams.lock();
        if let Some(managed) = streams.get_mut(path) {
            managed.references += 1;
            return Ok(Arc::clone(&managed.stream));
        }

        let stream = Stream::open(self.backend.as_ref(), path, &self.options)?;
        streams.insert(
            path.to_path_buf(),
            ManagedStream { stream: Arc::clone(&stream), references: 1 },
        );
        Ok(stream)
    }

    /// Drop one reference to the stream for `path`.
    ///
    /// The stream is closed once every `get_stream` has been matched by a
    /// release and no external holders remain.
    pub fn release_stream(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut streams = self.streams.lock();
        let Some(managed) = streams.get_mut(path) else {
            log::warn!("release of `{}` which is not open", path.display());
            return;
        };
        managed.references -= 1;
        if managed.references == 0 {
            streams.remove(path);
            log::debug!("closed `{}`", path.display());
        }
    }

    /// Number of distinct open streams.
    pub fn open_streams(&self) -> usize {
        self.streams.lock().len()
    }
}
