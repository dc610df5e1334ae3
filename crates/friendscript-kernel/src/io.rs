//! Path I/O: pluggable resolvers in front of the local filesystem.
//!
//! Hosts can claim paths (an in-memory store, a remote bucket, a test
//! fixture) by registering reader and writer resolvers. Resolvers are
//! consulted most recently registered first; each may decline a path by
//! returning `None`, in which case the next one is asked. Paths nobody claims
//! go to the filesystem.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::EvalError;

/// A boxed stream handed out by [`PathIo::open_read`].
pub type Reader = Box<dyn Read + Send>;

/// A boxed sink handed out by [`PathIo::open_write`].
pub type Writer = Box<dyn Write + Send>;

/// Claims a path for reading. `None` declines.
pub type ReadResolver = Arc<dyn Fn(&Path) -> Option<io::Result<Reader>> + Send + Sync>;

/// Claims a path for writing. `None` declines.
pub type WriteResolver = Arc<dyn Fn(&Path, WriteMode) -> Option<io::Result<Writer>> + Send + Sync>;

/// How an opened writer treats existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

/// Reader and writer resolvers with a filesystem fallback.
pub struct PathIo {
    readers: RwLock<Vec<ReadResolver>>,
    writers: RwLock<Vec<WriteResolver>>,
    working_dir: Option<PathBuf>,
}

impl PathIo {
    /// Resolve relative filesystem paths against `working_dir`, or the
    /// process working directory when `None`.
    pub fn new(working_dir: Option<PathBuf>) -> Self {
        Self {
            readers: RwLock::new(Vec::new()),
            writers: RwLock::new(Vec::new()),
            working_dir,
        }
    }

    pub fn register_reader<F>(&self, resolver: F)
    where
        F: Fn(&Path) -> Option<io::Result<Reader>> + Send + Sync + 'static,
    {
        self.readers.write().push(Arc::new(resolver));
    }

    pub fn register_writer<F>(&self, resolver: F)
    where
        F: Fn(&Path, WriteMode) -> Option<io::Result<Writer>> + Send + Sync + 'static,
    {
        self.writers.write().push(Arc::new(resolver));
    }

    /// Open `path` for reading through the first resolver that claims it.
    pub fn open_read(&self, path: &Path) -> io::Result<Reader> {
        // Clone the list so a resolver may register others without deadlocking.
        let readers: Vec<ReadResolver> = self.readers.read().clone();
        for resolver in readers.iter().rev() {
            if let Some(result) = resolver(path) {
                tracing::trace!(path = %path.display(), "path claimed by reader resolver");
                return result;
            }
        }
        let file = fs::File::open(self.local_path(path))?;
        Ok(Box::new(file))
    }

    /// Open `path` for writing through the first resolver that claims it.
    pub fn open_write(&self, path: &Path, mode: WriteMode) -> io::Result<Writer> {
        let writers: Vec<WriteResolver> = self.writers.read().clone();
        for resolver in writers.iter().rev() {
            if let Some(result) = resolver(path, mode) {
                tracing::trace!(path = %path.display(), ?mode, "path claimed by writer resolver");
                return result;
            }
        }
        let local = self.local_path(path);
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            WriteMode::Truncate => options.write(true).truncate(true),
            WriteMode::Append => options.append(true),
        };
        let file = options.open(local)?;
        Ok(Box::new(file))
    }

    /// Whether `path` can be opened for reading.
    pub fn exists(&self, path: &Path) -> bool {
        self.open_read(path).is_ok()
    }

    /// Read the whole of `path` as UTF-8.
    pub fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let mut text = String::new();
        self.open_read(path)?.read_to_string(&mut text)?;
        Ok(text)
    }

    fn local_path(&self, path: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for PathIo {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for PathIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathIo")
            .field("readers", &self.readers.read().len())
            .field("writers", &self.writers.read().len())
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

/// Read an untrusted stream to a string, giving up after `timeout`.
///
/// The read runs on a blocking task of a private runtime, which lives on its
/// own thread so callers already inside a tokio runtime are unaffected. On
/// expiry the task is abandoned (its thread exits whenever the stream finally
/// returns) and the caller gets [`EvalError::ReadTimeout`] straight away.
pub fn read_source<R>(reader: R, timeout: Duration) -> Result<String, EvalError>
where
    R: Read + Send + 'static,
{
    let outcome = std::thread::Builder::new()
        .name("friendscript-read".into())
        .spawn(move || timed_read(reader, timeout))?
        .join()
        .map_err(|_| io::Error::other("script reader thread panicked"))??;

    match outcome {
        None => {
            tracing::warn!(?timeout, "timed out reading script source");
            Err(EvalError::ReadTimeout(timeout))
        }
        Some(read) => Ok(read?),
    }
}

/// `None` when the read outlived `timeout`.
fn timed_read<R>(mut reader: R, timeout: Duration) -> io::Result<Option<io::Result<String>>>
where
    R: Read + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let task = runtime.spawn_blocking(move || {
        let mut text = String::new();
        reader.read_to_string(&mut text).map(|_| text)
    });
    let outcome = runtime.block_on(async { tokio::time::timeout(timeout, task).await });
    runtime.shutdown_background();

    match outcome {
        Err(_) => Ok(None),
        Ok(Err(join)) => Err(io::Error::other(join)),
        Ok(Ok(read)) => Ok(Some(read)),
    }
}
