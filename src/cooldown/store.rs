//! Cooldown store backends.

use failure::{Fallible, ResultExt};
use futures::future::{self, BoxFuture};
use futures::prelude::*;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Durable key -> timestamp persistence.
pub trait CooldownStore: Send + Sync {
    /// Read a timestamp, `None` if absent.
    fn read(&self, key: &str) -> BoxFuture<'static, Fallible<Option<i64>>>;

    /// Write (or overwrite) a timestamp.
    fn write(&self, key: &str, value: i64) -> BoxFuture<'static, Fallible<()>>;

    /// Remove a timestamp. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> BoxFuture<'static, Fallible<()>>;
}

/// File-backed store, one small text file per key.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Fallible<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            bail!("invalid store key '{}'", key);
        }
        Ok(self.dir.join(key))
    }
}

/// Parse file content; empty or garbage content reads as absent.
fn parse_timestamp(path: &Path, content: &str) -> Option<i64> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(ts) => Some(ts),
        Err(e) => {
            warn!("ignoring malformed timestamp in '{}': {}", path.display(), e);
            None
        }
    }
}

async fn read_record(path: PathBuf) -> Fallible<Option<i64>> {
    trace!("reading cooldown record from {:?}", path);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(parse_timestamp(&path, &content)),
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => bail!("failed to read '{}': {}", path.display(), e),
    }
}

async fn write_record(dir: PathBuf, path: PathBuf, value: i64) -> Fallible<()> {
    tokio::fs::create_dir_all(&dir)
        .await
        .context(format!("failed to create directory '{}'", dir.display()))?;

    // Write aside and rename, so readers never see a partial value.
    let staging = path.with_extension("tmp");
    tokio::fs::write(&staging, value.to_string())
        .await
        .context(format!("failed to write '{}'", staging.display()))?;
    tokio::fs::rename(&staging, &path)
        .await
        .context(format!("failed to rename into '{}'", path.display()))?;
    Ok(())
}

async fn remove_record(path: PathBuf) -> Fallible<()> {
    match tokio::fs::remove_file(&path).await {
        Ok(_) => Ok(()),
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => bail!("failed to remove '{}': {}", path.display(), e),
    }
}

impl CooldownStore for FileStore {
    fn read(&self, key: &str) -> BoxFuture<'static, Fallible<Option<i64>>> {
        match self.path_for(key) {
            Ok(path) => read_record(path).boxed(),
            Err(e) => future::err(e).boxed(),
        }
    }

    fn write(&self, key: &str, value: i64) -> BoxFuture<'static, Fallible<()>> {
        match self.path_for(key) {
            Ok(path) => write_record(self.dir.clone(), path, value).boxed(),
            Err(e) => future::err(e).boxed(),
        }
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, Fallible<()>> {
        match self.path_for(key) {
            Ok(path) => remove_record(path).boxed(),
            Err(e) => future::err(e).boxed(),
        }
    }
}

/// In-process store, with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, i64>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Make every subsequent read fail (or stop failing).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write and remove fail (or stop failing).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: i64) {
        self.lock().insert(key.to_string(), value);
    }

    fn lock(&self) -> std::sync::MutexGuard<HashMap<String, i64>> {
        // A panicking writer cannot leave a half-written i64 behind.
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CooldownStore for MemoryStore {
    fn read(&self, key: &str) -> BoxFuture<'static, Fallible<Option<i64>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return future::err(format_err!("memory store: injected read failure")).boxed();
        }
        future::ok::<_, failure::Error>(self.get(key)).boxed()
    }

    fn write(&self, key: &str, value: i64) -> BoxFuture<'static, Fallible<()>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return future::err(format_err!("memory store: injected write failure")).boxed();
        }
        self.insert(key, value);
        future::ok::<_, failure::Error>(()).boxed()
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, Fallible<()>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return future::err(format_err!("memory store: injected remove failure")).boxed();
        }
        self.lock().remove(key);
        future::ok::<_, failure::Error>(()).boxed()
    }
}
