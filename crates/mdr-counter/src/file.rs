//! Durable counter files.
//!
//! One file per namespace, `{dir}/{project}_{type}.counter`, holding the last
//! issued number as exactly 4 bytes of big-endian `i32`. An empty file reads
//! as 0. Any other length, or a negative value, is corruption and is never
//! repaired here.
//!
//! Every read-modify-write runs under an exclusive OS lock on the counter
//! file and the new value reaches stable storage before the lock is released,
//! so independent processes sharing `dir` never observe the same value twice.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use mdr_types::Namespace;
use tracing::{debug, trace};

use crate::error::{CounterError, CounterResult};
use crate::traits::IdCounter;

/// Size of a counter record in bytes.
const RECORD_LEN: u64 = 4;

/// Extension of counter files.
const COUNTER_EXTENSION: &str = "counter";

/// Counter persisted as one small file per namespace.
#[derive(Clone, Debug)]
pub struct FileCounter {
    dir: PathBuf,
}

impl FileCounter {
    /// Use `dir` for counter files. The directory is created on first
    /// allocation.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the counter file for `namespace`.
    pub fn path_of(&self, namespace: &Namespace) -> PathBuf {
        self.dir.join(format!("{namespace}.{COUNTER_EXTENSION}"))
    }

    fn open_for_update(&self, path: &Path) -> CounterResult<File> {
        fs::create_dir_all(&self.dir)?;
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }
}

fn read_value(file: &mut File, path: &Path) -> CounterResult<u32> {
    let len = file.metadata()?.len();
    match len {
        0 => Ok(0),
        RECORD_LEN => {
            let mut buf = [0u8; RECORD_LEN as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            let value = i32::from_be_bytes(buf);
            u32::try_from(value).map_err(|_| CounterError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("negative value {value}"),
            })
        }
        other => Err(CounterError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("expected {RECORD_LEN} bytes, found {other}"),
        }),
    }
}

fn write_value(file: &mut File, value: i32) -> CounterResult<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&value.to_be_bytes())?;
    file.set_len(RECORD_LEN)?;
    file.sync_all()?;
    Ok(())
}

impl IdCounter for FileCounter {
    fn last_issued(&self, namespace: &Namespace) -> CounterResult<u32> {
        let path = self.path_of(namespace);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let value = read_value(&mut file, &path);
        FileExt::unlock(&file)?;
        value
    }

    fn advance(
        &self,
        namespace: &Namespace,
        step: &mut dyn FnMut(u32) -> CounterResult<u32>,
    ) -> CounterResult<u32> {
        let path = self.path_of(namespace);
        let mut file = self.open_for_update(&path)?;
        file.lock_exclusive()?;
        trace!(path = %path.display(), "counter locked");

        let outcome = (|| -> CounterResult<u32> {
            let current = read_value(&mut file, &path)?;
            let next = step(current)?;
            if next < current {
                return Err(CounterError::Regression {
                    namespace: namespace.clone(),
                    current,
                    requested: next,
                });
            }
            let record =
                i32::try_from(next).map_err(|_| CounterError::Exhausted(namespace.clone()))?;
            if next != current {
                write_value(&mut file, record)?;
            }
            Ok(next)
        })();

        let unlocked = FileExt::unlock(&file);
        let next = outcome?;
        unlocked?;
        debug!(%namespace, value = next, "counter advanced");
        Ok(next)
    }

    fn is_durable(&self) -> bool {
        true
    }
}
