//! Shared plumbing for prepared files: headers, stamps, atomic publish, locking

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ridgeline_common::{ConfigError, Result, RouteError};
use tracing::debug;

use super::crc::{CrcReader, CrcWriter};
use crate::graph::GraphSignature;

/// Magic and format version at the start of every file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub version: u16,
}

impl Header {
    pub const fn new(magic: u32, version: u16) -> Self {
        Self { magic, version }
    }

    pub fn write<W: Write>(&self, w: &mut CrcWriter<W>) -> std::io::Result<()> {
        w.write_u32(self.magic)?;
        w.write_u16(self.version)?;
        w.write_u16(0) // reserved
    }

    pub fn expect<R: Read>(&self, r: &mut CrcReader<R>) -> Result<()> {
        let magic = r.read_u32()?;
        if magic != self.magic {
            return Err(r.corrupt(format!(
                "wrong magic 0x{magic:08X}, expected 0x{:08X}",
                self.magic
            )));
        }
        let version = r.read_u16()?;
        if version != self.version {
            return Err(r.corrupt(format!(
                "unsupported format version {version}, expected {}",
                self.version
            )));
        }
        r.read_u16()?;
        Ok(())
    }
}

/// What a preparation was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub profile_version: u64,
    pub graph: GraphSignature,
}

impl Stamp {
    pub fn write<W: Write>(&self, w: &mut CrcWriter<W>) -> std::io::Result<()> {
        w.write_u64(self.profile_version)?;
        w.write_bytes(&self.graph.0)
    }

    pub fn read<R: Read>(r: &mut CrcReader<R>) -> Result<Self> {
        let profile_version = r.read_u64()?;
        let mut sig = [0u8; 32];
        r.read_bytes(&mut sig)?;
        Ok(Self {
            profile_version,
            graph: GraphSignature(sig),
        })
    }

    /// A stamp that does not match the current configuration is never reused
    pub fn verify(&self, expected: &Stamp, kind: &'static str, profile: &str, path: &Path) -> Result<()> {
        let detail = if self.graph != expected.graph {
            Some(format!(
                "graph signature {} != {}",
                &self.graph.hex()[..16],
                &expected.graph.hex()[..16]
            ))
        } else if self.profile_version != expected.profile_version {
            Some(format!(
                "configuration version {:016x} != {:016x}",
                self.profile_version, expected.profile_version
            ))
        } else {
            None
        };
        match detail {
            Some(detail) => Err(ConfigError::StalePreparation {
                kind,
                profile: profile.to_string(),
                detail,
                path: path.to_path_buf(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a checksummed file under a temporary name and rename it into place
/// once complete. On failure the temporary file is removed and `path` is
/// left untouched.
pub fn write_atomic<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut CrcWriter<BufWriter<File>>) -> Result<()>,
{
    let tmp = tmp_path(path);
    let result = (|| -> Result<()> {
        let mut w = CrcWriter::new(BufWriter::new(File::create(&tmp)?));
        body(&mut w)?;
        let file = w.finish()?.into_inner().map_err(|e| RouteError::Io(e.into_error()))?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            debug!(path = %tmp.display(), error = %e, "temporary file not removed");
        }
    }
    result
}

/// Open a checksummed file; `None` when it does not exist
pub fn open(path: &Path) -> Result<Option<CrcReader<BufReader<File>>>> {
    match File::open(path) {
        Ok(f) => Ok(Some(CrcReader::new(BufReader::new(f), path))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Header and stamp of a prepared file, without reading or checking the body
pub fn read_preamble(path: &Path) -> Result<Option<(Header, Stamp)>> {
    let Some(mut r) = open(path)? else {
        return Ok(None);
    };
    let magic = r.read_u32()?;
    let version = r.read_u16()?;
    r.read_u16()?;
    let stamp = Stamp::read(&mut r)?;
    Ok(Some((Header::new(magic, version), stamp)))
}

const LOCK_FILE: &str = "prepare.lock";

/// Coarse inter-process write lock on a storage directory.
///
/// An advisory lock on `prepare.lock`, released on drop or when the owning
/// process exits. The file itself stays behind and only records the last
/// owner's pid.
#[derive(Debug)]
pub struct StorageLock {
    path: PathBuf,
    _file: File,
}

impl StorageLock {
    /// Fails immediately when another process holds the lock
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(ConfigError::LockHeld { path }.into()),
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "storage lock acquired");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
