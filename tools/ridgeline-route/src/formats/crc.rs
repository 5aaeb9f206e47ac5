//! CRC-64-ISO checksums and checksummed little-endian streams
//!
//! Every prepared file ends with a CRC-64 footer over all preceding bytes.
//! [`CrcWriter`] and [`CrcReader`] track the digest while encoding/decoding
//! fields so the formats never hash a field twice or forget one.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crc::{Crc, CRC_64_GO_ISO};
use ridgeline_common::{Result, RouteError};

/// CRC-64-ISO algorithm
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Compute CRC-64 checksum for a byte slice
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Incremental CRC-64 digest
pub struct Digest {
    digest: crc::Digest<'static, u64>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Little-endian writer that checksums everything it writes
pub struct CrcWriter<W: Write> {
    inner: W,
    digest: Digest,
}

macro_rules! write_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self, v: $ty) -> io::Result<()> {
                self.write_bytes(&v.to_le_bytes())
            }
        )*
    };
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: Digest::new(),
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.digest.update(data);
        self.inner.write_all(data)
    }

    write_le!(
        write_u8: u8,
        write_u16: u16,
        write_u32: u32,
        write_u64: u64,
        write_i32: i32,
        write_f32: f32,
        write_f64: f64,
    );

    pub fn write_bool(&mut self, v: bool) -> io::Result<()> {
        self.write_u8(v as u8)
    }

    /// Length-prefixed UTF-8 string
    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_u32(s.len() as u32)?;
        self.write_bytes(s.as_bytes())
    }

    pub fn write_u16_slice(&mut self, values: &[u16]) -> io::Result<()> {
        self.write_u64(values.len() as u64)?;
        for v in values {
            self.write_u16(*v)?;
        }
        Ok(())
    }

    pub fn write_u32_slice(&mut self, values: &[u32]) -> io::Result<()> {
        self.write_u64(values.len() as u64)?;
        for v in values {
            self.write_u32(*v)?;
        }
        Ok(())
    }

    pub fn write_i32_slice(&mut self, values: &[i32]) -> io::Result<()> {
        self.write_u64(values.len() as u64)?;
        for v in values {
            self.write_i32(*v)?;
        }
        Ok(())
    }

    /// Append the CRC footer and hand back the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        let crc = self.digest.finalize();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Little-endian reader that verifies the CRC footer in [`CrcReader::finish`]
pub struct CrcReader<R: Read> {
    inner: R,
    digest: Digest,
    path: PathBuf,
}

macro_rules! read_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                self.read_bytes(&mut buf)?;
                Ok(<$ty>::from_le_bytes(buf))
            }
        )*
    };
}

/// Upper bound for speculative allocation from untrusted lengths
const MAX_PREALLOC: usize = 1 << 20;

impl<R: Read> CrcReader<R> {
    pub fn new(inner: R, path: &Path) -> Self {
        Self {
            inner,
            digest: Digest::new(),
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn corrupt(&self, detail: impl Into<String>) -> RouteError {
        RouteError::storage(&self.path, detail)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => self.corrupt("file is truncated"),
            _ => RouteError::Io(e),
        })?;
        self.digest.update(buf);
        Ok(())
    }

    read_le!(
        read_u8: u8,
        read_u16: u16,
        read_u32: u32,
        read_u64: u64,
        read_i32: i32,
        read_f32: f32,
        read_f64: f64,
    );

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.corrupt(format!("invalid boolean byte {other}"))),
        }
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        if len > MAX_PREALLOC {
            return Err(self.corrupt(format!("string length {len} is implausible")));
        }
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|_| self.corrupt("string is not UTF-8"))
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u64()?;
        usize::try_from(len).map_err(|_| self.corrupt(format!("length {len} does not fit in memory")))
    }

    pub fn read_u16_vec(&mut self) -> Result<Vec<u16>> {
        let len = self.read_len()?;
        let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
        for _ in 0..len {
            out.push(self.read_u16()?);
        }
        Ok(out)
    }

    pub fn read_u32_vec(&mut self) -> Result<Vec<u32>> {
        let len = self.read_len()?;
        let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
        for _ in 0..len {
            out.push(self.read_u32()?);
        }
        Ok(out)
    }

    pub fn read_i32_vec(&mut self) -> Result<Vec<i32>> {
        let len = self.read_len()?;
        let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
        for _ in 0..len {
            out.push(self.read_i32()?);
        }
        Ok(out)
    }

    /// Compare the running digest with the stored footer
    pub fn finish(mut self) -> Result<()> {
        let computed = std::mem::take(&mut self.digest).finalize();
        let mut footer = [0u8; 8];
        self.inner.read_exact(&mut footer).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => self.corrupt("missing CRC footer"),
            _ => RouteError::Io(e),
        })?;
        let stored = u64::from_le_bytes(footer);
        if computed != stored {
            return Err(self.corrupt(format!(
                "CRC64 mismatch: computed 0x{computed:016X}, stored 0x{stored:016X}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_crc64_basic() {
        let data = b"hello world";
        assert_ne!(checksum(data), 0);
    }

    #[test]
    fn test_crc64_incremental() {
        let data = b"hello world";
        let mut digest = Digest::new();
        digest.update(&data[..5]);
        digest.update(&data[5..]);
        assert_eq!(digest.finalize(), checksum(data));
    }

    fn encoded() -> Vec<u8> {
        let mut w = CrcWriter::new(Vec::new());
        w.write_u32(0xDEAD_BEEF).unwrap();
        w.write_str("car").unwrap();
        w.write_u16_slice(&[1, 2, 65535]).unwrap();
        w.write_f64(-1.5).unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn test_stream_roundtrip() {
        let bytes = encoded();
        let mut r = CrcReader::new(Cursor::new(bytes), Path::new("mem"));
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_str().unwrap(), "car");
        assert_eq!(r.read_u16_vec().unwrap(), vec![1, 2, 65535]);
        assert_eq!(r.read_f64().unwrap(), -1.5);
        r.finish().unwrap();
    }

    #[test]
    fn test_stream_detects_flipped_byte() {
        let mut bytes = encoded();
        // Inside the f64 payload, so every field still decodes
        bytes[27] ^= 0xFF;
        let mut r = CrcReader::new(Cursor::new(bytes), Path::new("mem"));
        r.read_u32().unwrap();
        r.read_str().unwrap();
        r.read_u16_vec().unwrap();
        r.read_f64().unwrap();
        let err = r.finish().unwrap_err();
        assert!(matches!(err, RouteError::Storage { .. }), "{err}");
    }

    #[test]
    fn test_stream_detects_truncation() {
        let bytes = encoded();
        let mut r = CrcReader::new(Cursor::new(&bytes[..6]), Path::new("mem"));
        r.read_u32().unwrap();
        let err = r.read_str().unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
