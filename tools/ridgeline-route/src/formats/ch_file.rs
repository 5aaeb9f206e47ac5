//! ch.<profile> format - contraction hierarchy overlay
//!
//! Header, stamp, profile name, edge-based flag, ranks, arcs (from, to,
//! weight, kind, two payload words), upward CSR, downward CSR, CRC-64 footer.

use std::path::Path;

use ridgeline_common::{Result, RouteError};

use super::storage::{self, Header, Stamp};
use crate::ch::{ArcKind, ChArc, ChGraph};

const HEADER: Header = Header::new(0x5247_4348, 1); // "RGCH"

const KIND_BASE: u8 = 0;
const KIND_SHORTCUT: u8 = 1;

pub struct ChFile;

impl ChFile {
    pub fn write(path: &Path, ch: &ChGraph, stamp: &Stamp) -> Result<()> {
        storage::write_atomic(path, |w| {
            HEADER.write(w)?;
            stamp.write(w)?;
            w.write_str(&ch.profile)?;
            w.write_bool(ch.edge_based)?;
            w.write_u32_slice(&ch.ranks)?;

            w.write_u64(ch.arcs.len() as u64)?;
            for arc in &ch.arcs {
                w.write_u32(arc.from)?;
                w.write_u32(arc.to)?;
                w.write_u64(arc.weight)?;
                match arc.kind {
                    ArcKind::Base { label } => {
                        w.write_u8(KIND_BASE)?;
                        w.write_u32(label)?;
                        w.write_u32(0)?;
                    }
                    ArcKind::Shortcut { skip1, skip2 } => {
                        w.write_u8(KIND_SHORTCUT)?;
                        w.write_u32(skip1)?;
                        w.write_u32(skip2)?;
                    }
                }
            }

            w.write_u32_slice(&ch.up_offsets)?;
            w.write_u32_slice(&ch.up_arcs)?;
            w.write_u32_slice(&ch.down_offsets)?;
            w.write_u32_slice(&ch.down_arcs)?;
            Ok(())
        })
    }

    /// Returns `None` when the file does not exist. A file prepared for a
    /// different profile version or graph is an error, never reused.
    pub fn read(path: &Path, profile: &str, expected: &Stamp) -> Result<Option<ChGraph>> {
        let Some(mut r) = storage::open(path)? else {
            return Ok(None);
        };
        HEADER.expect(&mut r)?;
        Stamp::read(&mut r)?.verify(expected, "CH", profile, path)?;

        let stored_profile = r.read_str()?;
        if stored_profile != profile {
            return Err(r.corrupt(format!(
                "prepared for profile '{stored_profile}', expected '{profile}'"
            )));
        }
        let edge_based = r.read_bool()?;
        let ranks = r.read_u32_vec()?;

        let n_arcs = r.read_u64()?;
        let mut arcs = Vec::with_capacity(n_arcs.min(1 << 24) as usize);
        for _ in 0..n_arcs {
            let from = r.read_u32()?;
            let to = r.read_u32()?;
            let weight = r.read_u64()?;
            let tag = r.read_u8()?;
            let a = r.read_u32()?;
            let b = r.read_u32()?;
            let kind = match tag {
                KIND_BASE => ArcKind::Base { label: a },
                KIND_SHORTCUT => ArcKind::Shortcut { skip1: a, skip2: b },
                other => return Err(r.corrupt(format!("unknown arc kind {other}"))),
            };
            arcs.push(ChArc { from, to, weight, kind });
        }

        let ch = ChGraph {
            profile: stored_profile,
            edge_based,
            ranks,
            arcs,
            up_offsets: r.read_u32_vec()?,
            up_arcs: r.read_u32_vec()?,
            down_offsets: r.read_u32_vec()?,
            down_arcs: r.read_u32_vec()?,
        };
        r.finish()?;
        ch.validate().map_err(|detail| RouteError::storage(path, detail))?;
        Ok(Some(ch))
    }
}
