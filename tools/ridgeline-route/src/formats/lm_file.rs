//! lm.<profile> format - landmark distance tables
//!
//! Header, stamp, profile name, weighting name, quantization factor, landmark
//! count, per-node subnetwork ids, landmark lists per subnetwork, forward and
//! backward u16 tables, CRC-64 footer.

use std::path::Path;

use ridgeline_common::{ConfigError, Result, RouteError};

use super::storage::{self, Header, Stamp};
use crate::lm::LandmarkStorage;

const HEADER: Header = Header::new(0x5247_4C4D, 1); // "RGLM"

pub struct LmFile;

impl LmFile {
    pub fn write(path: &Path, lm: &LandmarkStorage, stamp: &Stamp) -> Result<()> {
        storage::write_atomic(path, |w| {
            HEADER.write(w)?;
            stamp.write(w)?;
            w.write_str(&lm.profile)?;
            w.write_str(&lm.weighting)?;
            w.write_f64(lm.factor)?;
            w.write_u32(lm.landmark_count as u32)?;
            w.write_u32_slice(&lm.subnetworks)?;
            w.write_u32(lm.landmarks.len() as u32)?;
            for list in &lm.landmarks {
                w.write_u32_slice(list)?;
            }
            w.write_u16_slice(&lm.from)?;
            w.write_u16_slice(&lm.to)?;
            Ok(())
        })
    }

    /// Returns `None` when the file does not exist. Tables computed for a
    /// different graph, profile version or weighting are rejected.
    pub fn read(path: &Path, profile: &str, weighting: &str, expected: &Stamp) -> Result<Option<LandmarkStorage>> {
        let Some(mut r) = storage::open(path)? else {
            return Ok(None);
        };
        HEADER.expect(&mut r)?;
        Stamp::read(&mut r)?.verify(expected, "LM", profile, path)?;

        let stored_profile = r.read_str()?;
        if stored_profile != profile {
            return Err(r.corrupt(format!(
                "prepared for profile '{stored_profile}', expected '{profile}'"
            )));
        }
        let stored_weighting = r.read_str()?;
        if stored_weighting != weighting {
            return Err(ConfigError::StalePreparation {
                kind: "LM",
                profile: profile.to_string(),
                detail: format!("weighting '{stored_weighting}' != '{weighting}'"),
                path: path.to_path_buf(),
            }
            .into());
        }
        let factor = r.read_f64()?;
        let landmark_count = r.read_u32()? as usize;
        let subnetworks = r.read_u32_vec()?;
        let n_lists = r.read_u32()?;
        let mut landmarks = Vec::with_capacity(n_lists.min(1 << 16) as usize);
        for _ in 0..n_lists {
            landmarks.push(r.read_u32_vec()?);
        }
        let lm = LandmarkStorage {
            profile: stored_profile,
            weighting: stored_weighting,
            factor,
            landmark_count,
            subnetworks,
            landmarks,
            from: r.read_u16_vec()?,
            to: r.read_u16_vec()?,
        };
        r.finish()?;
        lm.validate().map_err(|detail| RouteError::storage(path, detail))?;
        Ok(Some(lm))
    }
}
