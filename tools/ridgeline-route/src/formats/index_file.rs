//! location_index format - quadtree over edge segments
//!
//! Header, stamp (index parameter fingerprint + graph signature), resolution,
//! root bounding box, cell count, cells in pre-order (tag 1 + four child
//! ids for inner cells, tag 0 + edge list for leaves), CRC-64 footer.

use std::path::Path;

use ridgeline_common::{Result, RouteError};

use super::storage::{self, Header, Stamp};
use crate::config::IndexConfig;
use crate::graph::{BBox, RoutingGraph};
use crate::index::{Cell, LocationIndex, QuadTree};

const HEADER: Header = Header::new(0x5247_4C49, 1); // "RGLI"

const TAG_LEAF: u8 = 0;
const TAG_INNER: u8 = 1;

pub struct IndexFile;

impl IndexFile {
    pub fn write(path: &Path, index: &LocationIndex, stamp: &Stamp) -> Result<()> {
        storage::write_atomic(path, |w| {
            HEADER.write(w)?;
            stamp.write(w)?;
            w.write_f64(index.resolution_m)?;
            let b = index.tree.bbox;
            for v in [b.min_lat, b.min_lon, b.max_lat, b.max_lon] {
                w.write_f64(v)?;
            }
            w.write_u64(index.tree.cells.len() as u64)?;
            for cell in &index.tree.cells {
                match cell {
                    Cell::Inner { children } => {
                        w.write_u8(TAG_INNER)?;
                        for &c in children {
                            w.write_u32(c)?;
                        }
                    }
                    Cell::Leaf { edges } => {
                        w.write_u8(TAG_LEAF)?;
                        w.write_u32_slice(edges)?;
                    }
                }
            }
            Ok(())
        })
    }

    /// Returns `None` when the file does not exist
    pub fn read(path: &Path, graph: &RoutingGraph, config: &IndexConfig, expected: &Stamp) -> Result<Option<LocationIndex>> {
        let Some(mut r) = storage::open(path)? else {
            return Ok(None);
        };
        HEADER.expect(&mut r)?;
        Stamp::read(&mut r)?.verify(expected, "location index", "*", path)?;

        let resolution_m = r.read_f64()?;
        let bbox = BBox::new(r.read_f64()?, r.read_f64()?, r.read_f64()?, r.read_f64()?);
        let n_cells = r.read_u64()?;
        let mut cells = Vec::with_capacity(n_cells.min(1 << 20) as usize);
        for _ in 0..n_cells {
            let cell = match r.read_u8()? {
                TAG_INNER => Cell::Inner {
                    children: [r.read_u32()?, r.read_u32()?, r.read_u32()?, r.read_u32()?],
                },
                TAG_LEAF => Cell::Leaf {
                    edges: r.read_u32_vec()?,
                },
                other => return Err(r.corrupt(format!("unknown cell tag {other}"))),
            };
            cells.push(cell);
        }
        r.finish()?;

        let tree = QuadTree { bbox, cells };
        tree.validate(graph.edge_count())
            .map_err(|detail| RouteError::storage(path, detail))?;
        Ok(Some(LocationIndex {
            resolution_m,
            max_region_search: config.max_region_search,
            tree,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LocationIndexBuilder;
    use crate::testing::random_grid;
    use ridgeline_common::ConfigError;
    use std::fs;
    use tempfile::TempDir;

    fn stamp(graph: &RoutingGraph, config: &IndexConfig) -> Stamp {
        Stamp {
            profile_version: LocationIndex::config_version(config),
            graph: graph.signature(),
        }
    }

    #[test]
    fn test_roundtrip_answers_the_same() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("location_index");
        let g = random_grid(5, 5, 2);
        let config = IndexConfig {
            resolution_m: 50.0,
            max_entries_per_cell: 3,
            max_region_search: 4,
        };
        let index = LocationIndexBuilder::new(&config).build(&g);
        IndexFile::write(&path, &index, &stamp(&g, &config)).unwrap();
        let loaded = IndexFile::read(&path, &g, &config, &stamp(&g, &config)).unwrap().unwrap();
        assert_eq!(loaded, index);
        assert_eq!(
            loaded.nearest(&g, 50.003, 4.005, &|_| true),
            index.nearest(&g, 50.003, 4.005, &|_| true)
        );
    }

    #[test]
    fn test_changed_parameters_are_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("location_index");
        let g = random_grid(3, 3, 2);
        let config = IndexConfig::default();
        let index = LocationIndexBuilder::new(&config).build(&g);
        IndexFile::write(&path, &index, &stamp(&g, &config)).unwrap();

        let other = IndexConfig {
            resolution_m: 10.0,
            ..config.clone()
        };
        let err = IndexFile::read(&path, &g, &other, &stamp(&g, &other)).unwrap_err();
        assert!(matches!(
            err,
            RouteError::Configuration(ConfigError::StalePreparation { .. })
        ));
    }

    #[test]
    fn test_bit_flip_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("location_index");
        let g = random_grid(4, 4, 2);
        let config = IndexConfig::default();
        IndexFile::write(&path, &LocationIndexBuilder::new(&config).build(&g), &stamp(&g, &config)).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 9;
        bytes[last] ^= 1;
        fs::write(&path, bytes).unwrap();
        let err = IndexFile::read(&path, &g, &config, &stamp(&g, &config)).unwrap_err();
        assert!(matches!(err, RouteError::Storage { .. }), "{err}");
    }
}
