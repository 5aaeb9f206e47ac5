//! Load-or-prepare orchestration
//!
//! Startup checks the configuration against the graph, then loads every
//! prepared structure from disk or prepares and publishes it. The storage
//! lock is only taken once something has to be written. A stored preparation
//! that does not match the current configuration or graph stops startup; it
//! is never silently rebuilt.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ridgeline_common::Result;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::formats::storage::{self, Stamp, StorageLock};
use crate::formats::{ChFile, IndexFile, LmFile};
use crate::graph::RoutingGraph;
use crate::index::{LocationIndex, LocationIndexBuilder};
use crate::lm::LandmarkStorage;
use crate::router::{Preparations, Router};
use crate::weighting::{WeightingFactory, WeightingHints};

const INDEX_FILE: &str = "location_index";

fn ch_path(dir: &Path, profile: &str) -> PathBuf {
    dir.join(format!("ch.{profile}"))
}

fn lm_path(dir: &Path, profile: &str) -> PathBuf {
    dir.join(format!("lm.{profile}"))
}

fn is_prepared_file(name: &str) -> bool {
    name == INDEX_FILE || name.starts_with("ch.") || name.starts_with("lm.")
}

/// Header of one prepared file as shown by `info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedFile {
    pub name: String,
    pub magic: String,
    pub version: u16,
    pub profile_version: String,
    pub graph: String,
    pub bytes: u64,
}

pub struct Engine {
    dir: PathBuf,
    router: Router,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl Engine {
    /// Load or prepare the index and every CH and LM profile of `config`
    pub fn load_or_prepare(graph: Arc<RoutingGraph>, config: EngineConfig, dir: &Path) -> Result<Self> {
        let start = Instant::now();
        config.check_profiles_consistency(graph.encoding())?;
        fs::create_dir_all(dir)?;
        let mut lock = None;

        let index = load_or_build_index(&graph, &config, dir, &mut lock)?;
        let factory = WeightingFactory::new(graph.clone());
        let mut preparations = Preparations::default();

        for ch in &config.ch.profiles {
            let profile = config.profile(&ch.profile)?;
            let weighting = factory.create(profile, &WeightingHints::default())?;
            let stamp = Stamp {
                profile_version: profile.version()?,
                graph: graph.signature(),
            };
            let path = ch_path(dir, &profile.name);
            let prepared = load_or_build(
                dir,
                &mut lock,
                &path,
                || ChFile::read(&path, &profile.name, &stamp),
                || {
                    let ch = crate::ch::prepare(&profile.name, &graph, weighting.as_ref(), &config.ch.params)?;
                    ChFile::write(&path, &ch, &stamp)?;
                    Ok(ch)
                },
            )?;
            preparations.ch.insert(profile.name.clone(), Arc::new(prepared));
        }

        let mut prepared_lm: FxHashMap<String, Arc<LandmarkStorage>> = FxHashMap::default();
        for lm in config.lm.profiles.iter().filter(|p| p.preparation_profile.is_none()) {
            let profile = config.profile(&lm.profile)?;
            let weighting = factory.create_for_landmarks(profile)?;
            let stamp = Stamp {
                profile_version: config.lm_version(lm)?,
                graph: graph.signature(),
            };
            let path = lm_path(dir, &profile.name);
            let storage = load_or_build(
                dir,
                &mut lock,
                &path,
                || LmFile::read(&path, &profile.name, weighting.name(), &stamp),
                || {
                    let storage = crate::lm::prepare(
                        &profile.name,
                        &graph,
                        weighting.as_ref(),
                        &config.lm,
                        lm.maximum_weight,
                    )?;
                    LmFile::write(&path, &storage, &stamp)?;
                    Ok(storage)
                },
            )?;
            prepared_lm.insert(profile.name.clone(), Arc::new(storage));
        }
        for lm in &config.lm.profiles {
            let source = lm.preparation_profile.as_deref().unwrap_or(&lm.profile);
            if let Some(storage) = prepared_lm.get(source) {
                preparations.lm.insert(lm.profile.clone(), storage.clone());
            }
        }

        drop(lock);
        info!(
            ch = preparations.ch.len(),
            lm = preparations.lm.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "engine ready"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            router: Router::new(graph, config, preparations, index),
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove every prepared file from `dir`; the graph file is kept
    pub fn clean(dir: &Path) -> Result<usize> {
        let _lock = StorageLock::acquire(dir)?;
        let mut removed = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_prepared_file(&name) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        info!(dir = %dir.display(), removed, "prepared files removed");
        Ok(removed)
    }

    /// Headers and stamps of the prepared files in `dir`, sorted by name
    pub fn info(dir: &Path) -> Result<Vec<PreparedFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_prepared_file(&name) {
                continue;
            }
            let Some((header, stamp)) = storage::read_preamble(&entry.path())? else {
                warn!(file = %name, "vanished while listing");
                continue;
            };
            files.push(PreparedFile {
                magic: String::from_utf8_lossy(&header.magic.to_be_bytes()).into_owned(),
                version: header.version,
                profile_version: format!("{:016x}", stamp.profile_version),
                graph: stamp.graph.hex(),
                bytes: entry.metadata()?.len(),
                name,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

/// Read `path`, or take the storage lock and build it. The file is read
/// again under the lock since another process may have published it in
/// between.
fn load_or_build<T>(
    dir: &Path,
    lock: &mut Option<StorageLock>,
    path: &Path,
    read: impl Fn() -> Result<Option<T>>,
    build: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if lock.is_none() {
        if let Some(loaded) = read()? {
            info!(path = %path.display(), "loaded");
            return Ok(loaded);
        }
        *lock = Some(StorageLock::acquire(dir)?);
    }
    match read()? {
        Some(loaded) => {
            info!(path = %path.display(), "loaded");
            Ok(loaded)
        }
        None => build(),
    }
}

fn load_or_build_index(
    graph: &RoutingGraph,
    config: &EngineConfig,
    dir: &Path,
    lock: &mut Option<StorageLock>,
) -> Result<LocationIndex> {
    let path = dir.join(INDEX_FILE);
    let stamp = Stamp {
        profile_version: LocationIndex::config_version(&config.index),
        graph: graph.signature(),
    };
    load_or_build(
        dir,
        lock,
        &path,
        || IndexFile::read(&path, graph, &config.index, &stamp),
        || {
            let index = LocationIndexBuilder::new(&config.index).build(graph);
            IndexFile::write(&path, &index, &stamp)?;
            Ok(index)
        },
    )
}
