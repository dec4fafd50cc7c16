//! Map resource loading with a version-stamped on-disk cache.
//!
//! Source data lives in the maps directory as newline-delimited JSON, one
//! record per map feature:
//!
//! ```text
//! {"m": 1, "x": 10, "y": 12, "t": "b"}
//! {"m": 1, "x": 40, "y": 7, "t": "s", "g": 1532}
//! ```
//!
//! Files are named `blocked_<range>.ndjson` or `objects_<range>.ndjson`.
//! Scanning every file is the dominant start-up cost, so the consolidated
//! result is written to a single JSON cache together with the modification
//! time of every source file. The cache is only trusted when its version
//! matches [`MAP_CACHE_VERSION`] and the recorded source files and times
//! match the directory exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use realm_core::constants::{MAX_MAP_DIMENSION, MIN_TILE};
use serde::{Deserialize, Serialize};

use crate::spatial::Coord;

/// Bump whenever the cache layout or the meaning of a tag changes.
pub const MAP_CACHE_VERSION: u32 = 2;

const BLOCKED_PREFIX: &str = "blocked_";
const OBJECTS_PREFIX: &str = "objects_";
const SOURCE_EXTENSION: &str = "ndjson";

/// Static features of one map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapResourceSet {
    pub blocked: BTreeSet<Coord>,
    pub water: BTreeSet<Coord>,
    pub trees: BTreeSet<Coord>,
    pub mines: BTreeSet<Coord>,
    pub anvils: BTreeSet<Coord>,
    pub forges: BTreeSet<Coord>,
    /// Sign position → graphic index.
    pub signs: BTreeMap<Coord, u32>,
    /// Door position → graphic index.
    pub doors: BTreeMap<Coord, u32>,
}

impl MapResourceSet {
    /// Largest `x` and `y` referenced by any category.
    pub fn extent(&self) -> (u16, u16) {
        let sets = [
            &self.blocked,
            &self.water,
            &self.trees,
            &self.mines,
            &self.anvils,
            &self.forges,
        ];
        let coords = sets
            .into_iter()
            .flat_map(|s| s.iter())
            .chain(self.signs.keys())
            .chain(self.doors.keys());
        coords.fold((0, 0), |(mx, my), &(x, y)| (mx.max(x), my.max(y)))
    }

    /// Number of coordinate entries across the terrain categories.
    pub fn tile_count(&self) -> usize {
        self.blocked.len()
            + self.water.len()
            + self.trees.len()
            + self.mines.len()
            + self.anvils.len()
            + self.forges.len()
    }

    fn apply(&mut self, tag: &str, coord: Coord, graphic: Option<u32>) -> bool {
        match tag {
            "b" => {
                self.blocked.insert(coord);
            }
            "w" => {
                self.water.insert(coord);
            }
            "t" => {
                self.trees.insert(coord);
                self.blocked.insert(coord);
            }
            "m" => {
                self.mines.insert(coord);
                self.blocked.insert(coord);
            }
            "a" => {
                self.anvils.insert(coord);
                self.blocked.insert(coord);
            }
            "f" => {
                self.forges.insert(coord);
                self.blocked.insert(coord);
            }
            "s" => {
                self.signs.insert(coord, graphic.unwrap_or(0));
            }
            "d" => {
                self.doors.insert(coord, graphic.unwrap_or(0));
            }
            _ => return false,
        }
        true
    }
}

/// Resource sets for every map, keyed by map id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapResources {
    pub maps: BTreeMap<u16, MapResourceSet>,
}

impl MapResources {
    pub fn map(&self, map_id: u16) -> Option<&MapResourceSet> {
        self.maps.get(&map_id)
    }

    pub fn sign_at(&self, map_id: u16, x: u16, y: u16) -> Option<u32> {
        self.maps.get(&map_id)?.signs.get(&(x, y)).copied()
    }

    pub fn door_at(&self, map_id: u16, x: u16, y: u16) -> Option<u32> {
        self.maps.get(&map_id)?.doors.get(&(x, y)).copied()
    }
}

#[derive(Debug, Deserialize)]
struct SourceRecord {
    m: u16,
    x: u16,
    y: u16,
    t: String,
    #[serde(default)]
    g: Option<u32>,
}

/// Source file name → modification time (nanoseconds since the epoch),
/// grouped by file family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamps {
    #[serde(default)]
    pub blocked: BTreeMap<String, u64>,
    #[serde(default)]
    pub objects: BTreeMap<String, u64>,
}

impl SourceStamps {
    fn paths<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = PathBuf> + 'a {
        self.blocked
            .keys()
            .chain(self.objects.keys())
            .map(move |name| dir.join(name))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    source: SourceStamps,
    maps: BTreeMap<String, CachedMap>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CachedMap {
    #[serde(default)]
    blocked: Vec<[u16; 2]>,
    #[serde(default)]
    water: Vec<[u16; 2]>,
    #[serde(default)]
    trees: Vec<[u16; 2]>,
    #[serde(default)]
    mines: Vec<[u16; 2]>,
    #[serde(default)]
    anvils: Vec<[u16; 2]>,
    #[serde(default)]
    forges: Vec<[u16; 2]>,
    #[serde(default)]
    signs: Vec<[u32; 3]>,
    #[serde(default)]
    doors: Vec<[u32; 3]>,
}

fn to_pairs(set: &BTreeSet<Coord>) -> Vec<[u16; 2]> {
    set.iter().map(|&(x, y)| [x, y]).collect()
}

fn to_triples(map: &BTreeMap<Coord, u32>) -> Vec<[u32; 3]> {
    map.iter()
        .map(|(&(x, y), &g)| [x as u32, y as u32, g])
        .collect()
}

/// Whether `(x, y)` lies inside the largest map the loader accepts.
pub fn in_map_bounds(x: u16, y: u16) -> bool {
    (MIN_TILE..=MAX_MAP_DIMENSION).contains(&x) && (MIN_TILE..=MAX_MAP_DIMENSION).contains(&y)
}

fn checked_coord(x: u32, y: u32) -> Result<Coord, String> {
    match (u16::try_from(x), u16::try_from(y)) {
        (Ok(cx), Ok(cy)) if in_map_bounds(cx, cy) => Ok((cx, cy)),
        _ => Err(format!("coordinate ({x}, {y}) out of range")),
    }
}

fn from_pairs(pairs: &[[u16; 2]]) -> Result<BTreeSet<Coord>, String> {
    pairs
        .iter()
        .map(|&[x, y]| checked_coord(x as u32, y as u32))
        .collect()
}

fn from_triples(triples: &[[u32; 3]]) -> Result<BTreeMap<Coord, u32>, String> {
    triples
        .iter()
        .map(|&[x, y, g]| Ok((checked_coord(x, y)?, g)))
        .collect()
}

impl CachedMap {
    fn from_set(set: &MapResourceSet) -> Self {
        Self {
            blocked: to_pairs(&set.blocked),
            water: to_pairs(&set.water),
            trees: to_pairs(&set.trees),
            mines: to_pairs(&set.mines),
            anvils: to_pairs(&set.anvils),
            forges: to_pairs(&set.forges),
            signs: to_triples(&set.signs),
            doors: to_triples(&set.doors),
        }
    }

    fn into_set(self) -> Result<MapResourceSet, String> {
        Ok(MapResourceSet {
            blocked: from_pairs(&self.blocked)?,
            water: from_pairs(&self.water)?,
            trees: from_pairs(&self.trees)?,
            mines: from_pairs(&self.mines)?,
            anvils: from_pairs(&self.anvils)?,
            forges: from_pairs(&self.forges)?,
            signs: from_triples(&self.signs)?,
            doors: from_triples(&self.doors)?,
        })
    }
}

/// Builds [`MapResources`] from the maps directory and keeps the cache
/// artifact in sync with it.
#[derive(Debug, Clone)]
pub struct MapCacheLoader {
    maps_dir: PathBuf,
    cache_path: PathBuf,
}

impl MapCacheLoader {
    pub fn new(maps_dir: impl Into<PathBuf>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            maps_dir: maps_dir.into(),
            cache_path: cache_path.into(),
        }
    }

    pub fn maps_dir(&self) -> &Path {
        &self.maps_dir
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Current source files and their modification times.
    pub fn source_stamps(&self) -> Result<SourceStamps, String> {
        let entries = fs::read_dir(&self.maps_dir)
            .map_err(|e| format!("Failed to read maps dir {}: {e}", self.maps_dir.display()))?;

        let mut stamps = SourceStamps::default();
        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read maps dir entry: {e}"))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let family = if name.starts_with(BLOCKED_PREFIX) {
                &mut stamps.blocked
            } else if name.starts_with(OBJECTS_PREFIX) {
                &mut stamps.objects
            } else {
                continue;
            };
            family.insert(name.to_string(), modified_nanos(&path)?);
        }
        Ok(stamps)
    }

    /// Scan every source file and consolidate the features per map.
    pub fn build_from_source(&self) -> Result<MapResources, String> {
        let stamps = self.source_stamps()?;
        let mut resources = MapResources::default();
        let mut records = 0usize;
        let mut skipped = 0usize;

        for path in stamps.paths(&self.maps_dir) {
            let file = fs::File::open(&path)
                .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let record: SourceRecord = match serde_json::from_str(trimmed) {
                    Ok(record) => record,
                    Err(e) => {
                        log::debug!("{}:{}: skipping malformed record: {e}", path.display(), line_no + 1);
                        skipped += 1;
                        continue;
                    }
                };
                if !in_map_bounds(record.x, record.y) {
                    log::warn!(
                        "{}:{}: skipping record at ({}, {}) outside 1..={MAX_MAP_DIMENSION}",
                        path.display(),
                        line_no + 1,
                        record.x,
                        record.y
                    );
                    skipped += 1;
                    continue;
                }
                let set = resources.maps.entry(record.m).or_default();
                if set.apply(&record.t, (record.x, record.y), record.g) {
                    records += 1;
                } else {
                    log::debug!(
                        "{}:{}: skipping unknown tag {:?}",
                        path.display(),
                        line_no + 1,
                        record.t
                    );
                    skipped += 1;
                }
            }
        }

        log::info!(
            "Built map resources from source: {} maps, {} records, {} skipped",
            resources.maps.len(),
            records,
            skipped
        );
        Ok(resources)
    }

    /// Fill `resources` from the cache if it is present and still valid.
    ///
    /// On any mismatch or parse failure `resources` is left untouched and
    /// `false` is returned.
    pub fn try_load_from_cache(&self, resources: &mut MapResources) -> bool {
        match self.read_valid_cache() {
            Ok(Some(loaded)) => {
                *resources = loaded;
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::info!("Map cache rejected: {e}");
                false
            }
        }
    }

    fn read_valid_cache(&self) -> Result<Option<MapResources>, String> {
        if !self.cache_path.exists() {
            log::info!("No map cache at {}", self.cache_path.display());
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.cache_path)
            .map_err(|e| format!("failed to read {}: {e}", self.cache_path.display()))?;
        let document: CacheDocument =
            serde_json::from_str(&raw).map_err(|e| format!("failed to parse cache: {e}"))?;

        if document.version != MAP_CACHE_VERSION {
            log::info!(
                "Map cache version {} does not match {MAP_CACHE_VERSION}",
                document.version
            );
            return Ok(None);
        }

        let current = self.source_stamps()?;
        if current != document.source {
            log::info!("Map sources changed since the cache was written");
            return Ok(None);
        }

        let mut loaded = MapResources::default();
        for (key, cached) in document.maps {
            let map_id: u16 = key
                .parse()
                .map_err(|_| format!("invalid map key {key:?}"))?;
            loaded.maps.insert(map_id, cached.into_set()?);
        }
        Ok(Some(loaded))
    }

    /// Write `resources` and the current source stamps to the cache file,
    /// replacing any previous cache. Failures are logged and reported as
    /// `false`.
    pub fn save_cache(&self, resources: &MapResources) -> bool {
        match self.write_cache(resources) {
            Ok(()) => {
                log::info!("Map cache written to {}", self.cache_path.display());
                true
            }
            Err(e) => {
                log::error!("Failed to write map cache: {e}");
                false
            }
        }
    }

    fn write_cache(&self, resources: &MapResources) -> Result<(), String> {
        let document = CacheDocument {
            version: MAP_CACHE_VERSION,
            source: self.source_stamps()?,
            maps: resources
                .maps
                .iter()
                .map(|(id, set)| (id.to_string(), CachedMap::from_set(set)))
                .collect(),
        };
        let json = serde_json::to_string(&document).map_err(|e| format!("encode: {e}"))?;

        if let Some(parent) = self.cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("create {}: {e}", parent.display()))?;
            }
        }
        let tmp = self.cache_path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| format!("write {}: {e}", tmp.display()))?;
        fs::rename(&tmp, &self.cache_path)
            .map_err(|e| format!("rename to {}: {e}", self.cache_path.display()))
    }

    /// Cache hit, or a full source scan followed by a cache rewrite.
    pub fn load_or_build(&self) -> Result<MapResources, String> {
        let mut resources = MapResources::default();
        if self.try_load_from_cache(&mut resources) {
            log::info!("Loaded {} maps from cache", resources.maps.len());
            return Ok(resources);
        }
        let resources = self.build_from_source()?;
        self.save_cache(&resources);
        Ok(resources)
    }
}

fn modified_nanos(path: &Path) -> Result<u64, String> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| format!("Failed to stat {}: {e}", path.display()))?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(since_epoch.as_nanos() as u64)
}
