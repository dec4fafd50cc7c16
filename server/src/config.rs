//! Server settings from `REALM_*` environment variables.
//!
//! An optional `.env` file is loaded first. Unset variables take their
//! default; unparsable ones take the default and are reported through
//! [`ServerConfig::warnings`], since the logger is configured from the
//! result and is not running yet.

use std::cell::RefCell;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use realm_core::constants::{MAX_ITEMS_PER_TILE, OUTBOUND_QUEUE_LEN, TICK_MS};
use realm_core::types::TileKey;

use crate::game_loop::OverrunPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub maps_dir: PathBuf,
    pub cache_path: PathBuf,
    pub npc_spawns: PathBuf,
    pub items: PathBuf,
    pub tick_period: Duration,
    pub overrun_policy: OverrunPolicy,
    pub max_items_per_tile: usize,
    /// `None` runs with in-memory persistence only.
    pub keydb_url: Option<String>,
    pub save_queue: usize,
    pub collaborator_timeout: Duration,
    pub start: TileKey,
    pub outbound_queue: usize,
    pub log_level: LevelFilter,
    pub log_file: Option<String>,
    /// Rejected values, for logging once the logger is up.
    pub warnings: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 7666,
            maps_dir: PathBuf::from("data/maps"),
            cache_path: PathBuf::from("data/map_cache.json"),
            npc_spawns: PathBuf::from("data/npc_spawns.json"),
            items: PathBuf::from("data/items.json"),
            tick_period: Duration::from_millis(TICK_MS),
            overrun_policy: OverrunPolicy::Skip,
            max_items_per_tile: MAX_ITEMS_PER_TILE,
            keydb_url: Some("redis://127.0.0.1:5556/".to_string()),
            save_queue: 256,
            collaborator_timeout: Duration::from_millis(2000),
            start: TileKey::new(1, 50, 50),
            outbound_queue: OUTBOUND_QUEUE_LEN,
            log_level: LevelFilter::Info,
            log_file: Some("server.log".to_string()),
            warnings: Vec::new(),
        }
    }
}

fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match value.to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// `None` for unset, empty or `none`.
fn optional(value: Option<String>) -> Option<Option<String>> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        Some(None)
    } else {
        Some(Some(trimmed.to_string()))
    }
}

struct Resolver<F> {
    lookup: F,
    warnings: RefCell<Vec<String>>,
}

impl<F: Fn(&str) -> Option<String>> Resolver<F> {
    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.with(key, default, |v| v.parse().ok())
    }

    fn with<T>(&self, key: &str, default: T, parse: impl FnOnce(&str) -> Option<T>) -> T {
        let Some(raw) = (self.lookup)(key) else {
            return default;
        };
        match parse(raw.trim()) {
            Some(value) => value,
            None => {
                self.warnings
                    .borrow_mut()
                    .push(format!("Ignoring invalid {key}={raw:?}; using the default"));
                default
            }
        }
    }

    fn string(&self, key: &str, default: String) -> String {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }
}

impl ServerConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let r = Resolver {
            lookup,
            warnings: RefCell::new(Vec::new()),
        };

        let start_map = r.parsed("REALM_START_MAP", defaults.start.map);
        let start_x = r.parsed("REALM_START_X", defaults.start.x);
        let start_y = r.parsed("REALM_START_Y", defaults.start.y);

        let mut config = Self {
            bind_addr: r.string("REALM_BIND_ADDR", defaults.bind_addr),
            port: r.parsed("REALM_PORT", defaults.port),
            maps_dir: PathBuf::from(r.string(
                "REALM_MAPS_DIR",
                defaults.maps_dir.to_string_lossy().into_owned(),
            )),
            cache_path: PathBuf::from(r.string(
                "REALM_CACHE_PATH",
                defaults.cache_path.to_string_lossy().into_owned(),
            )),
            npc_spawns: PathBuf::from(r.string(
                "REALM_NPC_SPAWNS",
                defaults.npc_spawns.to_string_lossy().into_owned(),
            )),
            items: PathBuf::from(r.string(
                "REALM_ITEMS",
                defaults.items.to_string_lossy().into_owned(),
            )),
            tick_period: r.with("REALM_TICK_MS", defaults.tick_period, |v| {
                v.parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
            }),
            overrun_policy: r.with(
                "REALM_OVERRUN_POLICY",
                defaults.overrun_policy,
                OverrunPolicy::parse,
            ),
            max_items_per_tile: r.with("REALM_MAX_ITEMS_PER_TILE", defaults.max_items_per_tile, |v| {
                v.parse().ok().filter(|n| *n > 0)
            }),
            keydb_url: optional((r.lookup)("REALM_KEYDB_URL")).unwrap_or(defaults.keydb_url),
            save_queue: r.with("REALM_SAVE_QUEUE", defaults.save_queue, |v| {
                v.parse().ok().filter(|n| *n > 0)
            }),
            collaborator_timeout: r.with(
                "REALM_COLLABORATOR_TIMEOUT_MS",
                defaults.collaborator_timeout,
                |v| {
                    v.parse::<u64>()
                        .ok()
                        .filter(|ms| *ms > 0)
                        .map(Duration::from_millis)
                },
            ),
            start: TileKey::new(start_map, start_x, start_y),
            outbound_queue: r.with("REALM_OUTBOUND_QUEUE", defaults.outbound_queue, |v| {
                v.parse().ok().filter(|n| *n > 0)
            }),
            log_level: r.with("REALM_LOG_LEVEL", defaults.log_level, parse_log_level),
            log_file: optional((r.lookup)("REALM_LOG_FILE")).unwrap_or(defaults.log_file),
            warnings: Vec::new(),
        };
        config.warnings = r.warnings.into_inner();
        config
    }

    /// Emit the warnings collected while reading the settings.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            log::warn!("{warning}");
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), ServerConfig::default());
    }

    #[test]
    fn values_are_read() {
        let cfg = config(&[
            ("REALM_PORT", "9000"),
            ("REALM_TICK_MS", "100"),
            ("REALM_OVERRUN_POLICY", "queue"),
            ("REALM_START_X", "12"),
            ("REALM_LOG_LEVEL", "debug"),
        ]);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.tick_period, Duration::from_millis(100));
        assert_eq!(cfg.overrun_policy, OverrunPolicy::Queue);
        assert_eq!(cfg.start, TileKey::new(1, 12, 50));
        assert_eq!(cfg.log_level, LevelFilter::Debug);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:9000");
    }

    /// Bad values fall back instead of failing start-up.
    #[test]
    fn invalid_values_use_defaults() {
        let cfg = config(&[
            ("REALM_PORT", "ninety"),
            ("REALM_TICK_MS", "0"),
            ("REALM_OVERRUN_POLICY", "sometimes"),
            ("REALM_MAX_ITEMS_PER_TILE", "-3"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(cfg.port, defaults.port);
        assert_eq!(cfg.tick_period, defaults.tick_period);
        assert_eq!(cfg.overrun_policy, OverrunPolicy::Skip);
        assert_eq!(cfg.max_items_per_tile, defaults.max_items_per_tile);
    }

    /// Rejected values are kept for logging after the logger starts.
    #[test]
    fn invalid_values_are_collected_as_warnings() {
        let cfg = config(&[
            ("REALM_PORT", "ninety"),
            ("REALM_LOG_LEVEL", "loud"),
            ("REALM_TICK_MS", "50"),
        ]);
        assert_eq!(cfg.warnings.len(), 2);
        assert!(cfg.warnings[0].contains("REALM_PORT=\"ninety\""));
        assert!(cfg.warnings[1].contains("REALM_LOG_LEVEL=\"loud\""));
        assert_eq!(cfg.log_level, LevelFilter::Info);
        assert!(config(&[("REALM_PORT", "9000")]).warnings.is_empty());
    }

    #[test]
    fn none_disables_keydb_and_log_file() {
        let cfg = config(&[("REALM_KEYDB_URL", "none"), ("REALM_LOG_FILE", "")]);
        assert_eq!(cfg.keydb_url, None);
        assert_eq!(cfg.log_file, None);
    }
}
