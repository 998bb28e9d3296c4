use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

/// Timing and capacity knobs for the game itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub writing_time: Duration,
    pub guessing_time: Duration,
    pub results_delay: Duration,
    pub max_players: usize,
    pub min_players: usize,
    pub max_rooms: usize,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            writing_time: Duration::from_secs(60),
            guessing_time: Duration::from_secs(45),
            results_delay: Duration::from_secs(8),
            max_players: 20,
            min_players: 2,
            max_rooms: 10,
            idle_timeout: Duration::from_secs(3 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub admin_user: String,
    pub admin_passphrase: String,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 2052),
            static_dir: PathBuf::from("public"),
            tls_cert: None,
            tls_key: None,
            admin_user: "superadmin".to_string(),
            admin_passphrase: "admin123".to_string(),
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `TT_*` variables, after loading `.env` if one exists.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ServerConfig::default();
        let game = &defaults.game;

        let bind = parse_or(&lookup, "TT_BIND", defaults.addr.ip());
        let port = parse_or(&lookup, "TT_PORT", defaults.addr.port());

        ServerConfig {
            addr: SocketAddr::new(bind, port),
            static_dir: lookup("TT_STATIC_DIR").map_or(defaults.static_dir.clone(), PathBuf::from),
            tls_cert: lookup("TT_TLS_CERT").map(PathBuf::from),
            tls_key: lookup("TT_TLS_KEY").map(PathBuf::from),
            admin_user: lookup("TT_ADMIN_USER").unwrap_or(defaults.admin_user.clone()),
            admin_passphrase: lookup("TT_ADMIN_PASSPHRASE")
                .unwrap_or(defaults.admin_passphrase.clone()),
            game: GameConfig {
                writing_time: secs_or(&lookup, "TT_WRITING_SECS", game.writing_time),
                guessing_time: secs_or(&lookup, "TT_GUESSING_SECS", game.guessing_time),
                results_delay: secs_or(&lookup, "TT_RESULTS_SECS", game.results_delay),
                max_players: parse_or(&lookup, "TT_MAX_PLAYERS", game.max_players),
                min_players: parse_or(&lookup, "TT_MIN_PLAYERS", game.min_players),
                max_rooms: parse_or(&lookup, "TT_MAX_ROOMS", game.max_rooms),
                idle_timeout: secs_or(&lookup, "TT_IDLE_SECS", game.idle_timeout),
                sweep_interval: secs_or(&lookup, "TT_SWEEP_SECS", game.sweep_interval),
            },
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

fn secs_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or(lookup, key, default.as_secs()))
}
