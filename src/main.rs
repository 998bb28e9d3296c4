mod admin;
mod clock;
mod config;
mod error;
mod messages;
mod orchestrator;
mod participant;
mod room;
mod round;
mod scoring;
mod server;
mod sweep;
mod validation;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use env_logger::Env;
use log::{info, warn};
use warp::Filter;

use admin::AdminCredentials;
use clock::SystemClock;
use config::ServerConfig;
use error::TlsError;
use orchestrator::SessionOrchestrator;
use server::Server;

/// Makes sure the PEM files are usable before handing their paths to warp.
fn check_tls(cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
    let open = |path: &Path| {
        File::open(path).map(BufReader::new).map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })
    };

    let mut cert_reader = open(cert_path)?;
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: cert_path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.display().to_string()));
    }

    let mut key_reader = open(key_path)?;
    match rustls_pemfile::private_key(&mut key_reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(TlsError::NoPrivateKey(key_path.display().to_string())),
        Err(source) => Err(TlsError::Io {
            path: key_path.display().to_string(),
            source,
        }),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env();
    let orchestrator = SessionOrchestrator::with_entropy(config.game.clone(), Arc::new(SystemClock));
    let admin = Arc::new(AdminCredentials::new(&config.admin_user, &config.admin_passphrase));
    let server = Server::new(orchestrator, admin);

    sweep::spawn_sweeper(server.clone(), config.game.sweep_interval);

    let ws_server = server.clone();
    let ws_route = warp::path("ws")
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let server = ws_server.clone();
            ws.on_upgrade(move |socket| async move {
                server.handle_connection(socket).await;
            })
        });

    let static_files = warp::fs::dir(config.static_dir.clone());

    let routes = ws_route
        .or(static_files)
        .with(warp::cors().allow_any_origin());

    let tls = match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => match check_tls(cert, key) {
            Ok(()) => Some((cert.clone(), key.clone())),
            Err(e) => {
                warn!("{}, falling back to HTTP/WS", e);
                None
            }
        },
        _ => None,
    };

    match tls {
        Some((cert, key)) => {
            info!("Starting secure server (HTTPS/WSS) on {}", config.addr);
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(config.addr)
                .await;
        }
        None => {
            info!("Starting server (HTTP/WS) on {}", config.addr);
            warp::serve(routes).run(config.addr).await;
        }
    }
}
