use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::server::Server;

/// Periodically removes rooms that have gone quiet.
pub fn spawn_sweeper(server: Server, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("Sweeping idle rooms");
            server.sweep_idle().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};

    use crate::admin::AdminCredentials;
    use crate::clock::SystemClock;
    use crate::config::GameConfig;
    use crate::orchestrator::SessionOrchestrator;

    #[tokio::test(start_paused = true)]
    async fn quiet_rooms_are_closed() {
        let config = GameConfig {
            idle_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
            ..GameConfig::default()
        };
        let orchestrator = SessionOrchestrator::new(config, Arc::new(SystemClock), StdRng::seed_from_u64(7));
        let server = Server::new(orchestrator, Arc::new(AdminCredentials::new("root", "pw")));
        let mut rx = server.register("a").await;

        let create = json!({"type": "create-room", "room_name": "Den", "name": "Ana"});
        server.handle_text("a", &create.to_string()).await;
        let sweeper = spawn_sweeper(server.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(25)).await;
        let mut seen = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            seen.push(serde_json::from_str::<Value>(msg.to_str().unwrap()).unwrap());
        }
        assert!(seen.iter().all(|e| e["type"] != "room-closed"));

        tokio::time::sleep(Duration::from_secs(20)).await;
        let mut closed = 0;
        while let Ok(msg) = rx.try_recv() {
            let event: Value = serde_json::from_str(msg.to_str().unwrap()).unwrap();
            if event["type"] == "room-closed" {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
        sweeper.abort();
    }
}
