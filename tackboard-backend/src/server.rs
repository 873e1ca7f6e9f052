use crate::api::api_router;
use crate::relay::EventRelay;
use crate::state::AppState;
/// HTTP server: spawns axum and the connection reaper on background tokio tasks.
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

pub fn relay_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_router().layer(cors).with_state(state)
}

/// Bind and serve until `shutdown` turns true. Open subscribe streams are
/// closed on shutdown so the graceful drain can finish.
pub async fn spawn_server(
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let bind_addr = format!("{}:{}", state.config.bind_address, state.config.port);
    let relay = state.relay.clone();
    let reap_interval = Duration::from_secs(state.config.reap_interval_secs.max(1));
    let app = relay_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let local_addr = listener.local_addr()?;

    log::info!(target: "tackboard.relay", "Relay listening on http://{}", local_addr);

    spawn_reaper(relay.clone(), reap_interval, shutdown.clone());

    let handle = tokio::spawn(async move {
        let signal = async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            relay.close_all();
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
        {
            log::error!(target: "tackboard.relay", "HTTP server exited with error: {}", e);
        }
    });

    Ok((local_addr, handle))
}

fn spawn_reaper(relay: Arc<EventRelay>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = relay.reap_closed();
                    if removed > 0 {
                        log::info!(target: "tackboard.relay", "Reaped {} closed connections", removed);
                    }
                }
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
    });
}
