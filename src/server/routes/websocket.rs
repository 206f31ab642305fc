//! `/ws/events`: every engine event as a JSON text frame

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use warp::Filter;

use super::with_engine;
use crate::engine::Engine;

pub fn create_websocket_routes(
    engine: Engine,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("ws" / "events")
        .and(warp::ws())
        .and(with_engine(engine))
        .map(|ws: warp::ws::Ws, engine: Engine| {
            ws.on_upgrade(move |socket| events_handler(socket, engine))
        })
}

async fn events_handler(ws: warp::ws::WebSocket, engine: Engine) {
    let mut receiver = engine.publisher().subscribe();
    info!(
        "🔌 Event subscriber connected ({} total)",
        engine.publisher().subscriber_count()
    );

    let (mut ws_sender, mut ws_receiver) = ws.split();

    // Drain client frames so close requests are noticed
    let reader = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) if msg.is_close() => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket read error: {}", e);
                    break;
                }
            }
        }
    });

    loop {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event subscriber lagged, skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize event: {}", e);
                continue;
            }
        };
        if reader.is_finished() {
            break;
        }
        if let Err(e) = ws_sender.send(warp::ws::Message::text(text)).await {
            debug!("Failed to send WebSocket message: {}", e);
            break;
        }
    }

    reader.abort();
    info!("🔌 Event subscriber disconnected");
}
