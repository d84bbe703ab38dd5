//! Subscription gateway sessions
//!
//! One WebSocket session per (client, symbol). On connect the session
//! registers with the bus *before* fetching its snapshot, so nothing
//! published during snapshot construction is lost; the feed filter then
//! guarantees no gaps and no duplicates at the session boundary.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use market_stream::session::{self, ClientMessage, ErrorKind, ServerMessage, SessionError};
use market_stream::SessionFeed;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use types::ids::Symbol;

const REQUEST_DEPTH_DEFAULT: usize = 10;
const TRADE_LIMIT_DEFAULT: usize = 50;

pub async fn orderbook_stream(
    ws: WebSocketUpgrade,
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let symbol = if state.core.has_symbol(&symbol) {
        Symbol::try_new(symbol.as_str())
            .ok_or_else(|| AppError::BadRequest(format!("malformed symbol: {symbol}")))?
    } else {
        return Err(AppError::NotFound(format!("unknown symbol: {symbol}")));
    };

    Ok(ws.on_upgrade(move |socket| handle_session(socket, symbol, state)))
}

async fn handle_session(socket: WebSocket, symbol: Symbol, state: AppState) {
    info!(symbol = %symbol, "session connected");
    let (mut sink, mut stream) = socket.split();

    // Register with the bus first; the channel holds anything published
    // while the snapshot is being built.
    let mut events = state.bus.subscribe(&symbol);
    let mut feed = SessionFeed::new();

    if send_snapshot(&state, &symbol, &mut feed, &mut sink, state.settings.snapshot_depth)
        .await
        .is_err()
    {
        return;
    }

    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(&state, &symbol, &text, &mut sink).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(symbol = %symbol, "client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(symbol = %symbol, error = %e, "session read error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            event = events.recv() => {
                match event {
                    Ok(envelope) => {
                        if let Some(event) = feed.on_event(envelope) {
                            if send(&mut sink, &ServerMessage::from_event(event)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // At-least-once with a detected gap: tell the
                        // client and hand off through a fresh snapshot.
                        warn!(symbol = %symbol, missed, "session lagged, re-snapshotting");
                        let lagged = ServerMessage::Error {
                            kind: ErrorKind::SubscriptionLagged,
                            message: format!("{missed} events dropped, snapshot follows"),
                        };
                        if send(&mut sink, &lagged).await.is_err() {
                            break;
                        }
                        feed = SessionFeed::new();
                        if send_snapshot(&state, &symbol, &mut feed, &mut sink, state.settings.snapshot_depth)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = shutdown.changed() => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: session::GOING_AWAY,
                        reason: "GoingAway".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    info!(symbol = %symbol, "session closed");
}

type Sink = SplitSink<WebSocket, Message>;

async fn send(sink: &mut Sink, message: &ServerMessage) -> Result<(), ()> {
    let json = serde_json::to_string(message).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}

/// Fetch a snapshot at s₀, send it, and replay held events past s₀.
async fn send_snapshot(
    state: &AppState,
    symbol: &Symbol,
    feed: &mut SessionFeed,
    sink: &mut Sink,
    depth: usize,
) -> Result<(), ()> {
    let snapshot = match state.store.book_snapshot(symbol, depth) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "snapshot fetch failed");
            let message = ServerMessage::Error {
                kind: ErrorKind::SnapshotUnavailable,
                message: e.to_string(),
            };
            return send(sink, &message).await;
        }
    };

    let replay = feed.snapshot_received(snapshot.sequence);
    send(sink, &ServerMessage::OrderBookSnapshot { data: snapshot }).await?;
    for event in replay {
        send(sink, &ServerMessage::from_event(event)).await?;
    }
    Ok(())
}

/// Serve one inbound frame. Unknown message types are answered, never
/// fatal; only a write failure ends the session.
async fn handle_client_message(
    state: &AppState,
    symbol: &Symbol,
    text: &str,
    sink: &mut Sink,
) -> Result<(), ()> {
    let reply = match session::parse_client_message(text) {
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Ok(ClientMessage::GetOrderBook { depth }) => {
            match state
                .store
                .book_snapshot(symbol, depth.unwrap_or(REQUEST_DEPTH_DEFAULT))
            {
                Ok(snapshot) => ServerMessage::OrderBookSnapshot { data: snapshot },
                Err(e) => ServerMessage::Error {
                    kind: ErrorKind::SnapshotUnavailable,
                    message: e.to_string(),
                },
            }
        }
        Ok(ClientMessage::GetRecentTrades { limit }) => {
            match state
                .store
                .recent_trades(symbol, limit.unwrap_or(TRADE_LIMIT_DEFAULT))
            {
                Ok(trades) => ServerMessage::RecentTrades { data: trades },
                Err(e) => ServerMessage::Error {
                    kind: ErrorKind::SnapshotUnavailable,
                    message: e.to_string(),
                },
            }
        }
        Err(SessionError::UnknownMessage) => ServerMessage::Error {
            kind: ErrorKind::UnknownMessage,
            message: "unsupported message type".to_string(),
        },
        Err(SessionError::Malformed(detail)) => ServerMessage::Error {
            kind: ErrorKind::UnknownMessage,
            message: detail,
        },
    };

    send(sink, &reply).await
}
