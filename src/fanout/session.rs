//! 실시간 연결 세션 (`GET /ws?token=`)
//!
//! 연결 시 한 번 인증한다. 실패하면 오류 이벤트를 보내고 바로 닫는다.
//! 클라이언트 메시지: `{"action":"join_auction","auctionId":..}`, `{"action":"leave_auction"}`
// region:    --- Imports
use super::{ConnectionId, EventFanout};
use crate::app::AppState;
use crate::auction::model::AuctionId;
use crate::identity::{AuthError, Identity, IdentityVerifier};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

// endregion: --- Imports

pub const ERROR_EVENT: &str = "error_notificacion";

#[derive(Debug, Deserialize)]
pub struct SessionParams {
    #[serde(default)]
    pub token: Option<String>,
}

// region:    --- Client Messages
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientMessage {
    JoinAuction {
        #[serde(rename = "auctionId")]
        auction_id: AuctionRef,
    },
    LeaveAuction,
}

/// 숫자와 문자열 id 모두 허용
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuctionRef {
    Number(AuctionId),
    Text(String),
}

impl AuctionRef {
    fn resolve(&self) -> Option<AuctionId> {
        match self {
            AuctionRef::Number(id) => Some(*id),
            AuctionRef::Text(raw) => raw.trim().parse().ok(),
        }
    }
}
// endregion: --- Client Messages

/// `{"event":"error_notificacion","data":{"codigo":..,"mensaje":..}}`
pub fn error_notification(code: &str, message: &str) -> String {
    json!({
        "event": ERROR_EVENT,
        "data": { "codigo": code, "mensaje": message }
    })
    .to_string()
}

// region:    --- Handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SessionParams>,
    State(state): State<AppState>,
) -> Response {
    // 업그레이드 전에 검증하고 결과에 따라 세션 또는 거절
    let verified = params
        .token
        .as_deref()
        .ok_or(AuthError::Missing)
        .and_then(|token| state.verifier.verify(token));

    let fanout = Arc::clone(&state.fanout);
    ws.on_upgrade(move |socket| async move {
        match verified {
            Ok(identity) => run_session(socket, fanout, identity).await,
            Err(e) => reject(socket, e).await,
        }
    })
}

async fn reject(mut socket: WebSocket, err: AuthError) {
    warn!("{:<12} --> 인증 실패로 연결 거절: {}", "Session", err);

    let _ = socket
        .send(Message::Text(error_notification("401", &err.to_string())))
        .await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "unauthorized".into(),
        })))
        .await;
}

async fn run_session(socket: WebSocket, fanout: Arc<EventFanout>, identity: Identity) {
    let connection = fanout.connect(&identity.subject);
    let conn_id = connection.id;
    let closed = connection.closed;
    let mut outbound = connection.outbound;
    info!(
        "{:<12} --> 세션 시작: conn={}, {}",
        "Session", conn_id, identity.subject
    );

    let (mut sink, mut stream) = socket.split();

    // 큐 -> 소켓 전송 태스크
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if sink.send(Message::Text(payload.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = closed.notified() => {
                debug!("{:<12} --> 서버 측 연결 종료: conn={}", "Session", conn_id);
                break;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_message(&fanout, conn_id, &text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    fanout.disconnect(conn_id);
    writer.abort();
    info!("{:<12} --> 세션 종료: conn={}", "Session", conn_id);
}

fn handle_client_message(fanout: &EventFanout, conn_id: ConnectionId, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("{:<12} --> 잘못된 메시지: conn={}, {}", "Session", conn_id, e);
            fanout.send_to(conn_id, &error_notification("400", "알 수 없는 요청입니다"));
            return;
        }
    };

    match message {
        ClientMessage::JoinAuction { auction_id } => {
            let Some(auction_id) = auction_id.resolve() else {
                fanout.send_to(conn_id, &error_notification("400", "잘못된 경매 id 입니다"));
                return;
            };
            if let Err(e) = fanout.join(conn_id, auction_id) {
                warn!("{:<12} --> 룸 입장 실패: {}", "Session", e);
            }
        }
        ClientMessage::LeaveAuction => {
            fanout.leave(conn_id);
        }
    }
}
// endregion: --- Handler

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_accepts_numeric_and_textual_ids() {
        let numeric: ClientMessage =
            serde_json::from_str(r#"{"action":"join_auction","auctionId":12}"#).unwrap();
        let textual: ClientMessage =
            serde_json::from_str(r#"{"action":"join_auction","auctionId":"12"}"#).unwrap();

        for message in [numeric, textual] {
            match message {
                ClientMessage::JoinAuction { auction_id } => {
                    assert_eq!(auction_id.resolve(), Some(12))
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[test]
    fn unknown_actions_do_not_parse() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"dance"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"leave_auction"}"#).is_ok());
    }
}
