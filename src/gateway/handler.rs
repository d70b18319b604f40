use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events;
use crate::gateway::protocol::{ClientEvent, LocationUpdatePayload, ServerEvent};
use crate::gateway::rooms::family_room;
use crate::gateway::session::SocketHandle;
use crate::infrastructure::auth::extract_bearer;
use crate::utils::now_ms;
use crate::AppState;

/// 未随连接携带令牌时，等待补交auth帧的时限
const AUTH_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    token: Option<String>,
}

/// WebSocket升级入口
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = extract_bearer(&headers, query.token.as_deref());
    ws.on_upgrade(move |socket| handle_socket(state, socket, token))
}

/// 单条socket的完整生命周期：认证 -> 入房 -> 事件循环 -> 断开清理
async fn handle_socket(state: AppState, socket: WebSocket, token: Option<String>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // 1. 取得令牌：头/查询串未携带时等待首帧auth补交
    let token = match token {
        Some(t) => Some(t),
        None => wait_for_auth_frame(&mut ws_rx).await,
    };
    let token = match token {
        Some(t) => t,
        None => {
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };

    // 2. 校验令牌，失败直接断开
    let claims = match state.verifier.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::info!("Token verification failed: {}", e);
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let user_id = claims.sub;

    // 3. 解析家庭集合并登记会话
    let family_ids = state.families.get_user_families(&user_id).await;
    let socket_id = Uuid::new_v4().to_string();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // 出站泵：总线回调与广播经无界通道汇入，慢速socket不会阻塞发布方
    let outbound = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let handle = SocketHandle {
        user_id: user_id.clone(),
        sender: out_tx.clone(),
        families: Arc::new(RwLock::new(
            family_ids.iter().cloned().collect::<HashSet<_>>(),
        )),
        joined: Arc::new(RwLock::new(
            family_ids.iter().cloned().collect::<HashSet<_>>(),
        )),
    };
    state.sessions.register(&socket_id, handle.clone());

    // 4. 加入各家庭房间并上报在线状态
    for family_id in &family_ids {
        state
            .rooms
            .join(&family_room(family_id), &socket_id, out_tx.clone());
        if state.sessions.presence_join(&user_id, family_id) {
            state.locations.set_online(&user_id, family_id).await;
            events::publish_presence(&state, family_id, &user_id, true).await;
        }
    }

    send(&handle, &ServerEvent::Connected {
        user_id: user_id.clone(),
        family_ids: family_ids.clone(),
    });

    tracing::info!("Socket {} connected as {}", socket_id, user_id);

    // 5. 入站事件循环，单socket内按到达顺序处理
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                dispatch(&state, &handle, &socket_id, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Socket {} read error: {}", socket_id, e);
                break;
            }
        }
    }

    // 6. 断开清理：退房，最后一条socket触发下线广播
    state.sessions.unregister(&socket_id);
    let joined: Vec<String> = handle.joined.read().iter().cloned().collect();
    for family_id in joined {
        state.rooms.leave(&family_room(&family_id), &socket_id);
        if state.sessions.presence_leave(&user_id, &family_id) {
            state.locations.clear_online(&user_id, &family_id).await;
            events::publish_presence(&state, &family_id, &user_id, false).await;
        }
    }

    // 所有发送端克隆都已释放后，出站泵才会随通道关闭而退出
    drop(handle);
    drop(out_tx);
    let _ = outbound.await;
    tracing::info!("Socket {} disconnected", socket_id);
}

/// 等待首帧auth事件补交令牌
async fn wait_for_auth_frame(ws_rx: &mut SplitStream<WebSocket>) -> Option<String> {
    let frame = tokio::time::timeout(AUTH_FRAME_TIMEOUT, ws_rx.next())
        .await
        .ok()??;

    let text = match frame {
        Ok(Message::Text(text)) => text,
        _ => return None,
    };

    match serde_json::from_str::<ClientEvent>(&text) {
        Ok(ClientEvent::Auth { token }) => Some(token),
        _ => None,
    }
}

/// 向socket发送一帧网关事件
fn send(handle: &SocketHandle, event: &ServerEvent) {
    let _ = handle.sender.send(event.to_frame());
}

/// 入站事件分发
async fn dispatch(state: &AppState, handle: &SocketHandle, socket_id: &str, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            send(handle, &ServerEvent::ack_err("unknown", "Malformed payload"));
            tracing::debug!("Socket {} sent malformed event: {}", socket_id, e);
            return;
        }
    };

    match event {
        ClientEvent::Auth { .. } => {
            send(handle, &ServerEvent::ack_err("auth", "Already authenticated"));
        }

        ClientEvent::Ping => {
            send(handle, &ServerEvent::Pong {
                server_ts_ms: now_ms(),
            });
        }

        ClientEvent::LocationUpdate(payload) => {
            handle_location_update(state, handle, payload).await;
        }

        ClientEvent::JoinFamily { family_id } => {
            if !handle.authorized(&family_id) {
                send(
                    handle,
                    &ServerEvent::ack_err("join_family", "Unauthorized family access"),
                );
                return;
            }

            handle.joined.write().insert(family_id.clone());
            state
                .rooms
                .join(&family_room(&family_id), socket_id, handle.sender.clone());
            if state.sessions.presence_join(&handle.user_id, &family_id) {
                state.locations.set_online(&handle.user_id, &family_id).await;
                events::publish_presence(state, &family_id, &handle.user_id, true).await;
            }

            send(handle, &ServerEvent::Ack {
                verb: "join_family".to_string(),
                success: true,
                error: None,
                message: None,
                server_ts_ms: None,
                family_id: Some(family_id),
            });
        }

        ClientEvent::LeaveFamily { family_id } => {
            handle.joined.write().remove(&family_id);
            state.rooms.leave(&family_room(&family_id), socket_id);
            if state.sessions.presence_leave(&handle.user_id, &family_id) {
                state
                    .locations
                    .clear_online(&handle.user_id, &family_id)
                    .await;
                events::publish_presence(state, &family_id, &handle.user_id, false).await;
            }

            send(handle, &ServerEvent::Ack {
                verb: "leave_family".to_string(),
                success: true,
                error: None,
                message: None,
                server_ts_ms: None,
                family_id: Some(family_id),
            });
        }

        ClientEvent::GhostMode {
            enabled,
            scope,
            family_id,
        } => {
            let result =
                events::ghost_mode_changed(state, handle, enabled, scope, family_id.as_deref())
                    .await;
            match result {
                Ok(()) => send(handle, &ServerEvent::ack_ok("ghost_mode")),
                Err(error) => send(handle, &ServerEvent::ack_err("ghost_mode", &error)),
            }
        }

        ClientEvent::UserAddedToFamily {
            family_id,
            added_user_id,
            role,
        } => {
            let result =
                events::user_added(state, handle, &family_id, &added_user_id, role.as_deref())
                    .await;
            match result {
                Ok(message) => send(handle, &ServerEvent::Ack {
                    verb: "user_added_to_family".to_string(),
                    success: true,
                    error: None,
                    message: Some(message),
                    server_ts_ms: None,
                    family_id: Some(family_id),
                }),
                Err(error) => send(
                    handle,
                    &ServerEvent::ack_err("user_added_to_family", &error),
                ),
            }
        }

        ClientEvent::UserRemovedFromFamily {
            family_id,
            removed_user_id,
        } => {
            let result = events::user_removed(state, handle, &family_id, &removed_user_id).await;
            match result {
                Ok(()) => send(handle, &ServerEvent::ack_ok("user_removed_from_family")),
                Err(error) => send(
                    handle,
                    &ServerEvent::ack_err("user_removed_from_family", &error),
                ),
            }
        }

        ClientEvent::FamilyDeleted { family_id } => {
            let result = events::family_deleted(state, handle, &family_id).await;
            match result {
                Ok(()) => send(handle, &ServerEvent::ack_ok("family_deleted")),
                Err(error) => send(handle, &ServerEvent::ack_err("family_deleted", &error)),
            }
        }

        ClientEvent::MemberRoleUpdated {
            family_id,
            user_id,
            new_role,
        } => {
            let result =
                events::role_updated(state, handle, &family_id, &user_id, &new_role).await;
            match result {
                Ok(()) => send(handle, &ServerEvent::ack_ok("member_role_updated")),
                Err(error) => send(handle, &ServerEvent::ack_err("member_role_updated", &error)),
            }
        }

        ClientEvent::RefreshFamilyCache { family_id } => {
            let result = events::refresh_family_cache(state, handle, &family_id).await;
            match result {
                Ok(()) => send(handle, &ServerEvent::ack_ok("refresh_family_cache")),
                Err(error) => send(handle, &ServerEvent::ack_err("refresh_family_cache", &error)),
            }
        }
    }
}

/// 位置上报：鉴权 -> 样本校验 -> 交给位置服务
async fn handle_location_update(
    state: &AppState,
    handle: &SocketHandle,
    payload: LocationUpdatePayload,
) {
    if !handle.authorized(&payload.family_id) {
        send(
            handle,
            &ServerEvent::ack_err("location_update", "Unauthorized family access"),
        );
        return;
    }

    if let Err(reason) = validate_sample(&payload) {
        send(handle, &ServerEvent::ack_err("location_update", reason));
        return;
    }

    let family_id = payload.family_id.clone();
    match state
        .location_service
        .ingest(&handle.user_id, payload.into_sample())
        .await
    {
        Ok(receipt) => {
            // 持续上报兼作在线心跳，续期2分钟的在线键
            state.locations.set_online(&handle.user_id, &family_id).await;
            send(handle, &ServerEvent::Ack {
                verb: "location_update".to_string(),
                success: true,
                error: None,
                message: Some(receipt.message_id),
                server_ts_ms: Some(receipt.server_timestamp),
                family_id: None,
            })
        }
        Err(e) => {
            // 日志追加失败是摄入失败，回执给客户端以便重试
            tracing::error!("Location ingest failed for {}: {}", handle.user_id, e);
            send(
                handle,
                &ServerEvent::ack_err("location_update", "Failed to persist location"),
            );
        }
    }
}

/// 位置样本的基础校验
fn validate_sample(payload: &LocationUpdatePayload) -> Result<(), &'static str> {
    if !payload.lat.is_finite() || !(-90.0..=90.0).contains(&payload.lat) {
        return Err("Invalid latitude");
    }
    if !payload.lon.is_finite() || !(-180.0..=180.0).contains(&payload.lon) {
        return Err("Invalid longitude");
    }
    if !payload.accuracy.is_finite() || payload.accuracy < 0.0 {
        return Err("Invalid accuracy");
    }
    if payload.client_ts_ms <= 0 {
        return Err("Invalid client timestamp");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(lat: f64, lon: f64, accuracy: f64, ts: i64) -> LocationUpdatePayload {
        LocationUpdatePayload {
            family_id: "fA".to_string(),
            lat,
            lon,
            accuracy,
            altitude: None,
            bearing: None,
            speed: None,
            client_ts_ms: ts,
            battery_pct: Some(80),
            battery_state: None,
        }
    }

    #[test]
    fn test_validate_sample_accepts_normal() {
        assert!(validate_sample(&payload(12.9716, 77.5946, 5.0, 1_700_000_000_000)).is_ok());
    }

    #[test]
    fn test_validate_sample_rejects_out_of_range() {
        assert!(validate_sample(&payload(91.0, 0.0, 5.0, 1)).is_err());
        assert!(validate_sample(&payload(0.0, -181.0, 5.0, 1)).is_err());
        assert!(validate_sample(&payload(0.0, 0.0, -1.0, 1)).is_err());
        assert!(validate_sample(&payload(0.0, 0.0, 5.0, 0)).is_err());
        assert!(validate_sample(&payload(f64::NAN, 0.0, 5.0, 1)).is_err());
    }
}
