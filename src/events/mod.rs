use serde_json::json;

use crate::bus::{location_channel, notifications_channel};
use crate::gateway::rooms::family_room;
use crate::gateway::session::SocketHandle;
use crate::utils::now_ms;
use crate::AppState;

// 成员关系形态的变更事件处理
// 每个处理器都是同一个三段组合：鉴权 -> 组合缓存失效 -> 对外广播
// 广播与失效的失败只记录日志，不使发起请求失败，缓存靠TTL自愈

/// 发布一条事件到总线，失败只记录
async fn publish(state: &AppState, channel: &str, payload: serde_json::Value) {
    if let Err(e) = state.store.publish(channel, &payload.to_string()).await {
        tracing::warn!("Broadcast publish to {} failed: {}", channel, e);
    }
}

/// 发布在线状态变更到家庭房间
pub async fn publish_presence(state: &AppState, family_id: &str, user_id: &str, online: bool) {
    let mut payload = json!({
        "type": "presence_update",
        "user_id": user_id,
        "family_id": family_id,
        "status": if online { "online" } else { "offline" },
        "server_ts_ms": now_ms(),
    });
    if !online {
        payload["last_seen"] = json!(now_ms());
    }
    publish(state, &location_channel(family_id), payload).await;
}

/// 用户被加入家庭
/// 失效双方缓存，广播成员加入，并通知被加入的用户；
/// 被加入用户的在线会话就地获得新家庭的授权与房间成员身份
pub async fn user_added(
    state: &AppState,
    requester: &SocketHandle,
    family_id: &str,
    added_user_id: &str,
    role: Option<&str>,
) -> Result<String, String> {
    if !requester.authorized(family_id) {
        return Err("Unauthorized family access".to_string());
    }

    // 组合失效：新成员的家庭列表 + 家庭成员列表
    state.families.on_user_joined(family_id, added_user_id).await;

    publish(
        state,
        &location_channel(family_id),
        json!({
            "type": "family_member_added",
            "family_id": family_id,
            "user_id": added_user_id,
            "role": role.unwrap_or("member"),
            "server_ts_ms": now_ms(),
        }),
    )
    .await;

    publish(
        state,
        &notifications_channel(added_user_id),
        json!({
            "type": "notification",
            "kind": "added_to_family",
            "family_id": family_id,
            "server_ts_ms": now_ms(),
        }),
    )
    .await;

    // 刷新被加入用户的在线会话
    join_live_sessions(state, added_user_id, family_id).await;

    Ok(format!("User {} added to family {}", added_user_id, family_id))
}

/// 用户被移出家庭
/// 失效其全部派生缓存，广播成员移除，通知本人，并强制其socket退出房间
pub async fn user_removed(
    state: &AppState,
    requester: &SocketHandle,
    family_id: &str,
    removed_user_id: &str,
) -> Result<(), String> {
    if !requester.authorized(family_id) {
        return Err("Unauthorized family access".to_string());
    }

    state.families.on_user_left(family_id, removed_user_id).await;

    publish(
        state,
        &location_channel(family_id),
        json!({
            "type": "family_member_removed",
            "family_id": family_id,
            "user_id": removed_user_id,
            "server_ts_ms": now_ms(),
        }),
    )
    .await;

    publish(
        state,
        &notifications_channel(removed_user_id),
        json!({
            "type": "notification",
            "kind": "removed_from_family",
            "family_id": family_id,
            "server_ts_ms": now_ms(),
        }),
    )
    .await;

    evict_live_sessions(state, removed_user_id, family_id).await;

    Ok(())
}

/// 家庭被删除
/// 先快照成员再做整体失效，广播删除事件，并清空本实例的房间
pub async fn family_deleted(
    state: &AppState,
    requester: &SocketHandle,
    family_id: &str,
) -> Result<(), String> {
    if !requester.authorized(family_id) {
        return Err("Unauthorized family access".to_string());
    }

    // 失效前快照成员，否则无从知道要清哪些人的键
    let members = state.families.get_family_members(family_id).await;
    let member_ids: Vec<String> = members.into_iter().map(|m| m.user_id).collect();

    state
        .families
        .on_family_deleted(family_id, &member_ids)
        .await;

    publish(
        state,
        &location_channel(family_id),
        json!({
            "type": "family_deleted",
            "family_id": family_id,
            "server_ts_ms": now_ms(),
        }),
    )
    .await;

    // 清空房间并撤销所有本地会话对该家庭的授权
    let room = family_room(family_id);
    for socket_id in state.rooms.drain_room(&room) {
        if let Some(handle) = state.sessions.get(&socket_id) {
            handle.families.write().remove(family_id);
            handle.joined.write().remove(family_id);
        }
    }
    for user_id in &member_ids {
        state.sessions.presence_clear(user_id, family_id);
    }

    Ok(())
}

/// 成员角色变更
pub async fn role_updated(
    state: &AppState,
    requester: &SocketHandle,
    family_id: &str,
    user_id: &str,
    new_role: &str,
) -> Result<(), String> {
    if !requester.authorized(family_id) {
        return Err("Unauthorized family access".to_string());
    }

    state.families.invalidate_role(user_id, family_id).await;

    publish(
        state,
        &location_channel(family_id),
        json!({
            "type": "member_role_updated",
            "family_id": family_id,
            "user_id": user_id,
            "new_role": new_role,
            "server_ts_ms": now_ms(),
        }),
    )
    .await;

    publish(
        state,
        &notifications_channel(user_id),
        json!({
            "type": "notification",
            "kind": "role_updated",
            "family_id": family_id,
            "new_role": new_role,
            "server_ts_ms": now_ms(),
        }),
    )
    .await;

    Ok(())
}

/// 整体刷新家庭缓存
pub async fn refresh_family_cache(
    state: &AppState,
    requester: &SocketHandle,
    family_id: &str,
) -> Result<(), String> {
    if !requester.authorized(family_id) {
        return Err("Unauthorized family access".to_string());
    }

    // 隐身开关是30天的长寿命缓存，整体刷新时一并清掉
    state.ghost.invalidate_family_entries(family_id).await;
    state.families.refresh_family(family_id).await;

    publish(
        state,
        &location_channel(family_id),
        json!({
            "type": "cache_refreshed",
            "family_id": family_id,
            "server_ts_ms": now_ms(),
        }),
    )
    .await;

    Ok(())
}

/// 隐身模式切换
/// 全局范围扇出到请求者所有家庭的房间，家庭范围只扇出到该家庭
pub async fn ghost_mode_changed(
    state: &AppState,
    requester: &SocketHandle,
    enabled: bool,
    scope: crate::gateway::protocol::GhostModeScope,
    family_id: Option<&str>,
) -> Result<(), String> {
    use crate::gateway::protocol::GhostModeScope;

    let user_id = requester.user_id.clone();

    let affected: Vec<String> = match scope {
        GhostModeScope::Global => {
            state
                .ghost
                .set_global_ghost(&user_id, enabled)
                .await
                .map_err(|e| {
                    tracing::error!("Ghost mode write failed for {}: {}", user_id, e);
                    "Failed to update ghost mode".to_string()
                })?;
            requester.families.read().iter().cloned().collect()
        }
        GhostModeScope::Family => {
            let family_id = family_id.ok_or("family_id is required for family scope")?;
            if !requester.authorized(family_id) {
                return Err("Unauthorized family access".to_string());
            }
            state
                .ghost
                .set_family_ghost(&user_id, family_id, enabled)
                .await
                .map_err(|e| {
                    tracing::error!("Ghost mode write failed for {}: {}", user_id, e);
                    "Failed to update ghost mode".to_string()
                })?;
            vec![family_id.to_string()]
        }
    };

    let scope_name = match scope {
        GhostModeScope::Global => "global",
        GhostModeScope::Family => "family",
    };
    for family in &affected {
        publish(
            state,
            &location_channel(family),
            json!({
                "type": "ghost_mode",
                "user_id": user_id,
                "family_id": family,
                "enabled": enabled,
                "scope": scope_name,
                "server_ts_ms": now_ms(),
            }),
        )
        .await;
    }

    Ok(())
}

/// 把用户的在线会话接入新家庭：授权、入房、在线状态
async fn join_live_sessions(state: &AppState, user_id: &str, family_id: &str) {
    let room = family_room(family_id);
    let mut went_online = false;

    for (socket_id, handle) in state.sessions.sockets_of(user_id) {
        handle.families.write().insert(family_id.to_string());
        handle.joined.write().insert(family_id.to_string());
        state.rooms.join(&room, &socket_id, handle.sender.clone());
        if state.sessions.presence_join(user_id, family_id) {
            went_online = true;
        }
    }

    if went_online {
        state.locations.set_online(user_id, family_id).await;
        publish_presence(state, family_id, user_id, true).await;
    }
}

/// 把用户的在线会话从家庭中驱逐：撤销授权、退房、清在线计数
async fn evict_live_sessions(state: &AppState, user_id: &str, family_id: &str) {
    let room = family_room(family_id);

    for (socket_id, handle) in state.sessions.sockets_of(user_id) {
        handle.families.write().remove(family_id);
        handle.joined.write().remove(family_id);
        state.rooms.leave(&room, &socket_id);
    }
    state.sessions.presence_clear(user_id, family_id);
}
