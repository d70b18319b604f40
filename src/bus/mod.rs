use std::sync::Arc;
use std::time::Duration;

use crate::gateway::rooms::{family_room, RoomRegistry};
use crate::gateway::session::SessionRegistry;
use crate::storage::{ChannelMessage, PubSubHub};

/// 家庭位置频道，兼作家庭房间的通用事件流
pub fn location_channel(family_id: &str) -> String {
    format!("family:{}:location", family_id)
}

/// 家庭告警频道
pub fn alerts_channel(family_id: &str) -> String {
    format!("family:{}:alerts", family_id)
}

/// 用户通知频道
pub fn notifications_channel(user_id: &str) -> String {
    format!("user:{}:notifications", user_id)
}

/// 频道解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusRoute {
    FamilyLocation(String),
    FamilyAlert(String),
    UserNotification(String),
}

/// 解析总线频道名
/// 固定段按字面匹配，通配段只允许单段（不含冒号）
pub fn parse_channel(channel: &str) -> Option<BusRoute> {
    if let Some(rest) = channel.strip_prefix("family:") {
        if let Some(family_id) = rest.strip_suffix(":location") {
            if !family_id.is_empty() && !family_id.contains(':') {
                return Some(BusRoute::FamilyLocation(family_id.to_string()));
            }
        }
        if let Some(family_id) = rest.strip_suffix(":alerts") {
            if !family_id.is_empty() && !family_id.contains(':') {
                return Some(BusRoute::FamilyAlert(family_id.to_string()));
            }
        }
        return None;
    }

    if let Some(rest) = channel.strip_prefix("user:") {
        if let Some(user_id) = rest.strip_suffix(":notifications") {
            if !user_id.is_empty() && !user_id.contains(':') {
                return Some(BusRoute::UserNotification(user_id.to_string()));
            }
        }
    }

    None
}

/// 总线分发器
/// 启动时建立三类模式订阅，把总线消息转投给本实例的相关socket
pub struct BusDispatcher {
    hub: Arc<PubSubHub>,
    rooms: Arc<RoomRegistry>,
    sessions: Arc<SessionRegistry>,
}

impl BusDispatcher {
    pub fn new(
        hub: Arc<PubSubHub>,
        rooms: Arc<RoomRegistry>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            hub,
            rooms,
            sessions,
        }
    }

    /// 建立模式订阅；订阅连接未就绪时等待，上限5秒
    pub async fn start(&self) {
        if !self.hub.wait_ready(Duration::from_secs(5)).await {
            tracing::warn!("PubSub not ready within 5s, subscriptions will apply on connect");
        }

        let callback = self.forward_callback();
        self.hub
            .psubscribe("family:*:location", callback.clone())
            .await;
        self.hub
            .psubscribe("family:*:alerts", callback.clone())
            .await;
        self.hub
            .psubscribe("user:*:notifications", callback)
            .await;

        tracing::info!("Bus dispatcher subscriptions established");
    }

    /// 订阅回调：解析频道并把负载原样转投
    fn forward_callback(&self) -> crate::storage::SubscriberCallback {
        let rooms = self.rooms.clone();
        let sessions = self.sessions.clone();

        Arc::new(move |message: &ChannelMessage| {
            let route = parse_channel(&message.channel)
                .ok_or_else(|| format!("unroutable channel {}", message.channel))?;

            match route {
                BusRoute::FamilyLocation(family_id) | BusRoute::FamilyAlert(family_id) => {
                    rooms.broadcast(&family_room(&family_id), &message.payload);
                }
                BusRoute::UserNotification(user_id) => {
                    sessions.send_to_user(&user_id, &message.payload);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_routes() {
        assert_eq!(
            parse_channel("family:fA:location"),
            Some(BusRoute::FamilyLocation("fA".to_string()))
        );
        assert_eq!(
            parse_channel("family:fA:alerts"),
            Some(BusRoute::FamilyAlert("fA".to_string()))
        );
        assert_eq!(
            parse_channel("user:u1:notifications"),
            Some(BusRoute::UserNotification("u1".to_string()))
        );
    }

    #[test]
    fn test_parse_channel_rejects_non_matching() {
        assert_eq!(parse_channel("family:fA:something"), None);
        assert_eq!(parse_channel("family::location"), None);
        assert_eq!(parse_channel("family:a:b:location"), None);
        assert_eq!(parse_channel("user:u1:location"), None);
        assert_eq!(parse_channel("other:fA:location"), None);
        assert_eq!(parse_channel(""), None);
    }

    #[test]
    fn test_channel_builders_roundtrip() {
        assert_eq!(
            parse_channel(&location_channel("fA")),
            Some(BusRoute::FamilyLocation("fA".to_string()))
        );
        assert_eq!(
            parse_channel(&alerts_channel("fA")),
            Some(BusRoute::FamilyAlert("fA".to_string()))
        );
        assert_eq!(
            parse_channel(&notifications_channel("u1")),
            Some(BusRoute::UserNotification("u1".to_string()))
        );
    }
}
