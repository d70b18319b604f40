use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use redis::Client as RedisClient;
use tokio::sync::{mpsc, watch, RwLock};

/// 订阅通道上收到的一条消息
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

/// 订阅回调
/// 回调内部的错误只记录日志，不影响其他订阅者
pub type SubscriberCallback = Arc<dyn Fn(&ChannelMessage) -> Result<(), String> + Send + Sync>;

struct HandlerEntry {
    id: u64,
    callback: SubscriberCallback,
}

/// 订阅任务的控制指令
enum Control {
    Subscribe(String),
    Unsubscribe(String),
    PSubscribe(String),
}

type HandlerMap = Arc<RwLock<HashMap<String, Vec<HandlerEntry>>>>;

/// 发布订阅通道
/// 持有独立的订阅连接，由后台投递任务驱动；连接断开后自动重连并恢复订阅
pub struct PubSubHub {
    channels: HandlerMap,
    patterns: HandlerMap,
    control_tx: mpsc::UnboundedSender<Control>,
    ready_rx: watch::Receiver<bool>,
    next_id: AtomicU64,
}

impl PubSubHub {
    /// 创建订阅通道并启动后台投递任务
    pub fn new(client: RedisClient) -> Self {
        let channels: HandlerMap = Arc::new(RwLock::new(HashMap::new()));
        let patterns: HandlerMap = Arc::new(RwLock::new(HashMap::new()));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(false);

        tokio::spawn(delivery_task(
            client,
            channels.clone(),
            patterns.clone(),
            control_rx,
            ready_tx,
        ));

        Self {
            channels,
            patterns,
            control_tx,
            ready_rx,
            next_id: AtomicU64::new(1),
        }
    }

    /// 等待订阅连接就绪，超时返回false
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        if *self.ready_rx.borrow() {
            return true;
        }
        let mut rx = self.ready_rx.clone();
        tokio::time::timeout(timeout, async {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    return false;
                }
            }
            true
        })
        .await
        .unwrap_or(false)
    }

    /// 订阅精确频道，返回回调句柄
    pub async fn subscribe(&self, channel: &str, callback: SubscriberCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut channels = self.channels.write().await;
        let entries = channels.entry(channel.to_string()).or_default();
        let first = entries.is_empty();
        entries.push(HandlerEntry { id, callback });
        drop(channels);

        // 该频道的首个回调才需要向服务端发起订阅
        if first {
            let _ = self.control_tx.send(Control::Subscribe(channel.to_string()));
        }
        id
    }

    /// 取消订阅
    /// 给定句柄时只移除对应回调，否则移除该频道的全部回调
    pub async fn unsubscribe(&self, channel: &str, handler_id: Option<u64>) {
        let mut channels = self.channels.write().await;
        let emptied = match channels.get_mut(channel) {
            Some(entries) => {
                match handler_id {
                    Some(id) => entries.retain(|e| e.id != id),
                    None => entries.clear(),
                }
                entries.is_empty()
            }
            None => return,
        };

        if emptied {
            channels.remove(channel);
            let _ = self
                .control_tx
                .send(Control::Unsubscribe(channel.to_string()));
        }
    }

    /// 模式订阅，单段通配
    pub async fn psubscribe(&self, pattern: &str, callback: SubscriberCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut patterns = self.patterns.write().await;
        let entries = patterns.entry(pattern.to_string()).or_default();
        let first = entries.is_empty();
        entries.push(HandlerEntry { id, callback });
        drop(patterns);

        if first {
            let _ = self
                .control_tx
                .send(Control::PSubscribe(pattern.to_string()));
        }
        id
    }
}

/// 后台投递任务
/// 外层循环负责建连与恢复订阅，内层循环在消息投递与控制指令之间复用
async fn delivery_task(
    client: RedisClient,
    channels: HandlerMap,
    patterns: HandlerMap,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    ready_tx: watch::Sender<bool>,
) {
    loop {
        let pubsub = match client.get_async_pubsub().await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("PubSub connection error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let (mut sink, mut stream) = pubsub.split();

        // 重连后恢复所有已注册的订阅
        let mut restore_failed = false;
        for channel in channels.read().await.keys() {
            if let Err(e) = sink.subscribe(channel).await {
                tracing::error!("Failed to restore subscription {}: {}", channel, e);
                restore_failed = true;
            }
        }
        for pattern in patterns.read().await.keys() {
            if let Err(e) = sink.psubscribe(pattern).await {
                tracing::error!("Failed to restore pattern subscription {}: {}", pattern, e);
                restore_failed = true;
            }
        }
        if restore_failed {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }

        let _ = ready_tx.send(true);

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(msg) => deliver(&msg, &channels, &patterns).await,
                        None => {
                            tracing::warn!("PubSub connection dropped, reconnecting");
                            break;
                        }
                    }
                }
                ctl = control_rx.recv() => {
                    match ctl {
                        Some(Control::Subscribe(channel)) => {
                            if let Err(e) = sink.subscribe(&channel).await {
                                tracing::error!("Subscribe {} failed: {}", channel, e);
                            }
                        }
                        Some(Control::Unsubscribe(channel)) => {
                            if let Err(e) = sink.unsubscribe(&channel).await {
                                tracing::error!("Unsubscribe {} failed: {}", channel, e);
                            }
                        }
                        Some(Control::PSubscribe(pattern)) => {
                            if let Err(e) = sink.psubscribe(&pattern).await {
                                tracing::error!("PSubscribe {} failed: {}", pattern, e);
                            }
                        }
                        // 所有发送端已关闭，服务停机
                        None => return,
                    }
                }
            }
        }

        let _ = ready_tx.send(false);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// 投递一条消息给匹配的回调
/// 先在锁内拷贝出回调集合再逐一调用，避免回调期间持锁
async fn deliver(msg: &redis::Msg, channels: &HandlerMap, patterns: &HandlerMap) {
    let channel = msg.get_channel_name().to_string();
    let payload: String = match msg.get_payload() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Invalid payload on {}: {}", channel, e);
            return;
        }
    };
    let pattern: Option<String> = msg.get_pattern().ok();

    let message = ChannelMessage { channel, payload };

    let callbacks: Vec<SubscriberCallback> = match &pattern {
        Some(p) => {
            let patterns = patterns.read().await;
            patterns
                .get(p)
                .map(|entries| entries.iter().map(|e| e.callback.clone()).collect())
                .unwrap_or_default()
        }
        None => {
            let channels = channels.read().await;
            channels
                .get(&message.channel)
                .map(|entries| entries.iter().map(|e| e.callback.clone()).collect())
                .unwrap_or_default()
        }
    };

    for callback in callbacks {
        // 回调错误只记录，不撤销订阅，也不影响后续回调
        if let Err(e) = callback(&message) {
            tracing::error!("Subscriber callback error on {}: {}", message.channel, e);
        }
    }
}
