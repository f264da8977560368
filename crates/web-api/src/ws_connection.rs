use std::sync::Arc;

use application::{ConnectionHandle, ConnectionId, EmitError, EventDispatcher, ServerEvent};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// WebSocket 写操作命令
///
/// 所有对 sender 的写操作都经由发送任务串行执行
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Bytes),
}

/// 注册到在线表的连接句柄，`emit` 只入队不等待
struct ChannelConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<WsCommand>,
}

impl ConnectionHandle for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn emit(&self, event: &ServerEvent) -> Result<(), EmitError> {
        let frame = event
            .to_frame()
            .map_err(|err| EmitError::Encode(err.to_string()))?;
        self.outbound
            .send(WsCommand::SendText(frame))
            .map_err(|_| EmitError::Closed)
    }
}

/// 单个 WebSocket 连接
///
/// 同一连接上的入站事件按到达顺序逐个分发，前一个处理完才读取下一个；
/// 连接断开时已开始的处理照常完成，然后从在线表注销。
pub struct WebSocketConnection {
    dispatcher: Arc<EventDispatcher>,
    user_id: UserId,
}

impl WebSocketConnection {
    pub fn new(dispatcher: Arc<EventDispatcher>, user_id: UserId) -> Self {
        Self {
            dispatcher,
            user_id,
        }
    }

    pub async fn run(self, socket: WebSocket) {
        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<WsCommand>();

        let handle = Arc::new(ChannelConnection {
            id: ConnectionId::new(),
            outbound: cmd_tx.clone(),
        });
        let connection_id = handle.id;
        self.dispatcher.connect(self.user_id, handle.clone());
        tracing::info!(user_id = %self.user_id, connection_id = %connection_id, "WebSocket 连接已建立");

        let send_task = tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                let message = match cmd {
                    WsCommand::SendText(text) => WsMessage::Text(text.into()),
                    WsCommand::SendPong(data) => WsMessage::Pong(data),
                };
                if sender.send(message).await.is_err() {
                    tracing::warn!("WebSocket 写入失败");
                    break;
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        let recv_task = {
            let dispatcher = self.dispatcher.clone();
            let user_id = self.user_id;
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    match message {
                        WsMessage::Text(text) => {
                            dispatcher
                                .dispatch(user_id, handle.as_ref(), text.as_str())
                                .await;
                        }
                        WsMessage::Binary(bytes) => match std::str::from_utf8(&bytes) {
                            Ok(text) => dispatcher.dispatch(user_id, handle.as_ref(), text).await,
                            Err(_) => tracing::warn!(user_id = %user_id, "忽略非 UTF-8 二进制帧"),
                        },
                        WsMessage::Ping(data) => {
                            if cmd_tx.send(WsCommand::SendPong(data)).is_err() {
                                break;
                            }
                        }
                        WsMessage::Pong(_) => {
                            tracing::debug!("收到pong消息");
                        }
                        WsMessage::Close(_) => {
                            tracing::debug!("WebSocket收到关闭消息");
                            break;
                        }
                    }
                }
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        if let Err(err) = recv_task.await {
            tracing::error!(error = %err, "WebSocket接收任务异常退出");
        }

        match self.dispatcher.disconnect(connection_id) {
            Some(user_id) => {
                tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket连接已断开，在线状态已清理");
            }
            None => {
                tracing::debug!(connection_id = %connection_id, "连接已被同一用户的新连接替换");
            }
        }
        send_task.abort();
    }
}
