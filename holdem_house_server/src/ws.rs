use crate::room::{OUTBOX_CAPACITY, RoomCommand, RoomError, RoomHandle};
use crate::store::RoomStore;
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, stream::StreamExt};
use holdem_house_core::{ClientMessage, PlayerId, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub fn router(store: RoomStore) -> Router {
    Router::new().route("/ws", get(websocket_handler)).with_state(store)
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(ws: WebSocketUpgrade, State(store): State<RoomStore>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, store))
}

/// 当前连接所在的房间和玩家身份，加入房间后填充
struct Session {
    room: RoomHandle,
    player_id: PlayerId,
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, store: RoomStore) {
    let (mut sender, mut receiver) = socket.split();

    // 房间 actor 通过这个通道把消息推给本连接
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);

    // 启动一个新任务，专门负责将通道中的消息发送到 WebSocket
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    let mut session: Option<Session> = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    if let Err(e) = handle_client_message(client_msg, &store, &tx, &mut session).await {
                        let _ = tx.send(ServerMessage::Error { message: e.to_string() }).await;
                    }
                }
                Err(e) => {
                    warn!("解析消息失败: {}", e);
                    let _ = tx.send(ServerMessage::Error { message: "无法解析的消息".to_string() }).await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some(Session { room, player_id }) = session {
        info!("玩家 {} 从房间 {} 断开连接", player_id, room.room_id());
        let _ = room.send(RoomCommand::Leave { player_id }).await;
    }
    writer.abort();
    info!("客户端连接关闭");
}

/// 把客户端消息翻译成房间命令
async fn handle_client_message(
    msg: ClientMessage,
    store: &RoomStore,
    tx: &mpsc::Sender<ServerMessage>,
    session: &mut Option<Session>,
) -> Result<(), RoomError> {
    match msg {
        ClientMessage::CreateRoom { nickname } => {
            if session.is_some() {
                return reply_error(tx, "你已经在一个房间里了").await;
            }
            let room = store.create();
            let player_id = room.join(nickname, tx.clone()).await?;
            info!("玩家 {} 创建了房间 {}", player_id, room.room_id());
            *session = Some(Session { room, player_id });
        }
        ClientMessage::JoinRoom { room_id, nickname } => {
            if session.is_some() {
                return reply_error(tx, "你已经在一个房间里了").await;
            }
            let Some(room) = store.get(&room_id) else {
                return reply_error(tx, "房间不存在").await;
            };
            let player_id = room.join(nickname, tx.clone()).await?;
            *session = Some(Session { room, player_id });
        }
        ClientMessage::LeaveRoom => {
            if let Some(Session { room, player_id }) = session.take() {
                room.send(RoomCommand::Leave { player_id }).await?;
                reply_info(tx, "已离开房间").await;
            }
        }
        // 其他消息需要先进入房间
        other => {
            let Some(Session { room, player_id }) = session.as_ref() else {
                return reply_error(tx, "请先加入或创建房间").await;
            };
            let player_id = *player_id;
            let command = match other {
                ClientMessage::AddBot { name, personality } => RoomCommand::AddBot { requester: player_id, name, personality },
                ClientMessage::StartHand => RoomCommand::StartHand { requester: player_id },
                ClientMessage::PerformAction(action) => RoomCommand::Action { player_id, action },
                ClientMessage::GetSnapshot => RoomCommand::Snapshot { player_id },
                ClientMessage::CreateRoom { .. } | ClientMessage::JoinRoom { .. } | ClientMessage::LeaveRoom => {
                    return Ok(());
                }
            };
            debug!(player = %player_id, ?command, "转发给房间");
            room.send(command).await?;
        }
    }
    Ok(())
}

async fn reply_error(tx: &mpsc::Sender<ServerMessage>, message: &str) -> Result<(), RoomError> {
    let _ = tx.send(ServerMessage::Error { message: message.to_string() }).await;
    Ok(())
}

async fn reply_info(tx: &mpsc::Sender<ServerMessage>, message: &str) {
    let _ = tx.send(ServerMessage::Info { message: message.to_string() }).await;
}
