use crate::room::{RoomActor, RoomCommand, RoomHandle};
use dashmap::DashMap;
use holdem_house_core::{RoomId, TableConfig};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 所有房间的登记表。克隆开销很小，按值传进各个连接处理任务。
#[derive(Clone)]
pub struct RoomStore {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    config: TableConfig,
}

impl RoomStore {
    pub fn new(config: TableConfig) -> Self {
        RoomStore { rooms: Arc::new(DashMap::new()), config }
    }

    /// 新建房间并启动它的 actor。actor 退出后房间自动从登记表移除。
    pub fn create(&self) -> RoomHandle {
        let room_id = Uuid::new_v4();
        let (actor, handle) = RoomActor::new(room_id, self.config.clone());
        self.rooms.insert(room_id, handle.clone());

        let rooms = self.rooms.clone();
        tokio::spawn(async move {
            actor.run().await;
            rooms.remove(&room_id);
            info!("房间 {} 已移除", room_id);
        });
        info!("创建了新房间 {}", room_id);
        handle
    }

    pub fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|r| r.clone())
    }

    /// 从登记表移除并通知 actor 关闭
    pub fn delete(&self, room_id: &RoomId) -> Option<RoomHandle> {
        let (_, handle) = self.rooms.remove(room_id)?;
        let _ = handle.try_send(RoomCommand::Close);
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
