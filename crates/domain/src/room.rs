use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 经过验证的房间名。
///
/// 房间不是持久化实体，只是消息和订阅的分区键；
/// 一个房间"存在"当且仅当有消息或连接引用了它的名字。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("roomName", "cannot be empty"));
        }
        if value.len() > 128 {
            return Err(DomainError::invalid_argument("roomName", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
