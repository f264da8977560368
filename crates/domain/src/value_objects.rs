use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 用户唯一标识。
///
/// `0` 被保留为"对所有人删除"的哨兵值，因此合法的用户ID必须为正数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// 解析来自客户端的用户ID，拒绝非正数
    pub fn parse(id: i64) -> Result<Self, DomainError> {
        if id <= 0 {
            return Err(DomainError::invalid_argument("user_id", "must be positive"));
        }
        Ok(Self(id))
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<UserId> for i64 {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// 会话唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<ChatId> for i64 {
    fn from(value: ChatId) -> Self {
        value.0
    }
}

/// 消息唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MessageId> for i64 {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

/// 已上传文件的唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for FileId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<FileId> for Uuid {
    fn from(value: FileId) -> Self {
        value.0
    }
}

/// 无序的会话参与者对。
///
/// 构造时总是把较小的ID放在 `low`，因此 `(a, b)` 与 `(b, a)` 得到同一个值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatPair {
    low: UserId,
    high: UserId,
}

impl ChatPair {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }
}

impl fmt::Display for ChatPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}

/// 经过验证的消息内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageContent(String);

impl MessageContent {
    pub const MAX_LEN: usize = 4096;

    /// 纯文本消息：去除首尾空白后不能为空
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let content = Self::with_attachments(value)?;
        if content.0.is_empty() {
            return Err(DomainError::invalid_argument("content", "cannot be empty"));
        }
        Ok(content)
    }

    /// 附带文件的消息允许空文本
    pub fn with_attachments(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.chars().count() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("content", "too long"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经纬度坐标，范围与 Redis 地理索引可接受的范围一致。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    pub const MAX_LATITUDE: f64 = 85.051_128_78;

    pub fn new(longitude: f64, latitude: f64) -> Result<Self, DomainError> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(DomainError::invalid_argument(
                "longitude",
                "must be within [-180, 180]",
            ));
        }
        if !latitude.is_finite() || !(-Self::MAX_LATITUDE..=Self::MAX_LATITUDE).contains(&latitude)
        {
            return Err(DomainError::invalid_argument(
                "latitude",
                "must be within [-85.05112878, 85.05112878]",
            ));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// 球面距离（米），haversine 公式
    pub fn distance_meters(&self, other: &Coordinate) -> f64 {
        // 与 Redis GEODIST 使用的地球半径一致
        const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lng = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_pair_is_order_insensitive() {
        let a = ChatPair::new(UserId(7), UserId(3));
        let b = ChatPair::new(UserId(3), UserId(7));
        assert_eq!(a, b);
        assert_eq!(a.low(), UserId(3));
        assert_eq!(a.high(), UserId(7));
    }

    #[test]
    fn user_id_rejects_sentinel() {
        assert!(UserId::parse(0).is_err());
        assert!(UserId::parse(-4).is_err());
        assert_eq!(UserId::parse(12).unwrap(), UserId(12));
    }

    #[test]
    fn message_content_rules() {
        assert!(MessageContent::new("   ").is_err());
        assert!(MessageContent::with_attachments("").is_ok());
        assert!(MessageContent::new("x".repeat(MessageContent::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn message_content_is_trimmed() {
        let content = MessageContent::new("  hello there \n").unwrap();
        assert_eq!(content.as_str(), "hello there");
        assert_eq!(MessageContent::with_attachments(" \t ").unwrap().as_str(), "");

        // 首尾空白不计入长度
        let padded = format!("  {}  ", "x".repeat(MessageContent::MAX_LEN));
        assert!(MessageContent::new(padded).is_ok());
    }

    #[test]
    fn coordinate_bounds() {
        assert!(Coordinate::new(181.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, 86.0).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(37.6, 55.7).is_ok());
    }

    #[test]
    fn distance_is_zero_for_same_point_and_grows() {
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        assert_eq!(origin.distance_meters(&origin), 0.0);

        // 赤道上 0.001 度约 111 米
        let east = Coordinate::new(0.001, 0.0).unwrap();
        let d = origin.distance_meters(&east);
        assert!(d > 100.0 && d < 120.0, "unexpected distance {d}");
    }
}
