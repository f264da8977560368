//! Redis 适配器
//!
//! 地理索引使用单个 GEO 有序集合，成员为 `user:{id}`；
//! 摇一摇意图使用带 PX 过期时间的普通键。

use std::time::Duration;

use application::{GeoStore, KeyValueStore};
use async_trait::async_trait;
use domain::{Coordinate, RepositoryError, RepositoryResult, UserId};
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, warn};

const MEMBER_PREFIX: &str = "user:";

fn map_redis_err(err: redis::RedisError) -> RepositoryError {
    RepositoryError::storage(format!("redis: {}", err))
}

fn member_of(user_id: UserId) -> String {
    format!("{}{}", MEMBER_PREFIX, user_id)
}

fn user_of(member: &str) -> Option<UserId> {
    member
        .strip_prefix(MEMBER_PREFIX)?
        .parse::<i64>()
        .ok()
        .map(UserId)
}

/// 建立带自动重连的 Redis 连接
pub async fn connect_redis(url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis 连接已建立");
    Ok(manager)
}

/// 基于 GEOADD / GEOSEARCH 的地理索引
#[derive(Clone)]
pub struct RedisGeoStore {
    connection: ConnectionManager,
    key: String,
}

impl RedisGeoStore {
    pub fn new(connection: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            connection,
            key: key.into(),
        }
    }
}

#[async_trait]
impl GeoStore for RedisGeoStore {
    async fn upsert(&self, user_id: UserId, coordinate: Coordinate) -> RepositoryResult<()> {
        let mut conn = self.connection.clone();
        redis::cmd("GEOADD")
            .arg(&self.key)
            .arg(coordinate.longitude)
            .arg(coordinate.latitude)
            .arg(member_of(user_id))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn position(&self, user_id: UserId) -> RepositoryResult<Option<Coordinate>> {
        let mut conn = self.connection.clone();
        let positions: Vec<Option<(f64, f64)>> = redis::cmd("GEOPOS")
            .arg(&self.key)
            .arg(member_of(user_id))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        match positions.into_iter().next().flatten() {
            Some((longitude, latitude)) => Coordinate::new(longitude, latitude)
                .map(Some)
                .map_err(|err| RepositoryError::storage(err.to_string())),
            None => Ok(None),
        }
    }

    async fn search_radius(
        &self,
        center: Coordinate,
        radius_meters: f64,
    ) -> RepositoryResult<Vec<UserId>> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = redis::cmd("GEOSEARCH")
            .arg(&self.key)
            .arg("FROMLONLAT")
            .arg(center.longitude)
            .arg(center.latitude)
            .arg("BYRADIUS")
            .arg(radius_meters)
            .arg("m")
            .arg("ASC")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        let mut users = Vec::with_capacity(members.len());
        for member in members {
            match user_of(&member) {
                Some(user) => users.push(user),
                None => warn!(member = %member, "地理索引中存在无法识别的成员"),
            }
        }
        Ok(users)
    }
}

/// 基于 SET PX / GET / DEL 的过期键存储
#[derive(Clone)]
pub struct RedisKeyValueStore {
    connection: ConnectionManager,
}

impl RedisKeyValueStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> RepositoryResult<()> {
        let mut conn = self.connection.clone();
        // PX 不接受 0
        let millis = ttl.as_millis().max(1) as u64;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn get(&self, key: &str) -> RepositoryResult<Option<String>> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn delete(&self, key: &str) -> RepositoryResult<()> {
        let mut conn = self.connection.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_names_round_trip() {
        assert_eq!(member_of(UserId(42)), "user:42");
        assert_eq!(user_of("user:42"), Some(UserId(42)));
    }

    #[test]
    fn foreign_members_are_ignored() {
        assert_eq!(user_of("device:42"), None);
        assert_eq!(user_of("user:abc"), None);
    }
}
