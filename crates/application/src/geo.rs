//! 地理索引端口
//!
//! 每个用户只保留最新坐标，半径检索按距离升序返回。

use async_trait::async_trait;
use domain::{Coordinate, RepositoryResult, UserId};

#[async_trait]
pub trait GeoStore: Send + Sync {
    /// 写入（覆盖）用户坐标
    async fn upsert(&self, user_id: UserId, coordinate: Coordinate) -> RepositoryResult<()>;

    /// 用户最近一次上报的坐标
    async fn position(&self, user_id: UserId) -> RepositoryResult<Option<Coordinate>>;

    /// 以 `center` 为圆心、`radius_meters` 为半径检索用户，按距离升序
    async fn search_radius(
        &self,
        center: Coordinate,
        radius_meters: f64,
    ) -> RepositoryResult<Vec<UserId>>;
}
