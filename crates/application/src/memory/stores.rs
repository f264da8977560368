use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Coordinate, RepositoryResult, Timestamp, UserId};

use crate::clock::Clock;
use crate::geo::GeoStore;
use crate::kv::KeyValueStore;

/// 内存地理索引，半径检索使用球面距离
#[derive(Default)]
pub struct InMemoryGeoStore {
    positions: Mutex<HashMap<UserId, Coordinate>>,
}

impl InMemoryGeoStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Coordinate>> {
        self.positions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GeoStore for InMemoryGeoStore {
    async fn upsert(&self, user_id: UserId, coordinate: Coordinate) -> RepositoryResult<()> {
        self.lock().insert(user_id, coordinate);
        Ok(())
    }

    async fn position(&self, user_id: UserId) -> RepositoryResult<Option<Coordinate>> {
        Ok(self.lock().get(&user_id).copied())
    }

    async fn search_radius(
        &self,
        center: Coordinate,
        radius_meters: f64,
    ) -> RepositoryResult<Vec<UserId>> {
        let mut hits: Vec<(UserId, f64)> = self
            .lock()
            .iter()
            .map(|(user, coordinate)| (*user, center.distance_meters(coordinate)))
            .filter(|(_, distance)| *distance <= radius_meters)
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(hits.into_iter().map(|(user, _)| user).collect())
    }
}

/// 内存 TTL 存储，过期判断依赖注入的时钟
pub struct InMemoryKeyValueStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (String, Timestamp)>>,
}

impl InMemoryKeyValueStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (String, Timestamp)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> RepositoryResult<()> {
        let expires_at = self.clock.now() + chrono::Duration::milliseconds(ttl.as_millis() as i64);
        self.lock()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> RepositoryResult<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> RepositoryResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn radius_search_sorted_by_distance() {
        let store = InMemoryGeoStore::new();
        store.upsert(UserId(1), Coordinate::new(0.0, 0.0).unwrap()).await.unwrap();
        store.upsert(UserId(2), Coordinate::new(0.0005, 0.0).unwrap()).await.unwrap();
        store.upsert(UserId(3), Coordinate::new(0.0002, 0.0).unwrap()).await.unwrap();
        store.upsert(UserId(4), Coordinate::new(1.0, 1.0).unwrap()).await.unwrap();

        let center = Coordinate::new(0.0, 0.0).unwrap();
        let hits = store.search_radius(center, 100.0).await.unwrap();
        assert_eq!(hits, vec![UserId(1), UserId(3), UserId(2)]);
    }

    #[tokio::test]
    async fn ttl_entries_expire_with_clock() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryKeyValueStore::new(clock.clone());

        store.set_with_ttl("k", "v", Duration::from_secs(5)).await.unwrap();
        clock.advance(chrono::Duration::seconds(4));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set_with_ttl("k", "v", Duration::from_secs(5)).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
