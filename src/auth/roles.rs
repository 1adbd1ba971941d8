//! Read-mostly role cache.
//!
//! The directory holds one immutable snapshot behind `RwLock<Arc<_>>`. A
//! refresh builds a complete replacement from the `RoleSource` and swaps it in
//! one write; readers clone the `Arc` and never see a partial map. If a
//! refresh fails the previous snapshot stays in place.

use anyhow::{bail, Context, Result};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use super::BoxFuture;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

/// Upstream of the role cache.
pub trait RoleSource: Send + Sync {
    fn list_roles(&self) -> BoxFuture<'_, Result<Vec<Role>>>;
}

#[derive(Debug, Default)]
struct Snapshot {
    by_name: HashMap<String, Role>,
    by_id: HashMap<Uuid, Role>,
}

impl Snapshot {
    /// Names are keyed lower-cased, so two roles differing only by case are
    /// ambiguous and the whole set is rejected.
    fn build(roles: Vec<Role>) -> Result<Self> {
        let mut snapshot = Self::default();
        for role in roles {
            let key = role.name.to_lowercase();
            if let Some(existing) = snapshot.by_name.get(&key) {
                bail!(
                    "role names {:?} and {:?} collide when compared case-insensitively",
                    existing.name,
                    role.name
                );
            }
            snapshot.by_name.insert(key, role.clone());
            snapshot.by_id.insert(role.id, role);
        }
        Ok(snapshot)
    }
}

pub struct RoleDirectory {
    source: Arc<dyn RoleSource>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RoleDirectory {
    /// Starts empty; call `refresh` to populate.
    #[must_use]
    pub fn new(source: Arc<dyn RoleSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Case-insensitive lookup by name.
    #[must_use]
    pub fn get_role(&self, name: &str) -> Option<Role> {
        let role = self.current().by_name.get(&name.to_lowercase()).cloned();
        if role.is_none() {
            warn!(role = name, "role not found in cache");
        }
        role
    }

    #[must_use]
    pub fn role_by_id(&self, id: Uuid) -> Option<Role> {
        let role = self.current().by_id.get(&id).cloned();
        if role.is_none() {
            warn!(role_id = %id, "role id not found in cache");
        }
        role
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the snapshot with the full role set from the source.
    ///
    /// # Errors
    /// Returns an error if the source fails; the cached snapshot is kept.
    pub async fn refresh(&self) -> Result<usize> {
        let roles = self.source.list_roles().await.context("failed to list roles")?;
        let snapshot = Arc::new(Snapshot::build(roles)?);
        let count = snapshot.by_id.len();

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        debug!(count, "role cache refreshed");
        Ok(count)
    }
}

/// Refresh the directory every `every`. The first refresh happens after one
/// interval; startup performs its own.
pub fn spawn_role_refresher(directory: Arc<RoleDirectory>, every: Duration) -> JoinHandle<()> {
    let every = if every.is_zero() {
        Duration::from_secs(1)
    } else {
        every
    };
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(err) = directory.refresh().await {
                error!("role cache refresh failed, keeping previous snapshot: {err:#}");
            }
        }
    })
}

/// Reads the `roles` table.
#[derive(Clone, Debug)]
pub struct PgRoleSource {
    pool: PgPool,
}

impl PgRoleSource {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self) -> Result<Vec<Role>> {
        let query = "SELECT id, name FROM roles ORDER BY name";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to query roles")?;

        rows.iter()
            .map(|row| -> Result<Role> {
                Ok(Role {
                    id: row.try_get("id").context("roles.id")?,
                    name: row.try_get("name").context("roles.name")?,
                })
            })
            .collect()
    }
}

impl RoleSource for PgRoleSource {
    fn list_roles(&self) -> BoxFuture<'_, Result<Vec<Role>>> {
        Box::pin(self.fetch())
    }
}
