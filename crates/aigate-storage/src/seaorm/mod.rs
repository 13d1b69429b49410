pub mod entities;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue, ColumnTrait, Database, DatabaseBackend, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Schema,
};

use aigate_common::{PrincipalId, QuotaKind, QuotaWindow, RequestId, TraceEvent, UsageRecord};

use crate::store::{BreakerSnapshot, Store, StorageResult, UsageFilter};

/// sea-orm-backed `Store`, grounded on the teacher's `SeaOrmStorage`: one
/// shared `DatabaseConnection`, SQLite-first with Postgres/MySQL as
/// alternate backends, entities under `entities/`. Unlike the teacher's
/// `Storage` trait this crate is scoped to the four tables the gateway
/// core itself writes; workspace/user/credential tables belong to the
/// admin/auth surface this repo doesn't implement.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let db = Database::connect(dsn).await?;
        if db.get_database_backend() == DatabaseBackend::Sqlite {
            db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
        }
        let store = Self { db };
        store.sync().await?;
        Ok(store)
    }

    /// Migration-less schema creation: registers every entity's `CREATE
    /// TABLE IF NOT EXISTS` with the backend-appropriate builder and runs
    /// them, mirroring the teacher's `SeaOrmStorage::sync`.
    async fn sync(&self) -> StorageResult<()> {
        let builder = Schema::new(self.db.get_database_backend()).builder();
        builder
            .register(entities::UsageRecords)
            .register(entities::TraceEvents)
            .register(entities::QuotaWindows)
            .register(entities::BreakerStates)
            .sync(&self.db)
            .await?;
        Ok(())
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl Store for SeaOrmStore {
    async fn record_usage(&self, record: &UsageRecord) -> StorageResult<()> {
        use entities::usage_records::ActiveModel;

        let active = ActiveModel {
            request_id: ActiveValue::Set(record.request_id.to_string()),
            principal: ActiveValue::Set(record.principal.clone()),
            provider: ActiveValue::Set(record.provider.clone()),
            status: ActiveValue::Set(record.status.as_str().to_string()),
            completed_at: ActiveValue::Set(record.completed_at),
            payload: ActiveValue::Set(serde_json::to_value(record)?),
            ..Default::default()
        };
        entities::UsageRecords::insert(active).exec(&self.db).await?;
        Ok(())
    }

    async fn list_usage(&self, filter: &UsageFilter) -> StorageResult<Vec<UsageRecord>> {
        use entities::usage_records::Column;

        let mut query = entities::UsageRecords::find().order_by_desc(Column::CompletedAt);
        if let Some(principal) = &filter.principal {
            query = query.filter(Column::Principal.eq(principal.clone()));
        }
        if let Some(provider) = &filter.provider {
            query = query.filter(Column::Provider.eq(provider.clone()));
        }
        if let Some(since) = filter.since {
            query = query.filter(Column::CompletedAt.gte(since));
        }
        if filter.limit > 0 {
            query = query.limit(filter.limit);
        }

        let rows = query.all(&self.db).await?;
        rows.into_iter()
            .map(|row| Ok(serde_json::from_value(row.payload)?))
            .collect()
    }

    async fn record_trace_event(&self, event: &TraceEvent) -> StorageResult<()> {
        use entities::trace_events::ActiveModel;

        let active = ActiveModel {
            request_id: ActiveValue::Set(event.request_id.to_string()),
            ordinal: ActiveValue::Set(event.ordinal as i64),
            at: ActiveValue::Set(event.at),
            payload: ActiveValue::Set(serde_json::to_value(event)?),
            ..Default::default()
        };
        entities::TraceEvents::insert(active).exec(&self.db).await?;
        Ok(())
    }

    async fn list_trace_events(&self, request_id: RequestId) -> StorageResult<Vec<TraceEvent>> {
        use entities::trace_events::Column;

        let rows = entities::TraceEvents::find()
            .filter(Column::RequestId.eq(request_id.to_string()))
            .order_by_asc(Column::Ordinal)
            .all(&self.db)
            .await?;
        rows.into_iter()
            .map(|row| Ok(serde_json::from_value(row.payload)?))
            .collect()
    }

    async fn save_quota_window(
        &self,
        principal: &PrincipalId,
        kind: QuotaKind,
        window: &QuotaWindow,
    ) -> StorageResult<()> {
        use entities::quota_windows::{ActiveModel, Column};

        let active = ActiveModel {
            principal: ActiveValue::Set(principal.clone()),
            kind: ActiveValue::Set(kind_key(kind).to_string()),
            payload: ActiveValue::Set(serde_json::to_value(window)?),
            ..Default::default()
        };
        entities::QuotaWindows::insert(active)
            .on_conflict(
                OnConflict::columns([Column::Principal, Column::Kind])
                    .update_column(Column::Payload)
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn load_quota_window(
        &self,
        principal: &PrincipalId,
        kind: QuotaKind,
    ) -> StorageResult<Option<QuotaWindow>> {
        use entities::quota_windows::Column;

        let row = entities::QuotaWindows::find()
            .filter(Column::Principal.eq(principal.clone()))
            .filter(Column::Kind.eq(kind_key(kind)))
            .one(&self.db)
            .await?;
        row.map(|row| Ok(serde_json::from_value(row.payload)?)).transpose()
    }

    async fn save_breaker(&self, provider: &str, snapshot: &BreakerSnapshot) -> StorageResult<()> {
        use entities::breaker_states::{ActiveModel, Column};

        let active = ActiveModel {
            provider: ActiveValue::Set(provider.to_string()),
            payload: ActiveValue::Set(serde_json::to_value(snapshot)?),
            ..Default::default()
        };
        entities::BreakerStates::insert(active)
            .on_conflict(OnConflict::column(Column::Provider).update_column(Column::Payload).to_owned())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn load_breaker(&self, provider: &str) -> StorageResult<Option<BreakerSnapshot>> {
        use entities::breaker_states::Column;

        let row = entities::BreakerStates::find()
            .filter(Column::Provider.eq(provider))
            .one(&self.db)
            .await?;
        row.map(|row| Ok(serde_json::from_value(row.payload)?)).transpose()
    }
}

fn kind_key(kind: QuotaKind) -> &'static str {
    match kind {
        QuotaKind::Requests => "requests",
        QuotaKind::Tokens => "tokens",
        QuotaKind::Cost => "cost",
    }
}
