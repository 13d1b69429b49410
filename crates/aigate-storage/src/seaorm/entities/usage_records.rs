use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "usage_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub request_id: String,
    pub principal: String,
    pub provider: Option<String>,
    pub status: String,
    pub completed_at: OffsetDateTime,
    pub payload: Json,
}

impl ActiveModelBehavior for ActiveModel {}
