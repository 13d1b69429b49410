use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "breaker_states")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "breaker_state_provider")]
    pub provider: String,
    pub payload: Json,
}

impl ActiveModelBehavior for ActiveModel {}
