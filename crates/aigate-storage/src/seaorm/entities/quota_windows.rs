use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "quota_windows")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "quota_window_principal_kind")]
    pub principal: String,
    #[sea_orm(unique_key = "quota_window_principal_kind")]
    pub kind: String,
    pub payload: Json,
}

impl ActiveModelBehavior for ActiveModel {}
