use crate::constants::permissions::DEFAULTS;
use crate::entities::permissions;
use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(Permissions)
            .columns([permissions::Column::Key, permissions::Column::Description])
            .to_owned();

        for (key, description) in DEFAULTS {
            insert.values_panic([(*key).into(), (*description).into()]);
        }

        manager.exec_stmt(insert).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let keys: Vec<&str> = DEFAULTS.iter().map(|(key, _)| *key).collect();

        let delete = sea_orm_migration::sea_query::Query::delete()
            .from_table(Permissions)
            .and_where(Expr::col(permissions::Column::Key).is_in(keys))
            .to_owned();

        manager.exec_stmt(delete).await
    }
}
