use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MouserApiCache::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MouserApiCache::Id)
                            .integer()
                            .primary_key()
                            .auto_increment()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MouserApiCache::SearchTerm).string().not_null())
                    .col(ColumnDef::new(MouserApiCache::SearchType).string().not_null())
                    .col(ColumnDef::new(MouserApiCache::ResponseData).text().not_null())
                    .col(ColumnDef::new(MouserApiCache::CachedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_mouser_api_cache_term_type")
                    .table(MouserApiCache::Table)
                    .col(MouserApiCache::SearchTerm)
                    .col(MouserApiCache::SearchType)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(MouserApiCache::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
pub enum MouserApiCache {
    Table,
    Id,
    SearchTerm,
    SearchType,
    ResponseData,
    CachedAt,
}
