use sea_orm_migration::prelude::*;

use super::m20240101_000002_create_bom_items_table::BomItems;
use super::m20240101_000003_create_components_table::Components;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BomItemMatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BomItemMatches::Id)
                            .integer()
                            .primary_key()
                            .auto_increment()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BomItemMatches::BomItemId).integer().not_null())
                    .col(ColumnDef::new(BomItemMatches::ComponentId).integer().null())
                    .col(ColumnDef::new(BomItemMatches::MatchStatus).string().not_null())
                    .col(ColumnDef::new(BomItemMatches::MatchedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bom_item_matches_bom_item")
                            .from(BomItemMatches::Table, BomItemMatches::BomItemId)
                            .to(BomItems::Table, BomItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bom_item_matches_component")
                            .from(BomItemMatches::Table, BomItemMatches::ComponentId)
                            .to(Components::Table, Components::Id)
                            .on_delete(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bom_item_matches_bom_item_id")
                    .table(BomItemMatches::Table)
                    .col(BomItemMatches::BomItemId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bom_item_matches_component_id")
                    .table(BomItemMatches::Table)
                    .col(BomItemMatches::ComponentId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(BomItemMatches::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
pub enum BomItemMatches {
    Table,
    Id,
    BomItemId,
    ComponentId,
    MatchStatus,
    MatchedAt,
}
