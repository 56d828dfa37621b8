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
                    .table(PotentialBomMatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PotentialBomMatches::Id)
                            .integer()
                            .primary_key()
                            .auto_increment()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PotentialBomMatches::BomItemId).integer().not_null())
                    .col(ColumnDef::new(PotentialBomMatches::Rank).integer().not_null())
                    .col(ColumnDef::new(PotentialBomMatches::ManufacturerPartNumber).string().not_null())
                    .col(ColumnDef::new(PotentialBomMatches::Reason).text().null())
                    .col(ColumnDef::new(PotentialBomMatches::SelectionState).string().not_null())
                    .col(ColumnDef::new(PotentialBomMatches::ComponentId).integer().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_potential_bom_matches_bom_item")
                            .from(PotentialBomMatches::Table, PotentialBomMatches::BomItemId)
                            .to(BomItems::Table, BomItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_potential_bom_matches_component")
                            .from(PotentialBomMatches::Table, PotentialBomMatches::ComponentId)
                            .to(Components::Table, Components::Id)
                            .on_delete(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_potential_bom_matches_bom_item_rank")
                    .table(PotentialBomMatches::Table)
                    .col(PotentialBomMatches::BomItemId)
                    .col(PotentialBomMatches::Rank)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(PotentialBomMatches::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
pub enum PotentialBomMatches {
    Table,
    Id,
    BomItemId,
    Rank,
    ManufacturerPartNumber,
    Reason,
    SelectionState,
    ComponentId,
}
