use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_projects_table::Projects;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BomItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BomItems::Id)
                            .integer()
                            .primary_key()
                            .auto_increment()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BomItems::ProjectId).string().not_null())
                    .col(ColumnDef::new(BomItems::Quantity).integer().not_null())
                    .col(ColumnDef::new(BomItems::Description).text().not_null())
                    .col(ColumnDef::new(BomItems::Package).string().not_null())
                    .col(ColumnDef::new(BomItems::Notes).text().null())
                    .col(ColumnDef::new(BomItems::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bom_items_project")
                            .from(BomItems::Table, BomItems::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bom_items_project_id")
                    .table(BomItems::Table)
                    .col(BomItems::ProjectId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(BomItems::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
pub enum BomItems {
    Table,
    Id,
    ProjectId,
    Quantity,
    Description,
    Package,
    Notes,
    CreatedAt,
}
