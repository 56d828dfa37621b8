use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Components::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Components::Id)
                            .integer()
                            .primary_key()
                            .auto_increment()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Components::DistributorPartNumber).string().not_null().unique_key())
                    .col(ColumnDef::new(Components::ManufacturerPartNumber).string().not_null())
                    .col(ColumnDef::new(Components::ManufacturerName).string().null())
                    .col(ColumnDef::new(Components::Description).text().null())
                    .col(ColumnDef::new(Components::DatasheetUrl).text().null())
                    .col(ColumnDef::new(Components::Package).string().null())
                    .col(ColumnDef::new(Components::Price).decimal_len(12, 4).null())
                    .col(ColumnDef::new(Components::Availability).string().null())
                    .col(ColumnDef::new(Components::LastUpdated).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_components_manufacturer_part_number")
                    .table(Components::Table)
                    .col(Components::ManufacturerPartNumber)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Components::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
pub enum Components {
    Table,
    Id,
    DistributorPartNumber,
    ManufacturerPartNumber,
    ManufacturerName,
    Description,
    DatasheetUrl,
    Package,
    Price,
    Availability,
    LastUpdated,
}
