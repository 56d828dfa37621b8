pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_projects_table;
mod m20240101_000002_create_bom_items_table;
mod m20240101_000003_create_components_table;
mod m20240101_000004_create_bom_item_matches_table;
mod m20240101_000005_create_potential_bom_matches_table;
mod m20240101_000006_create_mouser_api_cache_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_projects_table::Migration),
            Box::new(m20240101_000002_create_bom_items_table::Migration),
            Box::new(m20240101_000003_create_components_table::Migration),
            Box::new(m20240101_000004_create_bom_item_matches_table::Migration),
            Box::new(m20240101_000005_create_potential_bom_matches_table::Migration),
            Box::new(m20240101_000006_create_mouser_api_cache_table::Migration),
        ]
    }
}
