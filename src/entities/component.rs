use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A part the system knows how to buy. Shared across projects: at most one
/// row per distributor part number.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "components")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub distributor_part_number: String,
    #[sea_orm(indexed)]
    pub manufacturer_part_number: String,
    pub manufacturer_name: Option<String>,
    pub description: Option<String>,
    pub datasheet_url: Option<String>,
    pub package: Option<String>,
    pub price: Option<Decimal>,
    pub availability: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bom_item_match::Entity")]
    BomItemMatch,
    #[sea_orm(has_many = "super::potential_bom_match::Entity")]
    PotentialBomMatch,
}

impl Related<super::bom_item_match::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomItemMatch.def()
    }
}

impl Related<super::potential_bom_match::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PotentialBomMatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
