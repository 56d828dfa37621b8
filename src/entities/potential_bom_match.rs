use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub mod selection_state {
    pub const PROPOSED: &str = "proposed";
    pub const SELECTED: &str = "selected";
    pub const REJECTED: &str = "rejected";
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "potential_bom_matches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub bom_item_id: i32,
    pub rank: i32,
    pub manufacturer_part_number: String,
    pub reason: Option<String>,
    pub selection_state: String,
    #[sea_orm(nullable)]
    pub component_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bom_item::Entity",
        from = "Column::BomItemId",
        to = "super::bom_item::Column::Id",
        on_delete = "Cascade"
    )]
    BomItem,
    #[sea_orm(
        belongs_to = "super::component::Entity",
        from = "Column::ComponentId",
        to = "super::component::Column::Id",
        on_delete = "NoAction"
    )]
    Component,
}

impl Related<super::bom_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomItem.def()
    }
}

impl Related<super::component::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Component.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
