use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: String,
    pub quantity: i32,
    pub description: String,
    pub package: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
    #[sea_orm(has_many = "super::bom_item_match::Entity")]
    BomItemMatch,
    #[sea_orm(has_many = "super::potential_bom_match::Entity")]
    PotentialBomMatch,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
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
