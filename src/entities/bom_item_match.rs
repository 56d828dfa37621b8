use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The closed status vocabulary produced by the matching pipeline.
/// Every processed BomItem ends in exactly one of these.
pub mod status {
    pub const MATCHED: &str = "matched";
    pub const SEARCH_TERM_FAILED: &str = "search_term_failed";
    pub const NO_KEYWORD_RESULTS: &str = "no_keyword_results";
    pub const EVALUATION_FAILED: &str = "evaluation_failed";
    pub const MPN_LOOKUP_FAILED: &str = "mpn_lookup_failed";
    pub const COMPONENT_DB_ERROR: &str = "component_db_error";
    pub const LLM_ERROR: &str = "llm_error";
    pub const MOUSER_ERROR: &str = "mouser_error";
    pub const PROCESSING_ERROR: &str = "processing_error";
    pub const DB_SAVE_ERROR: &str = "db_save_error";
    pub const WORKER_UNCAUGHT_EXCEPTION: &str = "worker_uncaught_exception";
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_item_matches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub bom_item_id: i32,
    #[sea_orm(indexed, nullable)]
    pub component_id: Option<i32>,
    pub match_status: String,
    pub matched_at: DateTime<Utc>,
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
