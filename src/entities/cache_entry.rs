use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub mod search_type {
    pub const KEYWORD: &str = "keyword";
    pub const MPN: &str = "mpn";
}

/// A cached distributor response. Uniqueness is on (search_term, search_type);
/// on re-insert the newest row wins.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mouser_api_cache")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub search_term: String,
    pub search_type: String,
    pub response_data: String,
    pub cached_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
