use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bom_item::Entity")]
    BomItem,
}

impl Related<super::bom_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Status vocabulary and the legal transition table (see `Store::update_project_status`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectStatus {
    Queued,
    Processing,
    Finished,
    Error,
    Cancelled,
}

impl ProjectStatus {
    pub const QUEUED: &'static str = "queued";
    pub const PROCESSING: &'static str = "processing";
    pub const FINISHED: &'static str = "finished";
    pub const ERROR: &'static str = "error";
    pub const CANCELLED: &'static str = "cancelled";

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Queued => Self::QUEUED,
            ProjectStatus::Processing => Self::PROCESSING,
            ProjectStatus::Finished => Self::FINISHED,
            ProjectStatus::Error => Self::ERROR,
            ProjectStatus::Cancelled => Self::CANCELLED,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            Self::QUEUED => Some(ProjectStatus::Queued),
            Self::PROCESSING => Some(ProjectStatus::Processing),
            Self::FINISHED => Some(ProjectStatus::Finished),
            Self::ERROR => Some(ProjectStatus::Error),
            Self::CANCELLED => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }

    /// The legal status transition table. Any pair not listed here is illegal.
    pub fn can_transition_to(self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Cancelled)
                | (Processing, Finished)
                | (Processing, Error)
                | (Processing, Cancelled)
                | (Finished, Cancelled)
                | (Error, Cancelled)
        )
    }
}
