pub mod project;
pub mod bom_item;
pub mod component;
pub mod bom_item_match;
pub mod potential_bom_match;
pub mod cache_entry;

pub mod prelude {
    pub use super::bom_item::Entity as BomItem;
    pub use super::bom_item_match::Entity as BomItemMatch;
    pub use super::cache_entry::Entity as CacheEntry;
    pub use super::component::Entity as Component;
    pub use super::potential_bom_match::Entity as PotentialBomMatch;
    pub use super::project::Entity as Project;
}
