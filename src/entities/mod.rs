//! Entity model exchanged with the test-management workspace
//!
//! - [`EntityRef`] - minimal reference to an existing remote entity (id, type, name, email)
//! - [`EntityModel`] - a field set ready for submission; only populated fields serialize
//! - [`EntityBuilder`] - fluent construction of an [`EntityModel`]
//! - [`FieldValue`] - value of a user-defined extension field

pub mod model;

pub use model::{EntityBuilder, EntityModel, EntityRef, FieldValue, RefList};

/// Collection names of the workspace API
pub mod collection {
    pub const PHASES: &str = "phases";
    pub const RELEASES: &str = "releases";
    pub const FEATURES: &str = "features";
    pub const USER_TAGS: &str = "user_tags";
    pub const USER_STORIES: &str = "stories";
    pub const USERS: &str = "workspace_users";
    pub const LIST_NODES: &str = "list_nodes";
    pub const MANUAL_TESTS: &str = "manual_tests";
    pub const PRODUCT_AREAS: &str = "product_areas";
}

/// Field names used in queries and entity payloads
pub mod field {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const EMAIL: &str = "email";
    pub const PARENT: &str = "parent";
    pub const ENTITY: &str = "entity";
    pub const LIST_ROOT: &str = "list_root";
    pub const LOGICAL_NAME: &str = "logical_name";
}

/// Entity type tags
pub mod kind {
    /// Type assigned to covered content, whatever its concrete backlog type
    pub const WORK_ITEM: &str = "work_item";
    pub const USER_TAG: &str = "user_tag";
    pub const PRODUCT_AREA: &str = "product_area";
    pub const MANUAL_TEST: &str = "test_manual";
}
