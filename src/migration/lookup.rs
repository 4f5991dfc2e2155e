//! Lookup cache
//!
//! Natural-key indexes of remote entities, fetched once before any row is
//! processed. Releases and list items are fetched on first use and memoized.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::MigrationSettings;
use crate::core::MigrationStatus;
use crate::entities::{collection, EntityRef};
use crate::remote::{requests, RemoteError, Workspace};

/// List holding the test type values
pub const TEST_TYPE_LIST: &str = "Test_Type";

/// Failure to build one of the cache's indexes
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load users: {0}")]
    Users(#[source] RemoteError),

    #[error("default user '{0}' does not exist in the workspace")]
    DefaultUserMissing(String),

    #[error("failed to load phases: {0}")]
    Phases(#[source] RemoteError),

    #[error("failed to load user tags: {0}")]
    UserTags(#[source] RemoteError),

    #[error("failed to load application modules: {0}")]
    Modules(#[source] RemoteError),

    #[error("the workspace has no root application module")]
    ModuleRootMissing,

    #[error("failed to load test types: {0}")]
    TestTypes(#[source] RemoteError),

    #[error("list '{0}' does not exist in the workspace")]
    ListMissing(String),
}

impl InitError {
    /// Run status reported for this failure
    pub fn status(&self) -> MigrationStatus {
        match self {
            InitError::Phases(_) => MigrationStatus::InitPhasesFailed,
            InitError::UserTags(_) => MigrationStatus::InitUserTagsFailed,
            _ => MigrationStatus::InitEntitiesFailed,
        }
    }
}

fn by_name(entities: Vec<EntityRef>) -> HashMap<String, EntityRef> {
    let mut map = HashMap::new();
    for entity in entities {
        if let Some(name) = entity.name.clone() {
            map.entry(name).or_insert(entity);
        }
    }
    map
}

#[derive(Debug, Clone)]
pub struct LookupCache {
    /// Keyed by lowercase email
    users: HashMap<String, EntityRef>,
    default_user: EntityRef,
    phases: HashMap<String, EntityRef>,
    user_tags: HashMap<String, EntityRef>,
    modules: HashMap<String, EntityRef>,
    module_root: EntityRef,
    test_types: HashMap<String, EntityRef>,
    default_test_type: Option<EntityRef>,
    default_release_name: String,
    releases: HashMap<String, Option<EntityRef>>,
    list_roots: HashMap<String, Option<EntityRef>>,
    list_items: HashMap<(String, String), Option<EntityRef>>,
}

impl LookupCache {
    /// Fetch every eager index; any failure is fatal to the run
    pub fn build(ws: &dyn Workspace, settings: &MigrationSettings) -> Result<Self, InitError> {
        let mut users = HashMap::new();
        for user in requests::users(ws).map_err(InitError::Users)? {
            if let Some(email) = user.email.as_deref() {
                users.entry(email.to_lowercase()).or_insert_with(|| user.clone());
            }
        }
        let default_user = users
            .get(&settings.default_user.to_lowercase())
            .cloned()
            .ok_or_else(|| InitError::DefaultUserMissing(settings.default_user.clone()))?;
        debug!(count = users.len(), "loaded users");

        let phases = by_name(requests::phases(ws).map_err(InitError::Phases)?);
        debug!(count = phases.len(), "loaded phases");

        let user_tags = by_name(requests::user_tags(ws).map_err(InitError::UserTags)?);
        debug!(count = user_tags.len(), "loaded user tags");

        let module_root = requests::application_module_root(ws)
            .map_err(InitError::Modules)?
            .ok_or(InitError::ModuleRootMissing)?;
        let mut modules = by_name(requests::application_modules(ws).map_err(InitError::Modules)?);
        if let Some(name) = module_root.name.clone() {
            modules.insert(name, module_root.clone());
        }
        debug!(count = modules.len(), "loaded application modules");

        let list_root = requests::list_root(ws, TEST_TYPE_LIST)
            .map_err(InitError::TestTypes)?
            .ok_or_else(|| InitError::ListMissing(TEST_TYPE_LIST.to_string()))?;
        let test_types = by_name(
            requests::list_items(ws, &list_root.id).map_err(InitError::TestTypes)?,
        );
        let default_test_type = test_types.get(&settings.default_test_type).cloned();
        if default_test_type.is_none() {
            warn!(
                test_type = %settings.default_test_type,
                "default test type not found, tests without a test type will have none"
            );
        }
        debug!(count = test_types.len(), "loaded test types");

        info!(
            users = users.len(),
            phases = phases.len(),
            user_tags = user_tags.len(),
            modules = modules.len(),
            test_types = test_types.len(),
            "lookup tables ready"
        );

        let mut list_roots = HashMap::new();
        list_roots.insert(TEST_TYPE_LIST.to_string(), Some(list_root));

        Ok(Self {
            users,
            default_user,
            phases,
            user_tags,
            modules,
            module_root,
            test_types,
            default_test_type,
            default_release_name: settings.default_release.clone(),
            releases: HashMap::new(),
            list_roots,
            list_items: HashMap::new(),
        })
    }

    /// User by email, case-insensitively
    pub fn user(&self, email: &str) -> Option<&EntityRef> {
        self.users.get(&email.trim().to_lowercase())
    }

    pub fn default_user(&self) -> &EntityRef {
        &self.default_user
    }

    pub fn phase(&self, name: &str) -> Option<&EntityRef> {
        self.phases.get(name)
    }

    pub fn user_tag(&self, name: &str) -> Option<&EntityRef> {
        self.user_tags.get(name)
    }

    pub fn insert_user_tag(&mut self, name: &str, tag: EntityRef) {
        self.user_tags.insert(name.to_string(), tag);
    }

    pub fn module(&self, name: &str) -> Option<&EntityRef> {
        self.modules.get(name)
    }

    pub fn insert_module(&mut self, name: &str, module: EntityRef) {
        self.modules.insert(name.to_string(), module);
    }

    pub fn module_root(&self) -> &EntityRef {
        &self.module_root
    }

    pub fn test_type(&self, name: &str) -> Option<&EntityRef> {
        self.test_types.get(name)
    }

    pub fn default_test_type(&self) -> Option<&EntityRef> {
        self.default_test_type.as_ref()
    }

    /// Release by name, memoized; lookup errors are not memoized
    pub fn release(
        &mut self,
        ws: &dyn Workspace,
        name: &str,
    ) -> Result<Option<EntityRef>, RemoteError> {
        if let Some(cached) = self.releases.get(name) {
            return Ok(cached.clone());
        }
        let release = requests::entity_by_name(ws, collection::RELEASES, name)?;
        self.releases.insert(name.to_string(), release.clone());
        Ok(release)
    }

    pub fn default_release(&mut self, ws: &dyn Workspace) -> Result<Option<EntityRef>, RemoteError> {
        let name = self.default_release_name.clone();
        self.release(ws, &name)
    }

    /// Root node of a list, memoized
    pub fn list_root(
        &mut self,
        ws: &dyn Workspace,
        list: &str,
    ) -> Result<Option<EntityRef>, RemoteError> {
        if let Some(cached) = self.list_roots.get(list) {
            return Ok(cached.clone());
        }
        let root = requests::list_root(ws, list)?;
        if root.is_none() {
            warn!(list, "list not found in the workspace");
        }
        self.list_roots.insert(list.to_string(), root.clone());
        Ok(root)
    }

    /// Item of a list by name, memoized; `None` when the list or item is missing
    pub fn list_item(
        &mut self,
        ws: &dyn Workspace,
        list: &str,
        item: &str,
    ) -> Result<Option<EntityRef>, RemoteError> {
        let key = (list.to_string(), item.to_string());
        if let Some(cached) = self.list_items.get(&key) {
            return Ok(cached.clone());
        }
        let Some(root) = self.list_root(ws, list)? else {
            return Ok(None);
        };
        let found = requests::list_item(ws, &root.id, item)?;
        self.list_items.insert(key, found.clone());
        Ok(found)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn user_tag_count(&self) -> usize {
        self.user_tags.len()
    }
}
