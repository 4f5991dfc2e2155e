//! Reference resolution for test rows
//!
//! Every reference field of a row resolves to an entity that exists in the
//! workspace, a configured default, or nothing at all. Misses are logged and
//! never fail the row; the only exception is an application module that could
//! not be created, which abandons the test.

use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::entities::{collection, kind, EntityBuilder, EntityRef};
use crate::remote::{requests, RemoteError, Workspace};
use crate::sheet::ImportRow;

use super::lookup::LookupCache;

/// Valid range of estimated durations, in minutes
pub const ESTIMATED_DURATION_RANGE: std::ops::RangeInclusive<i64> = 1..=7000;

/// A test that cannot be built
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("test has no name")]
    MissingName,

    #[error("failed to create application module '{name}': {source}")]
    ModuleCreate {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("created application module '{0}' came back without an id")]
    ModuleIncomplete(String),
}

/// Split a comma-separated cell into trimmed items
pub(crate) fn split_list(cell: &str) -> impl Iterator<Item = &str> {
    cell.split(',').map(str::trim)
}

fn push_unique(list: &mut Vec<EntityRef>, entity: EntityRef) {
    if !list.iter().any(|e| e.id == entity.id) {
        list.push(entity);
    }
}

/// Resolves a row's reference fields against the lookup cache
pub struct Resolver<'a> {
    ws: &'a dyn Workspace,
    cache: &'a mut LookupCache,
}

impl<'a> Resolver<'a> {
    pub fn new(ws: &'a dyn Workspace, cache: &'a mut LookupCache) -> Self {
        Self { ws, cache }
    }

    pub fn ws(&self) -> &'a dyn Workspace {
        self.ws
    }

    pub fn cache(&mut self) -> &mut LookupCache {
        &mut *self.cache
    }

    /// Owner by email; blank or unknown falls back to the default user
    pub fn owner(&self, row: &ImportRow<'_>) -> EntityRef {
        match row.owner() {
            Some(email) => self.user_or_default(row, "owner", email),
            None => {
                warn!(unique_id = %row.label(), "test has no owner, using the default user");
                self.cache.default_user().clone()
            }
        }
    }

    /// Designer by email; blank leaves the field unset
    pub fn designer(&self, row: &ImportRow<'_>) -> Option<EntityRef> {
        row.designer()
            .map(|email| self.user_or_default(row, "designer", email))
    }

    fn user_or_default(&self, row: &ImportRow<'_>, field: &str, email: &str) -> EntityRef {
        match self.cache.user(email) {
            Some(user) => user.clone(),
            None => {
                warn!(
                    unique_id = %row.label(),
                    field,
                    email,
                    "user not found, using the default user"
                );
                self.cache.default_user().clone()
            }
        }
    }

    /// Phase by name; unknown phases are left for the server to default
    pub fn phase(&self, row: &ImportRow<'_>) -> Option<EntityRef> {
        let name = row.phase()?;
        let phase = self.cache.phase(name).cloned();
        if phase.is_none() {
            warn!(
                unique_id = %row.label(),
                phase = name,
                "phase not found, the server default will apply"
            );
        }
        phase
    }

    /// Application modules, creating missing ones under the root module
    ///
    /// A blank column or an empty name resolves to the root module.
    pub fn product_areas(&mut self, row: &ImportRow<'_>) -> Result<Vec<EntityRef>, ResolveError> {
        let Some(cell) = row.product_areas() else {
            warn!(
                unique_id = %row.label(),
                "test has no application module, using the root module"
            );
            return Ok(vec![self.cache.module_root().clone()]);
        };

        let mut modules = Vec::new();
        for name in split_list(cell) {
            let module = if name.is_empty() {
                self.cache.module_root().clone()
            } else {
                self.module(name)?
            };
            push_unique(&mut modules, module);
        }
        Ok(modules)
    }

    fn module(&mut self, name: &str) -> Result<EntityRef, ResolveError> {
        if let Some(module) = self.cache.module(name) {
            return Ok(module.clone());
        }

        let entity = EntityBuilder::new()
            .with_name(name)
            .with_parent(self.cache.module_root().clone())
            .build();
        let record = self
            .ws
            .create(collection::PRODUCT_AREAS, &entity)
            .map_err(|source| ResolveError::ModuleCreate {
                name: name.to_string(),
                source,
            })?;

        let mut module = EntityRef::from_record(&record)
            .ok_or_else(|| ResolveError::ModuleIncomplete(name.to_string()))?;
        if module.name.is_none() {
            module.name = Some(name.to_string());
        }
        debug!(module = name, id = %module.id, "created application module");
        self.cache.insert_module(name, module.clone());
        Ok(module)
    }

    /// Test types by name; a blank column uses the default test type
    ///
    /// Unknown names are dropped individually. `None` when nothing resolved.
    pub fn test_types(&self, row: &ImportRow<'_>) -> Option<Vec<EntityRef>> {
        let Some(cell) = row.test_type() else {
            let default = self.cache.default_test_type().cloned();
            if default.is_some() {
                warn!(unique_id = %row.label(), "test has no test type, using the default");
            }
            return default.map(|t| vec![t]);
        };

        let mut types = Vec::new();
        for name in split_list(cell).filter(|n| !n.is_empty()) {
            match self.cache.test_type(name) {
                Some(t) => push_unique(&mut types, t.clone()),
                None => debug!(unique_id = %row.label(), test_type = name, "unknown test type dropped"),
            }
        }
        (!types.is_empty()).then_some(types)
    }

    /// User tags by name, creating missing ones
    pub fn user_tags(&mut self, row: &ImportRow<'_>) -> Option<Vec<EntityRef>> {
        let cell = row.user_tags()?;

        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        for name in split_list(cell).filter(|n| !n.is_empty()) {
            if !seen.insert(name) {
                continue;
            }
            if let Some(tag) = self.cache.user_tag(name) {
                tags.push(tag.clone());
                continue;
            }
            match self.create_user_tag(name) {
                Ok(tag) => tags.push(tag),
                Err(e) => warn!(
                    unique_id = %row.label(),
                    tag = name,
                    error = %e,
                    "failed to create user tag, dropped"
                ),
            }
        }
        (!tags.is_empty()).then_some(tags)
    }

    fn create_user_tag(&mut self, name: &str) -> Result<EntityRef, RemoteError> {
        let entity = EntityBuilder::new()
            .with_name(name)
            .with_type(kind::USER_TAG)
            .build();
        let record = self.ws.create(collection::USER_TAGS, &entity)?;
        let mut tag = EntityRef::from_record(&record).ok_or_else(|| {
            RemoteError::Response(format!("created user tag '{}' has no id", name))
        })?;
        if tag.name.is_none() {
            tag.name = Some(name.to_string());
        }
        debug!(tag = name, id = %tag.id, "created user tag");
        self.cache.insert_user_tag(name, tag.clone());
        Ok(tag)
    }

    /// Backlog items by numeric id, stories first, then features
    pub fn covered_content(&self, row: &ImportRow<'_>) -> Option<Vec<EntityRef>> {
        let cell = row.covered_content()?;

        let mut items = Vec::new();
        for raw in split_list(cell).filter(|s| !s.is_empty()) {
            let id = match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => (value.trunc() as i64).to_string(),
                _ => {
                    warn!(unique_id = %row.label(), value = raw, "covered content id is not a number, dropped");
                    continue;
                }
            };

            match self.work_item(&id) {
                Ok(Some(item)) => push_unique(&mut items, item),
                Ok(None) => warn!(
                    unique_id = %row.label(),
                    id = %id,
                    "no story or feature with this id, dropped"
                ),
                Err(e) => warn!(
                    unique_id = %row.label(),
                    id = %id,
                    error = %e,
                    "covered content lookup failed, dropped"
                ),
            }
        }
        (!items.is_empty()).then_some(items)
    }

    fn work_item(&self, id: &str) -> Result<Option<EntityRef>, RemoteError> {
        let found = match requests::entity_by_id(self.ws, collection::USER_STORIES, id)? {
            Some(story) => Some(story),
            None => requests::entity_by_id(self.ws, collection::FEATURES, id)?,
        };
        Ok(found.map(|mut item| {
            item.entity_type = kind::WORK_ITEM.to_string();
            item
        }))
    }

    /// Estimated duration within the accepted range
    pub fn estimated_duration(&self, row: &ImportRow<'_>) -> Option<i64> {
        let minutes = row.estimated_duration()?;
        if ESTIMATED_DURATION_RANGE.contains(&minutes) {
            Some(minutes)
        } else {
            warn!(
                unique_id = %row.label(),
                minutes,
                "estimated_duration must be between 1 and 7000, the field will be left blank"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::MigrationSettings;
    use crate::migration::lookup::tests::seeded_workspace;
    use crate::remote::MemoryWorkspace;
    use crate::sheet::{Column, ColumnMap, SheetRow};
    use serde_json::json;

    fn header() -> Vec<String> {
        Column::all().iter().map(|c| c.header().to_string()).collect()
    }

    fn row(columns: &ColumnMap, values: &[(Column, &str)]) -> SheetRow {
        let mut cells = vec![String::new(); Column::all().len()];
        for (column, value) in values {
            cells[columns.index(*column)] = value.to_string();
        }
        SheetRow::from_texts(2, &cells)
    }

    fn setup() -> (MemoryWorkspace, LookupCache, ColumnMap) {
        let ws = seeded_workspace();
        let cache = LookupCache::build(&ws, &MigrationSettings::new("qa@example.com")).unwrap();
        let columns = ColumnMap::from_header(&header()).unwrap();
        (ws, cache, columns)
    }

    #[test]
    fn test_owner_and_designer() {
        let (ws, mut cache, columns) = setup();
        let resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[(Column::Owner, "ANA@example.com")]);
        let r = columns.row(&r);
        assert_eq!(resolver.owner(&r).id, "2");
        assert!(resolver.designer(&r).is_none());

        let r = row(
            &columns,
            &[(Column::Owner, "ghost@example.com"), (Column::Designer, "ghost@example.com")],
        );
        let r = columns.row(&r);
        assert_eq!(resolver.owner(&r).id, "1");
        assert_eq!(resolver.designer(&r).unwrap().id, "1");

        let r = row(&columns, &[]);
        assert_eq!(resolver.owner(&columns.row(&r)).id, "1");
    }

    #[test]
    fn test_phase() {
        let (ws, mut cache, columns) = setup();
        let resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[(Column::Phase, "New")]);
        assert_eq!(resolver.phase(&columns.row(&r)).unwrap().id, "10");

        let r = row(&columns, &[(Column::Phase, "Retired")]);
        assert!(resolver.phase(&columns.row(&r)).is_none());
    }

    #[test]
    fn test_modules_created_once() {
        let (ws, mut cache, columns) = setup();
        let mut resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[(Column::ProductAreas, "Login, Billing")]);
        let first = resolver.product_areas(&columns.row(&r)).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "31");

        let r = row(&columns, &[(Column::ProductAreas, "Billing")]);
        let second = resolver.product_areas(&columns.row(&r)).unwrap();
        assert_eq!(second[0].id, first[1].id);
        assert_eq!(ws.create_calls(collection::PRODUCT_AREAS), 1);

        let created = ws.find_by_name(collection::PRODUCT_AREAS, "Billing").unwrap();
        assert_eq!(
            created.get("parent").and_then(|p| p.get("id")),
            Some(&json!("30"))
        );
    }

    #[test]
    fn test_modules_blank_and_empty_names() {
        let (ws, mut cache, columns) = setup();
        let mut resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[]);
        let modules = resolver.product_areas(&columns.row(&r)).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].id, "30");

        let r = row(&columns, &[(Column::ProductAreas, "Login,,")]);
        let modules = resolver.product_areas(&columns.row(&r)).unwrap();
        let ids: Vec<&str> = modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["31", "30"]);
    }

    #[test]
    fn test_module_create_failure_is_fatal_to_test() {
        let (ws, mut cache, columns) = setup();
        ws.fail_create_named("Payments");
        let mut resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[(Column::ProductAreas, "Payments")]);
        assert!(matches!(
            resolver.product_areas(&columns.row(&r)),
            Err(ResolveError::ModuleCreate { .. })
        ));
    }

    #[test]
    fn test_test_types() {
        let (ws, mut cache, columns) = setup();
        let resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[]);
        assert_eq!(resolver.test_types(&columns.row(&r)).unwrap()[0].id, "41");

        let r = row(&columns, &[(Column::TestType, "Acceptance, Exploratory")]);
        let types = resolver.test_types(&columns.row(&r)).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].id, "42");

        let r = row(&columns, &[(Column::TestType, "Exploratory")]);
        assert!(resolver.test_types(&columns.row(&r)).is_none());
    }

    #[test]
    fn test_user_tags_created_and_cached() {
        let (ws, mut cache, columns) = setup();
        ws.fail_create_named("broken");
        let mut resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[(Column::UserTags, "smoke, nightly, nightly, broken")]);
        let tags = resolver.user_tags(&columns.row(&r)).unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.display_name()).collect();
        assert_eq!(names, vec!["smoke", "nightly"]);

        let r = row(&columns, &[(Column::UserTags, "nightly")]);
        let again = resolver.user_tags(&columns.row(&r)).unwrap();
        assert_eq!(again[0].id, tags[1].id);
        assert_eq!(ws.records(collection::USER_TAGS).len(), 2);

        let created = ws.find_by_name(collection::USER_TAGS, "nightly").unwrap();
        assert_eq!(created.text("type").as_deref(), Some("user_tag"));
    }

    #[test]
    fn test_covered_content() {
        let (ws, mut cache, columns) = setup();
        ws.seed(collection::USER_STORIES, json!({"id": "300", "name": "Checkout"}));
        ws.seed(collection::FEATURES, json!({"id": "400", "name": "Payments"}));
        let resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[(Column::CoveredContent, "300.0, 400, abc, 999")]);
        let items = resolver.covered_content(&columns.row(&r)).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "300");
        assert_eq!(items[1].id, "400");
        assert!(items.iter().all(|i| i.entity_type == "work_item"));
    }

    #[test]
    fn test_estimated_duration_range() {
        let (ws, mut cache, columns) = setup();
        let resolver = Resolver::new(&ws, &mut cache);

        let r = row(&columns, &[(Column::EstimatedDuration, "12.7")]);
        assert_eq!(resolver.estimated_duration(&columns.row(&r)), Some(12));

        let r = row(&columns, &[(Column::EstimatedDuration, "0")]);
        assert_eq!(resolver.estimated_duration(&columns.row(&r)), None);

        let r = row(&columns, &[(Column::EstimatedDuration, "7001")]);
        assert_eq!(resolver.estimated_duration(&columns.row(&r)), None);
    }
}
