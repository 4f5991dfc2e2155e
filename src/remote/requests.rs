//! Canned requests the migration issues against a [`Workspace`]

use crate::entities::{collection, field, kind, EntityRef};

use super::{Query, RemoteError, RemoteRecord, Workspace};

fn essential(records: Vec<RemoteRecord>) -> Vec<EntityRef> {
    records.iter().filter_map(EntityRef::from_record).collect()
}

fn first_essential(records: Vec<RemoteRecord>) -> Option<EntityRef> {
    records.iter().find_map(EntityRef::from_record)
}

/// All workspace users, with their emails
pub fn users(ws: &dyn Workspace) -> Result<Vec<EntityRef>, RemoteError> {
    let records = ws.query(collection::USERS, &[field::EMAIL, field::NAME], None)?;
    Ok(records.iter().filter_map(EntityRef::user_from_record).collect())
}

/// Phases that apply to manual tests
pub fn phases(ws: &dyn Workspace) -> Result<Vec<EntityRef>, RemoteError> {
    let filter = Query::eq(field::ENTITY, kind::MANUAL_TEST);
    Ok(essential(ws.query(
        collection::PHASES,
        &[field::NAME],
        Some(&filter),
    )?))
}

pub fn user_tags(ws: &dyn Workspace) -> Result<Vec<EntityRef>, RemoteError> {
    Ok(essential(ws.query(collection::USER_TAGS, &[field::NAME], None)?))
}

/// Every application module, root included
pub fn application_modules(ws: &dyn Workspace) -> Result<Vec<EntityRef>, RemoteError> {
    Ok(essential(ws.query(
        collection::PRODUCT_AREAS,
        &[field::NAME, field::PARENT],
        None,
    )?))
}

/// The application module without a parent
pub fn application_module_root(ws: &dyn Workspace) -> Result<Option<EntityRef>, RemoteError> {
    let filter = Query::is_null(field::PARENT);
    Ok(first_essential(ws.query(
        collection::PRODUCT_AREAS,
        &[field::NAME],
        Some(&filter),
    )?))
}

/// Root node of the list with this name
pub fn list_root(ws: &dyn Workspace, list_name: &str) -> Result<Option<EntityRef>, RemoteError> {
    let filter = Query::eq(field::NAME, list_name);
    Ok(first_essential(ws.query(
        collection::LIST_NODES,
        &[field::NAME, field::LOGICAL_NAME],
        Some(&filter),
    )?))
}

fn list_root_filter(root_id: &str) -> Query {
    Query::nested(field::LIST_ROOT, Query::eq(field::ID, root_id))
}

/// Items of the list rooted at `root_id`
pub fn list_items(ws: &dyn Workspace, root_id: &str) -> Result<Vec<EntityRef>, RemoteError> {
    let filter = list_root_filter(root_id);
    Ok(essential(ws.query(
        collection::LIST_NODES,
        &[field::NAME],
        Some(&filter),
    )?))
}

pub fn list_item(
    ws: &dyn Workspace,
    root_id: &str,
    item_name: &str,
) -> Result<Option<EntityRef>, RemoteError> {
    let filter = list_root_filter(root_id).and(Query::eq(field::NAME, item_name));
    Ok(first_essential(ws.query(
        collection::LIST_NODES,
        &[field::NAME],
        Some(&filter),
    )?))
}

pub fn entity_by_name(
    ws: &dyn Workspace,
    collection_name: &str,
    name: &str,
) -> Result<Option<EntityRef>, RemoteError> {
    let filter = Query::eq(field::NAME, name);
    Ok(first_essential(ws.query(
        collection_name,
        &[field::NAME],
        Some(&filter),
    )?))
}

pub fn user_by_email(ws: &dyn Workspace, email: &str) -> Result<Option<EntityRef>, RemoteError> {
    let filter = Query::eq(field::EMAIL, email);
    let records = ws.query(collection::USERS, &[field::EMAIL, field::NAME], Some(&filter))?;
    Ok(records.iter().find_map(EntityRef::user_from_record))
}

pub fn entity_by_id(
    ws: &dyn Workspace,
    collection_name: &str,
    id: &str,
) -> Result<Option<EntityRef>, RemoteError> {
    let filter = Query::eq(field::ID, id);
    Ok(first_essential(ws.query(
        collection_name,
        &[field::NAME],
        Some(&filter),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryWorkspace;
    use serde_json::json;

    fn workspace() -> MemoryWorkspace {
        let ws = MemoryWorkspace::new();
        ws.seed(collection::PHASES, json!({"id": "1", "name": "New", "entity": "test_manual"}));
        ws.seed(collection::PHASES, json!({"id": "2", "name": "Open", "entity": "defect"}));
        ws.seed(collection::PRODUCT_AREAS, json!({"id": "10", "name": "Root", "parent": null}));
        ws.seed(
            collection::PRODUCT_AREAS,
            json!({"id": "11", "name": "Login", "parent": {"id": "10", "type": "product_area"}}),
        );
        ws.seed(collection::LIST_NODES, json!({"id": "20", "name": "Test_Type", "list_root": null}));
        ws.seed(
            collection::LIST_NODES,
            json!({"id": "21", "name": "End to End", "list_root": {"id": "20", "type": "list_node"}}),
        );
        ws.seed(
            collection::LIST_NODES,
            json!({"id": "22", "name": "Acceptance", "list_root": {"id": "20", "type": "list_node"}}),
        );
        ws
    }

    #[test]
    fn test_phases_only_for_manual_tests() {
        let ws = workspace();
        let phases = phases(&ws).unwrap();
        assert_eq!(phases, vec![EntityRef::new("1", "phase").with_name("New")]);
    }

    #[test]
    fn test_module_root() {
        let ws = workspace();
        let root = application_module_root(&ws).unwrap().unwrap();
        assert_eq!(root.id, "10");
        assert_eq!(application_modules(&ws).unwrap().len(), 2);
    }

    #[test]
    fn test_list_lookups() {
        let ws = workspace();
        let root = list_root(&ws, "Test_Type").unwrap().unwrap();
        assert_eq!(root.id, "20");

        let items = list_items(&ws, &root.id).unwrap();
        assert_eq!(items.len(), 2);

        let item = list_item(&ws, &root.id, "Acceptance").unwrap().unwrap();
        assert_eq!(item.id, "22");
        assert!(list_item(&ws, &root.id, "Missing").unwrap().is_none());
        assert!(list_root(&ws, "No_Such_List").unwrap().is_none());
    }

    #[test]
    fn test_user_lookups() {
        let ws = workspace();
        ws.seed(collection::USERS, json!({"id": "5", "name": "Ana", "email": "ana@example.com"}));

        let all = users(&ws).unwrap();
        assert_eq!(all[0].email.as_deref(), Some("ana@example.com"));
        assert_eq!(user_by_email(&ws, "ana@example.com").unwrap().unwrap().id, "5");
        assert!(user_by_email(&ws, "bo@example.com").unwrap().is_none());
    }

    #[test]
    fn test_entity_by_id_and_name() {
        let ws = workspace();
        ws.seed(collection::USER_STORIES, json!({"id": "300", "name": "Checkout"}));

        let story = entity_by_id(&ws, collection::USER_STORIES, "300").unwrap().unwrap();
        assert_eq!(story.entity_type, "story");
        assert!(entity_by_id(&ws, collection::FEATURES, "300").unwrap().is_none());
        assert_eq!(
            entity_by_name(&ws, collection::PRODUCT_AREAS, "Login").unwrap().unwrap().id,
            "11"
        );
    }
}
