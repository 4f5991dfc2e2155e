//! In-process workspace
//!
//! Keeps every collection in memory behind a mutex. Records can be seeded
//! directly, creations get sequential ids, and uploaded scripts are kept per
//! test. Individual creates, queries and script uploads can be made to fail.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::entities::{collection, field, kind, EntityModel};

use super::{Query, RemoteError, RemoteRecord, Workspace};

const FIRST_ID: u64 = 1001;

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Vec<RemoteRecord>>,
    scripts: HashMap<String, String>,
    next_id: u64,
    fail_create_names: HashSet<String>,
    fail_script_ids: HashSet<String>,
    fail_queries: HashSet<String>,
    create_calls: Vec<String>,
}

impl State {
    fn allocate_id(&mut self) -> String {
        if self.next_id < FIRST_ID {
            self.next_id = FIRST_ID;
        }
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }
}

/// [`Workspace`] held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    state: Mutex<State>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is and return its id
    ///
    /// A record without an id gets the next sequential one; a record without
    /// a type gets the type implied by the collection.
    pub fn seed(&self, collection: &str, record: Value) -> String {
        let mut state = self.state.lock();
        let mut map = match record {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let id = match map.get(field::ID).and_then(super::value_text) {
            Some(id) => id,
            None => {
                let id = state.allocate_id();
                map.insert(field::ID.to_string(), Value::String(id.clone()));
                id
            }
        };
        if !map.contains_key(field::TYPE) {
            map.insert(
                field::TYPE.to_string(),
                Value::String(type_for_collection(collection).to_string()),
            );
        }

        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(RemoteRecord::new(map));
        id
    }

    /// Make every create of an entity with this name fail
    pub fn fail_create_named(&self, name: &str) {
        self.state.lock().fail_create_names.insert(name.to_string());
    }

    /// Make the script upload for this test id fail
    pub fn fail_script_for(&self, test_id: &str) {
        self.state.lock().fail_script_ids.insert(test_id.to_string());
    }

    /// Make every query against this collection fail
    pub fn fail_queries_on(&self, collection: &str) {
        self.state.lock().fail_queries.insert(collection.to_string());
    }

    /// All records of a collection, seeded and created
    pub fn records(&self, collection: &str) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// First record of a collection with the given name
    pub fn find_by_name(&self, collection: &str, name: &str) -> Option<RemoteRecord> {
        let query = Query::eq(field::NAME, name);
        self.records(collection)
            .into_iter()
            .find(|record| query.matches(record))
    }

    /// Number of create calls made against a collection, failed ones included
    pub fn create_calls(&self, collection: &str) -> usize {
        self.state
            .lock()
            .create_calls
            .iter()
            .filter(|c| c.as_str() == collection)
            .count()
    }

    /// Raw request body of the last script uploaded for a test
    pub fn script_body(&self, test_id: &str) -> Option<String> {
        self.state.lock().scripts.get(test_id).cloned()
    }

    /// Test ids that received a script
    pub fn scripted_tests(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().scripts.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Workspace for MemoryWorkspace {
    fn query(
        &self,
        collection: &str,
        fields: &[&str],
        filter: Option<&Query>,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        let state = self.state.lock();
        if state.fail_queries.contains(collection) {
            return Err(RemoteError::Rejected(format!(
                "query on {} rejected",
                collection
            )));
        }

        let records = state
            .collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| filter.map_or(true, |q| q.matches(record)))
                    .map(|record| project(record, fields))
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }

    fn create(&self, collection: &str, entity: &EntityModel) -> Result<RemoteRecord, RemoteError> {
        let mut state = self.state.lock();
        state.create_calls.push(collection.to_string());

        if let Some(name) = &entity.name {
            if state.fail_create_names.contains(name) {
                return Err(RemoteError::Rejected(format!(
                    "creating '{}' in {} rejected",
                    name, collection
                )));
            }
        }

        let mut map = match entity.to_json() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = state.allocate_id();
        map.insert(field::ID.to_string(), Value::String(id));
        if !map.contains_key(field::TYPE) {
            map.insert(
                field::TYPE.to_string(),
                Value::String(type_for_collection(collection).to_string()),
            );
        }

        let record = RemoteRecord::new(map);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    fn put_script(&self, test_id: &str, body: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        if state.fail_script_ids.contains(test_id) {
            return Err(RemoteError::Rejected(format!(
                "script upload for test {} rejected",
                test_id
            )));
        }
        state.scripts.insert(test_id.to_string(), body.to_string());
        Ok(())
    }
}

/// Keep id, type and the requested fields
fn project(record: &RemoteRecord, fields: &[&str]) -> RemoteRecord {
    let mut map = Map::new();
    for (key, value) in record.fields() {
        if key == field::ID || key == field::TYPE || fields.contains(&key.as_str()) {
            map.insert(key.clone(), value.clone());
        }
    }
    RemoteRecord::new(map)
}

fn type_for_collection(collection_name: &str) -> &str {
    match collection_name {
        collection::MANUAL_TESTS => kind::MANUAL_TEST,
        collection::PRODUCT_AREAS => kind::PRODUCT_AREA,
        collection::USER_TAGS => kind::USER_TAG,
        collection::USERS => "workspace_user",
        collection::PHASES => "phase",
        collection::RELEASES => "release",
        collection::USER_STORIES => "story",
        collection::FEATURES => "feature",
        collection::LIST_NODES => "list_node",
        other => other,
    }
}
