//! Entity references, submission models and extension-field values

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::remote::RemoteRecord;

use super::field;

/// Minimal reference to a remote entity
///
/// This is what the lookup cache stores: just enough to point at the entity
/// from another entity's reference field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,

    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            name: None,
            email: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Essential fields (id, type, name) of a fetched record
    ///
    /// Returns `None` when the record has no id or type.
    pub fn from_record(record: &RemoteRecord) -> Option<Self> {
        let id = record.text(field::ID)?;
        let entity_type = record.text(field::TYPE)?;
        Some(Self {
            id,
            entity_type,
            name: record.text(field::NAME),
            email: None,
        })
    }

    /// Essential fields plus the email, for users
    pub fn user_from_record(record: &RemoteRecord) -> Option<Self> {
        let mut user = Self::from_record(record)?;
        user.email = record.text(field::EMAIL);
        Some(user)
    }

    /// Name, falling back to the id for display
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Multi-reference payload: `{"data": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefList {
    pub data: Vec<EntityRef>,
}

impl RefList {
    pub fn new(data: Vec<EntityRef>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<EntityRef>> for RefList {
    fn from(data: Vec<EntityRef>) -> Self {
        Self { data }
    }
}

/// Value of a user-defined extension field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Reference(EntityRef),
    References(Vec<EntityRef>),
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Integer(n) => serializer.serialize_i64(*n),
            FieldValue::Float(n) => serializer.serialize_f64(*n),
            FieldValue::Boolean(b) => serializer.serialize_bool(*b),
            FieldValue::Date(d) => {
                serializer.serialize_str(&d.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            FieldValue::Reference(r) => r.serialize(serializer),
            FieldValue::References(refs) => RefList::new(refs.clone()).serialize(serializer),
        }
    }
}

/// Entity payload for submission
///
/// Every member is optional; unset members are omitted from the serialized
/// form, so the builder never injects defaults of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub designer: Option<EntityRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<EntityRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_type: Option<RefList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_areas: Option<RefList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub covered_content: Option<RefList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_tags: Option<RefList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<i64>,

    /// User-defined fields keyed by field name
    #[serde(flatten)]
    pub extensions: BTreeMap<String, FieldValue>,
}

impl EntityModel {
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    /// Serialize to a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        // Serializing plain strings, numbers and maps cannot fail
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Names of the populated fields, in serialization order
    pub fn field_names(&self) -> Vec<String> {
        match self.to_json() {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

/// Fluent builder for [`EntityModel`]
#[derive(Debug, Clone, Default)]
pub struct EntityBuilder {
    model: EntityModel,
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.model.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.model.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.model.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.model.description = Some(description.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.model.email = Some(email.into());
        self
    }

    pub fn with_owner(mut self, owner: EntityRef) -> Self {
        self.model.owner = Some(owner);
        self
    }

    pub fn with_designer(mut self, designer: EntityRef) -> Self {
        self.model.designer = Some(designer);
        self
    }

    pub fn with_phase(mut self, phase: EntityRef) -> Self {
        self.model.phase = Some(phase);
        self
    }

    pub fn with_parent(mut self, parent: EntityRef) -> Self {
        self.model.parent = Some(parent);
        self
    }

    pub fn with_test_types(mut self, test_types: Vec<EntityRef>) -> Self {
        self.model.test_type = Some(test_types.into());
        self
    }

    pub fn with_product_areas(mut self, product_areas: Vec<EntityRef>) -> Self {
        self.model.product_areas = Some(product_areas.into());
        self
    }

    pub fn with_covered_content(mut self, covered: Vec<EntityRef>) -> Self {
        self.model.covered_content = Some(covered.into());
        self
    }

    pub fn with_user_tags(mut self, user_tags: Vec<EntityRef>) -> Self {
        self.model.user_tags = Some(user_tags.into());
        self
    }

    pub fn with_estimated_duration(mut self, minutes: i64) -> Self {
        self.model.estimated_duration = Some(minutes);
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.model.extensions.insert(name.into(), value);
        self
    }

    pub fn build(self) -> EntityModel {
        self.model
    }
}
