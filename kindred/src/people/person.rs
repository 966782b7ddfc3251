//! Person records
//!
//! The store keeps person documents loosely shaped: a handful of named fields
//! plus any number of free-form attributes. An attribute is a relationship edge
//! exactly when its JSON value is an object carrying a `value2` slot; anything
//! else is a plain custom field.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::relations::labels::{self, Gender};
use crate::types::{KindredError, Result};

/// Opaque, store-assigned person identifier
pub type PersonId = String;

/// Keys that belong to the document envelope, never to the attribute set
pub const RESERVED_KEYS: &[&str] = &["_id", "id", "metadata"];

/// Named fields with a fixed place in the record
pub const CORE_FIELDS: &[&str] = &["Name", "NameChi", "Contact", "District", "Address", "ProfilePic"];

/// Plain attribute holding an explicit gender
pub const GENDER_KEY: &str = "Gender";

/// Field that receives uploaded image URLs
pub const PROFILE_PIC_KEY: &str = "ProfilePic";

/// A relationship attribute pointing at another person
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Display name of the related person
    #[serde(default, deserialize_with = "loose_text")]
    pub value: String,
    /// Their relation to me
    #[serde(deserialize_with = "loose_text")]
    pub value2: String,
    /// My relation to them
    #[serde(default, deserialize_with = "loose_text")]
    pub value3: String,
    /// Identifier of the related person, when known
    #[serde(
        rename = "personId",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub person_id: Option<PersonId>,
}

impl RelationshipEdge {
    pub fn new(
        target: &Person,
        their_relation: impl Into<String>,
        my_relation: impl Into<String>,
    ) -> Self {
        Self {
            value: target.record.display_name().to_string(),
            value2: their_relation.into(),
            value3: my_relation.into(),
            person_id: Some(target.id.clone()),
        }
    }

    /// Whether this edge refers to the given person.
    ///
    /// An edge carrying an identifier matches on it alone; edges without one
    /// fall back to a case-insensitive name comparison.
    pub fn points_to(&self, id: &str, name: &str) -> bool {
        match &self.person_id {
            Some(pid) => pid == id,
            None => names_match(&self.value, name),
        }
    }
}

/// One free-form attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Relationship(RelationshipEdge),
    Plain(Value),
}

impl Attribute {
    /// Partition on the presence of the `value2` slot
    pub fn from_value(value: Value) -> Self {
        let is_edge = value
            .as_object()
            .map(|obj| obj.contains_key("value2"))
            .unwrap_or(false);
        if is_edge {
            if let Ok(edge) = serde_json::from_value::<RelationshipEdge>(value.clone()) {
                return Attribute::Relationship(edge);
            }
        }
        Attribute::Plain(value)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Attribute::Relationship(edge) => {
                serde_json::to_value(edge).unwrap_or(Value::Null)
            }
            Attribute::Plain(v) => v.clone(),
        }
    }

    pub fn as_edge(&self) -> Option<&RelationshipEdge> {
        match self {
            Attribute::Relationship(edge) => Some(edge),
            Attribute::Plain(_) => None,
        }
    }
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Attribute::Relationship(edge) => edge.serialize(serializer),
            Attribute::Plain(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Attribute {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Attribute::from_value)
    }
}

/// Person fields without the store identifier
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersonRecord {
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Localized / alternate name
    #[serde(rename = "NameChi", default, skip_serializing_if = "Option::is_none")]
    pub name_chi: Option<String>,

    /// Stored as a number by older records, as text by newer ones
    #[serde(
        rename = "Contact",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub contact: Option<String>,

    #[serde(rename = "District", default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(rename = "Address", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(rename = "ProfilePic", default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, Attribute>,
}

impl PersonRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Parse a JSON object body into a record
    pub fn from_json(body: Value) -> Result<Self> {
        let patch = PersonPatch::from_json(body)?;
        let mut record = PersonRecord::default();
        record.apply(&patch)?;
        Ok(record)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Relationship attributes, keyed by attribute key
    pub fn relationships(&self) -> impl Iterator<Item = (&String, &RelationshipEdge)> {
        self.attributes
            .iter()
            .filter_map(|(k, a)| a.as_edge().map(|e| (k, e)))
    }

    /// Plain custom fields, keyed by attribute key
    pub fn custom_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter().filter_map(|(k, a)| match a {
            Attribute::Plain(v) => Some((k, v)),
            Attribute::Relationship(_) => None,
        })
    }

    pub fn edge_mut(&mut self, key: &str) -> Option<&mut RelationshipEdge> {
        match self.attributes.get_mut(key) {
            Some(Attribute::Relationship(edge)) => Some(edge),
            _ => None,
        }
    }

    /// Explicit gender attribute, if one is recorded
    pub fn declared_gender(&self) -> Gender {
        match self.attributes.get(GENDER_KEY) {
            Some(Attribute::Plain(Value::String(s))) => Gender::parse(s),
            _ => Gender::Unknown,
        }
    }

    /// First free key of the form `relationship_<stamp>_<index>`
    pub fn next_edge_key(&self, stamp: i64, index: usize) -> String {
        let mut i = index;
        loop {
            let key = format!("relationship_{}_{}", stamp, i);
            if !self.attributes.contains_key(&key) {
                return key;
            }
            i += 1;
        }
    }

    /// Drop keys that belong to the document envelope
    pub fn sanitize(&mut self) {
        for key in RESERVED_KEYS {
            self.attributes.remove(*key);
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: &PersonPatch) -> Result<()> {
        for key in &patch.unset {
            if !self.set_core(key, &Value::Null)? {
                self.attributes.remove(key);
            }
        }
        for (key, value) in &patch.set {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if !self.set_core(key, value)? {
                self.attributes
                    .insert(key.clone(), Attribute::from_value(value.clone()));
            }
        }
        Ok(())
    }

    /// Returns false when `key` is not a core field
    fn set_core(&mut self, key: &str, value: &Value) -> Result<bool> {
        let slot = match key {
            "Name" => &mut self.name,
            "NameChi" => &mut self.name_chi,
            "Contact" => &mut self.contact,
            "District" => &mut self.district,
            "Address" => &mut self.address,
            "ProfilePic" => &mut self.profile_pic,
            _ => return Ok(false),
        };
        *slot = match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => {
                return Err(KindredError::BadRequest(format!(
                    "Field '{}' must be a string",
                    key
                )))
            }
        };
        Ok(true)
    }
}

/// A stored person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(rename = "_id")]
    pub id: PersonId,

    #[serde(flatten)]
    pub record: PersonRecord,
}

impl Person {
    pub fn new(id: impl Into<PersonId>, record: PersonRecord) -> Self {
        Self {
            id: id.into(),
            record,
        }
    }

    pub fn name(&self) -> &str {
        self.record.display_name()
    }
}

/// Partial update of a person: keys to write and keys to remove
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonPatch {
    pub set: BTreeMap<String, Value>,
    pub unset: BTreeSet<String>,
}

impl PersonPatch {
    /// Build a patch from a JSON object; `null` values remove the key
    pub fn from_json(body: Value) -> Result<Self> {
        let obj = match body {
            Value::Object(obj) => obj,
            _ => {
                return Err(KindredError::BadRequest(
                    "Person payload must be a JSON object".into(),
                ))
            }
        };

        let mut patch = PersonPatch::default();
        for (key, value) in obj {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            validate_attribute_key(&key)?;
            if value.is_null() {
                patch.unset.insert(key);
            } else {
                patch.set.insert(key, value);
            }
        }
        Ok(patch)
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        self.unset.remove(&key);
        self.set.insert(key, value);
        self
    }

    /// Carry the complete attribute set of `after`, removing what `before` had extra
    pub fn rebuild_attributes(before: &PersonRecord, after: &PersonRecord) -> Self {
        let set = after
            .attributes
            .iter()
            .map(|(k, a)| (k.clone(), a.to_value()))
            .collect();
        let unset = before
            .attributes
            .keys()
            .filter(|k| !after.attributes.contains_key(*k))
            .cloned()
            .collect();
        Self { set, unset }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Relationship edges written by this patch
    pub fn edges(&self) -> impl Iterator<Item = (&String, RelationshipEdge)> {
        self.set.iter().filter_map(|(k, v)| match Attribute::from_value(v.clone()) {
            Attribute::Relationship(edge) => Some((k, edge)),
            Attribute::Plain(_) => None,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for key in &self.unset {
            obj.insert(key.clone(), Value::Null);
        }
        for (key, value) in &self.set {
            obj.insert(key.clone(), value.clone());
        }
        Value::Object(obj)
    }
}

/// Attribute keys end up as document field names
pub fn validate_attribute_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(KindredError::BadRequest("Attribute keys must not be empty".into()));
    }
    if key.contains('.') || key.starts_with('$') {
        return Err(KindredError::BadRequest(format!(
            "Attribute key '{}' must not contain '.' or start with '$'",
            key
        )));
    }
    Ok(())
}

/// Case-insensitive, trimmed name equality; empty names never match
pub fn names_match(a: &str, b: &str) -> bool {
    let a = labels::normalize(a);
    !a.is_empty() && a == labels::normalize(b)
}

fn empty_as_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let raw = lenient_string(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

/// Edge slots are text; null and non-text values read as empty or stringified
fn loose_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
