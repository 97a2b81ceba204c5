//! Raw documents and change events read from the backing document store.
//!
//! Documents are schemaless JSON objects identified by their `_id` field.
//! Caches keep the raw form so reconciliation can diff a fresh snapshot
//! against what was last derived.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the document identifier.
pub const ID_FIELD: &str = "_id";
/// Field carrying the change-event operation.
pub const CRUD_TYPE_FIELD: &str = "crudType";
/// Field carrying the owning organization on tenant-scoped documents.
pub const ORG_ID_FIELD: &str = "orgId";

/// A document from a backing collection.
///
/// Equality compares the whole body, which is what reconciliation relies on
/// to detect changed records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    body: Value,
}

/// Reasons a JSON value cannot be treated as a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// The value is not a JSON object.
    #[error("document must be a JSON object")]
    NotAnObject,
    /// The object has no usable `_id`.
    #[error("document has no string `_id` field")]
    MissingId,
}

impl Document {
    /// Build a document, inserting `id` into the body when absent.
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        let id = id.into();
        let body = match body {
            Value::Object(mut fields) => {
                fields
                    .entry(ID_FIELD)
                    .or_insert_with(|| Value::String(id.clone()));
                Value::Object(fields)
            }
            other => other,
        };
        Self { id, body }
    }

    /// Interpret a JSON object as a document, reading its `_id`.
    ///
    /// # Examples
    /// ```
    /// use acs_backend::domain::Document;
    /// use serde_json::json;
    ///
    /// let doc = Document::from_value(json!({ "_id": "org-1", "name": "Acme" }))?;
    /// assert_eq!(doc.id(), "org-1");
    /// assert_eq!(doc.str_field("name"), Some("Acme"));
    /// # Ok::<(), acs_backend::domain::DocumentError>(())
    /// ```
    pub fn from_value(body: Value) -> Result<Self, DocumentError> {
        let Value::Object(fields) = &body else {
            return Err(DocumentError::NotAnObject);
        };
        let id = id_of(fields).ok_or(DocumentError::MissingId)?;
        Ok(Self { id, body })
    }

    /// Document identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full JSON body, including `_id`.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Read a string field, treating blank strings as absent.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        str_field(&self.body, name)
    }
}

/// Read a non-blank string field exactly as stored.
///
/// Secrets go through here: surrounding whitespace is part of the value.
pub fn exact_str_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

/// Read a non-blank string field from a JSON object, trimmed.
pub fn str_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn id_of(fields: &Map<String, Value>) -> Option<String> {
    match fields.get(ID_FIELD)? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Operation carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrudType {
    /// A document was inserted.
    Create,
    /// A document was modified.
    Update,
    /// One or more documents were removed.
    Delete,
}

/// A change notification: the operation plus the record fields it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Operation performed on the backing collection.
    pub crud_type: CrudType,
    /// Record fields that accompanied the event, `crudType` removed.
    pub record: Value,
}

/// Reasons a change message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeEventError {
    /// The message is not a JSON object.
    #[error("change event must be a JSON object")]
    NotAnObject,
    /// `crudType` is missing.
    #[error("change event has no crudType")]
    MissingCrudType,
    /// `crudType` holds a value other than Create, Update or Delete.
    #[error("unrecognised crudType `{0}`")]
    UnknownCrudType(String),
}

impl ChangeEvent {
    /// Decode a change message published on the event channel.
    pub fn decode(message: Value) -> Result<Self, ChangeEventError> {
        let Value::Object(mut fields) = message else {
            return Err(ChangeEventError::NotAnObject);
        };
        let raw = fields
            .remove(CRUD_TYPE_FIELD)
            .ok_or(ChangeEventError::MissingCrudType)?;
        let crud_type = CrudType::deserialize(&raw).map_err(|_unknown| {
            ChangeEventError::UnknownCrudType(match raw {
                Value::String(text) => text,
                other => other.to_string(),
            })
        })?;
        Ok(Self {
            crud_type,
            record: Value::Object(fields),
        })
    }

    /// Identifier of the affected document, when the event names one.
    pub fn document_id(&self) -> Option<String> {
        match &self.record {
            Value::Object(fields) => id_of(fields),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn new_inserts_id_into_body() {
        let doc = Document::new("org-1", json!({ "name": "Acme" }));
        assert_eq!(doc.body()["_id"], "org-1");
    }

    #[rstest]
    #[case::not_object(json!(["x"]), DocumentError::NotAnObject)]
    #[case::missing_id(json!({ "name": "Acme" }), DocumentError::MissingId)]
    #[case::blank_id(json!({ "_id": "  " }), DocumentError::MissingId)]
    fn from_value_rejects_unusable_bodies(#[case] body: Value, #[case] expected: DocumentError) {
        assert_eq!(Document::from_value(body), Err(expected));
    }

    #[rstest]
    fn decode_strips_crud_type() {
        let event = ChangeEvent::decode(json!({ "crudType": "Update", "_id": "a", "url": "u" }))
            .expect("valid event");
        assert_eq!(event.crud_type, CrudType::Update);
        assert_eq!(event.record, json!({ "_id": "a", "url": "u" }));
        assert_eq!(event.document_id().as_deref(), Some("a"));
    }

    #[rstest]
    #[case::missing(json!({ "_id": "a" }), ChangeEventError::MissingCrudType)]
    #[case::unknown(
        json!({ "crudType": "Upsert" }),
        ChangeEventError::UnknownCrudType("Upsert".to_owned())
    )]
    #[case::numeric(
        json!({ "crudType": 3 }),
        ChangeEventError::UnknownCrudType("3".to_owned())
    )]
    #[case::wrong_case(
        json!({ "crudType": "delete" }),
        ChangeEventError::UnknownCrudType("delete".to_owned())
    )]
    #[case::not_object(json!("Create"), ChangeEventError::NotAnObject)]
    fn decode_rejects_bad_messages(#[case] message: Value, #[case] expected: ChangeEventError) {
        assert_eq!(ChangeEvent::decode(message), Err(expected));
    }

    #[rstest]
    #[case::create("Create", CrudType::Create)]
    #[case::update("Update", CrudType::Update)]
    #[case::delete("Delete", CrudType::Delete)]
    fn decode_reads_each_crud_type(#[case] raw: &str, #[case] expected: CrudType) {
        let event = ChangeEvent::decode(json!({ "crudType": raw, "_id": "a" })).expect("valid event");
        assert_eq!(event.crud_type, expected);
    }

    #[rstest]
    fn exact_fields_keep_whitespace() {
        let body = json!({ "secret": " pw ", "blank": "  " });
        assert_eq!(exact_str_field(&body, "secret"), Some(" pw "));
        assert_eq!(str_field(&body, "secret"), Some("pw"));
        assert_eq!(exact_str_field(&body, "blank"), None);
    }

    #[rstest]
    fn bulk_delete_has_no_document_id() {
        let event = ChangeEvent::decode(json!({ "crudType": "Delete", "orgId": "o1" }))
            .expect("valid event");
        assert!(event.document_id().is_none());
    }
}
