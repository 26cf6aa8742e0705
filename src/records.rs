//! Record set preparation.
//!
//! Both sides of the protocol sign the same thing: every live record of the
//! collection, sorted by `id`, without client-side bookkeeping fields.

use std::{borrow::Cow, cmp::Ordering, collections::BTreeMap};

use base64::Engine as _;
use sha2::Digest as _;

use crate::{
    Error,
    canonical::{self, ToCanonical, Value},
};

/// Record identifier field.
pub const ID_FIELD: &str = "id";

/// Soft-deletion marker, records with `"deleted": true` are tombstones.
pub const DELETED_FIELD: &str = "deleted";

/// Prefix of fields that only exist in a local client's copy, e.g. `_status`.
pub const PRIVATE_FIELD_PREFIX: char = '_';

/// Copy of `record` without private fields.
pub fn strip_private_fields(record: &Value) -> Value {
    match record {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !key.starts_with(PRIVATE_FIELD_PREFIX))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_deleted(record: &Value) -> bool {
    matches!(record.get(DELETED_FIELD), Some(Value::Bool(true)))
}

fn record_id(record: &Value) -> Result<&str, Error> {
    if record.as_object().is_none() {
        log::error!("record is not an object: {record:?}");
        return Err(Error::InvalidRecord("record is not an object".to_string()));
    }

    match record.get(ID_FIELD).and_then(Value::as_str) {
        Some(id) => Ok(id),
        None => {
            log::error!("record has no string {ID_FIELD}: {record:?}");
            Err(Error::InvalidRecord(format!("missing string {ID_FIELD}")))
        }
    }
}

fn cmp_ids(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// The live records of a collection, sorted by `id`.
#[derive(Debug, Clone)]
pub struct RecordSet {
    records: Vec<Value>,
}

impl RecordSet {
    /// Drops tombstones and sorts by `id`.
    ///
    /// Every record must be an object with a string `id`.
    pub fn new<I: IntoIterator<Item = Value>>(records: I) -> Result<Self, Error> {
        let mut live: Vec<Value> = Vec::new();
        for record in records {
            record_id(&record)?;
            if is_deleted(&record) {
                log::trace!("dropping deleted record {record:?}");
                continue;
            }
            live.push(record);
        }

        // ids were validated above
        live.sort_by(|a, b| {
            cmp_ids(
                a.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default(),
                b.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default(),
            )
        });

        Ok(Self { records: live })
    }

    /// Merge incoming changes over the local records.
    ///
    /// Local records lose their private fields, then every change replaces
    /// the local record with the same `id`.
    pub fn merge(local: &[Value], changes: &[Value]) -> Result<Self, Error> {
        let mut by_id: BTreeMap<String, Value> = BTreeMap::new();

        for record in local {
            let id: &str = record_id(record)?;
            by_id.insert(id.to_string(), strip_private_fields(record));
        }

        for record in changes {
            let id: &str = record_id(record)?;
            if by_id.insert(id.to_string(), record.clone()).is_some() {
                log::debug!("incoming change replaces local record {id}");
            }
        }

        log::debug!(
            "merged {} local records with {} changes into {} records",
            local.len(),
            changes.len(),
            by_id.len()
        );

        Self::new(by_id.into_values())
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Canonical JSON of the record set, the signed payload.
    pub fn canonical(&self) -> String {
        canonical::canonicalize(self)
    }

    /// Base64 SHA-256 of the canonical JSON.
    pub fn hash(&self) -> String {
        compute_hash(&self.canonical())
    }
}

impl ToCanonical for RecordSet {
    fn to_canonical(&self) -> Cow<'_, Value> {
        Cow::Owned(Value::Array(self.records.clone()))
    }
}

/// Shorthand for [`RecordSet::merge`].
pub fn merge_changes(local: &[Value], changes: &[Value]) -> Result<RecordSet, Error> {
    RecordSet::merge(local, changes)
}

/// Canonical JSON of the live records in `records`, as a signer produces it.
pub fn canonical_records(records: &[Value]) -> Result<String, Error> {
    Ok(RecordSet::new(records.iter().cloned())?.canonical())
}

/// Standard base64 of the SHA-256 digest of `canonical`.
pub fn compute_hash(canonical: &str) -> String {
    let digest = sha2::Sha256::digest(canonical.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(json: &str) -> Vec<Value> {
        match Value::parse(json).unwrap() {
            Value::Array(items) => items,
            other => panic!("expected an array, got {other:?}"),
        }
    }

    #[test]
    fn filters_deleted_and_sorts() {
        let set: RecordSet = RecordSet::new(records(
            r#"[
                {"id": "c", "title": "third"},
                {"id": "a", "title": "first"},
                {"id": "b", "deleted": true},
                {"id": "d", "deleted": false}
            ]"#,
        ))
        .unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(
            set.canonical(),
            r#"[{"id":"a","title":"first"},{"id":"c","title":"third"},{"deleted":false,"id":"d"}]"#
        );
    }

    #[test]
    fn merge_changes() {
        let local: Vec<Value> = records(
            r#"[
                {"id": "1", "title": "old", "_status": "synced"},
                {"id": "2", "title": "kept", "_status": "synced", "last_modified": 10},
                {"id": "3", "title": "gone", "_status": "synced"}
            ]"#,
        );
        let changes: Vec<Value> = records(
            r#"[
                {"id": "1", "title": "new", "last_modified": 20},
                {"id": "3", "deleted": true, "last_modified": 21},
                {"id": "0", "title": "added", "last_modified": 22}
            ]"#,
        );

        let set: RecordSet = RecordSet::merge(&local, &changes).unwrap();
        assert_eq!(
            set.canonical(),
            concat!(
                r#"[{"id":"0","last_modified":22,"title":"added"},"#,
                r#"{"id":"1","last_modified":20,"title":"new"},"#,
                r#"{"id":"2","last_modified":10,"title":"kept"}]"#,
            )
        );
    }

    #[test]
    fn empty_set() {
        let set: RecordSet = RecordSet::merge(&[], &[]).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.canonical(), "[]");
    }

    #[test]
    fn strip_private() {
        let record: Value = Value::parse(r#"{"id": "1", "_status": "created", "a_b": 1}"#).unwrap();
        assert_eq!(
            canonical::canonicalize(&strip_private_fields(&record)),
            r#"{"a_b":1,"id":"1"}"#
        );
    }

    #[test]
    fn invalid_records() {
        assert!(matches!(
            RecordSet::new(records(r#"[{"title": "no id"}]"#)),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            RecordSet::new(records(r#"[{"id": 5}]"#)),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            RecordSet::merge(&records(r#"["not an object"]"#), &[]),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn hash() {
        // echo -n '[]' | openssl dgst -sha256 -binary | base64
        assert_eq!(
            compute_hash("[]"),
            "T1PNoYwrqgwDVLtfmj7L5e0Sq02OEbqHPC8RFhICuUU="
        );
        assert_eq!(RecordSet::new(Vec::new()).unwrap().hash(), compute_hash("[]"));
    }
}
