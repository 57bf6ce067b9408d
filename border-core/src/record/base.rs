//! Record type returned by optimizers.
use crate::error::LrrError;
use std::collections::{
    btree_map::{Iter, Keys},
    BTreeMap,
};

/// A value stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value, e.g. a loss.
    Scalar(f32),
}

/// Metric name to value mapping.
///
/// Keys are kept sorted, so iteration order does not depend on insertion
/// order. This keeps logs of consecutive updates comparable line by line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(BTreeMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a record holding a single scalar.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        let mut record = Self::empty();
        record.insert(name, RecordValue::Scalar(value));
        record
    }

    /// Creates a record from key-value pairs.
    ///
    /// Later pairs overwrite earlier ones with the same key.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Inserts a value, replacing any previous value under the same key.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns the keys in sorted order.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Returns the key-value pairs in sorted key order.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns the value under `k`, if any.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the record has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges `record` into `self`, values of `record` take precedence.
    pub fn merge(mut self, record: Record) -> Self {
        self.merge_inplace(record);
        self
    }

    /// In-place version of [`Record::merge`].
    pub fn merge_inplace(&mut self, record: Record) {
        self.0.extend(record.0);
    }

    /// Returns the scalar under `k`.
    ///
    /// Fails with [`LrrError::RecordKeyError`] if the key is absent.
    pub fn get_scalar(&self, k: &str) -> Result<f32, LrrError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            None => Err(LrrError::RecordKeyError(k.to_string())),
        }
    }

    /// Returns all entries as scalars.
    pub fn scalars(&self) -> BTreeMap<String, f32> {
        self.0
            .iter()
            .map(|(k, RecordValue::Scalar(v))| (k.clone(), *v))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_scalar_errors() {
        let record = Record::from_scalar("Losses/Value Loss", 1.5);

        assert_eq!(record.get_scalar("Losses/Value Loss").unwrap(), 1.5);
        assert!(matches!(
            record.get_scalar("missing"),
            Err(LrrError::RecordKeyError(_))
        ));
    }

    #[test]
    fn test_merge_and_scalars() {
        let r1 = Record::from_slice(&[
            ("a", RecordValue::Scalar(1.0)),
            ("b", RecordValue::Scalar(2.0)),
        ]);
        let r2 = Record::from_scalar("a", 3.0);
        let merged = r1.merge(r2);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get_scalar("a").unwrap(), 3.0);

        let scalars = merged.scalars();
        assert_eq!(scalars["a"], 3.0);
        assert_eq!(scalars["b"], 2.0);
    }
}
