//! Entity levels.

use super::frame::Frame;
use crate::error::{RatingError, Result};
use crate::value::{Key, Value};
use std::collections::HashSet;

/// One named table of the entity hierarchy.
///
/// The key is an ordered tuple of identifier columns; a child level's key
/// extends its parent's key by exactly one discriminant column. The
/// discriminant column is also exposed as an ordinary attribute of the
/// level, so steps can read identifiers like any other column.
#[derive(Debug, Clone)]
pub struct EntityLevel {
    name: String,
    parent: Option<String>,
    frame: Frame,
    attributes: Vec<String>,
}

impl EntityLevel {
    /// Starts building a level.
    ///
    /// # Examples
    ///
    /// ```
    /// use u_rating::store::EntityLevel;
    ///
    /// let drivers = EntityLevel::builder("driver")
    ///     .parent("policy")
    ///     .key("policy_id", [1, 1, 2])
    ///     .key("driver_id", [1, 2, 1])
    ///     .attribute("age", [17, 45, 30])
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(drivers.len(), 3);
    /// assert_eq!(drivers.attributes(), &["driver_id".to_string(), "age".to_string()]);
    /// ```
    pub fn builder(name: impl Into<String>) -> EntityLevelBuilder {
        EntityLevelBuilder {
            name: name.into(),
            parent: None,
            keys: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn key_names(&self) -> &[String] {
        self.frame.key_names()
    }

    /// Attribute columns, starting with the discriminant key column.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn keys(&self) -> &[Key] {
        self.frame.keys()
    }

    /// All attributes of the level as a frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }
}

/// Column-wise builder for [`EntityLevel`].
#[derive(Debug, Clone)]
pub struct EntityLevelBuilder {
    name: String,
    parent: Option<String>,
    keys: Vec<(String, Vec<Value>)>,
    attributes: Vec<(String, Vec<Value>)>,
}

impl EntityLevelBuilder {
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Appends a key column; the last one added is the discriminant.
    pub fn key<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.keys
            .push((column.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn attribute<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.attributes
            .push((column.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Validates column shapes and key uniqueness.
    pub fn build(self) -> Result<EntityLevel> {
        let invalid = |reason: String| RatingError::InvalidLevel {
            level: self.name.clone(),
            reason,
        };

        let Some((discriminant, _)) = self.keys.last() else {
            return Err(invalid("at least one key column is required".into()));
        };
        let rows = self.keys[0].1.len();
        for (column, values) in self.keys.iter().chain(&self.attributes) {
            if values.len() != rows {
                return Err(invalid(format!(
                    "column '{column}' has {} values, expected {rows}",
                    values.len()
                )));
            }
        }

        let mut seen_names = HashSet::new();
        for (column, _) in self.keys.iter().chain(&self.attributes) {
            if !seen_names.insert(column.as_str()) {
                return Err(invalid(format!("column '{column}' is defined twice")));
            }
        }

        let mut keys = Vec::with_capacity(rows);
        let mut seen_keys = HashSet::with_capacity(rows);
        for i in 0..rows {
            let key = Key::new(self.keys.iter().map(|(_, col)| col[i].clone()).collect());
            if key.iter().any(Value::is_null) {
                return Err(invalid(format!("key {key} has a null component")));
            }
            if !seen_keys.insert(key.clone()) {
                return Err(RatingError::DuplicateKey {
                    level: self.name.clone(),
                    key,
                });
            }
            keys.push(key);
        }

        let key_names: Vec<String> = self.keys.iter().map(|(n, _)| n.clone()).collect();
        let discriminant = discriminant.clone();
        let discriminant_values = self.keys[self.keys.len() - 1].1.clone();

        let mut frame = Frame::from_keys(self.name.clone(), key_names, keys)?
            .with_column(discriminant.clone(), discriminant_values)?;
        let mut attributes = vec![discriminant];
        for (column, values) in self.attributes {
            frame = frame.with_column(column.clone(), values)?;
            attributes.push(column);
        }

        Ok(EntityLevel {
            name: self.name,
            parent: self.parent,
            frame,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_exposes_discriminant() {
        let level = EntityLevel::builder("policy")
            .key("policy_id", [10, 20])
            .attribute("state", ["OH", "TX"])
            .build()
            .unwrap();
        assert_eq!(level.key_names(), &["policy_id".to_string()]);
        assert_eq!(level.frame().column("policy_id").unwrap(), &[Value::Int(10), Value::Int(20)]);
        assert_eq!(level.keys()[1], Key::new(vec![20.into()]));
        assert!(level.parent().is_none());
    }

    #[test]
    fn test_requires_key() {
        let err = EntityLevel::builder("p").attribute("a", [1]).build().unwrap_err();
        assert!(matches!(err, RatingError::InvalidLevel { .. }));
    }

    #[test]
    fn test_column_lengths_checked() {
        let err = EntityLevel::builder("p")
            .key("id", [1, 2])
            .attribute("a", [1])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = EntityLevel::builder("driver")
            .key("policy_id", [1, 1])
            .key("driver_id", [3, 3])
            .build()
            .unwrap_err();
        match err {
            RatingError::DuplicateKey { level, key } => {
                assert_eq!(level, "driver");
                assert_eq!(key.to_string(), "(1, 3)");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_null_key_rejected() {
        let err = EntityLevel::builder("p")
            .key("id", [Some(1), None])
            .build()
            .unwrap_err();
        assert!(matches!(err, RatingError::InvalidLevel { .. }));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = EntityLevel::builder("p")
            .key("id", [1])
            .attribute("id", [2])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }
}
