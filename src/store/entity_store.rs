//! The hierarchical entity store.

use super::frame::Frame;
use super::join::{broadcast_join, JoinSource};
use super::level::EntityLevel;
use crate::error::{RatingError, Result};
use crate::value::{Key, Value};
use std::collections::{HashMap, HashSet};

/// What a broadcast join does with a child row whose ancestor row is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JoinMode {
    /// Fail with [`RatingError::JoinKey`].
    #[default]
    FailFast,

    /// Substitute `Null` and log a warning.
    NullFill,
}

/// A batch of entity records organised as a hierarchy of levels.
///
/// Every attribute name is owned by exactly one level. Attribute requests
/// spanning several levels return one row per key of the deepest level,
/// with ancestor values broadcast across their descendants.
///
/// # Examples
///
/// ```
/// use u_rating::store::{EntityLevel, EntityStore};
/// use u_rating::value::Value;
///
/// let store = EntityStore::new()
///     .with_level(
///         EntityLevel::builder("policy")
///             .key("policy_id", [1, 2])
///             .attribute("state", ["OH", "TX"])
///             .build()
///             .unwrap(),
///     )
///     .unwrap()
///     .with_level(
///         EntityLevel::builder("driver")
///             .parent("policy")
///             .key("policy_id", [1, 1, 2])
///             .key("driver_id", [1, 2, 1])
///             .attribute("age", [17, 45, 30])
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let frame = store.get_attributes(&["state", "age"]).unwrap();
/// assert_eq!(frame.len(), 3);
/// assert_eq!(frame.column("state").unwrap()[1], Value::from("OH"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    levels: Vec<EntityLevel>,
    owners: HashMap<String, usize>,
    join_mode: JoinMode,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how missing ancestor rows are handled.
    pub fn with_join_mode(mut self, mode: JoinMode) -> Self {
        self.join_mode = mode;
        self
    }

    pub fn join_mode(&self) -> JoinMode {
        self.join_mode
    }

    /// Adds a level. Its parent must already be present.
    pub fn add_level(&mut self, level: EntityLevel) -> Result<()> {
        let invalid = |reason: String| RatingError::InvalidLevel {
            level: level.name().to_string(),
            reason,
        };

        if self.level(level.name()).is_some() {
            return Err(invalid("a level with this name already exists".into()));
        }
        match level.parent() {
            Some(parent_name) => {
                let parent = self.level(parent_name).ok_or_else(|| RatingError::UnknownLevel {
                    name: parent_name.to_string(),
                })?;
                let (prefix, rest) = level.key_names().split_at(
                    level.key_names().len().saturating_sub(1),
                );
                if prefix != parent.key_names() || rest.is_empty() {
                    return Err(invalid(format!(
                        "key ({}) must extend the key of '{}' ({}) by one column",
                        level.key_names().join(", "),
                        parent.name(),
                        parent.key_names().join(", ")
                    )));
                }
            }
            None => {
                if let Some(owner) = level.key_names().iter().find_map(|k| self.owners.get(k)) {
                    return Err(invalid(format!(
                        "key column is owned by level '{}'; declare it as the parent",
                        self.levels[*owner].name()
                    )));
                }
            }
        }

        for attribute in level.attributes() {
            if let Some(&owner) = self.owners.get(attribute) {
                return Err(RatingError::DuplicateAttribute {
                    name: attribute.clone(),
                    first: self.levels[owner].name().to_string(),
                    second: level.name().to_string(),
                });
            }
        }

        let index = self.levels.len();
        for attribute in level.attributes() {
            self.owners.insert(attribute.clone(), index);
        }
        tracing::debug!(
            level = level.name(),
            rows = level.len(),
            attributes = level.attributes().len(),
            "added entity level"
        );
        self.levels.push(level);
        Ok(())
    }

    /// Chainable form of [`EntityStore::add_level`].
    pub fn with_level(mut self, level: EntityLevel) -> Result<Self> {
        self.add_level(level)?;
        Ok(self)
    }

    pub fn level(&self, name: &str) -> Option<&EntityLevel> {
        self.levels.iter().find(|l| l.name() == name)
    }

    pub fn levels(&self) -> &[EntityLevel] {
        &self.levels
    }

    pub fn has_level(&self, name: &str) -> bool {
        self.level(name).is_some()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.owners.contains_key(name)
    }

    /// Level owning `attribute`.
    pub fn owner(&self, attribute: &str) -> Option<&EntityLevel> {
        self.owners.get(attribute).map(|&i| &self.levels[i])
    }

    /// Every attribute of a level, keyed by the level's native key.
    pub fn get_table(&self, name: &str) -> Result<Frame> {
        self.level(name)
            .map(|l| l.frame().clone())
            .ok_or_else(|| RatingError::UnknownLevel {
                name: name.to_string(),
            })
    }

    /// Resolves attributes to their levels and joins them.
    ///
    /// The result has one row per key of the deepest requested level.
    /// Requesting no attribute yields the single-row scalar frame.
    pub fn get_attributes<S: AsRef<str>>(&self, names: &[S]) -> Result<Frame> {
        let sources = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let level = self.owner(name).ok_or_else(|| RatingError::UnknownAttribute {
                    name: name.to_string(),
                })?;
                Ok(JoinSource {
                    name,
                    frame: level.frame(),
                    column: name,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        broadcast_join(self, &sources, self.join_mode)
    }

    /// Joins pre-resolved columns; used by sessions for step outputs.
    pub(crate) fn join(&self, sources: &[JoinSource<'_>]) -> Result<Frame> {
        broadcast_join(self, sources, self.join_mode)
    }

    /// Whether `ancestor` is `level` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: &str, level: &str) -> bool {
        let mut current = self.level(level);
        let mut hops = 0;
        while let Some(l) = current {
            if l.name() == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.levels.len() {
                break;
            }
            current = l.parent().and_then(|p| self.level(p));
        }
        false
    }

    /// Keys of `level` whose parent row does not exist.
    pub fn orphans(&self, level: &str) -> Result<Vec<Key>> {
        let child = self.level(level).ok_or_else(|| RatingError::UnknownLevel {
            name: level.to_string(),
        })?;
        let Some(parent) = child.parent().and_then(|p| self.level(p)) else {
            return Ok(Vec::new());
        };
        let depth = parent.key_names().len();
        let present: HashSet<&[Value]> = parent.keys().iter().map(|k| &k[..]).collect();
        Ok(child
            .keys()
            .iter()
            .filter(|k| !present.contains(k.prefix(depth)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> EntityLevel {
        EntityLevel::builder("policy")
            .key("policy_id", [1, 2])
            .attribute("state", ["OH", "TX"])
            .attribute("pni_age", [40, 52])
            .build()
            .unwrap()
    }

    fn driver() -> EntityLevel {
        EntityLevel::builder("driver")
            .parent("policy")
            .key("policy_id", [1, 1, 2])
            .key("driver_id", [1, 2, 1])
            .attribute("age", [17, 45, 30])
            .build()
            .unwrap()
    }

    fn vehicle() -> EntityLevel {
        EntityLevel::builder("vehicle")
            .parent("policy")
            .key("policy_id", [1, 2])
            .key("vehicle_id", [1, 1])
            .attribute("model_year", [2015, 2022])
            .build()
            .unwrap()
    }

    fn store() -> EntityStore {
        EntityStore::new()
            .with_level(policy())
            .unwrap()
            .with_level(driver())
            .unwrap()
            .with_level(vehicle())
            .unwrap()
    }

    #[test]
    fn test_get_table() {
        let s = store();
        let drivers = s.get_table("driver").unwrap();
        assert_eq!(drivers.len(), 3);
        assert!(drivers.contains("driver_id"));
        assert!(drivers.contains("age"));
        assert!(matches!(s.get_table("garage"), Err(RatingError::UnknownLevel { .. })));
    }

    #[test]
    fn test_broadcast_to_deepest_level() {
        let s = store();
        let frame = s.get_attributes(&["state", "age", "driver_id"]).unwrap();
        assert_eq!(frame.level(), Some("driver"));
        assert_eq!(frame.len(), 3);
        assert_eq!(
            frame.column("state").unwrap(),
            &[Value::from("OH"), Value::from("OH"), Value::from("TX")]
        );
        assert_eq!(frame.names(), &["state", "age", "driver_id"].map(String::from));
    }

    #[test]
    fn test_single_level_request() {
        let frame = store().get_attributes(&["state"]).unwrap();
        assert_eq!(frame.level(), Some("policy"));
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_empty_request_is_scalar() {
        let frame = store().get_attributes::<&str>(&[]).unwrap();
        assert_eq!(frame.depth(), 0);
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn test_unknown_attribute() {
        let err = store().get_attributes(&["shoe_size"]).unwrap_err();
        assert!(matches!(err, RatingError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_siblings_are_incompatible() {
        let err = store().get_attributes(&["age", "model_year"]).unwrap_err();
        match err {
            RatingError::IncompatibleLevels { first, second } => {
                assert_eq!(first, "vehicle");
                assert_eq!(second, "driver");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ancestry() {
        let s = store();
        assert!(s.is_ancestor_or_self("policy", "driver"));
        assert!(s.is_ancestor_or_self("driver", "driver"));
        assert!(!s.is_ancestor_or_self("driver", "policy"));
        assert!(!s.is_ancestor_or_self("vehicle", "driver"));
    }

    fn orphaned_store(mode: JoinMode) -> EntityStore {
        let drivers = EntityLevel::builder("driver")
            .parent("policy")
            .key("policy_id", [1, 9])
            .key("driver_id", [1, 1])
            .attribute("age", [17, 45])
            .build()
            .unwrap();
        EntityStore::new()
            .with_join_mode(mode)
            .with_level(policy())
            .unwrap()
            .with_level(drivers)
            .unwrap()
    }

    #[test]
    fn test_dangling_key_fails_by_default() {
        let s = orphaned_store(JoinMode::default());
        let err = s.get_attributes(&["state", "age"]).unwrap_err();
        match err {
            RatingError::JoinKey { level, key } => {
                assert_eq!(level, "policy");
                assert_eq!(key, Key::new(vec![9.into()]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dangling_key_null_fill() {
        let s = orphaned_store(JoinMode::NullFill);
        let frame = s.get_attributes(&["state", "age"]).unwrap();
        assert_eq!(frame.column("state").unwrap(), &[Value::from("OH"), Value::Null]);
    }

    #[test]
    fn test_orphans() {
        let s = orphaned_store(JoinMode::FailFast);
        assert_eq!(s.orphans("driver").unwrap(), vec![Key::new(vec![9.into(), 1.into()])]);
        assert!(s.orphans("policy").unwrap().is_empty());
        assert!(store().orphans("driver").unwrap().is_empty());
    }

    #[test]
    fn test_add_level_validation() {
        let mut s = EntityStore::new();
        let err = s.add_level(driver()).unwrap_err();
        assert!(matches!(err, RatingError::UnknownLevel { .. }));

        s.add_level(policy()).unwrap();
        let bad = EntityLevel::builder("driver")
            .parent("policy")
            .key("driver_id", [1])
            .build()
            .unwrap();
        assert!(matches!(s.add_level(bad), Err(RatingError::InvalidLevel { .. })));

        let clash = EntityLevel::builder("coverage")
            .parent("policy")
            .key("policy_id", [1])
            .key("coverage_id", [1])
            .attribute("state", ["OH"])
            .build()
            .unwrap();
        assert!(matches!(
            s.add_level(clash),
            Err(RatingError::DuplicateAttribute { .. })
        ));
        assert!(matches!(s.add_level(policy()), Err(RatingError::InvalidLevel { .. })));
    }
}
