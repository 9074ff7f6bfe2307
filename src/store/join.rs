//! Broadcast join of columns living on different levels.

use super::entity_store::{EntityStore, JoinMode};
use super::frame::Frame;
use crate::error::{RatingError, Result};
use crate::value::{Key, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One column to place in a joined frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JoinSource<'a> {
    /// Column name in the result.
    pub(crate) name: &'a str,
    pub(crate) frame: &'a Frame,
    /// Column name in `frame`.
    pub(crate) column: &'a str,
}

fn level_name(frame: &Frame) -> String {
    frame.level().unwrap_or("<scalar>").to_string()
}

/// Aligns every source column to the rows of the deepest source.
///
/// Sources on ancestor levels are broadcast to their descendants by key
/// prefix; depth-0 sources are broadcast to every row. Sources that are not
/// on one ancestor chain fail with [`RatingError::IncompatibleLevels`].
pub(crate) fn broadcast_join(
    store: &EntityStore,
    sources: &[JoinSource<'_>],
    mode: JoinMode,
) -> Result<Frame> {
    let Some(driver) = sources
        .iter()
        .enumerate()
        .max_by_key(|(i, s)| (s.frame.depth(), std::cmp::Reverse(*i)))
        .map(|(_, s)| s.frame)
    else {
        return Ok(Frame::scalar());
    };

    for source in sources {
        let frame = source.frame;
        if frame.depth() == 0 {
            continue;
        }
        let compatible = match (frame.level(), driver.level()) {
            (Some(a), Some(b)) => store.is_ancestor_or_self(a, b),
            _ => false,
        } && driver.key_names().starts_with(frame.key_names());
        if !compatible {
            return Err(RatingError::IncompatibleLevels {
                first: level_name(frame),
                second: level_name(driver),
            });
        }
    }

    let mut out = driver.with_same_keys();
    let mut filled = 0usize;
    for source in sources {
        let column = source.frame.try_column(source.column)?;
        let values = align(source.frame, column, driver, mode, &mut filled)?;
        out = out.with_column(source.name, values)?;
    }

    if filled > 0 {
        tracing::warn!(
            level = driver.level().unwrap_or_default(),
            filled,
            "null-filled values for rows without an ancestor row"
        );
    }
    Ok(out)
}

fn align(
    source: &Frame,
    column: &[Value],
    driver: &Frame,
    mode: JoinMode,
    filled: &mut usize,
) -> Result<Vec<Value>> {
    if Arc::ptr_eq(source.shared_keys(), driver.shared_keys()) {
        return Ok(column.to_vec());
    }
    if source.depth() == 0 {
        let value = column.first().cloned().unwrap_or_default();
        return Ok(vec![value; driver.len()]);
    }

    let depth = source.depth();
    let index: HashMap<&[Value], usize> = source
        .keys()
        .iter()
        .enumerate()
        .map(|(i, k)| (&k[..], i))
        .collect();

    driver
        .keys()
        .iter()
        .map(|key| match index.get(key.prefix(depth)) {
            Some(&row) => Ok(column[row].clone()),
            None => match mode {
                JoinMode::FailFast => Err(RatingError::JoinKey {
                    level: level_name(source),
                    key: Key::from(key.prefix(depth)),
                }),
                JoinMode::NullFill => {
                    *filled += 1;
                    Ok(Value::Null)
                }
            },
        })
        .collect()
}
