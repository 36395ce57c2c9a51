//! Slot layout: how a document number maps to nested directories.
//!
//! A layout such as `4-2-2` splits the zero-padded number into digit groups.
//! All groups but the last become directory levels, so number `00012345`
//! under `4-2-2` lands in `0001/23/`. The last group only bounds how many
//! documents share the innermost directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mdr_types::{Identifier, Namespace};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};

/// Digit-group split of a padded document number into directory levels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotLayout {
    segments: Vec<usize>,
}

impl SlotLayout {
    /// Build a layout from explicit digit groups.
    pub fn new(segments: Vec<usize>) -> StoreResult<Self> {
        if segments.is_empty() {
            return Err(StoreError::Configuration(
                "slot layout needs at least one segment".into(),
            ));
        }
        if segments.contains(&0) {
            return Err(StoreError::Configuration(
                "slot layout segments must be positive".into(),
            ));
        }
        Ok(Self { segments })
    }

    /// A layout that keeps every document in the root directory.
    pub fn flat(width: usize) -> Self {
        Self {
            segments: vec![width.max(1)],
        }
    }

    /// Total number of digits covered by the layout.
    pub fn width(&self) -> usize {
        self.segments.iter().sum()
    }

    /// Fail unless the layout covers exactly `width` digits.
    pub fn check_width(&self, width: usize) -> StoreResult<()> {
        if self.width() == width {
            Ok(())
        } else {
            Err(StoreError::Configuration(format!(
                "slot layout {self} covers {} digits, identifiers use {width}",
                self.width()
            )))
        }
    }

    /// Directory names for `number`, outermost first.
    ///
    /// Numbers wider than the layout put their extra leading digits into the
    /// outermost directory.
    pub fn directories(&self, number: u32) -> Vec<String> {
        let padded = format!("{:0width$}", number, width = self.width());
        let overflow = padded.len() - self.width();
        let mut dirs = Vec::with_capacity(self.segments.len() - 1);
        let mut start = 0;
        for (i, len) in self.segments[..self.segments.len() - 1].iter().enumerate() {
            let len = if i == 0 { len + overflow } else { *len };
            dirs.push(padded[start..start + len].to_string());
            start += len;
        }
        dirs
    }

    /// Path of the file for `id` under `root`, named `{id}.{extension}`.
    pub fn file_path(&self, root: &Path, id: &Identifier, extension: &str) -> PathBuf {
        let mut path = root.to_path_buf();
        for dir in self.directories(id.number()) {
            path.push(dir);
        }
        path.push(format!("{}.{extension}", id.render(self.width())));
        path
    }
}

impl Default for SlotLayout {
    /// `4-2-2`, covering the default identifier width of 8.
    fn default() -> Self {
        Self {
            segments: vec![4, 2, 2],
        }
    }
}

impl fmt::Display for SlotLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(usize::to_string).collect();
        f.write_str(&parts.join("-"))
    }
}

impl FromStr for SlotLayout {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = s
            .split('-')
            .map(|part| {
                part.trim().parse::<usize>().map_err(|_| {
                    StoreError::Configuration(format!("invalid slot layout {s:?}"))
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Self::new(segments)
    }
}

impl TryFrom<String> for SlotLayout {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotLayout> for String {
    fn from(layout: SlotLayout) -> Self {
        layout.to_string()
    }
}

/// Every `{id}.{extension}` file below `root` whose identifier belongs to
/// `namespace`, in no particular order.
///
/// A missing `root` yields an empty list. Files with other names are
/// ignored.
pub(crate) fn scan(
    root: &Path,
    namespace: &Namespace,
    extension: &str,
) -> StoreResult<Vec<(Identifier, PathBuf)>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => StoreError::Persistence(io),
            None => StoreError::Corrupt {
                path: root.to_path_buf(),
                reason: "directory loop while scanning".into(),
            },
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(id) = Identifier::parse(stem) {
            if id.namespace() == namespace {
                found.push((id, path.to_path_buf()));
            }
        }
    }
    Ok(found)
}
