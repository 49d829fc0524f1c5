/*!
Persistence tags.

A tag names one persisted field. It carries a short code, written in compact
mode to keep state small, and a readable name, written when debugging. Short
codes are the on-disk discriminant for polymorphic restore: once shipped they
never change, and new fields only ever append new codes.
*/

use std::collections::HashMap;
use std::fmt;

use crate::{PersistError, Result};

/// Which half of a [`Tag`] gets written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMode {
    /// Short codes
    #[default]
    Compact,
    /// Readable names
    Readable,
}

/// A `(short_code, readable_name)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    short: &'static str,
    readable: &'static str,
}

impl Tag {
    /// Create a tag from its short code and readable name.
    pub const fn new(short: &'static str, readable: &'static str) -> Self {
        Self { short, readable }
    }

    /// The compact form.
    pub const fn short(&self) -> &'static str {
        self.short
    }

    /// The readable form.
    pub const fn readable(&self) -> &'static str {
        self.readable
    }

    /// The name written in the given mode.
    pub fn name(&self, mode: TagMode) -> &'static str {
        match mode {
            TagMode::Compact => self.short,
            TagMode::Readable => self.readable,
        }
    }

    /// True if `name` is either form of this tag, so restore works for
    /// documents written in both modes.
    pub fn matches(&self, name: &str) -> bool {
        name == self.short || name == self.readable
    }
}

impl PartialEq<str> for Tag {
    fn eq(&self, other: &str) -> bool {
        self.matches(other)
    }
}

impl PartialEq<&str> for Tag {
    fn eq(&self, other: &&str) -> bool {
        self.matches(other)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.readable, self.short)
    }
}

/// The tags written side by side within one parent level.
#[derive(Debug, Clone, Copy)]
pub struct TagContext {
    /// Name used in error messages.
    pub name: &'static str,
    /// Every tag that may appear as a sibling in this context.
    pub tags: &'static [Tag],
}

impl TagContext {
    pub const fn new(name: &'static str, tags: &'static [Tag]) -> Self {
        Self { name, tags }
    }

    /// Reject any name that two tags in this context would both answer to.
    ///
    /// Short codes and readable names share one namespace because restore
    /// accepts either form. A tag whose two forms are equal is fine.
    pub fn check_unique(&self) -> Result<()> {
        let mut owners: HashMap<&'static str, (usize, Tag)> = HashMap::new();
        for (index, tag) in self.tags.iter().enumerate() {
            for name in [tag.short, tag.readable] {
                match owners.insert(name, (index, *tag)) {
                    Some((owner_index, owner)) if owner_index != index => {
                        return Err(PersistError::validation(format!(
                            "'{name}' names both {owner} and {tag} in {}",
                            self.name
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// Check every registered tag context for collisions.
///
/// Meant to be called once at startup; a failure means two fields would be
/// indistinguishable on disk.
pub fn validate_registry() -> Result<()> {
    for context in registry() {
        context.check_unique()?;
    }
    tracing::debug!("Validated {} tag contexts", registry().len());
    Ok(())
}

/// All tag contexts declared by the crate's persistable types.
pub fn registry() -> &'static [TagContext] {
    &crate::state::TAG_CONTEXTS
}
