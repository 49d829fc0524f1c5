/*!
Collects a bounded set of example messages per category.
*/

use std::collections::{BTreeMap, BTreeSet};

use crate::inserter::{PersistState, StateInserter};
use crate::tag::{Tag, TagContext};
use crate::traverser::{required, RestoreState, StateTraverser};
use crate::Result;

const EXAMPLES_BY_CATEGORY_TAG: Tag = Tag::new("a", "examples_by_category");
const CATEGORY_ID_TAG: Tag = Tag::new("b", "category_id");
const EXAMPLE_TAG: Tag = Tag::new("c", "example");
const MAX_EXAMPLES_TAG: Tag = Tag::new("d", "max_examples");

pub(crate) const TAG_CONTEXT: TagContext = TagContext::new(
    "category_examples",
    &[EXAMPLES_BY_CATEGORY_TAG, MAX_EXAMPLES_TAG],
);

pub(crate) const ENTRY_TAG_CONTEXT: TagContext =
    TagContext::new("category_examples_entry", &[CATEGORY_ID_TAG, EXAMPLE_TAG]);

/// Identifier of a category local to one categorizer.
pub type CategoryId = u32;

/// Keeps up to `max_examples` distinct examples for each category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryExamplesCollector {
    max_examples: usize,
    examples_by_category: BTreeMap<CategoryId, BTreeSet<String>>,
}

impl CategoryExamplesCollector {
    /// Longest example kept, in bytes. Longer examples are cut at a
    /// character boundary and marked with an ellipsis.
    pub const MAX_EXAMPLE_LENGTH: usize = 1000;

    const ELLIPSIS: char = '\u{2026}';

    pub fn new(max_examples: usize) -> Self {
        Self {
            max_examples,
            examples_by_category: BTreeMap::new(),
        }
    }

    /// Add an example. Returns true if it was not already present and the
    /// category had room for it.
    pub fn add(&mut self, category: CategoryId, example: &str) -> bool {
        if self.max_examples == 0 {
            return false;
        }
        let examples = self.examples_by_category.entry(category).or_default();
        if examples.len() >= self.max_examples {
            return false;
        }
        examples.insert(Self::truncate_example(example))
    }

    pub fn number_of_examples_for_category(&self, category: CategoryId) -> usize {
        self.examples_by_category
            .get(&category)
            .map_or(0, BTreeSet::len)
    }

    /// Examples of a category in sorted order.
    pub fn examples(&self, category: CategoryId) -> impl Iterator<Item = &str> {
        self.examples_by_category
            .get(&category)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn max_examples(&self) -> usize {
        self.max_examples
    }

    pub fn clear(&mut self) {
        self.examples_by_category.clear();
    }

    fn truncate_example(example: &str) -> String {
        if example.len() <= Self::MAX_EXAMPLE_LENGTH {
            return example.to_string();
        }
        let mut end = Self::MAX_EXAMPLE_LENGTH - Self::ELLIPSIS.len_utf8();
        while !example.is_char_boundary(end) {
            end -= 1;
        }
        let mut truncated = example[..end].to_string();
        truncated.push(Self::ELLIPSIS);
        truncated
    }

    /// Restore into a collector whose limit comes from configuration rather
    /// than from the saved state.
    pub fn restore_with_limit(
        max_examples: usize,
        traverser: &mut StateTraverser<'_>,
    ) -> Result<Self> {
        let mut restored = Self::accept_restore_traverser(traverser)?;
        restored.max_examples = max_examples;
        Ok(restored)
    }
}

impl PersistState for CategoryExamplesCollector {
    fn accept_persist_inserter(&self, inserter: &mut StateInserter) {
        inserter.insert_value(MAX_EXAMPLES_TAG, self.max_examples);
        for (category, examples) in &self.examples_by_category {
            if examples.is_empty() {
                continue;
            }
            inserter.insert_level(EXAMPLES_BY_CATEGORY_TAG, |inserter| {
                inserter.insert_value(CATEGORY_ID_TAG, *category);
                for example in examples {
                    inserter.insert_value(EXAMPLE_TAG, example);
                }
            });
        }
    }
}

impl RestoreState for CategoryExamplesCollector {
    fn accept_restore_traverser(traverser: &mut StateTraverser<'_>) -> Result<Self> {
        let mut collector = Self::new(0);
        traverser.each_node(|traverser| {
            let name = traverser.name();
            if MAX_EXAMPLES_TAG == name {
                collector.max_examples = traverser.value_as()?;
            } else if EXAMPLES_BY_CATEGORY_TAG == name {
                let (category, examples) = traverser.traverse_sub_level(restore_examples)?;
                collector.examples_by_category.insert(category, examples);
            }
            Ok(())
        })?;
        Ok(collector)
    }
}

fn restore_examples(traverser: &mut StateTraverser<'_>) -> Result<(CategoryId, BTreeSet<String>)> {
    let mut category: Option<CategoryId> = None;
    let mut examples = BTreeSet::new();
    traverser.each_node(|traverser| {
        let name = traverser.name();
        if CATEGORY_ID_TAG == name {
            category = Some(traverser.value_as()?);
        } else if EXAMPLE_TAG == name {
            examples.insert(traverser.value().to_string());
        }
        Ok(())
    })?;
    Ok((required(category, CATEGORY_ID_TAG, "category examples")?, examples))
}
