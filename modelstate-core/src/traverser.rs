/*!
Restoration side of the persist/restore facade.

A [`StateTraverser`] is a cursor over a [`StateDocument`]. It starts on the
first child of the root and moves between siblings with
[`next`](StateTraverser::next), into a level with
[`descend`](StateTraverser::descend) and back out with
[`ascend`](StateTraverser::ascend).
*/

use crate::codec::StateValue;
use crate::document::{StateDocument, StateNode};
use crate::tag::Tag;
use crate::{PersistError, Result};

/// Implemented by everything that restores itself from a traverser.
///
/// The traverser is positioned on the first node of the object's own level
/// when this is called.
pub trait RestoreState: Sized {
    fn accept_restore_traverser(traverser: &mut StateTraverser<'_>) -> Result<Self>;
}

/// Cursor over a state document.
///
/// # Example
/// ```rust
/// use modelstate_core::{StateDocument, StateNode, StateTraverser};
///
/// let mut document = StateDocument::new("root");
/// document.children.push(StateNode::value("a", "25"));
///
/// let mut traverser = StateTraverser::new(&document);
/// assert_eq!(traverser.name(), "a");
/// assert_eq!(traverser.value_as::<u32>().unwrap(), 25);
/// assert!(!traverser.next());
/// ```
#[derive(Debug, Clone)]
pub struct StateTraverser<'a> {
    // Sibling list and position for every entered level, the current one last.
    levels: Vec<(&'a [StateNode], usize)>,
}

impl<'a> StateTraverser<'a> {
    /// Position a new cursor on the first child of the root.
    pub fn new(document: &'a StateDocument) -> Self {
        Self::over(document.children.as_slice())
    }

    /// Cursor over an arbitrary sibling list.
    pub fn over(nodes: &'a [StateNode]) -> Self {
        Self {
            levels: vec![(nodes, 0)],
        }
    }

    fn current(&self) -> Option<&'a StateNode> {
        self.levels
            .last()
            .and_then(|&(nodes, index)| nodes.get(index))
    }

    /// Name of the current node, or the empty string once the level is exhausted.
    pub fn name(&self) -> &'a str {
        self.current().map(|node| node.name.as_str()).unwrap_or("")
    }

    /// Text value of the current node. Levels and exhausted cursors have
    /// an empty value.
    pub fn value(&self) -> &'a str {
        self.current()
            .and_then(|node| node.value.as_deref())
            .unwrap_or("")
    }

    /// Decode the current value with the value codec.
    pub fn value_as<T: StateValue>(&self) -> Result<T> {
        T::from_state_text(self.value())
    }

    /// True if the current node has children.
    pub fn has_sub_level(&self) -> bool {
        self.current().is_some_and(|node| !node.children.is_empty())
    }

    /// Move to the next sibling. Returns false, leaving the cursor at the
    /// end of the level, when there is none.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let Some((nodes, index)) = self.levels.last_mut() else {
            return false;
        };
        if *index < nodes.len() {
            *index += 1;
        }
        *index < nodes.len()
    }

    /// True when no node remains at the current level.
    pub fn is_eof(&self) -> bool {
        self.current().is_none()
    }

    /// Step into the children of the current node.
    pub fn descend(&mut self) -> Result<()> {
        match self.current() {
            Some(node) if !node.children.is_empty() => {
                self.levels.push((node.children.as_slice(), 0));
                Ok(())
            }
            Some(node) => Err(PersistError::format(format!(
                "cannot descend into '{}': it has no sub-level",
                node.name
            ))),
            None => Err(PersistError::format(
                "cannot descend: no current node".to_string(),
            )),
        }
    }

    /// Return to the node that was current in the parent level before the
    /// matching [`descend`](Self::descend). Returns false at the top level.
    pub fn ascend(&mut self) -> bool {
        if self.levels.len() <= 1 {
            return false;
        }
        self.levels.pop();
        true
    }

    /// Descend into the current node, run `restore`, then ascend whatever
    /// `restore` returned.
    pub fn traverse_sub_level<T, F>(&mut self, restore: F) -> Result<T>
    where
        F: FnOnce(&mut StateTraverser<'a>) -> Result<T>,
    {
        self.descend()?;
        let depth = self.levels.len();
        let result = restore(self);
        self.levels.truncate(depth - 1);
        result
    }

    /// Call `visit` on every node from the cursor to the end of the level.
    pub fn each_node<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&mut StateTraverser<'a>) -> Result<()>,
    {
        while !self.is_eof() {
            visit(self)?;
            self.next();
        }
        Ok(())
    }

    /// Restore a [`RestoreState`] object from the current node's level.
    pub fn restore<T: RestoreState>(&mut self) -> Result<T> {
        self.traverse_sub_level(T::accept_restore_traverser)
    }
}

/// Unwrap a field collected during restore, failing if it never appeared.
pub fn required<T>(field: Option<T>, tag: Tag, context: &str) -> Result<T> {
    field.ok_or_else(|| {
        PersistError::invalid_format(format!("{context} state is missing '{}'", tag.readable()))
    })
}
