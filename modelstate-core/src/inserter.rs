/*!
Insertion side of the persist/restore facade.

State objects describe themselves to a [`StateInserter`] as a sequence of
tagged values and nested levels. The inserter only builds the in-memory
[`StateDocument`]; turning it into bytes is the job of a
[`StateFormat`](crate::formats::StateFormat).
*/

use tracing::error;

use crate::codec::{encode_f64, IntoStateText, Precision};
use crate::document::{StateDocument, StateNode};
use crate::tag::{Tag, TagMode};
use crate::{PersistError, Result};

/// Implemented by everything that persists itself through an inserter.
pub trait PersistState {
    /// Persist state by passing information to the supplied inserter.
    fn accept_persist_inserter(&self, inserter: &mut StateInserter);
}

/// Builds a state document one value or level at a time.
///
/// # Example
/// ```rust
/// use modelstate_core::{StateInserter, Tag};
///
/// const COUNT_TAG: Tag = Tag::new("a", "count");
/// const WINDOW_TAG: Tag = Tag::new("b", "window");
///
/// let mut inserter = StateInserter::new("root");
/// inserter.insert_value(COUNT_TAG, 25);
/// inserter.insert_level(WINDOW_TAG, |inserter| inserter.insert_value(COUNT_TAG, "z"));
/// let document = inserter.into_document();
/// assert_eq!(document.children.len(), 2);
/// ```
#[derive(Debug)]
pub struct StateInserter {
    document: StateDocument,
    mode: TagMode,
    // Child index of every open level, outermost first.
    open_levels: Vec<usize>,
    // Depth of the level owned by each active `insert_level`; `end_level`
    // never closes at or below the innermost one.
    scope_floors: Vec<usize>,
}

impl StateInserter {
    /// Create an inserter writing compact tags.
    pub fn new<S: Into<String>>(root_name: S) -> Self {
        Self::with_mode(root_name, TagMode::Compact)
    }

    /// Create an inserter writing tags in the given mode.
    pub fn with_mode<S: Into<String>>(root_name: S, mode: TagMode) -> Self {
        Self::from_document(StateDocument::new(root_name), mode)
    }

    /// Continue building an existing document, e.g. one with root attributes.
    pub fn from_document(document: StateDocument, mode: TagMode) -> Self {
        Self {
            document,
            mode,
            open_levels: Vec::new(),
            scope_floors: Vec::new(),
        }
    }

    pub fn mode(&self) -> TagMode {
        self.mode
    }

    /// True when readable names are written instead of short codes.
    pub fn readable_tags(&self) -> bool {
        self.mode == TagMode::Readable
    }

    /// Number of currently open levels.
    pub fn depth(&self) -> usize {
        self.open_levels.len()
    }

    /// Append a value node under the current level.
    pub fn insert_value<V: IntoStateText>(&mut self, tag: Tag, value: V) {
        let name = tag.name(self.mode);
        self.current_level()
            .push(StateNode::value(name, value.into_state_text()));
    }

    /// Append a floating point value at the given precision.
    pub fn insert_f64(&mut self, tag: Tag, value: f64, precision: Precision) {
        self.insert_value(tag, encode_f64(value, precision).as_str());
    }

    /// Append a nested level and fill it with `insert`.
    ///
    /// Inside `insert` the new level is the outermost one that can be
    /// ended; it is closed when `insert` returns, together with anything
    /// `insert` left open.
    pub fn insert_level<F>(&mut self, tag: Tag, insert: F)
    where
        F: FnOnce(&mut StateInserter),
    {
        self.new_level(tag);
        let floor = self.depth();
        self.scope_floors.push(floor);
        insert(self);
        self.scope_floors.pop();
        if self.depth() > floor {
            error!("Logic error - level left open inside '{}'", tag.name(self.mode));
        }
        self.open_levels.truncate(floor - 1);
    }

    /// Persist `state` as a nested level.
    pub fn insert_state<P: PersistState + ?Sized>(&mut self, tag: Tag, state: &P) {
        self.insert_level(tag, |inserter| state.accept_persist_inserter(inserter));
    }

    /// Start a new level; everything inserted until the matching
    /// [`end_level`](Self::end_level) goes inside it.
    pub fn new_level(&mut self, tag: Tag) {
        let name = tag.name(self.mode);
        let level = self.current_level();
        level.push(StateNode::level(name));
        let index = level.len() - 1;
        self.open_levels.push(index);
    }

    /// Step back to the enclosing level.
    ///
    /// Ending more levels than were started, or the level owned by an
    /// enclosing [`insert_level`](Self::insert_level), is a logic error: it
    /// is logged and the document is left untouched.
    pub fn end_level(&mut self) -> Result<()> {
        let floor = self.scope_floors.last().copied().unwrap_or(0);
        if self.open_levels.len() <= floor {
            error!("Logic error - ending more levels than have been started");
            return Err(PersistError::ScopeImbalance(
                "ending more levels than have been started".to_string(),
            ));
        }
        self.open_levels.pop();
        Ok(())
    }

    /// The document built so far.
    pub fn document(&self) -> &StateDocument {
        &self.document
    }

    /// Finish building. Levels still open are closed implicitly.
    pub fn into_document(self) -> StateDocument {
        if !self.open_levels.is_empty() {
            error!(
                "{} level(s) still open when the document was finished",
                self.open_levels.len()
            );
        }
        self.document
    }

    fn current_level(&mut self) -> &mut Vec<StateNode> {
        let Self {
            document,
            open_levels,
            ..
        } = self;
        let mut children = &mut document.children;
        for &index in open_levels.iter() {
            children = &mut children[index].children;
        }
        children
    }
}
