/*!
Tag-dispatched persistence for polymorphic families.

A family is a closed enum whose variants are told apart on disk only by the
tag they are written under. Restoring scans the current level: every
registered tag constructs its variant, an unknown tag aborts, and exactly one
variant must be found.
*/

use tracing::error;

use crate::inserter::StateInserter;
use crate::tag::Tag;
use crate::traverser::StateTraverser;
use crate::{PersistError, Result};

/// A closed family of variants selected by tag.
pub trait TagDispatch: Sized {
    /// Family name used in errors and logs.
    const FAMILY: &'static str;

    /// Caller-supplied parameters needed to rebuild a variant.
    type Params;

    /// One tag per variant. [`restore_variant`](Self::restore_variant)
    /// receives the position of the matched tag in this slice.
    fn variant_tags() -> &'static [Tag];

    /// Rebuild the variant registered at `index`. The traverser is on the
    /// node carrying the variant's tag.
    fn restore_variant(
        index: usize,
        params: &Self::Params,
        traverser: &mut StateTraverser<'_>,
    ) -> Result<Self>;

    /// Write the variant under its tag.
    fn persist(&self, inserter: &mut StateInserter);
}

/// Restore one member of a tag-dispatched family from the current level.
///
/// # Errors
/// * [`PersistError::UnknownTag`] as soon as a node carries a tag no variant
///   is registered for.
/// * [`PersistError::TagMismatch`] if the level held zero or several variants.
pub fn restore_tagged<T: TagDispatch>(
    params: &T::Params,
    traverser: &mut StateTraverser<'_>,
) -> Result<T> {
    let tags = T::variant_tags();
    let mut restored = None;
    let mut found = 0;

    while !traverser.is_eof() {
        let name = traverser.name();
        let Some(index) = tags.iter().position(|tag| tag.matches(name)) else {
            error!("No {} corresponds to name '{}'", T::FAMILY, name);
            return Err(PersistError::UnknownTag {
                family: T::FAMILY.to_string(),
                tag: name.to_string(),
            });
        };
        restored = Some(T::restore_variant(index, params, traverser)?);
        found += 1;
        if !traverser.next() {
            break;
        }
    }

    match restored {
        Some(value) if found == 1 => Ok(value),
        _ => {
            error!("Expected 1 (got {}) {} tags", found, T::FAMILY);
            Err(PersistError::TagMismatch {
                family: T::FAMILY.to_string(),
                found,
            })
        }
    }
}

/// Write `value` under its variant tag.
pub fn persist_tagged<T: TagDispatch>(value: &T, inserter: &mut StateInserter) {
    value.persist(inserter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{StateDocument, StateNode};

    #[derive(Debug, PartialEq)]
    enum Shape {
        Circle(u32),
        Point,
    }

    const CIRCLE_TAG: Tag = Tag::new("a", "circle");
    const POINT_TAG: Tag = Tag::new("b", "point");
    const RADIUS_TAG: Tag = Tag::new("a", "radius");

    impl TagDispatch for Shape {
        const FAMILY: &'static str = "shape";
        type Params = u32;

        fn variant_tags() -> &'static [Tag] {
            &[CIRCLE_TAG, POINT_TAG]
        }

        fn restore_variant(
            index: usize,
            scale: &u32,
            traverser: &mut StateTraverser<'_>,
        ) -> Result<Self> {
            match index {
                0 => traverser.traverse_sub_level(|traverser| {
                    Ok(Shape::Circle(traverser.value_as::<u32>()? * scale))
                }),
                _ => Ok(Shape::Point),
            }
        }

        fn persist(&self, inserter: &mut StateInserter) {
            match self {
                Shape::Circle(radius) => inserter.insert_level(CIRCLE_TAG, |inserter| {
                    inserter.insert_value(RADIUS_TAG, *radius)
                }),
                Shape::Point => inserter.insert_value(POINT_TAG, ""),
            }
        }
    }

    fn persisted(shapes: &[Shape]) -> StateDocument {
        let mut inserter = StateInserter::new("root");
        for shape in shapes {
            persist_tagged(shape, &mut inserter);
        }
        inserter.into_document()
    }

    #[test]
    fn test_single_variant_restores() {
        for (shape, expected) in [(Shape::Circle(2), Shape::Circle(6)), (Shape::Point, Shape::Point)] {
            let document = persisted(&[shape]);
            let mut traverser = StateTraverser::new(&document);
            assert_eq!(restore_tagged::<Shape>(&3, &mut traverser).unwrap(), expected);
        }
    }

    #[test]
    fn test_readable_tag_restores() {
        let mut document = StateDocument::new("root");
        document.children.push(StateNode::value("point", ""));
        let mut traverser = StateTraverser::new(&document);
        assert_eq!(restore_tagged::<Shape>(&1, &mut traverser).unwrap(), Shape::Point);
    }

    #[test]
    fn test_zero_or_two_variants_mismatch() {
        let document = persisted(&[]);
        let mut traverser = StateTraverser::new(&document);
        assert!(matches!(
            restore_tagged::<Shape>(&1, &mut traverser),
            Err(PersistError::TagMismatch { found: 0, .. })
        ));

        let document = persisted(&[Shape::Point, Shape::Circle(1)]);
        let mut traverser = StateTraverser::new(&document);
        assert!(matches!(
            restore_tagged::<Shape>(&1, &mut traverser),
            Err(PersistError::TagMismatch { found: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_tag_fails_immediately() {
        let mut document = persisted(&[Shape::Point]);
        document.children.insert(0, StateNode::value("z", "1"));
        let mut traverser = StateTraverser::new(&document);
        match restore_tagged::<Shape>(&1, &mut traverser) {
            Err(PersistError::UnknownTag { family, tag }) => {
                assert_eq!(family, "shape");
                assert_eq!(tag, "z");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
