use std::cmp::Ordering;
use std::collections::HashMap;

use super::{Property, PropertyId, PropertyType};
use crate::error::{EngineError, ErrorSeverity};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Property `{id}` appears more than once")]
    DuplicateId { id: PropertyId },

    #[error("Property `{id}` is its own ancestor")]
    ParentCycle { id: PropertyId },
}

impl EngineError for TreeError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Internal
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateId { .. } => "TREE_DUPLICATE_ID",
            Self::ParentCycle { .. } => "TREE_PARENT_CYCLE",
        }
    }
}

/// Arena of a creature's live properties in tree order.
///
/// Parent links are the source of truth. Tree order (and the nested-set
/// `left`/`right` bounds) is derived at construction: roots and siblings sort
/// by `(order, id)`, depth first. Removed properties are dropped, and a
/// property whose parent is unknown or removed becomes a root.
#[derive(Clone, Debug, Default)]
pub struct PropertyTree {
    nodes: Vec<Property>,
    index: HashMap<PropertyId, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    /// Exclusive end of each node's subtree in `nodes`.
    end: Vec<usize>,
    bounds: Vec<(u32, u32)>,
}

fn sibling_order(a: &Property, b: &Property) -> Ordering {
    a.order.total_cmp(&b.order).then_with(|| a.id.cmp(&b.id))
}

impl PropertyTree {
    pub fn new(properties: impl IntoIterator<Item = Property>) -> Result<Self, TreeError> {
        let input: Vec<Property> = properties.into_iter().filter(|p| !p.removed).collect();

        let mut lookup: HashMap<&str, usize> = HashMap::with_capacity(input.len());
        for (i, property) in input.iter().enumerate() {
            if lookup.insert(property.id.as_str(), i).is_some() {
                return Err(TreeError::DuplicateId {
                    id: property.id.clone(),
                });
            }
        }

        let parent_of: Vec<Option<usize>> = input
            .iter()
            .enumerate()
            .map(|(i, property)| {
                property
                    .parent_id
                    .as_deref()
                    .and_then(|parent| lookup.get(parent).copied())
                    .filter(|&parent| parent != i)
            })
            .collect();

        let mut kids: Vec<Vec<usize>> = vec![Vec::new(); input.len()];
        let mut roots = Vec::new();
        for (i, parent) in parent_of.iter().enumerate() {
            match parent {
                Some(parent) => kids[*parent].push(i),
                None => roots.push(i),
            }
        }
        let by_order = |a: &usize, b: &usize| sibling_order(&input[*a], &input[*b]);
        roots.sort_by(by_order);
        for list in &mut kids {
            list.sort_by(by_order);
        }

        // Depth-first numbering; `preorder` maps old index to tree position.
        let mut preorder: Vec<Option<usize>> = vec![None; input.len()];
        let mut sequence = Vec::with_capacity(input.len());
        let mut left = vec![0u32; input.len()];
        let mut right = vec![0u32; input.len()];
        let mut counter = 0u32;
        let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&i| (i, false)).collect();
        while let Some((i, exiting)) = stack.pop() {
            counter += 1;
            if exiting {
                right[i] = counter;
                continue;
            }
            left[i] = counter;
            preorder[i] = Some(sequence.len());
            sequence.push(i);
            stack.push((i, true));
            stack.extend(kids[i].iter().rev().map(|&child| (child, false)));
        }

        if let Some(unreached) = preorder.iter().position(Option::is_none) {
            return Err(TreeError::ParentCycle {
                id: input[unreached].id.clone(),
            });
        }

        let position = |old: usize| preorder[old].unwrap_or_default();
        let mut slots: Vec<Option<Property>> = input.into_iter().map(Some).collect();
        let mut tree = Self::default();
        for &old in &sequence {
            let Some(property) = slots[old].take() else {
                continue;
            };
            tree.index.insert(property.id.clone(), tree.nodes.len());
            tree.nodes.push(property);
            tree.parent.push(parent_of[old].map(position));
            tree.children.push(kids[old].iter().map(|&c| position(c)).collect());
            tree.bounds.push((left[old], right[old]));
        }
        tree.end = (0..tree.nodes.len())
            .map(|i| {
                let (l, r) = tree.bounds[i];
                // A subtree of k nodes spans 2k counter ticks.
                i + ((r - l + 1) / 2) as usize
            })
            .collect();
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Every property in tree order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Property> {
        self.nodes.iter_mut()
    }

    pub fn get(&self, id: &str) -> Option<&Property> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Property> {
        self.index.get(id).map(|&i| &mut self.nodes[i])
    }

    /// Position in tree order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Nested-set bounds, numbered from 1.
    pub fn bounds(&self, id: &str) -> Option<(u32, u32)> {
        self.index.get(id).map(|&i| self.bounds[i])
    }

    pub fn parent(&self, id: &str) -> Option<&Property> {
        let i = *self.index.get(id)?;
        self.parent[i].map(|p| &self.nodes[p])
    }

    /// Ancestors from the root down; the nearest ancestor is last.
    pub fn ancestors(&self, id: &str) -> Vec<&Property> {
        let mut chain = Vec::new();
        let mut cursor = self.index.get(id).and_then(|&i| self.parent[i]);
        while let Some(i) = cursor {
            chain.push(&self.nodes[i]);
            cursor = self.parent[i];
        }
        chain.reverse();
        chain
    }

    pub fn nearest_ancestor_of_type(&self, id: &str, kind: PropertyType) -> Option<&Property> {
        self.ancestors(id)
            .into_iter()
            .rev()
            .find(|ancestor| ancestor.property_type() == kind)
    }

    /// Descendants in tree order, excluding the property itself.
    pub fn descendants(&self, id: &str) -> &[Property] {
        match self.index.get(id) {
            Some(&i) => &self.nodes[i + 1..self.end[i]],
            None => &[],
        }
    }

    pub fn children(&self, id: &str) -> Vec<&Property> {
        match self.index.get(id) {
            Some(&i) => self.children[i].iter().map(|&c| &self.nodes[c]).collect(),
            None => Vec::new(),
        }
    }

    pub fn of_type(&self, kind: PropertyType) -> impl Iterator<Item = &Property> {
        self.nodes
            .iter()
            .filter(move |property| property.property_type() == kind)
    }

    pub fn into_properties(self) -> Vec<Property> {
        self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{FolderProp, PropertyKind};

    fn folder(id: &str) -> Property {
        Property::new(id, PropertyKind::Folder(FolderProp::default()))
    }

    fn ids<'a>(properties: impl IntoIterator<Item = &'a Property>) -> Vec<&'a str> {
        properties.into_iter().map(|p| p.id.as_str()).collect()
    }

    fn sample() -> PropertyTree {
        PropertyTree::new([
            folder("b").ordered(2.0),
            folder("a").ordered(1.0),
            folder("a2").child_of("a").ordered(2.0),
            folder("a1").child_of("a").ordered(1.0),
            folder("a1x").child_of("a1"),
            folder("orphan").child_of("missing").ordered(3.0),
        ])
        .expect("valid tree")
    }

    #[test]
    fn orders_depth_first_by_sibling_key() {
        let tree = sample();
        assert_eq!(ids(tree.iter()), vec!["a", "a1", "a1x", "a2", "b", "orphan"]);
    }

    #[test]
    fn bounds_nest() {
        let tree = sample();
        assert_eq!(tree.bounds("a"), Some((1, 8)));
        assert_eq!(tree.bounds("a1"), Some((2, 5)));
        assert_eq!(tree.bounds("a1x"), Some((3, 4)));
        assert_eq!(tree.bounds("a2"), Some((6, 7)));
        assert_eq!(tree.bounds("b"), Some((9, 10)));
    }

    #[test]
    fn navigates_relatives() {
        let tree = sample();
        assert_eq!(ids(tree.ancestors("a1x")), vec!["a", "a1"]);
        assert_eq!(ids(tree.descendants("a")), vec!["a1", "a1x", "a2"]);
        assert_eq!(ids(tree.children("a")), vec!["a1", "a2"]);
        assert!(tree.parent("orphan").is_none());
    }

    #[test]
    fn removed_properties_orphan_their_children() {
        let mut removed = folder("gone");
        removed.removed = true;
        let tree = PropertyTree::new([removed, folder("kept").child_of("gone")]).expect("valid");
        assert_eq!(ids(tree.iter()), vec!["kept"]);
        assert!(tree.parent("kept").is_none());
    }

    #[test]
    fn rejects_duplicates_and_cycles() {
        assert_eq!(
            PropertyTree::new([folder("x"), folder("x")]).err(),
            Some(TreeError::DuplicateId { id: "x".into() })
        );
        assert!(matches!(
            PropertyTree::new([folder("p").child_of("q"), folder("q").child_of("p")]),
            Err(TreeError::ParentCycle { .. })
        ));
    }
}
