//! Activation cascade.
//!
//! Runs in tree order before the graph walk, so a parent's flags are final
//! before its children are visited. Toggle conditions are only known during
//! the walk and refine the result through [`deactivate_by_toggle`].

use std::collections::HashSet;

use crate::property::{InactiveReasons, PropertyKind, PropertyTree};

/// Flags disabled properties and everything below an inactive property or an
/// unequipped item.
pub fn apply_activation(tree: &mut PropertyTree) {
    let mut blocking: HashSet<String> = HashSet::new();
    let mut flags = Vec::with_capacity(tree.len());
    for property in tree.iter() {
        let mut reasons = InactiveReasons::empty();
        if property.disabled {
            reasons |= InactiveReasons::SELF;
        }
        if property
            .parent_id
            .as_deref()
            .is_some_and(|parent| blocking.contains(parent))
        {
            reasons |= InactiveReasons::ANCESTOR;
        }
        let unequipped = matches!(&property.kind, PropertyKind::Item(item) if !item.equipped);
        if !reasons.is_empty() || unequipped {
            blocking.insert(property.id.clone());
        }
        flags.push(reasons);
    }
    for (property, reasons) in tree.iter_mut().zip(flags) {
        property.derived.inactive = reasons;
    }
}

/// Deactivates the descendants of a toggle whose condition came out falsy.
///
/// The nearest toggle that already deactivated a descendant keeps its id.
pub fn deactivate_by_toggle(tree: &mut PropertyTree, toggle_id: &str) {
    let ids: Vec<String> = tree
        .descendants(toggle_id)
        .iter()
        .map(|descendant| descendant.id.clone())
        .collect();
    for id in ids {
        let Some(descendant) = tree.get_mut(&id) else {
            continue;
        };
        descendant.derived.inactive |= InactiveReasons::TOGGLE;
        if descendant.derived.deactivating_toggle_id.is_none() {
            descendant.derived.deactivating_toggle_id = Some(toggle_id.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{FolderProp, ItemProp, Property};

    fn folder(id: &str) -> Property {
        Property::new(id, PropertyKind::Folder(FolderProp::default()))
    }

    fn tree(properties: Vec<Property>) -> PropertyTree {
        let mut tree = PropertyTree::new(properties).expect("valid tree");
        apply_activation(&mut tree);
        tree
    }

    fn reasons(tree: &PropertyTree, id: &str) -> InactiveReasons {
        tree.get(id).map(|p| p.derived.inactive).unwrap_or_default()
    }

    #[test]
    fn disabled_properties_deactivate_their_subtree() {
        let tree = tree(vec![
            folder("root").disabled(),
            folder("child").child_of("root"),
            folder("grandchild").child_of("child"),
            folder("sibling"),
        ]);
        assert_eq!(reasons(&tree, "root"), InactiveReasons::SELF);
        assert_eq!(reasons(&tree, "child"), InactiveReasons::ANCESTOR);
        assert_eq!(reasons(&tree, "grandchild"), InactiveReasons::ANCESTOR);
        assert!(reasons(&tree, "sibling").is_empty());
    }

    #[test]
    fn unequipped_items_stay_active_but_their_children_do_not() {
        let item = Property::new(
            "sword",
            PropertyKind::Item(ItemProp {
                equipped: false,
                ..ItemProp::default()
            }),
        );
        let tree = tree(vec![item, folder("bonus").child_of("sword")]);
        assert!(reasons(&tree, "sword").is_empty());
        assert_eq!(reasons(&tree, "bonus"), InactiveReasons::ANCESTOR);
    }

    #[test]
    fn toggles_mark_descendants_with_their_id() {
        let mut tree = tree(vec![
            folder("outer"),
            folder("inner").child_of("outer"),
            folder("leaf").child_of("inner"),
        ]);
        deactivate_by_toggle(&mut tree, "outer");
        deactivate_by_toggle(&mut tree, "inner");
        let leaf = tree.get("leaf").expect("leaf");
        assert!(leaf.derived.deactivated_by_toggle());
        assert_eq!(leaf.derived.deactivating_toggle_id.as_deref(), Some("outer"));
        assert!(tree.get("outer").is_some_and(Property::is_active));
    }
}
