//! Trigger linking.
//!
//! Each active trigger is appended, in tree order, to the trigger ids of every
//! active property it watches:
//!
//! | event              | watched properties                        | family  |
//! |--------------------|-------------------------------------------|---------|
//! | `doActionProperty` | `actionPropertyType` (any when unset)     | `Prop`  |
//! | `doActionProperty` | items, when `actionPropertyType` is item  | `Ammo`  |
//! | `damageProperty`   | attributes                                | `Damage`|
//! | `check`            | attributes and skills                     | `Check` |
//!
//! Rest events are not linked; reset tasks look them up directly.

use crate::property::{
    Property, PropertyKind, PropertyTree, PropertyType, TriggerEvent, TriggerFamily,
    TriggerProp, TriggerTiming,
};

pub fn link_triggers(tree: &mut PropertyTree) {
    let mut links: Vec<(String, TriggerFamily, TriggerTiming, String)> = Vec::new();
    for trigger in tree.iter().filter(|p| p.is_active()) {
        let PropertyKind::Trigger(payload) = &trigger.kind else {
            continue;
        };
        for target in tree.iter() {
            if target.id == trigger.id || !target.is_active() {
                continue;
            }
            if !payload.targeting.matches(&target.tags) {
                continue;
            }
            if let Some(family) = family_for(payload, target) {
                links.push((target.id.clone(), family, payload.timing, trigger.id.clone()));
            }
        }
    }
    for (target_id, family, timing, trigger_id) in links {
        let Some(target) = tree.get_mut(&target_id) else {
            continue;
        };
        let ids = target.derived.trigger_ids.entry(family).or_default();
        let bucket = match timing {
            TriggerTiming::Before => &mut ids.before,
            TriggerTiming::After => &mut ids.after,
            TriggerTiming::AfterChildren => &mut ids.after_children,
        };
        bucket.push(trigger_id);
    }
}

fn family_for(trigger: &TriggerProp, target: &Property) -> Option<TriggerFamily> {
    let kind = target.property_type();
    match trigger.event {
        TriggerEvent::DoActionProperty => match trigger.action_property_type {
            Some(PropertyType::Item) if kind == PropertyType::Item => Some(TriggerFamily::Ammo),
            Some(wanted) if wanted == kind => Some(TriggerFamily::Prop),
            Some(_) => None,
            None if kind == PropertyType::Trigger => None,
            None => Some(TriggerFamily::Prop),
        },
        TriggerEvent::DamageProperty => {
            (kind == PropertyType::Attribute).then_some(TriggerFamily::Damage)
        }
        TriggerEvent::Check => matches!(kind, PropertyType::Attribute | PropertyType::Skill)
            .then_some(TriggerFamily::Check),
        TriggerEvent::AnyRest | TriggerEvent::LongRest | TriggerEvent::ShortRest => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::activation::apply_activation;
    use crate::property::{ActionProp, AttributeProp, ItemProp, NoteProp};
    use crate::tags::{ExtraTags, TagTargeting};

    fn trigger(event: TriggerEvent, timing: TriggerTiming) -> TriggerProp {
        TriggerProp {
            event,
            timing,
            ..TriggerProp::default()
        }
    }

    fn linked(properties: Vec<Property>) -> PropertyTree {
        let mut tree = PropertyTree::new(properties).expect("valid tree");
        apply_activation(&mut tree);
        link_triggers(&mut tree);
        tree
    }

    fn ids(tree: &PropertyTree, id: &str, family: TriggerFamily) -> Vec<String> {
        tree.get(id)
            .and_then(|p| p.derived.triggers(family).cloned())
            .map(|ids| [ids.before, ids.after, ids.after_children].concat())
            .unwrap_or_default()
    }

    #[test]
    fn excluded_tags_alone_watch_everything_else() {
        let mut on_action = trigger(TriggerEvent::DoActionProperty, TriggerTiming::Before);
        on_action.targeting = TagTargeting::default().with_extra(ExtraTags::not(["cursed"]));
        let tree = linked(vec![
            Property::new("t1", PropertyKind::Trigger(on_action)),
            Property::new("swing", PropertyKind::Action(ActionProp::default())),
            Property::new("hex", PropertyKind::Action(ActionProp::default())).tagged(["cursed"]),
        ]);
        assert_eq!(ids(&tree, "swing", TriggerFamily::Prop), vec!["t1".to_owned()]);
        assert!(ids(&tree, "hex", TriggerFamily::Prop).is_empty());
    }

    #[test]
    fn action_triggers_link_by_type_and_tags() {
        let mut on_action = trigger(TriggerEvent::DoActionProperty, TriggerTiming::After);
        on_action.action_property_type = Some(PropertyType::Action);
        on_action.targeting = TagTargeting::tags(["melee"]);
        let tree = linked(vec![
            Property::new("t1", PropertyKind::Trigger(on_action)),
            Property::new("swing", PropertyKind::Action(ActionProp::default())).tagged(["melee"]),
            Property::new("shoot", PropertyKind::Action(ActionProp::default())).tagged(["ranged"]),
            Property::new("note", PropertyKind::Note(NoteProp::default())).tagged(["melee"]),
        ]);
        let swing = tree.get("swing").and_then(|p| p.derived.triggers(TriggerFamily::Prop));
        assert_eq!(swing.map(|ids| ids.after.clone()), Some(vec!["t1".to_string()]));
        assert!(ids(&tree, "shoot", TriggerFamily::Prop).is_empty());
        assert!(ids(&tree, "note", TriggerFamily::Prop).is_empty());
    }

    #[test]
    fn damage_check_and_ammo_families() {
        let damage = trigger(TriggerEvent::DamageProperty, TriggerTiming::Before);
        let check = trigger(TriggerEvent::Check, TriggerTiming::After);
        let mut ammo = trigger(TriggerEvent::DoActionProperty, TriggerTiming::After);
        ammo.action_property_type = Some(PropertyType::Item);
        let tree = linked(vec![
            Property::new("d", PropertyKind::Trigger(damage)),
            Property::new("c", PropertyKind::Trigger(check)),
            Property::new("a", PropertyKind::Trigger(ammo)),
            Property::new("hp", PropertyKind::Attribute(AttributeProp::default())),
            Property::new("arrows", PropertyKind::Item(ItemProp::default())),
        ]);
        assert_eq!(ids(&tree, "hp", TriggerFamily::Damage), vec!["d"]);
        assert_eq!(ids(&tree, "hp", TriggerFamily::Check), vec!["c"]);
        assert_eq!(ids(&tree, "arrows", TriggerFamily::Ammo), vec!["a"]);
        assert!(ids(&tree, "arrows", TriggerFamily::Prop).is_empty());
    }

    #[test]
    fn disabled_triggers_never_link() {
        let on_any = trigger(TriggerEvent::DoActionProperty, TriggerTiming::Before);
        let tree = linked(vec![
            Property::new("t", PropertyKind::Trigger(on_any)).disabled(),
            Property::new("swing", PropertyKind::Action(ActionProp::default())),
        ]);
        assert!(ids(&tree, "swing", TriggerFamily::Prop).is_empty());
    }
}
