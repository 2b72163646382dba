//! Dependency graph between properties, variables and calculated fields.
//!
//! An edge `a -> b` reads "a depends on b": `b` is computed before `a`.
//! The graph is rebuilt from scratch every pass; formulas can reference new
//! names between passes, so there is nothing worth keeping.

use std::collections::HashMap;
use std::fmt;

use strum::AsRefStr;

use super::fields::Formulas;
use crate::formula::{Node, inline};
use crate::property::{AttributeType, Property, PropertyKind, PropertyTree, PropertyType};
use crate::tags::{TagIndex, TagTargeting};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Property(String),
    Variable(String),
    /// A calculated field, `"<propId>.<path>"`.
    Calculation { prop_id: String, path: String },
    /// An inline text field.
    Text { prop_id: String, field: String },
}

impl NodeKey {
    pub fn property(id: &str) -> Self {
        Self::Property(id.to_owned())
    }

    pub fn variable(name: &str) -> Self {
        Self::Variable(name.to_owned())
    }

    pub fn calculation(prop_id: &str, path: &str) -> Self {
        Self::Calculation {
            prop_id: prop_id.to_owned(),
            path: path.to_owned(),
        }
    }

    pub fn text(prop_id: &str, field: &str) -> Self {
        Self::Text {
            prop_id: prop_id.to_owned(),
            field: field.to_owned(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(id) => f.write_str(id),
            Self::Variable(name) => f.write_str(name),
            Self::Calculation { prop_id, path } => write!(f, "{prop_id}.{path}"),
            Self::Text { prop_id, field } => write!(f, "{prop_id}.{field}"),
        }
    }
}

/// Why one node depends on another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum EdgeKind {
    Calculation,
    Inline,
    Reference,
    Ancestor,
    Definition,
    HitDiceConMod,
    SkillAbilityScore,
    SkillProficiencyBonus,
    ClassLevel,
    Level,
    Inventory,
    Resource,
    Effect,
    Proficiency,
    DamageMultiplier,
    Toggle,
}

#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    keys: Vec<NodeKey>,
    index: HashMap<NodeKey, usize>,
    dependencies: Vec<Vec<(usize, EdgeKind)>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Position of `key`, inserting it when new.
    pub fn node(&mut self, key: NodeKey) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.keys.len();
        self.index.insert(key.clone(), i);
        self.keys.push(key);
        self.dependencies.push(Vec::new());
        i
    }

    pub fn position(&self, key: &NodeKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key(&self, i: usize) -> &NodeKey {
        &self.keys[i]
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.keys.iter()
    }

    /// Records that `from` depends on `to`. Repeated links are ignored.
    pub fn link(&mut self, from: NodeKey, to: NodeKey, kind: EdgeKind) {
        let from = self.node(from);
        let to = self.node(to);
        if !self.dependencies[from].iter().any(|(j, _)| *j == to) {
            self.dependencies[from].push((to, kind));
        }
    }

    pub fn has_link(&self, from: &NodeKey, to: &NodeKey) -> bool {
        match (self.position(from), self.position(to)) {
            (Some(from), Some(to)) => self.dependencies[from].iter().any(|(j, _)| *j == to),
            _ => false,
        }
    }

    pub fn dependencies(&self, i: usize) -> &[(usize, EdgeKind)] {
        &self.dependencies[i]
    }

    /// Keys `i` depends on through edges of `kind`, in link order.
    pub fn linked(&self, i: usize, kind: EdgeKind) -> impl Iterator<Item = &NodeKey> {
        self.dependencies[i]
            .iter()
            .filter(move |(_, k)| *k == kind)
            .map(|(j, _)| &self.keys[*j])
    }

    /// Links every property of `tree`.
    ///
    /// Property nodes are inserted first, in tree order, so a walk over node
    /// positions visits properties in tree order.
    pub fn build(tree: &PropertyTree, formulas: &Formulas) -> Self {
        let mut graph = Self::new();
        let mut tags = TagIndex::new();
        for property in tree.iter() {
            graph.node(NodeKey::property(&property.id));
            if property.is_active() {
                tags.insert(&property.id, &property.tags);
            }
        }
        let mut linker = Linker {
            graph,
            tree,
            formulas,
            tags: &tags,
        };
        for property in tree.iter() {
            linker.link_fields(property);
            if property.is_active() {
                linker.link_type(property);
            }
        }
        linker.graph
    }
}

struct Linker<'a> {
    graph: DependencyGraph,
    tree: &'a PropertyTree,
    formulas: &'a Formulas,
    tags: &'a TagIndex,
}

impl Linker<'_> {
    fn link_fields(&mut self, property: &Property) {
        let prop = NodeKey::property(&property.id);
        for (path, parsed) in self.formulas.fields(&property.id) {
            let calc = NodeKey::calculation(&property.id, path);
            self.graph.link(prop.clone(), calc.clone(), EdgeKind::Calculation);
            if let Ok(node) = parsed {
                self.link_references(property, &calc, node);
            }
        }
        for (field, text) in property.kind.texts() {
            let key = NodeKey::text(&property.id, field);
            self.graph.link(prop.clone(), key.clone(), EdgeKind::Inline);
            for node in inline::calculations(&text.text) {
                self.link_references(property, &key, &node);
            }
        }
    }

    fn link_references(&mut self, property: &Property, from: &NodeKey, node: &Node) {
        for name in node.referenced_symbols() {
            if name.starts_with('~') {
                continue;
            }
            if let Some(type_name) = name.strip_prefix('#') {
                if let Ok(kind) = type_name.parse::<PropertyType>()
                    && let Some(ancestor) = self.tree.nearest_ancestor_of_type(&property.id, kind)
                {
                    let to = NodeKey::property(&ancestor.id);
                    self.graph.link(from.clone(), to, EdgeKind::Ancestor);
                }
                continue;
            }
            self.graph
                .link(from.clone(), NodeKey::variable(&name), EdgeKind::Reference);
        }
    }

    fn link_type(&mut self, property: &Property) {
        let prop = NodeKey::property(&property.id);
        if let Some(name) = property.variable_name() {
            self.graph
                .link(NodeKey::variable(name), prop.clone(), EdgeKind::Definition);
        }
        match &property.kind {
            PropertyKind::Attribute(attribute) => {
                if attribute.attribute_type == AttributeType::HitDice {
                    let constitution = NodeKey::variable("constitution");
                    self.graph.link(prop, constitution, EdgeKind::HitDiceConMod);
                }
            }
            PropertyKind::Skill(skill) => {
                if let Some(ability) = skill.ability.as_deref().filter(|a| !a.is_empty()) {
                    let ability = NodeKey::variable(ability);
                    self.graph
                        .link(prop.clone(), ability, EdgeKind::SkillAbilityScore);
                }
                let bonus = NodeKey::variable("proficiencyBonus");
                self.graph.link(prop, bonus, EdgeKind::SkillProficiencyBonus);
            }
            PropertyKind::ClassLevel(class_level) => {
                if !class_level.variable_name.is_empty() && class_level.level > 0 {
                    let class = NodeKey::variable(&class_level.variable_name);
                    self.graph.link(class.clone(), prop, EdgeKind::ClassLevel);
                    let level = NodeKey::variable("level");
                    if !self.graph.has_link(&level, &class) {
                        self.graph.link(level, class, EdgeKind::Level);
                    }
                }
            }
            PropertyKind::Action(_) | PropertyKind::Spell(_) => self.link_resources(property),
            PropertyKind::Effect(effect) => {
                self.link_targets(
                    property,
                    effect.target_by_tags,
                    &effect.targeting,
                    effect.target_field.as_deref(),
                    &effect.stats,
                    EdgeKind::Effect,
                );
            }
            PropertyKind::Proficiency(proficiency) => {
                self.link_targets(
                    property,
                    proficiency.target_by_tags,
                    &proficiency.targeting,
                    proficiency.target_field.as_deref(),
                    &proficiency.stats,
                    EdgeKind::Proficiency,
                );
            }
            PropertyKind::DamageMultiplier(multiplier) => {
                for damage_type in &multiplier.damage_types {
                    let Some(name) = multiplier_variable(damage_type) else {
                        continue;
                    };
                    self.graph.link(
                        NodeKey::variable(&name),
                        prop.clone(),
                        EdgeKind::DamageMultiplier,
                    );
                }
            }
            PropertyKind::Toggle(_) => {
                for descendant in self.tree.descendants(&property.id) {
                    let from = NodeKey::property(&descendant.id);
                    self.graph.link(from, prop.clone(), EdgeKind::Toggle);
                }
            }
            _ => {}
        }
    }

    fn link_resources(&mut self, property: &Property) {
        let Some(action) = property.kind.action() else {
            return;
        };
        let prop = NodeKey::property(&property.id);
        for consumed in &action.resources.items_consumed {
            let Some(item_id) = consumed.item_id.as_deref() else {
                continue;
            };
            if self.tree.get(item_id).is_some_and(Property::is_active) {
                self.graph
                    .link(prop.clone(), NodeKey::property(item_id), EdgeKind::Inventory);
            }
        }
        for consumed in &action.resources.attributes_consumed {
            if let Some(name) = consumed.variable_name.as_deref().filter(|n| !n.is_empty()) {
                self.graph
                    .link(prop.clone(), NodeKey::variable(name), EdgeKind::Resource);
            }
        }
    }

    fn link_targets(
        &mut self,
        property: &Property,
        by_tags: bool,
        targeting: &TagTargeting,
        target_field: Option<&str>,
        stats: &[String],
        kind: EdgeKind,
    ) {
        let prop = NodeKey::property(&property.id);
        if !by_tags {
            for stat in stats.iter().filter(|stat| !stat.is_empty()) {
                self.graph.link(NodeKey::variable(stat), prop.clone(), kind);
            }
            return;
        }
        for target_id in self.tags.select(targeting) {
            if target_id == property.id {
                continue;
            }
            let Some(target) = self.tree.get(&target_id) else {
                continue;
            };
            let Some(field) = target_field
                .filter(|field| !field.is_empty())
                .or_else(|| target.kind.default_target_field())
            else {
                continue;
            };
            if self.formulas.get(&target_id, field).is_some() {
                let calc = NodeKey::calculation(&target_id, field);
                self.graph.link(calc, prop.clone(), kind);
            }
        }
    }
}

/// Scope name holding the multiplier for a damage type: `fire` -> `fireMultiplier`.
pub fn multiplier_variable(damage_type: &str) -> Option<String> {
    let letters: String = damage_type
        .chars()
        .filter(char::is_ascii_alphabetic)
        .collect();
    (!letters.is_empty()).then(|| format!("{letters}Multiplier"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{
        AttributeProp, Calculation, ClassLevelProp, EffectProp, PropertyTree, ToggleProp,
    };

    fn attribute(id: &str, variable: &str, base: &str) -> Property {
        Property::new(
            id,
            PropertyKind::Attribute(AttributeProp {
                variable_name: variable.into(),
                base_value: Some(Calculation::new(base)),
                ..AttributeProp::default()
            }),
        )
    }

    fn build(properties: Vec<Property>) -> DependencyGraph {
        let tree = PropertyTree::new(properties).expect("valid tree");
        let formulas = Formulas::parse(&tree);
        DependencyGraph::build(&tree, &formulas)
    }

    #[test]
    fn definitions_and_references_link() {
        let graph = build(vec![
            attribute("str", "strength", "10"),
            attribute("carry", "carryWeight", "strength * 15"),
        ]);
        assert!(graph.has_link(&NodeKey::variable("strength"), &NodeKey::property("str")));
        assert!(graph.has_link(
            &NodeKey::property("carry"),
            &NodeKey::calculation("carry", "baseValue")
        ));
        assert!(graph.has_link(
            &NodeKey::calculation("carry", "baseValue"),
            &NodeKey::variable("strength")
        ));
    }

    #[test]
    fn tag_targeted_effects_link_to_the_target_field() {
        let effect = Property::new(
            "fx",
            PropertyKind::Effect(EffectProp {
                amount: Some(Calculation::new("2")),
                target_by_tags: true,
                targeting: TagTargeting::tags(["tag1"]),
                ..EffectProp::default()
            }),
        );
        let graph = build(vec![attribute("str", "strength", "10").tagged(["tag1"]), effect]);
        assert!(graph.has_link(
            &NodeKey::calculation("str", "baseValue"),
            &NodeKey::property("fx")
        ));
    }

    #[test]
    fn class_levels_link_through_the_class_variable() {
        let level = |id: &str| {
            Property::new(
                id,
                PropertyKind::ClassLevel(ClassLevelProp {
                    variable_name: "wizard".into(),
                    level: 1,
                }),
            )
        };
        let graph = build(vec![level("w1"), level("w2")]);
        let wizard = NodeKey::variable("wizard");
        assert!(graph.has_link(&wizard, &NodeKey::property("w1")));
        assert!(graph.has_link(&wizard, &NodeKey::property("w2")));
        assert_eq!(
            graph
                .linked(
                    graph.position(&NodeKey::variable("level")).unwrap_or_default(),
                    EdgeKind::Level
                )
                .count(),
            1
        );
    }

    #[test]
    fn toggle_descendants_depend_on_the_toggle() {
        let toggle = Property::new("t", PropertyKind::Toggle(ToggleProp::default()));
        let graph = build(vec![toggle, attribute("a", "hp", "1").child_of("t")]);
        assert!(graph.has_link(&NodeKey::property("a"), &NodeKey::property("t")));
    }

    #[test]
    fn multiplier_names_keep_letters_only() {
        assert_eq!(multiplier_variable("fire"), Some("fireMultiplier".into()));
        assert_eq!(multiplier_variable("cold-iron"), Some("coldironMultiplier".into()));
        assert_eq!(multiplier_variable("--"), None);
    }
}
