use std::collections::HashMap;

use crate::formula::{FormulaError, Node, parse};
use crate::property::{PropertyKind, PropertyTree};

type Parsed = Result<Node, FormulaError>;

/// Every calculated field of a tree, parsed once per pass.
#[derive(Clone, Debug, Default)]
pub struct Formulas {
    by_property: HashMap<String, Vec<(String, Parsed)>>,
}

impl Formulas {
    pub fn parse(tree: &PropertyTree) -> Self {
        let mut by_property = HashMap::with_capacity(tree.len());
        for property in tree.iter() {
            let mut fields: Vec<(String, Parsed)> = property
                .kind
                .calculations()
                .into_iter()
                .map(|(path, calculation)| (path, parse(&calculation.calculation)))
                .collect();
            if let PropertyKind::Constant(constant) = &property.kind {
                fields.push(("calculation".to_owned(), parse(&constant.calculation)));
            }
            if !fields.is_empty() {
                by_property.insert(property.id.clone(), fields);
            }
        }
        Self { by_property }
    }

    /// Parsed fields of one property, in declaration order.
    pub fn fields(&self, prop_id: &str) -> impl Iterator<Item = (&str, &Parsed)> {
        self.by_property
            .get(prop_id)
            .into_iter()
            .flatten()
            .map(|(path, parsed)| (path.as_str(), parsed))
    }

    pub fn get(&self, prop_id: &str, path: &str) -> Option<&Parsed> {
        self.fields(prop_id)
            .find(|(candidate, _)| *candidate == path)
            .map(|(_, parsed)| parsed)
    }
}
