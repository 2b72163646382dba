use creature_core::formula::format_number;
use creature_core::{CreatureId, Property, PropertyKind, ScopeEntry, Value};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::LogContent;

impl ActionEngine<'_> {
    /// Rolls into a variable that later properties of the action can read.
    pub(super) async fn apply_roll(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let PropertyKind::Roll(payload) = &property.kind else {
            return Ok(());
        };
        let payload = payload.clone();
        let index = self.new_result(Some(&property.id), &target_ids);
        let Some(rolled) = self.roll_calculation(&property, "roll").await? else {
            return self.default_tail(&property, &target_ids).await;
        };
        self.log_errors(index, &rolled.errors, &target_ids);

        let value = match &rolled.value {
            Some(Value::Number(n)) if !n.is_finite() => None,
            Some(value) => Some(value.clone()),
            None => None,
        };
        let Some(value) = value else {
            return self.default_tail(&property, &target_ids).await;
        };

        let shown = match &value {
            Value::Number(n) => format_number(*n),
            other => other.to_string(),
        };
        let mut lines = Vec::new();
        if !rolled.rolled.is_constant() {
            lines.push(rolled.text());
        }
        lines.push(format!("**{shown}**"));
        let content = LogContent {
            name: property.name.clone(),
            value: Some(lines.join("\n")),
            inline: true,
            silenced: payload.silent,
        };
        self.log(index, content, &target_ids);

        if !payload.variable_name.is_empty() {
            self.set_scope(index, &payload.variable_name, ScopeEntry::new(value));
        }
        self.default_tail(&property, &target_ids).await
    }
}
