use creature_core::property::TriggerTiming;
use creature_core::{CreatureId, Property, PropertyKind, TriggerFamily};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::LogContent;

impl ActionEngine<'_> {
    pub(super) async fn apply_note(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let silent = property.kind.is_silent();
        let index = self.new_result(Some(&property.id), &target_ids);
        let summary = self.render_text(&property, "summary").await?;
        if property.name.is_some() || summary.is_some() {
            let content = LogContent {
                name: property.name.clone(),
                value: summary,
                inline: false,
                silenced: silent,
            };
            self.log(index, content, &target_ids);
        }
        if let Some(description) = self.render_text(&property, "description").await? {
            self.log(index, LogContent::valued(description).silenced(silent), &target_ids);
        }
        self.default_tail(&property, &target_ids).await
    }

    pub(super) async fn apply_trigger(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let index = self.new_result(Some(&property.id), &target_ids);
        let mut content = LogContent::named(property.title()).silenced(property.kind.is_silent());
        if let Some(description) = self.render_text(&property, "description").await? {
            content = content.with_value(description);
        }
        self.log(index, content, &target_ids);
        self.default_tail(&property, &target_ids).await
    }

    /// Children run only while the toggle's condition holds.
    pub(super) async fn apply_toggle(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        if !matches!(property.kind, PropertyKind::Toggle(_)) {
            return Ok(());
        }
        self.apply_triggers(&property, TriggerFamily::Prop, TriggerTiming::After, &target_ids)
            .await?;
        if self.condition_holds(&property).await? {
            self.apply_children(&property.id, &target_ids).await?;
        }
        self.apply_triggers(
            &property,
            TriggerFamily::Prop,
            TriggerTiming::AfterChildren,
            &target_ids,
        )
        .await
    }
}
