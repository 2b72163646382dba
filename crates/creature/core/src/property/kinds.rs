//! Per-type property payloads.
//!
//! One struct per property type, holding only stored inputs. Calculated inputs
//! are [`Calculation`]s and inline text inputs are [`InlineText`]s; their
//! computed outcomes live in the derived layer keyed by field path.

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use super::PropertyId;
use crate::tags::{ExtraTags, TagTargeting};

/// A calculated input field: `{ "calculation": "strength.modifier + 2" }`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calculation {
    pub calculation: String,
}

impl Calculation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            calculation: text.into(),
        }
    }
}

impl From<&str> for Calculation {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// A text input with embedded `{calculation}` segments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InlineText {
    pub text: String,
}

impl From<&str> for InlineText {
    fn from(text: &str) -> Self {
        Self { text: text.into() }
    }
}

// ============================================================================
// Property types
// ============================================================================

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum PropertyType {
    Action,
    Adjustment,
    Attribute,
    Branch,
    Buff,
    BuffRemover,
    Class,
    ClassLevel,
    Constant,
    Container,
    Damage,
    DamageMultiplier,
    Effect,
    Feature,
    Folder,
    Item,
    Note,
    Proficiency,
    Roll,
    SavingThrow,
    Skill,
    Slot,
    Spell,
    SpellList,
    Toggle,
    Trigger,
}

/// Who an applied property acts on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum TargetMode {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "self"))]
    Caster,
    Target,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum ActionTarget {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "self"))]
    Caster,
    SingleTarget,
    MultipleTargets,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum ActionType {
    #[default]
    Action,
    Bonus,
    Attack,
    Reaction,
    Free,
    Long,
    Event,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "camelCase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum AttributeType {
    Ability,
    #[default]
    Stat,
    Modifier,
    HitDice,
    HealthBar,
    Resource,
    SpellSlot,
    Utility,
}

impl AttributeType {
    /// `healthBar` reads as "Health bar".
    pub fn title(&self) -> String {
        let mut title = String::new();
        for (i, c) in self.as_ref().chars().enumerate() {
            if i == 0 {
                title.extend(c.to_uppercase());
            } else if c.is_uppercase() {
                title.push(' ');
                title.extend(c.to_lowercase());
            } else {
                title.push(c);
            }
        }
        title
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum AdjustmentOperation {
    Set,
    #[default]
    Increment,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum BranchType {
    #[default]
    If,
    Hit,
    Miss,
    FailedSave,
    SuccessfulSave,
    Random,
    Index,
    EachTarget,
    Choice,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum EffectOperation {
    Base,
    #[default]
    Add,
    Mul,
    Min,
    Max,
    Set,
    Advantage,
    Disadvantage,
    PassiveAdd,
    Fail,
    Conditional,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum SkillType {
    #[default]
    Skill,
    Save,
    Check,
    Tool,
    Weapon,
    Armor,
    Language,
    Utility,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "camelCase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum TriggerEvent {
    #[default]
    DoActionProperty,
    Check,
    DamageProperty,
    AnyRest,
    LongRest,
    ShortRest,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum TriggerTiming {
    #[default]
    Before,
    After,
    AfterChildren,
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ItemConsumed {
    pub item_id: Option<PropertyId>,
    pub tag: Option<String>,
    pub quantity: Option<Calculation>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct AttributeConsumed {
    pub variable_name: Option<String>,
    pub quantity: Option<Calculation>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct Resources {
    pub items_consumed: Vec<ItemConsumed>,
    pub attributes_consumed: Vec<AttributeConsumed>,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ActionProp {
    pub action_type: ActionType,
    /// Event name when `action_type` is `event`.
    pub variable_name: Option<String>,
    pub target: ActionTarget,
    pub attack_roll: Option<Calculation>,
    pub uses: Option<Calculation>,
    pub uses_used: f64,
    pub reset: Option<String>,
    pub resources: Resources,
    pub summary: Option<InlineText>,
    pub description: Option<InlineText>,
    pub silent: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct SpellProp {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub action: ActionProp,
    pub level: u32,
    pub cast_without_spell_slots: bool,
    pub prepared: bool,
    pub always_prepared: bool,
    pub ritual: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct AdjustmentProp {
    pub amount: Option<Calculation>,
    pub target: TargetMode,
    pub stat: Option<String>,
    pub operation: AdjustmentOperation,
    pub silent: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct AttributeProp {
    pub variable_name: String,
    pub attribute_type: AttributeType,
    pub base_value: Option<Calculation>,
    pub spell_slot_level: Option<Calculation>,
    pub hit_dice_size: Option<String>,
    pub damage: f64,
    pub ignore_lower_limit: bool,
    pub ignore_upper_limit: bool,
    pub reset: Option<String>,
    pub description: Option<InlineText>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct BranchProp {
    pub branch_type: BranchType,
    pub condition: Option<Calculation>,
    pub silent: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct BuffProp {
    pub target: TargetMode,
    pub duration: Option<Calculation>,
    pub duration_spent: f64,
    pub description: Option<InlineText>,
    pub silent: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct BuffRemoverProp {
    pub target: TargetMode,
    pub target_parent_buff: bool,
    pub remove_all: bool,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub targeting: TagTargeting,
    pub silent: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ClassProp {
    pub variable_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ClassLevelProp {
    pub variable_name: String,
    pub level: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ConstantProp {
    pub variable_name: String,
    pub calculation: String,
}

/// Payload shared by containers and features.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct TextProp {
    pub summary: Option<InlineText>,
    pub description: Option<InlineText>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct FolderProp {}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct DamageSave {
    pub dc: Option<Calculation>,
    pub stat: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct DamageProp {
    pub amount: Option<Calculation>,
    pub target: TargetMode,
    pub damage_type: String,
    pub save: Option<DamageSave>,
    pub silent: bool,
}

impl Default for DamageProp {
    fn default() -> Self {
        Self {
            amount: None,
            target: TargetMode::Target,
            damage_type: "slashing".to_owned(),
            save: None,
            silent: false,
        }
    }
}

impl DamageProp {
    pub fn is_healing(&self) -> bool {
        self.damage_type == "healing"
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct DamageMultiplierProp {
    pub damage_types: Vec<String>,
    /// 0 immunity, 0.5 resistance, 2 vulnerability.
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct EffectProp {
    pub operation: EffectOperation,
    pub amount: Option<Calculation>,
    pub text: Option<String>,
    pub stats: Vec<String>,
    pub target_by_tags: bool,
    pub target_field: Option<String>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub targeting: TagTargeting,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ItemProp {
    pub quantity: f64,
    pub plural: Option<String>,
    pub equipped: bool,
    pub requires_attunement: bool,
    pub attuned: bool,
}

impl Default for ItemProp {
    fn default() -> Self {
        Self {
            quantity: 1.0,
            plural: None,
            equipped: false,
            requires_attunement: false,
            attuned: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct NoteProp {
    pub summary: Option<InlineText>,
    pub description: Option<InlineText>,
    pub silent: bool,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ProficiencyProp {
    /// 0, 0.49 (half rounded down), 0.5 (half rounded up), 1 or 2.
    pub value: f64,
    pub stats: Vec<String>,
    pub target_by_tags: bool,
    pub target_field: Option<String>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub targeting: TagTargeting,
}

impl Default for ProficiencyProp {
    fn default() -> Self {
        Self {
            value: 1.0,
            stats: Vec::new(),
            target_by_tags: false,
            target_field: None,
            targeting: TagTargeting::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct RollProp {
    pub variable_name: String,
    pub roll: Option<Calculation>,
    pub silent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct SavingThrowProp {
    pub dc: Option<Calculation>,
    pub target: TargetMode,
    pub stat: Option<String>,
    pub silent: bool,
}

impl Default for SavingThrowProp {
    fn default() -> Self {
        Self {
            dc: None,
            target: TargetMode::Target,
            stat: None,
            silent: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct SkillProp {
    pub variable_name: String,
    pub ability: Option<String>,
    pub skill_type: SkillType,
    pub base_proficiency: Option<f64>,
    pub base_value: Option<Calculation>,
    pub description: Option<InlineText>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct SlotProp {
    pub slot_tags: Vec<String>,
    pub extra_tags: Vec<ExtraTags>,
    pub quantity_expected: Option<Calculation>,
    pub slot_condition: Option<Calculation>,
}

impl SlotProp {
    pub fn targeting(&self) -> TagTargeting {
        TagTargeting {
            target_tags: self.slot_tags.clone(),
            extra_tags: self.extra_tags.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct SpellListProp {
    pub variable_name: Option<String>,
    pub max_prepared: Option<Calculation>,
    pub attack_roll_bonus: Option<Calculation>,
    pub dc: Option<Calculation>,
    pub description: Option<InlineText>,
}

/// Toggles use the common `disabled` flag for "always off".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ToggleProp {
    pub variable_name: Option<String>,
    pub enabled: bool,
    pub condition: Option<Calculation>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct TriggerProp {
    pub event: TriggerEvent,
    pub action_property_type: Option<PropertyType>,
    pub timing: TriggerTiming,
    pub condition: Option<Calculation>,
    pub description: Option<InlineText>,
    pub silent: bool,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub targeting: TagTargeting,
}

// ============================================================================
// PropertyKind
// ============================================================================

/// The typed payload of a property, discriminated by `type`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "camelCase"))]
pub enum PropertyKind {
    Action(ActionProp),
    Adjustment(AdjustmentProp),
    Attribute(AttributeProp),
    Branch(BranchProp),
    Buff(BuffProp),
    BuffRemover(BuffRemoverProp),
    Class(ClassProp),
    ClassLevel(ClassLevelProp),
    Constant(ConstantProp),
    Container(TextProp),
    Damage(DamageProp),
    DamageMultiplier(DamageMultiplierProp),
    Effect(EffectProp),
    Feature(TextProp),
    Folder(FolderProp),
    Item(ItemProp),
    Note(NoteProp),
    Proficiency(ProficiencyProp),
    Roll(RollProp),
    SavingThrow(SavingThrowProp),
    Skill(SkillProp),
    Slot(SlotProp),
    Spell(SpellProp),
    SpellList(SpellListProp),
    Toggle(ToggleProp),
    Trigger(TriggerProp),
}

fn calc<'a>(out: &mut Vec<(String, &'a Calculation)>, path: &str, field: &'a Option<Calculation>) {
    if let Some(calculation) = field {
        out.push((path.to_owned(), calculation));
    }
}

fn calc_mut<'a>(
    out: &mut Vec<(String, &'a mut Calculation)>,
    path: &str,
    field: &'a mut Option<Calculation>,
) {
    if let Some(calculation) = field {
        out.push((path.to_owned(), calculation));
    }
}

fn text<'a>(
    out: &mut Vec<(&'static str, &'a InlineText)>,
    name: &'static str,
    field: &'a Option<InlineText>,
) {
    if let Some(text) = field {
        out.push((name, text));
    }
}

impl PropertyKind {
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::Action(_) => PropertyType::Action,
            Self::Adjustment(_) => PropertyType::Adjustment,
            Self::Attribute(_) => PropertyType::Attribute,
            Self::Branch(_) => PropertyType::Branch,
            Self::Buff(_) => PropertyType::Buff,
            Self::BuffRemover(_) => PropertyType::BuffRemover,
            Self::Class(_) => PropertyType::Class,
            Self::ClassLevel(_) => PropertyType::ClassLevel,
            Self::Constant(_) => PropertyType::Constant,
            Self::Container(_) => PropertyType::Container,
            Self::Damage(_) => PropertyType::Damage,
            Self::DamageMultiplier(_) => PropertyType::DamageMultiplier,
            Self::Effect(_) => PropertyType::Effect,
            Self::Feature(_) => PropertyType::Feature,
            Self::Folder(_) => PropertyType::Folder,
            Self::Item(_) => PropertyType::Item,
            Self::Note(_) => PropertyType::Note,
            Self::Proficiency(_) => PropertyType::Proficiency,
            Self::Roll(_) => PropertyType::Roll,
            Self::SavingThrow(_) => PropertyType::SavingThrow,
            Self::Skill(_) => PropertyType::Skill,
            Self::Slot(_) => PropertyType::Slot,
            Self::Spell(_) => PropertyType::Spell,
            Self::SpellList(_) => PropertyType::SpellList,
            Self::Toggle(_) => PropertyType::Toggle,
            Self::Trigger(_) => PropertyType::Trigger,
        }
    }

    /// The variable this property defines in the creature scope, if any.
    pub fn variable_name(&self) -> Option<&str> {
        let name = match self {
            Self::Attribute(p) => p.variable_name.as_str(),
            Self::Class(p) => p.variable_name.as_str(),
            Self::Constant(p) => p.variable_name.as_str(),
            Self::Roll(p) => p.variable_name.as_str(),
            Self::Skill(p) => p.variable_name.as_str(),
            Self::SpellList(p) => p.variable_name.as_deref()?,
            Self::Toggle(p) => p.variable_name.as_deref()?,
            _ => return None,
        };
        (!name.is_empty()).then_some(name)
    }

    /// Action payload of actions and spells.
    pub fn action(&self) -> Option<&ActionProp> {
        match self {
            Self::Action(action) => Some(action),
            Self::Spell(spell) => Some(&spell.action),
            _ => None,
        }
    }

    /// Every calculated input, keyed by field path.
    pub fn calculations(&self) -> Vec<(String, &Calculation)> {
        let mut out = Vec::new();
        match self {
            Self::Action(action) => action_calculations(&mut out, action),
            Self::Spell(spell) => action_calculations(&mut out, &spell.action),
            Self::Adjustment(p) => calc(&mut out, "amount", &p.amount),
            Self::Attribute(p) => {
                calc(&mut out, "baseValue", &p.base_value);
                calc(&mut out, "spellSlotLevel", &p.spell_slot_level);
            }
            Self::Branch(p) => calc(&mut out, "condition", &p.condition),
            Self::Buff(p) => calc(&mut out, "duration", &p.duration),
            Self::Damage(p) => {
                calc(&mut out, "amount", &p.amount);
                if let Some(save) = &p.save {
                    calc(&mut out, "save.dc", &save.dc);
                }
            }
            Self::Effect(p) => calc(&mut out, "amount", &p.amount),
            Self::Roll(p) => calc(&mut out, "roll", &p.roll),
            Self::SavingThrow(p) => calc(&mut out, "dc", &p.dc),
            Self::Skill(p) => calc(&mut out, "baseValue", &p.base_value),
            Self::Slot(p) => {
                calc(&mut out, "quantityExpected", &p.quantity_expected);
                calc(&mut out, "slotCondition", &p.slot_condition);
            }
            Self::SpellList(p) => {
                calc(&mut out, "maxPrepared", &p.max_prepared);
                calc(&mut out, "attackRollBonus", &p.attack_roll_bonus);
                calc(&mut out, "dc", &p.dc);
            }
            Self::Toggle(p) => calc(&mut out, "condition", &p.condition),
            Self::Trigger(p) => calc(&mut out, "condition", &p.condition),
            Self::BuffRemover(_)
            | Self::Class(_)
            | Self::ClassLevel(_)
            | Self::Constant(_)
            | Self::Container(_)
            | Self::DamageMultiplier(_)
            | Self::Feature(_)
            | Self::Folder(_)
            | Self::Item(_)
            | Self::Note(_)
            | Self::Proficiency(_) => {}
        }
        out
    }

    /// Mutable view of [`PropertyKind::calculations`], for rewriting inputs in place.
    pub fn calculations_mut(&mut self) -> Vec<(String, &mut Calculation)> {
        let mut out = Vec::new();
        match self {
            Self::Action(action) => action_calculations_mut(&mut out, action),
            Self::Spell(spell) => action_calculations_mut(&mut out, &mut spell.action),
            Self::Adjustment(p) => calc_mut(&mut out, "amount", &mut p.amount),
            Self::Attribute(p) => {
                calc_mut(&mut out, "baseValue", &mut p.base_value);
                calc_mut(&mut out, "spellSlotLevel", &mut p.spell_slot_level);
            }
            Self::Branch(p) => calc_mut(&mut out, "condition", &mut p.condition),
            Self::Buff(p) => calc_mut(&mut out, "duration", &mut p.duration),
            Self::Damage(p) => {
                calc_mut(&mut out, "amount", &mut p.amount);
                if let Some(save) = &mut p.save {
                    calc_mut(&mut out, "save.dc", &mut save.dc);
                }
            }
            Self::Effect(p) => calc_mut(&mut out, "amount", &mut p.amount),
            Self::Roll(p) => calc_mut(&mut out, "roll", &mut p.roll),
            Self::SavingThrow(p) => calc_mut(&mut out, "dc", &mut p.dc),
            Self::Skill(p) => calc_mut(&mut out, "baseValue", &mut p.base_value),
            Self::Slot(p) => {
                calc_mut(&mut out, "quantityExpected", &mut p.quantity_expected);
                calc_mut(&mut out, "slotCondition", &mut p.slot_condition);
            }
            Self::SpellList(p) => {
                calc_mut(&mut out, "maxPrepared", &mut p.max_prepared);
                calc_mut(&mut out, "attackRollBonus", &mut p.attack_roll_bonus);
                calc_mut(&mut out, "dc", &mut p.dc);
            }
            Self::Toggle(p) => calc_mut(&mut out, "condition", &mut p.condition),
            Self::Trigger(p) => calc_mut(&mut out, "condition", &mut p.condition),
            _ => {}
        }
        out
    }

    /// Every inline text input, keyed by field name.
    pub fn texts(&self) -> Vec<(&'static str, &InlineText)> {
        let mut out = Vec::new();
        match self {
            Self::Action(ActionProp {
                summary,
                description,
                ..
            })
            | Self::Spell(SpellProp {
                action: ActionProp {
                    summary,
                    description,
                    ..
                },
                ..
            })
            | Self::Container(TextProp {
                summary,
                description,
            })
            | Self::Feature(TextProp {
                summary,
                description,
            })
            | Self::Note(NoteProp {
                summary,
                description,
                ..
            }) => {
                text(&mut out, "summary", summary);
                text(&mut out, "description", description);
            }
            Self::Attribute(AttributeProp { description, .. })
            | Self::Buff(BuffProp { description, .. })
            | Self::Skill(SkillProp { description, .. })
            | Self::SpellList(SpellListProp { description, .. })
            | Self::Trigger(TriggerProp { description, .. }) => {
                text(&mut out, "description", description)
            }
            _ => {}
        }
        out
    }

    /// The field tag-targeted effects and proficiencies act on by default.
    pub const fn default_target_field(&self) -> Option<&'static str> {
        match self {
            Self::Action(_) | Self::Spell(_) => Some("attackRoll"),
            Self::Adjustment(_) | Self::Damage(_) | Self::Effect(_) => Some("amount"),
            Self::Attribute(_) | Self::Skill(_) => Some("baseValue"),
            Self::Branch(_) | Self::Toggle(_) => Some("condition"),
            Self::Buff(_) => Some("duration"),
            Self::Roll(_) => Some("roll"),
            Self::SavingThrow(_) => Some("dc"),
            Self::Slot(_) => Some("quantityExpected"),
            Self::SpellList(_) => Some("attackRollBonus"),
            _ => None,
        }
    }

    pub fn is_silent(&self) -> bool {
        match self {
            Self::Action(p) => p.silent,
            Self::Spell(p) => p.action.silent,
            Self::Adjustment(p) => p.silent,
            Self::Branch(p) => p.silent,
            Self::Buff(p) => p.silent,
            Self::BuffRemover(p) => p.silent,
            Self::Damage(p) => p.silent,
            Self::Note(p) => p.silent,
            Self::Roll(p) => p.silent,
            Self::SavingThrow(p) => p.silent,
            Self::Trigger(p) => p.silent,
            _ => false,
        }
    }
}

fn action_calculations<'a>(out: &mut Vec<(String, &'a Calculation)>, action: &'a ActionProp) {
    calc(out, "attackRoll", &action.attack_roll);
    calc(out, "uses", &action.uses);
    for (i, item) in action.resources.items_consumed.iter().enumerate() {
        calc(out, &format!("resources.itemsConsumed.{i}.quantity"), &item.quantity);
    }
    for (i, attribute) in action.resources.attributes_consumed.iter().enumerate() {
        calc(out, &format!("resources.attributesConsumed.{i}.quantity"), &attribute.quantity);
    }
}

fn action_calculations_mut<'a>(
    out: &mut Vec<(String, &'a mut Calculation)>,
    action: &'a mut ActionProp,
) {
    calc_mut(out, "attackRoll", &mut action.attack_roll);
    calc_mut(out, "uses", &mut action.uses);
    for (i, item) in action.resources.items_consumed.iter_mut().enumerate() {
        calc_mut(out, &format!("resources.itemsConsumed.{i}.quantity"), &mut item.quantity);
    }
    for (i, attribute) in action.resources.attributes_consumed.iter_mut().enumerate() {
        calc_mut(
            out,
            &format!("resources.attributesConsumed.{i}.quantity"),
            &mut attribute.quantity,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_type_names_are_camel_case() {
        assert_eq!(PropertyType::BuffRemover.as_ref(), "buffRemover");
        assert_eq!("savingThrow".parse::<PropertyType>().ok(), Some(PropertyType::SavingThrow));
    }

    #[test]
    fn attribute_type_titles() {
        assert_eq!(AttributeType::HealthBar.title(), "Health bar");
        assert_eq!(AttributeType::Ability.title(), "Ability");
    }

    #[test]
    fn action_calculations_include_resources() {
        let action = PropertyKind::Action(ActionProp {
            uses: Some("3".into()),
            resources: Resources {
                items_consumed: vec![ItemConsumed {
                    item_id: Some("arrows".into()),
                    tag: None,
                    quantity: Some("1".into()),
                }],
                attributes_consumed: Vec::new(),
            },
            ..ActionProp::default()
        });
        let paths: Vec<String> = action.calculations().into_iter().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["uses", "resources.itemsConsumed.0.quantity"]);
    }
}
