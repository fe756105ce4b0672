//! Object model.
//!
//! An [`Object`] is one node of the user-composed graph. It is a tagged variant
//! over five payloads; each payload carries its canvas geometry, its
//! variant-specific fields, and an `extra` map holding any property the engine
//! was asked to write that the variant does not declare.
//!
//! Numeric fields are exposed through per-variant [`NumericField`] tables so
//! that bindings can address them by name (see [`Object::numeric_properties`]).

use crate::graph::fields::{self, NumericField};
use crate::numeric_fields;
use crate::types::{number, ConnectionStatus, ObjectId, PropertyMap, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default serial baud rate for a bridge.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Default ADC resolution of an analog input mapping.
pub const DEFAULT_ADC_BITS: u8 = 10;

/// Property names with special meaning to the engine.
pub mod keys {
    pub const VALUE: &str = "value";
    pub const CURRENT_STATE: &str = "currentState";
    pub const TARGET_ID: &str = "targetId";
    pub const TARGET_PROPERTY: &str = "targetProperty";
    pub const INHERITED_SLIDER_ID: &str = "inheritedSliderId";
    pub const MANUAL_TRIGGER_ID: &str = "manualTriggerId";
    pub const USE_MOVING_AVERAGE: &str = "useMovingAverage";
    pub const CONNECTION_STATUS: &str = "connectionStatus";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const MOVING_AVERAGE_WINDOW: &str = "movingAverageWindow";
}

type Extra = BTreeMap<String, PropertyValue>;

// ==================== Shape ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[default]
    Circle,
    Rect,
}

/// A passive drawable. Only ever the target of writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Shape {
    pub id: ObjectId,
    pub kind: ShapeKind,
    #[serde(serialize_with = "number::serialize")]
    pub x: f64,
    #[serde(serialize_with = "number::serialize")]
    pub y: f64,
    #[serde(serialize_with = "number::serialize")]
    pub width: f64,
    #[serde(serialize_with = "number::serialize")]
    pub height: f64,
    #[serde(serialize_with = "number::serialize")]
    pub rotation: f64,
    #[serde(serialize_with = "number::serialize")]
    pub opacity: f64,
    pub fill_color: String,
    pub stroke_color: String,
    #[serde(serialize_with = "number::serialize")]
    pub stroke_width: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for Shape {
    fn default() -> Self {
        Self {
            id: ObjectId::default(),
            kind: ShapeKind::Circle,
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            rotation: 0.0,
            opacity: 1.0,
            fill_color: "#4f46e5".to_string(),
            stroke_color: "#111827".to_string(),
            stroke_width: 1.0,
            extra: Extra::new(),
        }
    }
}

impl Shape {
    pub const NUMERIC_FIELDS: &'static [NumericField<Shape>] = numeric_fields!(Shape {
        "x" => x,
        "y" => y,
        "width" => width,
        "height" => height,
        "rotation" => rotation,
        "opacity" => opacity,
        "strokeWidth" => stroke_width,
    });
}

// ==================== Slider ====================

/// A numeric source. Every write to `value` propagates to its target and to
/// the sliders that inherit from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Slider {
    pub id: ObjectId,
    #[serde(serialize_with = "number::serialize")]
    pub x: f64,
    #[serde(serialize_with = "number::serialize")]
    pub y: f64,
    #[serde(serialize_with = "number::serialize")]
    pub width: f64,
    #[serde(serialize_with = "number::serialize")]
    pub height: f64,
    #[serde(serialize_with = "number::serialize")]
    pub value: f64,
    #[serde(serialize_with = "number::serialize")]
    pub min: f64,
    #[serde(serialize_with = "number::serialize")]
    pub max: f64,
    pub target_id: Option<ObjectId>,
    pub target_property: Option<String>,
    pub inherited_slider_id: Option<ObjectId>,
    pub use_moving_average: bool,
    pub moving_average_window: u32,
    pub show_label: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for Slider {
    fn default() -> Self {
        Self {
            id: ObjectId::default(),
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 40.0,
            value: 50.0,
            min: 0.0,
            max: 100.0,
            target_id: None,
            target_property: None,
            inherited_slider_id: None,
            use_moving_average: false,
            moving_average_window: 5,
            show_label: true,
            extra: Extra::new(),
        }
    }
}

impl Slider {
    pub const NUMERIC_FIELDS: &'static [NumericField<Slider>] = numeric_fields!(Slider {
        "x" => x,
        "y" => y,
        "width" => width,
        "height" => height,
        "value" => value,
        "min" => min,
        "max" => max,
    } with [
        NumericField {
            name: keys::MOVING_AVERAGE_WINDOW,
            get: |o: &Slider| f64::from(o.moving_average_window),
            set: |o: &mut Slider, v| o.moving_average_window = v.round().clamp(1.0, 1024.0) as u32,
        },
    ]);

    /// Map `master_value` from `master`'s range into this slider's range.
    /// A zero-width master range maps everything to `self.min`.
    pub fn inherit_from(&self, master: &Slider, master_value: f64) -> f64 {
        let master_range = master.max - master.min;
        if master_range == 0.0 {
            return self.min;
        }
        self.min + ((master_value - master.min) / master_range) * (self.max - self.min)
    }
}

// ==================== Switch ====================

/// A two-state source. Writes to `currentState` propagate the parsed
/// `valueOn`/`valueOff` literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Switch {
    pub id: ObjectId,
    #[serde(serialize_with = "number::serialize")]
    pub x: f64,
    #[serde(serialize_with = "number::serialize")]
    pub y: f64,
    #[serde(serialize_with = "number::serialize")]
    pub width: f64,
    #[serde(serialize_with = "number::serialize")]
    pub height: f64,
    pub target_id: Option<ObjectId>,
    pub target_property: Option<String>,
    pub value_on: String,
    pub value_off: String,
    pub current_state: u8,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for Switch {
    fn default() -> Self {
        Self {
            id: ObjectId::default(),
            x: 0.0,
            y: 0.0,
            width: 60.0,
            height: 30.0,
            target_id: None,
            target_property: None,
            value_on: "1".to_string(),
            value_off: "0".to_string(),
            current_state: 0,
            extra: Extra::new(),
        }
    }
}

impl Switch {
    pub const NUMERIC_FIELDS: &'static [NumericField<Switch>] = numeric_fields!(Switch {
        "x" => x,
        "y" => y,
        "width" => width,
        "height" => height,
    } with [
        NumericField {
            name: keys::CURRENT_STATE,
            get: |o: &Switch| f64::from(o.current_state),
            set: |o: &mut Switch, v| o.current_state = u8::from(v != 0.0),
        },
    ]);

    /// The literal selected by the current state.
    pub fn active_literal(&self) -> &str {
        if self.current_state == 1 {
            &self.value_on
        } else {
            &self.value_off
        }
    }
}

// ==================== Sequenced block ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Auto,
    Manual,
}

/// One single-assignment instruction of a sequenced block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Instruction {
    pub target_object_id: Option<ObjectId>,
    pub property: Option<String>,
    #[serde(serialize_with = "number::serialize")]
    pub value: f64,
    pub order: u32,
}

impl Instruction {
    pub fn new(target: impl Into<ObjectId>, property: impl Into<String>, value: f64) -> Self {
        Self {
            target_object_id: Some(target.into()),
            property: Some(property.into()),
            value,
            order: 0,
        }
    }

    /// The write this instruction performs, if it is fully bound.
    pub fn write(&self) -> Option<(ObjectId, PropertyMap)> {
        match (&self.target_object_id, &self.property) {
            (Some(target), Some(property)) if !property.is_empty() => {
                Some((target.clone(), PropertyMap::single(property.clone(), self.value)))
            }
            _ => None,
        }
    }
}

/// A fixed list of instructions executed round-robin, on a timer or on a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequencedBlock {
    pub id: ObjectId,
    #[serde(serialize_with = "number::serialize")]
    pub x: f64,
    #[serde(serialize_with = "number::serialize")]
    pub y: f64,
    #[serde(serialize_with = "number::serialize")]
    pub width: f64,
    #[serde(serialize_with = "number::serialize")]
    pub height: f64,
    pub execution_mode: ExecutionMode,
    pub auto_interval_ms: u64,
    pub manual_trigger_id: Option<ObjectId>,
    pub instructions: Vec<Instruction>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for SequencedBlock {
    fn default() -> Self {
        Self {
            id: ObjectId::default(),
            x: 0.0,
            y: 0.0,
            width: 240.0,
            height: 160.0,
            execution_mode: ExecutionMode::Auto,
            auto_interval_ms: 1000,
            manual_trigger_id: None,
            instructions: Vec::new(),
            extra: Extra::new(),
        }
    }
}

impl SequencedBlock {
    pub const NUMERIC_FIELDS: &'static [NumericField<SequencedBlock>] =
        numeric_fields!(SequencedBlock {
            "x" => x,
            "y" => y,
            "width" => width,
            "height" => height,
        } with [
            NumericField {
                name: "autoIntervalMs",
                get: |o: &SequencedBlock| o.auto_interval_ms as f64,
                set: |o: &mut SequencedBlock, v| o.auto_interval_ms = v.max(0.0).round() as u64,
            },
        ]);

    /// Instruction with the given 1-based `order`.
    pub fn instruction_at_order(&self, order: u32) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.order == order)
    }

    /// Append an instruction as the last step.
    pub fn push_instruction(&mut self, mut instruction: Instruction) {
        instruction.order = self.instructions.len() as u32 + 1;
        self.instructions.push(instruction);
    }

    /// Remove the instruction at list position `index` and renumber the rest.
    pub fn remove_instruction(&mut self, index: usize) -> Option<Instruction> {
        if index >= self.instructions.len() {
            return None;
        }
        let removed = self.instructions.remove(index);
        self.renumber();
        Some(removed)
    }

    /// Move the instruction at `from` to position `to` and renumber.
    pub fn move_instruction(&mut self, from: usize, to: usize) -> bool {
        if from >= self.instructions.len() || to >= self.instructions.len() {
            return false;
        }
        let instruction = self.instructions.remove(from);
        self.instructions.insert(to, instruction);
        self.renumber();
        true
    }

    /// Restore the dense `1..=N` order sequence, keeping relative order.
    pub fn renumber(&mut self) {
        self.instructions.sort_by_key(|i| i.order);
        for (idx, instruction) in self.instructions.iter_mut().enumerate() {
            instruction.order = idx as u32 + 1;
        }
    }

    pub fn is_auto(&self) -> bool {
        self.execution_mode == ExecutionMode::Auto
    }
}

// ==================== Bridge ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputMode {
    #[default]
    Analog,
    Digital,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    #[default]
    Digital,
    #[serde(rename = "PWM")]
    Pwm,
}

/// A board pin read into an object property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputMapping {
    pub pin: u8,
    pub mode: InputMode,
    pub target_id: Option<ObjectId>,
    pub property: Option<String>,
    #[serde(serialize_with = "number::serialize")]
    pub min: f64,
    #[serde(serialize_with = "number::serialize")]
    pub max: f64,
    pub adc_bits: u8,
}

impl Default for InputMapping {
    fn default() -> Self {
        Self {
            pin: 14,
            mode: InputMode::Analog,
            target_id: None,
            property: None,
            min: 0.0,
            max: 1023.0,
            adc_bits: DEFAULT_ADC_BITS,
        }
    }
}

/// An object property driven out onto a board pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputMapping {
    pub source_id: Option<ObjectId>,
    pub property: Option<String>,
    pub pin: u8,
    pub mode: OutputMode,
}

impl Default for OutputMapping {
    fn default() -> Self {
        Self {
            source_id: None,
            property: None,
            pin: 13,
            mode: OutputMode::Digital,
        }
    }
}

/// One serial hardware connection and its pin mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Bridge {
    pub id: ObjectId,
    #[serde(serialize_with = "number::serialize")]
    pub x: f64,
    #[serde(serialize_with = "number::serialize")]
    pub y: f64,
    #[serde(serialize_with = "number::serialize")]
    pub width: f64,
    #[serde(serialize_with = "number::serialize")]
    pub height: f64,
    pub connection_status: ConnectionStatus,
    pub port_name: Option<String>,
    /// Falls back to the configured serial baud rate when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    pub input_mappings: Vec<InputMapping>,
    pub output_mappings: Vec<OutputMapping>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            id: ObjectId::default(),
            x: 0.0,
            y: 0.0,
            width: 220.0,
            height: 120.0,
            connection_status: ConnectionStatus::Disconnected,
            port_name: None,
            baud_rate: None,
            input_mappings: Vec::new(),
            output_mappings: Vec::new(),
            extra: Extra::new(),
        }
    }
}

impl Bridge {
    pub const NUMERIC_FIELDS: &'static [NumericField<Bridge>] = numeric_fields!(Bridge {
        "x" => x,
        "y" => y,
        "width" => width,
        "height" => height,
    } with [
        NumericField {
            name: "baudRate",
            get: |o: &Bridge| f64::from(o.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)),
            set: |o: &mut Bridge, v| o.baud_rate = Some(v.round().clamp(300.0, 4_000_000.0) as u32),
        },
    ]);
}

// ==================== Object ====================

/// One node of the user-composed graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Object {
    Shape(Shape),
    Slider(Slider),
    Switch(Switch),
    SequencedBlock(SequencedBlock),
    Bridge(Bridge),
}

/// Dispatch `$body` with `$o` bound to the payload of whichever variant `$obj` holds.
macro_rules! each_variant {
    ($obj:expr, $o:ident => $body:expr) => {
        match $obj {
            Object::Shape($o) => $body,
            Object::Slider($o) => $body,
            Object::Switch($o) => $body,
            Object::SequencedBlock($o) => $body,
            Object::Bridge($o) => $body,
        }
    };
}

impl Object {
    // ── Variant defaults ──

    pub fn shape(id: impl Into<ObjectId>, kind: ShapeKind) -> Self {
        Object::Shape(Shape {
            id: id.into(),
            kind,
            ..Shape::default()
        })
    }

    pub fn slider(id: impl Into<ObjectId>) -> Self {
        Object::Slider(Slider {
            id: id.into(),
            ..Slider::default()
        })
    }

    pub fn switch(id: impl Into<ObjectId>) -> Self {
        Object::Switch(Switch {
            id: id.into(),
            ..Switch::default()
        })
    }

    pub fn sequenced_block(id: impl Into<ObjectId>) -> Self {
        Object::SequencedBlock(SequencedBlock {
            id: id.into(),
            ..SequencedBlock::default()
        })
    }

    pub fn bridge(id: impl Into<ObjectId>) -> Self {
        Object::Bridge(Bridge {
            id: id.into(),
            ..Bridge::default()
        })
    }

    // ── Accessors ──

    pub fn id(&self) -> &ObjectId {
        each_variant!(self, o => &o.id)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Shape(_) => "shape",
            Object::Slider(_) => "slider",
            Object::Switch(_) => "switch",
            Object::SequencedBlock(_) => "sequencedBlock",
            Object::Bridge(_) => "bridge",
        }
    }

    pub fn as_slider(&self) -> Option<&Slider> {
        match self {
            Object::Slider(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&SequencedBlock> {
        match self {
            Object::SequencedBlock(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut SequencedBlock> {
        match self {
            Object::SequencedBlock(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bridge(&self) -> Option<&Bridge> {
        match self {
            Object::Bridge(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bridge_mut(&mut self) -> Option<&mut Bridge> {
        match self {
            Object::Bridge(b) => Some(b),
            _ => None,
        }
    }

    fn extra(&self) -> &Extra {
        each_variant!(self, o => &o.extra)
    }

    fn extra_mut(&mut self) -> &mut Extra {
        each_variant!(self, o => &mut o.extra)
    }

    // ── Numeric reflection ──

    /// Read a numeric property: declared fields first, then numeric extras.
    pub fn numeric(&self, name: &str) -> Option<f64> {
        let declared = match self {
            Object::Shape(o) => fields::read(Shape::NUMERIC_FIELDS, o, name),
            Object::Slider(o) => fields::read(Slider::NUMERIC_FIELDS, o, name),
            Object::Switch(o) => fields::read(Switch::NUMERIC_FIELDS, o, name),
            Object::SequencedBlock(o) => fields::read(SequencedBlock::NUMERIC_FIELDS, o, name),
            Object::Bridge(o) => fields::read(Bridge::NUMERIC_FIELDS, o, name),
        };
        declared.or_else(|| match self.extra().get(name) {
            Some(PropertyValue::Number(n)) => Some(*n),
            _ => None,
        })
    }

    /// Write a declared numeric field. Returns `false` if `name` is not one.
    fn set_declared_numeric(&mut self, name: &str, value: f64) -> bool {
        match self {
            Object::Shape(o) => fields::write(Shape::NUMERIC_FIELDS, o, name, value),
            Object::Slider(o) => fields::write(Slider::NUMERIC_FIELDS, o, name, value),
            Object::Switch(o) => fields::write(Switch::NUMERIC_FIELDS, o, name, value),
            Object::SequencedBlock(o) => fields::write(SequencedBlock::NUMERIC_FIELDS, o, name, value),
            Object::Bridge(o) => fields::write(Bridge::NUMERIC_FIELDS, o, name, value),
        }
    }

    /// Write a numeric property: the declared field if there is one, else an extra.
    pub fn set_numeric(&mut self, name: &str, value: f64) {
        if !self.set_declared_numeric(name, value) {
            self.set(name, &PropertyValue::Number(value));
        }
    }

    /// Every property currently holding a number, i.e. the legal binding targets.
    pub fn numeric_properties(&self) -> Vec<(String, f64)> {
        let mut props = match self {
            Object::Shape(o) => fields::enumerate(Shape::NUMERIC_FIELDS, o),
            Object::Slider(o) => fields::enumerate(Slider::NUMERIC_FIELDS, o),
            Object::Switch(o) => fields::enumerate(Switch::NUMERIC_FIELDS, o),
            Object::SequencedBlock(o) => fields::enumerate(SequencedBlock::NUMERIC_FIELDS, o),
            Object::Bridge(o) => fields::enumerate(Bridge::NUMERIC_FIELDS, o),
        };
        for (name, value) in self.extra() {
            if let PropertyValue::Number(n) = value {
                props.push((name.clone(), *n));
            }
        }
        props
    }

    pub fn has_numeric_property(&self, name: &str) -> bool {
        self.numeric(name).is_some()
    }

    // ── Dynamic property access ──

    /// Read any property by its wire name.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        if let Some(n) = self.numeric(name) {
            return Some(PropertyValue::Number(n));
        }
        let value = match (self, name) {
            (_, "id") => PropertyValue::from(self.id()),
            (Object::Shape(s), "kind") => match s.kind {
                ShapeKind::Circle => "circle".into(),
                ShapeKind::Rect => "rect".into(),
            },
            (Object::Shape(s), "fillColor") => s.fill_color.clone().into(),
            (Object::Shape(s), "strokeColor") => s.stroke_color.clone().into(),
            (Object::Slider(s), keys::TARGET_ID) => s.target_id.as_ref().into(),
            (Object::Slider(s), keys::TARGET_PROPERTY) => s.target_property.clone().into(),
            (Object::Slider(s), keys::INHERITED_SLIDER_ID) => s.inherited_slider_id.as_ref().into(),
            (Object::Slider(s), keys::USE_MOVING_AVERAGE) => s.use_moving_average.into(),
            (Object::Slider(s), "showLabel") => s.show_label.into(),
            (Object::Switch(s), keys::TARGET_ID) => s.target_id.as_ref().into(),
            (Object::Switch(s), keys::TARGET_PROPERTY) => s.target_property.clone().into(),
            (Object::Switch(s), "valueOn") => s.value_on.clone().into(),
            (Object::Switch(s), "valueOff") => s.value_off.clone().into(),
            (Object::SequencedBlock(b), "executionMode") => match b.execution_mode {
                ExecutionMode::Auto => "auto".into(),
                ExecutionMode::Manual => "manual".into(),
            },
            (Object::SequencedBlock(b), keys::MANUAL_TRIGGER_ID) => b.manual_trigger_id.as_ref().into(),
            (Object::Bridge(b), keys::CONNECTION_STATUS) => b.connection_status.as_str().into(),
            (Object::Bridge(b), "portName") => b.port_name.clone().into(),
            _ => return self.extra().get(name).cloned(),
        };
        Some(value)
    }

    /// Shallow-merge a partial property map into this object.
    ///
    /// Merging never fails: values of the wrong type for a declared field are
    /// ignored, and unknown names land in the `extra` map. A write that changes
    /// `targetId` clears `targetProperty` unless it sets one itself.
    pub fn merge(&mut self, props: &PropertyMap) {
        if let Some(new_target) = props.get(keys::TARGET_ID) {
            let new_target = id_value(new_target);
            if let Some((target_id, target_property)) = self.binding_mut() {
                if *target_id != new_target && !props.contains_key(keys::TARGET_PROPERTY) {
                    *target_property = None;
                }
            }
        }
        for (name, value) in props.iter() {
            self.set(name, value);
        }
    }

    /// `(targetId, targetProperty)` of a binding source.
    fn binding_mut(&mut self) -> Option<(&mut Option<ObjectId>, &mut Option<String>)> {
        match self {
            Object::Slider(s) => Some((&mut s.target_id, &mut s.target_property)),
            Object::Switch(s) => Some((&mut s.target_id, &mut s.target_property)),
            _ => None,
        }
    }

    /// Write a single property by its wire name.
    pub fn set(&mut self, name: &str, value: &PropertyValue) {
        if name == "id" || name == "type" {
            tracing::debug!("Ignoring write to immutable property '{}' on {}", name, self.id());
            return;
        }
        if let Some(n) = value.as_number() {
            if self.set_declared_numeric(name, n) {
                return;
            }
        }
        let handled = match (&mut *self, name) {
            (Object::Shape(s), "kind") => match value.as_text() {
                Some("circle") => assign(&mut s.kind, ShapeKind::Circle),
                Some("rect") => assign(&mut s.kind, ShapeKind::Rect),
                _ => false,
            },
            (Object::Shape(s), "fillColor") => text_into(&mut s.fill_color, value),
            (Object::Shape(s), "strokeColor") => text_into(&mut s.stroke_color, value),
            (Object::Slider(s), keys::TARGET_ID) => assign(&mut s.target_id, id_value(value)),
            (Object::Slider(s), keys::TARGET_PROPERTY) => assign(&mut s.target_property, text_value(value)),
            (Object::Slider(s), keys::INHERITED_SLIDER_ID) => {
                let master = id_value(value);
                if master.as_ref() == Some(&s.id) {
                    tracing::debug!("Slider {} cannot inherit from itself", s.id);
                    true
                } else {
                    assign(&mut s.inherited_slider_id, master)
                }
            }
            (Object::Slider(s), keys::USE_MOVING_AVERAGE) => bool_into(&mut s.use_moving_average, value),
            (Object::Slider(s), "showLabel") => bool_into(&mut s.show_label, value),
            (Object::Switch(s), keys::TARGET_ID) => assign(&mut s.target_id, id_value(value)),
            (Object::Switch(s), keys::TARGET_PROPERTY) => assign(&mut s.target_property, text_value(value)),
            (Object::Switch(s), "valueOn") => literal_into(&mut s.value_on, value),
            (Object::Switch(s), "valueOff") => literal_into(&mut s.value_off, value),
            (Object::SequencedBlock(b), "executionMode") => match value.as_text() {
                Some("auto") => assign(&mut b.execution_mode, ExecutionMode::Auto),
                Some("manual") => assign(&mut b.execution_mode, ExecutionMode::Manual),
                _ => false,
            },
            (Object::SequencedBlock(b), keys::MANUAL_TRIGGER_ID) => {
                assign(&mut b.manual_trigger_id, id_value(value))
            }
            (Object::Bridge(b), keys::CONNECTION_STATUS) => {
                match value.as_text().and_then(ConnectionStatus::parse) {
                    Some(status) => assign(&mut b.connection_status, status),
                    None => false,
                }
            }
            (Object::Bridge(b), "portName") => assign(&mut b.port_name, text_value(value)),
            _ => {
                if self.is_structured(name) || self.declares_numeric(name) {
                    tracing::debug!(
                        "Ignoring {:?} written to '{}' on {}",
                        value,
                        name,
                        self.id()
                    );
                } else {
                    self.extra_mut().insert(name.to_string(), value.clone());
                }
                return;
            }
        };
        if !handled {
            tracing::debug!("Ignoring {:?} written to '{}' on {}", value, name, self.id());
        }
    }

    fn declares_numeric(&self, name: &str) -> bool {
        match self {
            Object::Shape(_) => fields::declares(Shape::NUMERIC_FIELDS, name),
            Object::Slider(_) => fields::declares(Slider::NUMERIC_FIELDS, name),
            Object::Switch(_) => fields::declares(Switch::NUMERIC_FIELDS, name),
            Object::SequencedBlock(_) => fields::declares(SequencedBlock::NUMERIC_FIELDS, name),
            Object::Bridge(_) => fields::declares(Bridge::NUMERIC_FIELDS, name),
        }
    }

    /// List-valued fields that are edited through dedicated operations only.
    fn is_structured(&self, name: &str) -> bool {
        matches!(
            (self, name),
            (Object::SequencedBlock(_), "instructions")
                | (Object::Bridge(_), "inputMappings")
                | (Object::Bridge(_), "outputMappings")
        )
    }
}

fn assign<T>(slot: &mut T, value: T) -> bool {
    *slot = value;
    true
}

fn id_value(value: &PropertyValue) -> Option<ObjectId> {
    match value {
        PropertyValue::Text(s) if !s.is_empty() => Some(ObjectId(s.clone())),
        _ => None,
    }
}

fn text_value(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::Text(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn text_into(slot: &mut String, value: &PropertyValue) -> bool {
    match value.as_text() {
        Some(s) => assign(slot, s.to_string()),
        None => false,
    }
}

fn literal_into(slot: &mut String, value: &PropertyValue) -> bool {
    match value {
        PropertyValue::Text(s) => assign(slot, s.clone()),
        PropertyValue::Number(n) => assign(slot, n.to_string()),
        _ => false,
    }
}

fn bool_into(slot: &mut bool, value: &PropertyValue) -> bool {
    match value.as_bool() {
        Some(b) => assign(slot, b),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_numeric_properties_include_extras() {
        let mut obj = Object::shape("s1", ShapeKind::Rect);
        obj.set("glow", &PropertyValue::Number(0.5));
        obj.set("label", &PropertyValue::Text("hi".into()));

        let names: Vec<String> = obj.numeric_properties().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"width".to_string()));
        assert!(names.contains(&"strokeWidth".to_string()));
        assert!(names.contains(&"glow".to_string()));
        assert!(!names.contains(&"label".to_string()));
        assert!(!names.contains(&"fillColor".to_string()));
    }

    #[test]
    fn test_field_tables_cover_geometry_and_converted_fields() {
        let mut slider = Object::slider("s");
        slider.set(keys::MOVING_AVERAGE_WINDOW, &PropertyValue::Number(4.6));
        assert_eq!(slider.numeric(keys::MOVING_AVERAGE_WINDOW), Some(5.0));
        slider.set("height", &PropertyValue::Number(12.0));
        assert_eq!(slider.numeric("height"), Some(12.0));

        let mut block = Object::sequenced_block("b");
        block.set("autoIntervalMs", &PropertyValue::Number(-20.0));
        assert_eq!(block.numeric("autoIntervalMs"), Some(0.0));

        let mut bridge = Object::bridge("br");
        assert_eq!(bridge.numeric("baudRate"), Some(f64::from(DEFAULT_BAUD_RATE)));
        bridge.set("baudRate", &PropertyValue::Number(115_200.4));
        assert_eq!(bridge.numeric("baudRate"), Some(115_200.0));

        for obj in [Object::switch("sw"), block, bridge] {
            let names: Vec<String> = obj.numeric_properties().into_iter().map(|(n, _)| n).collect();
            for geometry in ["x", "y", "width", "height"] {
                assert!(names.contains(&geometry.to_string()), "{} on {}", geometry, obj.id());
            }
        }
    }

    #[test]
    fn test_merge_clears_target_property_on_retarget() {
        let mut slider = Object::slider("s");
        slider.merge(&PropertyMap::new().with("targetId", "a").with("targetProperty", "x"));
        assert_eq!(slider.get("targetProperty"), Some(PropertyValue::Text("x".into())));

        slider.merge(&PropertyMap::single("targetId", "b"));
        assert_eq!(slider.get("targetId"), Some(PropertyValue::Text("b".into())));
        assert_eq!(slider.get("targetProperty"), Some(PropertyValue::Null));

        // Same target: property survives
        slider.merge(&PropertyMap::single("targetProperty", "y"));
        slider.merge(&PropertyMap::single("targetId", "b"));
        assert_eq!(slider.get("targetProperty"), Some(PropertyValue::Text("y".into())));

        // Retarget together with a new property keeps the new property
        slider.merge(&PropertyMap::new().with("targetId", "c").with("targetProperty", "z"));
        assert_eq!(slider.get("targetProperty"), Some(PropertyValue::Text("z".into())));
    }

    #[test]
    fn test_switch_retarget_clears_property() {
        let mut sw = Object::switch("sw");
        sw.merge(&PropertyMap::new().with("targetId", "a").with("targetProperty", "x"));
        sw.merge(&PropertyMap::single("targetId", PropertyValue::Null));
        assert_eq!(sw.get("targetId"), Some(PropertyValue::Null));
        assert_eq!(sw.get("targetProperty"), Some(PropertyValue::Null));
    }

    #[test]
    fn test_self_inheritance_rejected() {
        let mut slider = Object::slider("s");
        slider.merge(&PropertyMap::single("inheritedSliderId", "s"));
        assert_eq!(slider.get("inheritedSliderId"), Some(PropertyValue::Null));
        slider.merge(&PropertyMap::single("inheritedSliderId", "m"));
        assert_eq!(slider.get("inheritedSliderId"), Some(PropertyValue::Text("m".into())));
    }

    #[test]
    fn test_wrong_type_write_is_ignored() {
        let mut slider = Object::slider("s");
        slider.set("value", &PropertyValue::Text("abc".into()));
        assert_eq!(slider.numeric("value"), Some(50.0));
        assert!(!slider.extra().contains_key("value"));
    }

    #[test]
    fn test_switch_state_normalized() {
        let mut sw = Object::switch("sw");
        sw.set("currentState", &PropertyValue::Number(5.0));
        assert_eq!(sw.numeric("currentState"), Some(1.0));
        sw.set("currentState", &PropertyValue::Number(0.0));
        assert_eq!(sw.numeric("currentState"), Some(0.0));
    }

    #[test]
    fn test_inherit_from_maps_ranges() {
        let master = Slider {
            min: 0.0,
            max: 10.0,
            ..Slider::default()
        };
        let slave = Slider {
            min: 100.0,
            max: 200.0,
            ..Slider::default()
        };
        assert_eq!(slave.inherit_from(&master, 5.0), 150.0);

        let flat = Slider {
            min: 3.0,
            max: 3.0,
            ..Slider::default()
        };
        assert_eq!(slave.inherit_from(&flat, 3.0), 100.0);
    }

    #[test]
    fn test_instruction_renumbering() {
        let mut block = SequencedBlock::default();
        for v in 0..4 {
            block.push_instruction(Instruction::new("t", "x", v as f64));
        }
        assert_eq!(block.instructions.iter().map(|i| i.order).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let removed = block.remove_instruction(1).unwrap();
        assert_eq!(removed.value, 1.0);
        let orders: Vec<_> = block.instructions.iter().map(|i| (i.order, i.value)).collect();
        assert_eq!(orders, vec![(1, 0.0), (2, 2.0), (3, 3.0)]);

        assert!(block.move_instruction(2, 0));
        let orders: Vec<_> = block.instructions.iter().map(|i| (i.order, i.value)).collect();
        assert_eq!(orders, vec![(1, 3.0), (2, 0.0), (3, 2.0)]);
        assert!(block.remove_instruction(9).is_none());
    }

    #[test]
    fn test_set_numeric_falls_back_to_extra() {
        let mut obj = Object::shape("c", ShapeKind::Circle);
        obj.set_numeric("x", 12.0);
        obj.set_numeric("brightness", 0.25);
        assert_eq!(obj.numeric("x"), Some(12.0));
        assert_eq!(obj.numeric("brightness"), Some(0.25));
        assert!(obj.extra().contains_key("brightness"));
        assert!(!obj.extra().contains_key("x"));
    }

    proptest! {
        #[test]
        fn test_instruction_orders_stay_contiguous(
            count in 1usize..12,
            edits in proptest::collection::vec((0usize..14, 0usize..14, any::<bool>()), 0..20),
        ) {
            let mut block = SequencedBlock::default();
            for v in 0..count {
                block.push_instruction(Instruction::new("t", "x", v as f64));
            }
            for (a, b, remove) in edits {
                if remove {
                    block.remove_instruction(a);
                } else {
                    block.move_instruction(a, b);
                }
                let orders: Vec<u32> = block.instructions.iter().map(|i| i.order).collect();
                let expected: Vec<u32> = (1..=block.instructions.len() as u32).collect();
                prop_assert_eq!(orders, expected);
            }
        }
    }

    #[test]
    fn test_object_json_shape() {
        let mut obj = Object::slider("s1");
        obj.set("targetId", &PropertyValue::Text("c1".into()));
        obj.set("targetProperty", &PropertyValue::Text("width".into()));
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["type"], "slider");
        assert_eq!(json["id"], "s1");
        assert_eq!(json["targetId"], "c1");
        assert_eq!(json["value"], 50);
        assert_eq!(json["useMovingAverage"], false);

        let back: Object = serde_json::from_value(json).unwrap();
        assert_eq!(back, obj);
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let json = r#"{"type":"shape","id":"c","kind":"rect","customLabel":"door","glow":3}"#;
        let obj: Object = serde_json::from_str(json).unwrap();
        assert_eq!(obj.numeric("glow"), Some(3.0));
        assert_eq!(obj.get("customLabel"), Some(PropertyValue::Text("door".into())));
        let out = serde_json::to_value(&obj).unwrap();
        assert_eq!(out["customLabel"], "door");
        assert_eq!(out["glow"], 3);
    }

    #[test]
    fn test_bridge_mapping_modes_serialize() {
        let mut obj = Object::bridge("b");
        if let Some(bridge) = obj.as_bridge_mut() {
            bridge.output_mappings.push(OutputMapping {
                source_id: Some("s".into()),
                property: Some("value".into()),
                pin: 9,
                mode: OutputMode::Pwm,
            });
        }
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["outputMappings"][0]["mode"], "PWM");
        assert_eq!(json["connectionStatus"], "disconnected");
        assert!(json.get("baudRate").is_none());
        assert_eq!(obj.numeric("baudRate"), Some(57600.0));
    }
}
