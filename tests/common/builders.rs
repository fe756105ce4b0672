//! Test data builders for creating test objects

use wirecanvas::graph::{
    Bridge, ExecutionMode, InputMapping, InputMode, Instruction, Object, OutputMapping,
    OutputMode, SequencedBlock, Slider, Switch,
};

/// Builder for creating test sliders
pub struct SliderBuilder {
    slider: Slider,
}

impl SliderBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            slider: Slider {
                id: id.into(),
                ..Slider::default()
            },
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.slider.min = min;
        self.slider.max = max;
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.slider.value = value;
        self
    }

    pub fn target(mut self, target: &str, property: &str) -> Self {
        self.slider.target_id = Some(target.into());
        self.slider.target_property = Some(property.to_string());
        self
    }

    pub fn inherits(mut self, master: &str) -> Self {
        self.slider.inherited_slider_id = Some(master.into());
        self
    }

    pub fn smoothing(mut self, window: u32) -> Self {
        self.slider.use_moving_average = true;
        self.slider.moving_average_window = window;
        self
    }

    pub fn build(self) -> Object {
        Object::Slider(self.slider)
    }
}

/// Builder for creating test switches
pub struct SwitchBuilder {
    switch: Switch,
}

impl SwitchBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            switch: Switch {
                id: id.into(),
                ..Switch::default()
            },
        }
    }

    pub fn literals(mut self, on: &str, off: &str) -> Self {
        self.switch.value_on = on.to_string();
        self.switch.value_off = off.to_string();
        self
    }

    pub fn target(mut self, target: &str, property: &str) -> Self {
        self.switch.target_id = Some(target.into());
        self.switch.target_property = Some(property.to_string());
        self
    }

    pub fn build(self) -> Object {
        Object::Switch(self.switch)
    }
}

/// Builder for creating test sequenced blocks
pub struct BlockBuilder {
    block: SequencedBlock,
}

impl BlockBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            block: SequencedBlock {
                id: id.into(),
                ..SequencedBlock::default()
            },
        }
    }

    pub fn auto(mut self, interval_ms: u64) -> Self {
        self.block.execution_mode = ExecutionMode::Auto;
        self.block.auto_interval_ms = interval_ms;
        self
    }

    pub fn manual(mut self, trigger: &str) -> Self {
        self.block.execution_mode = ExecutionMode::Manual;
        self.block.manual_trigger_id = Some(trigger.into());
        self
    }

    pub fn step(mut self, target: &str, property: &str, value: f64) -> Self {
        self.block.push_instruction(Instruction::new(target, property, value));
        self
    }

    pub fn build(self) -> Object {
        Object::SequencedBlock(self.block)
    }
}

/// Builder for creating test bridges
pub struct BridgeBuilder {
    bridge: Bridge,
}

impl BridgeBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            bridge: Bridge {
                id: id.into(),
                ..Bridge::default()
            },
        }
    }

    pub fn port(mut self, port: &str) -> Self {
        self.bridge.port_name = Some(port.to_string());
        self
    }

    pub fn analog_input(mut self, pin: u8, target: &str, property: &str, min: f64, max: f64) -> Self {
        self.bridge.input_mappings.push(InputMapping {
            pin,
            mode: InputMode::Analog,
            target_id: Some(target.into()),
            property: Some(property.to_string()),
            min,
            max,
            ..InputMapping::default()
        });
        self
    }

    pub fn digital_input(mut self, pin: u8, target: &str, property: &str) -> Self {
        self.bridge.input_mappings.push(InputMapping {
            pin,
            mode: InputMode::Digital,
            target_id: Some(target.into()),
            property: Some(property.to_string()),
            min: 0.0,
            max: 1.0,
            ..InputMapping::default()
        });
        self
    }

    pub fn output(mut self, pin: u8, mode: OutputMode, source: &str, property: &str) -> Self {
        self.bridge.output_mappings.push(OutputMapping {
            source_id: Some(source.into()),
            property: Some(property.to_string()),
            pin,
            mode,
        });
        self
    }

    pub fn build(self) -> Object {
        Object::Bridge(self.bridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slider_builder() {
        let slider = SliderBuilder::new("s").range(10.0, 20.0).target("c", "x").build();
        assert_eq!(slider.numeric("min"), Some(10.0));
        assert_eq!(slider.numeric("max"), Some(20.0));
        assert_eq!(slider.as_slider().and_then(|s| s.target_property.clone()), Some("x".into()));
    }

    #[test]
    fn test_block_builder_numbers_steps() {
        let block = BlockBuilder::new("b").step("c", "x", 1.0).step("c", "x", 2.0).build();
        let orders: Vec<u32> = block
            .as_block()
            .map(|b| b.instructions.iter().map(|i| i.order).collect())
            .unwrap_or_default();
        assert_eq!(orders, vec![1, 2]);
    }
}
