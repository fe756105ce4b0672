//! Propagation engine: the single mutation entry point of the object graph.
//!
//! `apply(root, props)` merges a partial property map into one object and then
//! walks the implied downstream writes breadth-first:
//!
//! 1. Seed a FIFO worklist with `(root, props)`.
//! 2. Pop an entry. Ids already processed in this traversal are skipped unless
//!    the pending write carries `value` or `currentState` (those may re-fire).
//!    Unknown ids are dropped silently.
//! 3. Merge the pending write into a copy of the object and stage the copy.
//! 4. Discover implied writes from the staged object:
//!    - slider `value` → its bound target, and every slider inheriting from it
//!      (range-mapped, only if the slave's value actually changes);
//!    - switch `currentState` → its bound target with the parsed literal;
//!    - any write → manual-mode sequenced blocks triggered by this object,
//!      collected and returned once the worklist drains.
//!
//! Writes are staged in an overlay and committed together once the worklist is
//! empty, so the store never exposes a half-settled graph. A traversal that
//! exceeds `max_steps` entries is abandoned: nothing is committed and
//! [`PropagationError::DepthExceeded`] is returned.

use crate::graph::error::{PropagationError, PropagationResult};
use crate::graph::object::{keys, InputMapping, Instruction, Object, OutputMapping, SequencedBlock, Slider};
use crate::graph::store::ObjectStore;
use crate::types::{parse_number, ObjectId, PropertyMap, PropertyValue};
use std::collections::{HashMap, HashSet, VecDeque};

/// Default cap on processed worklist entries per traversal.
pub const DEFAULT_MAX_STEPS: usize = 10_000;

/// Outcome of a settled traversal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settled {
    /// Worklist entries processed (including re-fires).
    pub steps: usize,
    /// Objects written, in first-write order.
    pub changed: Vec<ObjectId>,
    /// Manual-mode blocks to step, in discovery order.
    pub triggers: Vec<ObjectId>,
}

impl Settled {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Copy-on-write view of the store for the duration of one traversal.
struct Staging<'a> {
    store: &'a ObjectStore,
    overlay: HashMap<ObjectId, Object>,
    written: Vec<ObjectId>,
}

impl<'a> Staging<'a> {
    fn new(store: &'a ObjectStore) -> Self {
        Self {
            store,
            overlay: HashMap::new(),
            written: Vec::new(),
        }
    }

    fn get(&self, id: &ObjectId) -> Option<&Object> {
        self.overlay.get(id).or_else(|| self.store.get(id))
    }

    fn put(&mut self, object: Object) {
        if !self.overlay.contains_key(object.id()) {
            self.written.push(object.id().clone());
        }
        self.overlay.insert(object.id().clone(), object);
    }

    /// Staged version of `object` if one exists.
    fn current<'s>(&'s self, object: &'s Object) -> &'s Object {
        self.overlay.get(object.id()).unwrap_or(object)
    }

    fn slaves_of(&self, master: &ObjectId) -> Vec<Slider> {
        self.store
            .iter()
            .map(|o| self.current(o))
            .filter_map(Object::as_slider)
            .filter(|s| s.inherited_slider_id.as_ref() == Some(master) && s.id != *master)
            .cloned()
            .collect()
    }

    fn blocks_triggered_by(&self, id: &ObjectId) -> Vec<ObjectId> {
        self.store
            .iter()
            .map(|o| self.current(o))
            .filter_map(Object::as_block)
            .filter(|b| !b.is_auto() && b.manual_trigger_id.as_ref() == Some(id))
            .map(|b| b.id.clone())
            .collect()
    }
}

/// Owns the object store and resolves cascading property writes.
#[derive(Debug)]
pub struct PropagationEngine {
    store: ObjectStore,
    max_steps: usize,
    /// Moving-average sample windows, per smoothing slider.
    averages: HashMap<ObjectId, VecDeque<f64>>,
}

impl Default for PropagationEngine {
    fn default() -> Self {
        Self::new(ObjectStore::new())
    }
}

impl PropagationEngine {
    pub fn new(store: ObjectStore) -> Self {
        Self {
            store,
            max_steps: DEFAULT_MAX_STEPS,
            averages: HashMap::new(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Object> {
        self.store.get(id)
    }

    // ── Object lifecycle ──

    /// Add (or replace) an object.
    pub fn insert(&mut self, object: Object) -> Option<Object> {
        tracing::debug!("Inserting {} {}", object.type_name(), object.id());
        self.averages.remove(object.id());
        self.store.insert(object)
    }

    /// Remove an object and drop engine-side state held for it.
    ///
    /// Bindings elsewhere that reference it simply become inert.
    pub fn remove(&mut self, id: &ObjectId) -> Option<Object> {
        self.averages.remove(id);
        self.store.remove(id)
    }

    /// Replace the whole graph (document load).
    pub fn replace_all(&mut self, objects: impl IntoIterator<Item = Object>) {
        self.averages.clear();
        self.store = ObjectStore::from_objects(objects);
    }

    // ── Propagation ──

    /// Merge `props` into `root` and settle every implied write.
    pub fn apply(&mut self, root: &ObjectId, props: PropertyMap) -> PropagationResult<Settled> {
        // Smoothing windows this propagation touched, as they were before it
        let mut averages_before: HashMap<ObjectId, Option<VecDeque<f64>>> = HashMap::new();
        let mut staging = Staging::new(&self.store);
        let mut queue: VecDeque<(ObjectId, PropertyMap)> = VecDeque::new();
        let mut visited: HashSet<ObjectId> = HashSet::new();
        let mut triggers: Vec<ObjectId> = Vec::new();
        let mut steps = 0usize;

        queue.push_back((root.clone(), props));

        while let Some((id, mut pending)) = queue.pop_front() {
            let refires =
                pending.contains_key(keys::VALUE) || pending.contains_key(keys::CURRENT_STATE);
            if visited.contains(&id) && !refires {
                tracing::trace!("Skipping already-visited {}", id);
                continue;
            }
            let Some(current) = staging.get(&id) else {
                tracing::trace!("Dropping write to unknown object {}", id);
                continue;
            };

            steps += 1;
            if steps > self.max_steps {
                drop(staging);
                for (id, samples) in averages_before {
                    match samples {
                        Some(samples) => self.averages.insert(id, samples),
                        None => self.averages.remove(&id),
                    };
                }
                tracing::warn!(
                    "Propagation from {} aborted after {} steps; discarding staged writes",
                    root,
                    self.max_steps
                );
                return Err(PropagationError::DepthExceeded {
                    root: root.clone(),
                    steps: self.max_steps,
                });
            }
            visited.insert(id.clone());

            let mut next = current.clone();
            if let Object::Slider(slider) = &next {
                averages_before
                    .entry(slider.id.clone())
                    .or_insert_with(|| self.averages.get(&slider.id).cloned());
                smooth(&mut self.averages, slider, &mut pending);
            }
            next.merge(&pending);
            tracing::trace!("Applied {:?} to {}", pending, id);

            discover(&staging, &next, &pending, &mut queue);
            for block in staging.blocks_triggered_by(&id) {
                if !triggers.contains(&block) {
                    triggers.push(block);
                }
            }
            staging.put(next);
        }

        let Staging {
            mut overlay,
            written,
            ..
        } = staging;
        for id in &written {
            if let Some(object) = overlay.remove(id) {
                self.store.insert(object);
            }
        }

        Ok(Settled {
            steps,
            changed: written,
            triggers,
        })
    }

    // ── Validated binding operations ──

    /// Bind a slider or switch to `target.property`, validating the property
    /// against the target's current numeric fields.
    pub fn bind(
        &mut self,
        source: &ObjectId,
        target: &ObjectId,
        property: &str,
    ) -> PropagationResult<Settled> {
        let source_obj = self
            .store
            .get(source)
            .ok_or_else(|| PropagationError::UnknownObject(source.clone()))?;
        if !matches!(source_obj, Object::Slider(_) | Object::Switch(_)) {
            return Err(PropagationError::NotASource(source.clone()));
        }
        let target_obj = self
            .store
            .get(target)
            .ok_or_else(|| PropagationError::UnknownObject(target.clone()))?;
        if !target_obj.has_numeric_property(property) {
            return Err(PropagationError::UnknownProperty {
                object: target.clone(),
                property: property.to_string(),
            });
        }
        self.apply(
            source,
            PropertyMap::new()
                .with(keys::TARGET_ID, target)
                .with(keys::TARGET_PROPERTY, property),
        )
    }

    /// Clear a source's binding.
    pub fn unbind(&mut self, source: &ObjectId) -> PropagationResult<Settled> {
        if !self.store.contains(source) {
            return Err(PropagationError::UnknownObject(source.clone()));
        }
        self.apply(
            source,
            PropertyMap::new()
                .with(keys::TARGET_ID, PropertyValue::Null)
                .with(keys::TARGET_PROPERTY, PropertyValue::Null),
        )
    }

    /// Make `slave` follow `master` (or stop following with `None`).
    pub fn set_inherited_slider(
        &mut self,
        slave: &ObjectId,
        master: Option<&ObjectId>,
    ) -> PropagationResult<Settled> {
        if self.store.slider(slave).is_none() {
            return Err(match self.store.contains(slave) {
                true => PropagationError::NotASlider(slave.clone()),
                false => PropagationError::UnknownObject(slave.clone()),
            });
        }
        if let Some(master) = master {
            if master == slave {
                return Err(PropagationError::SelfInheritance(slave.clone()));
            }
            if self.store.slider(master).is_none() {
                return Err(PropagationError::NotASlider(master.clone()));
            }
        }
        self.apply(
            slave,
            PropertyMap::single(keys::INHERITED_SLIDER_ID, master),
        )
    }

    /// Properties of `target` a binding may address.
    pub fn numeric_targets(&self, target: &ObjectId) -> Vec<(String, f64)> {
        self.store
            .get(target)
            .map(Object::numeric_properties)
            .unwrap_or_default()
    }

    // ── Structured edits ──

    fn block_mut(&mut self, id: &ObjectId) -> PropagationResult<&mut SequencedBlock> {
        match self.store.get_mut(id) {
            Some(Object::SequencedBlock(block)) => Ok(block),
            Some(_) => Err(PropagationError::NotABlock(id.clone())),
            None => Err(PropagationError::UnknownObject(id.clone())),
        }
    }

    /// Append an instruction; it receives order `N + 1`.
    pub fn add_instruction(
        &mut self,
        block: &ObjectId,
        instruction: Instruction,
    ) -> PropagationResult<u32> {
        let block = self.block_mut(block)?;
        block.push_instruction(instruction);
        Ok(block.instructions.len() as u32)
    }

    /// Remove the instruction at list position `index`; the rest are renumbered `1..N-1`.
    pub fn remove_instruction(
        &mut self,
        block_id: &ObjectId,
        index: usize,
    ) -> PropagationResult<Instruction> {
        let block = self.block_mut(block_id)?;
        block
            .remove_instruction(index)
            .ok_or_else(|| PropagationError::InstructionIndex {
                block: block_id.clone(),
                index,
            })
    }

    pub fn move_instruction(
        &mut self,
        block_id: &ObjectId,
        from: usize,
        to: usize,
    ) -> PropagationResult<()> {
        let block = self.block_mut(block_id)?;
        if block.move_instruction(from, to) {
            Ok(())
        } else {
            Err(PropagationError::InstructionIndex {
                block: block_id.clone(),
                index: from.max(to),
            })
        }
    }

    /// Replace a bridge's pin mappings.
    pub fn set_mappings(
        &mut self,
        bridge_id: &ObjectId,
        inputs: Vec<InputMapping>,
        outputs: Vec<OutputMapping>,
    ) -> PropagationResult<()> {
        match self.store.get_mut(bridge_id) {
            Some(Object::Bridge(bridge)) => {
                bridge.input_mappings = inputs;
                bridge.output_mappings = outputs;
                Ok(())
            }
            Some(_) => Err(PropagationError::NotABridge(bridge_id.clone())),
            None => Err(PropagationError::UnknownObject(bridge_id.clone())),
        }
    }
}

/// Enqueue the writes implied by `next` having just received `pending`.
fn discover(
    staging: &Staging<'_>,
    next: &Object,
    pending: &PropertyMap,
    queue: &mut VecDeque<(ObjectId, PropertyMap)>,
) {
    match next {
        Object::Slider(slider) if pending.contains_key(keys::VALUE) => {
            if let (Some(target), Some(property)) = (&slider.target_id, &slider.target_property) {
                queue.push_back((target.clone(), PropertyMap::single(property.clone(), slider.value)));
            }
            for slave in staging.slaves_of(&slider.id) {
                let mapped = slave.inherit_from(slider, slider.value);
                if mapped != slave.value {
                    queue.push_back((slave.id.clone(), PropertyMap::single(keys::VALUE, mapped)));
                }
            }
        }
        Object::Switch(switch) if pending.contains_key(keys::CURRENT_STATE) => {
            if let (Some(target), Some(property)) = (&switch.target_id, &switch.target_property) {
                match parse_number(switch.active_literal()) {
                    Some(n) => queue.push_back((target.clone(), PropertyMap::single(property.clone(), n))),
                    None => tracing::trace!(
                        "Switch {} literal {:?} is not numeric; not propagating",
                        switch.id,
                        switch.active_literal()
                    ),
                }
            }
        }
        _ => {}
    }
}

/// Replace an incoming slider `value` with its moving average when smoothing is on.
fn smooth(averages: &mut HashMap<ObjectId, VecDeque<f64>>, slider: &Slider, pending: &mut PropertyMap) {
    let enabled = pending
        .get(keys::USE_MOVING_AVERAGE)
        .and_then(PropertyValue::as_bool)
        .unwrap_or(slider.use_moving_average);
    if !enabled {
        averages.remove(&slider.id);
        return;
    }
    let Some(raw) = pending.get(keys::VALUE).and_then(PropertyValue::as_number) else {
        return;
    };
    let window = pending
        .get(keys::MOVING_AVERAGE_WINDOW)
        .and_then(PropertyValue::as_number)
        .map(|w| w.round().clamp(1.0, 1024.0) as usize)
        .unwrap_or(slider.moving_average_window.max(1) as usize);

    let samples = averages.entry(slider.id.clone()).or_default();
    samples.push_back(raw);
    while samples.len() > window {
        samples.pop_front();
    }
    let average = samples.iter().sum::<f64>() / samples.len() as f64;
    pending.insert(keys::VALUE, average);
}
