//! Client-local control set: one binding per hub channel, rebuilt wholesale
//! by the descriptor loader and patched in place by the ack reconciler.

use std::collections::HashMap;

use shared::{
    domain::{ChannelId, ChannelKind},
    protocol::{Ack, ChannelDescriptor},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlState {
    /// Two-action switch; `reading` holds the displayed token.
    Switch { reading: String },
    /// Continuous control over `0..=255` plus its displayed reading.
    Slider { level: u8, reading: String },
}

/// One rendered control, bound to exactly one channel id for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBinding {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub description: Option<String>,
    pub control: ControlState,
}

impl ControlBinding {
    pub fn reading(&self) -> &str {
        match &self.control {
            ControlState::Switch { reading } => reading,
            ControlState::Slider { reading, .. } => reading,
        }
    }
}

/// Outcome of applying one acknowledgement to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Updated { reading: String },
    /// A binding was found but the value does not fit it (non-numeric
    /// level for a slider, e.g. `FAIL`); the control is left untouched.
    IgnoredValue,
    UnknownChannel,
}

/// The full control set, in descriptor-response order, with an id index
/// for O(1) reconciliation.
///
/// A duplicate id within one response leaves both bindings rendered but
/// points the index at the LAST occurrence, so reconciliation updates
/// exactly that one binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlPanel {
    bindings: Vec<ControlBinding>,
    index: HashMap<ChannelId, usize>,
}

impl ControlPanel {
    pub fn rebuild(descriptors: &[ChannelDescriptor]) -> Self {
        let mut bindings = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let id = descriptor.channel_id();
            let control = match descriptor.kind {
                ChannelKind::Digital => ControlState::Switch {
                    reading: descriptor.value.as_reading(),
                },
                ChannelKind::Pwm => ControlState::Slider {
                    level: descriptor.value.level().unwrap_or(0),
                    reading: descriptor.value.as_reading(),
                },
            };
            index.insert(id.clone(), bindings.len());
            bindings.push(ControlBinding {
                id,
                kind: descriptor.kind,
                description: descriptor.description.clone(),
                control,
            });
        }

        Self { bindings, index }
    }

    pub fn bindings(&self) -> &[ControlBinding] {
        &self.bindings
    }

    pub fn get(&self, id: &ChannelId) -> Option<&ControlBinding> {
        self.index.get(id).map(|slot| &self.bindings[*slot])
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.bindings.iter().map(|binding| binding.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn apply_ack(&mut self, ack: &Ack) -> AckOutcome {
        let Some(&slot) = self.index.get(&ack.channel) else {
            return AckOutcome::UnknownChannel;
        };

        match &mut self.bindings[slot].control {
            ControlState::Switch { reading } => {
                *reading = ack.value.clone();
                AckOutcome::Updated {
                    reading: ack.value.clone(),
                }
            }
            ControlState::Slider { level, reading } => match ack.value.parse::<u8>() {
                Ok(value) => {
                    *level = value;
                    *reading = ack.value.clone();
                    AckOutcome::Updated {
                        reading: ack.value.clone(),
                    }
                }
                Err(_) => AckOutcome::IgnoredValue,
            },
        }
    }

    /// Local display update for a slider interaction, applied before the
    /// command is dispatched. Returns false if `id` is not bound to a
    /// slider.
    pub fn set_local_level(&mut self, id: &ChannelId, new_level: u8) -> bool {
        let Some(&slot) = self.index.get(id) else {
            return false;
        };

        match &mut self.bindings[slot].control {
            ControlState::Slider { level, reading } => {
                *level = new_level;
                *reading = new_level.to_string();
                true
            }
            ControlState::Switch { .. } => false,
        }
    }
}
