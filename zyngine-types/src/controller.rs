use serde::{Deserialize, Serialize};

/// Highest value a MIDI continuous controller can carry.
pub const MIDI_CC_MAX: u8 = 127;

/// Where a controller's value is delivered.
///
/// A textual address is an OSC path; a numeric one is a MIDI CC number.
/// Numbers outside `1..=127` mean the control is not wired yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControllerAddress {
    Osc(String),
    MidiCc(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControllerValue {
    Int(i32),
    Float(f32),
    Label(String),
}

impl From<i32> for ControllerValue {
    fn from(v: i32) -> Self {
        ControllerValue::Int(v)
    }
}

impl From<f32> for ControllerValue {
    fn from(v: f32) -> Self {
        ControllerValue::Float(v)
    }
}

impl From<&str> for ControllerValue {
    fn from(v: &str) -> Self {
        ControllerValue::Label(v.to_string())
    }
}

impl std::fmt::Display for ControllerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerValue::Int(v) => write!(f, "{}", v),
            ControllerValue::Float(v) => write!(f, "{:.3}", v),
            ControllerValue::Label(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueRange {
    Span { min: f32, max: f32 },
    Labels(Vec<String>),
}

impl ValueRange {
    /// A span needs `min <= max`, which also rules out NaN bounds.
    pub fn is_valid(&self) -> bool {
        match self {
            ValueRange::Span { min, max } => min <= max,
            ValueRange::Labels(_) => true,
        }
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        ValueRange::Span {
            min: 0.0,
            max: MIDI_CC_MAX as f32,
        }
    }
}

/// Resolved delivery path for one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRoute<'a> {
    Osc(&'a str),
    MidiCc(u8),
    Unwired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDescriptor {
    pub name: String,
    pub address: Option<ControllerAddress>,
    pub value: ControllerValue,
    #[serde(default)]
    pub range: ValueRange,
}

impl ControllerDescriptor {
    /// A controller driven by a MIDI CC with the usual 0..=127 range.
    pub fn midi(name: &str, cc: i32, default: i32) -> Self {
        Self {
            name: name.to_string(),
            address: Some(ControllerAddress::MidiCc(cc)),
            value: ControllerValue::Int(default),
            range: ValueRange::default(),
        }
    }

    /// A switch-like MIDI controller whose value is one of `labels`.
    pub fn midi_labels(name: &str, cc: i32, default: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            address: Some(ControllerAddress::MidiCc(cc)),
            value: ControllerValue::Label(default.to_string()),
            range: ValueRange::Labels(labels.iter().map(|l| l.to_string()).collect()),
        }
    }

    pub fn osc(name: &str, path: &str, default: ControllerValue, range: ValueRange) -> Self {
        Self {
            name: name.to_string(),
            address: Some(ControllerAddress::Osc(path.to_string())),
            value: default,
            range,
        }
    }

    pub fn route(&self) -> ControllerRoute<'_> {
        match &self.address {
            Some(ControllerAddress::Osc(path)) => ControllerRoute::Osc(path),
            Some(ControllerAddress::MidiCc(cc)) if (1..=MIDI_CC_MAX as i32).contains(cc) => {
                ControllerRoute::MidiCc(*cc as u8)
            }
            _ => ControllerRoute::Unwired,
        }
    }

    /// Position of the current label within the label set, if any.
    pub fn label_index(&self) -> Option<usize> {
        match (&self.value, &self.range) {
            (ControllerValue::Label(label), ValueRange::Labels(labels)) => {
                labels.iter().position(|l| l == label)
            }
            _ => None,
        }
    }

    /// Current value in MIDI CC representation.
    ///
    /// Label `i` of `n` maps to `i * 128 / n`, so a two-label switch sends 0 and 64.
    pub fn midi_value(&self) -> u8 {
        match &self.value {
            ControllerValue::Int(v) => (*v).clamp(0, MIDI_CC_MAX as i32) as u8,
            ControllerValue::Float(v) => v.round().clamp(0.0, MIDI_CC_MAX as f32) as u8,
            ControllerValue::Label(_) => {
                let n = match &self.range {
                    ValueRange::Labels(labels) if !labels.is_empty() => labels.len(),
                    _ => return 0,
                };
                let i = self.label_index().unwrap_or(0);
                (i * 128 / n).min(MIDI_CC_MAX as usize) as u8
            }
        }
    }

    /// Set a new value, coerced to the descriptor's range.
    ///
    /// Numbers are clamped to a span; on a label set a number selects the label
    /// by index. Returns false (leaving the value untouched) if the value cannot
    /// be represented or the range itself is invalid.
    pub fn set_value(&mut self, value: ControllerValue) -> bool {
        if !self.range.is_valid() {
            return false;
        }
        let coerced = match (&self.range, value) {
            (ValueRange::Span { min, max }, ControllerValue::Int(v)) => {
                ControllerValue::Int((v as f32).clamp(*min, *max) as i32)
            }
            (ValueRange::Span { min, max }, ControllerValue::Float(v)) => {
                ControllerValue::Float(v.clamp(*min, *max))
            }
            (ValueRange::Span { .. }, ControllerValue::Label(_)) => return false,
            (ValueRange::Labels(labels), ControllerValue::Label(l)) => {
                if !labels.contains(&l) {
                    return false;
                }
                ControllerValue::Label(l)
            }
            (ValueRange::Labels(labels), ControllerValue::Int(i)) => {
                match usize::try_from(i).ok().and_then(|i| labels.get(i)) {
                    Some(l) => ControllerValue::Label(l.clone()),
                    None => return false,
                }
            }
            (ValueRange::Labels(labels), ControllerValue::Float(f)) => {
                match labels.get(f.round().max(0.0) as usize) {
                    Some(l) => ControllerValue::Label(l.clone()),
                    None => return false,
                }
            }
        };
        self.value = coerced;
        true
    }
}

/// Named display grouping of controllers; no effect on dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerScreen {
    pub name: String,
    pub members: Vec<String>,
}

impl ControllerScreen {
    pub fn new(name: &str, members: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Controllers plus the screens that group them.
///
/// Used both as the immutable per-engine-type template and as the per-channel
/// working copy. Each controller appears once; screens refer to them by name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub controllers: Vec<ControllerDescriptor>,
    pub screens: Vec<ControllerScreen>,
}

impl ControllerConfig {
    pub fn new(controllers: Vec<ControllerDescriptor>, screens: Vec<ControllerScreen>) -> Self {
        Self { controllers, screens }
    }

    /// General MIDI controllers every engine understands.
    pub fn standard_midi() -> Self {
        Self::new(
            vec![
                ControllerDescriptor::midi("volume", 7, 96),
                ControllerDescriptor::midi("modulation", 1, 0),
                ControllerDescriptor::midi("pan", 10, 64),
                ControllerDescriptor::midi("expression", 11, 127),
                ControllerDescriptor::midi_labels("sustain", 64, "off", &["off", "on"]),
                ControllerDescriptor::midi("resonance", 71, 64),
                ControllerDescriptor::midi("cutoff", 74, 64),
                ControllerDescriptor::midi("reverb", 91, 64),
                ControllerDescriptor::midi("chorus", 93, 2),
            ],
            vec![
                ControllerScreen::new("main", &["volume", "expression", "pan", "sustain"]),
                ControllerScreen::new("effects", &["volume", "modulation", "reverb", "chorus"]),
            ],
        )
    }

    /// First controller whose range is invalid, if any.
    pub fn invalid_controller(&self) -> Option<&ControllerDescriptor> {
        self.controllers.iter().find(|c| !c.range.is_valid())
    }

    pub fn controller(&self, name: &str) -> Option<&ControllerDescriptor> {
        self.controllers.iter().find(|c| c.name == name)
    }

    pub fn controller_mut(&mut self, name: &str) -> Option<&mut ControllerDescriptor> {
        self.controllers.iter_mut().find(|c| c.name == name)
    }

    /// Controllers of the screen at `index`, in screen order.
    /// Members that name no known controller are skipped.
    pub fn screen_controllers(&self, index: usize) -> Option<Vec<ControllerDescriptor>> {
        let screen = self.screens.get(index)?;
        Some(
            screen
                .members
                .iter()
                .filter_map(|m| self.controller(m).cloned())
                .collect(),
        )
    }
}
