//! Typed, validated unit parameters.
//!
//! Every unit owns a [`ControlSet`]. Values go through [`Control::validate`]
//! (type, enabled, bounds, step snapping) before the unit's stage gets a
//! chance to coerce or reject them.

use crate::pipeline::error::ControlError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A control's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ControlValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Value of an enumeration entry.
    Enum(i64),
    String(String),
}

impl ControlValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ControlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ControlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ControlValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<i64> {
        match self {
            ControlValue::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ControlValue::String(v) => Some(v),
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ControlValue::Int(_) => "int",
            ControlValue::Float(_) => "float",
            ControlValue::Bool(_) => "boolean",
            ControlValue::Enum(_) => "enum",
            ControlValue::String(_) => "string",
        }
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Int(v) | ControlValue::Enum(v) => write!(f, "{}", v),
            ControlValue::Float(v) => write!(f, "{}", v),
            ControlValue::Bool(v) => write!(f, "{}", v),
            ControlValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

/// One selectable entry of an enumeration control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumEntry {
    pub value: i64,
    pub label: String,
    pub enabled: bool,
}

impl EnumEntry {
    pub fn new(value: i64, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
            enabled: true,
        }
    }
}

/// Type tag plus type-specific bounds.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    Int { min: i64, max: i64, step: i64 },
    Float { min: f64, max: f64, step: f64 },
    Boolean,
    Enum { entries: Vec<EnumEntry> },
    String,
}

impl ControlKind {
    fn name(&self) -> &'static str {
        match self {
            ControlKind::Int { .. } => "int",
            ControlKind::Float { .. } => "float",
            ControlKind::Boolean => "boolean",
            ControlKind::Enum { .. } => "enum",
            ControlKind::String => "string",
        }
    }

    fn accepts(&self, value: &ControlValue) -> bool {
        matches!(
            (self, value),
            (ControlKind::Int { .. }, ControlValue::Int(_))
                | (ControlKind::Float { .. }, ControlValue::Float(_))
                | (ControlKind::Boolean, ControlValue::Bool(_))
                | (ControlKind::Enum { .. }, ControlValue::Enum(_))
                | (ControlKind::String, ControlValue::String(_))
        )
    }
}

/// Presentation hints. The engine stores them and never reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UiHints(pub u32);

impl UiHints {
    pub const NONE: UiHints = UiHints(0);
    pub const SLIDER: UiHints = UiHints(1 << 0);
    pub const SPIN: UiHints = UiHints(1 << 1);
    pub const TEXT_ENTRY: UiHints = UiHints(1 << 2);
    pub const FILE_PATH: UiHints = UiHints(1 << 3);

    pub fn contains(self, other: UiHints) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for UiHints {
    type Output = UiHints;

    fn bitor(self, rhs: UiHints) -> UiHints {
        UiHints(self.0 | rhs.0)
    }
}

/// A named, typed parameter of a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: String,
    pub name: String,
    pub kind: ControlKind,
    pub value: ControlValue,
    pub enabled: bool,
    pub ui_hints: UiHints,
}

impl Control {
    pub fn int(
        id: impl Into<String>,
        name: impl Into<String>,
        min: i64,
        max: i64,
        step: i64,
        initial: i64,
    ) -> Result<Self, ControlError> {
        let id = id.into();
        if min > max || step <= 0 {
            return Err(ControlError::InvalidBounds(id));
        }
        Self::checked(id, name.into(), ControlKind::Int { min, max, step }, ControlValue::Int(initial))
    }

    pub fn float(
        id: impl Into<String>,
        name: impl Into<String>,
        min: f64,
        max: f64,
        step: f64,
        initial: f64,
    ) -> Result<Self, ControlError> {
        let id = id.into();
        if !(min <= max) || !(step >= 0.0) {
            return Err(ControlError::InvalidBounds(id));
        }
        Self::checked(
            id,
            name.into(),
            ControlKind::Float { min, max, step },
            ControlValue::Float(initial),
        )
    }

    pub fn boolean(id: impl Into<String>, name: impl Into<String>, initial: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ControlKind::Boolean,
            value: ControlValue::Bool(initial),
            enabled: true,
            ui_hints: UiHints::NONE,
        }
    }

    pub fn enumeration(
        id: impl Into<String>,
        name: impl Into<String>,
        entries: Vec<EnumEntry>,
        initial: i64,
    ) -> Result<Self, ControlError> {
        Self::checked(
            id.into(),
            name.into(),
            ControlKind::Enum { entries },
            ControlValue::Enum(initial),
        )
    }

    pub fn string(id: impl Into<String>, name: impl Into<String>, initial: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ControlKind::String,
            value: ControlValue::String(initial.into()),
            enabled: true,
            ui_hints: UiHints::TEXT_ENTRY,
        }
    }

    pub fn with_hints(mut self, hints: UiHints) -> Self {
        self.ui_hints = hints;
        self
    }

    fn checked(
        id: String,
        name: String,
        kind: ControlKind,
        initial: ControlValue,
    ) -> Result<Self, ControlError> {
        let mut control = Self {
            id,
            name,
            kind,
            value: initial.clone(),
            enabled: true,
            ui_hints: UiHints::NONE,
        };
        let value = control.check_bounds(initial)?;
        if value != control.value {
            return Err(ControlError::OutOfRange {
                id: control.id,
                value: control.value.to_string(),
            });
        }
        control.value = value;
        Ok(control)
    }

    /// Check `proposed` against the control's type, state and bounds,
    /// snapping numeric values onto the step grid.
    pub fn validate(&self, proposed: ControlValue) -> Result<ControlValue, ControlError> {
        if !self.enabled {
            return Err(ControlError::Disabled(self.id.clone()));
        }
        self.check_bounds(proposed)
    }

    fn check_bounds(&self, proposed: ControlValue) -> Result<ControlValue, ControlError> {
        if !self.kind.accepts(&proposed) {
            return Err(ControlError::TypeMismatch {
                id: self.id.clone(),
                expected: self.kind.name(),
            });
        }
        let out_of_range = || ControlError::OutOfRange {
            id: self.id.clone(),
            value: proposed.to_string(),
        };
        match (&self.kind, &proposed) {
            (ControlKind::Int { min, max, step }, ControlValue::Int(v)) => {
                if v < min || v > max {
                    return Err(out_of_range());
                }
                let snapped = snap_int(*v, *min, *max, *step);
                i64::try_from(snapped)
                    .map(ControlValue::Int)
                    .map_err(|_| out_of_range())
            }
            (ControlKind::Float { min, max, step }, ControlValue::Float(v)) => {
                if !v.is_finite() || v < min || v > max {
                    return Err(out_of_range());
                }
                if *step == 0.0 {
                    return Ok(ControlValue::Float(*v));
                }
                let snapped = min + ((v - min) / step).round() * step;
                Ok(ControlValue::Float(snapped.clamp(*min, *max)))
            }
            (ControlKind::Enum { entries }, ControlValue::Enum(v)) => {
                if entries.iter().any(|e| e.value == *v && e.enabled) {
                    Ok(proposed)
                } else {
                    Err(ControlError::InvalidEntry {
                        id: self.id.clone(),
                        value: *v,
                    })
                }
            }
            _ => Ok(proposed),
        }
    }

    pub fn entries(&self) -> Option<&[EnumEntry]> {
        match &self.kind {
            ControlKind::Enum { entries } => Some(entries),
            _ => None,
        }
    }
}

/// Round `v` to the nearest step counted from `min`. Round-to-nearest may
/// land one step past `max`, in which case the last grid point wins.
/// Widened so extreme bounds cannot overflow.
fn snap_int(v: i64, min: i64, max: i64, step: i64) -> i128 {
    let (v, min, max, step) = (v as i128, min as i128, max as i128, step as i128);
    let snapped = min + ((v - min + step / 2) / step) * step;
    if snapped > max {
        min + ((max - min) / step) * step
    } else {
        snapped
    }
}

/// Kind of change recorded by a [`ControlSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlChange {
    Value(String),
    Parameters(String),
}

/// Ordered controls of one unit, with lookup by id.
#[derive(Debug, Default)]
pub struct ControlSet {
    controls: Vec<Control>,
    index: HashMap<String, usize>,
    changes: Vec<ControlChange>,
}

impl ControlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a control. Ids must be unique within the unit.
    pub fn add(&mut self, control: Control) -> Result<(), ControlError> {
        if self.index.contains_key(&control.id) {
            return Err(ControlError::Duplicate(control.id));
        }
        self.index.insert(control.id.clone(), self.controls.len());
        self.changes.push(ControlChange::Parameters(control.id.clone()));
        self.controls.push(control);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Control> {
        self.index.get(id).map(|&i| &self.controls[i])
    }

    pub fn value(&self, id: &str) -> Option<&ControlValue> {
        self.get(id).map(|c| &c.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Control, ControlError> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.controls[i]),
            None => Err(ControlError::Unknown(id.to_string())),
        }
    }

    /// Store a value without bounds checks. The type must still match.
    pub fn force_set(&mut self, id: &str, value: ControlValue) -> Result<(), ControlError> {
        let control = self.get_mut(id)?;
        if !control.kind.accepts(&value) {
            return Err(ControlError::TypeMismatch {
                id: id.to_string(),
                expected: control.kind.name(),
            });
        }
        if control.value != value {
            control.value = value;
            self.changes.push(ControlChange::Value(id.to_string()));
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), ControlError> {
        let control = self.get_mut(id)?;
        if control.enabled != enabled {
            control.enabled = enabled;
            self.changes.push(ControlChange::Parameters(id.to_string()));
        }
        Ok(())
    }

    /// Replace the bounds of a control, clamping its value into them.
    pub fn set_kind(&mut self, id: &str, kind: ControlKind) -> Result<(), ControlError> {
        let control = self.get_mut(id)?;
        if control.kind.name() != kind.name() {
            return Err(ControlError::TypeMismatch {
                id: id.to_string(),
                expected: control.kind.name(),
            });
        }
        control.kind = kind;
        let clamped = match (&control.kind, &control.value) {
            (ControlKind::Int { min, max, .. }, ControlValue::Int(v)) => {
                Some(ControlValue::Int((*v).clamp(*min, *max)))
            }
            (ControlKind::Float { min, max, .. }, ControlValue::Float(v)) => {
                Some(ControlValue::Float(v.clamp(*min, *max)))
            }
            _ => None,
        };
        self.changes.push(ControlChange::Parameters(id.to_string()));
        if let Some(value) = clamped {
            self.force_set(id, value)?;
        }
        Ok(())
    }

    pub(crate) fn take_changes(&mut self) -> Vec<ControlChange> {
        std::mem::take(&mut self.changes)
    }
}
