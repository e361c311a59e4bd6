//! Serialized chain descriptions.
//!
//! A description lists units in pipeline order with their chosen format and
//! control values. Saving walks the chain; loading replays it as
//! `set_control` + `add_unit` calls against a [`UnitRegistry`].
//!
//! # Example
//!
//! ```toml
//! [[units]]
//! kind = "input.test_pattern"
//!
//! [units.format]
//! pixel_format = "gray8"
//! width = 320
//! height = 240
//!
//! [[units.controls]]
//! id = "fps"
//! value = { type = "enum", value = 15 }
//!
//! [[units]]
//! kind = "filter.passthrough"
//! ```

use crate::error::{FrameChainError, Result, ResultExt};
use crate::pipeline::chain::Chain;
use crate::pipeline::control::ControlValue;
use crate::pipeline::error::{ChainResult, ControlError};
use crate::pipeline::format::{FormatPreference, PixelFormat};
use crate::pipeline::registry::UnitRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainDescription {
    #[serde(default)]
    pub units: Vec<UnitEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitEntry {
    /// Registry id of the unit.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<ControlEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatEntry {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEntry {
    pub id: String,
    pub value: ControlValue,
}

impl From<&FormatEntry> for FormatPreference {
    fn from(entry: &FormatEntry) -> Self {
        FormatPreference {
            pixel_format: entry.pixel_format,
            width: Some(entry.width),
            height: Some(entry.height),
            name: entry.name.clone(),
        }
    }
}

impl ChainDescription {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a description. `.json` files are JSON, anything else TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(FrameChainError::from)
            .with_context(|| format!("Failed to read chain description {}", path.display()))?;
        let parsed = if is_json(path) {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        };
        parsed.with_context(|| format!("Failed to parse chain description {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = if is_json(path) {
            self.to_json_string()?
        } else {
            self.to_toml_string()?
        };
        std::fs::write(path, text)
            .map_err(FrameChainError::from)
            .with_context(|| format!("Failed to write chain description {}", path.display()))
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

impl Chain {
    /// Describe the chain: unit kinds, selected formats and control values.
    pub fn snapshot(&self) -> ChainDescription {
        let units = self
            .units()
            .iter()
            .map(|unit| UnitEntry {
                kind: unit.kind(),
                format: unit.selected_format().map(|f| FormatEntry {
                    pixel_format: f.pixel_format,
                    width: f.width,
                    height: f.height,
                    name: Some(f.name),
                }),
                controls: unit
                    .controls()
                    .into_iter()
                    .map(|c| ControlEntry {
                        id: c.id,
                        value: c.value,
                    })
                    .collect(),
            })
            .collect();
        ChainDescription { units }
    }

    /// Replace the chain's contents with the units of `description`.
    ///
    /// Unknown or rejected control values are logged and skipped; an
    /// unknown unit kind aborts the load.
    pub fn load(&mut self, description: &ChainDescription, registry: &UnitRegistry) -> ChainResult<()> {
        self.clear();
        for entry in &description.units {
            let unit = registry.create_unit(&entry.kind)?;
            if let Some(format) = &entry.format {
                unit.set_preferred_format(format.into());
            }
            for control in &entry.controls {
                match unit.set_control(&control.id, control.value.clone()) {
                    Ok(actual) if actual != control.value => tracing::debug!(
                        "{} '{}': control '{}' coerced from {} to {}",
                        unit.id(),
                        entry.kind,
                        control.id,
                        control.value,
                        actual
                    ),
                    Ok(_) => {}
                    Err(ControlError::Unknown(id)) => {
                        tracing::warn!("{}: ignoring unknown control '{}'", entry.kind, id)
                    }
                    Err(e) => tracing::warn!("{}: {}", entry.kind, e),
                }
            }
            self.add_unit(unit)?;
        }
        tracing::info!("Loaded chain of {} units", self.len());
        Ok(())
    }
}
