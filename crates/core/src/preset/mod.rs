//! Visualisation presets and the ordered registry that holds them.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::{AudioLevels, Viewport};

/// Value of a single preset parameter.
pub type ParamValue = serde_json::Value;

/// Parameter overrides for one preset, keyed by parameter name.
pub type PresetParams = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetKind {
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    ThreeD,
    #[serde(rename = "shader")]
    Shader,
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TwoD => "2d",
            Self::ThreeD => "3d",
            Self::Shader => "shader",
        })
    }
}

/// Draws one visualisation.
///
/// The render loop calls [`Renderer::render`] at most once per frame and never
/// concurrently.
pub trait Renderer {
    fn render(&mut self, levels: &AudioLevels, params: &PresetParams, timestamp: f64);

    /// Called once per settled viewport change, aligned to a frame.
    fn resize(&mut self, _viewport: Viewport) {}
}

/// Serializable description of a preset, without its renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: PresetKind,
    #[serde(default)]
    pub defaults: PresetParams,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// A registered visualisation: metadata plus the renderer that draws it.
pub struct VisualPreset {
    descriptor: PresetDescriptor,
    renderer: Box<dyn Renderer>,
}

impl VisualPreset {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: PresetKind,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self::from_descriptor(
            PresetDescriptor {
                id: id.into(),
                name: name.into(),
                description: String::new(),
                kind,
                defaults: PresetParams::new(),
                tags: BTreeSet::new(),
            },
            renderer,
        )
    }

    pub fn from_descriptor(descriptor: PresetDescriptor, renderer: Box<dyn Renderer>) -> Self {
        Self {
            descriptor,
            renderer,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.descriptor.defaults.insert(key.into(), value.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn kind(&self) -> PresetKind {
        self.descriptor.kind
    }

    pub fn defaults(&self) -> &PresetParams {
        &self.descriptor.defaults
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.descriptor.tags
    }

    pub fn descriptor(&self) -> &PresetDescriptor {
        &self.descriptor
    }

    pub fn renderer_mut(&mut self) -> &mut dyn Renderer {
        self.renderer.as_mut()
    }

    /// Renderer and defaults borrowed together.
    pub fn parts_mut(&mut self) -> (&mut dyn Renderer, &PresetParams) {
        (self.renderer.as_mut(), &self.descriptor.defaults)
    }
}

impl fmt::Debug for VisualPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualPreset")
            .field("id", &self.descriptor.id)
            .field("kind", &self.descriptor.kind)
            .finish()
    }
}

/// Presets in registration order. The order drives navigation and the
/// default selection.
#[derive(Debug, Default)]
pub struct PresetRegistry {
    presets: Vec<VisualPreset>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `preset` unless its id is already registered. Returns whether
    /// the registry changed.
    pub fn register(&mut self, preset: VisualPreset) -> bool {
        if self.contains(preset.id()) {
            return false;
        }
        self.presets.push(preset);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.presets.iter().position(|preset| preset.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&VisualPreset> {
        self.presets.iter().find(|preset| preset.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut VisualPreset> {
        self.presets.iter_mut().find(|preset| preset.id() == id)
    }

    pub fn by_index(&self, index: usize) -> Option<&VisualPreset> {
        self.presets.get(index)
    }

    pub fn first(&self) -> Option<&VisualPreset> {
        self.presets.first()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisualPreset> {
        self.presets.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(VisualPreset::id)
    }

    pub fn with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a VisualPreset> + 'a {
        self.presets
            .iter()
            .filter(move |preset| preset.tags().contains(tag))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    /// One recorded renderer invocation.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Call {
        pub preset: String,
        pub levels: AudioLevels,
        pub params: PresetParams,
        pub timestamp: f64,
    }

    pub(crate) type CallLog = Rc<RefCell<Vec<Call>>>;

    pub(crate) type ResizeLog = Rc<RefCell<Vec<(String, Viewport)>>>;

    /// Renderer that records every call into a shared log.
    pub(crate) struct RecordingRenderer {
        pub preset: String,
        pub calls: CallLog,
        pub resizes: ResizeLog,
    }

    impl Renderer for RecordingRenderer {
        fn render(&mut self, levels: &AudioLevels, params: &PresetParams, timestamp: f64) {
            self.calls.borrow_mut().push(Call {
                preset: self.preset.clone(),
                levels: *levels,
                params: params.clone(),
                timestamp,
            });
        }

        fn resize(&mut self, viewport: Viewport) {
            self.resizes
                .borrow_mut()
                .push((self.preset.clone(), viewport));
        }
    }

    pub(crate) fn recording_preset(id: &str, calls: &CallLog) -> VisualPreset {
        resizing_preset(id, calls, &ResizeLog::default())
    }

    pub(crate) fn resizing_preset(id: &str, calls: &CallLog, resizes: &ResizeLog) -> VisualPreset {
        VisualPreset::new(
            id,
            id.to_uppercase(),
            PresetKind::TwoD,
            Box::new(RecordingRenderer {
                preset: id.to_string(),
                calls: calls.clone(),
                resizes: resizes.clone(),
            }),
        )
    }

    pub(crate) fn preset(id: &str) -> VisualPreset {
        recording_preset(id, &CallLog::default())
    }
}
