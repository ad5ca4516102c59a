//! Terminal renderers. Each draws one line of text per frame into a shared
//! [`Surface`], which the live loop flushes to the terminal.

use std::{cell::RefCell, f64::consts::TAU, rc::Rc};

use spectra_core::{AudioLevels, PresetKind, PresetParams, Renderer, Viewport, VisualPreset};

const DEFAULT_COLUMNS: usize = 64;
const SHADES: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Most recently drawn frame.
#[derive(Debug, Clone, Default)]
pub struct Surface(Rc<RefCell<String>>);

impl Surface {
    pub fn take(&self) -> Option<String> {
        let mut frame = self.0.borrow_mut();
        (!frame.is_empty()).then(|| std::mem::take(&mut *frame))
    }

    fn draw(&self, line: String) {
        *self.0.borrow_mut() = line;
    }
}

fn param_f64(params: &PresetParams, key: &str, default: f64) -> f64 {
    params.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

fn columns(viewport: Option<Viewport>) -> usize {
    viewport
        .map(|v| v.width as usize)
        .filter(|&w| w > 8)
        .unwrap_or(DEFAULT_COLUMNS)
}

fn shade(value: f64) -> char {
    let index = (value.clamp(0.0, 1.0) * (SHADES.len() - 1) as f64).round() as usize;
    SHADES[index]
}

/// Four horizontal meters: bass, mid, treble and overall.
struct Equalizer {
    surface: Surface,
    viewport: Option<Viewport>,
}

impl Renderer for Equalizer {
    fn render(&mut self, levels: &AudioLevels, params: &PresetParams, _timestamp: f64) {
        let gain = param_f64(params, "gain", 1.0);
        let width = (columns(self.viewport) / 4).saturating_sub(3).max(4);
        let meter = |label: char, level: f32| {
            let filled = ((f64::from(level) * gain).clamp(0.0, 1.0) * width as f64).round() as usize;
            format!("{label}[{}{}]", "#".repeat(filled), " ".repeat(width - filled))
        };
        self.surface.draw(format!(
            "{}{}{}{}",
            meter('B', levels.bass),
            meter('M', levels.mid),
            meter('T', levels.treble),
            meter('R', levels.rms),
        ));
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }
}

/// A point orbiting the centre; bass pushes it outwards.
struct Orbit {
    surface: Surface,
    viewport: Option<Viewport>,
}

impl Renderer for Orbit {
    fn render(&mut self, levels: &AudioLevels, params: &PresetParams, timestamp: f64) {
        let speed = param_f64(params, "speed", 1.0);
        let width = columns(self.viewport);
        let half = (width / 2) as f64;
        let radius = 0.2 + 0.8 * f64::from(levels.bass);
        let angle = timestamp / 1_000.0 * speed * TAU * 0.25;
        let x = (half + angle.cos() * radius * (half - 1.0)).round() as usize;
        let depth = shade(0.5 + 0.5 * angle.sin());

        let mut line: Vec<char> = vec![' '; width];
        line[width / 2] = '+';
        if let Some(cell) = line.get_mut(x.min(width - 1)) {
            *cell = if depth == ' ' { '.' } else { depth };
        }
        self.surface.draw(line.into_iter().collect());
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }
}

/// Scrolling interference pattern modulated by treble and overall level.
struct Plasma {
    surface: Surface,
    viewport: Option<Viewport>,
}

impl Renderer for Plasma {
    fn render(&mut self, levels: &AudioLevels, params: &PresetParams, timestamp: f64) {
        let scale = param_f64(params, "scale", 0.15);
        let t = timestamp / 1_000.0;
        let energy = f64::from(levels.rms);
        let sparkle = f64::from(levels.treble);
        let line = (0..columns(self.viewport))
            .map(|x| {
                let x = x as f64 * scale;
                let wave = (x + t).sin() + (x * 0.5 - t * 1.3).sin() * sparkle;
                shade((0.5 + 0.25 * wave) * energy)
            })
            .collect();
        self.surface.draw(line);
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }
}

/// The presets shipped with the terminal front end, in navigation order.
pub fn catalog(surface: &Surface) -> Vec<VisualPreset> {
    vec![
        VisualPreset::new(
            "equalizer-2d",
            "Equalizer",
            PresetKind::TwoD,
            Box::new(Equalizer {
                surface: surface.clone(),
                viewport: None,
            }),
        )
        .with_description("Band meters for bass, mids, treble and overall level")
        .with_default("gain", 1.0)
        .with_tags(["bars", "classic"]),
        VisualPreset::new(
            "audio-sphere-3d",
            "Audio Sphere",
            PresetKind::ThreeD,
            Box::new(Orbit {
                surface: surface.clone(),
                viewport: None,
            }),
        )
        .with_description("Orbiting body pushed outwards by the bass")
        .with_default("speed", 1.0)
        .with_tags(["orbit", "minimal"]),
        VisualPreset::new(
            "plasma-shader",
            "Plasma",
            PresetKind::Shader,
            Box::new(Plasma {
                surface: surface.clone(),
                viewport: None,
            }),
        )
        .with_description("Interference pattern shimmering with the treble")
        .with_default("scale", 0.15)
        .with_tags(["psychedelic"]),
    ]
}
