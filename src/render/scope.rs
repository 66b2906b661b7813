//! Waveform scope widget
//!
//! Draws the most recent output samples as a time-domain trace: time runs
//! left to right, amplitude -1.0..1.0 maps bottom to top. A faded copy of
//! earlier traces gives the display a slow glow that suits the drone.

use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};

/// Display settings for the scope
#[derive(Clone)]
pub struct ScopeSettings {
    /// Trace color
    pub color: Color32,

    /// Background color
    pub background: Color32,

    /// Line thickness in pixels
    pub line_width: f32,

    /// Vertical gain (1.0 = full scale at the edges)
    pub gain: f32,

    /// Whether to draw the center line and grid
    pub show_graticule: bool,

    /// How much of the previous trace survives each frame (0.0 = none)
    pub persistence: f32,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            color: Color32::from_rgb(255, 190, 110),
            background: Color32::from_rgb(20, 14, 10),
            line_width: 1.5,
            // The drone peaks well below full scale
            gain: 4.0,
            show_graticule: true,
            persistence: 0.8,
        }
    }
}

/// Waveform scope
pub struct Scope {
    pub settings: ScopeSettings,

    /// Earlier traces and their remaining alpha
    trails: Vec<(Vec<Pos2>, f32)>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// Map sample `index` of `count` with amplitude `value` into `rect`
fn sample_to_screen(index: usize, count: usize, value: f32, gain: f32, rect: Rect) -> Pos2 {
    let t = if count > 1 {
        index as f32 / (count - 1) as f32
    } else {
        0.5
    };
    let y = (value * gain).clamp(-1.0, 1.0);
    Pos2::new(
        rect.left() + t * rect.width(),
        // Screen Y grows downward
        rect.center().y - y * rect.height() * 0.5,
    )
}

impl Scope {
    pub fn new() -> Self {
        Self {
            settings: ScopeSettings::default(),
            trails: Vec::new(),
        }
    }

    /// Draw `samples` filling the available width
    pub fn show(&mut self, ui: &mut egui::Ui, samples: &[f32], height: f32) -> egui::Response {
        let size = Vec2::new(ui.available_width(), height);
        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let rect = response.rect;

        painter.rect_filled(rect, 4.0, self.settings.background);
        if self.settings.show_graticule {
            self.draw_graticule(&painter, rect);
        }

        let points: Vec<Pos2> = samples
            .iter()
            .enumerate()
            .map(|(i, &s)| sample_to_screen(i, samples.len(), s, self.settings.gain, rect))
            .collect();

        self.draw_trails(&painter);
        if points.len() >= 2 {
            painter.add(egui::Shape::line(
                points.clone(),
                Stroke::new(self.settings.line_width, self.settings.color),
            ));
        }
        self.push_trail(points);

        response
    }

    fn draw_graticule(&self, painter: &egui::Painter, rect: Rect) {
        let grid = Stroke::new(0.5, Color32::from_rgba_unmultiplied(90, 70, 50, 80));
        let axis = Stroke::new(1.0, Color32::from_rgba_unmultiplied(120, 95, 70, 140));

        for i in 0..=8 {
            let x = rect.left() + i as f32 / 8.0 * rect.width();
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], grid);
        }
        for i in 0..=4 {
            let y = rect.top() + i as f32 / 4.0 * rect.height();
            let stroke = if i == 2 { axis } else { grid };
            painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
        }
    }

    fn draw_trails(&self, painter: &egui::Painter) {
        let base = self.settings.color;
        for (points, alpha) in &self.trails {
            if points.len() < 2 {
                continue;
            }
            let color = Color32::from_rgba_unmultiplied(base.r(), base.g(), base.b(), (alpha * 255.0 * 0.3) as u8);
            painter.add(egui::Shape::line(points.clone(), Stroke::new(self.settings.line_width, color)));
        }
    }

    /// Fade the stored traces and keep the newest one
    fn push_trail(&mut self, points: Vec<Pos2>) {
        let decay = self.settings.persistence;
        self.trails.retain_mut(|(_, alpha)| {
            *alpha *= decay;
            *alpha > 0.05
        });
        if decay > 0.0 && !points.is_empty() {
            self.trails.push((points, 1.0));
        }
    }

    /// Drop the afterglow
    pub fn clear(&mut self) {
        self.trails.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Rect {
        Rect::from_min_size(Pos2::new(0.0, 0.0), Vec2::new(100.0, 50.0))
    }

    #[test]
    fn test_sample_mapping() {
        let first = sample_to_screen(0, 11, 0.0, 1.0, rect());
        assert_eq!(first, Pos2::new(0.0, 25.0));

        let last = sample_to_screen(10, 11, 1.0, 1.0, rect());
        assert_eq!(last, Pos2::new(100.0, 0.0));

        // Gain clips at the edges
        let clipped = sample_to_screen(5, 11, -0.5, 4.0, rect());
        assert_eq!(clipped, Pos2::new(50.0, 50.0));
    }

    #[test]
    fn test_trails_fade_out() {
        let mut scope = Scope::new();
        scope.settings.persistence = 0.5;
        scope.push_trail(vec![Pos2::ZERO, Pos2::new(1.0, 1.0)]);
        assert_eq!(scope.trails.len(), 1);

        for _ in 0..5 {
            scope.push_trail(Vec::new());
        }
        // 0.5^5 < 0.05
        assert!(scope.trails.is_empty());

        scope.push_trail(vec![Pos2::ZERO]);
        scope.clear();
        assert!(scope.trails.is_empty());
    }
}
