//! Signature capture surface
//!
//! Records pointer strokes for one signature field and rasterizes them into
//! a transparent PNG. The capture store only ever sees the finished raster:
//! it is written when a stroke ends, never while one is in progress.

use crate::capture::FieldCaptureStore;
use crate::error::SurfaceError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use shared_pdf::from_overlay;
use shared_types::FieldId;

/// Raster pixels per template point
const DEFAULT_RESOLUTION: f64 = 2.0;
/// Pen width in template points
const DEFAULT_PEN_WIDTH: f64 = 2.5;
const INK: [u8; 4] = [0, 0, 0, 255];

/// Most points accepted for one stroke
pub const MAX_STROKE_POINTS: usize = 4096;

type Stroke = Vec<(f64, f64)>;

#[derive(Debug, Clone)]
pub struct SignaturePad {
    field_id: FieldId,
    /// Surface extent in template points
    width: f64,
    height: f64,
    resolution: f64,
    pen_width: f64,
    strokes: Vec<Stroke>,
    drawing: bool,
}

impl SignaturePad {
    /// A surface for `field_id` sized to the field, in template points
    pub fn new(field_id: impl Into<FieldId>, width: f64, height: f64) -> Self {
        Self {
            field_id: field_id.into(),
            width: width.max(1.0),
            height: height.max(1.0),
            resolution: DEFAULT_RESOLUTION,
            pen_width: DEFAULT_PEN_WIDTH,
            strokes: Vec::new(),
            drawing: false,
        }
    }

    pub fn field_id(&self) -> &str {
        &self.field_id
    }

    /// Start a stroke at an overlay position, relative to the surface's
    /// top-left corner, displayed at zoom `scale`
    pub fn pointer_down(&mut self, x: f64, y: f64, scale: f64) {
        let start = self.on_surface(from_overlay(x, y, scale));
        self.strokes.push(start.into_iter().collect());
        self.drawing = true;
    }

    pub fn pointer_move(&mut self, x: f64, y: f64, scale: f64) {
        if !self.drawing {
            return;
        }
        let Some(point) = self.on_surface(from_overlay(x, y, scale)) else {
            return;
        };
        if let Some(stroke) = self.strokes.last_mut() {
            if stroke.len() < MAX_STROKE_POINTS {
                stroke.push(point);
            }
        }
    }

    /// Clamp a point onto the surface; non-finite points are dropped
    fn on_surface(&self, (x, y): (f64, f64)) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some((x.clamp(0.0, self.width), y.clamp(0.0, self.height)))
    }

    /// End the current stroke and publish the raster to `store`.
    ///
    /// Returns `true` when a raster was written.
    pub fn pointer_up(&mut self, store: &mut FieldCaptureStore) -> Result<bool, SurfaceError> {
        self.drawing = false;
        self.publish(store)
    }

    /// Add a complete stroke, given in template points
    pub fn add_stroke(
        &mut self,
        points: Vec<(f64, f64)>,
        store: &mut FieldCaptureStore,
    ) -> Result<bool, SurfaceError> {
        let stroke: Stroke = points
            .into_iter()
            .filter_map(|p| self.on_surface(p))
            .take(MAX_STROKE_POINTS)
            .collect();
        if !stroke.is_empty() {
            self.strokes.push(stroke);
        }
        self.publish(store)
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.iter().all(Vec::is_empty)
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    /// Remove every stroke; the field is no longer captured
    pub fn clear(&mut self, store: &mut FieldCaptureStore) {
        self.strokes.clear();
        self.drawing = false;
        store.clear(&self.field_id);
    }

    /// Remove the most recent stroke and republish what remains
    pub fn undo_stroke(&mut self, store: &mut FieldCaptureStore) -> Result<bool, SurfaceError> {
        self.strokes.pop();
        self.drawing = false;
        if self.is_empty() {
            store.clear(&self.field_id);
            return Ok(false);
        }
        self.publish(store)
    }

    fn publish(&self, store: &mut FieldCaptureStore) -> Result<bool, SurfaceError> {
        if self.is_empty() {
            return Ok(false);
        }
        store.set(self.field_id.clone(), self.to_image()?);
        Ok(true)
    }

    fn raster_size(&self) -> (u32, u32) {
        (
            (self.width * self.resolution).ceil() as u32,
            (self.height * self.resolution).ceil() as u32,
        )
    }

    /// Rasterize the strokes as a `data:image/png;base64,` URL
    pub fn to_image(&self) -> Result<String, SurfaceError> {
        let png = self.to_png()?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
    }

    /// Rasterize the strokes to PNG bytes: black ink on a transparent background
    pub fn to_png(&self) -> Result<Vec<u8>, SurfaceError> {
        let (width, height) = self.raster_size();
        let mut canvas = Canvas::new(width, height);
        let radius = (self.pen_width * self.resolution / 2.0).max(0.5);

        for stroke in &self.strokes {
            let scaled: Vec<(f64, f64)> = stroke
                .iter()
                .map(|(x, y)| (x * self.resolution, y * self.resolution))
                .collect();
            match scaled.as_slice() {
                [] => {}
                [only] => canvas.stamp(*only, radius),
                points => {
                    for segment in points.windows(2) {
                        canvas.segment(segment[0], segment[1], radius);
                    }
                }
            }
        }

        canvas.encode()
    }
}

struct Canvas {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    /// Round brush: fill every pixel whose center lies within `radius`
    fn stamp(&mut self, (cx, cy): (f64, f64), radius: f64) {
        let min_x = (cx - radius).floor().max(0.0) as u32;
        let min_y = (cy - radius).floor().max(0.0) as u32;
        let max_x = ((cx + radius).ceil().max(0.0) as u32).min(self.width);
        let max_y = ((cy + radius).ceil().max(0.0) as u32).min(self.height);

        for py in min_y..max_y {
            for px in min_x..max_x {
                let dx = px as f64 + 0.5 - cx;
                let dy = py as f64 + 0.5 - cy;
                if dx * dx + dy * dy <= radius * radius {
                    let offset = ((py * self.width + px) * 4) as usize;
                    self.rgba[offset..offset + 4].copy_from_slice(&INK);
                }
            }
        }
    }

    fn segment(&mut self, from: (f64, f64), to: (f64, f64), radius: f64) {
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let length = (dx * dx + dy * dy).sqrt();
        let step = (radius / 2.0).max(0.25);
        // Never more stamps than it takes to cross the raster
        let diagonal = (self.width as f64).hypot(self.height as f64);
        let steps = (length.min(diagonal) / step).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            self.stamp((from.0 + dx * t, from.1 + dy * t), radius);
        }
    }

    fn encode(&self) -> Result<Vec<u8>, SurfaceError> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| SurfaceError::Encode(e.to_string()))?;
            writer
                .write_image_data(&self.rgba)
                .map_err(|e| SurfaceError::Encode(e.to_string()))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_pdf::decode_signature_payload;

    fn pad() -> SignaturePad {
        SignaturePad::new("sig1", 100.0, 40.0)
    }

    #[test]
    fn test_new_pad_is_empty() {
        let pad = pad();
        assert!(pad.is_empty());
        assert_eq!(pad.stroke_count(), 0);
    }

    #[test]
    fn test_capture_written_on_stroke_end_only() {
        let mut pad = pad();
        let mut store = FieldCaptureStore::new();

        pad.pointer_down(10.0, 10.0, 1.0);
        pad.pointer_move(50.0, 20.0, 1.0);
        assert_eq!(store.get("sig1"), None);

        assert!(pad.pointer_up(&mut store).unwrap());
        let value = store.get("sig1").unwrap();
        assert!(value.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_raster_decodes_with_ink_and_transparency() {
        let mut pad = pad();
        let mut store = FieldCaptureStore::new();
        pad.pointer_down(10.0, 20.0, 1.0);
        pad.pointer_move(90.0, 20.0, 1.0);
        pad.pointer_up(&mut store).unwrap();

        let image = decode_signature_payload(store.get("sig1").unwrap()).unwrap();
        assert_eq!((image.width, image.height), (200, 80));
        let alpha = image.alpha.unwrap();
        // Row 40 (y = 20pt) is inked across the stroke, row 0 is untouched
        assert_eq!(alpha[(40 * 200 + 100) as usize], 255);
        assert!(alpha[..200].iter().all(|a| *a == 0));
    }

    #[test]
    fn test_zoomed_input_is_normalized() {
        let mut zoomed = pad();
        let mut plain = pad();
        let mut store = FieldCaptureStore::new();

        zoomed.pointer_down(20.0, 20.0, 2.0);
        zoomed.pointer_move(160.0, 60.0, 2.0);
        zoomed.pointer_up(&mut store).unwrap();

        plain.pointer_down(10.0, 10.0, 1.0);
        plain.pointer_move(80.0, 30.0, 1.0);
        plain.pointer_up(&mut store).unwrap();

        assert_eq!(zoomed.to_png().unwrap(), plain.to_png().unwrap());
    }

    #[test]
    fn test_clear_removes_capture() {
        let mut pad = pad();
        let mut store = FieldCaptureStore::new();
        pad.add_stroke(vec![(5.0, 5.0), (20.0, 20.0)], &mut store)
            .unwrap();
        assert!(store.get("sig1").is_some());

        pad.clear(&mut store);
        assert!(pad.is_empty());
        assert_eq!(store.get("sig1"), None);
    }

    #[test]
    fn test_undo_last_stroke() {
        let mut pad = pad();
        let mut store = FieldCaptureStore::new();
        pad.add_stroke(vec![(5.0, 5.0), (20.0, 20.0)], &mut store)
            .unwrap();
        let one_stroke = store.get("sig1").unwrap().to_string();
        pad.add_stroke(vec![(50.0, 5.0), (60.0, 30.0)], &mut store)
            .unwrap();
        assert_ne!(store.get("sig1").unwrap(), one_stroke);

        assert!(pad.undo_stroke(&mut store).unwrap());
        assert_eq!(store.get("sig1").unwrap(), one_stroke);

        assert!(!pad.undo_stroke(&mut store).unwrap());
        assert_eq!(store.get("sig1"), None);
    }

    #[test]
    fn test_pointer_up_without_strokes_writes_nothing() {
        let mut pad = pad();
        let mut store = FieldCaptureStore::new();
        assert!(!pad.pointer_up(&mut store).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_off_surface_stroke_is_clamped_to_edge() {
        let mut pad = pad();
        let mut store = FieldCaptureStore::new();
        pad.pointer_down(0.0, 20.0, 1.0);
        pad.pointer_move(1e15, 20.0, 1.0);
        assert!(pad.pointer_up(&mut store).unwrap());

        let image = decode_signature_payload(store.get("sig1").unwrap()).unwrap();
        let alpha = image.alpha.unwrap();
        // Inked from the left edge to the right edge of row 40
        assert_eq!(alpha[(40 * 200) as usize], 255);
        assert_eq!(alpha[(40 * 200 + 199) as usize], 255);
    }

    #[test]
    fn test_non_finite_points_are_dropped() {
        let mut pad = pad();
        let mut store = FieldCaptureStore::new();
        pad.pointer_down(f64::NAN, 10.0, 1.0);
        pad.pointer_move(10.0, f64::INFINITY, 1.0);
        assert!(!pad.pointer_up(&mut store).unwrap());
        assert!(pad.is_empty());

        let written = pad
            .add_stroke(vec![(f64::NEG_INFINITY, 0.0), (5.0, 5.0)], &mut store)
            .unwrap();
        assert!(written);
        assert_eq!(pad.stroke_count(), 2);
    }

    #[test]
    fn test_stroke_points_are_capped() {
        let mut pad = pad();
        let mut store = FieldCaptureStore::new();
        let points: Vec<(f64, f64)> = (0..MAX_STROKE_POINTS + 10)
            .map(|i| ((i % 100) as f64, 20.0))
            .collect();
        pad.add_stroke(points, &mut store).unwrap();
        assert_eq!(pad.strokes[0].len(), MAX_STROKE_POINTS);
    }

    #[test]
    fn test_move_without_down_is_ignored() {
        let mut pad = pad();
        pad.pointer_move(10.0, 10.0, 1.0);
        assert!(pad.is_empty());
    }
}
