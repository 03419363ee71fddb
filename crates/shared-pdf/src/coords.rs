//! Coordinate transformation between template, overlay and PDF page space
//!
//! Fields are stored in template space: PDF points, origin at the page's
//! top-left. The overlay shows them scaled by the viewer's zoom. PDF drawing
//! happens in page space, origin at the MediaBox's bottom-left, so the
//! vertical axis is flipped exactly once, at bake time. Zoom never affects
//! stored or baked coordinates.

use crate::document::PageBox;
use shared_types::{FieldRect, Position};

/// On-screen rectangle of a field at the current zoom
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Lower-left corner of a field in PDF drawing coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfPoint {
    pub x: f64,
    pub y: f64,
}

/// Field rectangle in PDF page space, `(x, y)` being its lower-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Scale a stored field rectangle for display at `scale`
pub fn to_overlay(rect: &FieldRect, scale: f64) -> OverlayRect {
    OverlayRect {
        x: rect.x * scale,
        y: rect.y * scale,
        width: rect.width * scale,
        height: rect.height * scale,
    }
}

/// Convert an overlay pointer position back to template space
pub fn from_overlay(x: f64, y: f64, scale: f64) -> (f64, f64) {
    (x / scale, y / scale)
}

/// Convert a stored rectangle into the PDF draw origin (flip Y axis)
pub fn to_pdf_space(rect: &FieldRect, page_height: f64) -> PdfPoint {
    PdfPoint {
        x: rect.x,
        y: page_height - rect.y - rect.height,
    }
}

/// Inverse of [`to_pdf_space`]: recover the stored top-left-relative position
pub fn from_pdf_space(point: PdfPoint, field_height: f64, page_height: f64) -> Position {
    Position {
        x: point.x,
        y: page_height - point.y - field_height,
    }
}

/// Map a stored rectangle onto a concrete page, honoring a MediaBox that
/// does not start at the origin
pub fn to_page_space(rect: &FieldRect, page: &PageBox) -> PdfRect {
    let origin = to_pdf_space(rect, page.height);
    PdfRect {
        x: page.x + origin.x,
        y: page.y + origin.y,
        width: rect.width,
        height: rect.height,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    // Strategy for valid positive dimensions (1.0 to 2000.0 points)
    fn dimension() -> impl Strategy<Value = f64> {
        1.0f64..2000.0
    }

    // Strategy for a percentage (0.0 to 1.0)
    fn percentage() -> impl Strategy<Value = f64> {
        0.0f64..=1.0
    }

    fn field_on_page() -> impl Strategy<Value = (FieldRect, f64)> {
        (dimension(), dimension(), percentage(), percentage(), percentage(), percentage())
            .prop_map(|(page_w, page_h, x_pct, y_pct, w_pct, h_pct)| {
                let x = x_pct * page_w;
                let y = y_pct * page_h;
                let width = (page_w - x) * w_pct;
                let height = (page_h - y) * h_pct;
                (
                    FieldRect {
                        x,
                        y,
                        width,
                        height,
                    },
                    page_h,
                )
            })
    }

    proptest! {
        /// Property: flipping into PDF space and back recovers the stored position
        #[test]
        fn roundtrip_template_to_pdf_to_template((field, page_h) in field_on_page()) {
            let point = to_pdf_space(&field, page_h);
            let back = from_pdf_space(point, field.height, page_h);

            let tolerance = 0.0001;
            prop_assert!((back.x - field.x).abs() < tolerance);
            prop_assert!(
                (back.y - field.y).abs() < tolerance,
                "Y roundtrip failed: {} -> {} -> {}",
                field.y, point.y, back.y
            );
        }

        /// Property: a field inside the page stays inside the page after the flip
        #[test]
        fn flipped_field_stays_on_page((field, page_h) in field_on_page()) {
            let point = to_pdf_space(&field, page_h);
            let tolerance = 0.0001;
            prop_assert!(point.y >= -tolerance);
            prop_assert!(point.y + field.height <= page_h + tolerance);
        }

        /// Property: moving down in template space moves down in PDF space
        #[test]
        fn y_axis_movement_direction(
            (field, page_h) in field_on_page(),
            delta in 0.1f64..50.0,
        ) {
            let lower = FieldRect { y: field.y + delta, ..field };
            let a = to_pdf_space(&field, page_h);
            let b = to_pdf_space(&lower, page_h);
            prop_assert!(b.y < a.y);
        }

        /// Property: zoom changes the overlay but never the baked coordinates
        #[test]
        fn zoom_does_not_affect_pdf_space(
            (field, page_h) in field_on_page(),
            scale in 0.25f64..4.0,
        ) {
            let overlay = to_overlay(&field, scale);
            let (x, y) = from_overlay(overlay.x, overlay.y, scale);
            let rehydrated = FieldRect { x, y, ..field };

            let direct = to_pdf_space(&field, page_h);
            let via_overlay = to_pdf_space(&rehydrated, page_h);

            let tolerance = 0.0001;
            prop_assert!((direct.x - via_overlay.x).abs() < tolerance);
            prop_assert!((direct.y - via_overlay.y).abs() < tolerance);
        }

        /// Property: overlay scaling is linear in the zoom factor
        #[test]
        fn overlay_scaling_is_linear(
            (field, _page_h) in field_on_page(),
            scale in 0.25f64..2.0,
        ) {
            let once = to_overlay(&field, scale);
            let twice = to_overlay(&field, scale * 2.0);
            let tolerance = 0.0001;
            prop_assert!((twice.width - 2.0 * once.width).abs() < tolerance);
            prop_assert!((twice.y - 2.0 * once.y).abs() < tolerance);
        }
    }
}
