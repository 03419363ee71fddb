//! Bake captured field values into a copy of a template PDF
//!
//! Every field with a capture is drawn directly into its page's content
//! stream: signatures as image XObjects, checkboxes as a stroked check mark,
//! text and dates as a single clipped line of Helvetica. Problems confined to
//! one field are reported as [`BakeWarning`]s and never abort the bake; only
//! a template that cannot be loaded or a document that cannot be written is
//! fatal.

use crate::coords::{to_page_space, PdfRect};
use crate::document::PdfDocument;
use crate::error::{BakeError, ImageError, PdfError};
use crate::image::decode_signature_payload;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};
use shared_types::{CaptureSnapshot, FieldId, FieldType, TemplateField};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

const FONT_RESOURCE_PREFIX: &str = "DsF";
const IMAGE_RESOURCE_PREFIX: &str = "DsIm";

/// The captured string that marks a checkbox as checked
pub const CHECKED: &str = "true";

/// Tunables for drawn content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeOptions {
    /// Font size used for text when the field is tall enough
    pub default_font_size: f64,
    /// Text never shrinks below this size
    pub min_font_size: f64,
    /// Horizontal inset of text from the field's left edge
    pub text_padding: f64,
    /// Stroke width of the check glyph, as a fraction of the field's smaller side
    pub checkbox_line_ratio: f64,
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            default_font_size: 12.0,
            min_font_size: 4.0,
            text_padding: 2.0,
            checkbox_line_ratio: 0.12,
        }
    }
}

/// A field that could not be drawn; the rest of the document still bakes
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BakeWarning {
    #[error("Field {field_id}: page {page_number} does not exist")]
    PageMissing { field_id: FieldId, page_number: u32 },

    #[error("Field {field_id}: page {page_number} geometry unavailable: {reason}")]
    PageGeometry {
        field_id: FieldId,
        page_number: u32,
        reason: PdfError,
    },

    #[error("Field {field_id}: signature unreadable: {reason}")]
    SignatureUnreadable { field_id: FieldId, reason: ImageError },

    #[error("Field {field_id} extends beyond page {page_number}")]
    OutOfBounds { field_id: FieldId, page_number: u32 },

    #[error("Field {field_id}: could not be drawn: {reason}")]
    DrawFailed { field_id: FieldId, reason: PdfError },
}

impl BakeWarning {
    pub fn field_id(&self) -> &str {
        match self {
            BakeWarning::PageMissing { field_id, .. }
            | BakeWarning::PageGeometry { field_id, .. }
            | BakeWarning::SignatureUnreadable { field_id, .. }
            | BakeWarning::OutOfBounds { field_id, .. }
            | BakeWarning::DrawFailed { field_id, .. } => field_id,
        }
    }
}

/// Output of a bake
#[derive(Debug, Clone)]
pub struct BakeReport {
    /// Serialized bytes of the new document
    pub bytes: Vec<u8>,
    /// Ids of fields that produced content, in template order
    pub drawn: Vec<FieldId>,
    pub warnings: Vec<BakeWarning>,
}

/// Bake with default options
pub fn bake(
    original: &[u8],
    fields: &[TemplateField],
    captures: &CaptureSnapshot,
) -> Result<BakeReport, BakeError> {
    DocumentBaker::default().bake(original, fields, captures)
}

#[derive(Debug, Clone, Default)]
pub struct DocumentBaker {
    options: BakeOptions,
}

/// Content accumulated for one page before it is written
#[derive(Default)]
struct PageCanvas {
    operations: Vec<Operation>,
    font: Option<String>,
}

impl DocumentBaker {
    pub fn new(options: BakeOptions) -> Self {
        Self { options }
    }

    /// Draw every captured field onto a copy of `original`.
    ///
    /// `original` is never modified. Fields without a capture are skipped
    /// silently; they were optional and left blank.
    pub fn bake(
        &self,
        original: &[u8],
        fields: &[TemplateField],
        captures: &CaptureSnapshot,
    ) -> Result<BakeReport, BakeError> {
        let mut pdf = PdfDocument::from_bytes(original).map_err(BakeError::Load)?;

        let mut canvases: BTreeMap<ObjectId, PageCanvas> = BTreeMap::new();
        let mut font_id: Option<ObjectId> = None;
        let mut drawn = Vec::new();
        let mut warnings = Vec::new();

        for field in fields {
            let Some(value) = captures.get(&field.id).filter(|v| !v.is_empty()) else {
                continue;
            };

            let Some(page_id) = pdf.page_id(field.page_number) else {
                warnings.push(BakeWarning::PageMissing {
                    field_id: field.id.clone(),
                    page_number: field.page_number,
                });
                continue;
            };

            let page = match pdf.page_box(field.page_number) {
                Ok(page) => page,
                Err(reason) => {
                    warnings.push(BakeWarning::PageGeometry {
                        field_id: field.id.clone(),
                        page_number: field.page_number,
                        reason,
                    });
                    continue;
                }
            };

            if !field.fits_within(page.width, page.height) {
                warnings.push(BakeWarning::OutOfBounds {
                    field_id: field.id.clone(),
                    page_number: field.page_number,
                });
            }

            let rect = to_page_space(&field.rect(), &page);
            debug!(
                field_id = %field.id,
                field_type = %field.field_type,
                page = field.page_number,
                x = rect.x,
                y = rect.y,
                "drawing field"
            );

            let canvas = canvases.entry(page_id).or_default();
            let outcome = match field.field_type {
                FieldType::Signature => {
                    self.draw_signature(&mut pdf, page_id, canvas, field, value, &rect)
                }
                FieldType::Checkbox => {
                    if value == CHECKED {
                        self.draw_check(canvas, &rect);
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                }
                FieldType::Text | FieldType::Date => self
                    .draw_text(&mut pdf, page_id, canvas, &mut font_id, value, &rect)
                    .map(|_| true)
                    .map_err(|reason| BakeWarning::DrawFailed {
                        field_id: field.id.clone(),
                        reason,
                    }),
            };

            match outcome {
                Ok(true) => drawn.push(field.id.clone()),
                Ok(false) => {}
                Err(warning) => warnings.push(warning),
            }
        }

        for (page_id, canvas) in canvases {
            if canvas.operations.is_empty() {
                continue;
            }
            let content = Content {
                operations: canvas.operations,
            };
            let encoded = content
                .encode()
                .map_err(|e| BakeError::Serialize(PdfError::Save(e.to_string())))?;
            pdf.append_isolated_content(page_id, encoded)
                .map_err(BakeError::Serialize)?;
        }

        for warning in &warnings {
            warn!(field_id = warning.field_id(), "{}", warning);
        }

        let bytes = pdf.save_to_bytes().map_err(BakeError::Serialize)?;
        Ok(BakeReport {
            bytes,
            drawn,
            warnings,
        })
    }

    fn draw_signature(
        &self,
        pdf: &mut PdfDocument,
        page_id: ObjectId,
        canvas: &mut PageCanvas,
        field: &TemplateField,
        payload: &str,
        rect: &PdfRect,
    ) -> Result<bool, BakeWarning> {
        let unreadable = |reason| BakeWarning::SignatureUnreadable {
            field_id: field.id.clone(),
            reason,
        };

        let image = decode_signature_payload(payload).map_err(unreadable)?;
        let smask = match image.to_smask().map_err(unreadable)? {
            Some(stream) => Some(Object::Reference(pdf.add_object(stream))),
            None => None,
        };
        let xobject = image.to_xobject(smask).map_err(unreadable)?;
        let image_id = pdf.add_object(xobject);

        let name = pdf
            .register_resource(
                page_id,
                "XObject",
                IMAGE_RESOURCE_PREFIX,
                Object::Reference(image_id),
            )
            .map_err(|reason| BakeWarning::DrawFailed {
                field_id: field.id.clone(),
                reason,
            })?;

        canvas.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(rect.width),
                    real(0.0),
                    real(0.0),
                    real(rect.height),
                    real(rect.x),
                    real(rect.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(true)
    }

    fn draw_check(&self, canvas: &mut PageCanvas, rect: &PdfRect) {
        let side = rect.width.min(rect.height);
        let line_width = (side * self.options.checkbox_line_ratio).max(0.5);
        let point = |fx: f64, fy: f64| vec![real(rect.x + rect.width * fx), real(rect.y + rect.height * fy)];

        canvas.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("w", vec![real(line_width)]),
            Operation::new("J", vec![Object::Integer(1)]),
            Operation::new("j", vec![Object::Integer(1)]),
            Operation::new("G", vec![real(0.0)]),
            Operation::new("m", point(0.2, 0.5)),
            Operation::new("l", point(0.42, 0.25)),
            Operation::new("l", point(0.8, 0.78)),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn draw_text(
        &self,
        pdf: &mut PdfDocument,
        page_id: ObjectId,
        canvas: &mut PageCanvas,
        font_id: &mut Option<ObjectId>,
        text: &str,
        rect: &PdfRect,
    ) -> Result<(), PdfError> {
        let font_name = match &canvas.font {
            Some(name) => name.clone(),
            None => {
                let id = *font_id.get_or_insert_with(|| {
                    pdf.add_object(dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                        "Encoding" => "WinAnsiEncoding",
                    })
                });
                let name = pdf.register_resource(
                    page_id,
                    "Font",
                    FONT_RESOURCE_PREFIX,
                    Object::Reference(id),
                )?;
                canvas.font = Some(name.clone());
                name
            }
        };

        let font_size = self.font_size_for(rect.height);
        // Center the cap height (~0.7em for Helvetica) within the field
        let baseline = rect.y + (rect.height - font_size * 0.7) / 2.0;

        canvas.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "re",
                vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
            ),
            Operation::new("W", vec![]),
            Operation::new("n", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font_name.into_bytes()), real(font_size)],
            ),
            Operation::new("g", vec![real(0.0)]),
            Operation::new(
                "Td",
                vec![real(rect.x + self.options.text_padding), real(baseline)],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    /// Default size, bounded above by the field height and below by the minimum
    fn font_size_for(&self, field_height: f64) -> f64 {
        self.options
            .default_font_size
            .min(field_height * 0.8)
            .max(self.options.min_font_size)
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// Encode text for a WinAnsi Type1 font; characters outside Latin-1 become `?`
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::testing::blank_pdf;
    use crate::image::testing::rgba_png_data_url;
    use lopdf::Document;
    use pretty_assertions::assert_eq;
    use shared_types::{Position, Size};

    fn field(id: &str, field_type: FieldType, page_number: u32) -> TemplateField {
        TemplateField {
            id: id.to_string(),
            field_name: id.to_string(),
            field_type,
            page_number,
            position: Position { x: 72.0, y: 100.0 },
            size: Size {
                width: 200.0,
                height: 24.0,
            },
            required: false,
            placeholder_text: None,
        }
    }

    fn captures(pairs: &[(&str, &str)]) -> CaptureSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// All operations appended to page `n` of the baked output
    fn page_operations(bytes: &[u8], n: u32) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = *doc.get_pages().get(&n).unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        Content::decode(&content).unwrap().operations
    }

    fn shown_text(ops: &[Operation]) -> Vec<String> {
        ops.iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_text_field_is_drawn() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let fields = vec![field("name", FieldType::Text, 1)];
        let report = bake(&pdf, &fields, &captures(&[("name", "Jane Doe")])).unwrap();

        assert!(report.bytes.starts_with(b"%PDF-"));
        assert_eq!(report.drawn, vec!["name".to_string()]);
        assert!(report.warnings.is_empty());
        let ops = page_operations(&report.bytes, 1);
        assert_eq!(shown_text(&ops), vec!["Jane Doe".to_string()]);
    }

    #[test]
    fn test_text_positioned_with_flipped_y() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let fields = vec![field("name", FieldType::Date, 1)];
        let report = bake(&pdf, &fields, &captures(&[("name", "2026-10-14")])).unwrap();
        let ops = page_operations(&report.bytes, 1);

        let clip = ops.iter().find(|op| op.operator == "re").unwrap();
        let y = clip.operands[1].as_float().unwrap();
        // 792 - 100 - 24
        assert!((y - 668.0).abs() < 0.01, "unexpected clip y {}", y);
    }

    #[test]
    fn test_font_size_bounded_by_field_height() {
        let baker = DocumentBaker::default();
        assert_eq!(baker.font_size_for(100.0), 12.0);
        assert!((baker.font_size_for(10.0) - 8.0).abs() < 1e-9);
        assert_eq!(baker.font_size_for(1.0), 4.0);
    }

    #[test]
    fn test_original_bytes_untouched() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let before = pdf.clone();
        let fields = vec![field("name", FieldType::Text, 1)];
        let _ = bake(&pdf, &fields, &captures(&[("name", "x")])).unwrap();
        assert_eq!(pdf, before);
    }

    #[test]
    fn test_corrupt_signature_does_not_block_text() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let fields = vec![
            field("sig1", FieldType::Signature, 1),
            field("name", FieldType::Text, 1),
        ];
        let report = bake(
            &pdf,
            &fields,
            &captures(&[("sig1", "data:image/png;base64,bm90IGEgcG5n"), ("name", "Jane Doe")]),
        )
        .unwrap();

        assert_eq!(report.drawn, vec!["name".to_string()]);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            BakeWarning::SignatureUnreadable { field_id, .. } if field_id == "sig1"
        ));
        let ops = page_operations(&report.bytes, 1);
        assert_eq!(shown_text(&ops), vec!["Jane Doe".to_string()]);
    }

    #[test]
    fn test_signature_embedded_as_image() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let fields = vec![field("sig1", FieldType::Signature, 1)];
        let report = bake(&pdf, &fields, &captures(&[("sig1", &rgba_png_data_url(8, 4))])).unwrap();

        assert_eq!(report.drawn, vec!["sig1".to_string()]);
        let ops = page_operations(&report.bytes, 1);
        let cm = ops.iter().rev().find(|op| op.operator == "cm").unwrap();
        let values: Vec<f32> = cm.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert_eq!(values, vec![200.0, 0.0, 0.0, 24.0, 72.0, 668.0]);
        assert!(ops.iter().any(|op| op.operator == "Do"));

        let doc = Document::load_mem(&report.bytes).unwrap();
        let images = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"))
            .count();
        // Image plus its soft mask
        assert_eq!(images, 2);
    }

    #[test]
    fn test_checkbox_true_draws_false_does_not() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let fields = vec![
            field("agree", FieldType::Checkbox, 1),
            field("decline", FieldType::Checkbox, 1),
        ];
        let report = bake(
            &pdf,
            &fields,
            &captures(&[("agree", "true"), ("decline", "false")]),
        )
        .unwrap();

        assert_eq!(report.drawn, vec!["agree".to_string()]);
        let ops = page_operations(&report.bytes, 1);
        assert_eq!(ops.iter().filter(|op| op.operator == "S").count(), 1);
    }

    #[test]
    fn test_missing_page_warns_and_continues() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let fields = vec![
            field("ghost", FieldType::Text, 3),
            field("name", FieldType::Text, 1),
        ];
        let report = bake(&pdf, &fields, &captures(&[("ghost", "boo"), ("name", "ok")])).unwrap();

        assert_eq!(report.drawn, vec!["name".to_string()]);
        assert_eq!(
            report.warnings,
            vec![BakeWarning::PageMissing {
                field_id: "ghost".to_string(),
                page_number: 3
            }]
        );
    }

    #[test]
    fn test_uncaptured_fields_skipped_silently() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let fields = vec![
            field("name", FieldType::Text, 1),
            field("sig1", FieldType::Signature, 1),
        ];
        let report = bake(&pdf, &fields, &captures(&[("sig1", "")])).unwrap();
        assert!(report.drawn.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_out_of_bounds_field_warns_but_draws() {
        let pdf = blank_pdf(&[(612.0, 792.0)]);
        let mut wide = field("name", FieldType::Text, 1);
        wide.position.x = 500.0;
        let report = bake(&pdf, &[wide], &captures(&[("name", "overflow")])).unwrap();
        assert_eq!(report.drawn, vec!["name".to_string()]);
        assert!(matches!(report.warnings[0], BakeWarning::OutOfBounds { .. }));
    }

    #[test]
    fn test_fields_on_multiple_pages() {
        let pdf = blank_pdf(&[(612.0, 792.0), (612.0, 792.0)]);
        let fields = vec![
            field("first", FieldType::Text, 1),
            field("second", FieldType::Text, 2),
        ];
        let report = bake(&pdf, &fields, &captures(&[("first", "one"), ("second", "two")])).unwrap();
        assert_eq!(shown_text(&page_operations(&report.bytes, 1)), vec!["one".to_string()]);
        assert_eq!(shown_text(&page_operations(&report.bytes, 2)), vec!["two".to_string()]);
    }

    #[test]
    fn test_unloadable_template_is_fatal() {
        let fields = vec![field("name", FieldType::Text, 1)];
        let result = bake(b"not a pdf", &fields, &captures(&[("name", "x")]));
        assert!(matches!(result, Err(BakeError::Load(_))));
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Zoë"), vec![b'Z', b'o', 0xEB]);
        assert_eq!(encode_win_ansi("名前"), b"??".to_vec());
        assert_eq!(encode_win_ansi("a\nb"), b"ab".to_vec());
    }
}
