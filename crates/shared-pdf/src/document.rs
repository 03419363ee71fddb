//! PDF parsing and page manipulation using lopdf

use crate::error::PdfError;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Maximum depth followed when resolving inherited page attributes
const MAX_TREE_DEPTH: usize = 32;

/// A page's MediaBox as lower-left origin plus extent, in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Wrapper around lopdf::Document with the page-level operations the baker needs
pub struct PdfDocument {
    doc: Document,
}

impl PdfDocument {
    /// Load a PDF from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
        Ok(Self { doc })
    }

    /// Get the number of pages
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Get page object ID for a given page number (1-indexed)
    pub fn page_id(&self, page_num: u32) -> Option<ObjectId> {
        self.doc.get_pages().get(&page_num).copied()
    }

    /// Get the page's MediaBox, following the page tree for inherited values
    pub fn page_box(&self, page_num: u32) -> Result<PageBox, PdfError> {
        let page_id = self
            .page_id(page_num)
            .ok_or(PdfError::PageNotFound(page_num))?;

        let media_box = self
            .inherited_attribute(page_id, b"MediaBox")?
            .ok_or(PdfError::MissingMediaBox(page_num))?;

        self.parse_rect(&media_box)
    }

    /// Look up an inheritable attribute on the page or its ancestors
    fn inherited_attribute(
        &self,
        page_id: ObjectId,
        key: &[u8],
    ) -> Result<Option<Object>, PdfError> {
        let mut current = Some(page_id);
        let mut depth = 0;

        while let Some(id) = current {
            if depth > MAX_TREE_DEPTH {
                return Err(PdfError::Structure("Page tree too deep".to_string()));
            }
            let dict = self.dict(id)?;
            if let Ok(value) = dict.get(key) {
                return Ok(Some(value.clone()));
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
            depth += 1;
        }

        Ok(None)
    }

    fn dict(&self, id: ObjectId) -> Result<&Dictionary, PdfError> {
        self.doc
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(|e| PdfError::Structure(format!("Object {:?} is not a dictionary: {}", id, e)))
    }

    /// Parse a PDF rectangle array into a PageBox
    fn parse_rect(&self, obj: &Object) -> Result<PageBox, PdfError> {
        let resolved = self.resolve(obj)?;
        let arr = resolved
            .as_array()
            .map_err(|_| PdfError::InvalidMediaBox("MediaBox is not an array".to_string()))?;

        if arr.len() != 4 {
            return Err(PdfError::InvalidMediaBox(format!(
                "MediaBox has {} elements, expected 4",
                arr.len()
            )));
        }

        let mut values = [0.0f64; 4];
        for (i, obj) in arr.iter().enumerate() {
            values[i] = self.extract_number(obj)?;
        }

        // Corners may be given in any order
        let (x1, x2) = (values[0].min(values[2]), values[0].max(values[2]));
        let (y1, y2) = (values[1].min(values[3]), values[1].max(values[3]));
        if x2 - x1 <= 0.0 || y2 - y1 <= 0.0 {
            return Err(PdfError::InvalidMediaBox(format!(
                "MediaBox {:?} has no area",
                values
            )));
        }

        Ok(PageBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }

    /// Extract a number from a PDF object
    fn extract_number(&self, obj: &Object) -> Result<f64, PdfError> {
        match self.resolve(obj)? {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(*r as f64),
            _ => Err(PdfError::InvalidMediaBox(
                "Expected number in rectangle".to_string(),
            )),
        }
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object, PdfError> {
        match obj {
            Object::Reference(id) => self
                .doc
                .get_object(*id)
                .map_err(|e| PdfError::Structure(format!("Failed to resolve reference: {}", e))),
            other => Ok(other),
        }
    }

    /// Add an indirect object to the document
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        self.doc.add_object(object)
    }

    /// Register `object` in the page's resource category (`Font`, `XObject`)
    /// under a name starting with `prefix`, returning the name chosen.
    ///
    /// Inherited or indirect resource dictionaries are copied onto the page
    /// first so the page's existing content keeps resolving.
    pub fn register_resource(
        &mut self,
        page_id: ObjectId,
        category: &str,
        prefix: &str,
        object: Object,
    ) -> Result<String, PdfError> {
        let mut resources = match self.inherited_attribute(page_id, b"Resources")? {
            Some(obj) => self.owned_dict(&obj)?,
            None => Dictionary::new(),
        };

        let mut entries = match resources.get(category.as_bytes()) {
            Ok(obj) => self.owned_dict(&obj.clone())?,
            Err(_) => Dictionary::new(),
        };

        let mut n = 1;
        let name = loop {
            let candidate = format!("{}{}", prefix, n);
            if !entries.has(candidate.as_bytes()) {
                break candidate;
            }
            n += 1;
        };

        entries.set(name.as_bytes().to_vec(), object);
        resources.set(category.as_bytes().to_vec(), Object::Dictionary(entries));

        self.page_dict_mut(page_id)?
            .set("Resources", Object::Dictionary(resources));

        Ok(name)
    }

    /// Clone a dictionary, resolving one level of indirection
    fn owned_dict(&self, obj: &Object) -> Result<Dictionary, PdfError> {
        self.resolve(obj)?
            .as_dict()
            .cloned()
            .map_err(|_| PdfError::Structure("Resource entry is not a dictionary".to_string()))
    }

    fn page_dict_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary, PdfError> {
        self.doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| PdfError::Structure(format!("Page is not a dictionary: {}", e)))
    }

    /// Append a content stream to the page, isolating it from the graphics
    /// state left behind by the existing content.
    pub fn append_isolated_content(
        &mut self,
        page_id: ObjectId,
        content: Vec<u8>,
    ) -> Result<(), PdfError> {
        let unclosed = self.unclosed_saves(page_id);
        let existing = match self.doc.get_object(page_id) {
            Ok(page) => match page.as_dict() {
                Ok(dict) => dict.get(b"Contents").ok().cloned(),
                Err(_) => {
                    return Err(PdfError::Structure("Page is not a dictionary".to_string()))
                }
            },
            Err(_) => return Err(PdfError::Structure(format!("Page {:?} missing", page_id))),
        };

        let mut parts: Vec<Object> = match existing {
            None => Vec::new(),
            Some(Object::Array(items)) => items,
            Some(Object::Reference(id)) => match self.doc.get_object(id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(id)],
            },
            Some(_) => {
                return Err(PdfError::Structure(
                    "Page Contents is neither a stream nor an array".to_string(),
                ))
            }
        };

        let mut appended = Vec::with_capacity(content.len() + 2 * (unclosed + 1));
        if !parts.is_empty() {
            let open = self
                .doc
                .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            parts.insert(0, Object::Reference(open));
            // One restore per save the page leaves open, then our own
            for _ in 0..=unclosed {
                appended.extend_from_slice(b"Q\n");
            }
        }
        appended.extend_from_slice(&content);

        let stream_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), appended));
        parts.push(Object::Reference(stream_id));

        self.page_dict_mut(page_id)?
            .set("Contents", Object::Array(parts));
        Ok(())
    }

    /// Count `q` operators in the page's content with no matching `Q`.
    /// Undecodable content counts as balanced.
    fn unclosed_saves(&self, page_id: ObjectId) -> usize {
        let decoded = self
            .doc
            .get_page_content(page_id)
            .ok()
            .and_then(|bytes| Content::decode(&bytes).ok());
        let Some(content) = decoded else {
            return 0;
        };
        content
            .operations
            .iter()
            .fold(0usize, |depth, op| match op.operator.as_str() {
                "q" => depth + 1,
                "Q" => depth.saturating_sub(1),
                _ => depth,
            })
    }

    /// Save the document to bytes
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, PdfError> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        Ok(buffer)
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Synthetic PDFs for tests

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF with one page per entry of `page_sizes`, each carrying a
    /// small pre-existing content stream.
    pub fn blank_pdf(page_sizes: &[(f64, f64)]) -> Vec<u8> {
        pdf_with_content(
            page_sizes,
            &[
                Operation::new("q", vec![]),
                Operation::new("cm", vec![2.into(), 0.into(), 0.into(), 2.into(), 0.into(), 0.into()]),
            ],
        )
    }

    /// Build a PDF whose pages all carry `operations` as their content
    pub fn pdf_with_content(page_sizes: &[(f64, f64)], operations: &[Operation]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for (width, height) in page_sizes {
            let content = Content {
                operations: operations.to_vec(),
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().unwrap_or_default(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), Object::Real(*width as f32), Object::Real(*height as f32)],
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap_or_default();
        buffer
    }
}
