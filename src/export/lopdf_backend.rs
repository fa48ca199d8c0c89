//! `lopdf` document mutator

use std::collections::{BTreeMap, HashSet};

use image::RgbaImage;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use super::projection::{OutputPage, Placement};
use super::vector::VectorForm;
use super::{DocumentMutator, ExportError};

/// Fallback page size (A4) when no `/MediaBox` is found
const DEFAULT_PAGE_SIZE: (f32, f32) = (595.0, 842.0);

/// Handle to an embedded image or form XObject
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LopdfImage {
    id: ObjectId,
    /// Resource name suffix, unique within this document
    serial: usize,
}

pub struct LopdfMutator {
    doc: Document,
    /// Page ids in page order
    pages: Vec<ObjectId>,
    /// Pages whose original content is already wrapped in `q .. Q`
    isolated: HashSet<ObjectId>,
    next_serial: usize,
}

impl LopdfMutator {
    pub fn load(bytes: &[u8]) -> Result<Self, ExportError> {
        let doc = Document::load_mem(bytes)?;
        let pages: BTreeMap<u32, ObjectId> = doc.get_pages();
        Ok(Self {
            pages: pages.into_values().collect(),
            doc,
            isolated: HashSet::new(),
            next_serial: 0,
        })
    }

    fn page_id(&self, page: usize) -> Result<ObjectId, ExportError> {
        self.pages
            .get(page)
            .copied()
            .ok_or(ExportError::PageOutOfRange {
                page,
                page_count: self.pages.len(),
            })
    }

    fn register_xobject(
        &mut self,
        page_id: ObjectId,
        name: &str,
        image: ObjectId,
    ) -> Result<(), ExportError> {
        let mut resources = match page_dict(&self.doc, page_id)?.get(b"Resources") {
            Ok(Object::Reference(id)) => resolve_dict(&self.doc, *id)?,
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => inherited(&self.doc, page_id, b"Resources")
                .and_then(|o| match o {
                    Object::Dictionary(dict) => Some(dict),
                    Object::Reference(id) => resolve_dict(&self.doc, id).ok(),
                    _ => None,
                })
                .unwrap_or_else(Dictionary::new),
        };

        let mut xobjects = match resources.get(b"XObject") {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            Ok(Object::Reference(id)) => resolve_dict(&self.doc, *id)?,
            _ => Dictionary::new(),
        };
        xobjects.set(name, image);
        resources.set("XObject", xobjects);

        self.doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)?
            .set("Resources", resources);
        Ok(())
    }

    /// Append `content` as a new stream after the page's existing content.
    /// The first append on a page also wraps the original content in `q .. Q`.
    fn append_content(&mut self, page_id: ObjectId, content: String) -> Result<(), ExportError> {
        let mut contents = content_streams(&self.doc, page_id)?;
        if self.isolated.insert(page_id) {
            let push = self
                .doc
                .add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
            let pop = self
                .doc
                .add_object(Stream::new(dictionary! {}, b"Q\n".to_vec()));
            contents.insert(0, Object::Reference(push));
            contents.push(Object::Reference(pop));
        }
        let draw = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.into_bytes()));
        contents.push(Object::Reference(draw));

        self.doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)?
            .set("Contents", contents);
        Ok(())
    }
}

impl DocumentMutator for LopdfMutator {
    type ImageRef = LopdfImage;

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Result<OutputPage, ExportError> {
        let page_id = self.page_id(index)?;
        let (width, height) = inherited(&self.doc, page_id, b"MediaBox")
            .and_then(|o| media_box_size(&self.doc, &o))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Ok(OutputPage {
            width,
            height,
            rotation: rotation_of(&self.doc, page_id),
        })
    }

    fn embed_image(&mut self, image: &RgbaImage) -> Result<LopdfImage, ExportError> {
        let (width, height) = image.dimensions();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in image.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let smask = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        let id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "SMask" => smask,
            },
            rgb,
        ));

        self.next_serial += 1;
        Ok(LopdfImage {
            id,
            serial: self.next_serial,
        })
    }

    fn embed_form(&mut self, form: &VectorForm) -> Result<LopdfImage, ExportError> {
        // the form matrix scales the drawing's box onto the unit square
        let id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::from(form.width),
                    Object::from(form.height),
                ],
                "Matrix" => vec![
                    Object::from(1.0 / form.width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::from(1.0 / form.height),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
                "Resources" => Dictionary::new(),
            },
            form.content.clone(),
        ));

        self.next_serial += 1;
        Ok(LopdfImage {
            id,
            serial: self.next_serial,
        })
    }

    fn draw_image(
        &mut self,
        page: usize,
        image: LopdfImage,
        placement: &Placement,
    ) -> Result<(), ExportError> {
        let page_id = self.page_id(page)?;
        let name = format!("Stamp{}", image.serial);
        self.register_xobject(page_id, &name, image.id)?;

        let [a, b, c, d, e, f] = placement.matrix();
        let content = format!("q {a:.4} {b:.4} {c:.4} {d:.4} {e:.4} {f:.4} cm /{name} Do Q\n");
        self.append_content(page_id, content)
    }

    fn save(&mut self) -> Result<Vec<u8>, ExportError> {
        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| ExportError::Save(e.to_string()))?;
        Ok(out)
    }
}

/// Declared `/Rotate` of every page in page order
#[must_use]
pub fn page_rotations(doc: &Document) -> Vec<i32> {
    doc.get_pages()
        .into_values()
        .map(|id| rotation_of(doc, id))
        .collect()
}

fn rotation_of(doc: &Document, page_id: ObjectId) -> i32 {
    inherited(doc, page_id, b"Rotate")
        .and_then(|o| match o {
            Object::Reference(id) => doc.get_object(id).ok().cloned(),
            other => Some(other),
        })
        .and_then(|o| o.as_i64().ok())
        .and_then(|r| i32::try_from(r).ok())
        .unwrap_or(0)
}

/// Stream references making up a page's `/Contents`, with an indirect array flattened
fn content_streams(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, ExportError> {
    let contents = match page_dict(doc, page_id)?.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };
    let items = match contents {
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![contents.clone()],
        },
        Object::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    Ok(items)
}

fn page_dict(doc: &Document, page_id: ObjectId) -> Result<&Dictionary, ExportError> {
    Ok(doc.get_object(page_id).and_then(Object::as_dict)?)
}

fn resolve_dict(doc: &Document, id: ObjectId) -> Result<Dictionary, ExportError> {
    Ok(doc.get_object(id).and_then(Object::as_dict)?.clone())
}

/// Look up an inheritable page attribute, walking `/Parent` links
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        let dict = doc.get_object(id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        depth += 1;
        if depth > 64 {
            return None;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn media_box_size(doc: &Document, raw: &Object) -> Option<(f32, f32)> {
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let llx = arr[0].as_float().ok()?;
    let lly = arr[1].as_float().ok()?;
    let urx = arr[2].as_float().ok()?;
    let ury = arr[3].as_float().ok()?;
    Some(((urx - llx).abs(), (ury - lly).abs()))
}
