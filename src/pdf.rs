//! Minimal page-drawing surface and its PDF implementation.
//!
//! The report layout only needs positioned text in two faces and placed raster images,
//! so the surface is kept to exactly that. Coordinates are PDF points with the origin
//! at the bottom-left corner of the page.

use crate::error::{GgrReportError, Result};
use lopdf::content::{Content, Operation};
use log::warn;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::fs;
use std::path::Path;

pub const A4_WIDTH: f32 = 595.27;
pub const A4_HEIGHT: f32 = 841.89;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
}

impl FontFace {
    fn resource_name(&self) -> &'static str {
        match self {
            FontFace::Regular => "F1",
            FontFace::Bold => "F2",
        }
    }

    fn base_font(&self) -> &'static str {
        match self {
            FontFace::Regular => "Helvetica",
            FontFace::Bold => "Helvetica-Bold",
        }
    }

    /// Advance width in 1/1000 em for a character of the standard Helvetica metrics.
    fn glyph_width(&self, c: char) -> u16 {
        let code = c as u32;
        if !(32..=126).contains(&code) {
            return 556;
        }
        let idx = (code - 32) as usize;
        match self {
            FontFace::Regular => HELVETICA_WIDTHS[idx],
            FontFace::Bold => HELVETICA_BOLD_WIDTHS[idx],
        }
    }
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Something the report layout can draw onto, page by page.
pub trait DrawingSurface {
    /// Width and height of every page, in points.
    fn page_size(&self) -> (f32, f32);

    fn set_font(&mut self, face: FontFace, size: f32);

    /// Width of `text` in the current font.
    fn text_width(&self, text: &str) -> f32;

    fn draw_text(&mut self, x: f32, y: f32, text: &str);

    fn draw_centered_text(&mut self, center_x: f32, y: f32, text: &str) {
        let width = self.text_width(text);
        self.draw_text(center_x - width / 2.0, y, text);
    }

    /// Places the image file at `path` with its lower-left corner at (x, y).
    fn draw_image(&mut self, path: &Path, x: f32, y: f32, width: f32, height: f32) -> Result<()>;

    /// Finishes the current page and starts a fresh one.
    fn new_page(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
struct PageBuffer {
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
}

impl PageBuffer {
    fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// A4 PDF document using the built-in Helvetica faces.
pub struct PdfCanvas {
    doc: Document,
    pages_id: ObjectId,
    regular_font: ObjectId,
    bold_font: ObjectId,
    page_ids: Vec<ObjectId>,
    current: PageBuffer,
    face: FontFace,
    size: f32,
    image_count: usize,
}

fn pdf_error(err: lopdf::Error) -> GgrReportError {
    GgrReportError::PdfError(err.to_string())
}

/// Encodes text for a WinAnsiEncoding font. Characters outside the code page become '?'.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20ac}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            c if (c as u32) < 0x80 || (0xa0..=0xff).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

impl Default for PdfCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfCanvas {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut font = |face: FontFace| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => face.base_font(),
                "Encoding" => "WinAnsiEncoding",
            })
        };
        let regular_font = font(FontFace::Regular);
        let bold_font = font(FontFace::Bold);

        Self {
            doc,
            pages_id,
            regular_font,
            bold_font,
            page_ids: Vec::new(),
            current: PageBuffer::default(),
            face: FontFace::Regular,
            size: 12.0,
            image_count: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len() + usize::from(!self.current.is_empty())
    }

    fn flush_page(&mut self) -> Result<()> {
        let buffer = std::mem::take(&mut self.current);
        let content = Content {
            operations: buffer.operations,
        };
        let bytes = content.encode().map_err(pdf_error)?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, bytes));

        let mut xobjects = Dictionary::new();
        for (name, id) in buffer.images {
            xobjects.set(name, id);
        }
        let resources = dictionary! {
            "Font" => dictionary! {
                FontFace::Regular.resource_name() => self.regular_font,
                FontFace::Bold.resource_name() => self.bold_font,
            },
            "XObject" => xobjects,
        };

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                A4_WIDTH.into(),
                A4_HEIGHT.into(),
            ],
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Writes the document. A page with nothing drawn on it is not emitted at the end.
    pub fn save(mut self, path: &Path) -> Result<()> {
        if !self.current.is_empty() || self.page_ids.is_empty() {
            self.flush_page()?;
        }

        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::from(*id)).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = path.with_extension("pdf.part");
        let written = self
            .doc
            .save(&partial)
            .map_err(|e| GgrReportError::PdfError(format!("{}: {}", partial.display(), e)))
            .and_then(|_| fs::rename(&partial, path).map_err(GgrReportError::from));
        if let Err(e) = written {
            if partial.exists() {
                if let Err(remove_err) = fs::remove_file(&partial) {
                    warn!("Failed to remove {}: {}", partial.display(), remove_err);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

impl DrawingSurface for PdfCanvas {
    fn page_size(&self) -> (f32, f32) {
        (A4_WIDTH, A4_HEIGHT)
    }

    fn set_font(&mut self, face: FontFace, size: f32) {
        self.face = face;
        self.size = size;
    }

    fn text_width(&self, text: &str) -> f32 {
        let units: u32 = text.chars().map(|c| u32::from(self.face.glyph_width(c))).sum();
        units as f32 * self.size / 1000.0
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str) {
        let ops = &mut self.current.operations;
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![self.face.resource_name().into(), self.size.into()],
        ));
        ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_win_ansi(text))],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    fn draw_image(&mut self, path: &Path, x: f32, y: f32, width: f32, height: f32) -> Result<()> {
        let image = image::open(path)
            .map_err(|e| GgrReportError::ImageError(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let (pixels_wide, pixels_high) = image.dimensions();
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(pixels_wide),
                "Height" => i64::from(pixels_high),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
            },
            image.into_raw(),
        );
        let image_id = self.doc.add_object(stream);
        self.image_count += 1;
        let name = format!("Im{}", self.image_count);

        let ops = &mut self.current.operations;
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                width.into(),
                Object::Integer(0),
                Object::Integer(0),
                height.into(),
                x.into(),
                y.into(),
            ],
        ));
        ops.push(Operation::new(
            "Do",
            vec![Object::Name(name.as_bytes().to_vec())],
        ));
        ops.push(Operation::new("Q", vec![]));
        self.current.images.push((name, image_id));
        Ok(())
    }

    fn new_page(&mut self) -> Result<()> {
        self.flush_page()
    }
}
