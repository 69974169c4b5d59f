//! Image-to-PDF assembly with lopdf.
//!
//! Each enhanced page becomes one PDF page holding a single image XObject
//! scaled to cover the media box. Page size follows the image at the
//! configured DPI, so a ×2 upscale of a 150 DPI render is laid out at 300 DPI
//! and keeps the physical page size of the source.
//!
//! Images are embedded losslessly as Flate-compressed 8-bit RGB samples, so
//! the enhanced pixels reach the document unchanged.

use super::DocumentAssembler;
use crate::error::BoxError;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Packs page images into a PDF.
#[derive(Debug, Clone)]
pub struct LopdfAssembler {
    dpi: u32,
}

impl Default for LopdfAssembler {
    fn default() -> Self {
        Self { dpi: 300 }
    }
}

impl LopdfAssembler {
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi: dpi.clamp(36, 1200),
        }
    }

    /// Pixel length → PDF points at the configured DPI, at least 1.
    fn to_points(&self, px: u32) -> i64 {
        ((px as i64 * 72) / self.dpi as i64).max(1)
    }

    fn add_page(
        &self,
        doc: &mut Document,
        pages_id: ObjectId,
        path: &Path,
    ) -> Result<ObjectId, BoxError> {
        let rgb = image::open(path)
            .map_err(|e| format!("cannot read page image '{}': {e}", path.display()))?
            .to_rgb8();
        let (w, h) = rgb.dimensions();

        let mut samples = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
            },
            rgb.into_raw(),
        );
        samples.compress()?;
        let image_id = doc.add_object(samples);

        let (pw, ph) = (self.to_points(w), self.to_points(h));
        let content = format!("q {pw} 0 0 {ph} 0 0 cm /Im0 Do Q");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), pw.into(), ph.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
            "Contents" => content_id,
        });

        debug!("Added {} as {}x{} pt page", path.display(), pw, ph);
        Ok(page_id)
    }
}

impl DocumentAssembler for LopdfAssembler {
    fn assemble(&self, images: &[PathBuf]) -> Result<Vec<u8>, BoxError> {
        if images.is_empty() {
            return Err("cannot assemble a document from an empty image list".into());
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::with_capacity(images.len());
        for path in images {
            kids.push(self.add_page(&mut doc, pages_id, path)?.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => images.len() as i64,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn page(dir: &std::path::Path, i: usize, w: u32, h: u32) -> PathBuf {
        let p = dir.join(format!("page_{i}.png"));
        RgbImage::from_pixel(w, h, Rgb([240, 230, 200])).save(&p).unwrap();
        p
    }

    #[test]
    fn pages_in_order() {
        let tmp = TempDir::new().unwrap();
        let images = vec![page(tmp.path(), 0, 300, 600), page(tmp.path(), 1, 600, 300)];

        let bytes = LopdfAssembler::new(300).assemble(&images).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let first = doc.get_dictionary(pages[&1]).unwrap();
        let media_box = first.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_i64().unwrap(), 72);
        assert_eq!(media_box[3].as_i64().unwrap(), 144);
    }

    #[test]
    fn page_pixels_are_embedded_losslessly() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("page_0.png");
        let mut img = RgbImage::new(64, 64);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 4) as u8, (y * 4) as u8, 7]);
        }
        img.save(&p).unwrap();

        let bytes = LopdfAssembler::default().assemble(&[p]).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let xobject = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .find(|s| {
                s.dict.get(b"Subtype").and_then(|v| v.as_name()).ok() == Some(&b"Image"[..])
            })
            .unwrap();

        assert_eq!(
            xobject.dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"FlateDecode"
        );
        assert_eq!(xobject.decompressed_content().unwrap(), img.into_raw());
    }

    #[test]
    fn empty_list_is_error() {
        assert!(LopdfAssembler::default().assemble(&[]).is_err());
    }

    #[test]
    fn unreadable_image_is_error() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("page_0.png");
        std::fs::write(&bad, b"garbage").unwrap();
        let err = LopdfAssembler::default().assemble(&[bad]).unwrap_err();
        assert!(err.to_string().contains("cannot read page image"), "got: {err}");
    }
}
