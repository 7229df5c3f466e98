//! PDF merging with a bookmark per named source

use std::collections::BTreeMap;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::annotate::{AnnotationEngine, PageNumberSpec};
use super::metadata::{text_string, DocumentMetadata};
use super::page::flatten_inherited;
use super::toolkit::PdfToolkit;
use crate::buffer::{ByteBuffer, PdfInput};
use crate::error::{Error, Result};

/// One merge input
#[derive(Debug)]
pub struct MergeSource {
    pub input: PdfInput,
    /// Bookmark title for the first page of this source
    pub display_name: Option<String>,
}

impl MergeSource {
    pub fn new(input: impl Into<PdfInput>) -> Self {
        Self {
            input: input.into(),
            display_name: None,
        }
    }

    pub fn named(input: impl Into<PdfInput>, name: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            display_name: Some(name.into()),
        }
    }
}

/// Options for merging PDFs
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Stamp page numbers on the merged document before serializing
    pub add_page_numbers: bool,
    pub page_numbers: PageNumberSpec,
    pub metadata: DocumentMetadata,
}

/// Outline entry pointing at the first page a source contributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub title: String,
    /// Zero-based index into the merged document
    pub page_index: usize,
}

#[derive(Debug)]
pub struct MergeOutput {
    pub buffer: ByteBuffer,
    pub page_count: usize,
    pub bookmarks: Vec<Bookmark>,
    /// Indices of sources that were skipped
    pub skipped: Vec<usize>,
}

pub struct MergeEngine {
    toolkit: Arc<PdfToolkit>,
}

impl MergeEngine {
    pub fn new(toolkit: Arc<PdfToolkit>) -> Self {
        Self { toolkit }
    }

    /// Merge `sources` into one document, in order.
    ///
    /// A source that cannot be decoded, or has no pages, is logged and
    /// skipped. Based on the lopdf merge example:
    /// https://github.com/J-F-Liu/lopdf/blob/main/examples/merge.rs
    pub fn merge_pdfs(
        &self,
        sources: Vec<MergeSource>,
        options: &MergeOptions,
    ) -> Result<MergeOutput> {
        let source_count = sources.len();
        let mut max_id = 1;
        let mut page_ids: Vec<ObjectId> = Vec::new();
        let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
        let mut bookmarks: Vec<(String, ObjectId, usize)> = Vec::new();
        let mut skipped = Vec::new();

        for (index, source) in sources.into_iter().enumerate() {
            let mut doc = match source.input.normalize() {
                Ok(doc) => doc,
                Err(err) => {
                    let err = Error::SourceDecode {
                        index,
                        reason: err.to_string(),
                    };
                    warn!("Skipping merge source: {}", err);
                    skipped.push(index);
                    continue;
                }
            };

            // Renumber objects in this document to avoid conflicts
            doc.renumber_objects_with(max_id);
            max_id = doc.max_id + 1;

            let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
            if pages.is_empty() {
                warn!("Skipping merge source #{}: it has no pages", index);
                skipped.push(index);
                continue;
            }

            // Pages leave their tree, so they must carry what they inherited
            if let Err(err) = pages
                .iter()
                .try_for_each(|&page_id| flatten_inherited(&mut doc, page_id))
            {
                warn!("Skipping merge source #{}: broken page tree: {}", index, err);
                skipped.push(index);
                continue;
            }

            if let Some(title) = source.display_name {
                bookmarks.push((title, pages[0], page_ids.len()));
            }
            debug!("Source #{}: {} pages at offset {}", index, pages.len(), page_ids.len());
            page_ids.extend(pages);

            // The source's own tree and outline are rebuilt below
            objects.extend(doc.objects.into_iter().filter(|(_, object)| {
                !matches!(
                    dictionary_type(object),
                    Some(b"Catalog") | Some(b"Pages") | Some(b"Outlines")
                )
            }));
        }

        if page_ids.is_empty() {
            return Err(Error::EmptyMerge);
        }

        let mut merged = Document::with_version("1.5");
        merged.objects.extend(objects);
        // new_object_id() must start past every copied object
        merged.max_id = max_id - 1;

        let pages_id = merged.new_object_id();
        let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
        let pages_object = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(page_ids.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]);
        merged.objects.insert(pages_id, Object::Dictionary(pages_object));

        for &page_id in &page_ids {
            if let Ok(Object::Dictionary(dict)) = merged.get_object_mut(page_id) {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }

        let mut catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        if let Some(outlines_id) = build_outline(&mut merged, &bookmarks) {
            catalog.set("Outlines", Object::Reference(outlines_id));
            catalog.set("PageMode", Object::Name(b"UseOutlines".to_vec()));
        }
        let catalog_id = merged.add_object(catalog);
        merged.trailer.set("Root", Object::Reference(catalog_id));

        options.metadata.apply(&mut merged)?;
        merged.prune_objects();

        if options.add_page_numbers {
            AnnotationEngine::new(self.toolkit.clone())
                .add_page_numbers(&mut merged, &options.page_numbers)?;
        }

        let buffer = self.toolkit.save(&mut merged)?;
        let page_count = page_ids.len();
        info!(
            "Merged {} of {} sources: {} pages, {} bookmarks, {} bytes",
            source_count - skipped.len(),
            source_count,
            page_count,
            bookmarks.len(),
            buffer.len()
        );

        Ok(MergeOutput {
            buffer,
            page_count,
            bookmarks: bookmarks
                .into_iter()
                .map(|(title, _, page_index)| Bookmark { title, page_index })
                .collect(),
            skipped,
        })
    }
}

/// The `/Type` name of a dictionary or stream object
fn dictionary_type(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").ok()?.as_name().ok()
}

/// Flat outline with one `/Fit` destination per entry
fn build_outline(doc: &mut Document, entries: &[(String, ObjectId, usize)]) -> Option<ObjectId> {
    if entries.is_empty() {
        return None;
    }
    let outlines_id = doc.new_object_id();
    let item_ids: Vec<ObjectId> = entries.iter().map(|_| doc.new_object_id()).collect();

    for (i, (title, page_id, _)) in entries.iter().enumerate() {
        let mut item = Dictionary::from_iter(vec![
            ("Title", text_string(title)),
            ("Parent", Object::Reference(outlines_id)),
            (
                "Dest",
                Object::Array(vec![Object::Reference(*page_id), Object::Name(b"Fit".to_vec())]),
            ),
        ]);
        if i > 0 {
            item.set("Prev", Object::Reference(item_ids[i - 1]));
        }
        if let Some(next) = item_ids.get(i + 1) {
            item.set("Next", Object::Reference(*next));
        }
        doc.objects.insert(item_ids[i], Object::Dictionary(item));
    }

    let outlines = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Outlines".to_vec())),
        ("First", Object::Reference(item_ids[0])),
        ("Last", Object::Reference(item_ids[item_ids.len() - 1])),
        ("Count", Object::Integer(item_ids.len() as i64)),
    ]);
    doc.objects.insert(outlines_id, Object::Dictionary(outlines));
    Some(outlines_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::metadata::inspect;
    use crate::testing::{page_texts, sample_document, sample_pdf};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    fn engine() -> MergeEngine {
        MergeEngine::new(Arc::new(PdfToolkit::default()))
    }

    #[test]
    fn test_merge_accepts_every_input_shape() {
        let encoded = format!(
            "data:application/pdf;base64,{}",
            STANDARD.encode(sample_pdf(2, "B64").as_bytes())
        );
        let sources = vec![
            MergeSource::new(sample_pdf(1, "Raw")),
            MergeSource::new(PdfInput::Base64(encoded)),
            MergeSource::new(sample_document(3, "Parsed", (612, 792))),
        ];
        let output = engine().merge_pdfs(sources, &MergeOptions::default()).unwrap();
        assert_eq!(output.page_count, 6);
        assert!(output.skipped.is_empty());
    }

    #[test]
    fn test_page_order_follows_source_order() {
        let sources = vec![
            MergeSource::new(sample_pdf(2, "A")),
            MergeSource::new(sample_pdf(1, "B")),
        ];
        let output = engine().merge_pdfs(sources, &MergeOptions::default()).unwrap();
        let doc = Document::load_mem(output.buffer.as_bytes()).unwrap();
        let firsts: Vec<String> = page_texts(&doc).into_iter().map(|p| p[0].clone()).collect();
        assert_eq!(firsts, vec!["A page 1", "A page 2", "B page 1"]);
    }

    #[test]
    fn test_bookmarks_written_to_outline() {
        let sources = vec![
            MergeSource::named(sample_pdf(2, "CV"), "CV"),
            MergeSource::new(sample_pdf(1, "Brief")),
            MergeSource::named(sample_pdf(3, "Zeugnis"), "Zeugnis"),
        ];
        let output = engine().merge_pdfs(sources, &MergeOptions::default()).unwrap();
        let info = inspect(&output.buffer).unwrap();
        assert_eq!(info.bookmarks, output.bookmarks);
        assert_eq!(info.bookmarks[1].page_index, 3);
    }

    #[test]
    fn test_duplicate_titles_are_kept() {
        let sources = vec![
            MergeSource::named(sample_pdf(1, "A"), "Anlage"),
            MergeSource::named(sample_pdf(1, "B"), "Anlage"),
        ];
        let output = engine().merge_pdfs(sources, &MergeOptions::default()).unwrap();
        assert_eq!(output.bookmarks.len(), 2);
        assert_eq!(output.bookmarks[1].page_index, 1);
    }

    #[test]
    fn test_mixed_page_sizes_keep_their_boxes() {
        let sources = vec![
            MergeSource::new(sample_document(1, "A4", (595, 842))),
            MergeSource::new(sample_document(1, "Letter", (612, 792))),
        ];
        let output = engine().merge_pdfs(sources, &MergeOptions::default()).unwrap();
        let doc = Document::load_mem(output.buffer.as_bytes()).unwrap();
        let widths: Vec<f32> = doc
            .get_pages()
            .values()
            .map(|&id| crate::pdf::page::page_box(&doc, id).unwrap().width())
            .collect();
        assert_eq!(widths, vec![595.0, 612.0]);
    }

    #[test]
    fn test_nothing_to_merge() {
        let result = engine().merge_pdfs(Vec::new(), &MergeOptions::default());
        assert!(matches!(result, Err(Error::EmptyMerge)));

        let sources = vec![MergeSource::new(b"junk".to_vec())];
        let result = engine().merge_pdfs(sources, &MergeOptions::default());
        assert!(matches!(result, Err(Error::EmptyMerge)));
    }

    #[test]
    fn test_merge_with_page_numbers_and_metadata() {
        let options = MergeOptions {
            add_page_numbers: true,
            metadata: DocumentMetadata {
                title: Some("Bewerbung".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let sources = vec![
            MergeSource::new(sample_pdf(1, "A")),
            MergeSource::new(sample_pdf(1, "B")),
        ];
        let output = engine().merge_pdfs(sources, &options).unwrap();
        let doc = Document::load_mem(output.buffer.as_bytes()).unwrap();
        let texts = page_texts(&doc);
        assert_eq!(texts[1].last().unwrap(), "Seite 2 von 2");
        assert_eq!(inspect(&output.buffer).unwrap().title.as_deref(), Some("Bewerbung"));
    }
}
