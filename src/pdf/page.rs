//! Page-level helpers: geometry, inherited attributes, resources and contents

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};

/// Attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Pages trees deeper than this are treated as cyclic
const MAX_TREE_DEPTH: usize = 64;

/// Visible page rectangle in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl PageBox {
    pub fn width(&self) -> f32 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f32 {
        self.ury - self.lly
    }
}

/// Follow indirect references until a direct object is reached
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id)?,
            _ => return Ok(current),
        }
    }
    Err(Error::General("Reference chain too long".to_string()))
}

/// Numeric value of an Integer or Real object
pub fn as_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Look up `key` on the page or, failing that, on its nearest ancestor
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_object(node_id).ok()?.as_dict().ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        node_id = node.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Copy inherited attributes onto the page itself so it survives leaving its tree
pub fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let mut inherited = Vec::new();
    for key in INHERITABLE {
        let on_page = doc.get_object(page_id)?.as_dict()?.has(key);
        if !on_page {
            if let Some(value) = inherited_attribute(doc, page_id, key) {
                inherited.push((key, value));
            }
        }
    }
    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    for (key, value) in inherited {
        page.set(key.to_vec(), value);
    }
    Ok(())
}

/// The page's CropBox, or its MediaBox when no CropBox is set
pub fn page_box(doc: &Document, page_id: ObjectId) -> Result<PageBox> {
    let object = inherited_attribute(doc, page_id, b"CropBox")
        .or_else(|| inherited_attribute(doc, page_id, b"MediaBox"))
        .ok_or_else(|| Error::General(format!("Page {:?} has no MediaBox", page_id)))?;
    let values: Vec<f32> = resolve(doc, &object)?
        .as_array()?
        .iter()
        .map(|v| resolve(doc, v).ok().and_then(as_number))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| Error::General("MediaBox holds non-numeric values".to_string()))?;
    if values.len() != 4 {
        return Err(Error::General(format!("MediaBox has {} entries", values.len())));
    }
    // Boxes may list their corners in any order
    Ok(PageBox {
        llx: values[0].min(values[2]),
        lly: values[1].min(values[3]),
        urx: values[0].max(values[2]),
        ury: values[1].max(values[3]),
    })
}

/// Register `object_id` under a fresh name in the page's `category` resources
/// (`Font`, `ExtGState`, `XObject`) and return that name.
///
/// The page gets its own direct Resources dictionary so shared or inherited
/// resources of other pages are left untouched.
pub fn add_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    prefix: &str,
    object_id: ObjectId,
) -> Result<String> {
    let mut resources = match inherited_attribute(doc, page_id, b"Resources") {
        Some(res) => resolve(doc, &res)?.as_dict()?.clone(),
        None => Dictionary::new(),
    };

    let mut entries = match resources.get(category) {
        Ok(sub) => resolve(doc, sub)?.as_dict()?.clone(),
        Err(_) => Dictionary::new(),
    };

    let name = (1..)
        .map(|n| format!("{}{}", prefix, n))
        .find(|candidate| !entries.has(candidate.as_bytes()))
        .unwrap_or_else(|| prefix.to_string());

    entries.set(name.as_bytes().to_vec(), Object::Reference(object_id));
    resources.set(category.to_vec(), Object::Dictionary(entries));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Content stream references of a page, in drawing order
pub fn content_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page = doc.get_object(page_id)?.as_dict()?;
    Ok(match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(other) => vec![other.clone()],
        Err(_) => Vec::new(),
    })
}

/// Draw `content` over the page. The existing contents are wrapped in
/// `q`/`Q` first so a transformation they leave behind does not leak into
/// the overlay.
pub fn overlay_content(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> Result<()> {
    let existing = content_refs(doc, page_id)?;

    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let mut contents = Vec::with_capacity(existing.len() + 3);
    contents.push(Object::Reference(save_id));
    contents.extend(existing);
    contents.push(Object::Reference(restore_id));
    contents.push(Object::Reference(overlay_id));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_document;

    #[test]
    fn test_page_box_is_inherited_from_tree() {
        let doc = sample_document(2, "Box", (595, 842));
        for page_id in doc.get_pages().values() {
            let page = page_box(&doc, *page_id).unwrap();
            assert_eq!(page.width(), 595.0);
            assert_eq!(page.height(), 842.0);
        }
    }

    #[test]
    fn test_flatten_copies_media_box_and_resources() {
        let mut doc = sample_document(1, "Flat", (612, 792));
        let page_id = *doc.get_pages().values().next().unwrap();
        assert!(!doc.get_object(page_id).unwrap().as_dict().unwrap().has(b"MediaBox"));

        flatten_inherited(&mut doc, page_id).unwrap();

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }

    #[test]
    fn test_add_page_resource_picks_unused_name() {
        let mut doc = sample_document(1, "Res", (612, 792));
        let page_id = *doc.get_pages().values().next().unwrap();
        let font_id = doc.add_object(Dictionary::new());

        let first = add_page_resource(&mut doc, page_id, b"Font", "F", font_id).unwrap();
        let second = add_page_resource(&mut doc, page_id, b"Font", "F", font_id).unwrap();

        // The fixture already uses F1 for its own font
        assert_eq!(first, "F2");
        assert_eq!(second, "F3");
    }

    #[test]
    fn test_overlay_wraps_existing_content() {
        let mut doc = sample_document(1, "Wrap", (612, 792));
        let page_id = *doc.get_pages().values().next().unwrap();
        let before = content_refs(&doc, page_id).unwrap().len();

        overlay_content(&mut doc, page_id, b"0 g".to_vec()).unwrap();

        assert_eq!(content_refs(&doc, page_id).unwrap().len(), before + 3);
        let content = doc.get_page_content(page_id).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.starts_with("q\n"));
        assert!(text.trim_end().ends_with("0 g"));
    }
}
