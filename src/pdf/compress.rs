//! Size-oriented re-serialization of finished PDFs
//!
//! Only the encoding changes: streams are deflated, unreachable objects are
//! dropped and ids renumbered. Page content is never rewritten.

use std::io::Write;
use std::str::FromStr;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Document, Object, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

/// Density/speed trade-off for [`compress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionProfile {
    /// Fast deflate of uncompressed streams only
    Low,
    /// Default deflate plus unused-object pruning
    #[default]
    Medium,
    /// Best deflate, also re-deflates existing Flate streams
    High,
}

impl CompressionProfile {
    pub fn flate_level(self) -> u32 {
        match self {
            CompressionProfile::Low => 1,
            CompressionProfile::Medium => 6,
            CompressionProfile::High => 9,
        }
    }

    fn prunes(self) -> bool {
        self != CompressionProfile::Low
    }
}

impl FromStr for CompressionProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(CompressionProfile::Low),
            "medium" => Ok(CompressionProfile::Medium),
            "high" => Ok(CompressionProfile::High),
            other => Err(Error::General(format!("Unknown compression profile: {}", other))),
        }
    }
}

/// Re-encode `buffer` under `profile`.
///
/// Never fails: when re-encoding errors or does not shrink the payload the
/// input bytes come back unchanged, so repeated calls never grow a buffer.
pub fn compress(buffer: &ByteBuffer, profile: CompressionProfile) -> ByteBuffer {
    let before = buffer.len();
    match reencode(buffer, profile) {
        Ok(out) if out.len() < before => {
            info!(
                "Compressed ({:?}): {} -> {} bytes ({:.1}%)",
                profile,
                before,
                out.len(),
                100.0 * out.len() as f64 / before.max(1) as f64
            );
            out
        }
        Ok(out) => {
            info!(
                "Compression ({:?}) gave {} bytes, keeping original {} bytes",
                profile,
                out.len(),
                before
            );
            buffer.clone()
        }
        Err(err) => {
            warn!("Compression ({:?}) failed, keeping original: {}", profile, err);
            buffer.clone()
        }
    }
}

fn reencode(buffer: &ByteBuffer, profile: CompressionProfile) -> Result<ByteBuffer> {
    let mut doc = Document::load_mem(buffer.as_bytes())?;

    if profile.prunes() {
        let pruned = doc.prune_objects();
        doc.delete_zero_length_streams();
        doc.renumber_objects();
        debug!("Pruned {} unreachable objects", pruned.len());
    }

    let level = profile.flate_level();
    let mut deflated = 0usize;
    for object in doc.objects.values_mut() {
        if let Object::Stream(stream) = object {
            if deflate_stream(stream, level, profile == CompressionProfile::High)? {
                deflated += 1;
            }
        }
    }
    debug!("Deflated {} streams at level {}", deflated, level);

    ByteBuffer::from_document(&mut doc)
}

/// Deflate one stream in place; returns whether it was rewritten
fn deflate_stream(stream: &mut Stream, level: u32, redeflate: bool) -> Result<bool> {
    if !stream.allows_compression {
        return Ok(false);
    }

    let raw = match stream.dict.get(b"Filter") {
        Err(_) => stream.content.clone(),
        Ok(Object::Name(filter)) if redeflate && filter.as_slice() == b"FlateDecode" => {
            if stream.dict.has(b"DecodeParms") {
                return Ok(false);
            }
            match stream.decompressed_content() {
                Ok(content) => content,
                Err(_) => return Ok(false),
            }
        }
        Ok(_) => return Ok(false),
    };

    let packed = deflate(&raw, level)?;
    if packed.len() >= stream.content.len() {
        return Ok(false);
    }
    stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    stream.set_content(packed);
    Ok(true)
}

fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{page_texts, sample_document, sample_pdf};
    use lopdf::{Dictionary, Object};

    fn bulky_pdf() -> ByteBuffer {
        let mut doc = sample_document(2, "Bulk", (595, 842));
        let page_id = *doc.get_pages().values().next().unwrap();
        let filler = "BT /F1 12 Tf 72 72 Td (Lorem ipsum dolor sit amet) Tj ET\n".repeat(400);
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), filler.into_bytes()));
        let page = doc.get_object_mut(page_id).unwrap().as_dict_mut().unwrap();
        let existing = page.get(b"Contents").unwrap().clone();
        page.set("Contents", Object::Array(vec![existing, Object::Reference(stream_id)]));
        ByteBuffer::from_document(&mut doc).unwrap()
    }

    #[test]
    fn test_profiles_shrink_bulky_document() {
        let input = bulky_pdf();
        use CompressionProfile::*;
        for profile in [Low, Medium, High] {
            let out = compress(&input, profile);
            assert!(out.len() < input.len(), "{:?} did not shrink", profile);
        }
    }

    #[test]
    fn test_compression_keeps_content() {
        let input = bulky_pdf();
        let before = page_texts(&Document::load_mem(input.as_bytes()).unwrap());
        let out = compress(&input, CompressionProfile::High);
        let after = page_texts(&Document::load_mem(out.as_bytes()).unwrap());
        assert_eq!(before, after);
    }

    #[test]
    fn test_repeated_high_compression_never_grows() {
        let first = compress(&sample_pdf(3, "Again"), CompressionProfile::High);
        let second = compress(&first, CompressionProfile::High);
        assert!(second.len() <= first.len());
    }

    #[test]
    fn test_garbage_is_returned_unchanged() {
        let input = ByteBuffer::new(b"definitely not a pdf".to_vec());
        assert_eq!(compress(&input, CompressionProfile::Medium), input);
    }

    #[test]
    fn test_parse_profile() {
        assert_eq!("HIGH".parse::<CompressionProfile>().unwrap(), CompressionProfile::High);
        assert!("extreme".parse::<CompressionProfile>().is_err());
    }
}
