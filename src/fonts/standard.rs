//! Metrics for the standard 14 fonts we draw with
//!
//! Widths are in 1/1000ths of the em square, taken from the Adobe AFM files.

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::encoding::decode_char;
use super::{FontMetrics, FontStyle};

/// A standard Type1 font every PDF reader ships
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

impl StandardFont {
    pub fn helvetica(style: FontStyle) -> Self {
        match style {
            FontStyle::Normal => StandardFont::Helvetica,
            FontStyle::Bold => StandardFont::HelveticaBold,
            FontStyle::Italic => StandardFont::HelveticaOblique,
            FontStyle::BoldItalic => StandardFont::HelveticaBoldOblique,
        }
    }

    pub fn courier(style: FontStyle) -> Self {
        match style {
            FontStyle::Normal => StandardFont::Courier,
            FontStyle::Bold => StandardFont::CourierBold,
            FontStyle::Italic => StandardFont::CourierOblique,
            FontStyle::BoldItalic => StandardFont::CourierBoldOblique,
        }
    }

    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    fn is_bold(self) -> bool {
        matches!(
            self,
            StandardFont::HelveticaBold
                | StandardFont::HelveticaBoldOblique
                | StandardFont::CourierBold
                | StandardFont::CourierBoldOblique
        )
    }

    fn is_courier(self) -> bool {
        matches!(
            self,
            StandardFont::Courier
                | StandardFont::CourierBold
                | StandardFont::CourierOblique
                | StandardFont::CourierBoldOblique
        )
    }

    /// Add a Type1 font dictionary with WinAnsiEncoding
    pub fn embed(self, doc: &mut Document) -> ObjectId {
        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(self.base_font().as_bytes().to_vec()));
        font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
        doc.add_object(Object::Dictionary(font))
    }
}

impl FontMetrics for StandardFont {
    fn code_width(&self, code: u8) -> u16 {
        if self.is_courier() {
            return 600;
        }
        let ascii = if self.is_bold() { &HELVETICA_BOLD } else { &HELVETICA };
        if (32..=126).contains(&code) {
            return ascii[(code - 32) as usize];
        }
        let fallback = ascii[(b'n' - 32) as usize];
        let Some(c) = decode_char(code) else {
            return fallback;
        };
        if let Some(base) = fold_accent(c) {
            return ascii[(base as u8 - 32) as usize];
        }
        special_width(c, self.is_bold()).unwrap_or(fallback)
    }
}

/// Latin-1 letters measured as their unaccented base letter
fn fold_accent(c: char) -> Option<char> {
    let base = match c {
        'À'..='Å' => 'A',
        'Ç' => 'C',
        'È'..='Ë' => 'E',
        'Ì'..='Ï' => 'I',
        'Ñ' => 'N',
        'Ò'..='Ö' | 'Ø' => 'O',
        'Ù'..='Ü' => 'U',
        'Ý' | 'Ÿ' => 'Y',
        'Š' => 'S',
        'Ž' => 'Z',
        'à'..='å' => 'a',
        'ç' => 'c',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ñ' => 'n',
        'ò'..='ö' | 'ø' => 'o',
        'ù'..='ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'š' => 's',
        'ž' => 'z',
        '\u{a0}' => ' ',
        _ => return None,
    };
    Some(base)
}

fn special_width(c: char, bold: bool) -> Option<u16> {
    let width = match c {
        '€' | 'ƒ' | '†' | '‡' | '–' | '¢' | '£' | '¤' | '¥' | '§' | '«' | '»' => 556,
        '…' | '‰' | 'Œ' | '—' | '™' | 'Æ' => 1000,
        'ˆ' | '˜' | '‹' | '›' | '¨' | '¯' | '´' | '¸' | '²' | '³' | '¹' | '\u{ad}' => 333,
        '•' => 350,
        '©' | '®' => 737,
        '°' => 400,
        '¬' | '±' | '×' | '÷' => 584,
        '·' => 278,
        '¼' | '½' | '¾' => 834,
        'Ð' => 722,
        'Þ' => 667,
        'ß' | '¿' => 611,
        'œ' => 944,
        'æ' => 889,
        'ª' => 370,
        'º' => 365,
        '¡' => 333,
        '‚' | '‘' | '’' => if bold { 278 } else { 222 },
        '„' | '“' | '”' => if bold { 500 } else { 333 },
        '¦' => if bold { 280 } else { 260 },
        '¶' => if bold { 556 } else { 537 },
        'µ' | 'ð' | 'þ' => if bold { 611 } else { 556 },
        _ => return None,
    };
    Some(width)
}

/// Helvetica widths for codes 32..=126
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, // space ! " # $ % & '
    333, 333, 389, 584, 278, 333, 278, 278, // ( ) * + , - . /
    556, 556, 556, 556, 556, 556, 556, 556, // 0-7
    556, 556, 278, 278, 584, 584, 584, 556, // 8 9 : ; < = > ?
    1015, 667, 667, 722, 722, 667, 611, 778, // @ A-G
    722, 278, 500, 667, 556, 833, 722, 778, // H-O
    667, 778, 722, 667, 611, 722, 667, 944, // P-W
    667, 667, 611, 278, 278, 278, 469, 556, // X Y Z [ \ ] ^ _
    333, 556, 556, 500, 556, 556, 278, 556, // ` a-g
    556, 222, 222, 500, 222, 833, 556, 556, // h-o
    556, 556, 333, 500, 278, 556, 500, 722, // p-w
    500, 500, 500, 334, 260, 334, 584,      // x y z { | } ~
];

/// Helvetica-Bold widths for codes 32..=126
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, // space ! " # $ % & '
    333, 333, 389, 584, 278, 333, 278, 278, // ( ) * + , - . /
    556, 556, 556, 556, 556, 556, 556, 556, // 0-7
    556, 556, 333, 333, 584, 584, 584, 611, // 8 9 : ; < = > ?
    975, 722, 722, 722, 722, 667, 611, 778, // @ A-G
    722, 278, 556, 722, 611, 833, 722, 778, // H-O
    667, 778, 722, 667, 611, 722, 667, 944, // P-W
    667, 667, 611, 333, 278, 333, 584, 556, // X Y Z [ \ ] ^ _
    333, 556, 611, 556, 611, 556, 333, 611, // ` a-g
    611, 278, 278, 556, 278, 889, 611, 611, // h-o
    611, 611, 389, 556, 333, 611, 556, 778, // p-w
    556, 556, 500, 389, 280, 389, 584,      // x y z { | } ~
];
