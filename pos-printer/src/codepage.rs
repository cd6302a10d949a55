//! Code page table and text encoding for thermal printers
//!
//! Each brand family is driven with a single-byte code page selected by
//! `ESC t n`. This module maps brands to code pages and encodes UTF-8 text
//! into the selected page. Characters the page cannot represent are
//! replaced with `?` so a job always produces output.

use tracing::debug;

use crate::profile::Brand;

/// Placeholder for characters the code page cannot represent
pub const PLACEHOLDER: u8 = b'?';

/// Single-byte character table understood by ESC/POS printers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodePage {
    /// PC437 (USA, Standard Europe)
    Pc437,
    /// PC850 (Multilingual)
    Pc850,
    /// PC858 (PC850 with the Euro sign at 0xD5)
    Pc858,
    /// Windows-1252 (Latin 1)
    Wpc1252,
}

impl CodePage {
    /// `n` for the `ESC t n` command (Epson table numbering)
    pub fn selector(&self) -> u8 {
        match self {
            CodePage::Pc437 => 0,
            CodePage::Pc850 => 2,
            CodePage::Pc858 => 19,
            CodePage::Wpc1252 => 16,
        }
    }

    /// Encode text into this code page
    pub fn encode(&self, text: &str) -> Encoded {
        let mut bytes = Vec::with_capacity(text.len());
        let mut fallbacks = 0;

        for c in text.chars() {
            match self.encode_char(c) {
                Some(b) => bytes.push(b),
                None => {
                    bytes.push(PLACEHOLDER);
                    fallbacks += 1;
                }
            }
        }

        if fallbacks > 0 {
            debug!(code_page = ?self, fallbacks, "characters replaced with placeholder");
        }

        Encoded { bytes, fallbacks }
    }

    /// Encode a single character, `None` when not representable
    pub fn encode_char(&self, c: char) -> Option<u8> {
        if c.is_ascii() {
            return Some(c as u8);
        }
        match self {
            CodePage::Pc437 => lookup(&PC437_HIGH, c),
            CodePage::Pc850 => lookup(&PC850_HIGH, c),
            CodePage::Pc858 => {
                if c == '€' {
                    Some(0xD5)
                } else if c == 'ı' {
                    // 0xD5 is the Euro sign in PC858
                    None
                } else {
                    lookup(&PC850_HIGH, c)
                }
            }
            CodePage::Wpc1252 => {
                let mut buf = [0u8; 4];
                let (cow, _, had_errors) = encoding_rs::WINDOWS_1252.encode(c.encode_utf8(&mut buf));
                if had_errors || cow.len() != 1 {
                    None
                } else {
                    Some(cow[0])
                }
            }
        }
    }
}

/// Result of encoding text into a code page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Number of characters replaced with [`PLACEHOLDER`]
    pub fallbacks: usize,
}

/// Code page used for a brand
///
/// Unrecognised printers get the generic entry (PC858).
pub fn code_page_for(brand: Brand) -> CodePage {
    match brand {
        Brand::Epson => CodePage::Pc858,
        Brand::Star => CodePage::Wpc1252,
        Brand::Citizen => CodePage::Pc850,
        Brand::Generic => CodePage::Pc858,
    }
}

fn lookup(table: &[char; 128], c: char) -> Option<u8> {
    table
        .iter()
        .position(|&t| t == c)
        .map(|idx| 0x80 + idx as u8)
}

/// PC850 bytes 0x80..=0xFF
const PC850_HIGH: [char; 128] = [
    // 0x80
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    // 0x90
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', 'ø', '£', 'Ø', '×', 'ƒ',
    // 0xA0
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '®', '¬', '½', '¼', '¡', '«', '»',
    // 0xB0
    '░', '▒', '▓', '│', '┤', 'Á', 'Â', 'À', '©', '╣', '║', '╗', '╝', '¢', '¥', '┐',
    // 0xC0
    '└', '┴', '┬', '├', '─', '┼', 'ã', 'Ã', '╚', '╔', '╩', '╦', '╠', '═', '╬', '¤',
    // 0xD0
    'ð', 'Ð', 'Ê', 'Ë', 'È', 'ı', 'Í', 'Î', 'Ï', '┘', '┌', '█', '▄', '¦', 'Ì', '▀',
    // 0xE0
    'Ó', 'ß', 'Ô', 'Ò', 'õ', 'Õ', 'µ', 'þ', 'Þ', 'Ú', 'Û', 'Ù', 'ý', 'Ý', '¯', '´',
    // 0xF0
    '\u{AD}', '±', '‗', '¾', '¶', '§', '÷', '¸', '°', '¨', '·', '¹', '³', '²', '■', '\u{A0}',
];

/// PC437 bytes 0x80..=0xFF
const PC437_HIGH: [char; 128] = [
    // 0x80
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    // 0x90
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    // 0xA0
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    // 0xB0
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    // 0xC0
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    // 0xD0
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    // 0xE0
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    // 0xF0
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{A0}',
];
