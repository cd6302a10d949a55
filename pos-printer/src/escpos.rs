//! ESC/POS command builder and print frames
//!
//! `EscPosBuilder` is a fluent API for raw ESC/POS byte sequences.
//! `Frame` turns a text payload into a complete, deterministic print job:
//! reset, character set, code page, wrapped text, feed and cut.

use tracing::instrument;

use crate::codepage::{CodePage, code_page_for};
use crate::profile::{Brand, PaperWidth};

/// ESC @ - Initialize printer
pub const INIT: [u8; 2] = [0x1B, 0x40];
/// GS V 0 - Full cut
pub const CUT_FULL: [u8; 3] = [0x1D, 0x56, 0x00];
/// GS V 1 - Partial cut
pub const CUT_PARTIAL: [u8; 3] = [0x1D, 0x56, 0x01];

/// `n` for ESC R n sent with every frame
pub const DEFAULT_INTERNATIONAL_CHARSET: u8 = 7;

/// Line feeds appended after the text so the tail clears the cutter
pub const FEED_LINES: usize = 6;

/// Decorative symbols the code pages cannot print, with their replacements.
/// Applied in order.
pub const SYMBOL_SUBSTITUTIONS: [(&str, &str); 7] = [
    ("🚚", ""),
    ("✔️", "OK"),
    ("🧾", ""),
    ("🎯", "*"),
    ("🎊", ""),
    ("━", "-"),
    ("¨", "~"),
];

/// Paper cut style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutMode {
    Full,
    Partial,
}

impl CutMode {
    pub fn command(&self) -> [u8; 3] {
        match self {
            CutMode::Full => CUT_FULL,
            CutMode::Partial => CUT_PARTIAL,
        }
    }
}

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers. Text passed to
/// [`EscPosBuilder::text`] is encoded with the builder's code page.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    code_page: CodePage,
    fallbacks: usize,
}

impl EscPosBuilder {
    /// Create an empty builder that encodes text with `code_page`
    pub fn new(code_page: CodePage) -> Self {
        Self {
            buf: Vec::with_capacity(1024),
            code_page,
            fallbacks: 0,
        }
    }

    // === Setup ===

    /// Initialize printer (ESC @)
    pub fn init(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&INIT);
        self
    }

    /// Select international character set (ESC R n)
    pub fn charset(&mut self, n: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x52, n]);
        self
    }

    /// Select the builder's code page on the printer (ESC t n)
    pub fn select_code_page(&mut self) -> &mut Self {
        self.buf
            .extend_from_slice(&[0x1B, 0x74, self.code_page.selector()]);
        self
    }

    // === Text Output ===

    /// Write text encoded with the builder's code page
    pub fn text(&mut self, s: &str) -> &mut Self {
        let encoded = self.code_page.encode(s);
        self.fallbacks += encoded.fallbacks;
        self.buf.extend_from_slice(&encoded.bytes);
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Write `lines` plain line feeds
    pub fn feed(&mut self, lines: usize) -> &mut Self {
        self.buf.extend(std::iter::repeat_n(b'\n', lines));
        self
    }

    // === Paper Control ===

    /// Cut paper (full cut)
    pub fn cut(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&CUT_FULL);
        self
    }

    /// Partial cut (leave a small connection)
    pub fn cut_partial(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&CUT_PARTIAL);
        self
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Characters replaced with a placeholder so far
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    // === Build ===

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Replace decorative symbols the printer cannot render
pub fn clean_text(text: &str) -> String {
    SYMBOL_SUBSTITUTIONS
        .iter()
        .fold(text.to_string(), |acc, (symbol, replacement)| {
            acc.replace(symbol, replacement)
        })
}

/// Hard-wrap text to `max_chars` characters per line
///
/// Lines are split on `\n`; longer segments are sliced at character
/// boundaries into pieces of exactly `max_chars`, with the remainder on its
/// own line. Nothing is truncated.
pub fn wrap_lines(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for segment in text.split('\n') {
        let chars: Vec<char> = segment.chars().collect();
        if chars.len() <= max_chars {
            lines.push(segment.to_string());
            continue;
        }
        for piece in chars.chunks(max_chars) {
            lines.push(piece.iter().collect());
        }
    }

    lines
}

/// A complete print job
///
/// Immutable once built; identical inputs always produce identical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    code_page: CodePage,
    width: PaperWidth,
    lines: Vec<String>,
    encoded: Vec<Vec<u8>>,
    fallbacks: usize,
}

impl Frame {
    /// Build a frame for a brand's code page
    pub fn build(text: &str, brand: Brand, width: PaperWidth) -> Self {
        Self::with_code_page(text, code_page_for(brand), width)
    }

    /// Build a frame for an explicit code page
    #[instrument(skip(text), fields(len = text.len()))]
    pub fn with_code_page(text: &str, code_page: CodePage, width: PaperWidth) -> Self {
        let cleaned = clean_text(text);
        let lines = wrap_lines(&cleaned, width.chars());

        let mut fallbacks = 0;
        let encoded = lines
            .iter()
            .map(|line| {
                let enc = code_page.encode(line);
                fallbacks += enc.fallbacks;
                enc.bytes
            })
            .collect();

        Self {
            code_page,
            width,
            lines,
            encoded,
            fallbacks,
        }
    }

    /// Wrapped text lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn code_page(&self) -> CodePage {
        self.code_page
    }

    pub fn width(&self) -> PaperWidth {
        self.width
    }

    /// Characters replaced with a placeholder during encoding
    pub fn encoding_fallbacks(&self) -> usize {
        self.fallbacks
    }

    /// Reset, international charset and code page selection
    pub fn header(&self) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.code_page);
        b.init()
            .charset(DEFAULT_INTERNATIONAL_CHARSET)
            .select_code_page();
        b.build()
    }

    /// Everything except the cut command
    pub fn payload(&self) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.code_page);
        b.raw(&self.header());
        self.write_lines(&mut b, &self.encoded);
        b.feed(FEED_LINES);
        b.build()
    }

    /// Full frame: payload followed by a full cut
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = self.payload();
        data.extend_from_slice(&CUT_FULL);
        data
    }

    /// Split the frame into spool jobs of `lines_per_chunk` lines
    ///
    /// The first job carries the header and the last one the feed and cut,
    /// so concatenating all jobs yields [`Frame::to_bytes`].
    pub fn chunks(&self, lines_per_chunk: usize) -> Vec<Vec<u8>> {
        let size = lines_per_chunk.max(1);
        let groups: Vec<&[Vec<u8>]> = self.encoded.chunks(size).collect();
        let last = groups.len().saturating_sub(1);

        groups
            .iter()
            .enumerate()
            .map(|(idx, group)| {
                let mut b = EscPosBuilder::new(self.code_page);
                if idx == 0 {
                    b.raw(&self.header());
                }
                self.write_lines(&mut b, group);
                if idx == last {
                    b.feed(FEED_LINES).cut();
                } else {
                    b.newline();
                }
                b.build()
            })
            .collect()
    }

    /// Write lines separated by `\n`, each re-truncated to the paper width
    fn write_lines(&self, b: &mut EscPosBuilder, lines: &[Vec<u8>]) {
        let max = self.width.chars();
        for (idx, line) in lines.iter().enumerate() {
            if idx > 0 {
                b.newline();
            }
            b.raw(&line[..line.len().min(max)]);
        }
    }
}

/// Render `text` into a ready-to-send ESC/POS byte sequence
pub fn build_frame(text: &str, brand: Brand, width: PaperWidth) -> Vec<u8> {
    Frame::build(text, brand, width).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_scenario() {
        let text = format!("Hello\n{}", "A".repeat(100));
        let lines = wrap_lines(&text, PaperWidth::Mm80.chars());
        assert_eq!(
            lines,
            vec![
                "Hello".to_string(),
                "A".repeat(48),
                "A".repeat(48),
                "A".repeat(4)
            ]
        );
    }

    #[test]
    fn test_wrap_preserves_content() {
        let text = "Kvitto för bord 12 med en väldigt lång rad som måste brytas\n\nSlut";
        for width in [PaperWidth::Mm58, PaperWidth::Mm80] {
            let lines = wrap_lines(text, width.chars());
            assert!(lines.iter().all(|l| l.chars().count() <= width.chars()));
            assert_eq!(lines.concat(), text.replace('\n', ""));
        }
    }

    #[test]
    fn test_wrap_exact_multiple_has_no_empty_tail() {
        let lines = wrap_lines(&"B".repeat(64), 32);
        assert_eq!(lines, vec!["B".repeat(32), "B".repeat(32)]);
    }

    #[test]
    fn test_wrap_keeps_empty_lines() {
        assert_eq!(wrap_lines("a\n\nb", 32), vec!["a", "", "b"]);
        assert_eq!(wrap_lines("", 32), vec![""]);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("🚚 Delivery ✔️"), " Delivery OK");
        assert_eq!(clean_text("🎯 Target 🎊🧾"), "* Target ");
        assert_eq!(clean_text("━━━"), "---");
        assert_eq!(clean_text("a¨b"), "a~b");
    }

    #[test]
    fn test_frame_layout() {
        let data = build_frame("Hej", Brand::Epson, PaperWidth::Mm80);
        let mut expected = vec![0x1B, 0x40, 0x1B, 0x52, 7, 0x1B, 0x74, 19];
        expected.extend_from_slice(b"Hej");
        expected.extend_from_slice(b"\n\n\n\n\n\n");
        expected.extend_from_slice(&[0x1D, 0x56, 0x00]);
        assert_eq!(data, expected);
    }

    #[test]
    fn test_frame_code_page_by_brand() {
        let star = build_frame("x", Brand::Star, PaperWidth::Mm58);
        assert_eq!(&star[5..8], &[0x1B, 0x74, 16]);
        let citizen = build_frame("x", Brand::Citizen, PaperWidth::Mm58);
        assert_eq!(&citizen[5..8], &[0x1B, 0x74, 2]);
    }

    #[test]
    fn test_frame_deterministic() {
        let text = "Order #42\nåäö €5\n🍕 Pizza";
        let a = build_frame(text, Brand::Generic, PaperWidth::Mm58);
        let b = build_frame(text, Brand::Generic, PaperWidth::Mm58);
        assert_eq!(a, b);
    }

    #[test]
    fn test_frame_placeholder_for_emoji() {
        let frame = Frame::build("🍕 Pizza", Brand::Generic, PaperWidth::Mm80);
        assert_eq!(frame.encoding_fallbacks(), 1);
        let data = frame.to_bytes();
        assert!(data.windows(7).any(|w| w == b"? Pizza"));
    }

    #[test]
    fn test_frame_lines_within_width() {
        let frame = Frame::build(&"ö".repeat(70), Brand::Epson, PaperWidth::Mm58);
        assert_eq!(frame.lines().len(), 3);
        let body = &frame.payload()[frame.header().len()..];
        for line in body.split(|&b| b == b'\n') {
            assert!(line.len() <= 32);
        }
    }

    #[test]
    fn test_chunks_concatenate_to_frame() {
        let text = (1..=13)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let frame = Frame::build(&text, Brand::Generic, PaperWidth::Mm80);
        let chunks = frame.chunks(6);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), frame.to_bytes());
        assert!(chunks[0].starts_with(&INIT));
        assert!(chunks[2].ends_with(&CUT_FULL));
        assert!(!chunks[1].ends_with(&CUT_FULL));
    }

    #[test]
    fn test_builder_partial_cut() {
        let mut b = EscPosBuilder::new(CodePage::Pc858);
        b.line("x").cut_partial();
        assert_eq!(b.build(), vec![b'x', b'\n', 0x1D, 0x56, 0x01]);
    }
}
