use pos_printer::{
    Brand, BrandDescriptor, PaperWidth, Receipt, ReceiptLine, build_frame, select_driver,
    wrap_lines,
};

const HEADER_STAR: [u8; 8] = [0x1B, 0x40, 0x1B, 0x52, 0x07, 0x1B, 0x74, 16];

#[test]
fn test_hello_frame_bytes() {
    let bytes = build_frame("Hello\nWorld", Brand::Star, PaperWidth::Mm58);

    let mut expected = HEADER_STAR.to_vec();
    expected.extend_from_slice(b"Hello\nWorld");
    expected.extend_from_slice(&[b'\n'; 6]);
    expected.extend_from_slice(&[0x1D, 0x56, 0x00]);
    assert_eq!(bytes, expected);
}

#[test]
fn test_frame_is_deterministic() {
    let text = "Caf\u{e9} con leche  2,50\u{20ac}\nTotal";
    for brand in [Brand::Star, Brand::Epson, Brand::Citizen, Brand::Generic] {
        assert_eq!(
            build_frame(text, brand, PaperWidth::Mm58),
            build_frame(text, brand, PaperWidth::Mm58)
        );
    }
}

#[test]
fn test_code_page_selector_per_brand() {
    let selector = |brand| build_frame("x", brand, PaperWidth::Mm80)[7];
    assert_eq!(selector(Brand::Epson), 19);
    assert_eq!(selector(Brand::Star), 16);
    assert_eq!(selector(Brand::Citizen), 2);
    assert_eq!(selector(Brand::Generic), 19);
}

#[test]
fn test_long_line_wraps_on_58mm() {
    let lines = wrap_lines(&"A".repeat(100), PaperWidth::Mm58.chars());
    assert_eq!(lines.len(), 4);
    assert!(lines[..3].iter().all(|l| l.len() == 32));
    assert_eq!(lines[3].len(), 4);

    let bytes = build_frame(&"A".repeat(100), Brand::Generic, PaperWidth::Mm58);
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
    assert_eq!(newlines, 3 + 6);
}

#[test]
fn test_driver_for_bluetooth_star() {
    let driver = select_driver("Star TSP100", "00:11:22:33:44:55");
    assert_eq!(driver.brand(), Brand::Star);
    assert_eq!(driver.priority(), 1);

    let fallback = select_driver("Unknown Device", "");
    assert_eq!(fallback.brand(), Brand::Generic);
    assert_eq!(fallback.priority(), 10);
}

#[test]
fn test_receipt_from_json() {
    let json = r#"{
        "title": "Table 4",
        "lines": [{"left": "Fries", "right": "3.50"}, {"left": "Cola"}],
        "footer": "Thanks"
    }"#;
    let receipt: Receipt = serde_json::from_str(json).unwrap();
    assert_eq!(receipt.lines[1], ReceiptLine::new("Cola", ""));

    let text = receipt.render(PaperWidth::Mm58);
    let fries = text.lines().find(|l| l.starts_with("Fries")).unwrap();
    assert_eq!(fries.len(), 32);
    assert!(fries.ends_with("3.50"));
    assert!(text.contains("Thanks"));
}
