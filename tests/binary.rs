use wmlkit::binary::*;
use wmlkit::error::ErrorKind;
use wmlkit::parser::read;

#[test]
fn test_binary_schema_grows() {
    let cfg = read("[side]\ntype=\"Elf\"\n[/side]\n").unwrap();

    let mut schema = BinarySchema::new();
    let first = write_binary(&cfg, &mut schema).unwrap();
    let second = write_binary(&cfg, &mut schema).unwrap();

    assert_eq!(2, schema.len());

    // the first message spells the names out as schema items, the second
    // replaces them with single-byte codes
    assert!(first.windows(4).any(|w| w == b"side"));
    assert!(first.windows(4).any(|w| w == b"type"));
    assert!(!second.windows(4).any(|w| w == b"side"));
    assert!(!second.windows(4).any(|w| w == b"type"));
    assert!(second.len() < first.len());

    // values stay literal in both
    assert!(first.windows(3).any(|w| w == b"Elf"));
    assert!(second.windows(3).any(|w| w == b"Elf"));
}

#[test]
fn test_binary_round_trip() {
    let cfg = read("\
[side]
    controller=human
    gold=100
    [unit]
        type=Elvish Fighter
        x,y=11,23
    [/unit]
[/side]
[side]
    controller=ai
[/side]
")
    .unwrap();

    let mut encode_schema = BinarySchema::new();
    let mut decode_schema = BinarySchema::new();

    let bytes = write_binary(&cfg, &mut encode_schema).unwrap();
    let decoded = read_binary(&bytes, &mut decode_schema).unwrap();
    assert_eq!(cfg, decoded);
    assert_eq!(encode_schema.len(), decode_schema.len());

    // the second message leans on the schema both sides grew
    let bytes = write_binary(&cfg, &mut encode_schema).unwrap();
    let decoded = read_binary(&bytes, &mut decode_schema).unwrap();
    assert_eq!(cfg, decoded);
}

#[test]
fn test_binary_unknown_code() {
    let mut schema = BinarySchema::new();

    let err = read_binary(&[0xff], &mut schema).unwrap_err();
    assert_eq!(ErrorKind::BinaryCodecCorrupt, err.kind());
}

#[test]
fn test_binary_failed_decode_leaves_schema_alone() {
    let mut schema = BinarySchema::new();

    // a schema item followed by an unknown code: the word must not survive
    // the failed decode
    let data = [2, b'f', b'o', b'o', 0, 0xff];
    let err = read_binary(&data, &mut schema).unwrap_err();
    assert_eq!(ErrorKind::BinaryCodecCorrupt, err.kind());
    assert!(schema.is_empty());
}

#[test]
fn test_binary_truncated_value() {
    let mut schema = BinarySchema::new();

    // attribute name as a literal word, value missing its terminator
    let data = [3, b'x', 0, b'1'];
    let err = read_binary(&data, &mut schema).unwrap_err();
    assert_eq!(ErrorKind::BinaryCodecCorrupt, err.kind());
}

#[test]
fn test_binary_stray_close() {
    let mut schema = BinarySchema::new();

    let err = read_binary(&[1], &mut schema).unwrap_err();
    assert_eq!(ErrorKind::BinaryCodecCorrupt, err.kind());
}

#[test]
fn test_detect_format() {
    let text = b"[side]\ncontroller=human\n[/side]\n";

    let mut schema = BinarySchema::new();
    let cfg = detect_format_and_read(text, &mut schema).unwrap();
    assert_eq!(
        "human",
        cfg.child("side").unwrap().attr("controller").unwrap().raw()
    );

    let mut encode_schema = BinarySchema::new();
    let bytes = write_binary(&cfg, &mut encode_schema).unwrap();

    let mut decode_schema = BinarySchema::new();
    let decoded = detect_format_and_read(&bytes, &mut decode_schema).unwrap();
    assert_eq!(cfg, decoded);
}
