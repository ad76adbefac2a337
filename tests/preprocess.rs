use std::fs::{create_dir, File};
use std::io::Write;

use tempfile::tempdir;

use wmlkit::error::ErrorKind;
use wmlkit::preprocess::*;

#[test]
fn test_preprocess_macro_with_arguments() {
    let input = String::from("\
#define GREET NAME
greeting=\"Hello, {NAME}\"
#enddef
[hail]
    {GREET SIR}
[/hail]
");

    let (output, _) = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap();

    assert!(output.contains("greeting=\"Hello, SIR\""));
    assert!(!output.contains("#define"));
}

#[test]
fn test_preprocess_nested_macros() {
    let input = String::from("\
#define INNER X
<{X}>
#enddef
#define OUTER Y
{INNER {Y}}
#enddef
{OUTER 42}
");

    let (output, _) = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap();

    assert!(output.contains("<42>"));
}

#[test]
fn test_preprocess_ifdef() {
    let input = String::from("\
#ifdef DEBUG
verbosity=1
#else
verbosity=0
#endif
");

    let (output, _) = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap();
    assert!(output.contains("verbosity=0"));
    assert!(!output.contains("verbosity=1"));

    let mut defines = DefineMap::default();
    defines.insert("DEBUG".to_string(), Definition::flag("DEBUG"));

    let (output, _) = preprocess_string(&input, None, defines, "wesnoth").unwrap();
    assert!(output.contains("verbosity=1"));
    assert!(!output.contains("verbosity=0"));
}

#[test]
fn test_preprocess_nested_ifdef() {
    let input = String::from("\
#define foo
#enddef
#ifdef foo
    #ifdef foobar
inner=1
    #endif
outer=1
#else
other=1
#endif
");

    let (output, _) = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap();

    assert!(output.contains("outer=1"));
    assert!(!output.contains("inner=1"));
    assert!(!output.contains("other=1"));
}

#[test]
fn test_preprocess_textdomain() {
    let input = String::from("\
#textdomain units
name=_ \"Orc\"
");

    let (output, _) = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap();

    assert!(output.contains("#textdomain units"));
    assert!(output.contains("name=_ \"Orc\""));
}

#[test]
fn test_preprocess_quoted_braces_inert() {
    let input = String::from("text=\"{NOT_A_MACRO}\"\n");

    let (output, _) = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap();

    assert!(output.contains("{NOT_A_MACRO}"));
}

#[test]
fn test_preprocess_unterminated_define() {
    let input = String::from("#define FOO\nbar\n");

    let err = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap_err();
    assert_eq!(ErrorKind::PreprocUnterminatedDefine, err.kind());
}

#[test]
fn test_preprocess_unterminated_ifdef() {
    let input = String::from("#ifdef FOO\nx=1\n");

    let err = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap_err();
    assert_eq!(ErrorKind::PreprocUnterminatedIf, err.kind());
}

#[test]
fn test_preprocess_stray_else() {
    let input = String::from("#else\n");

    let err = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap_err();
    assert_eq!(ErrorKind::PreprocStrayElse, err.kind());
}

#[test]
fn test_preprocess_stray_enddef() {
    let input = String::from("#enddef\n");

    let err = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap_err();
    assert_eq!(ErrorKind::PreprocStrayEnddef, err.kind());
}

#[test]
fn test_preprocess_stray_enddef_in_skipped_branch() {
    let input = String::from("#ifdef MISSING\n#enddef\n#endif\n");

    let err = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap_err();
    assert_eq!(ErrorKind::PreprocStrayEnddef, err.kind());
}

#[test]
fn test_preprocess_macro_arity() {
    let input = String::from("\
#define PAIR A B
{A}{B}
#enddef
{PAIR 1}
");

    let err = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap_err();
    assert_eq!(ErrorKind::PreprocMacroArity, err.kind());
}

#[test]
fn test_preprocess_recursion_limit() {
    let input = String::from("\
#define SELF
{SELF}
#enddef
{SELF}
");

    let err = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap_err();
    assert_eq!(ErrorKind::PreprocDepthExceeded, err.kind());
}

#[test]
fn test_preprocess_directory_order() {
    let datadir = tempdir().unwrap();

    File::create(datadir.path().join("b.cfg"))
        .unwrap()
        .write_all(b"[b]\n[/b]\n")
        .unwrap();
    File::create(datadir.path().join("a.cfg"))
        .unwrap()
        .write_all(b"[a]\n[/a]\n")
        .unwrap();
    File::create(datadir.path().join("ignored.txt"))
        .unwrap()
        .write_all(b"[nope]\n[/nope]\n")
        .unwrap();

    let subdir = datadir.path().join("sub");
    create_dir(&subdir).unwrap();
    File::create(subdir.join("c.cfg"))
        .unwrap()
        .write_all(b"[c]\n[/c]\n")
        .unwrap();

    let (output, _) = preprocess(datadir.path(), DefineMap::default(), "wesnoth").unwrap();

    let a = output.find("[a]").unwrap();
    let b = output.find("[b]").unwrap();
    let c = output.find("[c]").unwrap();
    assert!(a < b && b < c);
    assert!(!output.contains("[nope]"));
}

#[test]
fn test_preprocess_include_file() {
    let datadir = tempdir().unwrap();

    File::create(datadir.path().join("inc.cfg"))
        .unwrap()
        .write_all(b"x=1\n")
        .unwrap();
    File::create(datadir.path().join("main.cfg"))
        .unwrap()
        .write_all(b"[top]\n{./inc.cfg}\n[/top]\n")
        .unwrap();

    let (output, _) = preprocess(
        &datadir.path().join("main.cfg"),
        DefineMap::default(),
        "wesnoth",
    )
    .unwrap();

    assert!(output.contains("x=1"));
    let cfg = wmlkit::parser::read(&output).unwrap();
    assert_eq!("1", cfg.child("top").unwrap().attr("x").unwrap().raw());
}

#[test]
fn test_preprocess_missing_include() {
    let datadir = tempdir().unwrap();

    File::create(datadir.path().join("main.cfg"))
        .unwrap()
        .write_all(b"{./gone.cfg}\n")
        .unwrap();

    let err = preprocess(
        &datadir.path().join("main.cfg"),
        DefineMap::default(),
        "wesnoth",
    )
    .unwrap_err();
    assert_eq!(ErrorKind::IoMissing, err.kind());
}

#[test]
fn test_preprocess_sourcemap() {
    let datadir = tempdir().unwrap();

    let inc_path = datadir.path().join("inc.cfg");
    File::create(&inc_path).unwrap().write_all(b"x=1\n").unwrap();
    let main_path = datadir.path().join("main.cfg");
    File::create(&main_path)
        .unwrap()
        .write_all(b"[top]\n{./inc.cfg}\n[/top]\n")
        .unwrap();

    let (output, map) = preprocess(&main_path, DefineMap::default(), "wesnoth").unwrap();

    let line_of = |needle: &str| {
        output
            .lines()
            .position(|line| line.contains(needle))
            .unwrap() as u32
            + 1
    };

    let (file, line) = map.lookup(line_of("x=1")).unwrap();
    assert_eq!(inc_path.to_string_lossy(), file);
    assert_eq!(1, line);

    let (file, line) = map.lookup(line_of("[/top]")).unwrap();
    assert_eq!(main_path.to_string_lossy(), file);
    assert_eq!(3, line);
}

#[test]
fn test_preprocess_deterministic() {
    let datadir = tempdir().unwrap();

    File::create(datadir.path().join("a.cfg"))
        .unwrap()
        .write_all(b"#define W\nwidth=3\n#enddef\n[a]\n{W}\n[/a]\n")
        .unwrap();
    File::create(datadir.path().join("b.cfg"))
        .unwrap()
        .write_all(b"[b]\n[/b]\n")
        .unwrap();

    let (first, first_map) = preprocess(datadir.path(), DefineMap::default(), "wesnoth").unwrap();
    let (second, second_map) = preprocess(datadir.path(), DefineMap::default(), "wesnoth").unwrap();

    assert_eq!(first, second);
    assert_eq!(first_map, second_map);
}

#[test]
fn test_preprocess_bom() {
    let input = String::from_utf8(vec![0xef, 0xbb, 0xbf]).unwrap() + "blub=1";

    let (output, _) = preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap();

    assert!(output.contains("blub=1"));
    assert!(!output.contains('\u{feff}'));
}
