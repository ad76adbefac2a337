//! The WML macro preprocessor

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use hashbrown::HashMap;

use crate::error::*;
use crate::io::{is_directory, list_dir, read_file, read_to_string};
use crate::sourcemap::SourceMap;

/// Hard limit on nested file and macro inclusions.
pub const MAX_DEPTH: u32 = 40;

/// Marker char reserved in the preprocessor output; `\u{FE}line` and
/// `\u{FE}textdomain` lines keep later stages in sync without consulting the
/// source map.
pub const SENTINEL: char = '\u{FE}';

const WML_EXTENSION: &str = ".cfg";

/// Macro definition
#[derive(Clone, Debug)]
pub struct Definition {
    pub name: String,
    pub arguments: Vec<String>,
    pub value: String,
    pub file: String,
    pub line: u32,
    pub textdomain: String,
}

impl Definition {
    pub fn new(name: &str, arguments: Vec<String>, value: &str) -> Definition {
        Definition {
            name: name.to_string(),
            arguments,
            value: value.to_string(),
            file: String::new(),
            line: 1,
            textdomain: String::new(),
        }
    }

    /// Bare symbol, the usual shape for `#ifdef` switches handed in by the
    /// caller.
    pub fn flag(name: &str) -> Definition {
        Definition::new(name, Vec::new(), "")
    }
}

impl PartialEq for Definition {
    fn eq(&self, other: &Definition) -> bool {
        self.value == other.value && self.arguments == other.arguments
    }
}

/// Macro table threaded through one preprocessing run.
pub type DefineMap = HashMap<String, Definition>;

/// One open `#ifdef`.
struct CondFrame {
    line: u32,
    skipping_before: bool,
    taken: bool,
    seen_else: bool,
}

/// Per-segment scanning state: the file (or macro) the bytes came from, the
/// directory `./` inclusions resolve against, the current source line and
/// textdomain.
struct Segment {
    file: String,
    dir: PathBuf,
    line: u32,
    textdomain: String,
}

impl Segment {
    fn location(&self) -> Location {
        let file = if self.file.is_empty() {
            None
        } else {
            Some(self.file.clone())
        };
        Location::new(file, self.line)
    }
}

struct Preprocessor {
    defines: DefineMap,
    map: SourceMap,
    output: Vec<u8>,
    out_line: u32,
    depth: u32,
    root: PathBuf,
}

impl Preprocessor {
    fn emit_str(&mut self, s: &str) {
        self.output.extend_from_slice(s.as_bytes());
        self.out_line += s.bytes().filter(|&b| b == b'\n').count() as u32;
    }

    fn emit_byte(&mut self, b: u8) {
        self.output.push(b);
        if b == b'\n' {
            self.out_line += 1;
        }
    }

    /// Emits the sentinel pair for a new segment and records the mapping of
    /// the upcoming output line.
    fn enter_segment(&mut self, file: &str, line: u32, textdomain: &str) {
        if !file.is_empty() {
            self.emit_str(&format!("{}line {} {}\n", SENTINEL, line, file));
        }
        if !textdomain.is_empty() {
            self.emit_str(&format!("{}textdomain {}\n", SENTINEL, textdomain));
        }
        self.map.append(self.out_line, file, line);
    }

    /// Processes a file, or every `.cfg` under a directory in sorted order.
    fn process_path(&mut self, path: &Path, textdomain: &str) -> Result<(), Error> {
        if is_directory(path) {
            for entry in list_dir(path)? {
                if is_directory(&entry) {
                    self.process_path(&entry, textdomain)?;
                } else if entry.to_string_lossy().ends_with(WML_EXTENSION) {
                    self.process_file(&entry, textdomain)?;
                }
            }
            return Ok(());
        }

        self.process_file(path, textdomain)
    }

    fn process_file(&mut self, path: &Path, textdomain: &str) -> Result<(), Error> {
        let content = read_file(path)?;
        let file = path.to_string_lossy().to_string();
        let dir = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };

        self.process_buffer(&content, &file, dir, textdomain)
    }

    fn process_buffer(
        &mut self,
        data: &str,
        file: &str,
        dir: PathBuf,
        textdomain: &str,
    ) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(error!(
                ErrorKind::PreprocDepthExceeded,
                "More than {} nested inclusions while reading \"{}\".", MAX_DEPTH, file
            ));
        }

        self.enter_segment(file, 1, textdomain);

        let mut seg = Segment {
            file: file.to_string(),
            dir,
            line: 1,
            textdomain: textdomain.to_string(),
        };
        self.process_data(data, &mut seg)?;

        self.depth -= 1;
        Ok(())
    }

    /// The scanner proper: one pass over the bytes, quote-aware, dispatching
    /// on `{` inclusions and `#` directives.
    fn process_data(&mut self, data: &str, seg: &mut Segment) -> Result<(), Error> {
        let bytes = data.as_bytes();
        let mut i = 0;
        let mut in_quotes = false;
        let mut conds: Vec<CondFrame> = Vec::new();
        let mut skipping = false;

        while i < bytes.len() {
            let c = bytes[i];

            if c == b'"' {
                in_quotes = !in_quotes;
                if !skipping {
                    self.emit_byte(c);
                }
                i += 1;
            } else if c == b'\n' {
                seg.line += 1;
                if !skipping {
                    self.emit_byte(c);
                }
                i += 1;
            } else if c == b'{' && !in_quotes {
                let mut braces = 1;
                let mut inner_quotes = false;
                let mut j = i + 1;
                while j < bytes.len() {
                    let b = bytes[j];
                    if b == b'"' {
                        inner_quotes = !inner_quotes;
                    } else if !inner_quotes {
                        if b == b'{' {
                            braces += 1;
                        } else if b == b'}' {
                            braces -= 1;
                            if braces == 0 {
                                break;
                            }
                        }
                    }
                    j += 1;
                }

                if braces != 0 {
                    // truncated inclusion ends the segment
                    break;
                }

                let inner = &data[i + 1..j];
                i = j + 1;
                seg.line += count_newlines(inner);

                if !skipping {
                    self.handle_inclusion(inner, seg)?;
                }
            } else if c == b'#' && !in_quotes {
                i += 1;
                let command = read_word(bytes, &mut i);
                let mut line_emitted = false;

                match command.as_str() {
                    "define" => {
                        self.handle_define(data, &mut i, seg, skipping)?;
                    }
                    "ifdef" => {
                        skip_inline_space(bytes, &mut i);
                        let symbol = read_word(bytes, &mut i);
                        let defined = self.defines.contains_key(&symbol);

                        conds.push(CondFrame {
                            line: seg.line,
                            skipping_before: skipping,
                            taken: !skipping && defined,
                            seen_else: false,
                        });
                        skipping = skipping || !defined;
                    }
                    "else" => match conds.last_mut() {
                        Some(frame) if !frame.seen_else => {
                            frame.seen_else = true;
                            skipping = frame.skipping_before || frame.taken;
                        }
                        _ => {
                            return Err(error!(
                                ErrorKind::PreprocStrayElse,
                                "Unexpected #else."
                            )
                            .at(seg.location()));
                        }
                    },
                    "endif" => {
                        // a stray #endif is inert, like any other comment
                        if let Some(frame) = conds.pop() {
                            skipping = frame.skipping_before;
                        }
                    }
                    "enddef" => {
                        return Err(error!(
                            ErrorKind::PreprocStrayEnddef,
                            "Unexpected #enddef."
                        )
                        .at(seg.location()));
                    }
                    "textdomain" => {
                        skip_inline_space(bytes, &mut i);
                        let domain = read_word(bytes, &mut i);
                        if !skipping {
                            seg.textdomain = domain.clone();
                            self.emit_str(&format!("#textdomain {}\n", domain));
                            line_emitted = true;
                        }
                    }
                    _ => {}
                }

                // the remainder of the directive line is discarded
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                if i < bytes.len() {
                    i += 1;
                    seg.line += 1;
                }

                if !skipping {
                    if !line_emitted {
                        self.emit_byte(b'\n');
                    }
                    // a directive may have swallowed source lines, so re-sync
                    // the stream and the map before content resumes
                    if !seg.file.is_empty() {
                        self.emit_str(&format!("{}line {} {}\n", SENTINEL, seg.line, seg.file));
                    }
                    self.map.append(self.out_line, &seg.file, seg.line);
                }
            } else {
                if !skipping {
                    self.emit_byte(c);
                }
                i += 1;
            }
        }

        if let Some(frame) = conds.first() {
            return Err(error!(
                ErrorKind::PreprocUnterminatedIf,
                "#ifdef without a matching #endif."
            )
            .at(Location::new(
                if seg.file.is_empty() { None } else { Some(seg.file.clone()) },
                frame.line,
            )));
        }

        Ok(())
    }

    /// `#define NAME ARGS...` up to the matching `#enddef`. The body is
    /// parsed even inside a skipped conditional branch, it is just not
    /// installed.
    fn handle_define(
        &mut self,
        data: &str,
        i: &mut usize,
        seg: &mut Segment,
        skipping: bool,
    ) -> Result<(), Error> {
        let bytes = data.as_bytes();
        let define_location = seg.location();

        skip_inline_space(bytes, i);
        let header_start = *i;
        while *i < bytes.len() && bytes[*i] != b'\n' {
            *i += 1;
        }
        let header = data[header_start..*i].trim().to_string();

        let mut words = header.split_whitespace();
        let name = match words.next() {
            Some(name) => name.to_string(),
            None => {
                return Err(error!(
                    ErrorKind::PreprocUnterminatedDefine,
                    "No macro name after #define."
                )
                .at(define_location));
            }
        };
        let arguments: Vec<String> = words.map(String::from).collect();

        if *i >= bytes.len() {
            return Err(error!(
                ErrorKind::PreprocUnterminatedDefine,
                "Unterminated #define \"{}\".", name
            )
            .at(define_location));
        }
        *i += 1;
        seg.line += 1;

        let body_start = *i;
        let body_line = seg.line;
        match data[body_start..].find("#enddef") {
            Some(pos) => {
                let body = &data[body_start..body_start + pos];
                seg.line += count_newlines(body);
                *i = body_start + pos + "#enddef".len();

                if !skipping {
                    self.defines.insert(
                        name.clone(),
                        Definition {
                            name,
                            arguments,
                            value: body.to_string(),
                            file: seg.file.clone(),
                            line: body_line,
                            textdomain: seg.textdomain.clone(),
                        },
                    );
                }

                Ok(())
            }
            None => Err(error!(
                ErrorKind::PreprocUnterminatedDefine,
                "Unterminated #define \"{}\".", name
            )
            .at(define_location)),
        }
    }

    /// `{key args...}`: a macro substitution when the key is defined, a file
    /// or directory inclusion otherwise.
    fn handle_inclusion(&mut self, inner: &str, seg: &mut Segment) -> Result<(), Error> {
        let words = split_arguments(inner);
        let (key, args) = match words.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };

        if let Some(def) = self.defines.get(key).cloned() {
            if args.len() != def.arguments.len() {
                return Err(error!(
                    ErrorKind::PreprocMacroArity,
                    "Preprocessor symbol \"{}\" expects {} arguments, but has {}.",
                    key,
                    def.arguments.len(),
                    args.len()
                )
                .at(seg.location()));
            }

            let body = substitute(&def.value, &def.arguments, args);

            let file = if def.file.is_empty() {
                seg.file.clone()
            } else {
                def.file.clone()
            };
            let dir = match Path::new(&file).parent() {
                Some(parent) if !file.is_empty() => parent.to_path_buf(),
                _ => seg.dir.clone(),
            };
            let textdomain = if def.textdomain.is_empty() {
                seg.textdomain.clone()
            } else {
                def.textdomain.clone()
            };

            self.depth += 1;
            if self.depth > MAX_DEPTH {
                return Err(error!(
                    ErrorKind::PreprocDepthExceeded,
                    "More than {} nested inclusions while expanding \"{}\".", MAX_DEPTH, key
                )
                .at(seg.location()));
            }

            self.enter_segment(&file, def.line, &textdomain);
            let mut macro_seg = Segment {
                file,
                dir,
                line: def.line,
                textdomain,
            };
            self.process_data(&body, &mut macro_seg)
                .prepend_error(format!("Failed to expand macro \"{}\":", key))?;
            self.depth -= 1;
        } else {
            let path = match key.strip_prefix("./") {
                Some(relative) => seg.dir.join(relative),
                None => self.root.join(key),
            };

            self.process_path(&path, &seg.textdomain)
                .prepend_error(format!("Failed to preprocess include \"{}\":", key))?;
        }

        self.enter_segment(&seg.file, seg.line, &seg.textdomain);
        Ok(())
    }
}

fn count_newlines(s: &str) -> u32 {
    s.bytes().filter(|&b| b == b'\n').count() as u32
}

fn skip_inline_space(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && (bytes[*i] == b' ' || bytes[*i] == b'\t') {
        *i += 1;
    }
}

fn read_word(bytes: &[u8], i: &mut usize) -> String {
    let start = *i;
    while *i < bytes.len() && !bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
    String::from_utf8_lossy(&bytes[start..*i]).to_string()
}

/// Splits an inclusion body into whitespace-separated words, keeping braced
/// and quoted groups intact so macro arguments can carry nested inclusions.
fn split_arguments(inner: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut braces = 0;
    let mut in_quotes = false;

    for c in inner.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
        } else if in_quotes {
            current.push(c);
        } else if c == '{' {
            braces += 1;
            current.push(c);
        } else if c == '}' {
            braces -= 1;
            current.push(c);
        } else if c.is_whitespace() && braces == 0 {
            if !current.is_empty() {
                words.push(current.clone());
                current.clear();
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// Replaces every innermost `{NAME}` that names a formal argument with the
/// matching actual; other braced groups are kept for the recursive expansion
/// pass.
fn substitute(body: &str, formals: &[String], actuals: &[String]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);

        let mut braces = 1;
        let mut end = None;
        for (offset, c) in rest[pos + 1..].char_indices() {
            if c == '{' {
                braces += 1;
            } else if c == '}' {
                braces -= 1;
                if braces == 0 {
                    end = Some(pos + 1 + offset);
                    break;
                }
            }
        }

        match end {
            Some(end) => {
                let span = &rest[pos + 1..end];
                match formals.iter().position(|f| f == span) {
                    Some(k) => out.push_str(&actuals[k]),
                    None => {
                        out.push('{');
                        out.push_str(&substitute(span, formals, actuals));
                        out.push('}');
                    }
                }
                rest = &rest[end + 1..];
            }
            None => {
                out.push_str(&rest[pos..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Preprocesses a file or data directory and returns the expanded text with
/// its source map.
///
/// `root` may be a single file or a directory; directories are walked in
/// sorted order and only `.cfg` files are read. `defines` seeds the macro
/// table and `textdomain` the initial catalog binding.
///
/// # Examples
///
/// ```no_run
/// # use std::path::Path;
/// # use wmlkit::preprocess::{preprocess, DefineMap};
/// let (output, map) = preprocess(Path::new("data/units.cfg"), DefineMap::default(), "units")
///     .expect("Failed to preprocess");
/// ```
pub fn preprocess(
    root: &Path,
    defines: DefineMap,
    textdomain: &str,
) -> Result<(String, SourceMap), Error> {
    let data_root = if is_directory(root) {
        root.to_path_buf()
    } else {
        match root.parent() {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        }
    };

    let mut preprocessor = Preprocessor {
        defines,
        map: SourceMap::new(),
        output: Vec::new(),
        out_line: 1,
        depth: 0,
        root: data_root,
    };

    preprocessor.process_path(root, textdomain)?;

    Ok((into_string(preprocessor.output), preprocessor.map))
}

/// Preprocesses in-memory input. `origin` is the path the input came from if
/// known; it anchors `./` inclusions and shows up in diagnostics.
///
/// # Examples
///
/// ```
/// # use wmlkit::preprocess::{preprocess_string, DefineMap};
/// let input = "\
/// #define GREET NAME
/// greeting=\"Hello, {NAME}\"
/// #enddef
/// [hail]
///     {GREET Konrad}
/// [/hail]
/// ";
///
/// let (output, _) = preprocess_string(input, None, DefineMap::default(), "messages")
///     .expect("Failed to preprocess");
///
/// assert!(output.contains("greeting=\"Hello, Konrad\""));
/// ```
pub fn preprocess_string(
    input: &str,
    origin: Option<&Path>,
    defines: DefineMap,
    textdomain: &str,
) -> Result<(String, SourceMap), Error> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);

    let file = origin
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let dir = origin
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut preprocessor = Preprocessor {
        defines,
        map: SourceMap::new(),
        output: Vec::new(),
        out_line: 1,
        depth: 0,
        root: dir.clone(),
    };

    preprocessor.process_buffer(input, &file, dir, textdomain)?;

    Ok((into_string(preprocessor.output), preprocessor.map))
}

fn into_string(output: Vec<u8>) -> String {
    // every splice happens at an ASCII boundary, so the buffer stays UTF-8
    String::from_utf8(output).unwrap()
}

/// Reads input, preprocesses it and writes the expanded text to output.
pub fn cmd_preprocess<I: Read, O: Write>(
    input: &mut I,
    output: &mut O,
    path: Option<PathBuf>,
    defines: DefineMap,
    textdomain: &str,
) -> Result<(), Error> {
    let buffer = read_to_string(input)?;

    let (result, _) = preprocess_string(&buffer, path.as_deref(), defines, textdomain)?;

    output
        .write_all(result.as_bytes())
        .map_err(Error::from)
        .prepend_error("Failed to write output:")?;

    Ok(())
}
