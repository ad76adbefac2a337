//! Reading and writing the WML textual form

use std::io::{self, Read, Write};

use crate::config::Config;
use crate::error::*;
use crate::io::read_to_string;
use crate::sourcemap::SourceMap;
use crate::tokenizer::{TokenKind, Tokenizer};
use crate::value::{AttributeValue, DEFAULT_TEXTDOMAIN};

/// One open element: where it sits under the root, where it started, and the
/// textdomain to restore when it closes.
struct ElementFrame {
    tag: String,
    index: usize,
    start_line: u32,
    textdomain: String,
}

struct Parser<'a> {
    tok: Tokenizer<'a>,
    root: Config,
    stack: Vec<ElementFrame>,
}

/// Parses WML text into a config tree.
///
/// # Examples
///
/// ```
/// # use wmlkit::parser::read;
/// let cfg = read("[side]\n    type=Elf\n[/side]\n").expect("Failed to parse");
///
/// assert_eq!("Elf", cfg.child("side").unwrap().attr("type").unwrap().raw());
/// ```
pub fn read(data: &str) -> Result<Config, Error> {
    Parser {
        tok: Tokenizer::new(data),
        root: Config::new(),
        stack: Vec::new(),
    }
    .parse()
}

/// Like [`read`], but resolves error locations through a preprocessor source
/// map when the stream carried no sentinel for them.
pub fn read_with_map(data: &str, map: &SourceMap) -> Result<Config, Error> {
    read(data).map_err(|e| {
        let resolved = match e.location() {
            Some(loc) if loc.file.is_none() => map
                .lookup(loc.line)
                .map(|(file, line)| Location::new(Some(file.to_string()), line)),
            _ => None,
        };

        match resolved {
            Some(location) => e.at(location),
            None => e,
        }
    })
}

impl<'a> Parser<'a> {
    fn parse(mut self) -> Result<Config, Error> {
        loop {
            let kind = self.tok.next_token().kind;
            match kind {
                TokenKind::LF => continue,
                TokenKind::OpenBracket => self.parse_element()?,
                TokenKind::Word => self.parse_variable()?,
                TokenKind::End => break,
                _ => {
                    return Err(self.bad_token("Unexpected characters at line start"));
                }
            }
        }

        if let Some(frame) = self.stack.last() {
            return Err(error!(
                ErrorKind::ParserUnterminatedElement,
                "Missing closing tag for tag [{}].", frame.tag
            )
            .at(Location::new(
                self.tok.file().map(String::from),
                frame.start_line,
            )));
        }

        Ok(self.root)
    }

    /// The node the next attribute or child belongs to.
    fn current(&mut self) -> &mut Config {
        let mut cur = &mut self.root;
        for frame in &self.stack {
            cur = match cur.child_at_mut(&frame.tag, frame.index) {
                Some(child) => child,
                None => unreachable!(),
            };
        }
        cur
    }

    fn parse_element(&mut self) -> Result<(), Error> {
        let kind = self.tok.next_token().kind;
        match kind {
            TokenKind::Word => {
                // [element], or the [end] close synonym
                let name = self.tok.current().value.clone();
                if self.tok.next_token().kind != TokenKind::CloseBracket {
                    return Err(self.bad_token("Unterminated [element] tag"));
                }

                if name == "end" {
                    return self.close_element(None);
                }

                let index = {
                    let node = self.current();
                    let index = node.child_count(&name);
                    node.add_child(&name);
                    index
                };
                self.push_frame(name, index);
            }
            TokenKind::Plus => {
                // [+element]: reopen the most recent child of that name
                if self.tok.next_token().kind != TokenKind::Word {
                    return Err(self.bad_token("Invalid tag name"));
                }
                let name = self.tok.current().value.clone();
                if self.tok.next_token().kind != TokenKind::CloseBracket {
                    return Err(self.bad_token("Unterminated [+element] tag"));
                }

                let index = {
                    let node = self.current();
                    match node.child_count(&name) {
                        0 => {
                            node.add_child(&name);
                            0
                        }
                        count => count - 1,
                    }
                };
                self.push_frame(name, index);
            }
            TokenKind::Slash => {
                // [/element]
                if self.tok.next_token().kind != TokenKind::Word {
                    return Err(self.bad_token("Invalid closing tag name"));
                }
                let name = self.tok.current().value.clone();
                if self.tok.next_token().kind != TokenKind::CloseBracket {
                    return Err(self.bad_token("Unterminated closing tag"));
                }

                self.close_element(Some(name.as_str()))?;
            }
            _ => {
                return Err(self.bad_token("Invalid tag name"));
            }
        }

        Ok(())
    }

    fn push_frame(&mut self, tag: String, index: usize) {
        self.stack.push(ElementFrame {
            tag,
            index,
            start_line: self.tok.line(),
            textdomain: self.tok.textdomain().to_string(),
        });
    }

    fn close_element(&mut self, name: Option<&str>) -> Result<(), Error> {
        match self.stack.pop() {
            Some(frame) => {
                if let Some(name) = name {
                    if name != frame.tag {
                        return Err(error!(
                            ErrorKind::ParserTagMismatch,
                            "Found invalid closing tag [/{}] for tag [{}].", name, frame.tag
                        )
                        .at(self.tok.location()));
                    }
                }

                self.tok.set_textdomain(&frame.textdomain);
                Ok(())
            }
            None => Err(error!(
                ErrorKind::ParserUnexpectedCloseTag,
                "Unexpected closing tag."
            )
            .at(self.tok.location())),
        }
    }

    fn parse_variable(&mut self) -> Result<(), Error> {
        // left-hand side: one name, or a comma list for multi-assignment
        let mut variables: Vec<String> = vec![String::new()];

        while self.tok.current().kind != TokenKind::Equals {
            match self.tok.current().kind {
                TokenKind::Word => {
                    let name = self.tok.current().value.clone();
                    let last = match variables.last_mut() {
                        Some(last) => last,
                        None => unreachable!(),
                    };
                    if !last.is_empty() {
                        last.push(' ');
                    }
                    last.push_str(&name);
                }
                TokenKind::Comma => {
                    if variables.last().map_or(true, |v| v.is_empty()) {
                        return Err(
                            self.bad_token("Unexpected characters after variable name")
                        );
                    }
                    variables.push(String::new());
                }
                _ => {
                    return Err(self.bad_token("Unexpected characters after variable name"));
                }
            }
            self.tok.next_token();
        }

        let mut curvar = 0;
        let mut value = AttributeValue::new();
        let mut started = false;
        let mut ignore_next_newlines = false;

        loop {
            self.tok.next_token();
            let token = self.tok.current().clone();

            match token.kind {
                TokenKind::Comma => {
                    if curvar + 1 < variables.len() {
                        self.commit(&variables[curvar], value);
                        value = AttributeValue::new();
                        started = false;
                        curvar += 1;
                    } else {
                        value.push_raw(",");
                        started = true;
                    }
                }
                TokenKind::Underscore => {
                    self.tok.next_token();
                    let inner = self.tok.current().clone();
                    match inner.kind {
                        TokenKind::QString => {
                            let domain = self.tok.textdomain().to_string();
                            value.push_translatable(&inner.value, &domain);
                            started = true;
                        }
                        TokenKind::UnterminatedQString => {
                            return Err(error!(
                                ErrorKind::LexUnterminatedString,
                                "Unterminated quoted string."
                            )
                            .at(self.tok.location()));
                        }
                        TokenKind::End | TokenKind::LF => {
                            self.commit(&variables[curvar], value);
                            return Ok(());
                        }
                        _ => {
                            value.push_raw("_");
                            value.push_raw(&inner.value);
                            started = true;
                        }
                    }
                }
                TokenKind::Plus => {
                    // value continues on the next line
                }
                TokenKind::QString => {
                    value.push_raw(&token.value);
                    started = true;
                }
                TokenKind::UnterminatedQString => {
                    return Err(error!(
                        ErrorKind::LexUnterminatedString,
                        "Unterminated quoted string."
                    )
                    .at(self.tok.location()));
                }
                TokenKind::LF => {
                    if !ignore_next_newlines {
                        break;
                    }
                }
                TokenKind::End => break,
                _ => {
                    if token.kind == TokenKind::OpenBracket {
                        warning(
                            "Square bracket found in string. Is this a run-away string?",
                            Some("runaway-string"),
                            Some(&self.tok.location()),
                        );
                    }

                    if started {
                        value.push_raw(&token.leading_spaces);
                    }
                    value.push_raw(&token.value);
                    started = true;
                }
            }

            if token.kind == TokenKind::Plus {
                ignore_next_newlines = true;
            } else if token.kind != TokenKind::LF {
                ignore_next_newlines = false;
            }
        }

        self.commit(&variables[curvar], value);
        Ok(())
    }

    fn commit(&mut self, name: &str, value: AttributeValue) {
        self.current().set_attr(name, value);
    }

    fn bad_token(&self, message: &str) -> Error {
        error!(ErrorKind::ParserBadToken, "{}.", message).at(self.tok.location())
    }
}

fn indent(level: usize) -> String {
    "  ".repeat(level)
}

fn escaped_string(value: &str) -> String {
    value.replace('"', "\"\"")
}

/// Writes one attribute, one run per segment, switching `#textdomain` when a
/// translatable run is bound elsewhere than the current catalog.
pub fn write_key_val<O: Write>(
    out: &mut O,
    key: &str,
    value: &AttributeValue,
    level: usize,
    textdomain: &mut String,
) -> io::Result<()> {
    let runs = value.runs();
    let mut first = true;

    for (i, run) in runs.iter().enumerate() {
        if let Some(ref domain) = run.textdomain {
            if domain != textdomain {
                writeln!(out, "#textdomain {}", domain)?;
                *textdomain = domain.clone();
            }
        }

        if first {
            write!(out, "{}{}=", indent(level), key)?;
        }

        if run.textdomain.is_some() {
            write!(out, "_ \"{}\"", escaped_string(&run.text))?;
        } else {
            write!(out, "\"{}\"", escaped_string(&run.text))?;
        }

        if i + 1 == runs.len() {
            out.write_all(b"\n")?;
        } else {
            write!(out, " + \n{}", indent(level + 1))?;
        }

        first = false;
    }

    Ok(())
}

pub fn write_open_child<O: Write>(out: &mut O, tag: &str, level: usize) -> io::Result<()> {
    writeln!(out, "{}[{}]", indent(level), tag)
}

pub fn write_close_child<O: Write>(out: &mut O, tag: &str, level: usize) -> io::Result<()> {
    writeln!(out, "{}[/{}]", indent(level), tag)
}

fn write_internal<O: Write>(
    out: &mut O,
    cfg: &Config,
    textdomain: &mut String,
    level: usize,
) -> io::Result<()> {
    for (key, value) in cfg.attrs() {
        if value.is_empty() {
            continue;
        }
        write_key_val(out, key, value, level, textdomain)?;
    }

    for (tag, child) in cfg.all_children_ordered() {
        write_open_child(out, tag, level)?;
        write_internal(out, child, textdomain, level + 1)?;
        write_close_child(out, tag, level)?;
    }

    Ok(())
}

/// Writes the tree as WML text: attributes before children, two spaces of
/// indentation per level. Reading the output back yields an equal tree.
pub fn write<O: Write>(output: &mut O, cfg: &Config) -> Result<(), Error> {
    let mut textdomain = DEFAULT_TEXTDOMAIN.to_string();
    write_internal(output, cfg, &mut textdomain, 0).map_err(Error::from)
}

/// Reads WML text and writes it back in canonical form.
pub fn cmd_pretty<I: Read, O: Write>(input: &mut I, output: &mut O) -> Result<(), Error> {
    let buffer = read_to_string(input)?;

    let cfg = read(&buffer).prepend_error("Failed to parse config:")?;
    write(output, &cfg).prepend_error("Failed to write config:")?;

    Ok(())
}
