//! Schema-compressed binary serialization
//!
//! Most traffic between a game and its content servers is WML dominated by a
//! small set of recurring tag and attribute names. Dictionary-coding those
//! names while keeping user-facing values literal gets most of the win of a
//! general-purpose compressor at a fraction of the cost, and the schema can
//! be persisted on both ends of a connection so it is only ever transmitted
//! incrementally.

use std::io::{self, Read, Write};

use byteorder::WriteBytesExt;
use hashbrown::HashMap;

use crate::config::Config;
use crate::error::*;
use crate::io::{read_to_string, WriteExt};
use crate::parser;

const OPEN_ELEMENT: u8 = 0;
const CLOSE_ELEMENT: u8 = 1;
const SCHEMA_ITEM: u8 = 2;
const LITERAL_WORD: u8 = 3;
const FIRST_WORD: u8 = 4;

const MAX_WORDS: usize = 0xFF - FIRST_WORD as usize + 1;

/// The word dictionary shared by the two endpoints of a compressed
/// conversation. Codes are handed out in insertion order starting at
/// `FIRST_WORD`; the schema only ever grows, so both sides stay in sync by
/// feeding every message through it.
#[derive(Clone, Debug, Default)]
pub struct BinarySchema {
    word_to_code: HashMap<String, u8>,
    words: Vec<String>,
}

impl BinarySchema {
    pub fn new() -> BinarySchema {
        BinarySchema {
            word_to_code: HashMap::new(),
            words: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn is_full(&self) -> bool {
        self.words.len() >= MAX_WORDS
    }

    fn add_word(&mut self, word: &str) -> u8 {
        let code = FIRST_WORD + self.words.len() as u8;
        self.words.push(word.to_string());
        self.word_to_code.insert(word.to_string(), code);
        code
    }

    fn code_of(&self, word: &str) -> Option<u8> {
        self.word_to_code.get(word).copied()
    }

    fn word_of(&self, code: u8) -> Option<&str> {
        self.words
            .get(code as usize - FIRST_WORD as usize)
            .map(|w| w.as_str())
    }
}

fn emit_word<O: Write>(
    output: &mut O,
    word: &str,
    schema: &mut BinarySchema,
    overflow_warned: &mut bool,
) -> io::Result<()> {
    if let Some(code) = schema.code_of(word) {
        output.write_u8(code)
    } else if !schema.is_full() {
        output.write_u8(SCHEMA_ITEM)?;
        output.write_cstring(word)?;
        schema.add_word(word);
        Ok(())
    } else {
        if !*overflow_warned {
            warning(
                format!("No room for word \"{}\" in the schema.", word),
                Some("schema-overflow"),
                None,
            );
            *overflow_warned = true;
        }

        output.write_u8(LITERAL_WORD)?;
        output.write_cstring(word)
    }
}

fn write_node<O: Write>(
    output: &mut O,
    cfg: &Config,
    schema: &mut BinarySchema,
    overflow_warned: &mut bool,
) -> io::Result<()> {
    for (key, value) in cfg.attrs() {
        if value.is_empty() {
            continue;
        }

        // the name is dictionary-coded, the value never is
        emit_word(output, key, schema, overflow_warned)?;
        output.write_cstring(value.raw())?;
    }

    for (tag, child) in cfg.all_children_ordered() {
        output.write_u8(OPEN_ELEMENT)?;
        emit_word(output, tag, schema, overflow_warned)?;
        write_node(output, child, schema, overflow_warned)?;
        output.write_u8(CLOSE_ELEMENT)?;
    }

    Ok(())
}

/// Encodes the tree against the schema, growing it as new names appear.
pub fn write_binary(cfg: &Config, schema: &mut BinarySchema) -> Result<Vec<u8>, Error> {
    let mut output: Vec<u8> = Vec::new();
    let mut overflow_warned = false;

    write_node(&mut output, cfg, schema, &mut overflow_warned).map_err(Error::from)?;

    Ok(output)
}

fn read_cstring(data: &[u8], pos: &mut usize) -> Result<String, Error> {
    match data[*pos..].iter().position(|&b| b == 0) {
        Some(offset) => {
            let word = String::from_utf8_lossy(&data[*pos..*pos + offset]).to_string();
            *pos += offset + 1;
            Ok(word)
        }
        None => Err(error!(
            ErrorKind::BinaryCodecCorrupt,
            "Unexpected end of data in compressed config."
        )),
    }
}

/// Returns `true` when the node was terminated by a close-element byte,
/// `false` at end of data.
fn read_node(
    data: &[u8],
    pos: &mut usize,
    schema: &mut BinarySchema,
    cfg: &mut Config,
) -> Result<bool, Error> {
    let mut in_open_element = false;

    while *pos < data.len() {
        match data[*pos] {
            OPEN_ELEMENT => {
                in_open_element = true;
                *pos += 1;
            }
            CLOSE_ELEMENT => {
                *pos += 1;
                return Ok(true);
            }
            SCHEMA_ITEM => {
                *pos += 1;
                let word = read_cstring(data, pos)?;
                if schema.is_full() {
                    return Err(error!(
                        ErrorKind::BinaryCodecCorrupt,
                        "Schema item \"{}\" received with no room left.", word
                    ));
                }
                schema.add_word(&word);
            }
            code => {
                let word = if code == LITERAL_WORD {
                    *pos += 1;
                    read_cstring(data, pos)?
                } else {
                    match schema.word_of(code) {
                        Some(word) => {
                            let word = word.to_string();
                            *pos += 1;
                            word
                        }
                        None => {
                            return Err(error!(
                                ErrorKind::BinaryCodecCorrupt,
                                "Illegal character in compressed config: {}.", code
                            ));
                        }
                    }
                };

                if in_open_element {
                    in_open_element = false;
                    let child = cfg.add_child(&word);
                    if !read_node(data, pos, schema, child)? {
                        return Err(error!(
                            ErrorKind::BinaryCodecCorrupt,
                            "Element [{}] not closed in compressed config.", word
                        ));
                    }
                } else {
                    // a name/value pair; the value is always a literal string
                    let value = read_cstring(data, pos)?;
                    cfg.set_attr(&word, value);
                }
            }
        }
    }

    Ok(false)
}

/// Decodes a message against the schema. A failed decode leaves the caller's
/// schema untouched; it only grows once the whole message went through.
pub fn read_binary(data: &[u8], schema: &mut BinarySchema) -> Result<Config, Error> {
    let mut working = schema.clone();
    let mut cfg = Config::new();
    let mut pos = 0;

    if read_node(data, &mut pos, &mut working, &mut cfg)? {
        return Err(error!(
            ErrorKind::BinaryCodecCorrupt,
            "Stray close-element in compressed config."
        ));
    }

    *schema = working;
    Ok(cfg)
}

/// Sniffs the format from the first byte: everything below the first word
/// code has to be a compressed stream, anything else is text.
pub fn detect_format_and_read(data: &[u8], schema: &mut BinarySchema) -> Result<Config, Error> {
    match data.first() {
        Some(&byte) if byte < FIRST_WORD => read_binary(data, schema),
        _ => parser::read(&String::from_utf8_lossy(data)),
    }
}

/// Reads WML text, compresses it against a fresh schema and writes the
/// result.
pub fn cmd_compress<I: Read, O: Write>(input: &mut I, output: &mut O) -> Result<(), Error> {
    let buffer = read_to_string(input)?;
    let cfg = parser::read(&buffer).prepend_error("Failed to parse config:")?;

    let mut schema = BinarySchema::new();
    let bytes = write_binary(&cfg, &mut schema)?;

    output
        .write_all(&bytes)
        .map_err(Error::from)
        .prepend_error("Failed to write output:")?;

    Ok(())
}

/// Reads a compressed config and writes it back as text.
pub fn cmd_decompress<I: Read, O: Write>(input: &mut I, output: &mut O) -> Result<(), Error> {
    let mut data: Vec<u8> = Vec::new();
    input
        .read_to_end(&mut data)
        .map_err(Error::from)
        .prepend_error("Failed to read input:")?;

    let mut schema = BinarySchema::new();
    let cfg = read_binary(&data, &mut schema).prepend_error("Failed to read compressed config:")?;

    parser::write(output, &cfg).prepend_error("Failed to write config:")?;

    Ok(())
}
