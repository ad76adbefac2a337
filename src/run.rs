use std::fs::File;
use std::io::{stdin, stdout, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::binary;
use crate::config;
use crate::error::*;
use crate::io::{is_directory, Input, Output};
use crate::parser;
use crate::preprocess::{self, DefineMap, Definition};
use crate::value::DEFAULT_TEXTDOMAIN;

pub const USAGE: &str = "
wmlkit

Usage:
    wmlkit preprocess [-D <symbol>]... [-t <textdomain>] [<source> [<target>]]
    wmlkit pretty [<source> [<target>]]
    wmlkit compress [<source> [<target>]]
    wmlkit decompress [<source> [<target>]]
    wmlkit diff <from> <to> [<target>]
    wmlkit patch <source> <patchfile> [<target>]
    wmlkit (-h | --help)
    wmlkit --version

Commands:
    preprocess  Expand macros, conditionals and inclusions in a file or data directory.
    pretty      Parse a config and write it back in canonical form.
    compress    Compress a config against a fresh schema.
    decompress  Decompress a config back to text.
    diff        Write the patch that turns <from> into <to>.
    patch       Apply a patch to a config.

Options:
    -D --define <symbol>        Symbol to predefine (repeatable).
    -t --textdomain <textdomain>    Initial textdomain for translatable strings.
    -h --help                   Show usage information and exit.
       --version                Print the version number and exit.
";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
pub struct Args {
    cmd_preprocess: bool,
    cmd_pretty: bool,
    cmd_compress: bool,
    cmd_decompress: bool,
    cmd_diff: bool,
    cmd_patch: bool,
    flag_define: Vec<String>,
    flag_textdomain: Option<String>,
    flag_version: bool,
    arg_source: Option<String>,
    arg_target: Option<String>,
    arg_from: String,
    arg_to: String,
    arg_patchfile: String,
}

fn get_input(args: &Args) -> Result<Input, Error> {
    if let Some(ref source) = args.arg_source {
        Ok(Input::File(
            File::open(source)
                .map_err(Error::from)
                .prepend_error("Failed to open input file:")?,
        ))
    } else {
        let mut buffer: Vec<u8> = Vec::new();
        stdin().read_to_end(&mut buffer).map_err(Error::from)?;
        Ok(Input::Cursor(Cursor::new(buffer.into_boxed_slice())))
    }
}

fn get_output(args: &Args) -> Result<Output, Error> {
    if let Some(ref target) = args.arg_target {
        Ok(Output::File(
            File::create(target)
                .map_err(Error::from)
                .prepend_error("Failed to open output file:")?,
        ))
    } else {
        Ok(Output::Standard(stdout()))
    }
}

fn run_command(args: &Args) -> Result<(), Error> {
    if args.cmd_preprocess {
        let mut defines = DefineMap::default();
        for symbol in &args.flag_define {
            defines.insert(symbol.clone(), Definition::flag(symbol));
        }
        let textdomain = args
            .flag_textdomain
            .clone()
            .unwrap_or_else(|| DEFAULT_TEXTDOMAIN.to_string());

        match args.arg_source {
            Some(ref source) => {
                let path = Path::new(source);
                if is_directory(path) || path.is_file() {
                    let (result, _) = preprocess::preprocess(path, defines, &textdomain)?;
                    get_output(args)?
                        .write_all(result.as_bytes())
                        .map_err(Error::from)
                        .prepend_error("Failed to write output:")?;
                    Ok(())
                } else {
                    Err(error!(
                        ErrorKind::IoMissing,
                        "File \"{}\" not found.", source
                    ))
                }
            }
            None => preprocess::cmd_preprocess(
                &mut get_input(args)?,
                &mut get_output(args)?,
                None,
                defines,
                &textdomain,
            ),
        }
    } else if args.cmd_pretty {
        parser::cmd_pretty(&mut get_input(args)?, &mut get_output(args)?)
    } else if args.cmd_compress {
        binary::cmd_compress(&mut get_input(args)?, &mut get_output(args)?)
    } else if args.cmd_decompress {
        binary::cmd_decompress(&mut get_input(args)?, &mut get_output(args)?)
    } else if args.cmd_diff {
        config::cmd_diff(
            Path::new(&args.arg_to),
            Path::new(&args.arg_from),
            &mut get_output(args)?,
        )
    } else if args.cmd_patch {
        let source = PathBuf::from(args.arg_source.as_ref().unwrap());
        config::cmd_patch(
            &source,
            Path::new(&args.arg_patchfile),
            &mut get_output(args)?,
        )
    } else {
        unreachable!()
    }
}

pub fn args(args: &Args) {
    if args.flag_version {
        println!("v{}", VERSION);
        std::process::exit(0);
    }

    run_command(args).print_error(true);
}
