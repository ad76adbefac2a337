use std::fmt::{self, Display};
use std::io;

use colored::*;

/// Failure categories of the WML pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced file or directory does not exist.
    IoMissing,
    /// A file exists but could not be read.
    IoRead,
    /// `#define` without a matching `#enddef`.
    PreprocUnterminatedDefine,
    /// `#ifdef` without a matching `#endif`.
    PreprocUnterminatedIf,
    /// `#else` without a preceding `#ifdef`.
    PreprocStrayElse,
    /// `#enddef` outside of a macro body.
    PreprocStrayEnddef,
    /// Macro invoked with the wrong number of arguments.
    PreprocMacroArity,
    /// More than `MAX_DEPTH` nested file or macro inclusions.
    PreprocDepthExceeded,
    /// Quoted string still open at end of input.
    LexUnterminatedString,
    /// Closing tag does not match the open element.
    ParserTagMismatch,
    /// Closing tag with no element open.
    ParserUnexpectedCloseTag,
    /// Token that cannot start or continue the current construct.
    ParserBadToken,
    /// Element still open at end of input.
    ParserUnterminatedElement,
    /// Patch entry referencing a child index that does not exist.
    DiffIndexOutOfRange,
    /// Patch entry referencing a tag with no children on the receiver.
    DiffMissingChild,
    /// Malformed compressed stream.
    BinaryCodecCorrupt,
    /// Schema full; the encoder falls back to literal words.
    BinaryCodecSchemaOverflowRecoverable,
}

/// Authoring position an error points at, resolved through the source map
/// when the input went through the preprocessor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Location {
    pub file: Option<String>,
    pub line: u32,
}

impl Location {
    pub fn new(file: Option<String>, line: u32) -> Location {
        Location { file, line }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.file {
            Some(ref file) => write!(f, "{}:{}", file, self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

/// Error with a kind from the pipeline taxonomy and an optional location.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    location: Option<Location>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: String) -> Error {
        Error { kind, message, location: None }
    }

    /// Attaches an authoring location, replacing any previous one.
    pub fn at(mut self, location: Location) -> Error {
        self.location = Some(location);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    fn prepend<M: Display>(self, msg: M) -> Error {
        Error {
            kind: self.kind,
            message: format!("{}\n{}", msg, self.message),
            location: self.location,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.location {
            Some(ref loc) => write!(f, "In {}: {}", loc, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        let kind = if e.kind() == io::ErrorKind::NotFound {
            ErrorKind::IoMissing
        } else {
            ErrorKind::IoRead
        };
        Error::new(kind, format!("{}", e))
    }
}

#[macro_export]
macro_rules! error {
    ($kind:expr, $($arg:tt)*) => (
        $crate::error::Error::new($kind, format!($($arg)*))
    )
}

pub trait ErrorExt<T> {
    fn prepend_error<M: Display>(self, msg: M) -> Result<T, Error>;
    fn print_error(self, exit: bool) -> ();
}
impl<T> ErrorExt<T> for Result<T, Error> {
    fn prepend_error<M: Display>(self, msg: M) -> Result<T, Error> {
        match self {
            Ok(t) => Ok(t),
            Err(e) => Err(e.prepend(msg)),
        }
    }

    fn print_error(self, exit: bool) {
        if let Err(error) = self {
            eprintln!("{}: {}", "error".red().bold(), error);

            if exit {
                std::process::exit(1);
            }
        }
    }
}

/// Prints a non-fatal, name-tagged notice to stderr.
pub fn warning<M: Display>(msg: M, name: Option<&'static str>, location: Option<&Location>) {
    let loc_str = match location {
        Some(loc) => format!("In {}: ", loc),
        None => "".to_string(),
    };

    let name_str = match name {
        Some(name) => format!(" [{}]", name),
        None => "".to_string(),
    };

    eprintln!("{}{}: {}{}", loc_str, "warning".yellow().bold(), msg, name_str);
}
