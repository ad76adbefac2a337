use std::fs::{read_dir, File};
use std::io::{self, Cursor, Read, Seek, Stdout, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorExt, ErrorKind};

pub enum Input {
    File(File),
    Cursor(Cursor<Box<[u8]>>),
}

pub enum Output {
    File(File),
    Standard(Stdout),
}

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            Input::File(ref mut f) => f.read(buf),
            Input::Cursor(ref mut c) => c.read(buf),
        }
    }
}

impl Seek for Input {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        match *self {
            Input::File(ref mut f) => f.seek(pos),
            Input::Cursor(ref mut c) => c.seek(pos),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            Output::File(ref mut f) => f.write(buf),
            Output::Standard(ref mut s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            Output::File(ref mut f) => f.flush(),
            Output::Standard(ref mut s) => s.flush(),
        }
    }
}

pub trait WriteExt: Write {
    fn write_cstring<S: AsRef<[u8]>>(&mut self, s: S) -> io::Result<()>;
}

impl<T: Write> WriteExt for T {
    fn write_cstring<S: AsRef<[u8]>>(&mut self, s: S) -> io::Result<()> {
        self.write_all(s.as_ref())?;
        self.write_all(b"\0")?;
        Ok(())
    }
}

/// Reads a whole file as UTF-8 text.
pub fn read_file(path: &Path) -> Result<String, Error> {
    if !path.exists() {
        return Err(error!(ErrorKind::IoMissing, "File \"{}\" not found.", path.to_string_lossy()));
    }

    let mut content = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut content))
        .map_err(|e| error!(ErrorKind::IoRead, "Failed to read \"{}\": {}", path.to_string_lossy(), e))?;

    Ok(content)
}

/// Returns the entries of a directory sorted by name. Traversal order has to
/// be deterministic across hosts, so the OS order is never used directly.
pub fn list_dir(path: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut entries: Vec<PathBuf> = Vec::new();

    for entry in read_dir(path)
        .map_err(|e| error!(ErrorKind::IoRead, "Failed to list \"{}\": {}", path.to_string_lossy(), e))?
    {
        entries.push(entry.map_err(Error::from)?.path());
    }

    entries.sort();
    Ok(entries)
}

pub fn is_directory(path: &Path) -> bool {
    path.is_dir()
}

/// Reads all of the given input into memory.
pub fn read_to_string<I: Read>(input: &mut I) -> Result<String, Error> {
    let mut buffer = String::new();
    input
        .read_to_string(&mut buffer)
        .map_err(Error::from)
        .prepend_error("Failed to read input:")?;
    Ok(buffer)
}
