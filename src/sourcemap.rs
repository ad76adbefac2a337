//! Mapping from preprocessor output lines back to authoring files

/// One re-mapping point: output line `output_line` was produced by
/// `source_line` of `file`, and subsequent lines follow linearly until the
/// next record.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceEntry {
    pub output_line: u32,
    pub file: String,
    pub source_line: u32,
}

/// Append-only map consulted whenever a diagnostic has to point at the file
/// the user actually wrote, not at the preprocessed stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceMap {
    records: Vec<SourceEntry>,
}

impl SourceMap {
    pub fn new() -> SourceMap {
        SourceMap { records: Vec::new() }
    }

    /// Appends a record. Callers append in increasing output-line order;
    /// lookup relies on it.
    pub fn append(&mut self, output_line: u32, file: &str, source_line: u32) {
        self.records.push(SourceEntry {
            output_line,
            file: file.to_string(),
            source_line,
        });
    }

    /// Resolves an output line to the greatest record at or before it. Lines
    /// are 1-based. Returns `None` when the map is empty or the line precedes
    /// every record.
    pub fn lookup(&self, line: u32) -> Option<(&str, u32)> {
        let idx = self.records.partition_point(|r| r.output_line <= line);
        if idx == 0 {
            return None;
        }

        let record = &self.records[idx - 1];
        Some((&record.file, record.source_line + (line - record.output_line)))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SourceEntry] {
        &self.records
    }
}
