//! Attribute values with translatable text runs

use std::fmt::{self, Display};

/// Catalog name used until a `#textdomain` directive says otherwise. This is
/// gettext's default catalog.
pub const DEFAULT_TEXTDOMAIN: &str = "messages";

/// External catalog lookup, consulted at display time only. The pipeline
/// itself never translates; it stores `(textdomain, key)` pairs.
pub trait Translator {
    fn translate(&self, textdomain: &str, key: &str) -> String;
}

/// Maximal run of characters that share one translation binding. `textdomain`
/// is `None` for untranslatable text.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub textdomain: Option<String>,
}

impl TextRun {
    pub fn is_translatable(&self) -> bool {
        self.textdomain.is_some()
    }
}

/// Value of a single attribute: a sequence of text runs, each either plain or
/// bound to a textdomain. Comparing two values compares the untranslated
/// bytes only; the bindings matter for writing, not for structure.
#[derive(Clone, Debug, Default)]
pub struct AttributeValue {
    runs: Vec<TextRun>,
}

impl AttributeValue {
    pub fn new() -> AttributeValue {
        AttributeValue { runs: Vec::new() }
    }

    /// Single translatable run bound to `textdomain`.
    pub fn translatable(text: &str, textdomain: &str) -> AttributeValue {
        AttributeValue {
            runs: vec![TextRun {
                text: text.to_string(),
                textdomain: Some(textdomain.to_string()),
            }],
        }
    }

    /// Appends plain text, merging into a trailing plain run if there is one.
    pub fn push_raw(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if let Some(last) = self.runs.last_mut() {
            if last.textdomain.is_none() {
                last.text.push_str(text);
                return;
            }
        }

        self.runs.push(TextRun {
            text: text.to_string(),
            textdomain: None,
        });
    }

    /// Appends a translatable run bound to `textdomain`.
    pub fn push_translatable(&mut self, text: &str, textdomain: &str) {
        self.runs.push(TextRun {
            text: text.to_string(),
            textdomain: Some(textdomain.to_string()),
        });
    }

    /// Concatenation: the other value's runs are appended in order.
    pub fn append(&mut self, other: &AttributeValue) {
        for run in &other.runs {
            match run.textdomain {
                Some(ref domain) => self.push_translatable(&run.text, domain),
                None => self.push_raw(&run.text),
            }
        }
    }

    /// The untranslated bytes: every run's text, concatenated.
    pub fn raw(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            out.push_str(&run.text);
        }
        out
    }

    /// An attribute whose runs are all empty counts as absent for writers.
    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.text.is_empty())
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    /// Display form: translatable runs go through the translator, plain runs
    /// pass through.
    pub fn translate(&self, translator: &dyn Translator) -> String {
        let mut out = String::new();
        for run in &self.runs {
            match run.textdomain {
                Some(ref domain) => out.push_str(&translator.translate(domain, &run.text)),
                None => out.push_str(&run.text),
            }
        }
        out
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &AttributeValue) -> bool {
        self.raw() == other.raw()
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for run in &self.runs {
            write!(f, "{}", run.text)?;
        }
        Ok(())
    }
}

impl From<&str> for AttributeValue {
    fn from(text: &str) -> AttributeValue {
        let mut value = AttributeValue::new();
        value.push_raw(text);
        value
    }
}

impl From<String> for AttributeValue {
    fn from(text: String) -> AttributeValue {
        AttributeValue::from(text.as_str())
    }
}
