//! Parser registry
//!
//! Pure lookup from file extension to parser constructor. Built-in parsers
//! are registered when the registry is constructed; afterwards the table only
//! changes through an explicit [`register`](ParserRegistry::register) call
//! (tests, extensions), so shared instances are safe for concurrent reads.

use std::collections::{BTreeSet, HashMap};

use tabfeed_common::types::ImportRequest;
use tabfeed_common::{Result, TabfeedError};

use super::{DelimitedParser, RowSource, SheetParser};

/// Constructs a parser bound to the request's file.
pub type ParserFactory = fn(&ImportRequest) -> Result<Box<dyn RowSource>>;

/// Extension-keyed table of parser constructors.
pub struct ParserRegistry {
    parsers: HashMap<String, ParserFactory>,
}

impl ParserRegistry {
    /// An empty registry; useful for tests that bring their own parsers.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// The registry with every built-in parser registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(DelimitedParser::EXTENSIONS, open_delimited);
        registry.register(SheetParser::EXTENSIONS, open_sheet);
        registry
    }

    /// Register `factory` for the given extensions (leading dot included).
    pub fn register(&mut self, extensions: &[&str], factory: ParserFactory) {
        for extension in extensions {
            self.parsers.insert(extension.to_lowercase(), factory);
        }
    }

    /// Construct the parser registered for the extension of the request's
    /// original file name.
    pub fn open_for(&self, request: &ImportRequest) -> Result<Box<dyn RowSource>> {
        let extension = extension_of(&request.file_name)?;

        match self.parsers.get(&extension) {
            Some(factory) => factory(request),
            None => Err(TabfeedError::UnsupportedFileType(extension)),
        }
    }

    /// Registered extensions, for display by the front end.
    pub fn supported_extensions(&self) -> BTreeSet<String> {
        self.parsers.keys().cloned().collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// The substring from the last `.` on, lowercased. A name without an
/// extension (or nothing but an extension) cannot select a parser.
fn extension_of(file_name: &str) -> Result<String> {
    match file_name.rfind('.') {
        Some(position) if position > 0 => Ok(file_name[position..].to_lowercase()),
        _ => Err(TabfeedError::InvalidFileName(file_name.to_string())),
    }
}

fn open_delimited(request: &ImportRequest) -> Result<Box<dyn RowSource>> {
    Ok(Box::new(DelimitedParser::open(
        &request.path,
        request.header_offset,
    )?))
}

fn open_sheet(request: &ImportRequest) -> Result<Box<dyn RowSource>> {
    Ok(Box::new(SheetParser::open(
        &request.path,
        request.header_offset,
        &request.file_name,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(file_name: &str) -> ImportRequest {
        ImportRequest::new("/nonexistent/path", file_name, "test-index")
    }

    #[test]
    fn lists_builtin_extensions() {
        let registry = ParserRegistry::with_builtins();
        let extensions = registry.supported_extensions();

        assert!(extensions.contains(".csv"));
        assert!(extensions.contains(".xlsx"));
        assert!(extensions.contains(".xls"));
    }

    #[test]
    fn missing_extension_is_invalid() {
        let registry = ParserRegistry::with_builtins();
        let error = registry.open_for(&request("file")).expect_err("no extension");
        assert!(matches!(error, TabfeedError::InvalidFileName(_)));

        let error = registry.open_for(&request(".csv")).expect_err("only extension");
        assert!(matches!(error, TabfeedError::InvalidFileName(_)));
    }

    #[test]
    fn unregistered_extension_is_unsupported() {
        let registry = ParserRegistry::with_builtins();
        let error = registry.open_for(&request("file.xxx")).expect_err("no parser");
        assert!(matches!(error, TabfeedError::UnsupportedFileType(ext) if ext == ".xxx"));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let registry = ParserRegistry::with_builtins();
        // reaches the delimited parser, which then fails on the missing file.
        let error = registry.open_for(&request("DATA.CSV")).expect_err("no file");
        assert!(matches!(error, TabfeedError::FileNotFound(_)));
    }

    #[test]
    fn explicit_registration_extends_the_table() {
        let mut registry = ParserRegistry::empty();
        registry.register(&[".tsv"], |_request| {
            Err(TabfeedError::UnsupportedFileType("stub".to_string()))
        });

        assert!(registry.supported_extensions().contains(".tsv"));
        let error = registry.open_for(&request("data.tsv")).expect_err("stub");
        assert!(matches!(error, TabfeedError::UnsupportedFileType(_)));
    }
}
