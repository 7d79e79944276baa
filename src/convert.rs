//! Conversion drivers: file → record → tree → file, in both directions.
//!
//! ```no_run
//! use mtzjson::convert::{json_to_mtz, mtz_to_json, ExportOptions, ImportOptions};
//!
//! mtz_to_json("in.mtz", "out.json", &ExportOptions::default())?;
//! json_to_mtz("out.json", "copy.mtz", &ImportOptions::default())?;
//! # Ok::<(), mtzjson::convert::ConvertError>(())
//! ```

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::forward;
use crate::history::stamp_now;
use crate::model::{MissingValue, Mtz};
use crate::mtz::{self, MtzError};
use crate::reverse::{self, StructuralError};

/// Tool names written into provenance stamps.
pub const EXPORT_TOOL: &str = "mtz2json";
pub const IMPORT_TOOL: &str = "json2mtz";

// ── Options ───────────────────────────────────────────────────────────────────

/// Configuration for [`mtz_to_json`].
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Single-line output instead of indented.
    pub compact:    bool,
    pub indent:     usize,
    /// Append a provenance stamp to the history before mapping.
    pub provenance: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            compact:    false,
            indent:     4,
            provenance: true,
        }
    }
}

/// Configuration for [`json_to_mtz`].
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Marker stored for reflections the document leaves unmeasured.
    pub missing:    MissingValue,
    /// Append a provenance stamp to the history after mapping.
    pub provenance: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            missing:    MissingValue::NaN,
            provenance: true,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Cannot read {path}: {source}")]
    ReadInput {
        path:   PathBuf,
        source: io::Error,
    },
    #[error("Cannot parse JSON: {0}")]
    ParseTree(#[from] serde_json::Error),
    #[error("Cannot decode MTZ file: {0}")]
    DecodeMtz(#[source] MtzError),
    #[error("Invalid document: {0}")]
    Structural(#[from] StructuralError),
    #[error("Cannot encode MTZ file: {0}")]
    EncodeMtz(#[source] MtzError),
    #[error("Cannot write {path}: {source}")]
    WriteOutput {
        path:   PathBuf,
        source: io::Error,
    },
}

/// Coarse result reported to command-line callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Bad environment: the input could not be read or decoded.
    InputUnreadable,
    /// Bad data or unwritable output.
    ConversionOrWriteFailed,
}

impl Outcome {
    pub fn of<T>(result: &Result<T, ConvertError>) -> Self {
        match result {
            Ok(_)  => Outcome::Success,
            Err(e) => e.outcome(),
        }
    }

    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::InputUnreadable | Outcome::ConversionOrWriteFailed => 1,
        }
    }
}

impl ConvertError {
    pub fn outcome(&self) -> Outcome {
        match self {
            ConvertError::ReadInput { .. }
            | ConvertError::ParseTree(_)
            | ConvertError::DecodeMtz(_) => Outcome::InputUnreadable,
            ConvertError::Structural(_)
            | ConvertError::EncodeMtz(_)
            | ConvertError::WriteOutput { .. } => Outcome::ConversionOrWriteFailed,
        }
    }
}

// ── In-memory drivers ─────────────────────────────────────────────────────────

/// Map a record to a tree, optionally stamping its history first.
pub fn export_to_tree(mtz: &mut Mtz, provenance: bool) -> Value {
    if provenance {
        mtz.push_history(&stamp_now(EXPORT_TOOL));
    }
    forward::to_tree(mtz)
}

/// Rebuild a record from a tree, stamping its history on success.
pub fn import_from_tree(tree: &Value, options: &ImportOptions) -> Result<Mtz, StructuralError> {
    let mut mtz = reverse::from_tree(tree, options.missing)?;
    if options.provenance {
        mtz.push_history(&stamp_now(IMPORT_TOOL));
    }
    Ok(mtz)
}

/// Serialize `tree` indented by `options.indent` spaces, or on one line.
pub fn write_tree<W: Write>(tree: &Value, writer: W, options: &ExportOptions) -> io::Result<()> {
    if options.compact {
        serde_json::to_writer(writer, tree)?;
    } else {
        let indent = vec![b' '; options.indent];
        let mut ser = Serializer::with_formatter(writer, PrettyFormatter::with_indent(&indent));
        tree.serialize(&mut ser)?;
    }
    Ok(())
}

// ── File drivers ──────────────────────────────────────────────────────────────

pub fn mtz_to_json<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &ExportOptions,
) -> Result<(), ConvertError> {
    let (input, output) = (input.as_ref(), output.as_ref());
    info!(input = %input.display(), output = %output.display(), "converting MTZ to JSON");

    let file = File::open(input).map_err(|source| ConvertError::ReadInput {
        path: input.to_owned(),
        source,
    })?;
    let mut mtz = mtz::read(BufReader::new(file)).map_err(ConvertError::DecodeMtz)?;
    debug!(crystals = mtz.crystals.len(), nref = mtz.nref, "MTZ file read");

    let tree = export_to_tree(&mut mtz, options.provenance);
    drop(mtz);

    let write_err = |source| ConvertError::WriteOutput { path: output.to_owned(), source };
    let text = render_tree(&tree, options).map_err(write_err)?;
    std::fs::write(output, text).map_err(write_err)?;
    Ok(())
}

/// The complete output document, newline-terminated.  Rendered in memory so
/// a serialization failure never leaves a partial file.
pub fn render_tree(tree: &Value, options: &ExportOptions) -> io::Result<Vec<u8>> {
    let mut text = Vec::new();
    write_tree(tree, &mut text, options)?;
    text.push(b'\n');
    Ok(text)
}

pub fn json_to_mtz<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &ImportOptions,
) -> Result<(), ConvertError> {
    let (input, output) = (input.as_ref(), output.as_ref());
    info!(input = %input.display(), output = %output.display(), "converting JSON to MTZ");

    let file = File::open(input).map_err(|source| ConvertError::ReadInput {
        path: input.to_owned(),
        source,
    })?;
    let tree: Value = serde_json::from_reader(BufReader::new(file))?;
    let mtz = import_from_tree(&tree, options)?;
    drop(tree);
    debug!(crystals = mtz.crystals.len(), nref = mtz.nref, "record rebuilt");

    // Render in memory so a failed encode never leaves a partial file.
    let mut bytes = Vec::new();
    mtz::write(&mtz, &mut bytes).map_err(ConvertError::EncodeMtz)?;
    std::fs::write(output, bytes).map_err(|source| ConvertError::WriteOutput {
        path: output.to_owned(),
        source,
    })?;
    Ok(())
}
