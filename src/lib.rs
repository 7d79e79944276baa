pub mod model;
pub mod shape;
pub mod forward;
pub mod reverse;
pub mod history;
pub mod convert;
pub mod mtz;

pub use model::{Batch, Column, ColumnRef, Crystal, Dataset, MissingValue, Mtz, Symmetry};
pub use shape::{check_dimensions, check_dimensions_with, Homogeneous, Kind};
pub use forward::{to_tree, MISSING_TOKEN};
pub use reverse::{from_tree, Layout, StructuralError};
pub use convert::{
    export_to_tree, import_from_tree, json_to_mtz, mtz_to_json, ConvertError, ExportOptions,
    ImportOptions, Outcome,
};
pub use mtz::MtzError;
