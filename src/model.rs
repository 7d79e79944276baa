//! Typed reflection record: crystals → datasets → columns, plus batch
//! headers and space-group symmetry.
//!
//! Every parent owns its children outright; nothing is shared or linked
//! back. A record is built fresh for each conversion, filled by exactly one
//! mapper pass, handed to the opposite-direction writer and dropped.
//!
//! # Invariants
//! - Every [`Column`] in every [`Dataset`] of every [`Crystal`] holds exactly
//!   [`Mtz::nref`] values.
//! - [`Symmetry::operations`] always holds [`MAX_SYMOPS`] matrices; only the
//!   first `nsym` are meaningful.

// ── Field widths ──────────────────────────────────────────────────────────────
//
// Byte widths the binary container reserves for text fields.  Text copied in
// from an untrusted tree is cut to these widths with [`bounded`].

/// Fixed width of one header, history or unknown-header record.
pub const RECORD_LEN:           usize = 80;
pub const TITLE_LEN:            usize = 70;
pub const NAME_LEN:             usize = 64;
pub const LABEL_LEN:            usize = 30;
pub const TYPE_LEN:             usize = 2;
pub const GROUP_NAME_LEN:       usize = 30;
pub const GROUP_TYPE_LEN:       usize = 4;
pub const COLUMN_SOURCE_LEN:    usize = 36;
pub const AXIS_LABEL_LEN:       usize = 8;
pub const SPACE_GROUP_NAME_LEN: usize = 20;
pub const POINT_GROUP_NAME_LEN: usize = 10;

/// Number of sort-order slots in a record.
pub const MAX_SORT_COLUMNS: usize = 5;
/// Number of symmetry-operation matrices a record always carries.
pub const MAX_SYMOPS:       usize = 192;

/// One symmetry operation as an augmented 4×4 matrix (rotation + translation).
pub type SymopMatrix = [[f32; 4]; 4];

/// Truncate `text` to at most `width` bytes without splitting a character.
pub fn bounded(text: &str, width: usize) -> String {
    if text.len() <= width {
        return text.to_owned();
    }
    let mut end = width;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_owned()
}

// ── MissingValue ──────────────────────────────────────────────────────────────

/// Marker for an unmeasured reflection.
///
/// The binary format declares its marker once per file (`VALM`); it is either
/// NaN or a specific float.  The marker is passed around explicitly rather
/// than read from any global state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MissingValue {
    #[default]
    NaN,
    Value(f32),
}

impl MissingValue {
    /// `true` if `value` denotes an unmeasured reflection under this marker.
    #[inline]
    pub fn is_missing(self, value: f32) -> bool {
        match self {
            MissingValue::NaN      => value.is_nan(),
            MissingValue::Value(m) => value == m,
        }
    }

    /// The float written into a column slot that holds no measurement.
    #[inline]
    pub fn marker(self) -> f32 {
        match self {
            MissingValue::NaN      => f32::NAN,
            MissingValue::Value(m) => m,
        }
    }
}

// ── ColumnRef ─────────────────────────────────────────────────────────────────

/// Position of a column inside the crystal/dataset/column hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub crystal: usize,
    pub dataset: usize,
    pub column:  usize,
}

// ── Column ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Column {
    pub label:          String,
    /// Two-character column type, e.g. `H`, `F`, `Q`, `J`.
    pub kind:           String,
    pub group_name:     String,
    pub group_type:     String,
    pub group_position: i32,
    /// Numeric column id; sort order refers to columns by this value.
    pub source:         i32,
    /// Free-text provenance of the column.
    pub column_source:  String,
    pub min:            f32,
    pub max:            f32,
    pub data:           Vec<f32>,
}

impl Column {
    /// A column of `nref` slots, every one holding the missing marker.
    pub fn allocate(nref: usize, missing: MissingValue) -> Self {
        Column {
            data: vec![missing.marker(); nref],
            ..Column::default()
        }
    }
}

// ── Dataset ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub name:       String,
    pub id:         i32,
    pub wavelength: f32,
    pub columns:    Vec<Column>,
}

impl Dataset {
    /// Replace the column list with `count` freshly allocated columns.
    pub fn allocate_columns(&mut self, count: usize, nref: usize, missing: MissingValue) {
        self.columns = (0..count).map(|_| Column::allocate(nref, missing)).collect();
    }
}

// ── Crystal ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Crystal {
    pub name:           String,
    pub project:        String,
    pub id:             i32,
    /// a, b, c, α, β, γ
    pub cell:           [f32; 6],
    pub resolution_min: f32,
    pub resolution_max: f32,
    pub datasets:       Vec<Dataset>,
}

// ── Batch ─────────────────────────────────────────────────────────────────────

/// Per-image orientation and geometry header.  Every shaped field has a
/// fixed, compile-time shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub title:                  String,
    pub number:                 i32,
    pub dataset_id:             i32,
    pub crystal_number:         i32,
    pub wavelength:             f32,
    pub cell:                   [f32; 6],
    /// Orientation matrix U, column-major 3×3.
    pub orientation:            [f32; 9],
    pub temperature_factor:     f32,
    pub scale:                  f32,
    pub mosaicity:              [f32; 12],
    pub datum:                  [f32; 3],
    pub dispersion:             f32,
    pub correlated_component:   f32,
    /// Per detector: [[min x, max x], [min y, max y]].
    pub detector_limits:        [[[f32; 2]; 2]; 2],
    pub horizontal_divergence:  f32,
    pub vertical_divergence:    f32,
    pub detector_distance:      [f32; 2],
    pub e1:                     [f32; 3],
    pub e2:                     [f32; 3],
    pub e3:                     [f32; 3],
    pub axis_labels:            [String; 3],
    pub orientation_block_type: i32,
    pub scan_axis_number:       i32,
    pub jump_axis:              i32,
    pub cell_refinement_flags:  [i32; 6],
    pub beam_info_flag:         i32,
    pub mosaicity_model_flag:   i32,
    pub data_type_flag:         i32,
    pub mis_flag:               i32,
    pub batch_scale_count:      i32,
    pub detector_count:         i32,
    pub goniostat_axis_count:   i32,
    pub phi_start:              f32,
    pub phi_end:                f32,
    pub phi_range:              f32,
    pub missetting_angles:      [[f32; 3]; 2],
    pub rotation_axis:          [f32; 3],
    pub b_factor_sd:            f32,
    pub b_scale_sd:             f32,
    pub source_vector:          [f32; 3],
    pub ideal_source_vector:    [f32; 3],
    pub theta:                  [f32; 2],
    pub time_start:             f32,
    pub time_stop:              f32,
}

// ── Symmetry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Symmetry {
    pub space_group_number: i32,
    pub space_group_name:   String,
    pub point_group_name:   String,
    pub confidence:         char,
    pub nsym:               i32,
    pub nsymp:              i32,
    pub operations:         Box<[SymopMatrix; MAX_SYMOPS]>,
    pub lattice_type:       char,
}

impl Default for Symmetry {
    fn default() -> Self {
        Self {
            space_group_number: 0,
            space_group_name:   String::new(),
            point_group_name:   String::new(),
            confidence:         'X',
            nsym:               0,
            nsymp:              0,
            operations:         Box::new([[[0.0; 4]; 4]; MAX_SYMOPS]),
            lattice_type:       'P',
        }
    }
}

impl Symmetry {
    /// The meaningful operations, `nsym` clamped to the table size.
    pub fn active_operations(&self) -> &[SymopMatrix] {
        let n = usize::try_from(self.nsym).unwrap_or(0).min(MAX_SYMOPS);
        &self.operations[..n]
    }
}

// ── Mtz ───────────────────────────────────────────────────────────────────────

/// A whole reflection file held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mtz {
    pub title:           String,
    pub history:         Vec<String>,
    pub crystals:        Vec<Crystal>,
    pub symmetry:        Symmetry,
    pub batches:         Vec<Batch>,
    pub sort_order:      [Option<ColumnRef>; MAX_SORT_COLUMNS],
    /// Raw unknown-header buffer as the binary reader hands it over.
    pub unknown_headers: Vec<String>,
    pub missing:         MissingValue,
    /// Reflection count shared by every column.
    pub nref:            usize,
}

impl Mtz {
    /// Allocate a record with one crystal per entry of `dataset_counts`, each
    /// holding that many empty datasets.  Columns are allocated per dataset
    /// with [`Dataset::allocate_columns`].
    pub fn allocate(dataset_counts: &[usize], missing: MissingValue) -> Self {
        let crystals = dataset_counts
            .iter()
            .map(|&n| Crystal {
                datasets: vec![Dataset::default(); n],
                ..Crystal::default()
            })
            .collect();
        Mtz { crystals, missing, ..Mtz::default() }
    }

    /// Every column in hierarchy order.
    pub fn columns(&self) -> impl Iterator<Item = (ColumnRef, &Column)> + '_ {
        self.crystals.iter().enumerate().flat_map(|(x, crystal)| {
            crystal.datasets.iter().enumerate().flat_map(move |(d, dataset)| {
                dataset.columns.iter().enumerate().map(move |(c, column)| {
                    (ColumnRef { crystal: x, dataset: d, column: c }, column)
                })
            })
        })
    }

    pub fn column(&self, at: ColumnRef) -> Option<&Column> {
        self.crystals
            .get(at.crystal)?
            .datasets
            .get(at.dataset)?
            .columns
            .get(at.column)
    }

    pub fn column_count(&self) -> usize {
        self.columns().count()
    }

    /// First column, in hierarchy order, whose id equals `source`.
    pub fn find_column_by_source(&self, source: i32) -> Option<ColumnRef> {
        self.columns()
            .find(|(_, column)| column.source == source)
            .map(|(at, _)| at)
    }

    /// Append one history record, cut to [`RECORD_LEN`].
    pub fn push_history(&mut self, line: &str) {
        self.history.push(bounded(line, RECORD_LEN));
    }
}
