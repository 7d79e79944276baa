//! Tree → record mapping.
//!
//! The incoming tree is untrusted.  Reconstruction runs in four passes:
//!
//! 1. **Measure** ([`Layout::measure`]): walk Crystals → Datasets → Columns →
//!    Data and record every count.  Any container that is absent, empty or of
//!    the wrong kind aborts with a [`StructuralError`].
//! 2. **Check** ([`Layout::reflection_count`]): the reflection count of the
//!    first column is authoritative; every other column must match it.
//! 3. **Allocate**: a record sized exactly to the measured layout, every
//!    column slot pre-filled with the missing-value marker.
//! 4. **Populate**: copy each field whose key exists and whose dynamic type
//!    (and shape, for arrays) matches.  Anything else leaves the allocator's
//!    default in place.
//!
//! Passes 1 and 2 only read, so malformed input is rejected before any
//! record exists.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

use crate::model::{
    bounded, Batch, Column, Crystal, Dataset, MissingValue, Mtz, Symmetry, AXIS_LABEL_LEN,
    COLUMN_SOURCE_LEN, GROUP_NAME_LEN, GROUP_TYPE_LEN, LABEL_LEN, MAX_SORT_COLUMNS, MAX_SYMOPS,
    NAME_LEN, POINT_GROUP_NAME_LEN, RECORD_LEN, SPACE_GROUP_NAME_LEN, TITLE_LEN, TYPE_LEN,
};
use crate::shape::{check_dimensions_with, is_array_of, Homogeneous, Kind};

// ── Errors ────────────────────────────────────────────────────────────────────

/// A container-level defect that makes the whole document unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("document root must be an object, found {0}")]
    NotAnObject(&'static str),
    #[error("required key `{0}` is missing")]
    MissingKey(String),
    #[error("`{path}` must be {expected}, found {found}")]
    WrongKind {
        path:     String,
        expected: &'static str,
        found:    &'static str,
    },
    #[error("`{0}` must not be empty")]
    Empty(String),
    #[error("`{0}` must contain only objects")]
    NotHomogeneous(String),
    #[error("`{path}` holds {found} reflections but the first column holds {expected}")]
    ReflectionCount {
        path:     String,
        expected: usize,
        found:    usize,
    },
}

// ── Pass 1/2: measurement ─────────────────────────────────────────────────────

/// Container sizes discovered by walking the tree: per crystal, per dataset,
/// the reflection count of each column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub crystals: Vec<Vec<Vec<usize>>>,
}

impl Layout {
    /// Measure the `Crystals` array.  Read-only.
    pub fn measure(crystals: &Value) -> Result<Self, StructuralError> {
        let crystals = object_array(crystals, "Crystals")?;
        let mut layout = Vec::with_capacity(crystals.len());

        for (x, crystal) in crystals.iter().enumerate() {
            let path = format!("Crystals[{x}].Datasets");
            let datasets = object_array(child(crystal, "Datasets", &path)?, &path)?;
            let mut sets = Vec::with_capacity(datasets.len());

            for (d, dataset) in datasets.iter().enumerate() {
                let path = format!("Crystals[{x}].Datasets[{d}].Columns");
                let columns = object_array(child(dataset, "Columns", &path)?, &path)?;
                let mut lengths = Vec::with_capacity(columns.len());

                for (c, column) in columns.iter().enumerate() {
                    let path = format!("Crystals[{x}].Datasets[{d}].Columns[{c}].Data");
                    let data = child(column, "Data", &path)?;
                    match data {
                        Value::Array(items) => lengths.push(items.len()),
                        other => return Err(wrong_kind(&path, Kind::Array, other)),
                    }
                }
                sets.push(lengths);
            }
            layout.push(sets);
        }
        Ok(Layout { crystals: layout })
    }

    /// The single reflection count shared by every column.
    pub fn reflection_count(&self) -> Result<usize, StructuralError> {
        let mut nref = None;
        for (x, datasets) in self.crystals.iter().enumerate() {
            for (d, columns) in datasets.iter().enumerate() {
                for (c, &len) in columns.iter().enumerate() {
                    match nref {
                        None => nref = Some(len),
                        Some(expected) if expected != len => {
                            return Err(StructuralError::ReflectionCount {
                                path: format!("Crystals[{x}].Datasets[{d}].Columns[{c}].Data"),
                                expected,
                                found: len,
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
        }
        // measure() guarantees at least one column.
        Ok(nref.unwrap_or(0))
    }

    pub fn dataset_counts(&self) -> Vec<usize> {
        self.crystals.iter().map(Vec::len).collect()
    }
}

fn object_array<'a>(value: &'a Value, path: &str) -> Result<&'a [Value], StructuralError> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(wrong_kind(path, Kind::Array, other)),
    };
    if items.is_empty() {
        return Err(StructuralError::Empty(path.to_owned()));
    }
    if !Homogeneous::Object.accepts(items) {
        return Err(StructuralError::NotHomogeneous(path.to_owned()));
    }
    Ok(items)
}

fn child<'a>(object: &'a Value, key: &str, path: &str) -> Result<&'a Value, StructuralError> {
    object
        .get(key)
        .ok_or_else(|| StructuralError::MissingKey(path.to_owned()))
}

fn wrong_kind(path: &str, expected: Kind, found: &Value) -> StructuralError {
    StructuralError::WrongKind {
        path:     path.to_owned(),
        expected: expected.describe(),
        found:    Kind::of(found).describe(),
    }
}

fn required<'a>(
    root: &'a Map<String, Value>,
    key: &str,
    kind: Kind,
) -> Result<&'a Value, StructuralError> {
    let value = root
        .get(key)
        .ok_or_else(|| StructuralError::MissingKey(key.to_owned()))?;
    if Kind::of(value) != kind {
        return Err(wrong_kind(key, kind, value));
    }
    Ok(value)
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Rebuild a record from `tree`.
///
/// Unmeasured reflections (the `"NaN"` token, or any non-numeric Data item)
/// are left holding `missing.marker()`.
pub fn from_tree(tree: &Value, missing: MissingValue) -> Result<Mtz, StructuralError> {
    let root = match tree {
        Value::Object(map) => map,
        other => return Err(StructuralError::NotAnObject(Kind::of(other).describe())),
    };

    let title    = required(root, "Title", Kind::String)?;
    let history  = required(root, "History", Kind::Array)?;
    let crystals = required(root, "Crystals", Kind::Array)?;
    let symmetry = required(root, "Symmetry", Kind::Object)?;
    let batches  = required(root, "Batches", Kind::Array)?;
    let sort_order      = root.get("SortOrder").filter(|v| !v.is_null());
    let unknown_headers = root.get("UnknownHeaders").filter(|v| !v.is_null());

    let layout = Layout::measure(crystals)?;
    let nref = layout.reflection_count()?;
    debug!(
        crystals = layout.crystals.len(),
        columns = layout.crystals.iter().flatten().map(Vec::len).sum::<usize>(),
        nref,
        "tree layout measured"
    );

    // ── Allocation: the only mutation boundary ──────────────────────────────
    let mut mtz = Mtz::allocate(&layout.dataset_counts(), missing);
    mtz.nref = nref;
    for (crystal, sets) in mtz.crystals.iter_mut().zip(&layout.crystals) {
        for (dataset, lengths) in crystal.datasets.iter_mut().zip(sets) {
            dataset.allocate_columns(lengths.len(), nref, missing);
        }
    }

    // ── Population ──────────────────────────────────────────────────────────
    if let Some(title) = title.as_str() {
        mtz.title = bounded(title, TITLE_LEN);
    }
    if is_array_of(history, Homogeneous::String) {
        mtz.history = strings(history, RECORD_LEN);
    } else {
        trace!("History is not an array of strings, left empty");
    }
    if let Value::Object(fields) = symmetry {
        populate_symmetry(&mut mtz.symmetry, &Fields::new(fields, "Symmetry"));
    }
    match batches {
        Value::Array(items) if Homogeneous::Object.accepts(items) => {
            mtz.batches = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| item.as_object().map(|f| (i, f)))
                .map(|(i, fields)| {
                    let mut batch = Batch::default();
                    populate_batch(&mut batch, &Fields::new(fields, &format!("Batches[{i}]")));
                    batch
                })
                .collect();
            debug!(batches = mtz.batches.len(), "batches populated");
        }
        _ => trace!("Batches is not an array of objects, left empty"),
    }
    if let Value::Array(items) = crystals {
        for (x, (crystal, item)) in mtz.crystals.iter_mut().zip(items).enumerate() {
            if let Value::Object(fields) = item {
                populate_crystal(crystal, &Fields::new(fields, &format!("Crystals[{x}]")));
            }
        }
    }
    match sort_order {
        Some(Value::Array(ids)) if Homogeneous::Integer.accepts(ids) => {
            for (slot, id) in ids.iter().take(MAX_SORT_COLUMNS).enumerate() {
                mtz.sort_order[slot] = integer_of(id).and_then(|id| mtz.find_column_by_source(id));
            }
        }
        Some(_) => trace!("SortOrder is not an array of integers, left empty"),
        None => {}
    }
    match unknown_headers {
        Some(value) if is_array_of(value, Homogeneous::String) => {
            mtz.unknown_headers = strings(value, RECORD_LEN);
        }
        Some(_) => trace!("UnknownHeaders is not an array of strings, left empty"),
        None => {}
    }

    Ok(mtz)
}

// ── Per-entity population ─────────────────────────────────────────────────────

fn populate_crystal(crystal: &mut Crystal, f: &Fields) {
    f.string("CrystalName", NAME_LEN, &mut crystal.name);
    f.string("ProjectName", NAME_LEN, &mut crystal.project);
    f.integer("CrystalID", &mut crystal.id);
    f.reals("CellConstants", &mut crystal.cell);
    f.real("ResolutionMin", &mut crystal.resolution_min);
    f.real("ResolutionMax", &mut crystal.resolution_max);

    let Some(Value::Array(items)) = f.get("Datasets") else {
        return;
    };
    for (d, (dataset, item)) in crystal.datasets.iter_mut().zip(items).enumerate() {
        if let Value::Object(fields) = item {
            populate_dataset(dataset, &Fields::new(fields, &format!("{}.Datasets[{d}]", f.path)));
        }
    }
}

fn populate_dataset(dataset: &mut Dataset, f: &Fields) {
    f.string("DatasetName", NAME_LEN, &mut dataset.name);
    f.integer("DatasetID", &mut dataset.id);
    f.real("Wavelength", &mut dataset.wavelength);

    let Some(Value::Array(items)) = f.get("Columns") else {
        return;
    };
    for (c, (column, item)) in dataset.columns.iter_mut().zip(items).enumerate() {
        if let Value::Object(fields) = item {
            populate_column(column, &Fields::new(fields, &format!("{}.Columns[{c}]", f.path)));
        }
    }
}

fn populate_column(column: &mut Column, f: &Fields) {
    f.string("ColumnSource", COLUMN_SOURCE_LEN, &mut column.column_source);
    f.string("GroupName", GROUP_NAME_LEN, &mut column.group_name);
    f.string("Label", LABEL_LEN, &mut column.label);
    f.string("Type", TYPE_LEN, &mut column.kind);
    f.string("GroupType", GROUP_TYPE_LEN, &mut column.group_type);
    f.integer("ColumnID", &mut column.source);
    f.integer("GroupPosition", &mut column.group_position);
    f.real("MinValue", &mut column.min);
    f.real("MaxValue", &mut column.max);

    let Some(Value::Array(items)) = f.get("Data") else {
        return;
    };
    // Numeric items are copied; the missing token and anything else keeps
    // the pre-filled marker.
    for (slot, item) in column.data.iter_mut().zip(items) {
        match (Kind::of(item), item.as_f64()) {
            (Kind::Real | Kind::Integer, Some(v)) => *slot = v as f32,
            _ => {}
        }
    }
}

fn populate_symmetry(symmetry: &mut Symmetry, f: &Fields) {
    f.integer("SpaceGroupNumber", &mut symmetry.space_group_number);
    f.string("SpaceGroupName", SPACE_GROUP_NAME_LEN, &mut symmetry.space_group_name);
    f.string("PointGroupName", POINT_GROUP_NAME_LEN, &mut symmetry.point_group_name);
    f.character("SpaceGroupConfidence", &mut symmetry.confidence);
    f.integer("NumberOfSymmetryOperations", &mut symmetry.nsym);
    f.integer("NumberOfPrimitiveSymmetryOperations", &mut symmetry.nsymp);
    f.character("LatticeType", &mut symmetry.lattice_type);

    match f.get("SymmetryOperations") {
        Some(v) if check_dimensions_with(v, &[MAX_SYMOPS, 4, 4], Homogeneous::Real) => {
            let slots = symmetry.operations.iter_mut().flatten().flatten();
            for (slot, leaf) in slots.zip(real_leaves(v)) {
                *slot = leaf;
            }
        }
        _ => f.skipped("SymmetryOperations"),
    }
}

fn populate_batch(batch: &mut Batch, f: &Fields) {
    f.string("Title", TITLE_LEN, &mut batch.title);
    f.integer("DatasetID", &mut batch.dataset_id);
    f.integer("CrystalNumber", &mut batch.crystal_number);
    f.integer("BatchNumber", &mut batch.number);
    f.real("Wavelength", &mut batch.wavelength);
    f.real("TemperatureFactor", &mut batch.temperature_factor);
    f.real("Scale", &mut batch.scale);
    f.real("Dispersion", &mut batch.dispersion);
    f.real("CorrelatedComponent", &mut batch.correlated_component);
    f.real("HorizontalBeamDivergence", &mut batch.horizontal_divergence);
    f.real("VerticalBeamDivergence", &mut batch.vertical_divergence);
    f.integer("OrientationBlockType", &mut batch.orientation_block_type);
    f.integer("GoniostatScanAxisNumber", &mut batch.scan_axis_number);
    f.integer("JumpAxis", &mut batch.jump_axis);
    f.integer("BeamInfoFlag", &mut batch.beam_info_flag);
    f.integer("MosaicityModelFlag", &mut batch.mosaicity_model_flag);
    f.integer("DataTypeFlag", &mut batch.data_type_flag);
    f.integer("MisFlag", &mut batch.mis_flag);
    f.integer("NumberOfBatchScales", &mut batch.batch_scale_count);
    f.integer("NumberOfDetectors", &mut batch.detector_count);
    f.integer("NumberOfGoniostatAxes", &mut batch.goniostat_axis_count);
    f.real("EndOfPhi", &mut batch.phi_end);
    f.real("PhiRange", &mut batch.phi_range);
    f.real("StartOfPhi", &mut batch.phi_start);
    f.real("BFactorSD", &mut batch.b_factor_sd);
    f.real("BScaleSD", &mut batch.b_scale_sd);
    f.real("StartTime", &mut batch.time_start);
    f.real("StopTime", &mut batch.time_stop);

    f.reals("CellDimensions", &mut batch.cell);
    f.reals("OrientationMatrix", &mut batch.orientation);
    f.reals("Mosaicity", &mut batch.mosaicity);
    f.reals("GoniostatDatum", &mut batch.datum);
    f.reals("DetectorDistance", &mut batch.detector_distance);
    f.reals("Vector1", &mut batch.e1);
    f.reals("Vector2", &mut batch.e2);
    f.reals("Vector3", &mut batch.e3);
    f.reals("RotationAxis", &mut batch.rotation_axis);
    f.reals("SourceVector", &mut batch.source_vector);
    f.reals("IdealisedSourceVector", &mut batch.ideal_source_vector);
    f.reals("Theta", &mut batch.theta);
    f.integers("CellRefinementFlags", &mut batch.cell_refinement_flags);
    f.strings("AxesLabels", AXIS_LABEL_LEN, &mut batch.axis_labels);

    match f.get("MissettingAngles") {
        Some(v) if check_dimensions_with(v, &[2, 3], Homogeneous::Real) => {
            let slots = batch.missetting_angles.iter_mut().flatten();
            for (slot, leaf) in slots.zip(real_leaves(v)) {
                *slot = leaf;
            }
        }
        _ => f.skipped("MissettingAngles"),
    }
    match f.get("DetectorLimits") {
        Some(v) if check_dimensions_with(v, &[2, 2, 2], Homogeneous::Real) => {
            let slots = batch.detector_limits.iter_mut().flatten().flatten();
            for (slot, leaf) in slots.zip(real_leaves(v)) {
                *slot = leaf;
            }
        }
        _ => f.skipped("DetectorLimits"),
    }
}

// ── Field access ──────────────────────────────────────────────────────────────

/// Typed, best-effort reads from one tree object.  Every setter copies only
/// when the key exists and its value has exactly the expected kind and
/// shape; otherwise the target keeps its current value.
struct Fields<'a> {
    map:  &'a Map<String, Value>,
    path: String,
}

impl<'a> Fields<'a> {
    fn new(map: &'a Map<String, Value>, path: &str) -> Self {
        Self { map, path: path.to_owned() }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    fn skipped(&self, key: &str) {
        trace!(path = %self.path, key, "field absent or mistyped, default kept");
    }

    fn string(&self, key: &str, width: usize, out: &mut String) {
        match self.get(key) {
            Some(Value::String(s)) => *out = bounded(s, width),
            _ => self.skipped(key),
        }
    }

    fn character(&self, key: &str, out: &mut char) {
        match self.get(key).and_then(Value::as_str).and_then(|s| s.chars().next()) {
            Some(c) => *out = c,
            None => self.skipped(key),
        }
    }

    fn integer(&self, key: &str, out: &mut i32) {
        match self.get(key).and_then(integer_of) {
            Some(v) => *out = v,
            None => self.skipped(key),
        }
    }

    fn real(&self, key: &str, out: &mut f32) {
        match self.get(key).and_then(real_of) {
            Some(v) => *out = v,
            None => self.skipped(key),
        }
    }

    fn reals<const N: usize>(&self, key: &str, out: &mut [f32; N]) {
        match self.get(key) {
            Some(v) if check_dimensions_with(v, &[N], Homogeneous::Real) => {
                for (slot, leaf) in out.iter_mut().zip(real_leaves(v)) {
                    *slot = leaf;
                }
            }
            _ => self.skipped(key),
        }
    }

    fn integers<const N: usize>(&self, key: &str, out: &mut [i32; N]) {
        // An out-of-range item rejects the whole field.
        let values: Option<Vec<i32>> = match self.get(key) {
            Some(v) if check_dimensions_with(v, &[N], Homogeneous::Integer) => {
                v.as_array().into_iter().flatten().map(integer_of).collect()
            }
            _ => None,
        };
        match values {
            Some(values) if values.len() == N => out.copy_from_slice(&values),
            _ => self.skipped(key),
        }
    }

    fn strings<const N: usize>(&self, key: &str, width: usize, out: &mut [String; N]) {
        match self.get(key) {
            Some(v) if check_dimensions_with(v, &[N], Homogeneous::String) => {
                let items = v.as_array().into_iter().flatten();
                for (slot, item) in out.iter_mut().zip(items) {
                    if let Some(s) = item.as_str() {
                        *slot = bounded(s, width);
                    }
                }
            }
            _ => self.skipped(key),
        }
    }
}

fn integer_of(value: &Value) -> Option<i32> {
    match Kind::of(value) {
        Kind::Integer => value.as_i64().and_then(|v| i32::try_from(v).ok()),
        _ => None,
    }
}

fn real_of(value: &Value) -> Option<f32> {
    match Kind::of(value) {
        Kind::Real => value.as_f64().map(|v| v as f32),
        _ => None,
    }
}

/// Real leaves of a validated nested array, in row-major order.
fn real_leaves(value: &Value) -> Vec<f32> {
    let mut out = Vec::new();
    collect_reals(value, &mut out);
    out
}

fn collect_reals(value: &Value, out: &mut Vec<f32>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_reals(item, out)),
        leaf => out.extend(real_of(leaf)),
    }
}

fn strings(value: &Value, width: usize) -> Vec<String> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(|s| bounded(s, width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::to_tree;
    use crate::model::ColumnRef;
    use serde_json::json;

    fn column(id: i32, label: &str, data: Value) -> Value {
        json!({ "ColumnID": id, "Label": label, "Type": "F", "Data": data })
    }

    fn document(columns: Vec<Value>) -> Value {
        json!({
            "Title": "test",
            "History": [],
            "Crystals": [{
                "CrystalName": "xtal",
                "CellConstants": [10.0, 20.0, 30.0, 90.0, 90.0, 90.0],
                "Datasets": [{ "DatasetName": "native", "DatasetID": 1, "Columns": columns }],
            }],
            "Symmetry": {},
            "Batches": [],
            "SortOrder": null,
        })
    }

    #[test]
    fn end_to_end_missing_token() {
        let tree = document(vec![
            column(1, "F", json!([1.0, "NaN", 3.0])),
            column(2, "SIGF", json!([4.0, 5.0, 6.0])),
        ]);
        let mtz = from_tree(&tree, MissingValue::NaN).unwrap();
        assert_eq!(mtz.nref, 3);
        let data = &mtz.crystals[0].datasets[0].columns[0].data;
        assert_eq!(data[0], 1.0);
        assert!(data[1].is_nan());
        assert_eq!(data[2], 3.0);

        let back = to_tree(&mtz);
        let columns = &back["Crystals"][0]["Datasets"][0]["Columns"];
        assert_eq!(columns[0]["Data"], json!([1.0, "NaN", 3.0]));
        assert_eq!(columns[1]["Data"], json!([4.0, 5.0, 6.0]));
    }

    #[test]
    fn reflection_count_mismatch_is_structural() {
        let ten: Vec<f64> = (0..10).map(f64::from).collect();
        let eleven: Vec<f64> = (0..11).map(f64::from).collect();
        let tree = document(vec![column(1, "A", json!(ten)), column(2, "B", json!(eleven))]);
        let err = from_tree(&tree, MissingValue::NaN).unwrap_err();
        assert_eq!(
            err,
            StructuralError::ReflectionCount {
                path:     "Crystals[0].Datasets[0].Columns[1].Data".into(),
                expected: 10,
                found:    11,
            }
        );
    }

    #[test]
    fn missing_marker_is_configurable() {
        let tree = document(vec![column(1, "F", json!([1.0, "NaN", "junk"]))]);
        let mtz = from_tree(&tree, MissingValue::Value(-999.0)).unwrap();
        assert_eq!(mtz.crystals[0].datasets[0].columns[0].data, vec![1.0, -999.0, -999.0]);
    }

    #[test]
    fn integer_data_items_are_numeric() {
        let tree = document(vec![column(1, "H", json!([1, 2, 3]))]);
        let mtz = from_tree(&tree, MissingValue::NaN).unwrap();
        assert_eq!(mtz.crystals[0].datasets[0].columns[0].data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn required_keys() {
        let mut tree = document(vec![column(1, "F", json!([1.0]))]);
        tree.as_object_mut().unwrap().remove("Symmetry");
        assert_eq!(
            from_tree(&tree, MissingValue::NaN).unwrap_err(),
            StructuralError::MissingKey("Symmetry".into())
        );

        let mut tree = document(vec![column(1, "F", json!([1.0]))]);
        tree["Title"] = json!(7);
        assert!(matches!(
            from_tree(&tree, MissingValue::NaN),
            Err(StructuralError::WrongKind { .. })
        ));

        assert_eq!(
            from_tree(&json!([]), MissingValue::NaN).unwrap_err(),
            StructuralError::NotAnObject("an array")
        );
    }

    #[test]
    fn containers_must_be_non_empty_objects() {
        let mut tree = document(vec![]);
        assert_eq!(
            from_tree(&tree, MissingValue::NaN).unwrap_err(),
            StructuralError::Empty("Crystals[0].Datasets[0].Columns".into())
        );

        tree["Crystals"] = json!([{ "Datasets": [] }, 3]);
        assert_eq!(
            from_tree(&tree, MissingValue::NaN).unwrap_err(),
            StructuralError::NotHomogeneous("Crystals".into())
        );

        tree["Crystals"] = json!([{ "CrystalName": "no datasets" }]);
        assert_eq!(
            from_tree(&tree, MissingValue::NaN).unwrap_err(),
            StructuralError::MissingKey("Crystals[0].Datasets".into())
        );

        let tree = document(vec![column(1, "F", json!({ "not": "an array" }))]);
        assert!(matches!(
            from_tree(&tree, MissingValue::NaN),
            Err(StructuralError::WrongKind { .. })
        ));
    }

    #[test]
    fn mistyped_fields_keep_defaults() {
        let mut tree = document(vec![column(1, "F", json!([1.0]))]);
        tree["Crystals"][0]["CellConstants"] = json!([10, 20, 30, 90, 90, 90]);
        tree["Crystals"][0]["Datasets"][0]["DatasetID"] = json!("one");
        tree["Crystals"][0]["Datasets"][0]["Wavelength"] = json!(1);
        let mtz = from_tree(&tree, MissingValue::NaN).unwrap();
        assert_eq!(mtz.crystals[0].cell, [0.0; 6]);
        assert_eq!(mtz.crystals[0].datasets[0].id, 0);
        assert_eq!(mtz.crystals[0].datasets[0].wavelength, 0.0);
        assert_eq!(mtz.crystals[0].name, "xtal");
    }

    #[test]
    fn batch_fields_are_shape_checked() {
        let mut tree = document(vec![column(1, "F", json!([1.0]))]);
        tree["Batches"] = json!([{
            "BatchNumber": 12,
            "OrientationBlockType": 3,
            "CellRefinementFlags": [1, 0, 1, 0, 1, 0],
            "AxesLabels": ["PHI", "KAPPA", "OMEGA"],
            "DetectorLimits": [[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0], [7.0, 8.0]]],
            "MissettingAngles": [[1.0, 2.0], [3.0, 4.0]],
            "Theta": [0.5, 1.5],
            "Mosaicity": [0.1],
        }]);
        let mtz = from_tree(&tree, MissingValue::NaN).unwrap();
        let batch = &mtz.batches[0];
        assert_eq!(batch.number, 12);
        assert_eq!(batch.orientation_block_type, 3);
        assert_eq!(batch.cell_refinement_flags, [1, 0, 1, 0, 1, 0]);
        assert_eq!(batch.axis_labels, ["PHI".to_string(), "KAPPA".into(), "OMEGA".into()]);
        assert_eq!(batch.detector_limits[1][1], [7.0, 8.0]);
        assert_eq!(batch.theta, [0.5, 1.5]);
        assert_eq!(batch.missetting_angles, [[0.0; 3]; 2]);
        assert_eq!(batch.mosaicity, [0.0; 12]);
    }

    #[test]
    fn symmetry_and_text_widths() {
        let mut tree = document(vec![column(1, "F", json!([1.0]))]);
        let mut ops = vec![vec![vec![0.0; 4]; 4]; MAX_SYMOPS];
        ops[0] = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
        ];
        tree["Symmetry"] = json!({
            "SpaceGroupNumber": 19,
            "SpaceGroupName": "P 21 21 21 with a far too long name",
            "SpaceGroupConfidence": "",
            "NumberOfSymmetryOperations": 1,
            "SymmetryOperations": ops,
            "LatticeType": "Primitive",
        });
        let mtz = from_tree(&tree, MissingValue::NaN).unwrap();
        let sym = &mtz.symmetry;
        assert_eq!(sym.space_group_number, 19);
        assert_eq!(sym.space_group_name.len(), SPACE_GROUP_NAME_LEN);
        assert_eq!(sym.confidence, 'X');
        assert_eq!(sym.lattice_type, 'P');
        assert_eq!(sym.operations[0][3][3], 1.0);
        assert_eq!(sym.active_operations().len(), 1);
    }

    #[test]
    fn sort_order_resolves_column_ids() {
        let mut tree = document(vec![
            column(7, "H", json!([1.0])),
            column(9, "K", json!([2.0])),
        ]);
        tree["SortOrder"] = json!([9, 7, 42]);
        let mtz = from_tree(&tree, MissingValue::NaN).unwrap();
        assert_eq!(mtz.sort_order[0], Some(ColumnRef { crystal: 0, dataset: 0, column: 1 }));
        assert_eq!(mtz.sort_order[1], Some(ColumnRef { crystal: 0, dataset: 0, column: 0 }));
        assert_eq!(mtz.sort_order[2], None);
    }

    #[test]
    fn measure_is_read_only_and_complete() {
        let crystals = json!([
            { "Datasets": [{ "Columns": [{ "Data": [1, 2] }, { "Data": [3, 4] }] }] },
            { "Datasets": [{ "Columns": [{ "Data": [5, 6] }] }, { "Columns": [{ "Data": [] }] }] },
        ]);
        let layout = Layout::measure(&crystals).unwrap();
        assert_eq!(layout.crystals, vec![vec![vec![2, 2]], vec![vec![2], vec![0]]]);
        assert_eq!(layout.dataset_counts(), vec![1, 2]);
        assert!(matches!(
            layout.reflection_count(),
            Err(StructuralError::ReflectionCount { expected: 2, found: 0, .. })
        ));
    }
}
