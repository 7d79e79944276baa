//! Record → tree mapping.
//!
//! Emits one object per entity with a fixed, fully enumerated key set, in
//! the key order the document format defines.  Unmeasured reflections become
//! the [`MISSING_TOKEN`] string.  Mapping never fails.

use serde_json::{json, Value};

use crate::history::trim_record;
use crate::model::{Batch, Column, Crystal, Dataset, MissingValue, Mtz, Symmetry};

/// Tree token standing in for an unmeasured reflection.
pub const MISSING_TOKEN: &str = "NaN";

/// Map a whole record.
///
/// The unknown-header buffer is halved: the binary reader hands over every
/// logical line twice, so only the first `len / 2` lines are emitted.
pub fn to_tree(mtz: &Mtz) -> Value {
    let crystals: Vec<Value> = mtz
        .crystals
        .iter()
        .map(|crystal| crystal_to_tree(crystal, mtz.nref, mtz.missing))
        .collect();
    let batches: Vec<Value> = mtz.batches.iter().map(batch_to_tree).collect();
    let history: Vec<Value> = mtz
        .history
        .iter()
        .map(|line| Value::from(trim_record(line)))
        .collect();
    let sort_order: Vec<Value> = mtz
        .sort_order
        .iter()
        .flatten()
        .filter_map(|&at| mtz.column(at))
        .map(|column| Value::from(column.source))
        .collect();
    let logical = mtz.unknown_headers.len() / 2;
    let unknown_headers: Vec<Value> = mtz.unknown_headers[..logical]
        .iter()
        .map(|line| Value::from(trim_record(line)))
        .collect();

    json!({
        "Title":          mtz.title,
        "History":        history,
        "Crystals":       crystals,
        "Symmetry":       symmetry_to_tree(&mtz.symmetry),
        "Batches":        batches,
        "SortOrder":      sort_order,
        "UnknownHeaders": unknown_headers,
    })
}

pub fn crystal_to_tree(crystal: &Crystal, nref: usize, missing: MissingValue) -> Value {
    let datasets: Vec<Value> = crystal
        .datasets
        .iter()
        .map(|dataset| dataset_to_tree(dataset, nref, missing))
        .collect();
    json!({
        "CrystalName":   crystal.name,
        "CrystalID":     crystal.id,
        "CellConstants": reals(&crystal.cell),
        "ProjectName":   crystal.project,
        "ResolutionMax": real(crystal.resolution_max),
        "ResolutionMin": real(crystal.resolution_min),
        "Datasets":      datasets,
    })
}

pub fn dataset_to_tree(dataset: &Dataset, nref: usize, missing: MissingValue) -> Value {
    let columns: Vec<Value> = dataset
        .columns
        .iter()
        .map(|column| column_to_tree(column, nref, missing))
        .collect();
    json!({
        "DatasetName": dataset.name,
        "DatasetID":   dataset.id,
        "Wavelength":  real(dataset.wavelength),
        "Columns":     columns,
    })
}

pub fn column_to_tree(column: &Column, nref: usize, missing: MissingValue) -> Value {
    let data: Vec<Value> = column
        .data
        .iter()
        .take(nref)
        .map(|&v| {
            if missing.is_missing(v) {
                Value::from(MISSING_TOKEN)
            } else {
                real(v)
            }
        })
        .collect();
    json!({
        "ColumnSource":  column.column_source,
        "GroupName":     column.group_name,
        "GroupPosition": column.group_position,
        "GroupType":     column.group_type,
        "Label":         column.label,
        "MaxValue":      real(column.max),
        "MinValue":      real(column.min),
        "ColumnID":      column.source,
        "Type":          column.kind,
        "Data":          data,
    })
}

pub fn symmetry_to_tree(symmetry: &Symmetry) -> Value {
    let operations: Vec<Value> = symmetry
        .operations
        .iter()
        .map(|m| Value::from(m.iter().map(|row| reals(row)).collect::<Vec<_>>()))
        .collect();
    json!({
        "SpaceGroupNumber":                    symmetry.space_group_number,
        "SpaceGroupName":                      symmetry.space_group_name,
        "PointGroupName":                      symmetry.point_group_name,
        "SpaceGroupConfidence":                symmetry.confidence.to_string(),
        "NumberOfSymmetryOperations":          symmetry.nsym,
        "NumberOfPrimitiveSymmetryOperations": symmetry.nsymp,
        "SymmetryOperations":                  operations,
        "LatticeType":                         symmetry.lattice_type.to_string(),
    })
}

pub fn batch_to_tree(batch: &Batch) -> Value {
    let detector_limits: Vec<Value> = batch
        .detector_limits
        .iter()
        .map(|d| Value::from(d.iter().map(|row| reals(row)).collect::<Vec<_>>()))
        .collect();
    let missetting: Vec<Value> = batch.missetting_angles.iter().map(|row| reals(row)).collect();
    let fields = [
        ("Title",                    Value::from(batch.title.as_str())),
        ("DatasetID",                Value::from(batch.dataset_id)),
        ("CrystalNumber",            Value::from(batch.crystal_number)),
        ("BatchNumber",              Value::from(batch.number)),
        ("Wavelength",               real(batch.wavelength)),
        ("CellDimensions",           reals(&batch.cell)),
        ("OrientationMatrix",        reals(&batch.orientation)),
        ("TemperatureFactor",        real(batch.temperature_factor)),
        ("Scale",                    real(batch.scale)),
        ("Mosaicity",                reals(&batch.mosaicity)),
        ("GoniostatDatum",           reals(&batch.datum)),
        ("Dispersion",               real(batch.dispersion)),
        ("CorrelatedComponent",      real(batch.correlated_component)),
        ("DetectorLimits",           Value::from(detector_limits)),
        ("HorizontalBeamDivergence", real(batch.horizontal_divergence)),
        ("VerticalBeamDivergence",   real(batch.vertical_divergence)),
        ("DetectorDistance",         reals(&batch.detector_distance)),
        ("Vector1",                  reals(&batch.e1)),
        ("Vector2",                  reals(&batch.e2)),
        ("Vector3",                  reals(&batch.e3)),
        ("AxesLabels",               Value::from(batch.axis_labels.to_vec())),
        ("OrientationBlockType",     Value::from(batch.orientation_block_type)),
        ("GoniostatScanAxisNumber",  Value::from(batch.scan_axis_number)),
        ("JumpAxis",                 Value::from(batch.jump_axis)),
        ("CellRefinementFlags",      Value::from(batch.cell_refinement_flags.to_vec())),
        ("BeamInfoFlag",             Value::from(batch.beam_info_flag)),
        ("MosaicityModelFlag",       Value::from(batch.mosaicity_model_flag)),
        ("DataTypeFlag",             Value::from(batch.data_type_flag)),
        ("MisFlag",                  Value::from(batch.mis_flag)),
        ("NumberOfBatchScales",      Value::from(batch.batch_scale_count)),
        ("NumberOfDetectors",        Value::from(batch.detector_count)),
        ("NumberOfGoniostatAxes",    Value::from(batch.goniostat_axis_count)),
        ("EndOfPhi",                 real(batch.phi_end)),
        ("PhiRange",                 real(batch.phi_range)),
        ("StartOfPhi",               real(batch.phi_start)),
        ("MissettingAngles",         Value::from(missetting)),
        ("RotationAxis",             reals(&batch.rotation_axis)),
        ("BFactorSD",                real(batch.b_factor_sd)),
        ("BScaleSD",                 real(batch.b_scale_sd)),
        ("SourceVector",             reals(&batch.source_vector)),
        ("IdealisedSourceVector",    reals(&batch.ideal_source_vector)),
        ("Theta",                    reals(&batch.theta)),
        ("StartTime",                real(batch.time_start)),
        ("StopTime",                 real(batch.time_stop)),
    ];
    Value::Object(fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
}

// ── Leaves ────────────────────────────────────────────────────────────────────

/// A real leaf.  Widening f32 → f64 is exact, so the value reads back
/// bit-for-bit.  Non-finite values have no document form and become null.
fn real(value: f32) -> Value {
    Value::from(f64::from(value))
}

fn reals(values: &[f32]) -> Value {
    Value::Array(values.iter().map(|&v| real(v)).collect())
}
