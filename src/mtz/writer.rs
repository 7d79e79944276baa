use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use tracing::debug;

use super::batch::{self, NINTGR, NREALS, NWORDS};
use super::header::{Endian, Prologue, PROLOGUE_LEN};
use super::records::{quote, write_record};
use super::{symop, MtzError};
use crate::history::trim_record;
use crate::model::{bounded, Column, ColumnRef, MissingValue, Mtz, AXIS_LABEL_LEN, RECORD_LEN};

pub fn write_file<P: AsRef<Path>>(mtz: &Mtz, path: P) -> Result<(), MtzError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write(mtz, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write `mtz` little-endian.
pub fn write<W: Write>(mtz: &Mtz, writer: W) -> Result<(), MtzError> {
    write_with(mtz, writer, Endian::Little)
}

/// Write `mtz` in the given byte order.
pub fn write_with<W: Write>(mtz: &Mtz, writer: W, endian: Endian) -> Result<(), MtzError> {
    match endian {
        Endian::Little => encode::<LittleEndian, W>(mtz, writer, endian),
        Endian::Big    => encode::<BigEndian, W>(mtz, writer, endian),
    }
}

fn encode<B: ByteOrder, W: Write>(mtz: &Mtz, mut writer: W, endian: Endian) -> Result<(), MtzError> {
    let mut ids = HashSet::new();
    for dataset in mtz.crystals.iter().flat_map(|c| &c.datasets) {
        if !ids.insert(dataset.id) {
            return Err(MtzError::DuplicateDataset(dataset.id));
        }
    }

    let columns: Vec<(ColumnRef, &Column)> = mtz.columns().collect();
    let table_len = (mtz.nref as u64)
        .checked_mul(columns.len() as u64 * 4)
        .ok_or(MtzError::TooLarge(u64::MAX))?;
    let prologue = Prologue::new(endian, PROLOGUE_LEN as u64 + table_len)?;

    // Every record is rendered before the first byte goes out, so an
    // oversized field leaves the sink untouched.
    let mut head = Vec::new();
    header_records(mtz, &columns, &mut head)?;
    trailer::<B>(mtz, &mut head)?;

    prologue.write(&mut writer)?;
    let marker = mtz.missing.marker();
    for r in 0..mtz.nref {
        for (_, column) in &columns {
            writer.write_f32::<B>(column.data.get(r).copied().unwrap_or(marker))?;
        }
    }
    writer.write_all(&head)?;
    debug!(
        ncol = columns.len(),
        nref = mtz.nref,
        batches = mtz.batches.len(),
        header_bytes = head.len(),
        "MTZ written"
    );
    Ok(())
}

fn header_records(
    mtz: &Mtz,
    columns: &[(ColumnRef, &Column)],
    out: &mut Vec<u8>,
) -> Result<(), MtzError> {
    let mut put = |text: String| write_record(&mut *out, &text);

    put("VERS MTZ:V1.1".into())?;
    put(format!("TITLE {}", mtz.title))?;
    put(format!("NCOL {:8} {:12} {:8}", columns.len(), mtz.nref, mtz.batches.len()))?;
    let cell = mtz.crystals.first().map(|c| c.cell).unwrap_or_default();
    put(format!("CELL {}", reals(&cell)))?;

    let sort: Vec<String> = mtz
        .sort_order
        .iter()
        .map(|slot| {
            slot.and_then(|at| columns.iter().position(|(c, _)| *c == at))
                .map_or(0, |p| p + 1)
                .to_string()
        })
        .collect();
    put(format!("SORT {}", sort.join(" ")))?;

    let sym = &mtz.symmetry;
    put(format!(
        "SYMINF {} {} {} {} {} {} {}",
        sym.nsym,
        sym.nsymp,
        quote(&sym.lattice_type.to_string()),
        sym.space_group_number,
        quote(&sym.space_group_name),
        quote(&sym.point_group_name),
        quote(&sym.confidence.to_string()),
    ))?;
    for op in sym.active_operations() {
        put(format!("SYMM {}", symop::format(op)))?;
    }

    let (low, high) = mtz
        .crystals
        .iter()
        .map(|c| (c.resolution_min, c.resolution_max))
        .reduce(|(a, b), (c, d)| (a.min(c), b.max(d)))
        .unwrap_or_default();
    put(format!("RESO {} {}", real(low), real(high)))?;
    put(match mtz.missing {
        MissingValue::NaN      => "VALM NAN".to_owned(),
        MissingValue::Value(v) => format!("VALM {}", real(v)),
    })?;

    for (at, column) in columns {
        let dataset_id = mtz.crystals[at.crystal].datasets[at.dataset].id;
        let label = quote(&column.label);
        put(format!(
            "COLUMN {label} {} {} {} {dataset_id}",
            quote(&column.kind),
            real(column.min),
            real(column.max),
        ))?;
        put(format!("COLSRC {label} {} {dataset_id}", quote(&column.column_source)))?;
        put(format!(
            "COLGRP {label} {} {} {} {dataset_id}",
            quote(&column.group_name),
            quote(&column.group_type),
            column.group_position,
        ))?;
    }

    put(format!("NDIF {}", mtz.crystals.iter().map(|c| c.datasets.len()).sum::<usize>()))?;
    for crystal in &mtz.crystals {
        for dataset in &crystal.datasets {
            let id = dataset.id;
            put(format!("PROJECT {id} {}", crystal.project))?;
            put(format!("CRYSTAL {id} {}", crystal.name))?;
            put(format!("DATASET {id} {}", dataset.name))?;
            put(format!("DCELL {id} {}", reals(&crystal.cell)))?;
            put(format!("DWAVEL {id} {}", real(dataset.wavelength)))?;
        }
    }

    // Batch numbers are packed into as few records as fit.
    let mut line = String::from("BATCH");
    for b in &mtz.batches {
        let number = format!(" {}", b.number);
        if line.len() + number.len() > RECORD_LEN {
            put(std::mem::replace(&mut line, String::from("BATCH")))?;
        }
        line.push_str(&number);
    }
    if line.len() > "BATCH".len() {
        put(line)?;
    }
    for line in &mtz.unknown_headers {
        put(trim_record(line).to_owned())?;
    }
    put("END".into())
}

fn trailer<B: ByteOrder>(mtz: &Mtz, out: &mut Vec<u8>) -> Result<(), MtzError> {
    write_record(&mut *out, &format!("MTZHIST {}", mtz.history.len()))?;
    for line in &mtz.history {
        write_record(&mut *out, &bounded(trim_record(line), RECORD_LEN))?;
    }
    write_record(&mut *out, "MTZBATS")?;
    for b in &mtz.batches {
        write_record(&mut *out, &format!("BH {} {NWORDS} {NINTGR} {NREALS}", b.number))?;
        write_record(&mut *out, &format!("TITLE {}", b.title))?;
        batch::encode::<B, _>(b, &mut *out)?;
        // Labels sit in fixed 8-byte slots, right-aligned.
        let mut labels = String::from("BHCH ");
        for label in &b.axis_labels {
            let label = bounded(label, AXIS_LABEL_LEN);
            labels.push_str(&" ".repeat(AXIS_LABEL_LEN - label.len()));
            labels.push_str(&label);
        }
        write_record(&mut *out, &labels)?;
    }
    write_record(&mut *out, "MTZENDOFHEADERS")
}

/// Shortest text that reads back to the same `f32`, switching to exponent
/// form where plain decimals would run long.
fn real(v: f32) -> String {
    let magnitude = v.abs();
    if v == 0.0 || !v.is_finite() || (1e-4..1e7).contains(&magnitude) {
        format!("{v}")
    } else {
        format!("{v:e}")
    }
}

fn reals(values: &[f32]) -> String {
    values.iter().map(|&v| real(v)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_text_reads_back_exactly() {
        for v in [0.0f32, 1.0, -999.0, 78.123_45, 1.0e-30, 3.4e38, 0.000_123, f32::INFINITY] {
            let text = real(v);
            assert!(text.len() < 20, "{text}");
            assert_eq!(text.parse::<f32>().unwrap(), v);
        }
        assert_eq!(real(f32::NAN), "NaN");
    }

    #[test]
    fn batch_numbers_wrap_across_records() {
        let mut mtz = Mtz::allocate(&[1], MissingValue::NaN);
        mtz.crystals[0].datasets[0].allocate_columns(1, 0, MissingValue::NaN);
        mtz.batches = (0..20)
            .map(|i| crate::model::Batch { number: 1_000_000_000 + i, ..Default::default() })
            .collect();
        let columns: Vec<_> = mtz.columns().collect();
        let mut head = Vec::new();
        header_records(&mtz, &columns, &mut head).unwrap();
        let batch_records = head
            .chunks(RECORD_LEN)
            .filter(|r| r.starts_with(b"BATCH "))
            .count();
        assert_eq!(batch_records, 4);
    }
}
