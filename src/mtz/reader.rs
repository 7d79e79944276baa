use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{debug, trace};

use super::header::{Endian, Prologue, PROLOGUE_LEN};
use super::records::{keyword, read_record, split_leading, tokens};
use super::{batch, symop, MtzError};
use crate::model::{
    bounded, Batch, Column, ColumnRef, Crystal, Dataset, MissingValue, Mtz, Symmetry,
    AXIS_LABEL_LEN, COLUMN_SOURCE_LEN, GROUP_NAME_LEN, GROUP_TYPE_LEN, LABEL_LEN,
    MAX_SORT_COLUMNS, MAX_SYMOPS, NAME_LEN, POINT_GROUP_NAME_LEN, SPACE_GROUP_NAME_LEN, TITLE_LEN,
    TYPE_LEN,
};

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Mtz, MtzError> {
    read(BufReader::new(File::open(path)?))
}

/// Read a whole MTZ file.
pub fn read<R: Read>(mut reader: R) -> Result<Mtz, MtzError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let prologue = Prologue::parse(&bytes)?;
    match prologue.endian {
        Endian::Little => decode::<LittleEndian>(&bytes, prologue),
        Endian::Big    => decode::<BigEndian>(&bytes, prologue),
    }
}

fn decode<B: ByteOrder>(bytes: &[u8], prologue: Prologue) -> Result<Mtz, MtzError> {
    let offset = usize::try_from(prologue.header_offset)
        .map_err(|_| MtzError::TooLarge(prologue.header_offset))?;
    let head = bytes.get(offset..).ok_or(MtzError::Truncated("header"))?;
    let mut cursor = Cursor::new(head);

    let mut header = Header::default();
    loop {
        let record = read_record(&mut cursor)?;
        if keyword(&record) == "END" {
            break;
        }
        header.apply(&record)?;
    }
    debug!(
        ncol = header.ncol,
        nref = header.nref,
        datasets = header.datasets.len(),
        unknown = header.unknown.len(),
        "MTZ header parsed"
    );

    let mut history = Vec::new();
    let mut batches = Vec::new();
    while (cursor.position() as usize) < head.len() {
        let record = read_record(&mut cursor)?;
        match keyword(&record).as_str() {
            "MTZH" => {
                let count = split_leading(split_leading(&record).1).0;
                let n: usize = number("MTZHIST", Some(count))?;
                for _ in 0..n {
                    history.push(read_record(&mut cursor)?);
                }
            }
            "MTZB" => {}
            "BH" => batches.push(read_batch::<B>(&record, &mut cursor)?),
            "MTZE" => break,
            _ => trace!(record = record.trim_end(), "skipping trailing header record"),
        }
    }
    debug!(history = history.len(), batches = batches.len(), "MTZ trailer parsed");

    let table = reflections::<B>(bytes, header.ncol, header.nref, offset)?;
    let mut mtz = header.build(&table)?;
    mtz.history = history;
    mtz.batches = batches;
    Ok(mtz)
}

fn reflections<B: ByteOrder>(
    bytes: &[u8],
    ncol: usize,
    nref: usize,
    header_offset: usize,
) -> Result<Vec<f32>, MtzError> {
    let len = ncol
        .checked_mul(nref)
        .and_then(|n| n.checked_mul(4))
        .ok_or(MtzError::TooLarge(u64::MAX))?;
    let end = len
        .checked_add(PROLOGUE_LEN)
        .ok_or(MtzError::TooLarge(u64::MAX))?;
    if end > header_offset {
        return Err(MtzError::Malformed {
            keyword: "NCOL",
            reason:  format!("{nref} × {ncol} reflections overrun the header at byte {header_offset}"),
        });
    }
    let mut table = vec![0f32; ncol * nref];
    B::read_f32_into(&bytes[PROLOGUE_LEN..end], &mut table);
    Ok(table)
}

fn read_batch<B: ByteOrder>(bh: &str, cursor: &mut Cursor<&[u8]>) -> Result<Batch, MtzError> {
    let fields = tokens(split_leading(bh).1);
    let mut batch = Batch {
        number: number("BH", fields.first().map(String::as_str))?,
        ..Batch::default()
    };

    let title = read_record(&mut *cursor)?;
    if keyword(&title) != "TITL" {
        return Err(MtzError::Malformed {
            keyword: "BH",
            reason:  format!("batch {} has no TITLE record", batch.number),
        });
    }
    batch.title = bounded(split_leading(&title).1, TITLE_LEN);

    batch::decode::<B, _>(&mut *cursor, &mut batch)?;

    let labels = read_record(&mut *cursor)?;
    if keyword(&labels) != "BHCH" {
        return Err(MtzError::Malformed {
            keyword: "BH",
            reason:  format!("batch {} has no BHCH record", batch.number),
        });
    }
    for (i, label) in batch.axis_labels.iter_mut().enumerate() {
        let start = 5 + i * AXIS_LABEL_LEN;
        let text = labels.get(start..start + AXIS_LABEL_LEN).unwrap_or("");
        *label = text.trim().to_owned();
    }
    Ok(batch)
}

// ── Header state ──────────────────────────────────────────────────────────────

struct ColumnHeader {
    column:     Column,
    dataset_id: i32,
}

#[derive(Default)]
struct DatasetHeader {
    id:         i32,
    project:    String,
    crystal:    String,
    name:       String,
    cell:       Option<[f32; 6]>,
    wavelength: f32,
}

#[derive(Default)]
struct Header {
    title:      String,
    ncol:       usize,
    nref:       usize,
    cell:       [f32; 6],
    sort:       [usize; MAX_SORT_COLUMNS],
    symmetry:   Symmetry,
    nsymop:     usize,
    has_syminf: bool,
    resolution: (f32, f32),
    missing:    MissingValue,
    columns:    Vec<ColumnHeader>,
    datasets:   Vec<DatasetHeader>,
    unknown:    Vec<String>,
}

impl Header {
    fn apply(&mut self, record: &str) -> Result<(), MtzError> {
        let rest = split_leading(record).1;
        let t = tokens(rest);
        let at = |i: usize| t.get(i).map(String::as_str);
        match keyword(record).as_str() {
            "VERS" | "NDIF" | "BATC" => {}
            "TITL" => self.title = bounded(rest, TITLE_LEN),
            "NCOL" => {
                self.ncol = number("NCOL", at(0))?;
                self.nref = number("NCOL", at(1))?;
            }
            "CELL" => self.cell = reals("CELL", &t)?,
            "SORT" => {
                for (slot, token) in self.sort.iter_mut().zip(&t) {
                    *slot = number("SORT", Some(token.as_str()))?;
                }
            }
            "SYMI" => {
                let sym = &mut self.symmetry;
                sym.nsym               = number("SYMINF", at(0))?;
                sym.nsymp              = number("SYMINF", at(1))?;
                sym.lattice_type       = first_char(at(2)).unwrap_or(sym.lattice_type);
                sym.space_group_number = number("SYMINF", at(3))?;
                sym.space_group_name   = bounded(at(4).unwrap_or(""), SPACE_GROUP_NAME_LEN);
                sym.point_group_name   = bounded(at(5).unwrap_or(""), POINT_GROUP_NAME_LEN);
                sym.confidence         = first_char(at(6)).unwrap_or(sym.confidence);
                self.has_syminf = true;
            }
            "SYMM" => {
                if self.nsymop >= MAX_SYMOPS {
                    return Err(MtzError::Malformed {
                        keyword: "SYMM",
                        reason:  format!("more than {MAX_SYMOPS} operators"),
                    });
                }
                let op = symop::parse(rest).ok_or_else(|| MtzError::Malformed {
                    keyword: "SYMM",
                    reason:  format!("cannot parse operator {rest:?}"),
                })?;
                self.symmetry.operations[self.nsymop] = op;
                self.nsymop += 1;
            }
            "RESO" => self.resolution = (number("RESO", at(0))?, number("RESO", at(1))?),
            "VALM" => {
                self.missing = match at(0) {
                    Some(v) if v.eq_ignore_ascii_case("NAN") => MissingValue::NaN,
                    v => MissingValue::Value(number("VALM", v)?),
                }
            }
            "COLU" => {
                let column = Column {
                    label: bounded(at(0).unwrap_or(""), LABEL_LEN),
                    kind:  bounded(at(1).unwrap_or(""), TYPE_LEN),
                    min:   number("COLUMN", at(2))?,
                    max:   number("COLUMN", at(3))?,
                    ..Column::default()
                };
                let dataset_id = number("COLUMN", at(4))?;
                self.columns.push(ColumnHeader { column, dataset_id });
            }
            "COLS" => {
                let dataset_id = number("COLSRC", at(2))?;
                let column = self.column_mut("COLSRC", at(0), dataset_id)?;
                column.column_source = bounded(at(1).unwrap_or(""), COLUMN_SOURCE_LEN);
            }
            "COLG" => {
                let position = number("COLGRP", at(3))?;
                let dataset_id = number("COLGRP", at(4))?;
                let column = self.column_mut("COLGRP", at(0), dataset_id)?;
                column.group_name     = bounded(at(1).unwrap_or(""), GROUP_NAME_LEN);
                column.group_type     = bounded(at(2).unwrap_or(""), GROUP_TYPE_LEN);
                column.group_position = position;
            }
            "PROJ" => {
                let (id, name) = split_leading(rest);
                self.dataset("PROJECT", id)?.project = bounded(name, NAME_LEN);
            }
            "CRYS" => {
                let (id, name) = split_leading(rest);
                self.dataset("CRYSTAL", id)?.crystal = bounded(name, NAME_LEN);
            }
            "DATA" => {
                let (id, name) = split_leading(rest);
                self.dataset("DATASET", id)?.name = bounded(name, NAME_LEN);
            }
            "DCEL" => {
                let cell = reals("DCELL", t.get(1..).unwrap_or(&[]))?;
                self.dataset("DCELL", at(0).unwrap_or(""))?.cell = Some(cell);
            }
            "DWAV" => {
                let wavelength = number("DWAVEL", at(1))?;
                self.dataset("DWAVEL", at(0).unwrap_or(""))?.wavelength = wavelength;
            }
            _ => {
                trace!(record = record.trim_end(), "unknown header record kept");
                self.unknown.push(record.to_owned());
            }
        }
        Ok(())
    }

    /// Dataset declared with `id`, created on first mention.
    fn dataset(&mut self, keyword: &'static str, id: &str) -> Result<&mut DatasetHeader, MtzError> {
        let id: i32 = number(keyword, Some(id))?;
        let at = match self.datasets.iter().position(|d| d.id == id) {
            Some(at) => at,
            None => {
                self.datasets.push(DatasetHeader { id, ..DatasetHeader::default() });
                self.datasets.len() - 1
            }
        };
        Ok(&mut self.datasets[at])
    }

    /// Most recent column with `label` in dataset `dataset_id`.
    fn column_mut(
        &mut self,
        keyword: &'static str,
        label: Option<&str>,
        dataset_id: i32,
    ) -> Result<&mut Column, MtzError> {
        let label = label.unwrap_or("");
        self.columns
            .iter_mut()
            .rev()
            .find(|c| c.dataset_id == dataset_id && c.column.label == label)
            .map(|c| &mut c.column)
            .ok_or_else(|| MtzError::Malformed {
                keyword,
                reason: format!("no column {label:?} in dataset {dataset_id}"),
            })
    }

    /// Assemble the record.  Datasets sharing a project and crystal name
    /// belong to one crystal; crystal ids follow first appearance.
    fn build(self, table: &[f32]) -> Result<Mtz, MtzError> {
        let mut crystals: Vec<Crystal> = Vec::new();
        let mut slots: Vec<(i32, usize, usize)> = Vec::new();

        for ds in self.datasets {
            let x = match crystals
                .iter()
                .position(|c| c.name == ds.crystal && c.project == ds.project)
            {
                Some(x) => x,
                None => {
                    crystals.push(Crystal {
                        name:           ds.crystal,
                        project:        ds.project,
                        id:             crystals.len() as i32 + 1,
                        cell:           ds.cell.unwrap_or(self.cell),
                        resolution_min: self.resolution.0,
                        resolution_max: self.resolution.1,
                        datasets:       Vec::new(),
                    });
                    crystals.len() - 1
                }
            };
            crystals[x].datasets.push(Dataset {
                name:       ds.name,
                id:         ds.id,
                wavelength: ds.wavelength,
                columns:    Vec::new(),
            });
            slots.push((ds.id, x, crystals[x].datasets.len() - 1));
        }

        let mut positions = Vec::with_capacity(self.columns.len());
        for (pos, header) in self.columns.into_iter().enumerate() {
            let (x, d) = slots
                .iter()
                .find(|&&(id, _, _)| id == header.dataset_id)
                .map(|&(_, x, d)| (x, d))
                .ok_or_else(|| MtzError::Malformed {
                    keyword: "COLUMN",
                    reason:  format!("dataset {} is not declared", header.dataset_id),
                })?;
            let mut column = header.column;
            column.source = pos as i32 + 1;
            column.data = table.iter().skip(pos).step_by(self.ncol.max(1)).copied().collect();
            let dataset = &mut crystals[x].datasets[d];
            positions.push(ColumnRef { crystal: x, dataset: d, column: dataset.columns.len() });
            dataset.columns.push(column);
        }
        if positions.len() != self.ncol {
            return Err(MtzError::Malformed {
                keyword: "NCOL",
                reason:  format!("{} columns declared, {} described", self.ncol, positions.len()),
            });
        }

        let mut symmetry = self.symmetry;
        if !self.has_syminf {
            symmetry.nsym = self.nsymop as i32;
        }

        let mut sort_order = [None; MAX_SORT_COLUMNS];
        for (slot, &pos) in sort_order.iter_mut().zip(&self.sort) {
            *slot = pos.checked_sub(1).and_then(|p| positions.get(p).copied());
        }

        // Unknown records are exposed twice over; the tree mapper keeps the
        // first half.
        let mut unknown_headers = self.unknown.clone();
        unknown_headers.extend(self.unknown);

        Ok(Mtz {
            title: self.title,
            history: Vec::new(),
            crystals,
            symmetry,
            batches: Vec::new(),
            sort_order,
            unknown_headers,
            missing: self.missing,
            nref: self.nref,
        })
    }
}

// ── Token helpers ─────────────────────────────────────────────────────────────

fn number<T: FromStr>(keyword: &'static str, token: Option<&str>) -> Result<T, MtzError> {
    let token = token.unwrap_or("");
    token.parse().map_err(|_| MtzError::Malformed {
        keyword,
        reason: format!("expected a number, found {token:?}"),
    })
}

fn reals(keyword: &'static str, tokens: &[String]) -> Result<[f32; 6], MtzError> {
    let mut out = [0f32; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = number(keyword, tokens.get(i).map(String::as_str))?;
    }
    Ok(out)
}

fn first_char(token: Option<&str>) -> Option<char> {
    token.and_then(|t| t.chars().next())
}
