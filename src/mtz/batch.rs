//! Batch orientation block: 29 integers followed by 156 reals.
//!
//! Only the slots the record model carries are filled on write; the rest
//! stay zero and are ignored on read.

use std::io::{Read, Write};

use byteorder::{ByteOrder, ReadBytesExt, WriteBytesExt};

use super::MtzError;
use crate::model::Batch;

pub const NWORDS: usize = 185;
pub const NINTGR: usize = 29;
pub const NREALS: usize = 156;

// ── Integer slots ─────────────────────────────────────────────────────────────

const I_NWORDS:  usize = 0;
const I_NINTGR:  usize = 1;
const I_NREALS:  usize = 2;
const I_IORTYP:  usize = 3;
const I_LBCELL:  usize = 4; // ..10
const I_MISFLG:  usize = 10;
const I_JUMPAX:  usize = 11;
const I_NCRYST:  usize = 12;
const I_LCRFLG:  usize = 13;
const I_LDTYPE:  usize = 14;
const I_JSAXS:   usize = 15;
const I_NBSCAL:  usize = 16;
const I_NGONAX:  usize = 17;
const I_LBMFLG:  usize = 18;
const I_NDET:    usize = 19;
const I_NBSETID: usize = 20;

// ── Real slots ────────────────────────────────────────────────────────────────

const R_CELL:     usize = 0;  // ..6
const R_UMAT:     usize = 6;  // ..15
const R_PHIXYZ:   usize = 15; // ..21
const R_CRYDAT:   usize = 21; // ..33
const R_DATUM:    usize = 33; // ..36
const R_PHISTT:   usize = 36;
const R_PHIEND:   usize = 37;
const R_SCANAX:   usize = 38; // ..41
const R_TIME1:    usize = 41;
const R_TIME2:    usize = 42;
const R_BSCALE:   usize = 43;
const R_BBFAC:    usize = 44;
const R_SDBSCALE: usize = 45;
const R_SDBFAC:   usize = 46;
const R_PHIRANGE: usize = 47;
const R_E1:       usize = 59;
const R_E2:       usize = 62;
const R_E3:       usize = 65;
const R_SOURCE:   usize = 80;
const R_SO:       usize = 83;
const R_ALAMBD:   usize = 86;
const R_DELAMB:   usize = 87;
const R_DELCOR:   usize = 88;
const R_DIVHD:    usize = 89;
const R_DIVVD:    usize = 90;
/// Per detector: distance, theta, then the four limits.
const R_DETECTOR: usize = 111;
const DETECTOR_STRIDE: usize = 6;

/// Write the binary block of `batch`.
pub fn encode<B: ByteOrder, W: Write>(batch: &Batch, mut writer: W) -> Result<(), MtzError> {
    let mut ints = [0i32; NINTGR];
    ints[I_NWORDS]  = NWORDS as i32;
    ints[I_NINTGR]  = NINTGR as i32;
    ints[I_NREALS]  = NREALS as i32;
    ints[I_IORTYP]  = batch.orientation_block_type;
    ints[I_LBCELL..I_LBCELL + 6].copy_from_slice(&batch.cell_refinement_flags);
    ints[I_MISFLG]  = batch.mis_flag;
    ints[I_JUMPAX]  = batch.jump_axis;
    ints[I_NCRYST]  = batch.crystal_number;
    ints[I_LCRFLG]  = batch.mosaicity_model_flag;
    ints[I_LDTYPE]  = batch.data_type_flag;
    ints[I_JSAXS]   = batch.scan_axis_number;
    ints[I_NBSCAL]  = batch.batch_scale_count;
    ints[I_NGONAX]  = batch.goniostat_axis_count;
    ints[I_LBMFLG]  = batch.beam_info_flag;
    ints[I_NDET]    = batch.detector_count;
    ints[I_NBSETID] = batch.dataset_id;

    let mut reals = [0f32; NREALS];
    reals[R_CELL..R_CELL + 6].copy_from_slice(&batch.cell);
    reals[R_UMAT..R_UMAT + 9].copy_from_slice(&batch.orientation);
    reals[R_PHIXYZ..R_PHIXYZ + 3].copy_from_slice(&batch.missetting_angles[0]);
    reals[R_PHIXYZ + 3..R_PHIXYZ + 6].copy_from_slice(&batch.missetting_angles[1]);
    reals[R_CRYDAT..R_CRYDAT + 12].copy_from_slice(&batch.mosaicity);
    reals[R_DATUM..R_DATUM + 3].copy_from_slice(&batch.datum);
    reals[R_PHISTT]   = batch.phi_start;
    reals[R_PHIEND]   = batch.phi_end;
    reals[R_SCANAX..R_SCANAX + 3].copy_from_slice(&batch.rotation_axis);
    reals[R_TIME1]    = batch.time_start;
    reals[R_TIME2]    = batch.time_stop;
    reals[R_BSCALE]   = batch.scale;
    reals[R_BBFAC]    = batch.temperature_factor;
    reals[R_SDBSCALE] = batch.b_scale_sd;
    reals[R_SDBFAC]   = batch.b_factor_sd;
    reals[R_PHIRANGE] = batch.phi_range;
    reals[R_E1..R_E1 + 3].copy_from_slice(&batch.e1);
    reals[R_E2..R_E2 + 3].copy_from_slice(&batch.e2);
    reals[R_E3..R_E3 + 3].copy_from_slice(&batch.e3);
    reals[R_SOURCE..R_SOURCE + 3].copy_from_slice(&batch.source_vector);
    reals[R_SO..R_SO + 3].copy_from_slice(&batch.ideal_source_vector);
    reals[R_ALAMBD]   = batch.wavelength;
    reals[R_DELAMB]   = batch.dispersion;
    reals[R_DELCOR]   = batch.correlated_component;
    reals[R_DIVHD]    = batch.horizontal_divergence;
    reals[R_DIVVD]    = batch.vertical_divergence;
    for d in 0..2 {
        let base = R_DETECTOR + d * DETECTOR_STRIDE;
        let limits = &batch.detector_limits[d];
        reals[base]     = batch.detector_distance[d];
        reals[base + 1] = batch.theta[d];
        reals[base + 2] = limits[0][0];
        reals[base + 3] = limits[0][1];
        reals[base + 4] = limits[1][0];
        reals[base + 5] = limits[1][1];
    }

    for v in ints {
        writer.write_i32::<B>(v)?;
    }
    for v in reals {
        writer.write_f32::<B>(v)?;
    }
    Ok(())
}

/// Read a binary block into `batch`.  Title, number and axis labels travel
/// in text records and are left untouched.
pub fn decode<B: ByteOrder, R: Read>(mut reader: R, batch: &mut Batch) -> Result<(), MtzError> {
    let mut ints = [0i32; NINTGR];
    let mut reals = [0f32; NREALS];
    reader
        .read_i32_into::<B>(&mut ints)
        .and_then(|_| reader.read_f32_into::<B>(&mut reals))
        .map_err(|_| MtzError::Truncated("batch orientation block"))?;
    if ints[..3] != [NWORDS as i32, NINTGR as i32, NREALS as i32] {
        return Err(MtzError::Malformed {
            keyword: "BH",
            reason:  format!("orientation block sizes {:?}", &ints[..3]),
        });
    }

    batch.orientation_block_type = ints[I_IORTYP];
    batch.cell_refinement_flags.copy_from_slice(&ints[I_LBCELL..I_LBCELL + 6]);
    batch.mis_flag             = ints[I_MISFLG];
    batch.jump_axis            = ints[I_JUMPAX];
    batch.crystal_number       = ints[I_NCRYST];
    batch.mosaicity_model_flag = ints[I_LCRFLG];
    batch.data_type_flag       = ints[I_LDTYPE];
    batch.scan_axis_number     = ints[I_JSAXS];
    batch.batch_scale_count    = ints[I_NBSCAL];
    batch.goniostat_axis_count = ints[I_NGONAX];
    batch.beam_info_flag       = ints[I_LBMFLG];
    batch.detector_count       = ints[I_NDET];
    batch.dataset_id           = ints[I_NBSETID];

    batch.cell.copy_from_slice(&reals[R_CELL..R_CELL + 6]);
    batch.orientation.copy_from_slice(&reals[R_UMAT..R_UMAT + 9]);
    batch.missetting_angles[0].copy_from_slice(&reals[R_PHIXYZ..R_PHIXYZ + 3]);
    batch.missetting_angles[1].copy_from_slice(&reals[R_PHIXYZ + 3..R_PHIXYZ + 6]);
    batch.mosaicity.copy_from_slice(&reals[R_CRYDAT..R_CRYDAT + 12]);
    batch.datum.copy_from_slice(&reals[R_DATUM..R_DATUM + 3]);
    batch.phi_start = reals[R_PHISTT];
    batch.phi_end   = reals[R_PHIEND];
    batch.rotation_axis.copy_from_slice(&reals[R_SCANAX..R_SCANAX + 3]);
    batch.time_start         = reals[R_TIME1];
    batch.time_stop          = reals[R_TIME2];
    batch.scale              = reals[R_BSCALE];
    batch.temperature_factor = reals[R_BBFAC];
    batch.b_scale_sd         = reals[R_SDBSCALE];
    batch.b_factor_sd        = reals[R_SDBFAC];
    batch.phi_range          = reals[R_PHIRANGE];
    batch.e1.copy_from_slice(&reals[R_E1..R_E1 + 3]);
    batch.e2.copy_from_slice(&reals[R_E2..R_E2 + 3]);
    batch.e3.copy_from_slice(&reals[R_E3..R_E3 + 3]);
    batch.source_vector.copy_from_slice(&reals[R_SOURCE..R_SOURCE + 3]);
    batch.ideal_source_vector.copy_from_slice(&reals[R_SO..R_SO + 3]);
    batch.wavelength            = reals[R_ALAMBD];
    batch.dispersion            = reals[R_DELAMB];
    batch.correlated_component  = reals[R_DELCOR];
    batch.horizontal_divergence = reals[R_DIVHD];
    batch.vertical_divergence   = reals[R_DIVVD];
    for d in 0..2 {
        let base = R_DETECTOR + d * DETECTOR_STRIDE;
        batch.detector_distance[d] = reals[base];
        batch.theta[d]             = reals[base + 1];
        batch.detector_limits[d]   = [
            [reals[base + 2], reals[base + 3]],
            [reals[base + 4], reals[base + 5]],
        ];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian};

    fn sample() -> Batch {
        Batch {
            number: 3,
            dataset_id: 2,
            crystal_number: 1,
            wavelength: 0.9795,
            cell: [78.1, 78.1, 37.2, 90.0, 90.0, 90.0],
            orientation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            orientation_block_type: 3,
            cell_refinement_flags: [1, 1, 1, 0, 0, 0],
            detector_count: 1,
            detector_distance: [150.0, 0.0],
            detector_limits: [[[0.0, 100.0], [0.0, 200.0]], [[0.0; 2]; 2]],
            missetting_angles: [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]],
            phi_start: 10.0,
            phi_end: 11.0,
            theta: [2.5, 0.0],
            time_stop: 5.0,
            ideal_source_vector: [0.0, 0.0, 1.0],
            ..Batch::default()
        }
    }

    #[test]
    fn block_is_185_words() {
        let mut buf = Vec::new();
        encode::<LittleEndian, _>(&sample(), &mut buf).unwrap();
        assert_eq!(buf.len(), NWORDS * 4);
        assert_eq!(LittleEndian::read_i32(&buf[..4]), 185);
        assert_eq!(LittleEndian::read_i32(&buf[I_IORTYP * 4..]), 3);
        let alambd = (NINTGR + R_ALAMBD) * 4;
        assert_eq!(LittleEndian::read_f32(&buf[alambd..]), 0.9795);
    }

    #[test]
    fn decode_restores_binary_fields() {
        let mut buf = Vec::new();
        encode::<BigEndian, _>(&sample(), &mut buf).unwrap();
        let mut batch = Batch { number: 3, ..Batch::default() };
        decode::<BigEndian, _>(&buf[..], &mut batch).unwrap();
        assert_eq!(batch, sample());
    }

    #[test]
    fn decode_checks_sizes() {
        let mut buf = Vec::new();
        encode::<LittleEndian, _>(&sample(), &mut buf).unwrap();
        buf[0] = 9;
        let err = decode::<LittleEndian, _>(&buf[..], &mut Batch::default()).unwrap_err();
        assert!(matches!(err, MtzError::Malformed { keyword: "BH", .. }));
        let err = decode::<LittleEndian, _>(&buf[..40], &mut Batch::default()).unwrap_err();
        assert!(matches!(err, MtzError::Truncated(_)));
    }
}
