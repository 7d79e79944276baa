use mtzjson::model::{Batch, ColumnRef, MissingValue, Mtz, SymopMatrix};
use mtzjson::mtz::{self, symop};
use mtzjson::{from_tree, to_tree, MISSING_TOKEN};
use proptest::prelude::*;
use serde_json::Value;

fn finite() -> impl Strategy<Value = f32> {
    -1.0e6f32..1.0e6f32
}

fn batch() -> impl Strategy<Value = Batch> {
    (
        any::<i32>(),
        "[A-Za-z0-9]([A-Za-z0-9 ]{0,30}[A-Za-z0-9])?",
        prop::array::uniform6(finite()),
        prop::array::uniform9(finite()),
        prop::array::uniform2(prop::array::uniform2(prop::array::uniform2(finite()))),
        prop::array::uniform2(prop::array::uniform3(finite())),
        prop::array::uniform3("[A-Z]{0,8}"),
        prop::array::uniform6(any::<i32>()),
        (finite(), finite(), any::<i32>()),
    )
        .prop_map(|(number, title, cell, orientation, limits, missetting, labels, flags, scalars)| {
            let (phi_start, phi_end, scan_axis_number) = scalars;
            Batch {
                number,
                title,
                cell,
                orientation,
                detector_limits: limits,
                missetting_angles: missetting,
                axis_labels: labels,
                cell_refinement_flags: flags,
                phi_start,
                phi_end,
                scan_axis_number,
                ..Batch::default()
            }
        })
}

/// A record with unique names and ids, no missing values and no trailing
/// blanks on history lines.
fn record() -> impl Strategy<Value = Mtz> {
    (
        prop::collection::vec(1usize..3, 1..3),
        1usize..4,
        0usize..6,
        "[A-Za-z0-9 ]{0,40}",
        prop::collection::vec("[A-Za-z0-9 ]{0,20}[A-Za-z0-9]", 0..3),
    )
        .prop_flat_map(|(counts, ncol, nref, title, history)| {
            let total = counts.iter().sum::<usize>() * ncol * nref;
            (
                Just(counts),
                Just(ncol),
                Just(nref),
                Just(title),
                Just(history),
                prop::collection::vec(finite(), total),
                prop::collection::vec(batch(), 0..3),
            )
        })
        .prop_map(|(counts, ncol, nref, title, history, values, batches)| {
            let mut mtz = Mtz::allocate(&counts, MissingValue::NaN);
            mtz.title = title;
            mtz.history = history;
            mtz.nref = nref;
            mtz.batches = batches;

            let mut values = values.into_iter();
            let (mut dataset_id, mut source) = (0, 0);
            for (x, crystal) in mtz.crystals.iter_mut().enumerate() {
                crystal.name = format!("xtal{x}");
                crystal.id = x as i32 + 1;
                for dataset in &mut crystal.datasets {
                    dataset_id += 1;
                    dataset.id = dataset_id;
                    dataset.name = format!("set{dataset_id}");
                    dataset.allocate_columns(ncol, nref, MissingValue::NaN);
                    for column in &mut dataset.columns {
                        source += 1;
                        column.source = source;
                        column.label = format!("C{source}");
                        column.data = values.by_ref().take(nref).collect();
                    }
                }
            }
            mtz.sort_order[0] = Some(ColumnRef { crystal: 0, dataset: 0, column: 0 });
            mtz
        })
}

fn symop_matrix() -> impl Strategy<Value = SymopMatrix> {
    let coefficient = prop::sample::select(vec![-1.0f32, 0.0, 1.0]);
    let row = (prop::array::uniform3(coefficient), -11i32..12)
        .prop_map(|([a, b, c], k)| [a, b, c, k as f32 / 12.0]);
    prop::array::uniform3(row).prop_map(|[r0, r1, r2]| [r0, r1, r2, [0.0, 0.0, 0.0, 1.0]])
}

proptest! {
    #[test]
    fn tree_roundtrip_reproduces_record(mtz in record()) {
        let tree = to_tree(&mtz);
        prop_assert_eq!(&from_tree(&tree, mtz.missing).unwrap(), &mtz);

        let text = serde_json::to_string(&tree).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(&from_tree(&reparsed, mtz.missing).unwrap(), &mtz);
    }

    #[test]
    fn missing_entries_survive_as_marker(mask in prop::collection::vec(any::<bool>(), 1..16)) {
        let mut mtz = Mtz::allocate(&[1], MissingValue::NaN);
        mtz.nref = mask.len();
        let dataset = &mut mtz.crystals[0].datasets[0];
        dataset.allocate_columns(1, mask.len(), MissingValue::NaN);
        dataset.columns[0].data = mask
            .iter()
            .enumerate()
            .map(|(i, &missing)| if missing { f32::NAN } else { i as f32 })
            .collect();

        let tree = to_tree(&mtz);
        let data = tree["Crystals"][0]["Datasets"][0]["Columns"][0]["Data"].as_array().unwrap();
        for (item, &missing) in data.iter().zip(&mask) {
            prop_assert_eq!(item.as_str() == Some(MISSING_TOKEN), missing);
        }

        let back = from_tree(&tree, MissingValue::NaN).unwrap();
        for (i, (&v, &missing)) in back.crystals[0].datasets[0].columns[0].data.iter().zip(&mask).enumerate() {
            if missing {
                prop_assert!(v.is_nan());
            } else {
                prop_assert_eq!(v, i as f32);
            }
        }
    }

    #[test]
    fn symop_text_roundtrip(op in symop_matrix()) {
        prop_assert_eq!(symop::parse(&symop::format(&op)), Some(op));
    }

    #[test]
    fn mtz_file_preserves_columns(mtz in record()) {
        let mut bytes = Vec::new();
        mtz::write(&mtz, &mut bytes).unwrap();
        let back = mtz::read(&bytes[..]).unwrap();
        prop_assert_eq!(back.nref, mtz.nref);
        prop_assert_eq!(back.batches.len(), mtz.batches.len());
        let before: Vec<_> = mtz.columns().map(|(at, c)| (at, c.label.clone(), c.data.clone())).collect();
        let after: Vec<_> = back.columns().map(|(at, c)| (at, c.label.clone(), c.data.clone())).collect();
        prop_assert_eq!(after, before);
    }
}
