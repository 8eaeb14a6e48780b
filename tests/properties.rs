//! Property tests for metrics, padding, margin loss and last-step selection.

use candle_core::{Device, Tensor};
use netype::eval::evaluate;
use netype::model::{margin_terms, select_last_valid, MARGIN};
use netype::padding::{pad_chars, pad_words, PAD_ID};
use proptest::prelude::*;

fn label_sets(n: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0usize..8, 1..4), n)
}

proptest! {
    #[test]
    fn metrics_stay_in_unit_interval(
        (predicted, gold) in (1usize..12).prop_flat_map(|n| (label_sets(n), label_sets(n)))
    ) {
        let m = evaluate(&predicted, &gold).unwrap();
        let (acc, mi_f1, ma_f1, mi_p, mi_r, ma_p, ma_r) = m.as_tuple();
        for v in [acc, mi_f1, ma_f1, mi_p, mi_r, ma_p, ma_r] {
            prop_assert!((0.0..=1.0 + 1e-9).contains(&v), "{} out of range", v);
        }
        // exact matches count fully towards macro precision and recall
        prop_assert!(acc <= ma_f1 + 1e-9);
    }

    #[test]
    fn self_evaluation_is_perfect(sets in (1usize..12).prop_flat_map(label_sets)) {
        let m = evaluate(&sets, &sets).unwrap();
        let (acc, mi_f1, ma_f1, ..) = m.as_tuple();
        prop_assert!((acc - 1.0).abs() < 1e-12);
        prop_assert!((mi_f1 - 1.0).abs() < 1e-12);
        prop_assert!((ma_f1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn padded_words_have_fixed_width(
        seqs in prop::collection::vec(prop::collection::vec(1u32..50, 0..15), 1..6),
        timesteps in 1usize..10,
    ) {
        let padded = pad_words(&seqs, timesteps, PAD_ID);
        for ((row, &len), seq) in padded.ids.iter().zip(&padded.lengths).zip(&seqs) {
            prop_assert_eq!(row.len(), timesteps);
            prop_assert_eq!(len, seq.len().min(timesteps));
            prop_assert_eq!(&row[..len], &seq[..len]);
            prop_assert!(row[len..].iter().all(|&id| id == PAD_ID));
        }
    }

    #[test]
    fn padded_chars_are_rectangular(
        seqs in prop::collection::vec(
            prop::collection::vec(prop::collection::vec(1u32..30, 0..7), 0..5),
            1..4,
        ),
        timesteps in 1usize..6,
    ) {
        let padded = pad_chars(&seqs, timesteps, PAD_ID);
        prop_assert!(padded.max_chars >= 1);
        for (words, lens) in padded.ids.iter().zip(&padded.word_lengths) {
            prop_assert_eq!(words.len(), timesteps);
            prop_assert_eq!(lens.len(), timesteps);
            for (row, &len) in words.iter().zip(lens) {
                prop_assert_eq!(row.len(), padded.max_chars);
                prop_assert!(row[len..].iter().all(|&id| id == PAD_ID));
            }
        }
    }

    #[test]
    fn margin_terms_are_hinges(
        cells in prop::collection::vec((0.0f32..1.0, any::<bool>()), 1..20)
    ) {
        let outputs: Vec<f32> = cells.iter().map(|c| c.0).collect();
        let targets: Vec<f32> = cells.iter().map(|c| if c.1 { 1.0 } else { 0.0 }).collect();
        let n = cells.len();
        let o = Tensor::from_vec(outputs, (1, n), &Device::Cpu).unwrap();
        let t = Tensor::from_vec(targets, (1, n), &Device::Cpu).unwrap();
        let terms: Vec<f32> = margin_terms(&o, &t).unwrap().flatten_all().unwrap().to_vec1().unwrap();

        for (&term, &(out, positive)) in terms.iter().zip(&cells) {
            let expected = if positive {
                (MARGIN as f32 - out).max(0.0)
            } else {
                MARGIN as f32 + out
            };
            prop_assert!(term >= 0.0);
            prop_assert!((term - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn last_step_selection_matches_direct_indexing(
        (timesteps, lengths) in (1usize..6).prop_flat_map(|t| {
            (Just(t), prop::collection::vec(1..=t, 1..5))
        }),
        features in 1usize..4,
    ) {
        let batch = lengths.len();
        let data: Vec<f32> = (0..batch * timesteps * features).map(|i| i as f32).collect();
        let outputs = Tensor::from_vec(data.clone(), (batch, timesteps, features), &Device::Cpu).unwrap();
        let picked: Vec<Vec<f32>> = select_last_valid(&outputs, &lengths).unwrap().to_vec2().unwrap();

        for (b, row) in picked.iter().enumerate() {
            let start = (b * timesteps + lengths[b] - 1) * features;
            prop_assert_eq!(row.as_slice(), &data[start..start + features]);
        }
    }
}
