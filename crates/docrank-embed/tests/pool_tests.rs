use candle_core::{Device, Tensor};
use docrank_embed::masked_mean_l2;

fn assert_close(got: &[f32], want: &[f32]) {
    assert_eq!(got.len(), want.len());
    for (a, b) in got.iter().zip(want) {
        assert!((a - b).abs() < 1e-5, "got {got:?}, want {want:?}");
    }
}

#[test]
fn each_row_pools_only_its_own_unmasked_tokens() {
    let dev = Device::Cpu;
    // [B=2, T=3, H=2]; the last token of each row is padding with large values.
    let hidden = Tensor::from_slice(
        &[
            3.0f32, 4.0, 1.0, 0.0, 9.0, 9.0, // row 0
            1.0, 0.0, 0.0, 1.0, 9.0, 9.0, // row 1
        ],
        (2, 3, 2),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1i64, 0, 0, 1, 1, 0], (2, 3), &dev).unwrap();

    let pooled: Vec<Vec<f32>> = masked_mean_l2(&hidden, &mask).unwrap().to_vec2().unwrap();
    assert_eq!(pooled.len(), 2);
    // Row 0 keeps one token: [3, 4] normalised.
    assert_close(&pooled[0], &[0.6, 0.8]);
    // Row 1 averages two tokens to [0.5, 0.5] before normalising.
    let half = std::f32::consts::FRAC_1_SQRT_2;
    assert_close(&pooled[1], &[half, half]);
}

#[test]
fn padding_length_does_not_change_the_vector() {
    let dev = Device::Cpu;
    let short = Tensor::from_slice(&[2.0f32, 1.0, 0.0, 3.0], (1, 2, 2), &dev).unwrap();
    let short_mask = Tensor::from_slice(&[1i64, 1], (1, 2), &dev).unwrap();
    let padded = Tensor::from_slice(&[2.0f32, 1.0, 0.0, 3.0, 7.0, 7.0, 7.0, 7.0], (1, 4, 2), &dev).unwrap();
    let padded_mask = Tensor::from_slice(&[1i64, 1, 0, 0], (1, 4), &dev).unwrap();

    let a: Vec<Vec<f32>> = masked_mean_l2(&short, &short_mask).unwrap().to_vec2().unwrap();
    let b: Vec<Vec<f32>> = masked_mean_l2(&padded, &padded_mask).unwrap().to_vec2().unwrap();
    assert_close(&a[0], &b[0]);
}

#[test]
fn unbatched_hidden_states_are_rejected() {
    let dev = Device::Cpu;
    let hidden = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], (2, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1i64, 1], (1, 2), &dev).unwrap();
    let err = masked_mean_l2(&hidden, &mask).unwrap_err();
    assert!(err.to_string().contains("[B,T,H]"), "{err}");
}
