/// Min-convolution of `h` with the truncated linear penalty
/// `min(alpha * |t|, d)`, written to `out` and normalized to a zero minimum.
///
/// Label `l` of `h` and label `m` of `out` sit `shift` labels apart, so
/// `out[m] = min_l h[l] + min(alpha * |l - (m + shift)|, d)`. Runs in
/// O(L) using the forward and backward passes of Felzenszwalb and
/// Huttenlocher. `envelope` is scratch of the same length as `h`.
pub(crate) fn truncated_l1(
    h: &[f32],
    shift: i32,
    alpha: f32,
    d: f32,
    envelope: &mut [f32],
    out: &mut [f32],
) {
    let n = h.len();
    debug_assert!(n > 0 && envelope.len() == n && out.len() == n);
    envelope.copy_from_slice(h);
    for i in 1..n {
        envelope[i] = envelope[i].min(envelope[i - 1] + alpha);
    }
    for i in (0..n - 1).rev() {
        envelope[i] = envelope[i].min(envelope[i + 1] + alpha);
    }

    let floor = h.iter().copied().fold(f32::INFINITY, f32::min) + d;
    let last = n as i64 - 1;
    for (m, out) in out.iter_mut().enumerate() {
        let j = m as i64 + i64::from(shift);
        let linear = if j < 0 {
            envelope[0] + alpha * (-j) as f32
        } else if j > last {
            envelope[n - 1] + alpha * (j - last) as f32
        } else {
            envelope[j as usize]
        };
        *out = linear.min(floor);
    }
    normalize(out);
}

/// Shift `values` so the smallest one is zero.
pub(crate) fn normalize(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    if min.is_finite() {
        for v in values.iter_mut() {
            *v -= min;
        }
    }
}
