//! Delay embedding of stimulus features.

use ndarray::{s, Array2, ArrayView2};

/// Stack copies of `x` shifted down by `1..=n_delays` rows.
///
/// The output has `n_delays * x.ncols()` columns; rows shifted in from
/// before the start of the story are zero. `n_delays == 0` returns `x`
/// unchanged. Used to model the lag of the haemodynamic response.
pub fn make_delayed(x: ArrayView2<f64>, n_delays: usize) -> Array2<f64> {
    if n_delays == 0 {
        return x.to_owned();
    }
    let (rows, cols) = x.dim();
    let mut out = Array2::zeros((rows, cols * n_delays));
    for delay in 1..=n_delays {
        if delay >= rows {
            continue;
        }
        let block = (delay - 1) * cols;
        out.slice_mut(s![delay.., block..block + cols])
            .assign(&x.slice(s![..rows - delay, ..]));
    }
    out
}
