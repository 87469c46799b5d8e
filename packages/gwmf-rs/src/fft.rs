//! Thin wrappers over `rustfft` for real-input transforms.
//!
//! All transforms here are unnormalized; callers apply `dt`/`df` scaling.

use std::cell::RefCell;
use std::sync::Arc;

use rustfft::{num_complex::Complex64, Fft, FftPlanner};

thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

fn plan_forward(n: usize) -> Arc<dyn Fft<f64>> {
    FFT_PLANNER.with(|planner| planner.borrow_mut().plan_fft_forward(n))
}

fn plan_inverse(n: usize) -> Arc<dyn Fft<f64>> {
    FFT_PLANNER.with(|planner| planner.borrow_mut().plan_fft_inverse(n))
}

/// Forward transform of a real signal, returning the `n/2 + 1` one-sided bins.
pub(crate) fn rfft(signal: &[f64]) -> Vec<Complex64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }

    let mut buffer: Vec<Complex64> = signal.iter().map(|&x| Complex64::new(x, 0.0)).collect();

    plan_forward(n).process(&mut buffer);

    buffer.truncate(n / 2 + 1);
    buffer
}

/// Inverse of [`rfft`] for a time-domain length `n`, without the `1/n` factor.
///
/// Bins above `n/2` are rebuilt from Hermitian symmetry, so the imaginary
/// parts of the DC and (for even `n`) Nyquist bins are ignored.
pub(crate) fn irfft(spectrum: &[Complex64], n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }

    let mut buffer = vec![Complex64::new(0.0, 0.0); n];
    let one_sided = (n / 2 + 1).min(spectrum.len());
    buffer[..one_sided].copy_from_slice(&spectrum[..one_sided]);

    buffer[0].im = 0.0;
    if n % 2 == 0 && one_sided > n / 2 {
        buffer[n / 2].im = 0.0;
    }
    for k in 1..=(n - 1) / 2 {
        buffer[n - k] = buffer[k].conj();
    }

    plan_inverse(n).process(&mut buffer);

    buffer.into_iter().map(|c| c.re).collect()
}

/// In-place complex inverse transform, without the `1/n` factor.
pub(crate) fn ifft_in_place(buffer: &mut [Complex64]) {
    if buffer.is_empty() {
        return;
    }
    plan_inverse(buffer.len()).process(buffer);
}

/// Linear convolution of `signal` with an odd-length kernel, re-centred so the
/// output has the same length as `signal` (kernel centre aligned to each sample).
///
/// Samples outside `signal` are treated as zero.
pub(crate) fn convolve_centered(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let taps = kernel.len();
    if n == 0 || taps == 0 {
        return vec![0.0; n];
    }
    let half = taps / 2;

    let full_len = n + taps - 1;
    let n_fft = full_len.next_power_of_two();

    let fft = plan_forward(n_fft);
    let ifft = plan_inverse(n_fft);

    let mut kernel_buf = vec![Complex64::new(0.0, 0.0); n_fft];
    for (dst, &h) in kernel_buf.iter_mut().zip(kernel) {
        dst.re = h;
    }
    fft.process(&mut kernel_buf);

    let mut signal_buf = vec![Complex64::new(0.0, 0.0); n_fft];
    for (dst, &x) in signal_buf.iter_mut().zip(signal) {
        dst.re = x;
    }
    fft.process(&mut signal_buf);

    for (s, h) in signal_buf.iter_mut().zip(&kernel_buf) {
        *s *= h;
    }
    ifft.process(&mut signal_buf);

    let scale = 1.0 / n_fft as f64;
    signal_buf[half..half + n]
        .iter()
        .map(|c| c.re * scale)
        .collect()
}
