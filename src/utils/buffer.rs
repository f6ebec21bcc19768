//! Helper functions for mono `f64` sample blocks.

// -------------------------------------------------------------------------------------------------

/// Fill the given buffer with silence.
#[inline]
pub fn clear_buffer(buffer: &mut [f64]) {
    buffer.fill(0.0);
}

/// Add `other` element-wise onto `buffer`. Both buffers must have the same length.
#[inline]
pub fn add_buffers(buffer: &mut [f64], other: &[f64]) {
    debug_assert_eq!(buffer.len(), other.len(), "Buffer size mismatch");
    for (o, i) in buffer.iter_mut().zip(other) {
        *o += *i;
    }
}

/// Multiply all samples in the buffer with the given factor.
#[inline]
pub fn scale_buffer(buffer: &mut [f64], factor: f64) {
    for o in buffer.iter_mut() {
        *o *= factor;
    }
}

/// Write a linear ramp from `from` to `to` over the entire buffer.
///
/// Both endpoints are included: a buffer of length 1 holds `from` only.
pub fn fill_linear_ramp(buffer: &mut [f64], from: f64, to: f64) {
    let len = buffer.len();
    if len == 0 {
        return;
    }
    if len == 1 {
        buffer[0] = from;
        return;
    }
    // the ratio form lands exactly on both endpoints
    let last = (len - 1) as f64;
    for (index, o) in buffer.iter_mut().enumerate() {
        *o = from + (to - from) * index as f64 / last;
    }
}

// -------------------------------------------------------------------------------------------------
