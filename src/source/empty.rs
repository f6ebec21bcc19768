use super::BlockSource;

// -------------------------------------------------------------------------------------------------

/// A source which produces silence only. Used as placeholder when an output sink has no
/// program to play.
pub struct EmptySource;

impl BlockSource for EmptySource {
    fn write(&mut self, output: &mut [f64]) {
        output.fill(0.0);
    }

    fn is_exhausted(&self) -> bool {
        false
    }
}
