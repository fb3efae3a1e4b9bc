// THEORY:
// The `PixelGrid` module holds the in-memory image that every other module reads
// from or writes into. It is a flat, row-major vector of `Color`s with a fixed
// `rows x cols` shape.
//
// Axis convention: a row is one image column (the image's x coordinate), so a
// grid decoded from a `width x height` image has `width` rows of `height` samples.
// All band partitioning happens along rows.
//
// Key architectural principles:
// 1.  **Immutable Source**: Once built, a source grid is only ever read. It is
//     shared across slice tasks behind an `Arc` without any locking.
// 2.  **Contiguous Bands**: Because storage is row-major, any run of consecutive
//     rows is one contiguous slice of memory. A `BandView` borrows such a run
//     without copying, which is what each slice task filters.
// 3.  **Bordered Shape**: Kernel filters need a neighbor on every side of every
//     sample. `bordered()` produces a `(rows + 2) x (cols + 2)` grid framed with
//     neutral grey and the original data offset by (1, 1).

pub mod pixel_grid {
    use crate::core_modules::color::color::Color;

    /// A "dumb" data container for a 2-D grid of colors.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PixelGrid {
        rows: usize,
        cols: usize,
        pixels: Vec<Color>,
    }

    /// A borrowed run of consecutive rows from a `PixelGrid`.
    #[derive(Debug, Clone, Copy)]
    pub struct BandView<'a> {
        /// Number of rows in this band.
        pub rows: usize,
        /// Number of samples in each row.
        pub cols: usize,
        /// Row-major samples, `rows * cols` long.
        pub pixels: &'a [Color],
    }

    impl PixelGrid {
        /// A grid of the given shape with every sample set to `fill`.
        pub fn filled(rows: usize, cols: usize, fill: Color) -> Self {
            Self {
                rows,
                cols,
                pixels: vec![fill; rows * cols],
            }
        }

        /// Wraps existing row-major samples. Returns `None` if the length does not
        /// match the shape.
        pub fn new(rows: usize, cols: usize, pixels: Vec<Color>) -> Option<Self> {
            if pixels.len() != rows * cols {
                return None;
            }
            Some(Self { rows, cols, pixels })
        }

        /// Builds a grid by evaluating `f(row, col)` for every sample.
        pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> Color) -> Self {
            let mut pixels = Vec::with_capacity(rows * cols);
            for row in 0..rows {
                for col in 0..cols {
                    pixels.push(f(row, col));
                }
            }
            Self { rows, cols, pixels }
        }

        pub fn rows(&self) -> usize {
            self.rows
        }

        pub fn cols(&self) -> usize {
            self.cols
        }

        pub fn is_empty(&self) -> bool {
            self.pixels.is_empty()
        }

        pub fn pixels(&self) -> &[Color] {
            &self.pixels
        }

        pub fn get(&self, row: usize, col: usize) -> Option<&Color> {
            if row >= self.rows || col >= self.cols {
                return None;
            }
            self.pixels.get(row * self.cols + col)
        }

        pub fn row(&self, row: usize) -> Option<&[Color]> {
            if row >= self.rows {
                return None;
            }
            let start = row * self.cols;
            Some(&self.pixels[start..start + self.cols])
        }

        /// Borrows `len` consecutive rows starting at `start`.
        pub fn band(&self, start: usize, len: usize) -> Option<BandView<'_>> {
            let end = start.checked_add(len)?;
            if end > self.rows {
                return None;
            }
            Some(BandView {
                rows: len,
                cols: self.cols,
                pixels: &self.pixels[start * self.cols..end * self.cols],
            })
        }

        /// Copies this grid into the interior of a neutral-grey frame one sample wide.
        pub fn bordered(&self) -> PixelGrid {
            let cols = self.cols + 2;
            let mut framed = PixelGrid::filled(self.rows + 2, cols, Color::NEUTRAL_GREY);
            for (row, source) in self.pixels.chunks_exact(self.cols.max(1)).enumerate() {
                let start = (row + 1) * cols + 1;
                framed.pixels[start..start + self.cols].copy_from_slice(source);
            }
            framed
        }

        /// Appends full rows to the end of the grid. Used when merging bands.
        pub(crate) fn extend_rows(&mut self, rows: &[Color]) {
            debug_assert_eq!(rows.len() % self.cols.max(1), 0);
            self.rows += rows.len() / self.cols.max(1);
            self.pixels.extend_from_slice(rows);
        }

        /// An empty grid that will receive `capacity_rows` rows of `cols` samples.
        pub(crate) fn with_row_capacity(cols: usize, capacity_rows: usize) -> Self {
            Self {
                rows: 0,
                cols,
                pixels: Vec::with_capacity(cols * capacity_rows),
            }
        }
    }

    impl<'a> BandView<'a> {
        pub fn get(&self, row: usize, col: usize) -> Color {
            self.pixels[row * self.cols + col]
        }

        pub fn row(&self, row: usize) -> &'a [Color] {
            &self.pixels[row * self.cols..(row + 1) * self.cols]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel_grid::*;
    use crate::core_modules::color::color::Color;

    fn numbered(rows: usize, cols: usize) -> PixelGrid {
        PixelGrid::from_fn(rows, cols, |r, c| Color::grey((r * cols + c) as f64 / 100.0))
    }

    #[test]
    fn new_rejects_mismatched_length() {
        assert!(PixelGrid::new(2, 2, vec![Color::BLACK; 3]).is_none());
        assert!(PixelGrid::new(2, 2, vec![Color::BLACK; 4]).is_some());
    }

    #[test]
    fn bordered_frames_interior_with_neutral_grey() {
        let grid = numbered(3, 2);
        let framed = grid.bordered();
        assert_eq!(framed.rows(), 5);
        assert_eq!(framed.cols(), 4);

        for row in 0..5 {
            for col in 0..4 {
                let on_frame = row == 0 || row == 4 || col == 0 || col == 3;
                let sample = *framed.get(row, col).unwrap();
                if on_frame {
                    assert_eq!(sample, Color::NEUTRAL_GREY);
                } else {
                    assert_eq!(sample, *grid.get(row - 1, col - 1).unwrap());
                }
            }
        }
    }

    #[test]
    fn bordered_handles_non_square_grids() {
        let framed = numbered(1, 5).bordered();
        assert_eq!((framed.rows(), framed.cols()), (3, 7));
        assert_eq!(framed.get(1, 5), numbered(1, 5).get(0, 4));
    }

    #[test]
    fn band_borrows_contiguous_rows() {
        let grid = numbered(4, 3);
        let band = grid.band(1, 2).unwrap();
        assert_eq!(band.rows, 2);
        assert_eq!(band.row(0), grid.row(1).unwrap());
        assert_eq!(band.get(1, 2), *grid.get(2, 2).unwrap());
        assert!(grid.band(3, 2).is_none());
    }
}
