// THEORY:
// `slice_filter` is the leaf of the concurrency tree. Each slice task calls `apply`
// once on its own band and hands the result back to the owning `ImageJob`. It is
// a pure function: it reads a borrowed band and returns a freshly owned one, so
// many slice tasks can run against the same shared source grid at the same time.
//
// Input shape depends on the filter:
// - GREY takes a plain band of the unbordered grid and returns a band of the same
//   shape.
// - Kernel filters take a band of the bordered grid that includes one extra row of
//   context above and below. They return `rows - 2` rows of `cols - 2` samples,
//   because the frame is consumed by the convolution.

use crate::core_modules::color::color::{Channel, Color};
use crate::core_modules::kernel::{Filter, Kernel};
use crate::core_modules::pixel_grid::pixel_grid::BandView;

/// The owned output of one slice task.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredBand {
    pub rows: usize,
    pub cols: usize,
    pub pixels: Vec<Color>,
}

impl FilteredBand {
    pub fn row(&self, row: usize) -> &[Color] {
        &self.pixels[row * self.cols..(row + 1) * self.cols]
    }
}

/// Filters one band.
pub fn apply(filter: Filter, band: BandView<'_>) -> FilteredBand {
    match filter {
        Filter::Grey => greyscale(band),
        Filter::Convolve(kernel) => convolve(kernel, band),
    }
}

/// Replaces every sample with the clamped mean of its three channels.
pub fn greyscale(band: BandView<'_>) -> FilteredBand {
    let pixels = band
        .pixels
        .iter()
        .map(|c| Color::grey(c.channel_mean()))
        .collect();
    FilteredBand {
        rows: band.rows,
        cols: band.cols,
        pixels,
    }
}

/// Convolves the interior of a bordered band with a 3x3 kernel.
pub fn convolve(kernel: Kernel, band: BandView<'_>) -> FilteredBand {
    let rows = band.rows.saturating_sub(2);
    let cols = band.cols.saturating_sub(2);
    let weights = kernel.weights();
    let mut pixels = Vec::with_capacity(rows * cols);

    for i in 1..=rows {
        for j in 1..=cols {
            let (mut red, mut green, mut blue): (Channel, Channel, Channel) = (0.0, 0.0, 0.0);
            for (kr, kernel_row) in weights.iter().enumerate() {
                let neighbor_row = band.row(i + kr - 1);
                for (kc, weight) in kernel_row.iter().enumerate() {
                    let neighbor = neighbor_row[j + kc - 1];
                    red += neighbor.red * weight;
                    green += neighbor.green * weight;
                    blue += neighbor.blue * weight;
                }
            }
            pixels.push(Color::clamped(red, green, blue));
        }
    }

    FilteredBand { rows, cols, pixels }
}
