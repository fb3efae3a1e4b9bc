// THEORY:
// The set of filters is closed. Five of them are 3x3 convolution kernels; GREY is
// a per-sample channel average and never goes through kernel lookup. Modeling this
// as an enum means an unknown name is rejected when the filter is parsed, long
// before any job is built, and a slice task can never be handed "no kernel".
//
// Kernel layout: `weights[1 + dr][1 + dc]` is the weight applied to the neighbor
// at row offset `dr` and column offset `dc`, for `dr, dc` in -1..=1.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

pub type Weight = f64;

/// One of the fixed 3x3 convolution presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Identity,
    Blur,
    Sharpen,
    Edge,
    Emboss,
}

/// A filter selector: either the greyscale reduction or a convolution kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    #[default]
    Grey,
    Convolve(Kernel),
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::Identity,
        Kernel::Blur,
        Kernel::Sharpen,
        Kernel::Edge,
        Kernel::Emboss,
    ];

    pub fn weights(&self) -> [[Weight; 3]; 3] {
        match self {
            Kernel::Identity => [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]],
            Kernel::Blur => [
                [0.0625, 0.125, 0.0625],
                [0.125, 0.25, 0.125],
                [0.0625, 0.125, 0.0625],
            ],
            Kernel::Sharpen => [[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]],
            Kernel::Edge => [[-1.0, -1.0, -1.0], [-1.0, 8.0, -1.0], [-1.0, -1.0, -1.0]],
            Kernel::Emboss => [[-2.0, -1.0, 0.0], [-1.0, 0.0, 1.0], [0.0, 1.0, 2.0]],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Identity => "IDENTITY",
            Kernel::Blur => "BLUR",
            Kernel::Sharpen => "SHARPEN",
            Kernel::Edge => "EDGE",
            Kernel::Emboss => "EMBOSS",
        }
    }
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Grey => "GREY",
            Filter::Convolve(kernel) => kernel.name(),
        }
    }

    /// Whether slice tasks need a one-sample border of context around their band.
    pub fn needs_border(&self) -> bool {
        matches!(self, Filter::Convolve(_))
    }
}

impl FromStr for Filter {
    type Err = ConfigError;

    /// Parses a filter name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        if name == "GREY" {
            return Ok(Filter::Grey);
        }
        Kernel::ALL
            .iter()
            .find(|k| k.name() == name)
            .map(|k| Filter::Convolve(*k))
            .ok_or_else(|| ConfigError::UnknownFilter(s.to_string()))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
