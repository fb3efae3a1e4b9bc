// THEORY:
// `Color` is the smallest unit of the filtering system. It is a "dumb" data
// container for one sample of an image: three normalized intensity channels
// (red, green, blue) in [0.0, 1.0]. The alpha channel is not modeled; every
// sample is fully opaque when it leaves the system.
//
// Key principles:
// 1.  **Normalized Channels**: All arithmetic is done in f64 on the 0..1 range so
//     that kernel weights (which can be negative or fractional) can be applied
//     without integer overflow or early truncation.
// 2.  **Clamp At The Edge**: Weighted sums may transiently leave [0, 1]. Only the
//     final sample is clamped, through `Color::clamped`, never the partial sums.
// 3.  **Byte Conversion**: Conversion to and from 8-bit RGBA lives here so that the
//     image helper never has to know about channel math.

pub mod color {
    pub type Channel = f64;
    pub type Byte = u8;

    /// Clamps a single channel into the displayable range [0.0, 1.0].
    #[inline]
    pub fn clamp_channel(value: Channel) -> Channel {
        if value < 0.0 {
            0.0
        } else if value > 1.0 {
            1.0
        } else {
            value
        }
    }

    /// A "dumb" data container representing a single opaque RGB sample.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Color {
        /// The red channel value (0.0-1.0).
        pub red: Channel,
        /// The green channel value (0.0-1.0).
        pub green: Channel,
        /// The blue channel value (0.0-1.0).
        pub blue: Channel,
    }

    impl Color {
        /// The frame color used when a grid is bordered.
        pub const NEUTRAL_GREY: Color = Color::new(0.5, 0.5, 0.5);
        pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);
        pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);

        pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        /// Builds a final sample from possibly out-of-range channel sums.
        pub fn clamped(red: Channel, green: Channel, blue: Channel) -> Self {
            Self {
                red: clamp_channel(red),
                green: clamp_channel(green),
                blue: clamp_channel(blue),
            }
        }

        /// A grey sample with all three channels set to `value`, clamped.
        pub fn grey(value: Channel) -> Self {
            let v = clamp_channel(value);
            Self::new(v, v, v)
        }

        /// The unweighted mean of the three channels.
        pub fn channel_mean(&self) -> Channel {
            (self.red + self.green + self.blue) / 3.0
        }

        pub fn from_rgba8(bytes: [Byte; 4]) -> Self {
            Self::new(
                bytes[0] as Channel / 255.0,
                bytes[1] as Channel / 255.0,
                bytes[2] as Channel / 255.0,
            )
        }

        /// Quantizes to 8-bit RGBA with a fully opaque alpha.
        pub fn to_rgba8(&self) -> [Byte; 4] {
            let quantize = |c: Channel| (clamp_channel(c) * 255.0).round() as Byte;
            [quantize(self.red), quantize(self.green), quantize(self.blue), Byte::MAX]
        }
    }
}
