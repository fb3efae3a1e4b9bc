pub mod image_helper {
    use crate::core_modules::color::color::Color;
    use crate::core_modules::pixel_grid::pixel_grid::PixelGrid;
    use crate::error::ImageIoError;
    use image::ImageEncoder;
    use std::fs::File;
    use std::io::BufWriter;
    use std::path::{Path, PathBuf};
    use tracing::{debug, warn};
    use walkdir::WalkDir;

    /// Suffix appended to a source filename to name its filtered output.
    pub const OUTPUT_SUFFIX: &str = "_filtered.png";

    /// A decoded source image together with the name it was found under.
    #[derive(Debug, Clone)]
    pub struct SourceImage {
        pub filename: String,
        pub path: PathBuf,
        pub grid: PixelGrid,
    }

    /// Destination for finished images.
    pub trait ImageSink: Send + Sync {
        fn write(&self, grid: &PixelGrid, target: &Path) -> Result<(), ImageIoError>;
    }

    /// Writes lossless RGBA PNG files.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PngSink;

    impl ImageSink for PngSink {
        fn write(&self, grid: &PixelGrid, target: &Path) -> Result<(), ImageIoError> {
            save(target, grid)
        }
    }

    /// `<output_dir>/<filename>_filtered.png`
    pub fn output_path(output_dir: &Path, filename: &str) -> PathBuf {
        output_dir.join(format!("{filename}{OUTPUT_SUFFIX}"))
    }

    /// Decodes an image file into a grid with one row per image column.
    pub fn load(path: &Path) -> Result<PixelGrid, ImageIoError> {
        let rgba = image::open(path)
            .map_err(|source| ImageIoError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(PixelGrid::from_fn(width as usize, height as usize, |x, y| {
            Color::from_rgba8(rgba.get_pixel(x as u32, y as u32).0)
        }))
    }

    /// Encodes a grid as an opaque RGBA PNG. Grid rows become image columns.
    pub fn save(path: &Path, grid: &PixelGrid) -> Result<(), ImageIoError> {
        let width = grid.rows();
        let height = grid.cols();
        let mut buffer = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            for x in 0..width {
                let sample = grid.get(x, y).copied().unwrap_or_default();
                buffer.extend_from_slice(&sample.to_rgba8());
            }
        }

        let output = BufWriter::new(File::create(path)?);
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder
            .write_image(&buffer, width as u32, height as u32, image::ExtendedColorType::Rgba8)
            .map_err(|source| ImageIoError::Encode {
                path: path.to_path_buf(),
                source,
            })
    }

    fn is_hidden(name: &str) -> bool {
        name.starts_with('.')
    }

    /// Recursively decodes every non-hidden regular file under `root`.
    ///
    /// Files that cannot be read or decoded are skipped with a warning. The order
    /// of the returned images is not meaningful.
    pub fn find_images(root: &Path) -> Vec<SourceImage> {
        let mut images = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&filename) {
                continue;
            }
            match load(entry.path()) {
                Ok(grid) => {
                    debug!(
                        file = %filename,
                        rows = grid.rows(),
                        cols = grid.cols(),
                        "decoded image"
                    );
                    images.push(SourceImage {
                        filename,
                        path: entry.into_path(),
                        grid,
                    });
                }
                Err(err) => warn!(error = %err, "skipping file"),
            }
        }
        images
    }
}

#[cfg(test)]
mod tests {
    use super::image_helper::*;
    use crate::core_modules::color::color::Color;
    use crate::core_modules::pixel_grid::pixel_grid::PixelGrid;
    use std::fs;

    fn gradient(rows: usize, cols: usize) -> PixelGrid {
        PixelGrid::from_fn(rows, cols, |r, c| {
            Color::from_rgba8([(r * 40) as u8, (c * 30) as u8, 200, 255])
        })
    }

    #[test]
    fn save_then_load_keeps_orientation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradient.png");
        let grid = gradient(5, 3);

        save(&path, &grid).expect("Error Saving File.");
        let decoded = load(&path).unwrap();

        assert_eq!(decoded.rows(), 5);
        assert_eq!(decoded.cols(), 3);
        assert_eq!(decoded, grid);

        let raw = image::open(&path).unwrap().to_rgba8();
        assert_eq!(raw.dimensions(), (5, 3));
        assert_eq!(raw.get_pixel(4, 2).0, [160, 60, 200, 255]);
    }

    #[test]
    fn find_images_walks_tree_and_skips_hidden_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/deeper");
        fs::create_dir_all(&nested).unwrap();

        save(&dir.path().join("top.png"), &gradient(2, 2)).unwrap();
        save(&nested.join("inner.png"), &gradient(3, 1)).unwrap();
        save(&dir.path().join(".hidden.png"), &gradient(2, 2)).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();

        let mut names: Vec<String> = find_images(dir.path())
            .into_iter()
            .map(|img| img.filename)
            .collect();
        names.sort();
        assert_eq!(names, vec!["inner.png".to_string(), "top.png".to_string()]);
    }

    #[test]
    fn missing_root_yields_no_images() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_images(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn output_path_appends_suffix() {
        let path = output_path(std::path::Path::new("out"), "cat.jpg");
        assert_eq!(path, std::path::Path::new("out").join("cat.jpg_filtered.png"));
    }

    #[test]
    fn save_into_missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PngSink
            .write(&gradient(1, 1), &dir.path().join("absent/x.png"))
            .unwrap_err();
        assert!(matches!(err, crate::error::ImageIoError::Io(_)));
    }
}
