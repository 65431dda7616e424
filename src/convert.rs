use image::{imageops::FilterType, DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use jpeg_encoder::{ColorType, Encoder, JfifWrite};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{BoundingBox, ResizePolicy};
use crate::error::ConvertError;

/// Extensions picked up from a source folder (compared lowercase).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Outcome of converting one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Converted {
        original_size: u64,
        new_size: u64,
        reduction: f64,
        width: u32,
        height: u32,
    },
    Failed { error: String },
}

impl ConversionOutcome {
    pub fn is_converted(&self) -> bool { matches!(self, Self::Converted { .. }) }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `holiday.final.PNG` -> `holiday.final.jpg`. Works on the raw file name so
/// names that are not UTF-8 survive unchanged.
pub fn output_name(file_name: &OsStr) -> PathBuf {
    Path::new(file_name).with_extension("jpg")
}

/// Destination of `input` inside `dest_dir`.
pub fn output_path(dest_dir: &Path, input: &Path) -> PathBuf {
    let file_name = input.file_name().unwrap_or(input.as_os_str());
    dest_dir.join(output_name(file_name))
}

/// Largest size with the same aspect ratio that fits the box. Never upscales.
pub fn fit_within(width: u32, height: u32, max: BoundingBox) -> (u32, u32) {
    if max.contains(width, height) {
        return (width, height);
    }
    let ratio = f64::min(max.width as f64 / width as f64, max.height as f64 / height as f64);
    let nw = ((width as f64 * ratio).round() as u32).clamp(1, max.width);
    let nh = ((height as f64 * ratio).round() as u32).clamp(1, max.height);
    (nw, nh)
}

pub fn reduction_percent(original: u64, new: u64) -> f64 {
    if original == 0 {
        0.0
    } else {
        (original as f64 - new as f64) / original as f64 * 100.0
    }
}

/// Drops the alpha channel by compositing over opaque white.
pub fn flatten(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let over = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([over(r), over(g), over(b)])
    })
}

pub fn resize(rgb: RgbImage, max: BoundingBox, policy: ResizePolicy) -> RgbImage {
    let (w, h) = rgb.dimensions();
    if policy == ResizePolicy::WhenLarger && max.contains(w, h) {
        return rgb;
    }
    let (nw, nh) = fit_within(w, h, max);
    if (nw, nh) == (w, h) {
        return rgb;
    }
    image::imageops::resize(&rgb, nw, nh, FilterType::Lanczos3)
}

/// Lossy JPEG with optimized Huffman tables.
pub fn encode_jpeg<W: JfifWrite>(rgb: &RgbImage, quality: u8, out: W) -> Result<(), ConvertError> {
    encode_with(rgb, quality, true, out)
}

fn encode_with<W: JfifWrite>(rgb: &RgbImage, quality: u8, optimize: bool, out: W) -> Result<(), ConvertError> {
    let (w, h) = rgb.dimensions();
    let (Ok(width), Ok(height)) = (u16::try_from(w), u16::try_from(h)) else {
        return Err(ConvertError::TooLarge { width: w, height: h });
    };
    let mut enc = Encoder::new(out, quality.clamp(1, 100));
    enc.set_optimized_huffman_tables(optimize);
    enc.encode(rgb.as_raw(), width, height, ColorType::Rgb)?;
    Ok(())
}

fn write_jpeg(rgb: &RgbImage, quality: u8, output: &Path) -> Result<(), ConvertError> {
    let mut writer = BufWriter::new(File::create(output)?);
    encode_jpeg(rgb, quality, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Decode, flatten, resize and re-encode `input` as JPEG at `output`.
pub fn convert_file(
    input: &Path,
    output: &Path,
    max: BoundingBox,
    quality: u8,
    policy: ResizePolicy,
) -> Result<(u64, u64, u32, u32), ConvertError> {
    let img = ImageReader::open(input)?.with_guessed_format()?.decode()?;
    debug!("decoded {} ({}x{}, {:?})", input.display(), img.width(), img.height(), img.color());

    let rgb = resize(flatten(&img), max, policy);
    let (w, h) = rgb.dimensions();

    if let Err(e) = write_jpeg(&rgb, quality, output) {
        // no half-written .jpg left behind
        if let Err(rm) = std::fs::remove_file(output) {
            if rm.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove partial {}: {rm}", output.display());
            }
        }
        return Err(e);
    }

    let original_size = std::fs::metadata(input)?.len();
    let new_size = std::fs::metadata(output)?.len();
    Ok((original_size, new_size, w, h))
}

/// Same as [`convert_file`] but folds any error into [`ConversionOutcome::Failed`].
pub fn convert_image(
    input: &Path,
    output: &Path,
    max: BoundingBox,
    quality: u8,
    policy: ResizePolicy,
) -> ConversionOutcome {
    match convert_file(input, output, max, quality, policy) {
        Ok((original_size, new_size, width, height)) => ConversionOutcome::Converted {
            original_size,
            new_size,
            reduction: reduction_percent(original_size, new_size),
            width,
            height,
        },
        Err(e) => ConversionOutcome::Failed { error: e.to_string() },
    }
}

/// Startup check that the decoders this crate relies on were compiled into `image`.
pub fn ensure_codecs() -> Result<(), ConvertError> {
    let mut missing: Vec<String> = Vec::new();
    for (fmt, name) in [(ImageFormat::Png, "png"), (ImageFormat::Jpeg, "jpeg")] {
        if !fmt.reading_enabled() {
            missing.push(format!("{name} decoder"));
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConvertError::MissingDependency(missing.join(", ")))
    }
}
