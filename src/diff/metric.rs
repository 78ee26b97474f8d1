/// Image difference metric
///
/// Both images are resampled to a common working width (aspect ratio kept)
/// so outputs rendered at different resolutions stay comparable, then the
/// mean absolute difference is taken per channel and averaged over channels.

use image::{imageops::FilterType, DynamicImage};

/// Working width used by the diff worker
pub const WORKING_WIDTH: u32 = 1000;

/// Resize to `width`, height following the aspect ratio
pub fn resample(image: &DynamicImage, width: u32) -> DynamicImage {
    let height = ((width as u64 * image.height() as u64) / image.width().max(1) as u64).max(1) as u32;
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    image.resize_exact(width, height, FilterType::Triangle)
}

/// Flatten to 8-bit samples with `channels` channels per pixel
fn samples(image: &DynamicImage, channels: u8) -> Vec<u8> {
    match channels {
        1 => image.to_luma8().into_raw(),
        2 => image.to_luma_alpha8().into_raw(),
        3 => image.to_rgb8().into_raw(),
        _ => image.to_rgba8().into_raw(),
    }
}

/// Mean over channels of the per-channel mean absolute difference.
///
/// The result is in `0.0..=255.0`. Images whose heights differ after
/// resampling (different aspect ratios) cannot be compared.
pub fn mean_abs_difference(left: &DynamicImage, right: &DynamicImage, width: u32) -> Result<f64, String> {
    let left = resample(left, width);
    let right = resample(right, width);
    if left.height() != right.height() {
        return Err(format!(
            "aspect ratios differ ({}x{} vs {}x{} after resampling)",
            left.width(),
            left.height(),
            right.width(),
            right.height()
        ));
    }

    let channels = left.color().channel_count().max(right.color().channel_count());
    let a = samples(&left, channels);
    let b = samples(&right, channels);

    let channels = channels.min(4) as usize;
    let mut sums = vec![0u64; channels];
    for (i, (x, y)) in a.iter().zip(&b).enumerate() {
        sums[i % channels] += x.abs_diff(*y) as u64;
    }

    let pixels = (a.len() / channels).max(1) as f64;
    let per_channel: Vec<f64> = sums.iter().map(|&s| s as f64 / pixels).collect();
    Ok(per_channel.iter().sum::<f64>() / channels as f64)
}
