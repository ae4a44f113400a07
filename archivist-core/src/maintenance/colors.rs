use std::collections::HashMap;

use image::imageops::FilterType;

/// Swatch reported when an image cannot be decoded.
pub const FALLBACK_COLOR: &str = "#000000";

const SAMPLE_SIZE: u32 = 50;
const MAX_COLORS: usize = 5;
const QUANTUM: f32 = 32.0;

/// Up to five most frequent colours as `#rrggbb`.
///
/// The image is sampled at 50x50, mostly transparent pixels are skipped and
/// each channel is snapped to a multiple of 32 so near shades pool together.
pub fn dominant_colors(bytes: &[u8]) -> image::ImageResult<Vec<String>> {
    let sample = image::load_from_memory(bytes)?
        .resize_exact(SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle)
        .to_rgba8();

    let mut counts: HashMap<[u8; 3], usize> = HashMap::new();
    for pixel in sample.pixels() {
        let [r, g, b, alpha] = pixel.0;
        if alpha < 128 {
            continue;
        }
        *counts.entry([quantize(r), quantize(g), quantize(b)]).or_default() += 1;
    }

    let mut ranked: Vec<([u8; 3], usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(ranked
        .into_iter()
        .take(MAX_COLORS)
        .map(|([r, g, b], _)| format!("#{r:02x}{g:02x}{b:02x}"))
        .collect())
}

/// [`dominant_colors`], or the fallback swatch when decoding fails.
pub fn dominant_colors_or_fallback(bytes: &[u8]) -> Vec<String> {
    dominant_colors(bytes).unwrap_or_else(|_| vec![FALLBACK_COLOR.to_string()])
}

fn quantize(channel: u8) -> u8 {
    let snapped = (f32::from(channel) / QUANTUM).round() * QUANTUM;
    snapped.min(255.0) as u8
}
