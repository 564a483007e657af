use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::peaks::Landmark;
use crate::spectral::Spectrogram;

const WIDTH: f32 = 1920.0;
const HEIGHT: f32 = 1080.0;
const MAX_COLUMNS: usize = 480;

/// Writes the log-mel spectrogram as an SVG heat map with landmarks on top.
///
/// Long clips are pooled (max) into at most `MAX_COLUMNS` columns.
pub fn write_spectrogram_svg<P: AsRef<Path>>(
    spectrogram: &Spectrogram,
    landmarks: &[Landmark],
    output_path: P,
    title: &str,
) -> std::io::Result<()> {
    let mut f = File::create(output_path)?;
    f.write_all(render_svg(spectrogram, landmarks, title).as_bytes())
}

pub fn render_svg(spectrogram: &Spectrogram, landmarks: &[Landmark], title: &str) -> String {
    let mut svg = format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='{w}' height='{h}' viewBox='0 0 {w} {h}'>\n  <rect width='100%' height='100%' fill='black'/>\n",
        w = WIDTH,
        h = HEIGHT
    );

    let bands = spectrogram.bands();
    let frames = spectrogram.frames();
    if bands == 0 || frames == 0 {
        let _ = writeln!(
            svg,
            "  <text x='{}' y='{}' fill='white' font-family='monospace' font-size='20' text-anchor='middle'>No data to visualize</text>",
            WIDTH / 2.0,
            HEIGHT / 2.0
        );
        svg.push_str("</svg>\n");
        return svg;
    }

    let frames_per_column = frames.div_ceil(MAX_COLUMNS);
    let columns = frames.div_ceil(frames_per_column);
    let cell_w = WIDTH / columns as f32;
    let cell_h = HEIGHT / bands as f32;

    let max_db = spectrogram.max_value();
    let range = (max_db - spectrogram.min_value()).max(1e-6);

    for column in 0..columns {
        let first = column * frames_per_column;
        let last = (first + frames_per_column).min(frames);
        for band in 0..bands {
            let value = spectrogram.band(band)[first..last]
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
            let intensity = (((value - max_db) / range + 1.0).clamp(0.0, 1.0) * 255.0) as u8;
            if intensity == 0 {
                continue;
            }
            // low bands at the bottom
            let y = HEIGHT - (band + 1) as f32 * cell_h;
            let _ = writeln!(
                svg,
                "  <rect x='{:.1}' y='{:.1}' width='{:.1}' height='{:.1}' fill='{}'/>",
                column as f32 * cell_w,
                y,
                cell_w + 0.5,
                cell_h + 0.5,
                heat_color(intensity)
            );
        }
    }

    for landmark in landmarks {
        let x = (landmark.time_frame as f32 + 0.5) / frames as f32 * WIDTH;
        let y = HEIGHT - (landmark.frequency_bin as f32 + 0.5) * cell_h;
        let _ = writeln!(
            svg,
            "  <circle cx='{x:.1}' cy='{y:.1}' r='3' fill='none' stroke='cyan' stroke-width='1'/>"
        );
    }

    let _ = writeln!(
        svg,
        "  <text x='10' y='24' fill='white' font-family='monospace' font-size='18'>{} ({} frames, {} landmarks)</text>",
        escape(title),
        frames,
        landmarks.len()
    );
    svg.push_str("</svg>\n");
    svg
}

fn heat_color(intensity: u8) -> String {
    let t = intensity as f32 / 255.0;
    let r = (255.0 * (1.5 * t).min(1.0)) as u8;
    let g = (255.0 * (1.5 * t - 0.5).clamp(0.0, 1.0)) as u8;
    let b = (255.0 * (3.0 * t - 2.0).clamp(0.0, 1.0)) as u8;
    format!("rgb({r},{g},{b})")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
