//! PNG snapshot export

use std::path::Path;

use anyhow::{anyhow, Result};
use tiny_skia::Pixmap;

use crate::spectral::SpectrogramView;

use super::colors::{heat_rgb, normalize};

/// Render the sliding buffer to a PNG, one pixel per cell.
///
/// Low frequencies sit at the bottom of the image and the newest
/// column at the right, on the same color ramp as the live heatmap.
pub fn save_snapshot(view: &SpectrogramView<'_>, path: &Path) -> Result<()> {
    let width = view.matrix.width();
    let height = view.matrix.height();
    let mut pixmap = Pixmap::new(width.max(1) as u32, height.max(1) as u32)
        .ok_or_else(|| anyhow!("cannot allocate {}x{} snapshot", width, height))?;

    let data = pixmap.data_mut();
    for x in 0..width {
        let column = view.matrix.column(x);
        for y in 0..height {
            // Image row 0 holds the highest displayed bin.
            let bin = height - 1 - y;
            let t = normalize(column[bin], view.floor, view.ceiling);
            let (r, g, b) = heat_rgb(t);
            let offset = (y * width + x) * 4;
            data[offset] = r;
            data[offset + 1] = g;
            data[offset + 2] = b;
            data[offset + 3] = 255;
        }
    }

    pixmap.save_png(path)?;
    Ok(())
}
