//! Color ramp for heatmap cells
//!
//! A compact approximation of the magma colormap, linearly
//! interpolated between anchor colors.

/// Ramp anchors, evenly spaced over [0, 1], dark to bright.
const RAMP: [(u8, u8, u8); 5] = [
    (0, 0, 4),
    (81, 18, 124),
    (183, 55, 121),
    (252, 137, 97),
    (252, 253, 191),
];

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

/// Map a normalized value in [0, 1] to an RGB color on the ramp.
pub fn heat_rgb(value: f32) -> (u8, u8, u8) {
    let t = value.clamp(0.0, 1.0) * (RAMP.len() - 1) as f32;
    let i = (t.floor() as usize).min(RAMP.len() - 2);
    let frac = t - i as f32;
    let (r0, g0, b0) = RAMP[i];
    let (r1, g1, b1) = RAMP[i + 1];
    (lerp(r0, r1, frac), lerp(g0, g1, frac), lerp(b0, b1, frac))
}

/// Normalize a cell value into [0, 1] within the display range.
pub fn normalize(value: f32, floor: f32, ceiling: f32) -> f32 {
    if ceiling <= floor {
        return 0.0;
    }
    ((value - floor) / (ceiling - floor)).clamp(0.0, 1.0)
}
