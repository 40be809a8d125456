use super::Rgb;

/// Number of entries in the continuous ramp.
const RAMP_ENTRIES: usize = 256;

/// Undefined-value color of the continuous ramp.
pub(super) const RAMP_UNDEFINED: Rgb = Rgb::new(0.5, 0.0, 0.0);

/// Undefined-value color of the discrete palettes.
pub(super) const SERIES_UNDEFINED: Rgb = Rgb::new(1.0, 0.0, 0.0);

/// Deep blue through to yellow-white: hue 0.7 → 0, saturation 1 → 0,
/// value 0.5 → 1.
#[allow(clippy::cast_precision_loss)]
pub(super) fn hsv_ramp() -> Vec<Rgb> {
    let last = (RAMP_ENTRIES - 1) as f64;
    (0..RAMP_ENTRIES)
        .map(|i| {
            let t = i as f64 / last;
            hsv_to_rgb(0.7 * (1.0 - t), 1.0 - t, 0.5 + 0.5 * t)
        })
        .collect()
}

/// Eight earthy greens and tans, assigned in index order.
pub(super) fn ordinal() -> Vec<Rgb> {
    vec![
        Rgb::from_u8(0, 199, 140),   // turquoise blue
        Rgb::from_u8(60, 179, 113),  // medium sea green
        Rgb::from_u8(48, 128, 20),   // sap green
        Rgb::from_u8(0, 100, 0),     // dark green
        Rgb::from_u8(210, 180, 140), // tan
        Rgb::from_u8(163, 148, 128), // beige
        Rgb::from_u8(245, 245, 220), // light beige
        Rgb::from_u8(255, 228, 196), // bisque
    ]
}

/// Brewer brown/blue-green, 8 classes.
pub(super) fn diverging() -> Vec<Rgb> {
    [
        0x8c_51_0a, 0xbf_81_2d, 0xdf_c2_7d, 0xf6_e8_c3, 0xc7_ea_e5, 0x80_cd_c1, 0x35_97_8f,
        0x01_66_5e,
    ]
    .into_iter()
    .map(Rgb::from_hex)
    .collect()
}

/// Converts HSV (all components in `[0, 1]`) to RGB.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let h6 = (h.rem_euclid(1.0)) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as u8 {
        0 => Rgb::new(v, t, p),
        1 => Rgb::new(q, v, p),
        2 => Rgb::new(p, v, t),
        3 => Rgb::new(p, q, v),
        4 => Rgb::new(t, p, v),
        _ => Rgb::new(v, p, q),
    }
}
