use once_cell::sync::Lazy;

/// 256-entry RGB lookup table for the "jet" false-color gradient
/// (dark blue -> cyan -> yellow -> dark red).
static JET_LUT: Lazy<[[u8; 3]; 256]> = Lazy::new(|| {
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let x = i as f32 / 255.0;
        let channel = |offset: f32| {
            ((1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0) * 255.0).round() as u8
        };
        *entry = [channel(3.0), channel(2.0), channel(1.0)];
    }
    lut
});

pub fn jet(value: u8) -> [u8; 3] {
    JET_LUT[value as usize]
}

#[cfg(test)]
mod tests {
    use super::jet;

    #[test]
    fn jet_endpoints_are_dark_blue_and_dark_red() {
        assert_eq!(jet(0), [0, 0, 128]);
        assert_eq!(jet(255), [128, 0, 0]);
    }

    #[test]
    fn jet_midpoint_is_green_dominant() {
        let [r, g, b] = jet(128);
        assert_eq!(g, 255);
        assert!(r > 100 && b > 100);
    }
}
