//! Color ramps and the multi-stop interpolation engine.

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A color stop: position in [0, 1] mapped to a color with unit channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub t: f64,
    pub rgb: [f64; 3],
}

impl ColorStop {
    pub const fn new(t: f64, r: f64, g: f64, b: f64) -> Self {
        Self { t, rgb: [r, g, b] }
    }
}

/// A piecewise-linear color ramp over [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRamp {
    pub name: &'static str,
    pub stops: &'static [ColorStop],
}

const CONCENTRATION_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 0.0, 0.0, 1.0),
    ColorStop::new(0.50, 0.0, 1.0, 1.0),
    ColorStop::new(0.75, 1.0, 1.0, 0.0),
    ColorStop::new(1.00, 1.0, 0.0, 0.0),
];

impl ColorRamp {
    /// Blue -> Cyan (0.5) -> Yellow (0.75) -> Red
    pub const CONCENTRATION: ColorRamp = ColorRamp {
        name: "concentration",
        stops: CONCENTRATION_STOPS,
    };

    /// Evaluate the ramp at normalized position `t`, clamped to [0, 1].
    ///
    /// Channels are scaled by 255 and truncated.
    pub fn evaluate(&self, t: f64) -> Rgb {
        let [r, g, b] = multi_stop(self.stops, t);
        Rgb::new(to_byte(r), to_byte(g), to_byte(b))
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self::CONCENTRATION
    }
}

fn to_byte(c: f64) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0) as u8
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn multi_stop(stops: &[ColorStop], t: f64) -> [f64; 3] {
    let (first, last) = match (stops.first(), stops.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return [0.0; 3],
    };
    if t.is_nan() || t <= first.t {
        return first.rgb;
    }
    if t >= last.t {
        return last.rgb;
    }
    for pair in stops.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        if t <= hi.t {
            let ratio = (t - lo.t) / (hi.t - lo.t);
            return [
                lerp(lo.rgb[0], hi.rgb[0], ratio),
                lerp(lo.rgb[1], hi.rgb[1], ratio),
                lerp(lo.rgb[2], hi.rgb[2], ratio),
            ];
        }
    }
    last.rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concentration_stops() {
        let ramp = ColorRamp::CONCENTRATION;
        assert_eq!(ramp.evaluate(0.0), Rgb::new(0, 0, 255));
        assert_eq!(ramp.evaluate(0.5), Rgb::new(0, 255, 255));
        assert_eq!(ramp.evaluate(0.75), Rgb::new(255, 255, 0));
        assert_eq!(ramp.evaluate(1.0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn concentration_truncates_channels() {
        // Halfway from blue to cyan: g = 0.5 * 255 = 127.5
        assert_eq!(ColorRamp::CONCENTRATION.evaluate(0.25), Rgb::new(0, 127, 255));
    }

    #[test]
    fn clamping_outside_unit_range() {
        let ramp = ColorRamp::default();
        assert_eq!(ramp.evaluate(-0.5), Rgb::new(0, 0, 255));
        assert_eq!(ramp.evaluate(1.5), Rgb::new(255, 0, 0));
        assert_eq!(ramp.evaluate(f64::NAN), Rgb::new(0, 0, 255));
    }
}
