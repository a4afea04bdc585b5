//! Numeric helpers shared by reducers, the estimator and answer formatting.

/// Parse a string as a finite number.
///
/// Surrounding whitespace is ignored. `inf` and `NaN` spellings are rejected
/// because no reducer can fold them meaningfully.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Whether the text parses as a finite number.
pub fn is_numeric(text: &str) -> bool {
    parse_number(text).is_some()
}

/// Parse the text as a number, falling back to `default`.
pub fn get_number(text: &str, default: f64) -> f64 {
    parse_number(text).unwrap_or(default)
}

/// Round `x` to `digits` significant figures.
///
/// Zero, non-finite input and `digits == 0` are returned unchanged.
pub fn round_sig(x: f64, digits: u32) -> f64 {
    if x == 0.0 || !x.is_finite() || digits == 0 {
        return x;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let exponent = digits as i32 - 1 - magnitude;
    let rounded = if exponent >= 0 {
        let scale = 10f64.powi(exponent);
        (x * scale).round() / scale
    } else {
        let scale = 10f64.powi(-exponent);
        (x / scale).round() * scale
    };
    if rounded.is_finite() { rounded } else { x }
}

/// Render a number the way answers are reported: integral values carry no
/// fractional part.
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}
