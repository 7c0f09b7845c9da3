//! CSS-style colour strings → normalized RGBA.
//!
//! Supports `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb()`/`rgba()` with
//! 0–255 channels, and `hsl()`/`hsla()` with degrees and percentages. Alpha
//! may be a 0–1 number or a percentage. Commas and whitespace both separate
//! arguments, and `/` before alpha is accepted.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("colour string is empty")]
    Empty,
    #[error("invalid hex colour '{0}'")]
    Hex(String),
    #[error("expected {expected} components in '{input}'")]
    Arity { input: String, expected: &'static str },
    #[error("invalid number '{0}' in colour")]
    Number(String),
    #[error("unsupported colour syntax '{0}'")]
    Unsupported(String),
}

/// Parses `input` into `[r, g, b, a]` with every channel in `0.0..=1.0`.
pub fn parse_color(input: &str) -> Result<[f32; 4], ColorError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ColorError::Empty);
    }

    if let Some(hex) = trimmed.strip_prefix('#') {
        return parse_hex(hex).ok_or_else(|| ColorError::Hex(trimmed.to_string()));
    }

    let lower = trimmed.to_ascii_lowercase();
    if let Some(args) = function_args(&lower, &["rgba", "rgb"]) {
        return parse_rgb(trimmed, args);
    }
    if let Some(args) = function_args(&lower, &["hsla", "hsl"]) {
        return parse_hsl(trimmed, args);
    }

    Err(ColorError::Unsupported(trimmed.to_string()))
}

fn function_args<'a>(lower: &'a str, names: &[&str]) -> Option<&'a str> {
    for name in names {
        if let Some(rest) = lower.strip_prefix(name) {
            let rest = rest.trim_start();
            if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
                return Some(inner);
            }
        }
    }
    None
}

fn parse_hex(hex: &str) -> Option<[f32; 4]> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let digits: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(16).map(|d| d as u8))
        .collect();
    let channels: Vec<u8> = match digits.len() {
        3 | 4 => digits.iter().map(|d| d * 17).collect(),
        6 | 8 => digits.chunks(2).map(|pair| pair[0] * 16 + pair[1]).collect(),
        _ => return None,
    };
    let alpha = channels.get(3).copied().unwrap_or(255);
    Some([
        channels[0] as f32 / 255.0,
        channels[1] as f32 / 255.0,
        channels[2] as f32 / 255.0,
        alpha as f32 / 255.0,
    ])
}

fn split_args(args: &str) -> Vec<&str> {
    args.split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect()
}

fn number(token: &str) -> Result<f32, ColorError> {
    token
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ColorError::Number(token.to_string()))
}

fn alpha(token: &str) -> Result<f32, ColorError> {
    let value = match token.strip_suffix('%') {
        Some(percent) => number(percent)? / 100.0,
        None => number(token)?,
    };
    Ok(value.clamp(0.0, 1.0))
}

fn parse_rgb(input: &str, args: &str) -> Result<[f32; 4], ColorError> {
    let parts = split_args(args);
    if parts.len() != 3 && parts.len() != 4 {
        return Err(ColorError::Arity {
            input: input.to_string(),
            expected: "3 or 4",
        });
    }

    let mut out = [0.0, 0.0, 0.0, 1.0];
    for (slot, token) in out.iter_mut().zip(parts.iter().take(3)) {
        let value = match token.strip_suffix('%') {
            Some(percent) => number(percent)? / 100.0,
            None => number(token)? / 255.0,
        };
        *slot = value.clamp(0.0, 1.0);
    }
    if let Some(token) = parts.get(3) {
        out[3] = alpha(token)?;
    }
    Ok(out)
}

fn parse_hsl(input: &str, args: &str) -> Result<[f32; 4], ColorError> {
    let parts = split_args(args);
    if parts.len() != 3 && parts.len() != 4 {
        return Err(ColorError::Arity {
            input: input.to_string(),
            expected: "3 or 4",
        });
    }

    let hue = number(parts[0].trim_end_matches("deg"))?;
    let saturation = (number(parts[1].trim_end_matches('%'))? / 100.0).clamp(0.0, 1.0);
    let lightness = (number(parts[2].trim_end_matches('%'))? / 100.0).clamp(0.0, 1.0);
    let a = match parts.get(3) {
        Some(token) => alpha(token)?,
        None => 1.0,
    };

    let [r, g, b] = hsl_to_rgb(hue, saturation, lightness);
    Ok([r, g, b, a])
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [f32; 3] {
    let h = hue.rem_euclid(360.0) / 360.0;
    if saturation == 0.0 {
        return [lightness; 3];
    }
    let q = if lightness < 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;
    [
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: [f32; 4], expected: [f32; 4]) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-3, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn parses_short_and_long_hex() {
        assert_close(parse_color("#fff").unwrap(), [1.0, 1.0, 1.0, 1.0]);
        assert_close(parse_color("#ff000080").unwrap(), [1.0, 0.0, 0.0, 128.0 / 255.0]);
        assert_close(parse_color("#0f08").unwrap(), [0.0, 1.0, 0.0, 0.5333]);
        assert_close(parse_color("  #336699 ").unwrap(), [0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(parse_color("#12"), Err(ColorError::Hex(_))));
        assert!(matches!(parse_color("#zzzzzz"), Err(ColorError::Hex(_))));
    }

    #[test]
    fn parses_rgb_functions() {
        assert_close(parse_color("rgb(255, 0, 0)").unwrap(), [1.0, 0.0, 0.0, 1.0]);
        assert_close(parse_color("rgba(0, 0, 255, 0.25)").unwrap(), [0.0, 0.0, 1.0, 0.25]);
        assert_close(parse_color("rgb(0 128 0 / 50%)").unwrap(), [0.0, 0.502, 0.0, 0.5]);
    }

    #[test]
    fn parses_hsl_functions() {
        assert_close(parse_color("hsl(0, 100%, 50%)").unwrap(), [1.0, 0.0, 0.0, 1.0]);
        assert_close(parse_color("hsl(120deg 100% 25%)").unwrap(), [0.0, 0.5, 0.0, 1.0]);
        assert_close(parse_color("hsla(240, 100%, 50%, 0.5)").unwrap(), [0.0, 0.0, 1.0, 0.5]);
        assert_close(parse_color("hsl(0, 0%, 40%)").unwrap(), [0.4, 0.4, 0.4, 1.0]);
    }

    #[test]
    fn reports_arity_and_syntax_errors() {
        assert!(matches!(parse_color("rgb(1, 2)"), Err(ColorError::Arity { .. })));
        assert!(matches!(parse_color("rgb(a, 2, 3)"), Err(ColorError::Number(_))));
        assert!(matches!(parse_color("papayawhip"), Err(ColorError::Unsupported(_))));
        assert_eq!(parse_color("   "), Err(ColorError::Empty));
    }
}
