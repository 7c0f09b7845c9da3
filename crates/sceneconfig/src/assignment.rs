//! `NAME=KIND:VALUE` uniform overrides from the command line.

use std::path::PathBuf;

use crate::{ConfigError, UniformSetting};

/// Parses `u_speed=float:0.5`, `u_colorBack=color:#112233`,
/// `u_offset=vec2:0.1,0.2`, `u_on=bool:true` or `u_image=image:tex.png`.
pub fn parse_assignment(input: &str) -> Result<(String, UniformSetting), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid(format!("override '{input}': {reason}"));

    let (name, rest) = input
        .split_once('=')
        .ok_or_else(|| invalid("expected NAME=KIND:VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("uniform name is empty"));
    }
    let (kind, value) = rest
        .split_once(':')
        .ok_or_else(|| invalid("expected KIND:VALUE after '='"))?;
    let value = value.trim();

    let setting = match kind.trim().to_ascii_lowercase().as_str() {
        "float" => UniformSetting::Float(parse_float(value).ok_or_else(|| invalid("not a number"))?),
        "bool" => UniformSetting::Bool(parse_bool(value).ok_or_else(|| invalid("not a boolean"))?),
        "vec2" => UniformSetting::Vec2(parse_vector(value).ok_or_else(|| invalid("expected 2 numbers"))?),
        "vec3" => UniformSetting::Vec3(parse_vector(value).ok_or_else(|| invalid("expected 3 numbers"))?),
        "vec4" => UniformSetting::Vec4(parse_vector(value).ok_or_else(|| invalid("expected 4 numbers"))?),
        "color" => UniformSetting::Color(value.to_string()),
        "colors" => UniformSetting::Colors(value.split(';').map(|c| c.trim().to_string()).collect()),
        "image" => UniformSetting::Image(PathBuf::from(value)),
        other => return Err(invalid(&format!("unsupported kind '{other}'"))),
    };

    Ok((name.to_string(), setting))
}

fn parse_float(value: &str) -> Option<f32> {
    value.parse::<f32>().ok().filter(|v| v.is_finite())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn parse_vector<const N: usize>(value: &str) -> Option<[f32; N]> {
    let parts = value
        .split(',')
        .map(|part| parse_float(part.trim()))
        .collect::<Option<Vec<_>>>()?;
    parts.try_into().ok()
}
