//! GLSL payloads shipped with the mount.
//!
//! The sizing vertex stage is shared by every fragment program. It derives
//! two coordinate systems from the nine sizing uniforms:
//!
//! - object space (`v_objectUV`): a 1:1 box fitted into the viewport, used by
//!   self-contained shapes;
//! - pattern space (`v_patternUV`): aspect-locked to the world box, used by
//!   tileable patterns.
//!
//! Both also expose the world box (`*HelperBox`) so fragments can mask pixels
//! outside the virtual canvas.

use crate::types::{UniformMap, UniformValue};

pub const SIZING_VERTEX_SHADER: &str = r"#version 300 es
precision mediump float;

layout(location = 0) in vec4 a_position;

uniform vec2 u_resolution;
uniform float u_pixelRatio;
uniform float u_originX;
uniform float u_originY;
uniform float u_worldWidth;
uniform float u_worldHeight;
uniform float u_fit;
uniform float u_scale;
uniform float u_rotation;
uniform float u_offsetX;
uniform float u_offsetY;

out vec2 v_objectUV;
out vec2 v_objectBoxSize;
out vec2 v_objectHelperBox;
out vec2 v_patternUV;
out vec2 v_patternBoxSize;
out vec2 v_patternHelperBox;

vec3 getBoxSize(float boxRatio, vec2 givenBoxSize) {
  vec2 box = vec2(0.);
  // fit = none
  box.x = boxRatio * min(givenBoxSize.x / boxRatio, givenBoxSize.y);
  float noFitBoxWidth = box.x;
  if (u_fit == 1.) { // contain
    box.x = boxRatio * min(u_resolution.x / boxRatio, u_resolution.y);
  } else if (u_fit == 2.) { // cover
    box.x = boxRatio * max(u_resolution.x / boxRatio, u_resolution.y);
  }
  box.y = box.x / boxRatio;
  return vec3(box, noFitBoxWidth);
}

vec2 rotate(vec2 uv, float th) {
  return mat2(cos(th), sin(th), -sin(th), cos(th)) * uv;
}

void main() {
  gl_Position = a_position;

  vec2 uv = gl_Position.xy * .5;
  vec2 boxOrigin = vec2(.5 - u_originX, u_originY - .5);
  vec2 givenBoxSize = vec2(u_worldWidth, u_worldHeight);
  givenBoxSize = max(givenBoxSize, vec2(1.)) * u_pixelRatio;
  float r = u_rotation * 3.14159265358979323846 / 180.;
  mat2 graphicRotation = mat2(cos(r), sin(r), -sin(r), cos(r));
  vec2 graphicOffset = vec2(-u_offsetX, u_offsetY);

  // object space: fixed 1:1 box
  float fixedRatio = 1.;
  vec2 fixedRatioBoxGivenSize = vec2(
    (u_worldWidth == 0.) ? u_resolution.x : givenBoxSize.x,
    (u_worldHeight == 0.) ? u_resolution.y : givenBoxSize.y
  );

  v_objectBoxSize = getBoxSize(fixedRatio, fixedRatioBoxGivenSize).xy;
  vec2 objectWorldScale = u_resolution.xy / v_objectBoxSize;

  v_objectUV = uv;
  v_objectUV *= objectWorldScale;
  v_objectUV += boxOrigin * (objectWorldScale - 1.);
  v_objectUV += graphicOffset;
  v_objectUV /= u_scale;
  v_objectUV = graphicRotation * v_objectUV;

  v_objectHelperBox = uv;
  v_objectHelperBox *= objectWorldScale;
  v_objectHelperBox += boxOrigin * (objectWorldScale - 1.);

  // pattern space: aspect follows the world box
  float patternBoxRatio = givenBoxSize.x / givenBoxSize.y;
  vec2 patternBoxGivenSize = vec2(
    (u_worldWidth == 0.) ? u_resolution.x : givenBoxSize.x,
    (u_worldHeight == 0.) ? u_resolution.y : givenBoxSize.y
  );
  patternBoxRatio = patternBoxGivenSize.x / patternBoxGivenSize.y;

  vec3 boxSizeData = getBoxSize(patternBoxRatio, patternBoxGivenSize);
  v_patternBoxSize = boxSizeData.xy;
  float patternBoxNoFitBoxWidth = boxSizeData.z;
  vec2 patternBoxScale = u_resolution.xy / v_patternBoxSize;

  v_patternUV = uv;
  v_patternUV += graphicOffset / patternBoxScale;
  v_patternUV += boxOrigin;
  v_patternUV -= boxOrigin / patternBoxScale;
  v_patternUV *= u_resolution.xy;
  v_patternUV /= u_pixelRatio;
  if (u_fit > 0.) {
    v_patternUV *= (patternBoxNoFitBoxWidth / v_patternBoxSize.x);
  }
  v_patternUV /= u_scale;
  v_patternUV = graphicRotation * v_patternUV;
  v_patternUV += boxOrigin / patternBoxScale;
  v_patternUV -= boxOrigin;
  v_patternUV += .5;

  v_patternHelperBox = uv;
  v_patternHelperBox *= patternBoxScale;
  v_patternHelperBox += boxOrigin * (patternBoxScale - 1.);
}
";

/// Flat fill with `u_colorBack`.
pub const SOLID: &str = r"#version 300 es
precision mediump float;

uniform vec4 u_colorBack;

out vec4 fragColor;

void main() {
  fragColor = vec4(u_colorBack.rgb * u_colorBack.a, u_colorBack.a);
}
";

/// Two-colour gradient along the pattern UV, drifting with `u_time`.
pub const LINEAR_GRADIENT: &str = r"#version 300 es
precision mediump float;

uniform float u_time;
uniform vec4 u_colorFront;
uniform vec4 u_colorBack;

in vec2 v_patternUV;

out vec4 fragColor;

void main() {
  float t = fract(v_patternUV.x * .002 + u_time * .1);
  t = abs(t * 2. - 1.);
  vec4 color = mix(u_colorBack, u_colorFront, smoothstep(0., 1., t));
  fragColor = vec4(color.rgb * color.a, color.a);
}
";

/// Samples `u_image` into the object box, letterboxed by its aspect ratio.
pub const IMAGE_FILL: &str = r"#version 300 es
precision mediump float;

uniform sampler2D u_image;
uniform float u_image_aspect_ratio;
uniform vec4 u_colorBack;

in vec2 v_objectUV;

out vec4 fragColor;

void main() {
  vec2 uv = v_objectUV;
  if (u_image_aspect_ratio > 1.) {
    uv.y *= u_image_aspect_ratio;
  } else {
    uv.x /= u_image_aspect_ratio;
  }
  uv += .5;
  vec4 color = u_colorBack;
  if (uv.x >= 0. && uv.x <= 1. && uv.y >= 0. && uv.y <= 1.) {
    color = texture(u_image, vec2(uv.x, 1. - uv.y));
  }
  fragColor = vec4(color.rgb * color.a, color.a);
}
";

/// Looks up one of the bundled fragment programs by name.
pub fn builtin_fragment(name: &str) -> Option<&'static str> {
    match name {
        "solid" => Some(SOLID),
        "linear-gradient" => Some(LINEAR_GRADIENT),
        "image-fill" => Some(IMAGE_FILL),
        _ => None,
    }
}

pub const BUILTIN_NAMES: [&str; 3] = ["solid", "linear-gradient", "image-fill"];

/// How the world box maps into the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    None,
    #[default]
    Contain,
    Cover,
}

impl FitMode {
    pub fn as_uniform(self) -> f32 {
        match self {
            FitMode::None => 0.0,
            FitMode::Contain => 1.0,
            FitMode::Cover => 2.0,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(FitMode::None),
            "contain" => Some(FitMode::Contain),
            "cover" => Some(FitMode::Cover),
            _ => None,
        }
    }
}

/// The nine sizing parameters consumed by [`SIZING_VERTEX_SHADER`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderSizing {
    pub fit: FitMode,
    pub scale: f32,
    /// Degrees.
    pub rotation: f32,
    pub origin_x: f32,
    pub origin_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    /// `0` means "follow the viewport".
    pub world_width: f32,
    pub world_height: f32,
}

impl Default for ShaderSizing {
    fn default() -> Self {
        Self {
            fit: FitMode::Contain,
            scale: 1.0,
            rotation: 0.0,
            origin_x: 0.5,
            origin_y: 0.5,
            offset_x: 0.0,
            offset_y: 0.0,
            world_width: 0.0,
            world_height: 0.0,
        }
    }
}

impl ShaderSizing {
    pub fn to_uniforms(&self) -> UniformMap {
        let entries = [
            ("u_fit", self.fit.as_uniform()),
            ("u_scale", self.scale),
            ("u_rotation", self.rotation),
            ("u_originX", self.origin_x),
            ("u_originY", self.origin_y),
            ("u_offsetX", self.offset_x),
            ("u_offsetY", self.offset_y),
            ("u_worldWidth", self.world_width),
            ("u_worldHeight", self.world_height),
        ];
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), UniformValue::Float(value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_defaults_produce_nine_floats() {
        let uniforms = ShaderSizing::default().to_uniforms();
        assert_eq!(uniforms.len(), 9);
        assert_eq!(uniforms.get("u_fit"), Some(&UniformValue::Float(1.0)));
        assert_eq!(uniforms.get("u_originX"), Some(&UniformValue::Float(0.5)));
        assert_eq!(uniforms.get("u_worldWidth"), Some(&UniformValue::Float(0.0)));
    }

    #[test]
    fn vertex_stage_declares_every_sizing_uniform() {
        for name in ShaderSizing::default().to_uniforms().keys() {
            assert!(
                SIZING_VERTEX_SHADER.contains(&format!("uniform float {name};")),
                "missing {name}"
            );
        }
        assert!(SIZING_VERTEX_SHADER.contains("in vec4 a_position"));
    }

    #[test]
    fn builtins_resolve_by_name() {
        for name in BUILTIN_NAMES {
            assert!(builtin_fragment(name).is_some());
        }
        assert!(builtin_fragment("metaballs").is_none());
        assert!(IMAGE_FILL.contains("u_image_aspect_ratio"));
    }

    #[test]
    fn fit_mode_parses_case_insensitively() {
        assert_eq!(FitMode::parse("Cover"), Some(FitMode::Cover));
        assert_eq!(FitMode::parse(" none "), Some(FitMode::None));
        assert_eq!(FitMode::parse("stretch"), None);
    }
}
