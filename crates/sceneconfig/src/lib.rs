use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use shadermount::{
    builtin_fragment, parse_color, ColorError, ContextAttributes, FitMode, MountOptions,
    PowerPreference, ShaderSizing, TextureError, TextureImage, UniformMap, UniformValue,
    BUILTIN_NAMES,
};

mod assignment;

pub use assignment::parse_assignment;

/// Prefix selecting one of the shaders compiled into `shadermount`.
pub const BUILTIN_PREFIX: &str = "builtin:";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("uniform '{uniform}' has an invalid colour: {source}")]
    Color {
        uniform: String,
        #[source]
        source: ColorError,
    },
    #[error("uniform '{uniform}' could not load {path}: {source}")]
    Texture {
        uniform: String,
        path: PathBuf,
        #[source]
        source: TextureError,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    pub version: u32,
    /// Fragment shader path relative to the scene file, or `builtin:<name>`.
    pub shader: String,
    #[serde(default)]
    pub playback: Playback,
    #[serde(default)]
    pub display: Display,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub sizing: SizingSection,
    #[serde(default)]
    pub uniforms: BTreeMap<String, UniformSetting>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Playback {
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Where the animation clock starts.
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub start: Option<Duration>,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            start: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Display {
    pub min_pixel_ratio: Option<f64>,
    pub max_pixel_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextSection {
    pub alpha: Option<bool>,
    pub premultiplied_alpha: Option<bool>,
    pub antialias: Option<bool>,
    pub preserve_drawing_buffer: Option<bool>,
    pub power_preference: Option<PowerPreferenceSetting>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreferenceSetting {
    Default,
    LowPower,
    HighPerformance,
}

impl From<PowerPreferenceSetting> for PowerPreference {
    fn from(value: PowerPreferenceSetting) -> Self {
        match value {
            PowerPreferenceSetting::Default => PowerPreference::Default,
            PowerPreferenceSetting::LowPower => PowerPreference::LowPower,
            PowerPreferenceSetting::HighPerformance => PowerPreference::HighPerformance,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowSection {
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SizingSection {
    pub fit: Option<FitSetting>,
    pub scale: Option<f32>,
    pub rotation: Option<f32>,
    pub origin_x: Option<f32>,
    pub origin_y: Option<f32>,
    pub offset_x: Option<f32>,
    pub offset_y: Option<f32>,
    pub world_width: Option<f32>,
    pub world_height: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitSetting {
    None,
    Contain,
    Cover,
}

impl From<FitSetting> for FitMode {
    fn from(value: FitSetting) -> Self {
        match value {
            FitSetting::None => FitMode::None,
            FitSetting::Contain => FitMode::Contain,
            FitSetting::Cover => FitMode::Cover,
        }
    }
}

/// A uniform as written in a scene: `u_speed = { float = 0.5 }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformSetting {
    Float(f32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major.
    Mat3([[f32; 3]; 3]),
    /// Column-major.
    Mat4([[f32; 4]; 4]),
    Color(String),
    Colors(Vec<String>),
    /// Relative to the scene file.
    Image(PathBuf),
}

impl UniformSetting {
    pub fn kind(&self) -> &'static str {
        match self {
            UniformSetting::Float(_) => "float",
            UniformSetting::Bool(_) => "bool",
            UniformSetting::Vec2(_) => "vec2",
            UniformSetting::Vec3(_) => "vec3",
            UniformSetting::Vec4(_) => "vec4",
            UniformSetting::Mat3(_) => "mat3",
            UniformSetting::Mat4(_) => "mat4",
            UniformSetting::Color(_) => "color",
            UniformSetting::Colors(_) => "colors",
            UniformSetting::Image(_) => "image",
        }
    }

    /// Converts to the runtime value, decoding colours and loading images
    /// relative to `base_dir`.
    pub fn resolve(&self, name: &str, base_dir: &Path) -> Result<UniformValue, ConfigError> {
        let color = |raw: &str| {
            parse_color(raw).map_err(|source| ConfigError::Color {
                uniform: name.to_string(),
                source,
            })
        };

        let value = match self {
            UniformSetting::Float(value) => UniformValue::Float(*value),
            UniformSetting::Bool(value) => UniformValue::Bool(*value),
            UniformSetting::Vec2(value) => UniformValue::Vec2(*value),
            UniformSetting::Vec3(value) => UniformValue::Vec3(*value),
            UniformSetting::Vec4(value) => UniformValue::Vec4(*value),
            UniformSetting::Mat3(value) => UniformValue::Mat3(*value),
            UniformSetting::Mat4(value) => UniformValue::Mat4(*value),
            UniformSetting::Color(raw) => UniformValue::Vec4(color(raw)?),
            UniformSetting::Colors(raws) => UniformValue::Vec4Array(
                raws.iter()
                    .map(|raw| color(raw))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            UniformSetting::Image(path) => {
                let path = base_dir.join(path);
                let image = TextureImage::open(&path).map_err(|source| ConfigError::Texture {
                    uniform: name.to_string(),
                    path: path.clone(),
                    source,
                })?;
                UniformValue::Texture(image)
            }
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "paperview".to_string(),
            width: 960,
            height: 540,
        }
    }
}

/// Everything needed to construct a mount.
#[derive(Debug, Clone)]
pub struct ResolvedScene {
    pub fragment_source: String,
    pub uniforms: UniformMap,
    pub options: MountOptions,
    pub window: WindowSettings,
}

fn default_speed() -> f64 {
    1.0
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl SceneConfig {
    /// A scene with only a shader and every other setting at its default.
    pub fn with_shader(shader: impl Into<String>) -> Self {
        Self {
            version: 1,
            shader: shader.into(),
            playback: Playback::default(),
            display: Display::default(),
            context: ContextSection::default(),
            window: WindowSection::default(),
            sizing: SizingSection::default(),
            uniforms: BTreeMap::new(),
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SceneConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn builtin_name(&self) -> Option<&str> {
        self.shader.strip_prefix(BUILTIN_PREFIX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.shader.trim().is_empty() {
            return Err(ConfigError::Invalid("shader may not be empty".into()));
        }

        if let Some(name) = self.builtin_name() {
            if builtin_fragment(name).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "unknown builtin shader '{name}'; expected one of {}",
                    BUILTIN_NAMES.join(", ")
                )));
            }
        }

        if !self.playback.speed.is_finite() {
            return Err(ConfigError::Invalid("playback.speed must be finite".into()));
        }

        if let Some(ratio) = self.display.min_pixel_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(ConfigError::Invalid(
                    "display.min_pixel_ratio must be > 0".into(),
                ));
            }
        }

        if self.display.max_pixel_count == Some(0) {
            return Err(ConfigError::Invalid(
                "display.max_pixel_count must be > 0".into(),
            ));
        }

        if self.window.width == Some(0) || self.window.height == Some(0) {
            return Err(ConfigError::Invalid(
                "window width and height must be > 0".into(),
            ));
        }

        if let Some(scale) = self.sizing.scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ConfigError::Invalid("sizing.scale must be > 0".into()));
            }
        }

        for (name, setting) in &self.uniforms {
            validate_uniform(name, setting)?;
        }

        Ok(())
    }

    pub fn shader_sizing(&self) -> ShaderSizing {
        let defaults = ShaderSizing::default();
        let sizing = &self.sizing;
        ShaderSizing {
            fit: sizing.fit.map(FitMode::from).unwrap_or(defaults.fit),
            scale: sizing.scale.unwrap_or(defaults.scale),
            rotation: sizing.rotation.unwrap_or(defaults.rotation),
            origin_x: sizing.origin_x.unwrap_or(defaults.origin_x),
            origin_y: sizing.origin_y.unwrap_or(defaults.origin_y),
            offset_x: sizing.offset_x.unwrap_or(defaults.offset_x),
            offset_y: sizing.offset_y.unwrap_or(defaults.offset_y),
            world_width: sizing.world_width.unwrap_or(defaults.world_width),
            world_height: sizing.world_height.unwrap_or(defaults.world_height),
        }
    }

    pub fn context_attributes(&self) -> ContextAttributes {
        let defaults = ContextAttributes::default();
        let context = &self.context;
        ContextAttributes {
            alpha: context.alpha.unwrap_or(defaults.alpha),
            premultiplied_alpha: context
                .premultiplied_alpha
                .unwrap_or(defaults.premultiplied_alpha),
            antialias: context.antialias.unwrap_or(defaults.antialias),
            preserve_drawing_buffer: context
                .preserve_drawing_buffer
                .unwrap_or(defaults.preserve_drawing_buffer),
            power_preference: context
                .power_preference
                .map(PowerPreference::from)
                .unwrap_or(defaults.power_preference),
        }
    }

    pub fn mount_options(&self) -> MountOptions {
        let mut options = MountOptions::new()
            .with_speed(self.playback.speed)
            .with_frame(
                self.playback
                    .start
                    .map(|start| start.as_secs_f64() * 1000.0)
                    .unwrap_or(0.0),
            );
        if let Some(ratio) = self.display.min_pixel_ratio {
            options = options.with_min_pixel_ratio(ratio);
        }
        if let Some(count) = self.display.max_pixel_count {
            options = options.with_max_pixel_count(count);
        }
        options.context = self.context_attributes();
        options
    }

    pub fn window_settings(&self) -> WindowSettings {
        let defaults = WindowSettings::default();
        WindowSettings {
            title: self.window.title.clone().unwrap_or(defaults.title),
            width: self.window.width.unwrap_or(defaults.width),
            height: self.window.height.unwrap_or(defaults.height),
        }
    }

    /// Loads the shader source and every uniform. Paths are relative to
    /// `base_dir`. Sizing uniforms come first so explicit `[uniforms]`
    /// entries can override them.
    pub fn resolve(&self, base_dir: &Path) -> Result<ResolvedScene, ConfigError> {
        self.validate()?;

        let fragment_source = match self.builtin_name() {
            Some(name) => builtin_fragment(name)
                .map(str::to_string)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown builtin shader '{name}'")))?,
            None => {
                let path = base_dir.join(&self.shader);
                fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })?
            }
        };

        let mut uniforms = self.shader_sizing().to_uniforms();
        for (name, setting) in &self.uniforms {
            uniforms.insert(name.clone(), setting.resolve(name, base_dir)?);
        }

        Ok(ResolvedScene {
            fragment_source,
            uniforms,
            options: self.mount_options(),
            window: self.window_settings(),
        })
    }
}

fn validate_uniform(name: &str, setting: &UniformSetting) -> Result<(), ConfigError> {
    let valid_name = name
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_')
        && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid_name {
        return Err(ConfigError::Invalid(format!(
            "uniform name '{name}' is not a valid GLSL identifier"
        )));
    }

    let check_color = |raw: &str| {
        parse_color(raw)
            .map(|_| ())
            .map_err(|source| ConfigError::Color {
                uniform: name.to_string(),
                source,
            })
    };

    match setting {
        UniformSetting::Color(raw) => check_color(raw)?,
        UniformSetting::Colors(raws) => {
            if raws.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "uniform '{name}' colors list must not be empty"
                )));
            }
            for raw in raws {
                check_color(raw)?;
            }
        }
        UniformSetting::Image(path) => {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "uniform '{name}' image path must not be empty"
                )));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1
shader = "builtin:linear-gradient"

[playback]
speed = 0.5
start = "2s 500ms"

[display]
min_pixel_ratio = 1.5
max_pixel_count = 2073600

[context]
antialias = false
power_preference = "high-performance"

[window]
title = "gradient"
width = 640
height = 360

[sizing]
fit = "cover"
scale = 2

[uniforms]
u_colorFront = { color = "#ff0000" }
u_colorBack = { color = "rgba(0, 0, 255, 0.5)" }
u_palette = { colors = ["#000", "#fff"] }
u_intensity = { float = 1 }
u_enabled = { bool = true }
u_offset = { vec2 = [0.25, 0.75] }
"##;

    #[test]
    fn parses_sample_config() {
        let config = SceneConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.builtin_name(), Some("linear-gradient"));
        assert_eq!(config.playback.start, Some(Duration::from_millis(2500)));
        assert_eq!(config.sizing.fit, Some(FitSetting::Cover));
        assert_eq!(
            config.uniforms.get("u_intensity"),
            Some(&UniformSetting::Float(1.0))
        );
        assert_eq!(
            config.uniforms.get("u_offset"),
            Some(&UniformSetting::Vec2([0.25, 0.75]))
        );
    }

    #[test]
    fn mount_options_follow_sections() {
        let config = SceneConfig::from_toml_str(SAMPLE).unwrap();
        let options = config.mount_options();
        assert_eq!(options.speed, 0.5);
        assert_eq!(options.frame, 2500.0);
        assert_eq!(options.min_pixel_ratio, 1.5);
        assert_eq!(options.max_pixel_count, 2_073_600);
        assert!(!options.context.antialias);
        assert!(options.context.alpha);
        assert_eq!(
            options.context.power_preference,
            PowerPreference::HighPerformance
        );
    }

    #[test]
    fn minimal_scene_uses_defaults() {
        let config = SceneConfig::from_toml_str(
            r#"
version = 1
shader = "builtin:solid"
"#,
        )
        .unwrap();
        let options = config.mount_options();
        assert_eq!(options.speed, 1.0);
        assert_eq!(options.frame, 0.0);
        assert_eq!(options.min_pixel_ratio, shadermount::DEFAULT_MIN_PIXEL_RATIO);
        assert_eq!(config.window_settings(), WindowSettings::default());
        assert_eq!(config.shader_sizing(), ShaderSizing::default());
    }

    #[test]
    fn numeric_start_is_seconds() {
        let config = SceneConfig::from_toml_str(
            r#"
version = 1
shader = "builtin:solid"

[playback]
start = 1.25
"#,
        )
        .unwrap();
        assert_eq!(config.mount_options().frame, 1250.0);
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = SceneConfig::from_toml_str("version = 2\nshader = \"builtin:solid\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_builtin() {
        let err =
            SceneConfig::from_toml_str("version = 1\nshader = \"builtin:plasma\"\n").unwrap_err();
        assert!(err.to_string().contains("plasma"));
    }

    #[test]
    fn rejects_bad_colour() {
        let err = SceneConfig::from_toml_str(
            r##"
version = 1
shader = "builtin:solid"

[uniforms]
u_colorBack = { color = "#12" }
"##,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Color { ref uniform, .. } if uniform == "u_colorBack"));
    }

    #[test]
    fn rejects_invalid_uniform_name() {
        let err = SceneConfig::from_toml_str(
            r#"
version = 1
shader = "builtin:solid"

[uniforms]
"1bad" = { float = 1.0 }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_uniform_kind() {
        let err = SceneConfig::from_toml_str(
            r#"
version = 1
shader = "builtin:solid"

[uniforms]
u_x = { ivec2 = [1, 2] }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_pixel_budget() {
        let err = SceneConfig::from_toml_str(
            r#"
version = 1
shader = "builtin:solid"

[display]
max_pixel_count = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn resolves_builtin_with_sizing_and_overrides() {
        let config = SceneConfig::from_toml_str(SAMPLE).unwrap();
        let scene = config.resolve(Path::new(".")).unwrap();
        assert_eq!(
            scene.fragment_source,
            builtin_fragment("linear-gradient").unwrap()
        );
        assert_eq!(scene.uniforms.get("u_fit"), Some(&UniformValue::Float(2.0)));
        assert_eq!(scene.uniforms.get("u_scale"), Some(&UniformValue::Float(2.0)));
        assert_eq!(
            scene.uniforms.get("u_colorFront"),
            Some(&UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]))
        );
        assert_eq!(
            scene.uniforms.get("u_palette"),
            Some(&UniformValue::Vec4Array(vec![
                [0.0, 0.0, 0.0, 1.0],
                [1.0, 1.0, 1.0, 1.0]
            ]))
        );
        assert_eq!(scene.window.title, "gradient");
        assert_eq!((scene.window.width, scene.window.height), (640, 360));
    }

    #[test]
    fn explicit_uniform_overrides_sizing() {
        let config = SceneConfig::from_toml_str(
            r#"
version = 1
shader = "builtin:solid"

[uniforms]
u_scale = { float = 3.0 }
"#,
        )
        .unwrap();
        let scene = config.resolve(Path::new(".")).unwrap();
        assert_eq!(scene.uniforms.get("u_scale"), Some(&UniformValue::Float(3.0)));
    }

    #[test]
    fn resolves_relative_shader_and_image() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("wave.frag"), "void main() {}\n").unwrap();
        image::RgbaImage::from_pixel(4, 2, image::Rgba([255, 0, 0, 255]))
            .save(dir.path().join("tex.png"))
            .unwrap();

        let config = SceneConfig::from_toml_str(
            r#"
version = 1
shader = "wave.frag"

[uniforms]
u_image = { image = "tex.png" }
"#,
        )
        .unwrap();
        let scene = config.resolve(dir.path()).unwrap();
        assert_eq!(scene.fragment_source, "void main() {}\n");
        let texture = scene.uniforms["u_image"].as_texture().unwrap();
        assert_eq!((texture.width(), texture.height()), (4, 2));
    }

    #[test]
    fn missing_shader_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = SceneConfig::with_shader("missing.frag");
        let err = config.resolve(dir.path()).unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert!(path.ends_with("missing.frag")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_reads_scene_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.toml");
        fs::write(&path, SAMPLE).unwrap();
        let config = SceneConfig::load(&path).unwrap();
        assert_eq!(config.window_settings().title, "gradient");
    }
}
