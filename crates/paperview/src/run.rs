use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sceneconfig::{parse_assignment, ResolvedScene, SceneConfig};
use shadermount::parse_color;
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckArgs, ColorArgs, RunArgs};
use crate::window;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let scene = prepare_scene(&args)?;
    tracing::info!(
        uniforms = scene.uniforms.len(),
        speed = scene.options.speed,
        frame = scene.options.frame,
        width = scene.window.width,
        height = scene.window.height,
        "opening shader preview"
    );
    window::run_window(scene)
}

/// Loads the scene named on the command line and applies every override.
pub fn prepare_scene(args: &RunArgs) -> Result<ResolvedScene> {
    let (mut config, base_dir) = load_config(args)?;

    for raw in &args.overrides {
        let (name, setting) = parse_assignment(raw)?;
        tracing::debug!(uniform = %name, kind = setting.kind(), "uniform override");
        config.uniforms.insert(name, setting);
    }
    if let Some(speed) = args.speed {
        config.playback.speed = speed;
    }
    if let Some(ratio) = args.min_pixel_ratio {
        config.display.min_pixel_ratio = Some(ratio);
    }
    if let Some(count) = args.max_pixel_count {
        config.display.max_pixel_count = Some(count);
    }
    if let Some((width, height)) = args.size {
        config.window.width = Some(width);
        config.window.height = Some(height);
    }

    let mut scene = config
        .resolve(&base_dir)
        .with_context(|| format!("failed to resolve scene in {}", base_dir.display()))?;
    if let Some(frame) = args.frame {
        scene.options.frame = frame;
    }
    if args.still {
        scene.options.speed = 0.0;
    }
    Ok(scene)
}

fn load_config(args: &RunArgs) -> Result<(SceneConfig, PathBuf)> {
    let cwd = env::current_dir().context("failed to determine working directory")?;

    let (mut config, base_dir) = match &args.scene {
        Some(path) => {
            let config = SceneConfig::load(path)
                .with_context(|| format!("failed to load scene {}", path.display()))?;
            (config, scene_dir(path, &cwd))
        }
        None => match &args.shader {
            Some(shader) => (SceneConfig::with_shader(shader.clone()), cwd.clone()),
            None => bail!("no scene given; pass a SCENE file or --shader"),
        },
    };

    if let Some(shader) = &args.shader {
        config.shader = if shader.starts_with(sceneconfig::BUILTIN_PREFIX) {
            shader.clone()
        } else {
            cwd.join(shader).display().to_string()
        };
    }

    Ok((config, base_dir))
}

fn scene_dir(path: &Path, cwd: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd.to_path_buf(),
    }
}

pub fn check(args: CheckArgs) -> Result<()> {
    let config = SceneConfig::load(&args.scene)
        .with_context(|| format!("failed to load scene {}", args.scene.display()))?;
    let cwd = env::current_dir().context("failed to determine working directory")?;
    let scene = config
        .resolve(&scene_dir(&args.scene, &cwd))
        .with_context(|| format!("scene {} does not resolve", args.scene.display()))?;

    if args.json {
        let uniforms: serde_json::Map<String, serde_json::Value> = scene
            .uniforms
            .iter()
            .map(|(name, value)| (name.clone(), value.kind().into()))
            .collect();
        let summary = serde_json::json!({
            "shader": config.shader,
            "speed": scene.options.speed,
            "frame": scene.options.frame,
            "min_pixel_ratio": scene.options.min_pixel_ratio,
            "max_pixel_count": scene.options.max_pixel_count,
            "uniforms": uniforms,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Scene {} is valid.", args.scene.display());
    println!("  shader: {}", config.shader);
    println!(
        "  speed: {}  start: {}ms",
        scene.options.speed, scene.options.frame
    );
    println!("Uniforms:");
    for (name, value) in &scene.uniforms {
        println!("  {name:<20} {}", value.kind());
    }
    Ok(())
}

pub fn color(args: ColorArgs) -> Result<()> {
    let [r, g, b, a] = parse_color(&args.value)
        .with_context(|| format!("'{}' is not a colour", args.value))?;
    println!("vec4({r:.4}, {g:.4}, {b:.4}, {a:.4})");
    let byte = |channel: f32| (channel * 255.0).round() as u8;
    println!(
        "#{:02x}{:02x}{:02x}{:02x}",
        byte(r),
        byte(g),
        byte(b),
        byte(a)
    );
    Ok(())
}
