use clap::Parser;
use moonreg::image::io::{load_image, save_image};
use moonreg::{
    cut_image_from_circle, Circle, DetectorConfig, HomographyMethod, HoughCirclesAlgorithm,
    MatchFilterKind, MoonDetector, MoonRegistrar, PixelFilter, RegistrationAlgorithm,
    RegistrationConfig,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "MoonReg CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Task {
    #[default]
    Detect,
    Register,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HoughConfig {
    HoughGradient,
    HoughGradientAlt,
    HoughGradientMix,
}

impl From<HoughConfig> for HoughCirclesAlgorithm {
    fn from(value: HoughConfig) -> Self {
        match value {
            HoughConfig::HoughGradient => HoughCirclesAlgorithm::HoughGradient,
            HoughConfig::HoughGradientAlt => HoughCirclesAlgorithm::HoughGradientAlt,
            HoughConfig::HoughGradientMix => HoughCirclesAlgorithm::HoughGradientMix,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FeatureConfig {
    Sift,
    Orb,
    Akaze,
    Brisk,
}

impl From<FeatureConfig> for RegistrationAlgorithm {
    fn from(value: FeatureConfig) -> Self {
        match value {
            FeatureConfig::Sift => RegistrationAlgorithm::Sift,
            FeatureConfig::Orb => RegistrationAlgorithm::Orb,
            FeatureConfig::Akaze => RegistrationAlgorithm::Akaze,
            FeatureConfig::Brisk => RegistrationAlgorithm::Brisk,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MethodConfig {
    LeastSquares,
    Ransac,
}

impl From<MethodConfig> for HomographyMethod {
    fn from(value: MethodConfig) -> Self {
        match value {
            MethodConfig::LeastSquares => HomographyMethod::LeastSquares,
            MethodConfig::Ransac => HomographyMethod::Ransac,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FilterConfig {
    RatioOnly,
    IgnoreEdgeAndRatio,
    All,
}

impl From<FilterConfig> for MatchFilterKind {
    fn from(value: FilterConfig) -> Self {
        match value {
            FilterConfig::RatioOnly => MatchFilterKind::RatioOnly,
            FilterConfig::IgnoreEdgeAndRatio => MatchFilterKind::IgnoreEdgeAndRatio,
            FilterConfig::All => MatchFilterKind::All,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DetectJson {
    image_path: String,
    algorithm: HoughConfig,
    max_iteration: usize,
    circle_threshold: usize,
    crop_padding: i32,
    crop_output_path: Option<String>,
}

impl Default for DetectJson {
    fn default() -> Self {
        let cfg = DetectorConfig::default();
        Self {
            image_path: String::new(),
            algorithm: HoughConfig::HoughGradientMix,
            max_iteration: cfg.max_iteration,
            circle_threshold: cfg.circle_threshold,
            crop_padding: cfg.crop_padding,
            crop_output_path: None,
        }
    }
}

impl From<&DetectJson> for DetectorConfig {
    fn from(value: &DetectJson) -> Self {
        Self {
            max_iteration: value.max_iteration,
            circle_threshold: value.circle_threshold,
            crop_padding: value.crop_padding,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RegisterJson {
    user_image_path: String,
    model_image_path: String,
    algorithm: FeatureConfig,
    knn_k: usize,
    good_match_ratio: f32,
    method: MethodConfig,
    ransac_reproj_threshold: f64,
    max_iters: usize,
    confidence: f64,
    seed: u64,
    match_filter: FilterConfig,
    edge_keep_ratio: f32,
    /// Overlay warped into the user frame when `layer_output_path` is set.
    layer_image_path: Option<String>,
    layer_output_path: Option<String>,
    transparency: f32,
    /// Packed BGRA colour skipped while blending; negative disables it.
    filter_px: i32,
    matches_output_path: Option<String>,
}

impl Default for RegisterJson {
    fn default() -> Self {
        let cfg = RegistrationConfig::default();
        Self {
            user_image_path: String::new(),
            model_image_path: String::new(),
            algorithm: FeatureConfig::Sift,
            knn_k: cfg.knn_k,
            good_match_ratio: cfg.good_match_ratio,
            method: MethodConfig::Ransac,
            ransac_reproj_threshold: cfg.ransac_reproj_threshold,
            max_iters: cfg.max_iters,
            confidence: cfg.confidence,
            seed: cfg.seed,
            match_filter: FilterConfig::RatioOnly,
            edge_keep_ratio: cfg.edge_keep_ratio,
            layer_image_path: None,
            layer_output_path: None,
            transparency: 1.0,
            filter_px: -1,
            matches_output_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    task: Task,
    output_path: Option<String>,
    detect: DetectJson,
    register: RegisterJson,
}

#[derive(Debug, Serialize)]
struct CircleRecord {
    x: i32,
    y: i32,
    radius: i32,
}

impl From<Circle> for CircleRecord {
    fn from(value: Circle) -> Self {
        Self {
            x: value.x,
            y: value.y,
            radius: value.radius,
        }
    }
}

#[derive(Debug, Serialize)]
struct DetectOutput {
    found: bool,
    circle: CircleRecord,
    confidence: f32,
    iterations: usize,
}

#[derive(Debug, Serialize)]
struct RegisterOutput {
    /// Row-major model-to-user homography.
    homography: [f64; 9],
    user_keypoints: usize,
    model_keypoints: usize,
    good_matches: usize,
    inliers: usize,
}

fn run_detect(cfg: &DetectJson) -> Result<String, Box<dyn std::error::Error>> {
    if cfg.image_path.is_empty() {
        return Err("detect.image_path must be set in the config".into());
    }
    let image = load_image(&cfg.image_path)?;
    let detector = MoonDetector::new(cfg.algorithm.into())?.with_config(cfg.into());
    let detection = detector.detect_detailed(&image)?;
    tracing::info!(
        x = detection.circle.x,
        y = detection.circle.y,
        radius = detection.circle.radius,
        "detection finished"
    );

    if let Some(path) = &cfg.crop_output_path {
        if detection.is_found() {
            let (crop, _) = cut_image_from_circle(&image, &detection.circle, cfg.crop_padding)?;
            save_image(&crop, path)?;
        } else {
            tracing::warn!("no moon found, skipping crop output");
        }
    }

    let output = DetectOutput {
        found: detection.is_found(),
        circle: detection.circle.into(),
        confidence: detection.confidence,
        iterations: detection.iterations.len(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

fn run_register(cfg: RegisterJson) -> Result<String, Box<dyn std::error::Error>> {
    if cfg.user_image_path.is_empty() || cfg.model_image_path.is_empty() {
        return Err("register.user_image_path and register.model_image_path must be set in the config".into());
    }
    let user = load_image(&cfg.user_image_path)?;
    let model = load_image(&cfg.model_image_path)?;
    let config = RegistrationConfig {
        knn_k: cfg.knn_k,
        good_match_ratio: cfg.good_match_ratio,
        method: cfg.method.into(),
        ransac_reproj_threshold: cfg.ransac_reproj_threshold,
        max_iters: cfg.max_iters,
        confidence: cfg.confidence,
        seed: cfg.seed,
        match_filter: cfg.match_filter.into(),
        edge_keep_ratio: cfg.edge_keep_ratio,
    };
    let registrar = MoonRegistrar::new(cfg.algorithm.into())?.with_config(config);
    let registration = registrar.register(&user, &model)?;

    if let Some(path) = &cfg.matches_output_path {
        save_image(&registration.draw_matched_keypoints()?, path)?;
    }
    match (&cfg.layer_image_path, &cfg.layer_output_path) {
        (Some(layer_path), Some(out_path)) => {
            let layer = load_image(layer_path)?;
            let filter = PixelFilter::from_packed(cfg.filter_px);
            let composite = registration.draw_layer_image(&layer, cfg.transparency, filter)?;
            save_image(&composite, out_path)?;
        }
        (None, Some(_)) => return Err("register.layer_output_path needs register.layer_image_path".into()),
        _ => {}
    }

    let output = RegisterOutput {
        homography: registration.homography().to_row_major(),
        user_keypoints: registration.user_keypoints().len(),
        model_keypoints: registration.model_keypoints().len(),
        good_matches: registration.good_matches().len(),
        inliers: registration.inliers().iter().filter(|&&b| b).count(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("moonreg=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    let json = match config.task {
        Task::Detect => run_detect(&config.detect)?,
        Task::Register => run_register(config.register)?,
    };

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
