use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};

#[derive(Clone, Debug)]
pub struct Config {
    pub source: String,
    pub model_path: PathBuf,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
    pub jpeg_quality: i32,
    pub port: u16,
    pub use_cpu: bool,
    pub verbose: bool,
}

const USAGE: &str = "Usage: traffic-signal [--source <uri>] [--model <path>] \
[--width <px>] [--height <px>] [--confidence <0..1>] [--jpeg-quality <1-100>] \
[--port <n>] [--cpu] [--verbose]\n\nPositional form is also supported: \
traffic-signal <source> <model-path>";

impl Config {
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut source: Option<String> = None;
        let mut model_path: Option<PathBuf> = None;
        let mut width: Option<i32> = None;
        let mut height: Option<i32> = None;
        let mut confidence: Option<f32> = None;
        let mut jpeg_quality: Option<i32> = None;
        let mut port: Option<u16> = None;
        let mut use_cpu = false;
        let mut verbose = false;
        let mut positional: Vec<String> = Vec::new();

        let mut idx = 1;
        while idx < args.len() {
            match args[idx].as_str() {
                "--help" | "-h" => {
                    bail!(USAGE);
                }
                "--source" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--source requires a value"))?
                        .clone();
                    source = Some(value);
                    idx += 1;
                }
                "--model" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--model requires a value"))?
                        .clone();
                    model_path = Some(PathBuf::from(value));
                    idx += 1;
                }
                "--width" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--width requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--width must be a positive integer".to_string())?;
                    if value <= 0 {
                        bail!("--width must be a positive integer");
                    }
                    width = Some(value);
                    idx += 1;
                }
                "--height" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--height requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--height must be a positive integer".to_string())?;
                    if value <= 0 {
                        bail!("--height must be a positive integer");
                    }
                    height = Some(value);
                    idx += 1;
                }
                "--confidence" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--confidence requires a value"))?
                        .parse::<f32>()
                        .with_context(|| "--confidence must be a number in (0, 1]".to_string())?;
                    if !(value > 0.0 && value <= 1.0) {
                        bail!("--confidence must be a number in (0, 1]");
                    }
                    confidence = Some(value);
                    idx += 1;
                }
                "--jpeg-quality" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--jpeg-quality requires a value"))?
                        .parse::<i32>()
                        .with_context(|| {
                            "--jpeg-quality must be an integer between 1 and 100".to_string()
                        })?;
                    if !(1..=100).contains(&value) {
                        bail!("--jpeg-quality must be an integer between 1 and 100");
                    }
                    jpeg_quality = Some(value);
                    idx += 1;
                }
                "--port" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--port requires a value"))?
                        .parse::<u16>()
                        .with_context(|| "--port must be a port number".to_string())?;
                    port = Some(value);
                    idx += 1;
                }
                "--cpu" => {
                    use_cpu = true;
                    idx += 1;
                }
                "--verbose" => {
                    verbose = true;
                    idx += 1;
                }
                arg if arg.starts_with('-') => {
                    bail!("Unrecognised flag: {arg}\n\n{USAGE}");
                }
                other => {
                    positional.push(other.to_string());
                    idx += 1;
                }
            }
        }

        let mut positional = positional.into_iter();
        if source.is_none() {
            source = positional.next();
        }
        if model_path.is_none() {
            if let Some(path) = positional.next() {
                model_path = Some(PathBuf::from(path));
            }
        }

        Ok(Self {
            source: source.unwrap_or_else(|| "0".to_string()),
            model_path: model_path
                .unwrap_or_else(|| PathBuf::from("models/yolov8n.torchscript")),
            width: width.unwrap_or(640),
            height: height.unwrap_or(640),
            confidence: confidence.unwrap_or(0.25),
            jpeg_quality: jpeg_quality.unwrap_or(80),
            port: port.unwrap_or(8080),
            use_cpu,
            verbose,
        })
    }
}
