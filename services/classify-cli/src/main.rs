//! Point classification command line tool.
//!
//! Reads a GeoJSON FeatureCollection of points, classifies a value field or
//! expression into contour lines, filled bands or threshold layers, and writes
//! the result as a GeoJSON FeatureCollection.

mod config;
mod geojson;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use classify_engine::{
    ClassifyGenerator, ClassifyMethod, ClassifyType, ExtendOption, GeneratorConfig, LevelList,
    TracingFeedback, TriangulationMode,
};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::{load_config, validate_config};
use geojson::{read_points, GeoJsonSink};

#[derive(Parser, Debug)]
#[command(name = "classify")]
#[command(about = "Classify point data into contour lines and filled polygons")]
struct Args {
    /// Input GeoJSON file of point features ("-" for stdin)
    #[arg(required_unless_present = "list_methods")]
    input: Option<String>,

    /// Output GeoJSON file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, env = "CLASSIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Field name or expression giving the value to classify
    #[arg(short = 'z', long)]
    expression: Option<String>,

    /// Name of the output value field
    #[arg(long)]
    field_name: Option<String>,

    /// Classification method (equal, interval, quantile, log, pretty, manual)
    #[arg(short, long)]
    method: Option<ClassifyMethod>,

    /// Explicit levels, e.g. "0 10 20 50"; implies the manual method
    #[arg(long, conflicts_with = "method")]
    levels: Option<String>,

    /// Number of classes for equal, quantile and pretty
    #[arg(long)]
    n_classify: Option<usize>,

    /// Level spacing for the interval method
    #[arg(long)]
    interval: Option<f64>,

    /// Lower bound of the classified range
    #[arg(long, allow_negative_numbers = true)]
    min: Option<f64>,

    /// Upper bound of the classified range
    #[arg(long, allow_negative_numbers = true)]
    max: Option<f64>,

    /// Output type (line, filled, layer)
    #[arg(short = 't', long)]
    classify_type: Option<ClassifyType>,

    /// Open-ended bands for filled output (both, min, max, neither)
    #[arg(long)]
    extend: Option<ExtendOption>,

    /// Label decimal places; negative picks them from the levels
    #[arg(long, allow_negative_numbers = true)]
    precision: Option<i32>,

    /// Drop trailing zeros from labels
    #[arg(long)]
    trim_zeros: bool,

    /// Units appended to labels
    #[arg(long)]
    units: Option<String>,

    /// Triangulate even when the points lie on a regular grid
    #[arg(long)]
    no_grid: bool,

    /// Merge points closer than this distance
    #[arg(long)]
    duplicate_tolerance: Option<f64>,

    /// Run triangulation in a separate trig-worker process
    #[arg(long)]
    worker: bool,

    /// trig-worker executable (default: $CLASSIFY_TRIG_WORKER, then the PATH)
    #[arg(long)]
    worker_path: Option<PathBuf>,

    /// CRS of the input, overriding the file's crs member
    #[arg(long)]
    crs: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", env = "CLASSIFY_LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// List the classification methods, classify types and extend options
    #[arg(long)]
    list_methods: bool,
}

impl Args {
    /// Apply command line options on top of the loaded config.
    fn apply(&self, config: &mut GeneratorConfig) {
        if let Some(expression) = &self.expression {
            config.expression = expression.clone();
        }
        if self.field_name.is_some() {
            config.field_name = self.field_name.clone();
        }
        if let Some(levels) = &self.levels {
            config.method = Some(ClassifyMethod::Manual);
            config.params.levels = Some(LevelList::Text(levels.clone()));
        } else if self.method.is_some() {
            config.method = self.method;
        }

        let params = &mut config.params;
        params.n_classify = self.n_classify.or(params.n_classify);
        params.interval = self.interval.or(params.interval);
        params.min = self.min.or(params.min);
        params.max = self.max.or(params.max);

        if let Some(classify_type) = self.classify_type {
            config.classify_type = classify_type;
        }
        if let Some(extend) = self.extend {
            config.extend = extend;
        }
        if let Some(precision) = self.precision {
            config.labels.precision = precision;
        }
        if self.trim_zeros {
            config.labels.trim_zeros = true;
        }
        if let Some(units) = &self.units {
            config.labels.units = units.clone();
        }
        if self.no_grid {
            config.use_grid = false;
        }
        if let Some(tolerance) = self.duplicate_tolerance {
            config.duplicate_tolerance = tolerance;
        }
        if self.worker || self.worker_path.is_some() {
            config.triangulation.mode = TriangulationMode::Worker;
        }
        if self.worker_path.is_some() {
            config.triangulation.worker_path = self.worker_path.clone();
        }
    }
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn list_methods() {
    for method in ClassifyMethod::all() {
        let names = |keys: &[classify_engine::levels::ParamKey]| {
            keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        };
        println!("{:<10} {}", method.id(), method.name());
        println!("{:<10}   required: {}", "", names(method.required()));
        println!("{:<10}   optional: {}", "", names(method.optional()));
    }
    println!();
    println!("classify types:");
    for classify_type in ClassifyType::all() {
        println!("{:<10} {}", classify_type.as_str(), classify_type.description());
    }
    println!();
    println!("extend options (filled only):");
    for extend in ExtendOption::all() {
        println!("{:<10} {}", extend.as_str(), extend.description());
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_methods {
        list_methods();
        return Ok(());
    }

    init_tracing(&args.log_level, args.json_logs)?;

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GeneratorConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config)?;
    debug!(?config, "Resolved configuration");

    let input = args.input.as_deref().unwrap_or("-");
    let source = if input == "-" {
        read_points(io::stdin().lock(), args.crs.as_deref())?
    } else {
        let file = File::open(input).with_context(|| format!("Failed to open input {}", input))?;
        read_points(BufReader::new(file), args.crs.as_deref())
            .with_context(|| format!("Failed to read points from {}", input))?
    };
    info!(input = %input, "Loaded point source");

    let mut generator =
        ClassifyGenerator::from_config(Some(Arc::new(source)), &config, Arc::new(TracingFeedback));
    let mut sink = GeoJsonSink::new(generator.fields(), &generator.crs(), None);
    let count = generator
        .write_features(&mut sink)
        .context("Classification failed")?;
    if sink.is_empty() {
        warn!("No features generated; check the levels against the data range");
    }

    let collection = sink.into_collection();
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output {:?}", path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &collection)?;
            writer.flush()?;
        }
        None => {
            let mut writer = BufWriter::new(io::stdout().lock());
            serde_json::to_writer(&mut writer, &collection)?;
            writeln!(writer)?;
            writer.flush()?;
        }
    }

    info!(
        features = count,
        classify_type = %config.classify_type,
        "Wrote classified features"
    );
    Ok(())
}
