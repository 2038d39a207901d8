mod container;
mod error;
mod input;
mod logging;
mod model;
mod pipeline;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::container::codec::{ContainerFile, Entry};
use crate::container::{Data, PATH_SEPARATOR};
use crate::error::PackError;
use crate::input::annotation::TsvAnnotationReader;
use crate::input::probe::HeaderProbe;
use crate::input::registration::FileRegistration;
use crate::model::coords::GeometryConfig;
use crate::model::density::{DEFAULT_HALF_RANGE, DEFAULT_POINTS};
use crate::pipeline::stage4_write::AssetPolicy;
use crate::pipeline::{Collaborators, PackConfig, run_prepare};

/// Packages spatial posterior samples into a single container for viewers.
#[derive(Debug, Parser)]
#[command(name = "kira-spatialpack", version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build `<server-dir>/data/kira-spatialpack.bin` and stage image assets.
    Prepare(PrepareArgs),
    /// List the nodes of a container, or print one dataset.
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct PrepareArgs {
    /// Directory holding information.json.
    #[arg(long)]
    data_dir: PathBuf,
    /// Sampler output directory with `*/combined_<N>.csv[.gz]`.
    #[arg(long)]
    output_dir: PathBuf,
    #[arg(long)]
    server_dir: PathBuf,
    /// Symlink images into the static directory instead of copying them.
    #[arg(long)]
    no_copy: bool,
    /// Worker threads; all cores when omitted.
    #[arg(long)]
    threads: Option<usize>,
    /// Registration lookup; defaults to `<data-dir>/registration.json`.
    #[arg(long)]
    registration: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_POINTS)]
    evaluation_points: usize,
    /// Densities are evaluated on `[-range, range]`.
    #[arg(long, default_value_t = DEFAULT_HALF_RANGE)]
    density_range: f64,
    #[arg(long, default_value_t = 194.0)]
    spot_pitch_px: f64,
    #[arg(long, default_value_t = 6200.0)]
    reference_width_px: f64,
    #[arg(long, default_value_t = 100.0e-6)]
    spot_diameter_m: f64,
    #[arg(long, default_value_t = 6.2e-3)]
    array_width_m: f64,
    #[arg(short, long)]
    verbose: bool,
}

impl PrepareArgs {
    fn registration_path(&self) -> PathBuf {
        self.registration
            .clone()
            .unwrap_or_else(|| input::default_registration_path(&self.data_dir))
    }

    fn to_config(&self) -> PackConfig {
        PackConfig {
            data_dir: self.data_dir.clone(),
            output_dir: self.output_dir.clone(),
            server_dir: self.server_dir.clone(),
            assets: if self.no_copy {
                AssetPolicy::Link
            } else {
                AssetPolicy::Copy
            },
            threads: self.threads,
            grid_points: self.evaluation_points,
            grid_half_range: self.density_range,
            geometry: GeometryConfig {
                spot_pitch_px: self.spot_pitch_px,
                reference_width_px: self.reference_width_px,
                spot_diameter_m: self.spot_diameter_m,
                array_width_m: self.array_width_m,
            },
        }
    }
}

#[derive(Debug, Args)]
struct InspectArgs {
    container: PathBuf,
    /// Restrict the listing to this node and its descendants.
    #[arg(long)]
    path: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), PackError> {
    match cli.command {
        Command::Prepare(args) => prepare(&args),
        Command::Inspect(args) => inspect(&args),
    }
}

fn prepare(args: &PrepareArgs) -> Result<(), PackError> {
    logging::init_tracing(args.verbose);
    let config = args.to_config();
    let registration = FileRegistration::new(args.registration_path());
    let annotations = TsvAnnotationReader;
    let images = HeaderProbe;
    let summary = run_prepare(
        &config,
        &Collaborators {
            registration: &registration,
            annotations: &annotations,
            images: &images,
        },
    )?;
    tracing::info!(
        genes = summary.n_genes,
        arrays = summary.n_arrays,
        spots = summary.n_spots,
        assets_staged = summary.assets_staged,
        assets_kept = summary.assets_kept,
        "wrote {}",
        summary.container.display()
    );
    Ok(())
}

fn inspect(args: &InspectArgs) -> Result<(), PackError> {
    let file = ContainerFile::open(&args.container)?;
    let prefix = args.path.as_deref().unwrap_or("");
    for (path, entry) in file.entries().filter(|(path, _)| under(path, prefix)) {
        println!("{}", describe_entry(path, entry));
    }
    if let Some(path) = args.path.as_deref()
        && file.entry(path).is_some_and(|e| e.dtype.is_some())
    {
        let dataset = file.read_dataset(path)?;
        for line in format_values(&dataset.data) {
            println!("{line}");
        }
    }
    Ok(())
}

fn under(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
}

fn describe_entry(path: &str, entry: &Entry) -> String {
    match entry.dtype {
        None => format!("{path}/"),
        Some(dtype) => format!("{path}\t{}\t{:?}", dtype.name(), entry.shape),
    }
}

fn format_values(data: &Data) -> Vec<String> {
    match data {
        Data::F64(values) => values.iter().map(|v| v.to_string()).collect(),
        Data::U32(values) => values.iter().map(|v| v.to_string()).collect(),
        Data::Utf8(values) => values.clone(),
    }
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
