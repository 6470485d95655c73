//! Command line front end: load a DICOM series, cut a slice and write it as
//! a PNG, or print what the series contains.

use clap::{Parser, Subcommand, ValueEnum};

use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use volume_dataset::{
    enums::{Interpolation, Orientation, SortBy, Thresholding},
    render,
    slicer::{self, SliceRequest},
    volume_loader::{VolumeLoader, VolumeLoaderError},
};

type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
enum CliError {
    #[error("loading failed: {0}")]
    Load(#[from] VolumeLoaderError),

    #[error("{0}")]
    DataSet(#[from] volume_dataset::Error),

    #[error("could not write image: {0}")]
    Image(#[from] image::ImageError),

    #[error("slice has no pixels")]
    EmptySlice,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Axis {
    Axial,
    Coronal,
    Sagittal,
}

impl From<Axis> for Orientation {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::Axial => Orientation::Axial,
            Axis::Coronal => Orientation::Coronal,
            Axis::Sagittal => Orientation::Sagittal,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sort {
    Position,
    Table,
    Instance,
    None,
}

impl From<Sort> for SortBy {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort::Position => SortBy::ImagePositionPatient,
            Sort::Table => SortBy::TablePosition,
            Sort::Instance => SortBy::InstanceNumber,
            Sort::None => SortBy::None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sampling {
    /// Closest source voxel
    Nearest,
    /// Trilinear blend of the surrounding voxels
    Trilinear,
}

impl From<Sampling> for Interpolation {
    fn from(sampling: Sampling) -> Self {
        match sampling {
            Sampling::Nearest => Interpolation::NearestNeighbor,
            Sampling::Trilinear => Interpolation::Trilinear,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    Global,
    PerFrame,
    PerSlice,
    InterpolateFrames,
}

impl From<Policy> for Thresholding {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Global => Thresholding::Global,
            Policy::PerFrame => Thresholding::PerFrame,
            Policy::PerSlice => Thresholding::PerSlice,
            Policy::InterpolateFrames => Thresholding::InterpolateFrames,
        }
    }
}

/// Slice and inspect medical image volumes.
#[derive(Parser)]
#[command(name = "volume-dataset")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the .dcm files of one series
    #[arg(short, long, default_value = "dicom")]
    input: PathBuf,

    /// Slice ordering
    #[arg(long, value_enum, default_value = "position")]
    sort: Sort,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resample one slice and write it as an 8-bit PNG
    Slice {
        /// Output file path
        #[arg(short, long, default_value = "result.png")]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value = "axial")]
        axis: Axis,

        /// Depth of the slice along the viewing axis in mm, defaults to the centre
        #[arg(short, long)]
        depth: Option<f64>,

        /// Slice thickness in mm, defaults to the smallest voxel edge
        #[arg(long)]
        thickness: Option<f64>,

        /// In-plane pixel size in mm, defaults to the smallest voxel edge
        #[arg(long)]
        pixel_size: Option<f64>,

        #[arg(long, value_enum, default_value = "nearest")]
        sampling: Sampling,

        /// Start of the time window in seconds, defaults to the scan start
        #[arg(long)]
        start: Option<f64>,

        /// Length of the time window in seconds, defaults to the first frame
        #[arg(long)]
        duration: Option<f64>,

        /// External scale factor applied to every value
        #[arg(long, default_value = "1.0")]
        scale: f64,

        #[arg(long, value_enum, default_value = "global")]
        thresholding: Policy,
    },

    /// Print dimensions, timing and value range
    Info,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let started = Instant::now();
    let mut data_set = VolumeLoader::load_from_directory(&cli.input, cli.sort.into())?;
    log::info!("loaded {:?} in {:?}", data_set, started.elapsed());

    match cli.command {
        Commands::Info => {
            let dim = data_set.dim();
            let stats = data_set.statistics();
            println!("name:       {}", data_set.name());
            println!("modality:   {}", data_set.modality().name());
            println!("scan date:  {}", data_set.scan_date());
            println!("storage:    {}", data_set.raw_data().kind().name());
            println!("dimensions: {} x {} x {} x {}", dim.x, dim.y, dim.z, dim.t);
            println!("voxel size: {}", data_set.voxel_size());
            println!("frames:     {:?}", data_set.frames().durations());
            println!("range:      [{}, {}]", stats.global_min(), stats.global_max());
        }
        Commands::Slice {
            output,
            axis,
            depth,
            thickness,
            pixel_size,
            sampling,
            start,
            duration,
            scale,
            thresholding,
        } => {
            data_set.set_scale_factor(scale)?;
            data_set.set_thresholding(thresholding.into());

            let finest = data_set.voxel_size().min_element();
            let start = start.unwrap_or(data_set.frames().scan_start());
            let duration = duration.unwrap_or(data_set.frames().frame_duration(0));
            let view = slicer::view_volume(
                &data_set.volume(),
                axis.into(),
                depth,
                thickness.unwrap_or(finest),
            );
            let request = SliceRequest::new(view, pixel_size.unwrap_or(finest))
                .with_time(start, duration)
                .with_interpolation(sampling.into())
                .with_max_min(true);

            let slice = data_set.get_slice(&request)?;
            let bounds = data_set.get_thresholding_max_min(Some(&slice), start, duration)?;
            log::info!(
                "{} display bounds [{:.3}, {:.3}]",
                data_set.thresholds().policy().name(),
                bounds.min,
                bounds.max
            );

            let image = render::slice_to_image(&slice, bounds).ok_or(CliError::EmptySlice)?;
            image.save(&output)?;
            println!("wrote {}", output.display());
        }
    }
    Ok(())
}
