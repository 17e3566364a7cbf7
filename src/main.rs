use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::filter::LevelFilter;

use klmc_hull::analysis::convex_hull::ConvexHull;
use klmc_hull::analysis::stability::{self, StabilityFilter};
use klmc_hull::build_cell::point_separator::{PointSeparator, SeparationData};
use klmc_hull::build_cell::random::RandomStructureBuilder;
use klmc_hull::config::RunConfig;
use klmc_hull::core::chemistry::Composition;
use klmc_hull::core::domain::{Lattice, PropertyKey};
use klmc_hull::interface::{input, report};

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "KLMC Hull: convex hull stability and atom separation", long_about = None)]
struct Args {
    /// JSON run configuration; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the convex hull of a set of structures and report their stability
    Hull {
        /// JSON file with an array of structures
        input: PathBuf,

        /// Comma separated endpoint species (e.g. Mg,O); derived from pure structures if omitted
        #[arg(short, long, value_delimiter = ',')]
        endpoints: Option<Vec<String>>,

        /// Structure property forming the value axis
        #[arg(short, long)]
        property: Option<String>,

        /// Only list entries within this distance of the hull
        #[arg(long)]
        stable_only: bool,

        /// CSV output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pull apart overlapping atoms of a structure
    Separate {
        /// JSON file with one structure
        input: PathBuf,

        /// Where to write the separated structure
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        max_iterations: Option<usize>,

        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Generate a random, separated structure for a stoichiometry
    Random {
        /// Formula of the structure (e.g. Mg4O4)
        formula: String,

        /// Cubic cell edge; builds a cluster when omitted
        #[arg(long)]
        cell: Option<f64>,

        /// Edge of the box atoms are scattered in (clusters only)
        #[arg(short, long)]
        box_size: Option<f64>,

        #[arg(short, long)]
        seed: Option<u64>,

        #[arg(short, long)]
        output: PathBuf,
    },
}

// --- Initialization Helpers ---

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    // Also forwards `log` records from the library.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<RunConfig> {
    match &args.config {
        Some(path) => RunConfig::load(path),
        None => Ok(RunConfig::default()),
    }
}

// --- Commands ---

fn run_hull(
    config: &RunConfig,
    input_path: &Path,
    endpoints: Option<Vec<String>>,
    property: Option<String>,
    stable_only: bool,
    output: Option<&Path>,
) -> Result<()> {
    let structures = input::load_structures(input_path)?;

    let key = property.map(PropertyKey::new).unwrap_or_else(|| config.property.clone());
    let labels = endpoints
        .or_else(|| config.endpoints.clone())
        .unwrap_or_else(|| ConvexHull::generate_endpoints(&structures));
    info!("Hull endpoints: {}", labels.join(", "));

    let mut hull = ConvexHull::with_property(&labels, key).context("Failed to set up convex hull")?;

    let ids = hull
        .add_compatible_structures(&structures)
        .context("Failed to add structures to the hull")?;
    let mut names = Vec::new();
    for (s, id) in structures.iter().zip(ids) {
        match id {
            Some(_) => names.push(s.name.clone()),
            None => warn!("Skipping '{}': not added to the '{}' hull", s.name, hull.convex_property()),
        }
    }

    if hull.hull().is_none() {
        let missing: Vec<&str> = hull
            .endpoints()
            .iter()
            .filter(|e| hull.chemical_potential(&e.label).is_none())
            .map(|e| e.label.as_str())
            .collect();
        warn!("No hull yet, missing pure structures for: {}", missing.join(", "));
    }

    let mut rows = stability::summarise(&hull);
    if stable_only {
        let kept = StabilityFilter::new(config.stability_tolerance).keep(&hull);
        rows.retain(|r| kept.contains(&r.id));
    }

    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            report::write_hull_report(&rows, &names, file)
        }
        None => report::write_hull_report(&rows, &names, io::stdout().lock()),
    }
}

fn run_separate(config: &RunConfig, input_path: &Path, output: &Path, separator: PointSeparator) -> Result<()> {
    let mut structure = input::load_structure(input_path)?;
    let db = config.species_database();

    let mut data = SeparationData::from_structure_with_species(&structure, &db);
    if !separator.separate_points(&mut data) {
        return Err(anyhow!(
            "Atoms of '{}' could not be separated in {} iterations",
            structure.name,
            separator.max_iterations
        ));
    }
    data.apply_to(&mut structure);
    input::save_structure(&structure, output)
}

fn run_random(config: &RunConfig, formula: &str, cell: Option<f64>, box_size: f64, seed: u64, output: &Path) -> Result<()> {
    let stoichiometry: Composition = formula.parse().with_context(|| format!("Invalid formula '{}'", formula))?;
    let db = config.species_database();

    let mut builder = RandomStructureBuilder::new(&db)
        .box_size(box_size)
        .separator(config.separator);
    if let Some(edge) = cell {
        let lattice = Lattice::cubic(edge).ok_or_else(|| anyhow!("Cell edge {} gives a singular lattice", edge))?;
        builder = builder.lattice(lattice);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let structure = builder.build(&stoichiometry, &mut rng)?;
    input::save_structure(&structure, output)
}

// --- Main ---

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);
    let config = load_config(&args)?;

    match &args.command {
        Command::Hull {
            input,
            endpoints,
            property,
            stable_only,
            output,
        } => run_hull(&config, input, endpoints.clone(), property.clone(), *stable_only, output.as_deref()),
        Command::Separate {
            input,
            output,
            max_iterations,
            tolerance,
        } => {
            let separator = PointSeparator::new(
                max_iterations.unwrap_or(config.separator.max_iterations),
                tolerance.unwrap_or(config.separator.tolerance),
            );
            run_separate(&config, input, output, separator)
        }
        Command::Random {
            formula,
            cell,
            box_size,
            seed,
            output,
        } => run_random(
            &config,
            formula,
            *cell,
            box_size.unwrap_or(config.box_size),
            seed.unwrap_or(config.seed),
            output,
        ),
    }
}
