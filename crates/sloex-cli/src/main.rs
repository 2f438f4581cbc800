//! sloex command-line interface.
//!
//! Run slow-extraction diagnostics from TOML job files:
//! ```sh
//! sloex-cli run job.toml
//! sloex-cli validate job.toml
//! sloex-cli hardt --strength 36.7 --tune 1.67
//! sloex-cli spiral --strength 36.7 --septum 0.055
//! ```

mod config;
mod parsers;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sloex_core::steinbach::{hardt_chromaticity, spiral_step, HardtParams, SpiralStepParams};

#[derive(Parser)]
#[command(name = "sloex-cli")]
#[command(about = "sloex: third-integer resonant slow-extraction diagnostics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the diagnostics configured in a TOML job file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a job file and the lattice/tracking files it references.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Chromaticity satisfying the Hardt condition.
    Hardt {
        /// Virtual sextupole strength S (m^-1).
        #[arg(short, long)]
        strength: f64,
        /// Horizontal tune.
        #[arg(short, long, default_value_t = 1.67)]
        tune: f64,
        /// Dispersion at the septum (m).
        #[arg(long, default_value_t = HardtParams::default().dispersion)]
        dispersion: f64,
        /// Dispersion derivative at the septum.
        #[arg(long, default_value_t = HardtParams::default().dispersion_prime, allow_negative_numbers = true)]
        dispersion_prime: f64,
        /// Separatrix orientation (degrees).
        #[arg(long, default_value_t = HardtParams::default().alpha)]
        alpha: f64,
        /// Phase advance at the septum (degrees).
        #[arg(long, default_value_t = HardtParams::default().mu_es)]
        mu_es: f64,
        /// Phase advance at the virtual sextupole (degrees).
        #[arg(long, default_value_t = HardtParams::default().mu_xr)]
        mu_xr: f64,
    },
    /// Spiral step and kick at the electrostatic septum.
    Spiral {
        /// Virtual sextupole strength S (m^-1).
        #[arg(short, long)]
        strength: f64,
        /// Septum position (m).
        #[arg(long, default_value_t = SpiralStepParams::default().septum_position)]
        septum: f64,
        /// Separatrix orientation (degrees).
        #[arg(long, default_value_t = SpiralStepParams::default().separatrix_angle)]
        angle: f64,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("sloex Slow-Extraction Diagnostics");
            println!("=================================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job)?;

            // Determine output directory
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_csv {
                runner::write_stopband_csv(&result.diagram, &result.beam, &out_dir.join("stopband.csv"))?;
                runner::write_ensemble_csv(&result.diagram, &result.beam, &out_dir.join("ensemble.csv"))?;
                if let Some(contour) = &result.contour {
                    runner::write_hamiltonian_csv(contour, &out_dir.join("hamiltonian.csv"))?;
                }
                if let Some(tunes) = &result.tunes {
                    runner::write_tunes_csv(tunes, &out_dir.join("tunes.csv"))?;
                }
            }

            if job.output.save_json {
                runner::write_diagram_json(&result, &out_dir.join("steinbach.json"))?;
            }

            println!("Diagnostics complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            if let Some(ham) = &job.hamiltonian {
                let twiss = parsers::tfs::read_tfs(&ham.twiss_file)?;
                println!("  Twiss table: {} elements", twiss.lattice.len());
                if twiss.lattice.get(&ham.element).is_none() {
                    println!("  Warning: element '{}' not in lattice", ham.element);
                }
            }
            if let Some(tune) = &job.tune {
                let track = parsers::ptc::read_trackone(&tune.track_file, tune.observation.as_deref())?;
                println!(
                    "  Tracking: {} particles, {} turns",
                    track.particle_count(),
                    track.turn_count()
                );
            }
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Hardt {
            strength,
            tune,
            dispersion,
            dispersion_prime,
            alpha,
            mu_es,
            mu_xr,
        } => {
            let q_prime =
                hardt_chromaticity(strength, dispersion, dispersion_prime, alpha, mu_es, mu_xr, tune);
            println!("Hardt chromaticity: Q' = {:.6}", q_prime);
            Ok(())
        }
        Commands::Spiral {
            strength,
            septum,
            angle,
        } => {
            let step = spiral_step(strength, septum, angle);
            println!("Spiral step: {:.6e} m", step.step);
            println!("Spiral kick: {:.6e} rad", step.kick);
            Ok(())
        }
    }
}
