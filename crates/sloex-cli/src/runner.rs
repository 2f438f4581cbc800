//! Job runner: ties together lattice files, tracking data and the
//! diagnostics in `sloex-core`.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use sloex_compute::{ComputeBackend, CpuBackend};
use sloex_core::hamiltonian::{ContourOutcome, ResonanceHamiltonian};
use sloex_core::multipole::{strongest_octupoles, strongest_sextupoles, virtual_octupole, virtual_sextupole};
use sloex_core::steinbach::{steinbach_diagram_seeded, SpiralStep, SteinbachDiagram, SteinbachParams};
use sloex_core::tune::{TuneExtractor, TuneSeries};

use crate::config::JobConfig;
use crate::parsers::ptc::read_trackone;
use crate::parsers::tfs::read_tfs;

/// Elements listed in the strongest-multipole summary.
const STRONGEST_LISTED: usize = 5;

/// Results from a job run.
pub struct JobOutput {
    /// Beam parameters actually used (chromaticity may come from Hardt).
    pub beam: SteinbachParams,
    pub diagram: SteinbachDiagram,
    pub spiral: SpiralStep,
    pub contour: Option<ContourOutcome>,
    pub tunes: Option<TuneSeries>,
}

/// Run every diagnostic the job configures.
pub fn run_job(job: &JobConfig) -> Result<JobOutput> {
    let backend = create_backend(job.compute.threads)?;

    let mut beam = job.steinbach.clone();
    if job.hardt.enabled {
        beam.chromaticity = job.hardt.chromaticity(&beam);
        println!("Hardt condition: Q' = {:.4}", beam.chromaticity);
    }

    let diagram = steinbach_diagram_seeded(&beam)?;
    println!(
        "Steinbach diagram: {} particles, S={} m^-1, Q={}, Q'={:.4}",
        diagram.particle_tunes.len(),
        beam.sextupole_strength,
        beam.tune,
        beam.chromaticity
    );

    let spiral = job.spiral_step.evaluate(beam.sextupole_strength);
    println!(
        "Spiral step: {:.4e} m, kick: {:.4e} rad",
        spiral.step, spiral.kick
    );

    let contour = match &job.hamiltonian {
        Some(ham) => {
            let twiss = read_tfs(&ham.twiss_file)
                .with_context(|| format!("Twiss table {}", ham.twiss_file.display()))?;
            let lattice = &twiss.lattice;
            println!(
                "Lattice: {} elements from {} (sequence {})",
                lattice.len(),
                ham.twiss_file.display(),
                twiss.header.get("SEQUENCE").map_or("?", String::as_str)
            );

            let params = ham.contour_params(&beam);
            let sext = virtual_sextupole(lattice, params.tune);
            let oct = virtual_octupole(lattice, params.tune);
            println!(
                "  Virtual sextupole: |S|={:.4e}, phase={:.4} rad",
                sext.magnitude, sext.phase
            );
            println!("  Virtual octupole:  |O|={:.4e}", oct);
            for row in strongest_sextupoles(lattice, STRONGEST_LISTED) {
                println!("    sextupole {:<12} K2L={:+.4e}", row.name, row.k2l);
            }
            for row in strongest_octupoles(lattice, STRONGEST_LISTED) {
                println!("    octupole  {:<12} K3L={:+.4e}", row.name, row.k3l);
            }

            let solver = ResonanceHamiltonian::new(Arc::clone(&backend));
            let outcome = solver.build_contour(lattice, &params)?;
            let diag = outcome.diagnostics();
            if let Some(element) = &diag.missing_element {
                eprintln!("Warning: element '{}' not in lattice, contour is empty", element);
            }
            if let Some(beta) = diag.degenerate_beta {
                eprintln!("Warning: degenerate optics (beta={}) at '{}'", beta, params.element);
            }
            println!(
                "Hamiltonian contour: {} cells, {} non-finite",
                diag.total_cells, diag.non_finite_cells
            );
            Some(outcome)
        }
        None => None,
    };

    let tunes = match &job.tune {
        Some(cfg) => {
            let track = read_trackone(&cfg.track_file, cfg.observation.as_deref())
                .with_context(|| format!("Tracking file {}", cfg.track_file.display()))?;
            println!(
                "Tracking: {} particles, {} turns from turn {} at '{}'",
                track.particle_count(),
                track.turn_count(),
                track.first_turn,
                track.observation
            );
            let particles = cfg.particles.unwrap_or_else(|| track.particle_count());
            let extractor = TuneExtractor::new(Arc::clone(&backend));
            let series = extractor.extract(track.coordinates.view(), particles, &cfg.window)?;
            let d = series.diagnostics;
            println!(
                "Tune extraction: {} samples, {} before a full window, {} flat windows",
                d.total_samples, d.insufficient_history, d.flat_windows
            );
            Some(series)
        }
        None => None,
    };

    Ok(JobOutput {
        beam,
        diagram,
        spiral,
        contour,
        tunes,
    })
}

/// Build the CPU backend, on a dedicated pool when a thread count is set.
fn create_backend(threads: usize) -> Result<Arc<dyn ComputeBackend>> {
    let backend = if threads == 0 {
        CpuBackend::new()
    } else {
        CpuBackend::with_threads(threads)?
    };
    let info = backend.device_info();
    match info.compute_units {
        Some(units) => log::info!("Compute backend: {} ({} units)", info.name, units),
        None => log::info!("Compute backend: {}", info.name),
    }
    Ok(Arc::new(backend))
}

fn create_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))
}

fn write_header(file: &mut std::fs::File, title: &str, beam: &SteinbachParams) -> Result<()> {
    writeln!(file, "# sloex: {}", title)?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(
        file,
        "# S={}, Q={}, Q_r={}, dpp={}, Q'={}, emittance={}",
        beam.sextupole_strength,
        beam.tune,
        beam.resonant_tune,
        beam.momentum_spread,
        beam.chromaticity,
        beam.emittance
    )?;
    writeln!(file, "#")?;
    Ok(())
}

/// Write the stopband line of a Steinbach diagram.
pub fn write_stopband_csv(diagram: &SteinbachDiagram, beam: &SteinbachParams, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    write_header(&mut file, "Stopband", beam)?;
    writeln!(file, "tune,amplitude_sqrt_m")?;
    for (q, a) in diagram.tune_axis.iter().zip(&diagram.amplitude_axis) {
        writeln!(file, "{:.8},{:.6e}", q, a)?;
    }
    println!("Stopband written to: {}", path.display());
    Ok(())
}

/// Write the particle ensemble of a Steinbach diagram.
pub fn write_ensemble_csv(diagram: &SteinbachDiagram, beam: &SteinbachParams, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    write_header(&mut file, "Particle ensemble", beam)?;
    writeln!(file, "particle,tune,amplitude_sqrt_m")?;
    for (i, (q, a)) in diagram.particle_tunes.iter().zip(&diagram.amplitudes).enumerate() {
        writeln!(file, "{},{:.8},{:.6e}", i + 1, q, a)?;
    }
    println!("Ensemble written to: {}", path.display());
    Ok(())
}

/// Write the Steinbach diagram and spiral step as JSON.
pub fn write_diagram_json(output: &JobOutput, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let value = serde_json::json!({
        "parameters": output.beam,
        "spiral_step": output.spiral,
        "diagram": output.diagram,
    });
    let json = serde_json::to_string_pretty(&value)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;
    println!("Diagram (JSON) written to: {}", path.display());
    Ok(())
}

/// Write a Hamiltonian contour grid in long format.
pub fn write_hamiltonian_csv(outcome: &ContourOutcome, path: &Path) -> Result<()> {
    let field = outcome.field();
    let diag = outcome.diagnostics();
    let mut file = create_file(path)?;
    writeln!(file, "# sloex: Resonance Hamiltonian")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    if let Some(element) = &diag.missing_element {
        writeln!(file, "# missing element: {}", element)?;
    }
    if let Some(beta) = diag.degenerate_beta {
        writeln!(file, "# degenerate beta: {}", beta)?;
    }
    writeln!(file, "# non-finite cells: {}/{}", diag.non_finite_cells, diag.total_cells)?;
    writeln!(file, "#")?;
    writeln!(file, "angle_index,radius_index,x_m,xp_rad,h")?;

    let (rows, cols) = field.dim();
    for i in 0..rows {
        for j in 0..cols {
            writeln!(
                file,
                "{},{},{:.6e},{:.6e},{:.6e}",
                i,
                j,
                field.x[[i, j]],
                field.xp[[i, j]],
                field.h[[i, j]]
            )?;
        }
    }
    println!("Hamiltonian written to: {}", path.display());
    Ok(())
}

/// Write a tune series; samples taken before a full window read 0.
pub fn write_tunes_csv(series: &TuneSeries, path: &Path) -> Result<()> {
    let d = series.diagnostics;
    let mut file = create_file(path)?;
    writeln!(file, "# sloex: Tune evolution")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(
        file,
        "# samples: {}, insufficient history: {}, flat windows: {}",
        d.total_samples, d.insufficient_history, d.flat_windows
    )?;
    writeln!(file, "#")?;
    writeln!(file, "particle,turn,tune")?;

    let tunes = series.tunes();
    let turns = series.turns();
    for ((p, s), q) in tunes.indexed_iter() {
        writeln!(file, "{},{},{:.8}", p + 1, turns[[p, s]], q)?;
    }
    println!("Tunes written to: {}", path.display());
    Ok(())
}
