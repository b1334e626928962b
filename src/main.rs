use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::info;
use num_rational::Ratio;
use rand_mt::Mt64;

use lattice_vmc::{
    random_combination, BoundaryCondition, DensityDensityMeasurement, FilledOrbitals, FreeFermion,
    HypercubicLattice, Input, Measurement, MetropolisError, MetropolisSimulation, Positions,
    RenyiModMeasurement, RenyiModPossibleWalk, RenyiSignMeasurement, RenyiSignWalk,
    SimpleSubsystem, StandardWalk, WavefunctionAmplitude,
};

/// Number of equilibration steps before measurements attach.
const EQUILIBRATION_STEPS: u64 = 8;

#[derive(Parser, Debug)]
#[command(version, about = "Variational Monte Carlo on lattice wavefunctions", long_about = None)]
struct Args {
    /// Read the JSON input from a file instead of stdin.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of measurement rounds.
    #[arg(long, default_value_t = 100)]
    iterations: u64,

    /// Metropolis steps per simulation per round.
    #[arg(long, default_value_t = 12)]
    window: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let input = match read_input(&args) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    let result = match input.dimensions() {
        1 => run_simulation::<1>(&input, &args),
        2 => run_simulation::<2>(&input, &args),
        _ => unreachable!("validation restricts the dimension"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}

fn read_input(args: &Args) -> Result<Input, lattice_vmc::ParseError> {
    match &args.input {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| lattice_vmc::ParseError::Invalid(format!("{}: {e}", path.display())))?;
            Input::from_reader(BufReader::new(file))
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| lattice_vmc::ParseError::Invalid(e.to_string()))?;
            Input::from_str(&text)
        }
    }
}

fn run_simulation<const D: usize>(input: &Input, args: &Args) -> Result<(), MetropolisError> {
    let size = &input.system.lattice.size;
    let mut length = [0usize; D];
    for d in 0..D {
        length[d] = size[d] as usize;
    }
    let lattice = Arc::new(HypercubicLattice::<D>::new(length));

    let orbitals_section = input
        .system
        .wavefunction
        .orbitals
        .as_ref()
        .expect("validated input");
    let mut boundary_conditions = [BoundaryCondition::periodic(); D];
    for d in 0..D {
        // the integer n encodes the twist 1/n: 1 periodic, 2 antiperiodic
        boundary_conditions[d] =
            BoundaryCondition::new(Ratio::new(1, orbitals_section.boundary_conditions[d]));
    }
    let mut filling = Vec::with_capacity(orbitals_section.filling.len());
    for momentum in &orbitals_section.filling {
        let mut m = [0usize; D];
        for d in 0..D {
            m[d] = momentum[d] as usize;
        }
        filling.push(m);
    }
    let orbitals = Arc::new(FilledOrbitals::from_momenta(
        &filling,
        Arc::clone(&lattice),
        boundary_conditions,
    ));

    let mut rng = Mt64::new(input.rng.seed);

    // random starting configuration
    let sites = random_combination(orbitals.n_filled(), lattice.total_sites(), &mut rng);
    let positions = Positions::new(vec![sites], lattice.total_sites());
    let wf = Arc::new(WavefunctionAmplitude::free_fermion(FreeFermion::new(
        positions,
        Arc::clone(&orbitals),
    )));

    // subsystem for the entanglement cuts: a box of side 2, clamped to the
    // lattice
    let mut subsystem_lengths = [2usize; D];
    for d in 0..D {
        subsystem_lengths[d] = subsystem_lengths[d].min(lattice.length()[d]);
    }
    let subsystem = Arc::new(SimpleSubsystem::new(subsystem_lengths));

    let density_measurements: Vec<Box<dyn Measurement<StandardWalk<D>>>> =
        vec![Box::new(DensityDensityMeasurement::<D>::new())];
    let mut density_sim = MetropolisSimulation::new(
        StandardWalk::new(Arc::clone(&wf)),
        density_measurements,
        EQUILIBRATION_STEPS,
        Mt64::new(rng.next_u64()),
    )?;

    let mod_measurements: Vec<Box<dyn Measurement<RenyiModPossibleWalk<D>>>> =
        vec![Box::new(RenyiModMeasurement::<D>::new())];
    let mut mod_sim = MetropolisSimulation::new(
        RenyiModPossibleWalk::new(&wf, Arc::clone(&subsystem)),
        mod_measurements,
        EQUILIBRATION_STEPS,
        Mt64::new(rng.next_u64()),
    )?;

    let sign_measurements: Vec<Box<dyn Measurement<RenyiSignWalk<D>>>> =
        vec![Box::new(RenyiSignMeasurement::<D>::new())];
    let mut sign_sim = MetropolisSimulation::new(
        RenyiSignWalk::new(&wf, subsystem),
        sign_measurements,
        EQUILIBRATION_STEPS,
        Mt64::new(rng.next_u64()),
    )?;

    for _ in 0..args.iterations {
        density_sim.iterate(args.window)?;
        let density = density_sim
            .measurement(0)
            .as_any()
            .downcast_ref::<DensityDensityMeasurement<D>>()
            .expect("density simulation carries a density measurement");
        println!(
            "{}",
            serde_json::to_string(&density.rows()).expect("serializable rows")
        );
        info!(
            "density-density {:.1}%",
            100.0 * density_sim.acceptance_rate()
        );

        mod_sim.iterate(args.window)?;
        let renyi_mod = mod_sim
            .measurement(0)
            .as_any()
            .downcast_ref::<RenyiModMeasurement<D>>()
            .expect("mod simulation carries a mod measurement");
        println!(
            "{}",
            serde_json::to_string(&renyi_mod.get()).expect("serializable value")
        );
        info!("swap,mod {:.1}%", 100.0 * mod_sim.acceptance_rate());

        sign_sim.iterate(args.window)?;
        let renyi_sign = sign_sim
            .measurement(0)
            .as_any()
            .downcast_ref::<RenyiSignMeasurement<D>>()
            .expect("sign simulation carries a sign measurement");
        let phase = renyi_sign.get();
        println!(
            "{}",
            serde_json::to_string(&[phase.re, phase.im]).expect("serializable value")
        );
        info!("swap,sign {:.1}%", 100.0 * sign_sim.acceptance_rate());
    }

    Ok(())
}
