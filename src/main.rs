use clap::{ArgEnum, Parser};

use rankcg::{
    best_assortment, learn, AssortmentOptions, BmConfig, GdtConfig, LearnConfig, Pricer, Problem,
    StopCriterion, TieHandling,
};

#[derive(Debug, Clone, Copy, ArgEnum)]
enum Algorithm {
    Gdt,
    Bm,
}

/// Learns a ranking-based choice model from sales data and finds the
/// revenue-maximizing assortment under it.
#[derive(Parser)]
struct Args {
    /// Path to a JSON problem instance with inventories, frequencies and
    /// revenue.
    problem: String,

    /// Pricing algorithm used to generate columns.
    #[clap(long, arg_enum, default_value = "gdt")]
    algorithm: Algorithm,

    /// Number of column-generation iterations.
    #[clap(long, default_value_t = 10)]
    iterations: usize,

    /// Target fit accuracy; overrides the iteration cap when positive.
    #[clap(long, default_value_t = 0.0)]
    epsilon: f64,

    /// Minimum number of real products to offer.
    #[clap(long, default_value_t = 0)]
    min_capacity: usize,

    /// Maximum number of real products to offer.
    #[clap(long, default_value_t = usize::MAX)]
    max_capacity: usize,

    /// Seed for the pricers' random draws.
    #[clap(long, default_value_t = 0)]
    seed: u64,

    /// Show the solver's own log output.
    #[clap(long)]
    verbose_solver: bool,
}

pub fn main() {
    env_logger::init();
    let args = Args::parse();

    let file = std::fs::File::open(&args.problem).expect("could not open the problem file");
    let problem = Problem::from_reader(std::io::BufReader::new(file))
        .expect("could not parse the problem file");

    let stop = if args.epsilon > 0.0 {
        StopCriterion::Epsilon(args.epsilon)
    } else {
        StopCriterion::Iterations(args.iterations)
    };
    let config = LearnConfig {
        stop,
        seed: args.seed,
        verbose_solver: args.verbose_solver,
        ..LearnConfig::default()
    };
    let pricer = match args.algorithm {
        Algorithm::Gdt => Pricer::Gdt(GdtConfig::default()),
        Algorithm::Bm => Pricer::Bm(BmConfig::default()),
    };

    let learned = learn(&problem, &pricer, &config).expect("learning failed");
    println!(
        "fit objective {:.6}, error per assortment {:.6}, {} master solves ({})",
        learned.objective,
        learned.fit_error(problem.nb_assortments()),
        learned.history.len(),
        learned.termination
    );
    print!("{}", learned.model.digest());

    let max_capacity = args.max_capacity.min(problem.nb_products() - 1);
    let options = AssortmentOptions {
        tie_handling: TieHandling::LazyConstraints,
        verbose: args.verbose_solver,
        ..AssortmentOptions::capacity(args.min_capacity, max_capacity)
    };
    let best = best_assortment(&learned.model, problem.revenue(), &options)
        .expect("assortment optimization failed");

    println!(
        "best assortment {:?} with expected revenue {:.4}",
        best.products(),
        best.expected_revenue
    );
}
