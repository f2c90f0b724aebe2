use crate::Tabulation::ball_region::BallRegion;
use crate::Tabulation::eviction::{
    ClearAll, Evict, EvictionPolicy, LeastRecentlyUsed, LeastRetrieved, MaxLifetime,
};
use crate::Tabulation::tab_config::TabulationConfig;
use crate::Tabulation::tab_entry::Evaluation;
use crate::Tabulation::tab_error::TabulationError;
use crate::Tabulation::tabulation_cache::TabulationCache;
use crate::Utils::logger::init_logger;
use log::LevelFilter;
use nalgebra::{DMatrix, DVector};
use prettytable::{Cell, Row, Table};

const R: f64 = 8.314;

/// First order reaction A -> B, k = A exp(-E/RT), integrated exactly over one time step.
/// Query: (T, C_A), result: C_A after `dt`, gradient with respect to (T, C_A).
struct FirstOrderReaction {
    A: f64,
    E: f64,
    dt: f64,
}

impl FirstOrderReaction {
    fn integrate(&self, q: &DVector<f64>) -> Result<Evaluation, String> {
        let (T, C) = (q[0], q[1]);
        if T <= 0.0 {
            return Err(format!("non-physical temperature {}", T));
        }
        let k = self.A * (-self.E / (R * T)).exp();
        let decay = (-k * self.dt).exp();
        let C_new = C * decay;
        let dC_dT = -C_new * self.dt * k * self.E / (R * T * T);
        Ok(Evaluation::with_gradient(
            DVector::from_vec(vec![C_new]),
            DMatrix::from_row_slice(1, 2, &[dC_dT, decay]),
        ))
    }
}

/// deterministic sequence of states along a slowly drifting trajectory
fn trajectory(n: usize) -> Vec<DVector<f64>> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let T = 1000.0 + 200.0 * (0.01 * t).sin() + 0.5 * ((7 * i) % 11) as f64;
            let C = 0.5 + 0.4 * (0.003 * t).cos();
            DVector::from_vec(vec![T, C])
        })
        .collect()
}

fn reaction() -> FirstOrderReaction {
    FirstOrderReaction {
        A: 1e7,
        E: 120_000.0,
        dt: 1e-4,
    }
}

/// terminal logging for the demos; a logger installed earlier is kept
fn start_logger() -> bool {
    match init_logger(LevelFilter::Info, None) {
        Ok(()) | Err(TabulationError::Logger(_)) => true,
        Err(e) => {
            println!("cannot initialize logger: {}", e);
            false
        }
    }
}

pub fn tab_examples(task: usize) {
    //
    start_logger();
    match task {
        0 => {
            // tabulate the kinetics along a trajectory, compare with the exact integration
            let mechanism = reaction();
            let config = TabulationConfig {
                tolerance: 1e-5,
                initial_radius: 0.5,
                check_interval: 500,
                ..TabulationConfig::default()
            };
            let evaluator = |q: &DVector<f64>| mechanism.integrate(q);
            let mut cache: TabulationCache<BallRegion, _> =
                match TabulationCache::new(2, config, evaluator) {
                    Ok(cache) => cache,
                    Err(e) => {
                        println!("cannot create tabulation: {}", e);
                        return;
                    }
                };
            let mut max_error: f64 = 0.0;
            for q in trajectory(5000) {
                match (cache.query(&q), mechanism.integrate(&q)) {
                    (Ok(tabulated), Ok(exact)) => {
                        max_error = max_error.max((tabulated - exact.result).norm());
                    }
                    (Err(e), _) => println!("query failed: {}", e),
                    (_, Err(e)) => println!("integration failed: {}", e),
                }
            }
            cache.print_summary();
            println!("max deviation from the exact solution: {:e}", max_error);
        }
        1 => {
            // configuration file: defaults are used when the file is missing
            let path = "tabulation_config.json";
            match TabulationConfig::from_file(path) {
                Ok(config) => println!("{:#?}", config),
                Err(e) => println!("invalid config {}: {}", path, e),
            }
            let config = TabulationConfig::from_json_str(
                r#"{"max_n_leafs": 200, "eviction": {"kind": "LeastRecentlyUsed", "keep_fraction": 0.5}}"#,
            );
            println!("{:#?}", config);
        }
        2 => {
            // eviction policies on a small table
            let mechanism = reaction();
            let policies = vec![
                EvictionPolicy::LeastRetrieved(LeastRetrieved::default()),
                EvictionPolicy::LeastRecentlyUsed(LeastRecentlyUsed { keep_fraction: 0.7 }),
                EvictionPolicy::MaxLifetime(MaxLifetime {
                    max_age: 0,
                    max_idle: 300,
                }),
                EvictionPolicy::ClearAll(ClearAll {}),
            ];
            let mut table = Table::new();
            table.add_row(Row::new(vec![
                Cell::new("policy"),
                Cell::new("hit ratio"),
                Cell::new("evaluations"),
                Cell::new("evicted"),
                Cell::new("entries"),
            ]));
            for eviction in policies {
                let config = TabulationConfig {
                    max_n_leafs: 50,
                    tolerance: 1e-5,
                    initial_radius: 0.5,
                    check_interval: 100,
                    eviction,
                    ..TabulationConfig::default()
                };
                let label = config.eviction.label();
                let evaluator = |q: &DVector<f64>| mechanism.integrate(q);
                let mut cache: TabulationCache<BallRegion, _> =
                    match TabulationCache::new(2, config, evaluator) {
                        Ok(cache) => cache,
                        Err(e) => {
                            println!("{}: {}", label, e);
                            continue;
                        }
                    };
                for q in trajectory(3000) {
                    if let Err(e) = cache.query(&q) {
                        println!("query failed: {}", e);
                    }
                }
                let stats = cache.stats();
                table.add_row(Row::new(vec![
                    Cell::new(&label),
                    Cell::new(&format!("{:.3}", stats.hit_ratio())),
                    Cell::new(&stats.n_evaluations.to_string()),
                    Cell::new(&stats.n_evicted.to_string()),
                    Cell::new(&cache.len().to_string()),
                ]));
            }
            table.printstd();
        }
        _ => println!("no such example: {}", task),
    }
}
