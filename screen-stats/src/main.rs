use ao_atmosphere::{
    layer::{Geometry, TurbulenceLayer, Wind},
    screen::ScreenSynthesizer,
    statistics::{CovarianceModel, VonKarman},
};
use indicatif::{ParallelProgressIterator, ProgressBar};
use nalgebra::DMatrix;
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::{fs::File, time::Instant};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "screen-stats",
    about = "Phase screens structure function versus the von Kármán model"
)]
struct Opt {
    /// Phase screen sampling
    #[structopt(short, long, default_value = "32")]
    n_pixel: usize,
    /// Phase screen pixel size [m]
    #[structopt(short, long, default_value = "0.1")]
    pixel_scale: f64,
    /// Fried parameter [m]
    #[structopt(long, default_value = "0.15")]
    r0: f64,
    /// Outer scale [m]
    #[structopt(long, default_value = "30")]
    outer_scale: f64,
    /// Number of synthesized phase screens
    #[structopt(short, long, default_value = "1000")]
    trials: usize,
    /// Number of frozen flow time steps
    #[structopt(short, long, default_value = "2000")]
    steps: usize,
    /// Random number generator seed
    #[structopt(long, default_value = "0")]
    seed: u64,
    /// Statistics pickle file
    #[structopt(short, long, default_value = "screen-stats.pkl")]
    output: String,
}

#[derive(Debug, Serialize)]
struct Stats {
    lag: Vec<f64>,
    model: Vec<f64>,
    synthesized: Vec<f64>,
    extruded: Vec<f64>,
}

/// Structure function along x and y for lags of 1 to `max_lag` pixels
fn structure_function(phase: &DMatrix<f64>, max_lag: usize) -> Vec<f64> {
    let n = phase.nrows();
    (1..=max_lag)
        .map(|lag| {
            let m = n - lag;
            let pairs = move || (0..n).flat_map(move |i| (0..m).map(move |j| (i, j)));
            let sx: f64 = pairs()
                .map(|(i, j)| (phase[(i, j + lag)] - phase[(i, j)]).powi(2))
                .sum();
            let sy: f64 = pairs()
                .map(|(j, i)| (phase[(i + lag, j)] - phase[(i, j)]).powi(2))
                .sum();
            (sx + sy) / (2 * n * m) as f64
        })
        .collect()
}

fn add(a: Vec<f64>, b: Vec<f64>) -> Vec<f64> {
    a.into_iter().zip(b).map(|(a, b)| a + b).collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    anyhow::ensure!(opt.n_pixel >= 3, "the phase screen needs at least 3 pixels");
    anyhow::ensure!(
        opt.trials > 0 && opt.steps > 0,
        "nothing to average"
    );

    let vk = VonKarman::new(opt.r0, opt.outer_scale);
    let max_lag = opt.n_pixel / 2;
    let lag: Vec<f64> = (1..=max_lag).map(|k| k as f64 * opt.pixel_scale).collect();
    let model: Vec<f64> = lag.iter().map(|&r| vk.structure_function(r)).collect();

    println!("Synthesizing {} phase screens ...", opt.trials);
    let now = Instant::now();
    let synth = ScreenSynthesizer::new(opt.n_pixel, opt.pixel_scale);
    let synthesized = (0..opt.trials)
        .into_par_iter()
        .progress_count(opt.trials as u64)
        .map(|k| {
            let mut rng = StdRng::seed_from_u64(opt.seed + k as u64);
            structure_function(&synth.synthesize(&vk, &mut rng), max_lag)
        })
        .reduce(|| vec![0f64; max_lag], add)
        .into_iter()
        .map(|x| x / opt.trials as f64)
        .collect::<Vec<f64>>();
    println!(" ... done in {:.3}s", now.elapsed().as_secs_f64());

    println!("Extruding a phase screen over {} steps ...", opt.steps);
    let now = Instant::now();
    let extent = opt.pixel_scale * (opt.n_pixel - 1) as f64;
    // one pixel per step along a diagonal
    let mut layer = TurbulenceLayer::new(
        0,
        Geometry {
            altitude: 0f64,
            extent,
            n_pixel: opt.n_pixel,
        },
        1f64,
        Wind::new(opt.pixel_scale, std::f64::consts::FRAC_PI_4),
        vk,
        1f64,
        StdRng::seed_from_u64(opt.seed),
    )?;
    let pb = ProgressBar::new(opt.steps as u64);
    let mut extruded = vec![0f64; max_lag];
    for _ in 0..opt.steps {
        let phase = layer.advance(1f64)?;
        extruded = add(extruded, structure_function(phase, max_lag));
        pb.inc(1);
    }
    pb.finish();
    extruded.iter_mut().for_each(|x| *x /= opt.steps as f64);
    println!(" ... done in {:.3}s", now.elapsed().as_secs_f64());

    println!("{:>8} {:>10} {:>12} {:>10}", "lag[m]", "model", "synthesized", "extruded");
    for (((r, m), s), e) in lag.iter().zip(&model).zip(&synthesized).zip(&extruded) {
        println!("{r:8.3} {m:10.4} {s:12.4} {e:10.4}");
    }

    let stats = Stats {
        lag,
        model,
        synthesized,
        extruded,
    };
    serde_pickle::to_writer(&mut File::create(&opt.output)?, &stats, Default::default())?;
    println!("Statistics saved to {}", opt.output);
    Ok(())
}
