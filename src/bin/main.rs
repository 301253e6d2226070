use ao_atmosphere::{
    config::AtmosphereConfig, Atmosphere, Band, CompositeWavefront, PhaseObserver, Source,
    Telescope, TurbulenceLayer,
};
use indicatif::ProgressBar;
use std::{fs::File, time::Instant};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ao-atmosphere",
    about = "Frozen flow atmospheric turbulence wavefronts"
)]
struct Opt {
    /// Telescope diameter [m]
    #[structopt(short, long, default_value = "8")]
    diameter: f64,
    /// Pupil sampling
    #[structopt(short = "n", long, default_value = "65")]
    resolution: usize,
    /// Field of view [arcmin]
    #[structopt(long, default_value = "0")]
    fov: f64,
    /// Central obstruction ratio
    #[structopt(long, default_value = "0")]
    obstruction: f64,
    /// Atmosphere configuration pickle file
    #[structopt(short, long)]
    config: Option<String>,
    /// Fried parameter [m] at 500nm
    #[structopt(long)]
    r0: Option<f64>,
    /// Outer scale [m]
    #[structopt(long)]
    outer_scale: Option<f64>,
    /// Time step [s]
    #[structopt(long)]
    sampling_time: Option<f64>,
    /// Random number generator seed
    #[structopt(long)]
    seed: Option<u64>,
    /// Number of time steps
    #[structopt(short, long, default_value = "100")]
    steps: usize,
    /// Source photometric band
    #[structopt(short, long, default_value = "V")]
    band: Band,
    /// Source zenith angle [arcsec]
    #[structopt(long, default_value = "0")]
    zenith: f64,
    /// Source azimuth angle [degree]
    #[structopt(long, default_value = "0")]
    azimuth: f64,
    /// Source height [m]
    #[structopt(long)]
    height: Option<f64>,
    /// Wavefronts pickle file
    #[structopt(short, long, default_value = "wavefronts.pkl")]
    output: String,
}

/// Logs the layer phase screens rms
struct LayerMonitor;
impl PhaseObserver for LayerMonitor {
    fn notify(&mut self, time: f64, layers: &[TurbulenceLayer]) {
        for layer in layers {
            let phase = layer.phase();
            let mean = phase.mean();
            let rms = (phase.map(|x| (x - mean).powi(2)).mean()).sqrt();
            log::debug!("t={time:.4}s: layer #{} rms={rms:.3}rd", layer.index());
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut config = match &opt.config {
        Some(path) => AtmosphereConfig::from_pickle(path)?,
        None => AtmosphereConfig::default(),
    };
    if let Some(r0) = opt.r0 {
        config.r0 = r0;
    }
    if let Some(outer_scale) = opt.outer_scale {
        config.outer_scale = outer_scale;
    }
    if let Some(sampling_time) = opt.sampling_time {
        config.sampling_time = sampling_time;
    }
    if let Some(seed) = opt.seed {
        config.seed = seed;
    }
    let telescope = Telescope::new(opt.diameter)
        .resolution(opt.resolution)
        .field_of_view((opt.fov / 60.).to_radians())
        .obstruction(opt.obstruction);

    let mut atm = Atmosphere::new(config, telescope.clone())?;
    atm.subscribe(Box::new(LayerMonitor));
    let wavelength = opt.band.wavelength();
    println!("Atmosphere @ {}:", opt.band);
    println!(" . seeing           : {:.3}arcsec", atm.seeing(wavelength));
    println!(" . r0               : {:.3}m", atm.r0(wavelength));
    println!(
        " . isoplanatic angle: {:.3}arcsec",
        atm.isoplanatic_angle(wavelength).to_degrees() * 3600.
    );
    println!(
        " . coherence time   : {:.3}ms",
        atm.coherence_time(wavelength) * 1e3
    );

    let mut source = Source::new(opt.band)
        .direction_angles((opt.zenith / 3600.).to_radians(), opt.azimuth.to_radians());
    if let Some(height) = opt.height {
        source = source.height(height);
    }
    source.check()?;
    let pupil = telescope.pupil(opt.resolution);

    let now = Instant::now();
    let pb = ProgressBar::new(opt.steps as u64);
    let mut wavefronts: Vec<CompositeWavefront> = Vec::with_capacity(opt.steps);
    for _ in 0..opt.steps {
        atm.tick()?;
        wavefronts.push(atm.propagate(&source)?);
        pb.inc(1);
    }
    pb.finish();
    println!(
        "{} wavefronts computed in {:.3}s",
        wavefronts.len(),
        now.elapsed().as_secs_f64()
    );
    if !wavefronts.is_empty() {
        let mean_rms = wavefronts.iter().map(|w| w.rms(&pupil)).sum::<f64>()
            / wavefronts.len() as f64;
        println!("Mean wavefront rms: {:.3}rd", mean_rms);
    }

    serde_pickle::to_writer(
        &mut File::create(&opt.output)?,
        &wavefronts,
        Default::default(),
    )?;
    println!("Wavefronts saved to {}", opt.output);
    Ok(())
}
