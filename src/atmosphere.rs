//! Multi-layer frozen flow atmosphere
//!
//! The [Atmosphere] owns the turbulence layers and moves all of them by one
//! time step at each [tick](Atmosphere::tick).
//! Each layer draws its random numbers from its own generator, seeded from the
//! atmosphere seed, so the atmosphere evolution depends neither on the order
//! the layers are processed in nor on any other random number consumer.

use crate::{
    composite::{composite, CompositeError, CompositeWavefront},
    config::{AtmosphereConfig, ConfigError, LayerConfig},
    layer::{LayerError, StepState, TurbulenceLayer},
    source::Source,
    statistics::VonKarman,
    telescope::{Telescope, TelescopeError},
};
use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use std::time::Instant;

/// Radian to arcsecond
const RAD2ARCSEC: f64 = 180. * 3600. / std::f64::consts::PI;

#[derive(thiserror::Error, Debug)]
pub enum AtmosphereError {
    #[error("invalid atmosphere configuration")]
    Configuration(#[from] ConfigError),
    #[error("invalid telescope")]
    Telescope(#[from] TelescopeError),
    #[error("failed to build layer #{1}")]
    Layer(#[source] LayerError, usize),
    #[error("failed to advance the atmosphere")]
    Advance(#[from] LayerError),
    #[error("failed to compute the source wavefront")]
    Composite(#[from] CompositeError),
    #[error("the checkpoint has {found} layers, expected {expected}")]
    Checkpoint { expected: usize, found: usize },
}
type Result<T> = std::result::Result<T, AtmosphereError>;

/// Listener notified after each atmosphere time step
///
/// Observers are owned by the [Atmosphere] which is shared across threads
/// when compositing several sources
pub trait PhaseObserver: Send + Sync {
    /// Receives the simulation `time` [s] and read-only views of the layers
    fn notify(&mut self, time: f64, layers: &[TurbulenceLayer]);
}

/// Random number generators of all the layers
#[derive(Debug, Clone)]
pub struct RandomState(Vec<StdRng>);

/// Snapshot of the atmosphere dynamic state
#[derive(Debug, Clone)]
pub struct Checkpoint {
    step: usize,
    phases: Vec<DMatrix<f64>>,
    states: Vec<StepState>,
    random_state: RandomState,
}

/// [Atmosphere] builder
#[derive(Debug, Clone)]
pub struct AtmosphereBuilder {
    config: AtmosphereConfig,
}
impl Default for AtmosphereBuilder {
    fn default() -> Self {
        Self {
            config: AtmosphereConfig {
                layers: vec![],
                ..Default::default()
            },
        }
    }
}
impl From<AtmosphereConfig> for AtmosphereBuilder {
    fn from(config: AtmosphereConfig) -> Self {
        Self { config }
    }
}
impl AtmosphereBuilder {
    /// Sets the Fried parameter [m]
    pub fn r0(self, r0: f64) -> Self {
        Self {
            config: AtmosphereConfig { r0, ..self.config },
        }
    }
    /// Sets the outer scale [m]
    pub fn outer_scale(self, outer_scale: f64) -> Self {
        Self {
            config: AtmosphereConfig {
                outer_scale,
                ..self.config
            },
        }
    }
    /// Sets the wavelength [m] of `r0` and of the layer phase screens
    pub fn wavelength(self, wavelength: f64) -> Self {
        Self {
            config: AtmosphereConfig {
                wavelength,
                ..self.config
            },
        }
    }
    /// Sets the time step [s]
    pub fn sampling_time(self, sampling_time: f64) -> Self {
        Self {
            config: AtmosphereConfig {
                sampling_time,
                ..self.config
            },
        }
    }
    pub fn seed(self, seed: u64) -> Self {
        Self {
            config: AtmosphereConfig { seed, ..self.config },
        }
    }
    /// Adds a turbulence layer
    pub fn layer(mut self, layer: LayerConfig) -> Self {
        self.config.layers.push(layer);
        self
    }
    /// Builds the atmosphere sampled according to the `telescope`
    pub fn build(self, telescope: &Telescope) -> Result<Atmosphere> {
        Atmosphere::new(self.config, telescope.clone())
    }
}

/// Multi-layer atmosphere
pub struct Atmosphere {
    config: AtmosphereConfig,
    telescope: Telescope,
    layers: Vec<TurbulenceLayer>,
    step: usize,
    observers: Vec<Box<dyn PhaseObserver>>,
}
impl Atmosphere {
    pub fn builder() -> AtmosphereBuilder {
        Default::default()
    }
    /// Creates the atmosphere and synthesizes the initial layer phase screens
    pub fn new(config: AtmosphereConfig, telescope: Telescope) -> Result<Self> {
        config.check()?;
        telescope.check()?;
        let geometries = config
            .layers
            .iter()
            .map(|layer| telescope.layer_geometry(layer.altitude))
            .collect::<std::result::Result<Vec<_>, TelescopeError>>()?;
        log::info!(
            "building the atmosphere: {} layers, r0={}m, L0={}m ...",
            config.layers.len(),
            config.r0,
            config.outer_scale
        );
        let now = Instant::now();
        let turbulence = VonKarman::new(config.r0, config.outer_scale);
        let layers = geometries
            .into_iter()
            .zip(&config.layers)
            .zip(layer_streams(config.seed, config.layers.len()))
            .enumerate()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(index, ((geometry, layer), rng))| {
                TurbulenceLayer::new(
                    index,
                    geometry,
                    layer.weight,
                    layer.wind_vector(),
                    turbulence.layer(layer.weight),
                    config.sampling_time,
                    rng,
                )
                .map_err(|e| AtmosphereError::Layer(e, index))
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!("atmosphere built in {}s", now.elapsed().as_secs_f64());
        Ok(Self {
            config,
            telescope,
            layers,
            step: 0,
            observers: vec![],
        })
    }
    pub fn config(&self) -> &AtmosphereConfig {
        &self.config
    }
    pub fn telescope(&self) -> &Telescope {
        &self.telescope
    }
    pub fn layers(&self) -> &[TurbulenceLayer] {
        &self.layers
    }
    /// Simulation time [s]
    pub fn time(&self) -> f64 {
        self.step as f64 * self.config.sampling_time
    }
    /// Adds a listener notified after each time step
    pub fn subscribe(&mut self, observer: Box<dyn PhaseObserver>) {
        self.observers.push(observer);
    }
    /// Moves all the layers by one time step and returns the new simulation time [s]
    pub fn tick(&mut self) -> Result<f64> {
        let dt = self.config.sampling_time;
        self.layers
            .par_iter_mut()
            .try_for_each(|layer| layer.advance(dt).map(|_| ()))?;
        self.step += 1;
        let time = self.time();
        for observer in self.observers.iter_mut() {
            observer.notify(time, &self.layers);
        }
        Ok(time)
    }
    /// Wavefront of `source` at the current time
    pub fn propagate(&self, source: &Source) -> Result<CompositeWavefront> {
        let n = source
            .resolution
            .or(self.telescope.resolution)
            .ok_or(TelescopeError::MissingResolution)?;
        let pupil = self.telescope.coordinates(n);
        let phase = composite(&self.layers, &pupil, source, self.config.wavelength)?;
        Ok(CompositeWavefront {
            time: self.time(),
            wavelength: source.wavelength,
            phase,
        })
    }
    /// Wavefronts of all the `sources` at the current time
    pub fn propagate_all(&self, sources: &[Source]) -> Result<Vec<CompositeWavefront>> {
        sources
            .par_iter()
            .map(|source| self.propagate(source))
            .collect()
    }
    /// Layer random number generators
    pub fn random_state(&self) -> RandomState {
        RandomState(self.layers.iter().map(|layer| layer.rng().clone()).collect())
    }
    /// Pins the layer random number generators
    pub fn set_random_state(&mut self, random_state: &RandomState) -> Result<()> {
        self.check_layer_count(random_state.0.len())?;
        self.layers
            .iter_mut()
            .zip(&random_state.0)
            .for_each(|(layer, rng)| layer.set_rng(rng.clone()));
        Ok(())
    }
    /// Saves the atmosphere state
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            step: self.step,
            phases: self.layers.iter().map(|layer| layer.phase().clone()).collect(),
            states: self.layers.iter().map(|layer| layer.state().clone()).collect(),
            random_state: self.random_state(),
        }
    }
    /// Restores the atmosphere state saved in `checkpoint`
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.check_layer_count(checkpoint.phases.len())?;
        self.set_random_state(&checkpoint.random_state)?;
        self.layers
            .iter_mut()
            .zip(checkpoint.phases.iter().zip(&checkpoint.states))
            .for_each(|(layer, (phase, state))| layer.restore(phase.clone(), state.clone()));
        self.step = checkpoint.step;
        Ok(())
    }
    /// Starts the atmosphere over from its seed
    pub fn reset(&mut self) {
        let streams = layer_streams(self.config.seed, self.layers.len());
        self.layers
            .par_iter_mut()
            .zip(streams)
            .for_each(|(layer, rng)| layer.resynthesize(rng));
        self.step = 0;
    }
    fn check_layer_count(&self, found: usize) -> Result<()> {
        if found != self.layers.len() {
            return Err(AtmosphereError::Checkpoint {
                expected: self.layers.len(),
                found,
            });
        }
        Ok(())
    }
}

/// Integrated turbulence parameters
impl Atmosphere {
    /// Fried parameter [m] at `wavelength` [m]
    pub fn r0(&self, wavelength: f64) -> f64 {
        VonKarman::new(self.config.r0, self.config.outer_scale)
            .at_wavelength(self.config.wavelength, wavelength)
            .r0
    }
    /// Seeing [arcsec] at `wavelength` [m]
    pub fn seeing(&self, wavelength: f64) -> f64 {
        0.98 * wavelength / self.r0(wavelength) * RAD2ARCSEC
    }
    fn turbulence_average<F: Fn(&LayerConfig) -> f64>(&self, value: F) -> f64 {
        self.config
            .layers
            .iter()
            .map(|layer| layer.weight * value(layer).powf(5. / 3.))
            .sum::<f64>()
            .powf(3. / 5.)
    }
    /// Turbulence weighted altitude [m]
    pub fn mean_altitude(&self) -> f64 {
        self.turbulence_average(|layer| layer.altitude)
    }
    /// Turbulence weighted wind speed [m/s]
    pub fn mean_wind_speed(&self) -> f64 {
        self.turbulence_average(|layer| layer.wind_speed.abs())
    }
    /// Isoplanatic angle [rd] at `wavelength` [m]
    pub fn isoplanatic_angle(&self, wavelength: f64) -> f64 {
        0.314 * self.r0(wavelength) / self.mean_altitude()
    }
    /// Coherence time [s] at `wavelength` [m]
    pub fn coherence_time(&self, wavelength: f64) -> f64 {
        0.314 * self.r0(wavelength) / self.mean_wind_speed()
    }
}

/// Independent random number generators for `n` layers
fn layer_streams(seed: u64, n: usize) -> Vec<StdRng> {
    let mut root = StdRng::seed_from_u64(seed);
    (0..n).map(|_| StdRng::seed_from_u64(root.gen())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn telescope() -> Telescope {
        Telescope::new(2.).resolution(9).field_of_view(2e-4)
    }
    fn atmosphere(seed: u64) -> Atmosphere {
        Atmosphere::builder()
            .r0(0.2)
            .outer_scale(20.)
            .sampling_time(0.01)
            .seed(seed)
            .layer(LayerConfig::new(0., 0.6).wind(7., 0.5))
            .layer(LayerConfig::new(5e3, 0.4).wind(12., 2.))
            .build(&telescope())
            .unwrap()
    }

    #[test]
    fn layers() {
        let atm = atmosphere(1);
        assert_eq!(atm.layers().len(), 2);
        assert_eq!(atm.layers()[0].n_pixel(), 9);
        // 2+2*5e3*tan(1e-4) = 3m
        assert_eq!(atm.layers()[1].n_pixel(), 13);
        assert_ne!(atm.layers()[0].phase(), atm.layers()[1].phase());
    }

    #[test]
    fn invalid_configurations() {
        let tel = telescope();
        assert!(matches!(
            Atmosphere::builder().build(&tel),
            Err(AtmosphereError::Configuration(_))
        ));
        let builder = Atmosphere::builder().layer(LayerConfig::new(0., 1.));
        assert!(matches!(
            builder.clone().build(&Telescope::new(2.)),
            Err(AtmosphereError::Telescope(TelescopeError::MissingResolution))
        ));
        assert!(builder.r0(-1.).build(&tel).is_err());
    }

    #[test]
    fn independent_random_stream() {
        let mut atm = atmosphere(7);
        let mut other = atmosphere(7);
        let mut unrelated = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            atm.tick().unwrap();
            let _: f64 = rand::thread_rng().gen();
            let _: Vec<u64> = (0..10).map(|_| unrelated.gen()).collect();
            other.tick().unwrap();
            for (a, b) in atm.layers().iter().zip(other.layers()) {
                assert_eq!(a.phase(), b.phase());
            }
        }
    }

    #[test]
    fn checkpoint_restore() {
        let mut atm = atmosphere(3);
        atm.tick().unwrap();
        let checkpoint = atm.checkpoint();
        for _ in 0..4 {
            atm.tick().unwrap();
        }
        let phases: Vec<_> = atm.layers().iter().map(|l| l.phase().clone()).collect();
        let time = atm.time();
        atm.restore(&checkpoint).unwrap();
        assert_eq!(atm.time(), 0.01);
        for _ in 0..4 {
            atm.tick().unwrap();
        }
        assert_eq!(atm.time(), time);
        for (layer, phase) in atm.layers().iter().zip(&phases) {
            assert_eq!(layer.phase(), phase);
        }
    }

    #[test]
    fn reset() {
        let mut atm = atmosphere(3);
        let initial: Vec<_> = atm.layers().iter().map(|l| l.phase().clone()).collect();
        for _ in 0..3 {
            atm.tick().unwrap();
        }
        assert_ne!(atm.layers()[0].phase(), &initial[0]);
        atm.reset();
        assert_eq!(atm.time(), 0.);
        for (layer, phase) in atm.layers().iter().zip(&initial) {
            assert_eq!(layer.phase(), phase);
        }
    }

    struct Recorder(Arc<Mutex<Vec<f64>>>);
    impl PhaseObserver for Recorder {
        fn notify(&mut self, time: f64, layers: &[TurbulenceLayer]) {
            assert_eq!(layers.len(), 2);
            self.0.lock().unwrap().push(time);
        }
    }

    #[test]
    fn observers() {
        let mut atm = atmosphere(0);
        let times = Arc::new(Mutex::new(vec![]));
        atm.subscribe(Box::new(Recorder(times.clone())));
        let t1 = atm.tick().unwrap();
        let t2 = atm.tick().unwrap();
        assert_eq!(*times.lock().unwrap(), vec![t1, t2]);
        assert_eq!(t2, 0.02);
    }

    #[test]
    fn propagate() {
        let atm = atmosphere(0);
        let sources = vec![
            Source::default(),
            Source::default().direction_angles(1e-4, 0.).wavelength(1e-6),
            Source::default().resolution(5),
        ];
        let wavefronts = atm.propagate_all(&sources).unwrap();
        assert_eq!(wavefronts[0].phase.shape(), (9, 9));
        assert_eq!(wavefronts[2].phase.shape(), (5, 5));
        // on-axis: ground layer + central part of the upper layer, scaled to 550nm
        let expected = (atm.layers()[0].phase()
            + atm.layers()[1].phase().view((2, 2), (9, 9)))
            * (500e-9 / 0.55e-6);
        assert!((&wavefronts[0].phase - expected).abs().max() < 1e-9);
        let high = Source::default().height(1e3);
        assert!(atm.propagate(&high).is_err());
    }

    #[test]
    fn propagate_sources_in_parallel() {
        fn shared<T: Sync>(_: &T) {}
        let mut atm = atmosphere(0);
        atm.subscribe(Box::new(Recorder(Arc::new(Mutex::new(vec![])))));
        shared(&atm);
        atm.tick().unwrap();
        let sources: Vec<Source> = (0..6)
            .map(|k| Source::default().direction_angles(1.5e-5 * k as f64, 0.3 * k as f64))
            .collect();
        let wavefronts = atm.propagate_all(&sources).unwrap();
        assert_eq!(wavefronts.len(), sources.len());
        for (source, wavefront) in sources.iter().zip(&wavefronts) {
            let expected = atm.propagate(source).unwrap();
            assert_eq!(wavefront.phase, expected.phase);
            assert_eq!(wavefront.time, 0.01);
        }
        assert_ne!(wavefronts[0].phase, wavefronts[5].phase);
    }

    #[test]
    fn integrated_parameters() {
        let atm = atmosphere(0);
        assert!((atm.r0(500e-9) - 0.2).abs() < 1e-15);
        assert!((atm.seeing(500e-9) - 0.98 * 500e-9 / 0.2 * RAD2ARCSEC).abs() < 1e-12);
        let h = (0.4 * 5e3f64.powf(5. / 3.)).powf(3. / 5.);
        assert!((atm.mean_altitude() - h).abs() < 1e-9);
        assert!((atm.isoplanatic_angle(500e-9) - 0.314 * 0.2 / h).abs() < 1e-15);
        let v = (0.6 * 7f64.powf(5. / 3.) + 0.4 * 12f64.powf(5. / 3.)).powf(3. / 5.);
        assert!((atm.coherence_time(500e-9) - 0.314 * 0.2 / v).abs() < 1e-15);
    }
}
