/*!
# Frozen flow atmospheric turbulence

Multi-layer phase screens for adaptive optics simulations.

Each turbulence layer is a von Kármán phase screen synthesized once and then
moved by the wind at each time step: the screen is extended by one pixel with
a new random border, statistically consistent with the screen, and resampled
at the displaced coordinates with cubic splines.
The wavefront of a source is the sum of the layer phase screens sampled along
the source line-of-sight.

```no_run
use ao_atmosphere::{config::LayerConfig, Atmosphere, Band, Source, Telescope};

# fn main() -> Result<(), ao_atmosphere::Error> {
let telescope = Telescope::new(8.).resolution(65).field_of_view(1e-3);
let mut atm = Atmosphere::builder()
    .r0(0.15)
    .outer_scale(30.)
    .layer(LayerConfig::new(0., 0.7).wind(5., 0.))
    .layer(LayerConfig::new(10e3, 0.3).wind(20., 1.))
    .build(&telescope)?;
let star = Source::new(Band::H);
for _ in 0..10 {
    atm.tick()?;
    let wavefront = atm.propagate(&star)?;
    println!("{:.3}rd", wavefront.rms(&telescope.pupil(65)));
}
# Ok(())
# }
```
*/

pub mod atmosphere;
pub mod composite;
pub mod config;
pub mod error;
pub mod fft;
pub mod layer;
pub mod screen;
pub mod source;
pub mod spline;
pub mod statistics;
pub mod telescope;

pub use atmosphere::{Atmosphere, PhaseObserver};
pub use composite::CompositeWavefront;
pub use error::Error;
pub use layer::TurbulenceLayer;
pub use source::{Band, Source};
pub use telescope::Telescope;
