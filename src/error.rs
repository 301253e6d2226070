use crate::{
    atmosphere::AtmosphereError, composite::CompositeError, config::ConfigError,
    layer::LayerError, source::SourceError, spline::SplineError, telescope::TelescopeError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `atmosphere` module")]
    Atmosphere(#[from] AtmosphereError),
    #[error("Error in the `layer` module")]
    Layer(#[from] LayerError),
    #[error("Error in the `composite` module")]
    Composite(#[from] CompositeError),
    #[error("Error in the `config` module")]
    Config(#[from] ConfigError),
    #[error("Error in the `telescope` module")]
    Telescope(#[from] TelescopeError),
    #[error("Error in the `source` module")]
    Source(#[from] SourceError),
    #[error("Error in the `spline` module")]
    Spline(#[from] SplineError),
}
