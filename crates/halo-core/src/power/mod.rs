//! Halo-model power spectra: the per-`(k, z)` mass integrals and the engine
//! that assembles one-halo, two-halo and shot-noise terms from them.

pub mod engine;
pub mod integrator;

pub use engine::PowerSpectrumEngine;
pub use integrator::{HaloIntegrator, Occupation, Tracer};
