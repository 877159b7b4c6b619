//! Halo-model matter power spectra and correlation functions, with
//! cooperative tabulation across workers and resumable checkpoints.

pub mod common;
pub mod domain;
pub mod halos;
pub mod numerics;
pub mod power;
pub mod profiles;
pub mod table;
pub mod tabulation;
pub mod transform;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
