//! Generation-addressed ring storage for topic records

pub mod generation;


pub use generation::{GenerationRing, ReadPlan};
