#![doc = include_str!("../README.md")]

mod common;
pub mod fixture;
pub mod resolver;

pub use common::*;
pub use fixture::FixtureError;
pub use resolver::{ChainResolver, Completeness};
