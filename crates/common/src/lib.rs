#![cfg_attr(feature = "strict", deny(warnings))]
#[macro_use]
extern crate serde_derive;

pub mod cache;
pub mod dataset;
pub mod datatype;
pub mod graph;
pub mod policy;
pub mod request;
