#![deny(clippy::all)]
// Binary-first crate: internal API surfaces stay public without dead_code noise.
#![allow(dead_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod adapters;
mod app;
mod common;
mod domain;
mod infra;
mod usecases;

pub use app::Program;
