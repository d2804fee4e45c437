//! Tracked VR controllers drawn as cubes.
//!
//! Each frame the session waits on the VR runtime for poses, resolves the
//! head and both hands, renders a cube per hand into each eye's target and
//! submits both eye images to the compositor.

pub mod app;
pub mod config;
pub mod error;
pub mod eye;
pub mod pose;
pub mod renderer;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod testing;
