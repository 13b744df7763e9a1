#![allow(clippy::enum_variant_names)]
//! An in-memory hierarchical namespace of directories and files.
//!
//! [`filesystem::FileTree`] maintains the tree, [`checker`] verifies it
//! independently, and the remaining modules drive it from a YAML manifest.

pub mod application;
pub mod checker;
pub mod cli;
pub mod config;
pub mod filesystem;
pub mod operations;
