//! Core and library management against the package index

pub mod client;

pub use client::PackageClient;
