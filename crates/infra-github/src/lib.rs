// Relsync Infrastructure - GitHub Release Provider
// Implements: ReleaseProvider over the GitHub REST releases API

mod client;
mod model;

pub use client::{GithubReleaseProvider, DEFAULT_API_URL};
