//! FindSimilar command-line helpers

pub mod output;
