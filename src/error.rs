// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors that can occur in lband

use thiserror::Error;

use crate::{config::ConfigError, gap_interp::GapInterpError, io::error::IOError};

#[derive(Error, Debug)]
/// Errors raised while handling command line arguments
pub enum CLIError {
    #[error("Invalid Command Line Argument {option}. Expected {expected}, received {received}")]
    /// When an invalid argument is provided
    InvalidCommandLineArgument {
        /// The option which was invalid
        option: String,
        /// The type of value which was expected
        expected: String,
        /// The value which was received
        received: String,
    },
}

#[derive(Error, Debug)]
/// All the errors that can occur in lband
pub enum LbandError {
    /// Error derived from [`GapInterpError`]
    #[error(transparent)]
    GapInterpError(#[from] GapInterpError),

    /// Error derived from [`IOError`]
    #[error(transparent)]
    IOError(#[from] IOError),

    /// Error derived from [`ConfigError`]
    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    /// Error derived from [`CLIError`]
    #[error(transparent)]
    CLIError(#[from] CLIError),

    #[cfg(feature = "cli")]
    /// Error derived from [`clap::Error`]
    #[error(transparent)]
    ClapError(#[from] clap::Error),

    #[error("Dry run. No files will be written.")]
    /// The arguments were only parsed and summarised
    DryRun {},
}
