// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors that can occur in the io module

use std::path::PathBuf;

use marlu::rubbl_casatables;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(clippy::upper_case_acronyms)]
/// All the errors that can occur in file io operations
pub enum IOError {
    #[error("{0}")]
    /// Error derived from [`std::io::Error`]
    StdIo(#[from] std::io::Error),

    #[error("{path} already exists. Use overwrite or append to replace it")]
    /// Refused to clobber an existing output file
    FileExists {
        /// The path which already exists
        path: PathBuf,
    },

    /// Error to describe a line of a continuum range report which can't be
    /// parsed.
    #[error("{path}:{line_num}: can't parse continuum range report line {line:?}")]
    ContReportParse {
        /// The report path
        path: PathBuf,
        /// The line number, starting from 1
        line_num: usize,
        /// The offending line
        line: String,
    },

    #[error("spectral window {spw} not found in {table}")]
    /// The requested spectral window has no rows in the table
    SpwNotFound {
        /// The requested spectral window id
        spw: usize,
        /// The table path
        table: PathBuf,
    },

    /// The rows of a table are inconsistent with each other.
    #[error("Inconsistent table {table} (row: {row}, expected: {expected}, found: {found})")]
    TableInconsistent {
        /// The table path
        table: PathBuf,
        /// The row where the inconsistency was found
        row: usize,
        /// The value that was expected
        expected: String,
        /// The unexpected value that was found
        found: String,
    },

    #[error("{0}")]
    /// Error derived from [`rubbl_casatables::TableError`]
    TableError(#[from] rubbl_casatables::TableError),

    #[error("{0}")]
    /// Error derived from [`rubbl_casatables::CasacoreError`]
    CasacoreError(#[from] rubbl_casatables::CasacoreError),
}
