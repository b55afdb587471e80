// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Input and output: CASA tables and text reports.

pub mod caltable;
pub mod error;

use std::{
    fs::{File, OpenOptions},
    path::Path,
};

use log::{debug, trace};
use marlu::rubbl_casatables::{Table, TableOpenMode};

use self::error::IOError;
use crate::spw::SpectralWindow;

/// Open a text output for writing.
///
/// An existing file is truncated with `overwrite`, or extended with `append`.
/// Otherwise an existing file is left alone.
///
/// # Errors
///
/// Will return [`IOError::FileExists`] if `path` exists and neither
/// `overwrite` nor `append` is set, or [`IOError::StdIo`] if it can't be
/// opened.
pub fn open_output<P: AsRef<Path>>(
    path: P,
    overwrite: bool,
    append: bool,
) -> Result<File, IOError> {
    let path = path.as_ref();
    if path.exists() && !overwrite && !append {
        return Err(IOError::FileExists {
            path: path.to_path_buf(),
        });
    }
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    debug!(
        "opening {} ({})",
        path.display(),
        if append { "append" } else { "truncate" }
    );
    Ok(options.open(path)?)
}

/// Read the `SPECTRAL_WINDOW` subtable of a measurement set or calibration
/// table.
///
/// # Errors
///
/// Will return [`IOError::TableError`] if the subtable can't be read.
pub fn read_spectral_windows<P: AsRef<Path>>(path: P) -> Result<Vec<SpectralWindow>, IOError> {
    trace!("start read_spectral_windows");
    let path = path.as_ref();
    let mut table = Table::open(
        format!("{}/SPECTRAL_WINDOW", path.display()),
        TableOpenMode::Read,
    )?;
    let windows = (0..table.n_rows())
        .map(|row| -> Result<SpectralWindow, IOError> {
            let name: String = table.get_cell("NAME", row)?;
            let chan_freqs_hz: Vec<f64> = table.get_cell_as_vec("CHAN_FREQ", row)?;
            let chan_widths_hz: Vec<f64> = table.get_cell_as_vec("CHAN_WIDTH", row)?;
            Ok(SpectralWindow {
                id: row as usize,
                name,
                chan_freqs_hz,
                chan_width_hz: chan_widths_hz.first().copied().unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, IOError>>()?;
    debug!(
        "read {} spectral windows from {}",
        windows.len(),
        path.display()
    );
    trace!("end read_spectral_windows");
    Ok(windows)
}

/// Read the field names from the `FIELD` subtable of a measurement set.
///
/// # Errors
///
/// Will return [`IOError::TableError`] if the subtable can't be read.
pub fn read_field_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>, IOError> {
    let mut table = Table::open(
        format!("{}/FIELD", path.as_ref().display()),
        TableOpenMode::Read,
    )?;
    Ok(table.get_col_as_vec("NAME")?)
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write};

    use super::*;
    use crate::io::caltable::tests::write_test_caltable;
    use tempfile::tempdir;

    #[test]
    fn test_open_output_policy() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("out.txt");

        open_output(&path, false, false)
            .unwrap()
            .write_all(b"first\n")
            .unwrap();
        assert!(matches!(
            open_output(&path, false, false),
            Err(IOError::FileExists { .. })
        ));

        open_output(&path, false, true)
            .unwrap()
            .write_all(b"second\n")
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");

        open_output(&path, true, false)
            .unwrap()
            .write_all(b"third\n")
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "third\n");
    }

    #[test]
    fn test_read_field_names() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("test.bcal");
        write_test_caltable(&path, 1, 4, 1);
        assert_eq!(
            read_field_names(&path).unwrap(),
            vec!["0521+166=3C138".to_string(), "M31_Field_1".to_string()]
        );
    }

    #[test]
    fn test_read_spectral_windows_missing_table() {
        let tmp_dir = tempdir().unwrap();
        assert!(matches!(
            read_spectral_windows(tmp_dir.path().join("nothing.ms")),
            Err(IOError::TableError(_))
        ));
    }
}
