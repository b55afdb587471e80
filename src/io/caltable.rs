// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Read and write the solutions of a CASA bandpass calibration table.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use itertools::izip;
use log::{debug, info, trace};
use marlu::rubbl_casatables::{Table, TableOpenMode};
use ndarray::prelude::*;
use num_complex::Complex;

use super::{error::IOError, read_spectral_windows};
use crate::spw::SpectralWindow;

/// The solutions of one spectral window of a calibration table.
///
/// The last axis of the arrays is the table row within the spectral window,
/// which is one row per antenna for a single bandpass solution interval.
#[derive(Debug, Clone)]
pub struct SpwGains {
    /// Spectral window id
    pub spw: usize,
    /// Table row of each entry along the antenna axis
    pub rows: Vec<u64>,
    /// `ANTENNA1` of each row
    pub antennas: Vec<i32>,
    /// Complex gains `[pol][chan][ant]`
    pub gains: Array3<Complex<f32>>,
    /// Flags `[pol][chan][ant]`
    pub flags: Array3<bool>,
    /// Channel frequencies [Hz]
    pub chan_freqs_hz: Vec<f64>,
}

/// A CASA calibration table on disk.
#[derive(Debug, Clone)]
pub struct CalTable {
    path: PathBuf,
}

impl CalTable {
    /// Open a calibration table, checking it can be read.
    ///
    /// # Errors
    ///
    /// Will return [`IOError::TableError`] if the table can't be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IOError> {
        let path = path.as_ref().to_path_buf();
        let table = Table::open(&path, TableOpenMode::Read)?;
        debug!("opened {} with {} rows", path.display(), table.n_rows());
        Ok(Self { path })
    }

    /// The path to the table.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path of the backup copy, `<table>.bak`.
    pub fn backup_path(&self) -> PathBuf {
        let mut backup: OsString = self.path.clone().into_os_string();
        backup.push(".bak");
        PathBuf::from(backup)
    }

    /// Copy the table directory to [`CalTable::backup_path`], unless a backup
    /// already exists. Returns the path of a new backup.
    ///
    /// # Errors
    ///
    /// Will return [`IOError::StdIo`] if the copy fails.
    pub fn backup(&self) -> Result<Option<PathBuf>, IOError> {
        let backup = self.backup_path();
        if backup.exists() {
            info!("keeping existing backup {}", backup.display());
            return Ok(None);
        }
        copy_dir(&self.path, &backup)?;
        info!("backed up {} to {}", self.path.display(), backup.display());
        Ok(Some(backup))
    }

    /// The spectral windows described by the `SPECTRAL_WINDOW` subtable.
    ///
    /// # Errors
    ///
    /// Will return [`IOError::TableError`] if the subtable can't be read.
    pub fn spectral_windows(&self) -> Result<Vec<SpectralWindow>, IOError> {
        read_spectral_windows(&self.path)
    }

    /// Read the solutions of spectral window `spw`.
    ///
    /// # Errors
    ///
    /// Will return [`IOError::SpwNotFound`] if no row has this spectral
    /// window, [`IOError::TableInconsistent`] if rows differ in shape or the
    /// `SPECTRAL_WINDOW` subtable doesn't describe the window, or
    /// [`IOError::TableError`] if the table can't be read.
    pub fn read_spw(&self, spw: usize) -> Result<SpwGains, IOError> {
        trace!("start read_spw");
        let mut table = Table::open(&self.path, TableOpenMode::Read)?;
        let rows = self.spw_rows(&mut table, spw)?;

        let antennas = rows
            .iter()
            .map(|&row| table.get_cell::<i32>("ANTENNA1", row))
            .collect::<Result<Vec<_>, _>>()?;

        let first: Array2<Complex<f32>> = table.get_cell("CPARAM", rows[0])?;
        let (num_chans, num_pols) = first.dim();
        let mut gains = Array3::zeros((num_pols, num_chans, rows.len()));
        let mut flags = Array3::from_elem((num_pols, num_chans, rows.len()), true);

        for (ant_idx, &row) in rows.iter().enumerate() {
            // cells are [chan][pol]
            let cparam: Array2<Complex<f32>> = table.get_cell("CPARAM", row)?;
            let flag: Array2<bool> = table.get_cell("FLAG", row)?;
            for (column, dim) in [("CPARAM", cparam.dim()), ("FLAG", flag.dim())] {
                if dim != (num_chans, num_pols) {
                    return Err(IOError::TableInconsistent {
                        table: self.path.clone(),
                        row: row as usize,
                        expected: format!("{column} shape {:?}", (num_chans, num_pols)),
                        found: format!("{dim:?}"),
                    });
                }
            }
            gains
                .slice_mut(s![.., .., ant_idx])
                .assign(&cparam.t());
            flags.slice_mut(s![.., .., ant_idx]).assign(&flag.t());
        }

        let windows = self.spectral_windows()?;
        let num_windows = windows.len();
        let chan_freqs_hz = windows
            .into_iter()
            .find(|window| window.id == spw)
            .map(|window| window.chan_freqs_hz)
            .ok_or_else(|| IOError::TableInconsistent {
                table: self.path.join("SPECTRAL_WINDOW"),
                row: spw,
                expected: format!("a row for spw {spw}"),
                found: format!("{num_windows} rows"),
            })?;
        if chan_freqs_hz.len() != num_chans {
            return Err(IOError::TableInconsistent {
                table: self.path.join("SPECTRAL_WINDOW"),
                row: spw,
                expected: format!("CHAN_FREQ of {num_chans} channels"),
                found: format!("{} channels", chan_freqs_hz.len()),
            });
        }

        debug!(
            "read spw {} from {}: {} pols, {} chans, {} rows",
            spw,
            self.path.display(),
            num_pols,
            num_chans,
            rows.len()
        );
        trace!("end read_spw");
        Ok(SpwGains {
            spw,
            rows,
            antennas,
            gains,
            flags,
            chan_freqs_hz,
        })
    }

    /// Write solutions read by [`CalTable::read_spw`] back to the same rows.
    ///
    /// # Errors
    ///
    /// Will return [`IOError::TableInconsistent`] if the solutions don't
    /// match the rows of their spectral window, or [`IOError::TableError`] if
    /// the table can't be written.
    pub fn write_spw(&self, spw_gains: &SpwGains) -> Result<(), IOError> {
        trace!("start write_spw");
        let mut table = Table::open(&self.path, TableOpenMode::ReadWrite)?;
        let rows = self.spw_rows(&mut table, spw_gains.spw)?;
        if rows != spw_gains.rows || spw_gains.gains.dim().2 != rows.len() {
            return Err(IOError::TableInconsistent {
                table: self.path.clone(),
                row: rows.first().copied().unwrap_or_default() as usize,
                expected: format!("rows {:?} of spw {}", rows, spw_gains.spw),
                found: format!("{:?}", spw_gains.rows),
            });
        }

        for (gains, flags, &row) in izip!(
            spw_gains.gains.axis_iter(Axis(2)),
            spw_gains.flags.axis_iter(Axis(2)),
            &spw_gains.rows
        ) {
            let cparam = gains.t().as_standard_layout().into_owned();
            let flag = flags.t().as_standard_layout().into_owned();
            table.put_cell("CPARAM", row, &cparam)?;
            table.put_cell("FLAG", row, &flag)?;
        }

        debug!(
            "wrote {} rows of spw {} to {}",
            rows.len(),
            spw_gains.spw,
            self.path.display()
        );
        trace!("end write_spw");
        Ok(())
    }

    fn spw_rows(&self, table: &mut Table, spw: usize) -> Result<Vec<u64>, IOError> {
        let spw_ids: Vec<i32> = table.get_col_as_vec("SPECTRAL_WINDOW_ID")?;
        let rows: Vec<u64> = spw_ids
            .iter()
            .enumerate()
            .filter(|&(_, &id)| id >= 0 && id as usize == spw)
            .map(|(row, _)| row as u64)
            .collect();
        if rows.is_empty() {
            return Err(IOError::SpwNotFound {
                spw,
                table: self.path.clone(),
            });
        }
        Ok(rows)
    }
}

/// Recursively copy the directory `from` to `to`.
fn copy_dir(from: &Path, to: &Path) -> Result<(), std::io::Error> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use marlu::rubbl_casatables::{GlueDataType, TableCreateMode, TableDesc, TableDescCreateMode};
    use tempfile::tempdir;

    /// Write a minimal bandpass table: `num_spws` windows of `num_chans`
    /// channels and 2 pols, one row per antenna per window, and two fields.
    pub(crate) fn write_test_caltable(
        path: &Path,
        num_spws: usize,
        num_chans: usize,
        num_ants: usize,
    ) {
        let mut desc = TableDesc::new("MAIN", TableDescCreateMode::TDM_SCRATCH).unwrap();
        desc.add_scalar_column(GlueDataType::TpInt, "SPECTRAL_WINDOW_ID", None, false, false)
            .unwrap();
        desc.add_scalar_column(GlueDataType::TpInt, "ANTENNA1", None, false, false)
            .unwrap();
        desc.add_array_column(
            GlueDataType::TpComplex,
            "CPARAM",
            None,
            Some(&[num_chans as u64, 2]),
            false,
            false,
        )
        .unwrap();
        desc.add_array_column(
            GlueDataType::TpBool,
            "FLAG",
            None,
            Some(&[num_chans as u64, 2]),
            false,
            false,
        )
        .unwrap();
        let mut table =
            Table::new(path, desc, (num_spws * num_ants) as _, TableCreateMode::New).unwrap();
        for spw in 0..num_spws {
            for ant in 0..num_ants {
                let row = (spw * num_ants + ant) as u64;
                table
                    .put_cell("SPECTRAL_WINDOW_ID", row, &(spw as i32))
                    .unwrap();
                table.put_cell("ANTENNA1", row, &(ant as i32)).unwrap();
                let cparam = Array2::from_shape_fn((num_chans, 2), |(chan, pol)| {
                    Complex::new(1.0 + chan as f32 * 0.01, (spw * 100 + ant * 10 + pol) as f32)
                });
                let flag = Array2::from_shape_fn((num_chans, 2), |(chan, _)| {
                    chan < 2 || chan + 2 >= num_chans
                });
                table.put_cell("CPARAM", row, &cparam).unwrap();
                table.put_cell("FLAG", row, &flag).unwrap();
            }
        }

        let mut spw_desc =
            TableDesc::new("SPECTRAL_WINDOW", TableDescCreateMode::TDM_SCRATCH).unwrap();
        spw_desc
            .add_scalar_column(GlueDataType::TpString, "NAME", None, false, false)
            .unwrap();
        spw_desc
            .add_array_column(GlueDataType::TpDouble, "CHAN_FREQ", None, None, false, false)
            .unwrap();
        spw_desc
            .add_array_column(GlueDataType::TpDouble, "CHAN_WIDTH", None, None, false, false)
            .unwrap();
        let mut spw_table = Table::new(
            path.join("SPECTRAL_WINDOW"),
            spw_desc,
            num_spws as _,
            TableCreateMode::New,
        )
        .unwrap();
        for spw in 0..num_spws {
            let row = spw as u64;
            let start_hz = 1.0e9 + spw as f64 * 128e6;
            let freqs: Vec<f64> = (0..num_chans)
                .map(|chan| start_hz + chan as f64 * 1e6)
                .collect();
            spw_table
                .put_cell("NAME", row, &format!("EVLA_L#A0C0#{spw}"))
                .unwrap();
            spw_table.put_cell("CHAN_FREQ", row, &freqs).unwrap();
            spw_table
                .put_cell("CHAN_WIDTH", row, &vec![1e6; num_chans])
                .unwrap();
        }
        table
            .put_table_keyword("SPECTRAL_WINDOW", spw_table)
            .unwrap();

        let mut field_desc = TableDesc::new("FIELD", TableDescCreateMode::TDM_SCRATCH).unwrap();
        field_desc
            .add_scalar_column(GlueDataType::TpString, "NAME", None, false, false)
            .unwrap();
        let mut field_table =
            Table::new(path.join("FIELD"), field_desc, 2, TableCreateMode::New).unwrap();
        for (row, name) in ["0521+166=3C138", "M31_Field_1"].iter().enumerate() {
            field_table
                .put_cell("NAME", row as u64, &name.to_string())
                .unwrap();
        }
        table.put_table_keyword("FIELD", field_table).unwrap();
    }

    #[test]
    fn test_read_spw() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("test.bcal");
        write_test_caltable(&path, 2, 16, 3);

        let caltable = CalTable::open(&path).unwrap();
        let spw_gains = caltable.read_spw(1).unwrap();
        assert_eq!(spw_gains.gains.dim(), (2, 16, 3));
        assert_eq!(spw_gains.rows, vec![3, 4, 5]);
        assert_eq!(spw_gains.antennas, vec![0, 1, 2]);
        assert_eq!(spw_gains.gains[(1, 5, 2)], Complex::new(1.0 + 5.0 * 0.01, 121.0));
        assert!(spw_gains.flags[(0, 0, 0)]);
        assert!(!spw_gains.flags[(0, 2, 0)]);
        assert!(spw_gains.flags[(1, 15, 1)]);
        assert_eq!(spw_gains.chan_freqs_hz.len(), 16);
        assert_eq!(spw_gains.chan_freqs_hz[0], 1.128e9);
    }

    #[test]
    fn test_missing_spw() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("test.bcal");
        write_test_caltable(&path, 1, 8, 2);
        assert!(matches!(
            CalTable::open(&path).unwrap().read_spw(4),
            Err(IOError::SpwNotFound { spw: 4, .. })
        ));
    }

    #[test]
    fn test_read_spw_without_frequencies() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("test.bcal");
        write_test_caltable(&path, 2, 8, 2);

        // point a row at a window the SPECTRAL_WINDOW subtable doesn't have
        let mut table = Table::open(&path, TableOpenMode::ReadWrite).unwrap();
        table.put_cell("SPECTRAL_WINDOW_ID", 3, &7_i32).unwrap();
        drop(table);

        let caltable = CalTable::open(&path).unwrap();
        assert!(matches!(
            caltable.read_spw(7),
            Err(IOError::TableInconsistent { row: 7, .. })
        ));
        assert!(caltable.read_spw(0).is_ok());
    }

    #[test]
    fn test_write_spw() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("test.bcal");
        write_test_caltable(&path, 2, 8, 2);

        let caltable = CalTable::open(&path).unwrap();
        let mut spw_gains = caltable.read_spw(0).unwrap();
        spw_gains.gains[(0, 4, 1)] = Complex::new(-3.0, 7.0);
        spw_gains.flags[(1, 4, 0)] = true;
        caltable.write_spw(&spw_gains).unwrap();

        let reread = caltable.read_spw(0).unwrap();
        assert_eq!(reread.gains, spw_gains.gains);
        assert_eq!(reread.flags, spw_gains.flags);
        // the other window is untouched
        let other = caltable.read_spw(1).unwrap();
        assert_eq!(other.gains[(0, 4, 1)], Complex::new(1.0 + 4.0 * 0.01, 110.0));
    }

    #[test]
    fn test_backup_once() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("test.bcal");
        write_test_caltable(&path, 1, 8, 2);

        let caltable = CalTable::open(&path).unwrap();
        let backup = caltable.backup().unwrap().unwrap();
        assert_eq!(backup, tmp_dir.path().join("test.bcal.bak"));
        assert!(backup.join("table.dat").exists());
        assert!(backup.join("SPECTRAL_WINDOW").is_dir());

        // a second backup never clobbers the first
        assert_eq!(caltable.backup().unwrap(), None);

        let backed_up = CalTable::open(&backup).unwrap().read_spw(0).unwrap();
        assert_eq!(backed_up.gains.dim(), (2, 8, 2));
    }

    #[test]
    fn test_spectral_windows() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("test.bcal");
        write_test_caltable(&path, 3, 4, 1);
        let windows = CalTable::open(&path).unwrap().spectral_windows().unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].name, "EVLA_L#A0C0#2");
        assert_eq!(windows[2].baseband(), "A0C0");
        assert_eq!(windows[2].chan_width_hz, 1e6);
    }
}
