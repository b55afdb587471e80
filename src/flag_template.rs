// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Manual flagging commands for foreground absorption towards calibrators.

use std::{collections::HashSet, fs, io::Write, path::Path};

use log::{debug, info};

use crate::{config::LineConfig, io::error::IOError, spw::SpwRecord};

/// The reason recorded with every absorption flagging command.
pub const ABSORPTION_REASON: &str = "LINE_ABSORPTION";

/// Flagging commands for the absorption ranges of each calibrator field which
/// fall inside spectral window `spw`.
///
/// Calibrator velocity ranges are in the frame of the Milky Way, so they are
/// converted with the rest frequencies directly. Fields which don't match a
/// configured calibrator are skipped.
pub fn calibrator_flag_commands<S: AsRef<str>>(
    cal_fields: &[S],
    spw: &SpwRecord,
    config: &LineConfig,
) -> Vec<String> {
    let window = spw.freq_range_ghz();
    let mut cmds = vec![];
    for field in cal_fields {
        let field = field.as_ref();
        let (cal_name, cal_cfg) = match config.calibrator_for_field(field) {
            Some(cal) => cal,
            None => {
                debug!("no absorption ranges configured for field {field}");
                continue;
            }
        };
        for range in config
            .exclusion_intervals(&cal_cfg.line_ranges_kms)
            .iter()
            .filter_map(|excl| excl.intersection(&window))
        {
            debug!(
                "{} ({}): flagging {}GHz in spw {}",
                field, cal_name, range, spw.id
            );
            cmds.push(format!(
                "mode='manual' field='{}' spw='{}:{}GHz' reason='{}'",
                field, spw.id, range, ABSORPTION_REASON
            ));
        }
    }
    cmds
}

/// Append the commands in `cmds` to the flagging template at `path`, skipping
/// those which are already present. Returns the number of commands added.
///
/// # Errors
///
/// Will return [`IOError::StdIo`] if the template can't be read or written.
pub fn flagtemplate_add<P: AsRef<Path>, S: AsRef<str>>(
    path: P,
    cmds: &[S],
) -> Result<usize, IOError> {
    let path = path.as_ref();
    let existing = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };
    let mut present: HashSet<&str> = existing.lines().collect();

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut num_added = 0;
    for cmd in cmds {
        let cmd = cmd.as_ref();
        if present.insert(cmd) {
            write!(file, "\n{cmd}\n")?;
            num_added += 1;
        }
    }
    info!(
        "added {} of {} flagging commands to {}",
        num_added,
        cmds.len(),
        path.display()
    );
    Ok(num_added)
}
