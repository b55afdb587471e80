// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command Line Interface helpers for lband

use std::{
    collections::HashMap,
    ffi::OsString,
    fmt::{Debug, Display},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use clap::{arg, command, ErrorKind::ArgumentNotFound, ValueHint::FilePath};
use log::{debug, info, trace};
use prettytable::{cell, format as prettyformat, row, table};

use crate::{
    config::LineConfig,
    constants::DEFAULT_MIN_CONTINUUM_CHANWIDTH_KHZ,
    cont_report::{build_cont_ranges, write_cont_ranges},
    error::{CLIError::InvalidCommandLineArgument, LbandError, LbandError::DryRun},
    flag_template::{calibrator_flag_commands, flagtemplate_add},
    gap_interp::{interpolate_gaps, GapInterpContext},
    io::{caltable::CalTable, read_field_names, read_spectral_windows},
    spw::{spw_selection_string, Baseband, SpwRecord, SpwSetup},
};

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write many info-level log lines of how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (GIT_HEAD_REF, GIT_COMMIT_HASH) {
        (Some(hr), Some(hash)) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                hash,
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {}", hr)?;
        }
        _ => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {}", BUILT_TIME_UTC)?;
    writeln!(f, "         with compiler {}", RUSTC_VERSION)?;
    writeln!(f)?;
    Ok(())
}

/// Args for interpolating across the flagged gaps of a bandpass table.
#[derive(Debug)]
pub struct BandpassArgs {
    /// Path to the bandpass calibration table
    pub table: PathBuf,
    /// Spectral windows to interpolate
    pub spws: Vec<usize>,
    /// Interpolation parameters
    pub gap_ctx: GapInterpContext,
}

/// Args for writing a continuum range report.
#[derive(Debug)]
pub struct ContRangesArgs {
    /// Line configuration
    pub line_cfg: LineConfig,
    /// Spectral window setup
    pub spw_setup: SpwSetup,
    /// Target fields to report on
    pub fields: Vec<String>,
    /// Report path
    pub out: PathBuf,
    /// Replace an existing report
    pub overwrite: bool,
    /// Extend an existing report
    pub append: bool,
}

/// Args for adding calibrator absorption flags to a flagging template.
#[derive(Debug)]
pub struct FlagTemplateArgs {
    /// Line configuration
    pub line_cfg: LineConfig,
    /// The spectral window to flag
    pub spw: SpwRecord,
    /// Calibrator fields
    pub fields: Vec<String>,
    /// Flagging template path
    pub out: PathBuf,
}

/// Args for labelling the spectral windows of a measurement set.
#[derive(Debug)]
pub struct SpwSetupArgs {
    /// Path to the measurement set
    pub vis: PathBuf,
    /// The field used to identify the target
    pub field: String,
    /// The labelled spectral windows
    pub spw_setup: SpwSetup,
    /// Optional path to write the setup to
    pub out: Option<PathBuf>,
}

/// A parsed lband command.
#[derive(Debug)]
pub enum LbandContext {
    /// `lband interpolate-bandpass`
    InterpolateBandpass(BandpassArgs),
    /// `lband cont-ranges`
    ContRanges(ContRangesArgs),
    /// `lband flag-template`
    FlagTemplate(FlagTemplateArgs),
    /// `lband spw-setup`
    SpwSetup(SpwSetupArgs),
}

impl Display for LbandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        match self {
            Self::InterpolateBandpass(args) => {
                writeln!(f, "Bandpass table:       {}", args.table.display())?;
                writeln!(
                    f,
                    "Spectral windows:     {}",
                    spw_selection_string(&args.spws)
                )?;
                write!(f, "{}", args.gap_ctx)?;
            }
            Self::ContRanges(args) => {
                writeln!(f, "Target:               {}", args.spw_setup.target)?;
                writeln!(f, "Fields:               {}", args.fields.join(", "))?;
                writeln!(
                    f,
                    "Will {} continuum ranges for {} spectral windows to {}",
                    if args.append { "append" } else { "write" },
                    args.spw_setup.spws.len(),
                    args.out.display()
                )?;
            }
            Self::FlagTemplate(args) => {
                writeln!(
                    f,
                    "Spectral window:      {} ({}, {:.6}~{:.6}GHz)",
                    args.spw.id, args.spw.label, args.spw.freq_min_ghz, args.spw.freq_max_ghz
                )?;
                writeln!(f, "Calibrator fields:    {}", args.fields.join(", "))?;
                writeln!(f, "Flagging template:    {}", args.out.display())?;
            }
            Self::SpwSetup(args) => {
                writeln!(f, "Measurement set:      {}", args.vis.display())?;
                writeln!(
                    f,
                    "Target:               {} (field {})",
                    args.spw_setup.target, args.field
                )?;

                let mut spw_table = table!([
                    "id",
                    "label",
                    "name",
                    "baseband",
                    "nchan",
                    "width [kHz]",
                    "centre [MHz]"
                ]);
                spw_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
                for spw in &args.spw_setup.spws {
                    spw_table.add_row(row![r =>
                        spw.id,
                        spw.label,
                        spw.origname,
                        spw.baseband,
                        spw.nchan,
                        format!("{:.3}", spw.chanwidth_hz / 1e3),
                        format!("{:.3}", spw.centerfreq_khz / 1e3)
                    ]);
                }
                write!(f, "{}", spw_table)?;
            }
        }
        Ok(())
    }
}

fn value_or_default<T>(
    matches: &clap::ArgMatches,
    name: &str,
    default: T,
) -> Result<T, LbandError>
where
    T: std::str::FromStr,
    <T as std::str::FromStr>::Err: Display,
{
    match matches.value_of_t::<T>(name) {
        // filter any errors other than ArgumentNotFound
        Err(err) if err.kind() != ArgumentNotFound => Err(err.into()),
        Ok(value) => Ok(value),
        Err(_) => Ok(default),
    }
}

/// Fields of the measurement set at `vis` that match a configured target, in
/// FIELD table order.
fn target_fields(vis: &Path, line_cfg: &LineConfig) -> Result<Vec<String>, LbandError> {
    let field_names = read_field_names(vis)?;
    debug!("fields in {}: {:?}", vis.display(), field_names);
    Ok(field_names
        .into_iter()
        .filter(|name| line_cfg.target_for_field(name).is_ok())
        .collect())
}

fn no_target_field(vis: &Path, option: &str) -> LbandError {
    LbandError::CLIError(InvalidCommandLineArgument {
        option: option.into(),
        expected: format!(
            "a field name, since no field of {} matches a configured target",
            vis.display()
        ),
        received: "nothing".into(),
    })
}

impl LbandContext {
    fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, LbandError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let mut app = command!()
            .subcommand_required(true)
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Helpers for VLA L-band spectral line and continuum reductions.")
            .arg(arg!(--"dry-run" "Just print the summary and exit").global(true))
            .subcommand(
                clap::Command::new("interpolate-bandpass")
                    .about("Interpolate across flagged gaps in a bandpass table, in place")
                    .args(&[
                        arg!(table: <TABLE> "Bandpass calibration table")
                            .value_hint(FilePath)
                            .help_heading("INPUT"),
                        arg!(--spw <IDS>... "Spectral windows to interpolate")
                            .multiple_values(true)
                            .help_heading("INPUT")
                            .required(true),
                        arg!(--"window-fraction" <FRACTION> "Fraction of the channels in the sliding fit window [default: 0.125]")
                            .help_heading("FIT")
                            .required(false),
                        arg!(--"poly-order" <ORDER> "Order of the polynomial fit in each window [default: 2]")
                            .help_heading("FIT")
                            .required(false),
                        arg!(--"no-residual-noise" "Do not add resampled residual noise to the filled gaps")
                            .help_heading("FIT"),
                        arg!(--seed <SEED> "Seed for the residual noise [default: 0]")
                            .help_heading("FIT")
                            .required(false),
                        arg!(--"no-draw-progress" "do not show progress bars"),
                    ]),
            )
            .subcommand(
                clap::Command::new("cont-ranges")
                    .about("Write the line-free frequency ranges of each spectral window (cont.dat)")
                    .args(&[
                        arg!(--config <TOML> "Line, target and calibrator configuration")
                            .value_hint(FilePath)
                            .help_heading("INPUT"),
                        arg!(--"spw-setup" <TOML> "Spectral window setup written by spw-setup")
                            .value_hint(FilePath)
                            .help_heading("INPUT"),
                        arg!(--field <NAMES>... "Target fields [default: every target field of --vis]")
                            .multiple_values(true)
                            .required(false)
                            .help_heading("INPUT"),
                        arg!(--vis <MS> "Measurement set to take the target fields from")
                            .value_hint(FilePath)
                            .required_unless_present("field")
                            .help_heading("INPUT"),
                        arg!(-o --out <PATH> "Path for the continuum range report")
                            .default_value("cont.dat")
                            .required(false)
                            .help_heading("OUTPUT"),
                        arg!(--overwrite "Replace an existing report").help_heading("OUTPUT"),
                        arg!(--append "Extend an existing report")
                            .conflicts_with("overwrite")
                            .help_heading("OUTPUT"),
                    ]),
            )
            .subcommand(
                clap::Command::new("flag-template")
                    .about("Add calibrator absorption flagging commands to a flagging template")
                    .args(&[
                        arg!(--config <TOML> "Line, target and calibrator configuration")
                            .value_hint(FilePath)
                            .help_heading("INPUT"),
                        arg!(--"spw-setup" <TOML> "Spectral window setup written by spw-setup")
                            .value_hint(FilePath)
                            .help_heading("INPUT"),
                        arg!(--spw <ID> "Spectral window to flag [default: the HI window]")
                            .required(false)
                            .help_heading("INPUT"),
                        arg!(--field <NAMES>... "Calibrator fields")
                            .multiple_values(true)
                            .help_heading("INPUT"),
                        arg!(-o --out <PATH> "Path for the flagging template")
                            .help_heading("OUTPUT"),
                    ]),
            )
            .subcommand(
                clap::Command::new("spw-setup")
                    .about("Label the spectral windows of a measurement set")
                    .args(&[
                        arg!(vis: <MS> "Measurement set")
                            .value_hint(FilePath)
                            .help_heading("INPUT"),
                        arg!(--config <TOML> "Line, target and calibrator configuration")
                            .value_hint(FilePath)
                            .help_heading("INPUT"),
                        arg!(--field <NAME> "Field used to identify the target [default: the first target field]")
                            .required(false)
                            .help_heading("INPUT"),
                        arg!(--"min-continuum-chanwidth" <KHZ> "Narrowest channel width of a continuum window [default: 50]")
                            .required(false)
                            .help_heading("INPUT"),
                        arg!(-o --out <PATH> "Path for the spectral window setup")
                            .required(false)
                            .help_heading("OUTPUT"),
                    ]),
            );
        let matches = app.try_get_matches_from_mut(args)?;
        Ok(matches)
    }

    fn parse_bandpass_matches(matches: &clap::ArgMatches) -> Result<BandpassArgs, LbandError> {
        let table: PathBuf = match matches.value_of_t("table") {
            Ok(path) => path,
            _ => unreachable!("<TABLE> is required, enforced by clap"),
        };
        let spws: Vec<usize> = matches.values_of_t("spw")?;
        let defaults = GapInterpContext::default();

        let window_fraction =
            value_or_default(matches, "window-fraction", defaults.window_fraction)?;
        if !(window_fraction > 0.0 && window_fraction < 1.0) {
            return Err(LbandError::CLIError(InvalidCommandLineArgument {
                option: "--window-fraction <FRACTION>".into(),
                expected: "a fraction strictly between 0 and 1".into(),
                received: format!("{}", window_fraction),
            }));
        }

        let gap_ctx = GapInterpContext {
            window_fraction,
            poly_order: value_or_default(matches, "poly-order", defaults.poly_order)?,
            add_residual_noise: !matches.is_present("no-residual-noise"),
            seed: value_or_default(matches, "seed", defaults.seed)?,
            draw_progress: !matches.is_present("no-draw-progress"),
        };
        Ok(BandpassArgs {
            table,
            spws,
            gap_ctx,
        })
    }

    fn parse_cont_ranges_matches(
        matches: &clap::ArgMatches,
    ) -> Result<ContRangesArgs, LbandError> {
        let line_cfg = LineConfig::from_path(matches.value_of_t::<PathBuf>("config")?)?;
        let spw_setup = SpwSetup::from_path(matches.value_of_t::<PathBuf>("spw-setup")?)?;
        let fields = match matches.values_of_t::<String>("field") {
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            Ok(fields) => fields,
            Err(_) => {
                let vis: PathBuf = matches.value_of_t("vis")?;
                let fields = target_fields(&vis, &line_cfg)?;
                if fields.is_empty() {
                    return Err(no_target_field(&vis, "--field <NAMES>..."));
                }
                fields
            }
        };
        Ok(ContRangesArgs {
            line_cfg,
            spw_setup,
            fields,
            out: matches.value_of_t("out")?,
            overwrite: matches.is_present("overwrite"),
            append: matches.is_present("append"),
        })
    }

    fn parse_flag_template_matches(
        matches: &clap::ArgMatches,
    ) -> Result<FlagTemplateArgs, LbandError> {
        let line_cfg = LineConfig::from_path(matches.value_of_t::<PathBuf>("config")?)?;
        let setup_path: PathBuf = matches.value_of_t("spw-setup")?;
        let spw_setup = SpwSetup::from_path(&setup_path)?;
        let spw = match matches.value_of_t::<usize>("spw") {
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            Ok(id) => spw_setup.get(id).ok_or_else(|| {
                LbandError::CLIError(InvalidCommandLineArgument {
                    option: "--spw <ID>".into(),
                    expected: format!("a spectral window in {}", setup_path.display()),
                    received: format!("{}", id),
                })
            })?,
            Err(_) => spw_setup.find_spw_by_label("HI").ok_or_else(|| {
                LbandError::CLIError(InvalidCommandLineArgument {
                    option: "--spw <ID>".into(),
                    expected: format!(
                        "a spectral window id, since {} has no HI window",
                        setup_path.display()
                    ),
                    received: "nothing".into(),
                })
            })?,
        };
        Ok(FlagTemplateArgs {
            line_cfg,
            spw: spw.clone(),
            fields: matches.values_of_t("field")?,
            out: matches.value_of_t("out")?,
        })
    }

    fn parse_spw_setup_matches(matches: &clap::ArgMatches) -> Result<SpwSetupArgs, LbandError> {
        let vis: PathBuf = match matches.value_of_t("vis") {
            Ok(path) => path,
            _ => unreachable!("<MS> is required, enforced by clap"),
        };
        let line_cfg = LineConfig::from_path(matches.value_of_t::<PathBuf>("config")?)?;
        let min_continuum_chanwidth_khz = value_or_default(
            matches,
            "min-continuum-chanwidth",
            DEFAULT_MIN_CONTINUUM_CHANWIDTH_KHZ,
        )?;

        let field = match matches.value_of_t::<String>("field") {
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            Ok(field) => field,
            Err(_) => target_fields(&vis, &line_cfg)?
                .into_iter()
                .next()
                .ok_or_else(|| no_target_field(&vis, "--field <NAME>"))?,
        };

        let windows = read_spectral_windows(&vis)?;
        let spw_setup =
            SpwSetup::from_windows(&windows, &field, &line_cfg, min_continuum_chanwidth_khz)?;
        let out = match matches.value_of_t::<PathBuf>("out") {
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            Ok(path) => Some(path),
            Err(_) => None,
        };
        Ok(SpwSetupArgs {
            vis,
            field,
            spw_setup,
            out,
        })
    }

    /// Parse an iterator of arguments, `args` into a `LbandContext`.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - [`LbandError::ClapError`] if clap cannot parse `args`
    /// - [`LbandError::ConfigError`] if a config or setup file can't be loaded
    /// - [`LbandError::IOError`] if a measurement set can't be read
    /// - [`LbandError::CLIError`] if the arguments are invalid.
    /// - [`LbandError::DryRun`] if `--dry-run` was given.
    pub fn from_args<I, T>(args: I) -> Result<Self, LbandError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let (result, sub_matches) = match matches.subcommand() {
            Some(("interpolate-bandpass", sub_matches)) => (
                Self::InterpolateBandpass(Self::parse_bandpass_matches(sub_matches)?),
                sub_matches,
            ),
            Some(("cont-ranges", sub_matches)) => (
                Self::ContRanges(Self::parse_cont_ranges_matches(sub_matches)?),
                sub_matches,
            ),
            Some(("flag-template", sub_matches)) => (
                Self::FlagTemplate(Self::parse_flag_template_matches(sub_matches)?),
                sub_matches,
            ),
            Some(("spw-setup", sub_matches)) => (
                Self::SpwSetup(Self::parse_spw_setup_matches(sub_matches)?),
                sub_matches,
            ),
            _ => unreachable!("a known subcommand is required, enforced by clap"),
        };

        info!("{}", &result);

        if sub_matches.is_present("dry-run") {
            return Err(DryRun {});
        }

        Ok(result)
    }

    /// Run the parsed command, returning the duration of each stage.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - [`LbandError::IOError`] if a table or report can't be read or written
    /// - [`LbandError::GapInterpError`] if the interpolation parameters don't
    ///   suit a spectral window
    /// - [`LbandError::ConfigError`] if a field doesn't match the configuration
    pub fn run(self) -> Result<HashMap<String, Duration>, LbandError> {
        let mut durations = HashMap::<String, Duration>::new();
        match self {
            Self::InterpolateBandpass(BandpassArgs {
                table,
                spws,
                gap_ctx,
            }) => {
                let caltable = CalTable::open(&table)?;

                // read everything first, a missing spectral window writes nothing.
                let start = Instant::now();
                let mut spw_gains = spws
                    .iter()
                    .map(|&spw| caltable.read_spw(spw))
                    .collect::<Result<Vec<_>, _>>()?;
                durations.insert("read".into(), start.elapsed());

                let start = Instant::now();
                for gains in spw_gains.iter_mut() {
                    info!("interpolating spectral window {}", gains.spw);
                    interpolate_gaps(gains.gains.view_mut(), gains.flags.view_mut(), &gap_ctx)?;
                }
                durations.insert("interpolate".into(), start.elapsed());

                let start = Instant::now();
                if let Some(backup) = caltable.backup()? {
                    info!("original solutions are in {}", backup.display());
                }
                durations.insert("backup".into(), start.elapsed());

                let start = Instant::now();
                for gains in &spw_gains {
                    caltable.write_spw(gains)?;
                }
                durations.insert("write".into(), start.elapsed());
            }
            Self::ContRanges(ContRangesArgs {
                line_cfg,
                spw_setup,
                fields,
                out,
                overwrite,
                append,
            }) => {
                let cont_ranges = build_cont_ranges(&fields, &spw_setup, &line_cfg)?;
                write_cont_ranges(&out, &cont_ranges, overwrite, append)?;
            }
            Self::FlagTemplate(FlagTemplateArgs {
                line_cfg,
                spw,
                fields,
                out,
            }) => {
                let cmds = calibrator_flag_commands(&fields, &spw, &line_cfg);
                flagtemplate_add(&out, &cmds)?;
            }
            Self::SpwSetup(SpwSetupArgs {
                spw_setup, out, ..
            }) => {
                for baseband in [Baseband::A0C0, Baseband::B0D0, Baseband::Both] {
                    info!(
                        "continuum spws ({:?}): {}",
                        baseband,
                        spw_selection_string(&spw_setup.continuum_spws(baseband))
                    );
                }
                info!(
                    "line spws: {}",
                    spw_selection_string(&spw_setup.line_spws(false, false))
                );
                info!(
                    "line spws with RRLs: {}",
                    spw_selection_string(&spw_setup.line_spws(true, false))
                );
                if let Some(out) = out {
                    spw_setup.write(&out)?;
                    info!("wrote spectral window setup to {}", out.display());
                }
            }
        }
        Ok(durations)
    }
}
