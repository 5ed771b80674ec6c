// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::config::PackageConfig,
    clap::{Arg, ArgMatches, Command},
    debpkg::{compression::DebCompression, error::DebpkgError, template::HandlebarsRenderer},
    log::{info, LevelFilter},
    std::{path::Path, str::FromStr},
    thiserror::Error,
};

const ABOUT: &str = "\
Build a Debian binary package (.deb) from a YAML configuration.

The package is assembled entirely in-process. No ar, tar, or dpkg-deb
executables are required.

# Templates

The templates directory holds Handlebars templates with a `.hbs` extension.
Templates are named by their path relative to the directory without the
extension.

debian/control (required)
   Rendered into the `control` file. Installed-Size is computed and replaces
   any value from the template.

debian/preinst, debian/postinst, debian/prerm, debian/postrm (optional)
   Maintainer scripts. Installed with mode 0755.

debian/triggers (optional)
   dpkg triggers declarations.

Any other template can be referenced by `config_file.template` or by a
`files` entry with a `template` key.

# Reproducible Builds

Archive entries carry a fixed modification time taken from, in order of
precedence, --mtime, the SOURCE_DATE_EPOCH environment variable, and
`build.mtime` in the configuration. If none is set, the current time is
used. Packages using generated certificates differ between builds because
keys are random.
";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Debpkg(#[from] DebpkgError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("unable to read configuration file {0}: {1}")]
    ConfigRead(String, std::io::Error),

    #[error("invalid configuration value for {0}: {1}")]
    ConfigValue(String, String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

fn command() -> Command<'static> {
    Command::new("debpkg")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Build Debian binary packages")
        .long_about(ABOUT)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .takes_value(true)
                .default_value("config/package.yaml")
                .allow_invalid_utf8(true)
                .help("Path to package configuration file"),
        )
        .arg(
            Arg::new("templates")
                .short('t')
                .long("templates")
                .takes_value(true)
                .default_value("templates")
                .allow_invalid_utf8(true)
                .help("Path to templates directory"),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output-dir")
                .takes_value(true)
                .default_value(".")
                .allow_invalid_utf8(true)
                .help("Directory to write the .deb to"),
        )
        .arg(
            Arg::new("mtime")
                .long("mtime")
                .takes_value(true)
                .help("Modification time of archive entries, in seconds since the UNIX epoch"),
        )
        .arg(
            Arg::new("compression")
                .long("compression")
                .takes_value(true)
                .possible_values(["none", "gzip", "xz", "zstd"])
                .help("Compression of control.tar and data.tar"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
}

fn init_logging(matches: &ArgMatches) {
    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();
}

/// Resolve the archive modification time.
fn resolve_mtime(
    arg: Option<&str>,
    source_date_epoch: Option<String>,
    config: Option<u64>,
) -> Result<Option<u64>> {
    if let Some(value) = arg {
        return u64::from_str(value)
            .map(Some)
            .map_err(|e| ToolError::ConfigValue("--mtime".to_string(), e.to_string()));
    }

    if let Some(value) = source_date_epoch {
        return u64::from_str(value.trim())
            .map(Some)
            .map_err(|e| ToolError::ConfigValue("SOURCE_DATE_EPOCH".to_string(), e.to_string()));
    }

    Ok(config)
}

pub fn run_cli() -> Result<()> {
    let matches = command().get_matches();

    init_logging(&matches);

    command_build(&matches)
}

fn command_build(args: &ArgMatches) -> Result<()> {
    let config_path = Path::new(
        args.value_of_os("config")
            .expect("config argument has default value"),
    );
    let templates = Path::new(
        args.value_of_os("templates")
            .expect("templates argument has default value"),
    );
    let output_dir = Path::new(
        args.value_of_os("output_dir")
            .expect("output_dir argument has default value"),
    );

    info!("loading configuration from {}", config_path.display());
    let config = PackageConfig::from_path(config_path)?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let mut builder = config.to_builder(base_dir)?;

    let mtime = resolve_mtime(
        args.value_of("mtime"),
        std::env::var("SOURCE_DATE_EPOCH").ok(),
        config.build.mtime,
    )?;
    builder = builder.set_mtime(mtime);

    if let Some(compression) = args.value_of("compression") {
        builder = builder.set_compression(DebCompression::from_str(compression)?);
    }

    info!("loading templates from {}", templates.display());
    let renderer = HandlebarsRenderer::from_directory(templates)?;

    let summary = builder.write_to_directory(output_dir, &renderer)?;

    let filename = summary
        .path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    println!("{}", summary);
    println!();
    println!("Install with:");
    println!("  sudo dpkg -i {}", filename);
    println!("  # or");
    println!("  sudo apt install ./{}", filename);

    Ok(())
}
