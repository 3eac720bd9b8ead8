use std::fs;
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{CommandFactory, Parser};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jgi_query::app::{App, ProgressSink, RunSummary, load_manifest};
use jgi_query::catalog::{CategoryMode, human_size, total_size};
use jgi_query::config::{ConfigLoader, UserConfig};
use jgi_query::domain::{DecompressChoice, Endpoints, Organism};
use jgi_query::error::JgiError;
use jgi_query::output::{
    ConsoleSink, JsonOutput, SELECTION_PREAMBLE, SYNTAX_HELP, USAGE_EXAMPLE, print_catalog,
    print_summary,
};
use jgi_query::prompt::Prompter;
use jgi_query::selection;
use jgi_query::session::{ManifestSource, Session};
use jgi_query::transfer::{CurlTransport, DEFAULT_RETRIES};

#[derive(Parser)]
#[command(name = "jgi-query")]
#[command(
    about = "List and retrieve files from the JGI genome portal for a given organism, using curl"
)]
#[command(version)]
struct Cli {
    /// JGI organism abbreviation (e.g. Nemve1) or the URL of its portal "Info" page
    organism: Option<String>,

    /// Use a local manifest instead of fetching one; defaults to
    /// <organism>_jgi_index.xml in the output directory
    #[arg(short = 'x', long, num_args = 0..=1, default_missing_value = "", value_name = "PATH")]
    xml: Option<String>,

    /// Enter credentials and rewrite the config file
    #[arg(short, long)]
    configure: bool,

    /// Print the selection syntax and exit
    #[arg(short, long)]
    syntax_help: bool,

    /// Only list files from the categories named in the config file
    #[arg(short, long)]
    filter_files: bool,

    /// Print a usage example and exit
    #[arg(short, long)]
    usage: bool,

    /// Config file to use instead of the per-user default
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// Directory for downloads and working files
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    output_dir: Utf8PathBuf,

    /// Extra attempts for a failed download
    #[arg(short, long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Selection to download without prompting, e.g. '1:1,2;2:1-3'
    #[arg(long, value_name = "EXPR")]
    select: Option<String>,

    /// Skip the download size confirmation
    #[arg(short, long)]
    yes: bool,

    /// Decompress downloads without asking
    #[arg(long, value_enum)]
    decompress: Option<DecompressChoice>,

    /// Keep the manifest and cookie files after the run
    #[arg(long)]
    keep_temp: bool,

    /// Print the catalog (or, with --select, the run summary) as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if std::env::args_os().len() <= 1 {
        let _ = Cli::command().print_help();
        return ExitCode::from(1);
    }
    if let Err(report) = run() {
        if let Some(error) = report.downcast_ref::<JgiError>() {
            if matches!(error, JgiError::Aborted) {
                eprintln!("Exiting.");
                return ExitCode::SUCCESS;
            }
            eprintln!("{report:?}");
            return ExitCode::from(map_exit_code(error));
        }
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &JgiError) -> u8 {
    match error {
        JgiError::ConfigRead(_)
        | JgiError::ConfigIncomplete(_)
        | JgiError::ConfigWrite(_)
        | JgiError::ConfigDir => 2,
        JgiError::Connection(_) | JgiError::InvalidCredentials | JgiError::MissingTool(_) => 3,
        JgiError::Aborted => 0,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.syntax_help {
        print!("{SYNTAX_HELP}");
        return Ok(());
    }
    if cli.usage {
        print!("{USAGE_EXAMPLE}");
        return Ok(());
    }

    let mut prompter = Prompter::stdio();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ConfigLoader::default_path()?,
    };
    let config = if cli.configure || !config_path.exists() {
        let (user, password) = prompter.credentials()?;
        let config = UserConfig::new(user, password);
        ConfigLoader::save(&config_path, &config)?;
        info!(path = %config_path, "configuration saved");
        config
    } else {
        ConfigLoader::load(&config_path)?
    };

    let organism = match (&cli.organism, cli.xml.as_deref()) {
        (Some(value), _) => value.parse::<Organism>()?,
        (None, _) if cli.configure => {
            println!("Configuration complete; jgi-query may now be used to query JGI.");
            return Ok(());
        }
        (None, Some(path)) if !path.is_empty() => organism_from_manifest(Utf8Path::new(path))?,
        _ => return Err(JgiError::MissingOrganism.into()),
    };

    let source = ManifestSource::from_xml_flag(cli.xml.as_deref(), &organism, &cli.output_dir);

    fs::create_dir_all(cli.output_dir.as_std_path())
        .map_err(|err| JgiError::Filesystem(format!("{}: {err}", cli.output_dir)))?;

    let mode = if cli.filter_files {
        CategoryMode::Named(config.categories.clone())
    } else {
        CategoryMode::All
    };
    let mut session = Session::new(
        config,
        organism,
        Endpoints::default(),
        cli.output_dir.clone(),
        source,
    );
    let app = App::new(CurlTransport::new());
    let sink: &dyn ProgressSink = if cli.json { &JsonOutput } else { &ConsoleSink };

    let result = query(&cli, &app, &mut session, &mut prompter, &mode, sink);
    session.cleanup();
    result
}

fn query(
    cli: &Cli,
    app: &App<CurlTransport>,
    session: &mut Session,
    prompter: &mut Prompter<std::io::StdinLock<'static>, std::io::Stdout>,
    mode: &CategoryMode,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    let manifest = app.acquire_manifest(session, sink)?;
    let catalog = app.build_catalog(session, &manifest, mode)?;

    let interactive = cli.select.is_none();
    if cli.json && interactive {
        JsonOutput::print_catalog(&catalog, session.organism.as_str()).into_diagnostic()?;
        return Ok(());
    }

    let selected = match &cli.select {
        Some(expr) => app.resolve(&catalog, &selection::parse(expr)?)?,
        None => {
            println!("{SELECTION_PREAMBLE}");
            print_catalog(&catalog, session.organism.as_str()).into_diagnostic()?;
            prompter.select(&catalog)?
        }
    };

    if interactive && !cli.yes {
        let total = human_size(total_size(selected.iter().copied()));
        let question = format!(
            "Total download size for {} files: {total}. Continue? (y/n): ",
            selected.len()
        );
        if !prompter.confirm(&question)? {
            return Err(JgiError::Aborted.into());
        }
    }

    let transfer = app.download(session, &selected, cli.retries, sink)?;

    let decompress = if transfer.downloaded.is_empty() {
        None
    } else {
        let choice = match cli.decompress {
            Some(choice) => choice,
            None if interactive => prompter.decompress_choice()?,
            None => DecompressChoice::No,
        };
        match choice {
            DecompressChoice::No => None,
            choice => Some(app.decompress(&transfer, choice.keep_original(), sink)),
        }
    };

    if cli.keep_temp {
        session.keep_working_files();
    } else if interactive {
        let names: Vec<String> = session
            .working_files()
            .removable()
            .iter()
            .map(|path| path.to_string())
            .collect();
        let question = format!("Keep temporary files ('{}')? (y/n): ", names.join("' and '"));
        if prompter.confirm(&question)? {
            session.keep_working_files();
        }
    }

    let summary = RunSummary::new(session, &selected, &transfer, decompress.as_ref());
    if cli.json {
        JsonOutput::print_summary(&summary).into_diagnostic()?;
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Reads the organism from a saved manifest's `organismDownloads` element.
fn organism_from_manifest(path: &Utf8Path) -> Result<Organism, JgiError> {
    let manifest = load_manifest(path, path.as_str(), true)?;
    manifest
        .organism_name()
        .ok_or(JgiError::MissingOrganism)?
        .parse()
}
