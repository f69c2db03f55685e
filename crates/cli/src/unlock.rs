//! unlock - remove password protection from PDF files
//!
//! Single-file mode writes `<stem>_unlocked.pdf` next to the input unless
//! `-o` is given. With `--batch` the input is a directory and every PDF in
//! it is mirrored into `<dir>_unlocked`.

use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, ArgGroup, Parser};
use pdfunlock_core::api::{
    UnlockOptions, UnlockerBuilder, check_encryption, check_encryption_file,
};
use pdfunlock_core::batch::{BatchOptions, FileOutcome, enumerate_documents, run_batch};
use pdfunlock_core::credentials::{
    CommonPasswords, CredentialProvider, Credentials, PasswordListFile, StaticPassword,
};
use pdfunlock_core::search::SearchStrategy;
use tracing::debug;

/// Exit status for usage and setup errors, matching clap's own.
const EXIT_USAGE: u8 = 2;

/// Remove password protection from PDF files.
#[derive(Parser, Debug)]
#[command(name = "unlock")]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("credential").args(["password", "password_list", "try_common"])
))]
struct Args {
    /// PDF file, or a directory with --batch
    input: PathBuf,

    /// Output file, or output directory with --batch
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Password to try (user or owner)
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// File with one candidate password per line
    #[arg(long = "password-list", value_name = "FILE")]
    password_list: Option<PathBuf>,

    /// Try a built-in list of common passwords
    #[arg(long = "try-common", action = ArgAction::SetTrue)]
    try_common: bool,

    /// Treat the input as a directory of PDF files
    #[arg(long, action = ArgAction::SetTrue)]
    batch: bool,

    /// Descend into subdirectories in batch mode
    #[arg(short = 'r', long, action = ArgAction::SetTrue, requires = "batch")]
    recursive: bool,

    /// Only report whether the input is encrypted
    #[arg(long = "check-only", action = ArgAction::SetTrue)]
    check_only: bool,

    /// Worker threads for batch mode and password search
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    threads: Option<u16>,

    /// Give up on a file after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

impl Args {
    fn threads(&self) -> Option<usize> {
        self.threads.map(usize::from)
    }

    fn unlock_options(&self) -> UnlockOptions {
        UnlockOptions {
            timeout: self.timeout.map(Duration::from_secs),
            search: SearchStrategy::Sequential,
        }
    }
}

/// Reads a single password from stdin after prompting on stderr.
struct StdinPrompt;

impl CredentialProvider for StdinPrompt {
    fn provide_password(&self) -> pdfunlock_core::Result<Option<Vec<u8>>> {
        let mut stderr = io::stderr();
        write!(stderr, "Password: ")?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let password = line.trim_end_matches(['\r', '\n']);
        Ok(Some(password.as_bytes().to_vec()))
    }

    fn provide_password_list(&self) -> pdfunlock_core::Result<Vec<Vec<u8>>> {
        Ok(self.provide_password()?.into_iter().collect())
    }
}

fn credential_provider(args: &Args) -> Box<dyn CredentialProvider> {
    if let Some(password) = &args.password {
        Box::new(StaticPassword::new(password))
    } else if let Some(path) = &args.password_list {
        Box::new(PasswordListFile::new(path))
    } else if args.try_common {
        Box::new(CommonPasswords)
    } else {
        Box::new(StdinPrompt)
    }
}

fn load_credentials(args: &Args) -> Result<Credentials> {
    let provider = credential_provider(args);
    let credentials =
        Credentials::from_provider(provider.as_ref()).context("failed to read credentials")?;
    if let Credentials::Candidates(list) = &credentials
        && list.is_empty()
    {
        bail!("password list is empty");
    }
    debug!(?credentials, "credentials resolved");
    Ok(credentials)
}

/// `<stem>_unlocked.pdf` beside `input`.
fn default_file_output(input: &Path) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push("_unlocked.pdf");
    input.with_file_name(name)
}

/// `<dir>_unlocked` beside `input`.
fn default_batch_output(input: &Path) -> Result<PathBuf> {
    let absolute = input
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", input.display()))?;
    let mut name = absolute
        .file_name()
        .context("input directory has no name")?
        .to_os_string();
    name.push("_unlocked");
    Ok(absolute.with_file_name(name))
}

fn run_single(args: &Args) -> Result<ExitCode> {
    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let status = match check_encryption(&data) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("{}: {e}", args.input.display());
            return Ok(ExitCode::FAILURE);
        }
    };
    if args.check_only || !status.is_encrypted() {
        println!("{}: {status}", args.input.display());
        return Ok(ExitCode::SUCCESS);
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_file_output(&args.input));

    let builder = UnlockerBuilder::new().options(args.unlock_options());
    let unlocker = match load_credentials(args)? {
        Credentials::Password(password) => builder.password(password),
        Credentials::Candidates(list) => builder
            .candidates(list)
            .parallel_search(args.threads()),
    }
    .build();

    let outcome = match unlocker.unlock_bytes(&data) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}: {e}", args.input.display());
            return Ok(ExitCode::FAILURE);
        }
    };
    if let Err(e) = write_output(&output, &outcome.data) {
        eprintln!("error: {e:#}");
        return Ok(ExitCode::FAILURE);
    }
    match outcome.password_index {
        Some(index) => println!(
            "unlocked {} -> {} (candidate #{})",
            args.input.display(),
            output.display(),
            index + 1
        ),
        None => println!("unlocked {} -> {}", args.input.display(), output.display()),
    }
    Ok(ExitCode::SUCCESS)
}

fn write_output(output: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(output, data).with_context(|| format!("failed to write {}", output.display()))
}

fn run_check_batch(args: &Args) -> Result<ExitCode> {
    let files = enumerate_documents(&args.input, args.recursive)
        .with_context(|| format!("failed to list {}", args.input.display()))?;
    for relative in files {
        match check_encryption_file(args.input.join(&relative)) {
            Ok(status) => println!("{}: {status}", relative.display()),
            Err(e) => println!("{}: error: {e}", relative.display()),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_batch_mode(args: &Args) -> Result<ExitCode> {
    if !args.input.is_dir() {
        bail!("{} is not a directory", args.input.display());
    }
    if args.check_only {
        return run_check_batch(args);
    }

    let output = match &args.output {
        Some(output) => output.clone(),
        None => default_batch_output(&args.input)?,
    };
    let credentials = load_credentials(args)?;
    let options = BatchOptions {
        recursive: args.recursive,
        threads: args.threads(),
        unlock: args.unlock_options(),
    };

    let result = run_batch(&args.input, &output, &credentials, &options)
        .with_context(|| format!("batch over {} failed", args.input.display()))?;
    for (relative, outcome) in &result.outcomes {
        if let FileOutcome::Failed { message, .. } = outcome {
            eprintln!("{}: {message}", relative.display());
        }
    }
    println!("processed {}, failed {}", result.processed, result.failed);
    Ok(ExitCode::SUCCESS)
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    let result = if args.batch {
        run_batch_mode(&args)
    } else {
        run_single(&args)
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}
