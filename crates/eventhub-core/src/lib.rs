pub mod aggregate;
pub mod calendar;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod event;
pub mod filter;
pub mod notify;
pub mod render;
pub mod rsvp;
pub mod session;

use std::ffi::OsString;
use std::io::{
  self,
  Write
};

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  run_with(
    raw_args,
    &mut io::stdout(),
    &mut io::stderr()
  )
}

/// [`run`] with command output sent to
/// `out` and notifications and prompts
/// sent to `err`. Logs still go to
/// stderr.
#[tracing::instrument(skip_all)]
pub fn run_with(
  raw_args: Vec<OsString>,
  out: &mut dyn Write,
  err: &mut dyn Write
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting eventhub CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let cfg = load_config(
    &cli,
    pre.rc_overrides
  )?;

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    session::SessionStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open session store \
         at {}",
        data_dir.display()
      )
    })?;

  let renderer =
    render::Renderer::new(&cfg)?;
  let notifier = notify::Notifier::new(
    cfg.get_bool("color").unwrap_or(true)
  );
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    &store, &cfg, &renderer, &notifier,
    inv, out, err
  )?;

  info!("done");
  Ok(())
}

/// rc file first, then positional
/// `rc.*` tokens, then `--rc` flags.
fn load_config(
  cli: &cli::GlobalCli,
  positional: Vec<(String, String)>
) -> anyhow::Result<config::Config> {
  let mut cfg = config::Config::load(
    cli.eventhubrc.as_deref()
  )
  .context("failed to load eventhubrc")?;

  let flags = cli
    .rc_overrides
    .iter()
    .map(|setting| {
      (
        setting.key.clone(),
        setting.value.clone()
      )
    });
  cfg.apply_overrides(
    positional.into_iter().chain(flags)
  );

  if let Some(path) =
    cfg.loaded_files.first()
  {
    debug!(rc = %path.display(), files = cfg.loaded_files.len(), "configuration loaded");
  }
  Ok(cfg)
}
