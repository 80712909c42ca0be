// VALD electronic mail service: turns a mailbox of line-list requests into
// numbered request files and the csh scripts that run the selection
// helpers, and reads back the compressed line lists those helpers consume.
// http://vald.astro.uu.se - the database this service fronts.

use anyhow::Context as _;
use std::{io, io::Write as _, path};

pub mod counter;
pub mod job;
pub mod linelist;
pub mod mailbox;
pub mod registry;
pub mod request;
pub mod text;

#[derive(Clone, Debug, PartialEq, clap::ValueEnum)]
pub enum Mode {
  /// Process one mailbox: split, authenticate, emit the process script.
  Ingest,
  /// Parse one request file and emit its job script.
  Request,
  /// Print every transition of a compressed line list in a wavelength
  /// window.
  Query,
}

#[derive(clap::Args)]
#[group(skip)]
pub struct Arguments {
  #[arg(help = "Execution mode: ingest | request | query", hide_possible_values(true))]
  pub mode: Mode,

  #[arg(long = "home", help = "Server home directory", default_value_t = String::from("."))]
  pub home: String,
  #[arg(
    long = "spool",
    help = "Directory where request, job and result files are produced",
    default_value_t = String::from(".")
  )]
  pub spool: String,
  #[arg(
    long = "site",
    help = "Local site name, used by the statistics log",
    default_value_t = String::from("vald")
  )]
  pub site: String,
  #[arg(
    long = "ftp-url",
    help = "URL under which FTP deliveries are announced",
    default_value_t = String::from("http://vald.local/ftp")
  )]
  pub ftp_url: String,

  #[arg(long = "mailbox", help = "Incoming mailbox (ingest mode)")]
  pub mailbox: Option<String>,

  #[arg(long = "request", help = "Request file to parse (request mode)")]
  pub request: Option<String>,
  #[arg(
    long = "client",
    help = "Registry name of the requester, possibly _local-suffixed (request mode)"
  )]
  pub client: Option<String>,

  #[arg(long = "data", help = "Compressed line list (query mode)")]
  pub data: Option<String>,
  #[arg(long = "descriptor", help = "Record directory of the line list (query mode)")]
  pub descriptor: Option<String>,
  #[arg(long = "wavelength-start", help = "Window start (query mode)")]
  pub wavelength_start: Option<f64>,
  #[arg(long = "wavelength-stop", help = "Window stop (query mode)")]
  pub wavelength_stop: Option<f64>,
  #[arg(
    long = "limit",
    help = "At most this many transitions (query mode)",
    default_value_t = request::MAX_LINES_PER_REQUEST as usize
  )]
  pub limit: usize,
}

/// Builder for every path under the server home directory.
#[derive(Clone, Debug)]
pub struct Home {
  root: path::PathBuf,
}

impl Home {
  pub fn new(root: &path::Path) -> Self {
    Self {
      root: root.to_path_buf(),
    }
  }

  pub fn clients_register(&self) -> path::PathBuf {
    self.root.join("clients.register")
  }

  pub fn clients_register_local(&self) -> path::PathBuf {
    self.root.join("clients.register_local")
  }

  pub fn last_submitted_request(&self) -> path::PathBuf {
    self.root.join("LAST_SUBMITTED_REQUEST")
  }

  pub fn logs(&self) -> path::PathBuf {
    self.root.join("LOGS")
  }

  pub fn reqid_log(&self) -> path::PathBuf {
    self.logs().join("reqID.log")
  }

  pub fn requests_log(&self) -> path::PathBuf {
    self.logs().join("requests.log")
  }

  pub fn jobs_log(&self) -> path::PathBuf {
    self.logs().join("jobs.log")
  }

  pub fn statistics_log(&self, site: &str) -> path::PathBuf {
    self.logs().join(format!("{site}_statistics.log"))
  }

  pub fn personal_config_dir(&self) -> path::PathBuf {
    self.root.join("config")
  }

  pub fn default_config(&self) -> path::PathBuf {
    self.personal_config_dir().join("default.cfg")
  }

  pub fn models_dir(&self) -> path::PathBuf {
    self.root.join("models")
  }

  pub fn ftp_dir(&self) -> path::PathBuf {
    self.root.join("ftp")
  }

  /// Path of a selection helper program.
  pub fn program(&self, name: &str) -> path::PathBuf {
    self.root.join("bin").join(name)
  }
}

pub fn run(arguments: &Arguments) -> anyhow::Result<()> {
  let home = Home::new(path::Path::new(&arguments.home));
  match arguments.mode {
    Mode::Ingest => mailbox::ingest(arguments, &home),
    Mode::Request => {
      let request = arguments
        .request
        .as_ref()
        .context("request mode needs --request")?;
      let client = arguments
        .client
        .as_ref()
        .context("request mode needs --client")?;
      request::process(arguments, &home, path::Path::new(request), client)
    }
    Mode::Query => query(arguments),
  }
}

fn query(arguments: &Arguments) -> anyhow::Result<()> {
  let data = arguments.data.as_ref().context("query mode needs --data")?;
  let descriptor = arguments
    .descriptor
    .as_ref()
    .context("query mode needs --descriptor")?;
  let wl_start = arguments
    .wavelength_start
    .context("query mode needs --wavelength-start")?;
  let wl_stop = arguments
    .wavelength_stop
    .context("query mode needs --wavelength-stop")?;
  anyhow::ensure!(wl_start <= wl_stop, "inverted wavelength window");

  let mut reader =
    linelist::Reader::open(path::Path::new(data), path::Path::new(descriptor))?;
  let transitions = reader.query(wl_start, wl_stop, arguments.limit)?;
  let stdout = io::stdout();
  let mut stdout = stdout.lock();
  for transition in &transitions {
    writeln!(
      stdout,
      "{:12.4} {:6} {:8.3} {:12.4} {:5.1} {:12.4} {:5.1} {:7.3} {:7.3} {:8.3} {:8.3} {:8.3}",
      transition.wavelength,
      transition.species,
      transition.log_gf,
      transition.energy_lower,
      transition.j_lower,
      transition.energy_upper,
      transition.j_upper,
      transition.lande_lower,
      transition.lande_upper,
      transition.gamma_radiative,
      transition.gamma_stark,
      transition.gamma_waals,
    )?;
  }
  log::info!("{} transition(s) in [{wl_start}, {wl_stop}]", transitions.len());
  Ok(())
}
