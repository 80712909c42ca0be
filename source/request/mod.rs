// Parses one request file and emits the job script driving the selection
// helpers. The request format is:
//
//   begin request
//   <request type>
//   <type-specific body>
//   end request
//
// Option keywords may appear on any body line and are consumed in place.
// Parse problems never touch the process: they are reported as FAILED/
// FAILURE/WARNING echoes inside the job script so the requester sees them
// in the reply, and the driver signals the failure through its exit code.

use crate::{job, text, Home};
use anyhow::Context as _;
use std::{
  error, fmt, fs, io,
  io::{BufRead as _, Write as _},
  path,
};

pub mod grammar;
pub mod keyword;
pub mod model;

pub use keyword::Config;

pub const MAX_LINES_PER_REQUEST: u32 = 100_000;
pub const MAX_LINES_PER_FTP: u32 = 1_000_000;

// How much of a Subject header survives into the reply.
const SUBJECT_CAPACITY: usize = 68;

#[derive(Debug)]
pub enum Error {
  /// The request file does not exist (exit code 4).
  MissingRequest(path::PathBuf),
  /// The job script cannot be created (exit code 8).
  Job(path::PathBuf),
  /// The request was malformed; the job script carries the diagnostics.
  Failed,
}

impl Error {
  pub fn exit_code(&self) -> i32 {
    match self {
      Error::MissingRequest(_) => 4,
      Error::Job(_) => 8,
      Error::Failed => 1,
    }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Error::MissingRequest(path) => write!(formatter, "request file {path:?} is missing"),
      Error::Job(path) => write!(formatter, "job script {path:?} cannot be created"),
      Error::Failed => write!(formatter, "request parsing failed"),
    }
  }
}

impl error::Error for Error {}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Kind {
  ShowLine,
  ExtractAll,
  ExtractElement,
  ExtractStellar,
}

impl Kind {
  fn label(&self) -> &'static str {
    match self {
      Kind::ShowLine => "ShowLine",
      Kind::ExtractAll => "ExtractAll",
      Kind::ExtractElement => "ExtractElement",
      Kind::ExtractStellar => "ExtractStellar",
    }
  }
}

/// Parses `request` on behalf of `client` (the registry name, possibly
/// `_local`-suffixed) and writes the matching `job.NNNNNN` into the spool.
pub fn process(
  arguments: &crate::Arguments,
  home: &Home,
  request: &path::Path,
  client: &str,
) -> anyhow::Result<()> {
  let file = match fs::File::open(request) {
    Ok(file) => file,
    Err(error) if error.kind() == io::ErrorKind::NotFound => {
      return Err(Error::MissingRequest(request.to_path_buf()).into())
    }
    Err(error) => Err(error).with_context(|| format!("couldn't open {request:?}"))?,
  };
  let number: i64 = request
    .file_name()
    .and_then(|name| name.to_str())
    .and_then(|name| name.strip_prefix("request."))
    .and_then(|name| name.parse().ok())
    .with_context(|| format!("{request:?} is not a request file name"))?;

  let spool = path::Path::new(&arguments.spool);
  let job_path = spool.join(format!("job.{number:06}"));
  let mut job_file = match fs::File::create(&job_path) {
    Ok(file) => file,
    Err(error) => {
      log::error!("couldn't create {job_path:?}: {error}");
      return Err(Error::Job(job_path).into());
    }
  };

  // The client name carries the registry of origin; the personal
  // configuration file name keeps that distinction.
  let (client_base, personal_config) = match client.find("_local") {
    Some(i) => (&client[..i], format!("{}.cfg_local", &client[..i])),
    None => (client, format!("{client}.cfg")),
  };

  let mut parser = Parser {
    lines: io::BufReader::new(file).lines(),
    script: job::Script::new(),
    config: Config::default(),
    home,
    spool,
    client: client_base.to_string(),
    personal_config,
    number,
    site: &arguments.site,
    ftp_url: &arguments.ftp_url,
  };
  let succeeded = parser.run(&request.display().to_string())?;
  parser
    .script
    .write_to(&mut job_file)
    .with_context(|| format!("couldn't write {job_path:?}"))?;
  log::info!("request {number} for {client}: job script {job_path:?} written");
  if succeeded {
    Ok(())
  } else {
    Err(Error::Failed.into())
  }
}

struct Parser<'a> {
  lines: io::Lines<io::BufReader<fs::File>>,
  script: job::Script,
  config: Config,
  home: &'a Home,
  spool: &'a path::Path,
  client: String,
  personal_config: String,
  number: i64,
  site: &'a str,
  ftp_url: &'a str,
}

fn leading_numeric(token: &str) -> bool {
  token.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '.' | '+' | '-'))
}

impl Parser<'_> {
  fn next_line(&mut self) -> anyhow::Result<Option<String>> {
    self
      .lines
      .next()
      .transpose()
      .context("couldn't read the request file")
  }

  fn result_name(&self) -> String {
    format!("result.{:06}", self.number)
  }

  fn echo_result(&mut self, text: impl Into<String>) {
    let result = self.result_name();
    self.script.echo_to(text, result);
  }

  fn set_keyword(&mut self, token: &mut String) {
    keyword::set(
      token,
      &mut self.config,
      &mut self.script,
      self.home,
      &self.personal_config,
      self.number,
    );
  }

  fn config_path(&self) -> path::PathBuf {
    if self.config.personal_configuration {
      self.home.personal_config_dir().join(&self.personal_config)
    } else {
      self.home.default_config()
    }
  }

  fn line_cap(&self) -> u32 {
    if self.config.ftp_retrieval {
      MAX_LINES_PER_FTP
    } else {
      MAX_LINES_PER_REQUEST
    }
  }

  fn client_file(&self) -> String {
    format!("{}.{:06}", self.client, self.number)
  }

  fn remove(&mut self, name: &str) {
    self.script.run(job::Command::new("rm").arg(name));
  }

  fn run(&mut self, request_name: &str) -> anyhow::Result<bool> {
    let result = self.result_name();

    // Scan for the begin request marker; the Subject header is picked up
    // on the way so the reply can quote it.
    let mut subject = "\"Subject: Re: \"".to_string();
    let mut request_on = false;
    while let Some(line) = self.next_line()? {
      for prefix in ["SUBJECT: ", "Subject: ", "subject: "] {
        if let Some(tail) = line.strip_prefix(prefix) {
          let scrubbed: String = text::remove_meta(tail).chars().take(SUBJECT_CAPACITY).collect();
          subject = format!("\"Subject: Re: {scrubbed}\"");
        }
      }
      let compressed = text::compress(&line, text::LINE_CAPACITY).to_lowercase();
      if compressed.starts_with("beginrequest") {
        self.prologue(&subject, request_name);
        request_on = true;
        break;
      }
    }
    if !request_on {
      self.script.push(job::Line::Echo {
        text: subject,
        target: Some((result.clone().into(), job::Mode::Truncate)),
      });
      self.echo_result("Syntax error");
      self.echo_result("\"FAILED: No begin request statement\"");
      return Ok(false);
    }

    // The request type is on the next non-empty line.
    let mut kind = None;
    while let Some(line) = self.next_line()? {
      let compressed = text::compress(&line, text::LINE_CAPACITY).to_lowercase();
      kind = if compressed.starts_with("showline") {
        Some(Kind::ShowLine)
      } else if compressed.starts_with("extractall") {
        Some(Kind::ExtractAll)
      } else if compressed.starts_with("extractelement") {
        Some(Kind::ExtractElement)
      } else if compressed.starts_with("extractstellar") {
        Some(Kind::ExtractStellar)
      } else {
        None
      };
      if kind.is_some() {
        break;
      }
    }
    let Some(kind) = kind else {
      self.echo_result("FAILED: Cannot recognise request type");
      return Ok(false);
    };

    let succeeded = match kind {
      Kind::ShowLine => self.show_line()?,
      Kind::ExtractAll => self.extract_all()?,
      Kind::ExtractElement => self.extract_element()?,
      Kind::ExtractStellar => self.extract_stellar()?,
    };
    let statistics = self.home.statistics_log(self.site);
    self.script.echo_to(
      format!("\"{} {} {}\"", self.number, kind.label(), self.client),
      statistics,
    );

    // Whatever the helpers wrote on stderr travels back with the result.
    self.script.push(job::Line::Run {
      stage: job::Stage::plain(job::Command::new("cat").arg("err.log")),
      stdin: None,
      target: Some((result.into(), job::Mode::Append)),
      trap: None,
    });
    self.remove("err.log");
    Ok(succeeded)
  }

  fn prologue(&mut self, subject: &str, request_name: &str) {
    let result = self.result_name();
    self.script.push(job::Line::Echo {
      text: subject.to_string(),
      target: Some((result.clone().into(), job::Mode::Truncate)),
    });
    self.echo_result("Mime-Version: 1.0");
    self.echo_result("'Content-Type: multipart/mixed; boundary=\"==MailSection==\"'");
    self.echo_result("\"\"");
    self.echo_result("\"--==MailSection==\"");
    self.echo_result("'Content-Type: text/plain; charset=\"us-ascii\"'");
    self.echo_result("\"\"");
    self.echo_result(format!("============= job.{:06} =============", self.number));
    self.script.push(job::Line::Run {
      stage: job::Stage::grouped(
        job::Command::new(self.home.program("typerequest")).arg(request_name),
      ),
      stdin: None,
      target: Some((result.into(), job::Mode::Append)),
      trap: None,
    });
    self.script.run(job::Command::new("touch").arg("err.log"));
  }

  // Zero or more blocks, each a (center, window) pair followed by one
  // species per line; every block turns into one showline invocation.
  fn show_line(&mut self) -> anyhow::Result<bool> {
    let mut ishow: i64 = -1;
    loop {
      ishow += 1;
      self.echo_result(format!(" {}", "=".repeat(79)));
      let show_in = format!("show_in.{:06}_{:03}", self.number, ishow);

      let mut center = -1.0;
      let mut end_of_request = true;
      let mut block_file = None;
      while let Some(line) = self.next_line()? {
        end_of_request = false;
        let mut token = text::compress(&line, text::LINE_CAPACITY);
        self.set_keyword(&mut token);
        token.make_ascii_lowercase();
        if token.starts_with("endrequest") {
          return Ok(true);
        }
        if token.is_empty() {
          continue;
        }
        if !leading_numeric(&token) {
          self.echo_result(format!("WARNING: Unknown option: {token} (ignored)"));
          continue;
        }
        if let Ok((c, window)) = grammar::request::pair(&token) {
          let mut file = fs::File::create(self.spool.join(&show_in))
            .with_context(|| format!("couldn't create {show_in}"))?;
          writeln!(file, "{c},{window}")?;
          block_file = Some(file);
          center = c;
        }
        break;
      }
      if center < 0.0 {
        if end_of_request {
          return Ok(true);
        }
        self.echo_result(
          "WARNING: Cannot read central wavelength and scan window (entry ignored)",
        );
        continue;
      }

      let hfs = self.config.hfs_splitting;
      let mut has_element = false;
      while let Some(line) = self.next_line()? {
        let species = text::compress_species(&line);
        let mut probe = species.clone();
        self.set_keyword(&mut probe);
        if line.to_lowercase().starts_with("endrequest") {
          return Ok(true);
        }
        if species.is_empty() {
          continue;
        }
        has_element = true;
        if let Some(mut file) = block_file.take() {
          writeln!(file, "{species}")?;
          writeln!(file, "{}", self.config_path().display())?;
        }

        let mut showline = job::Command::new(self.home.program("showline"));
        let showline = if self.config.isotopic_scaling {
          if hfs {
            showline = showline.arg("-HFS");
          }
          job::Stage::grouped(showline)
        } else {
          job::Stage::plain(showline.arg("-noisotopic"))
        };
        self.script.push(job::Line::Pipeline {
          stages: vec![
            showline,
            job::Stage::grouped(job::Command::new(self.home.program("swallow")).arg("10")),
          ],
          stdin: Some(show_in.clone().into()),
          capture: Some((self.result_name().into(), job::Mode::Append)),
          errors: Some("err.log".into()),
        });
        self.remove(&show_in);
        break;
      }
      if !has_element {
        self.remove(&show_in);
        self.echo_result("WARNING: Element name is missing (ignored)");
      }
      self.echo_result("\"--==MailSection==\"");
    }
  }

  // One wavelength range; the whole list within it goes through preselect.
  fn extract_all(&mut self) -> anyhow::Result<bool> {
    let pres_in = format!("pres_in.{:06}", self.number);
    while let Some(line) = self.next_line()? {
      let mut token = text::compress(&line, text::LINE_CAPACITY);
      self.set_keyword(&mut token);
      if token.is_empty() {
        continue;
      }
      if !leading_numeric(&token) {
        self.echo_result(format!("WARNING: Unknown option: {token} (ignored)"));
        continue;
      }
      let Some((left, right)) = self.wavelength_range(&token) else {
        return Ok(false);
      };
      let mut file = fs::File::create(self.spool.join(&pres_in))
        .with_context(|| format!("couldn't create {pres_in}"))?;
      writeln!(file, "{left},{right}")?;
      writeln!(file, "{}", self.line_cap())?;
      writeln!(file)?;
      writeln!(file, "'{}'", self.config_path().display())?;
      writeln!(file, "{}", self.config.flags_line())?;
      drop(file);

      self.format_pipeline(&pres_in);
      self.remove(&pres_in);
      return Ok(true);
    }
    self.echo_result("FAILURE: Cannot read wavelength range");
    self.remove(&pres_in);
    Ok(false)
  }

  // A wavelength range followed by species names injected into the
  // preselect input; the pipeline is the one ExtractAll uses.
  fn extract_element(&mut self) -> anyhow::Result<bool> {
    let pres_in = format!("pres_in.{:06}", self.number);
    let mut range_file = None;
    while let Some(line) = self.next_line()? {
      let mut token = text::compress(&line, text::LINE_CAPACITY);
      self.set_keyword(&mut token);
      if token.is_empty() {
        continue;
      }
      if !leading_numeric(&token) {
        self.echo_result(format!("WARNING: Unknown option: {token} (ignored)"));
        continue;
      }
      let Some((left, right)) = self.wavelength_range(&token) else {
        return Ok(false);
      };
      let mut file = fs::File::create(self.spool.join(&pres_in))
        .with_context(|| format!("couldn't create {pres_in}"))?;
      writeln!(file, "{left},{right}")?;
      writeln!(file, "{}", self.line_cap())?;
      range_file = Some(file);
      break;
    }
    let Some(file) = range_file else {
      self.echo_result("FAILURE: Cannot read wavelength range");
      return Ok(false);
    };

    let mut range_file = Some(file);
    while let Some(line) = self.next_line()? {
      let species = text::compress_species(&line);
      if species.is_empty() {
        continue;
      }
      let mut file = range_file.take().unwrap();
      writeln!(file, "{species}")?;
      writeln!(file, "'{}'", self.config_path().display())?;
      writeln!(file, "{}", self.config.flags_line())?;
      drop(file);

      self.format_pipeline(&pres_in);
      self.remove(&pres_in);
      return Ok(true);
    }
    self.remove(&pres_in);
    self.echo_result("FAILURE: Element name is missing");
    Ok(false)
  }

  // Four parameter blocks: wavelength range, selection criterion and
  // microturbulence, Teff and gravity (snapped to the model grid), and the
  // abundance list.
  fn extract_stellar(&mut self) -> anyhow::Result<bool> {
    let pres_in = format!("pres_in.{:06}", self.number);
    let mut range = None;
    while let Some(line) = self.next_line()? {
      let mut token = text::compress(&line, text::LINE_CAPACITY);
      self.set_keyword(&mut token);
      if token.is_empty() {
        continue;
      }
      if !leading_numeric(&token) {
        self.echo_result(format!("FAILURE: Unknown option: {token}"));
        continue;
      }
      let Some((left, right)) = self.wavelength_range(&token) else {
        return Ok(false);
      };
      let mut file = fs::File::create(self.spool.join(&pres_in))
        .with_context(|| format!("couldn't create {pres_in}"))?;
      writeln!(file, "{left},{right}")?;
      writeln!(file, "0")?;
      writeln!(file)?;
      writeln!(file, "'{}'", self.config_path().display())?;
      writeln!(file, "{}", self.config.flags_line())?;
      drop(file);
      range = Some((left, right));
      break;
    }
    let Some((left, right)) = range else {
      self.echo_result("FAILURE: Cannot read wavelength range");
      self.remove(&pres_in);
      return Ok(false);
    };

    let mut select_input =
      fs::File::create(self.spool.join("select.input")).context("couldn't create select.input")?;
    let mut have_criterion = false;
    while let Some(line) = self.next_line()? {
      let mut token = text::compress(&line, text::LINE_CAPACITY);
      self.set_keyword(&mut token);
      if token.is_empty() {
        continue;
      }
      if !leading_numeric(&token) {
        self.echo_result(format!("FAILURE: Unknown option: {token}"));
        continue;
      }
      let Ok((criterion, microturbulence)) = grammar::request::pair(&token) else {
        self.echo_result("FAILURE: Cannot read criterion and Vmicro");
        self.remove(&pres_in);
        return Ok(false);
      };
      writeln!(select_input, "{left},{right},{criterion},{microturbulence}")?;
      have_criterion = true;
      break;
    }
    if !have_criterion {
      self.echo_result("FAILURE: Cannot read criterion and Vmicro");
      self.remove(&pres_in);
      return Ok(false);
    }

    let mut have_model = false;
    while let Some(line) = self.next_line()? {
      let mut token = text::compress(&line, text::LINE_CAPACITY);
      self.set_keyword(&mut token);
      if token.is_empty() {
        continue;
      }
      if !leading_numeric(&token) {
        self.echo_result(format!("FAILURE: Unknown option: {token}"));
        continue;
      }
      let Ok((temperature, gravity)) = grammar::request::pair(&token) else {
        self.echo_result("FAILURE: Cannot read Teff and gravity");
        self.remove(&pres_in);
        return Ok(false);
      };
      let (t, g) = model::grid_point(temperature, gravity);
      let name = model::file_name(t, g);
      let Some(best) = model::nearest(&self.home.models_dir(), &name)? else {
        self.echo_result("FAILURE: VALD could not find any atmosphere model");
        self.remove(&pres_in);
        return Ok(false);
      };
      if best != name {
        self.echo_result(format!(
          "WARNING: VALD does not have the exact model, will use {best} instead"
        ));
      }
      writeln!(
        select_input,
        "'{}'",
        self.home.models_dir().join(&best).display()
      )?;
      have_model = true;
      break;
    }
    if !have_model {
      self.echo_result("FAILURE: Cannot read Teff and gravity");
      self.remove(&pres_in);
      return Ok(false);
    }

    // Abundance entries are wrapped so no select.input line outgrows the
    // reader on the other side.
    let mut width = 0;
    while let Some(line) = self.next_line()? {
      let mut token = text::compress(&line, text::ABUNDANCE_LINE_CAPACITY);
      self.set_keyword(&mut token);
      if token.is_empty() {
        continue;
      }
      if token.starts_with("ENDREQUEST") {
        break;
      }
      let abundances = grammar::request::abundances(&token).unwrap(); // Guaranteed by the BNF.
      for abundance in abundances {
        let entry = match abundance {
          grammar::Abundance::Element { symbol, value } => format!("'{symbol}:{value:.2}',"),
          grammar::Abundance::MetalOverHydrogen(value) => format!("'M/H:{value:.2}',"),
          grammar::Abundance::Unknown(token) => {
            self.echo_result(format!("WARNING: Never heard of element: {token}"));
            continue;
          }
        };
        if width > 66 {
          writeln!(select_input)?;
          width = 0;
        }
        write!(select_input, "{entry}")?;
        width += entry.len();
      }
    }
    if width > 66 {
      writeln!(select_input)?;
    }
    writeln!(select_input, "'END'")?;
    writeln!(select_input, "'Synth'")?;
    writeln!(select_input, "'select.out'")?;
    writeln!(select_input, "{}", self.line_cap())?;
    drop(select_input);

    let hfs = self.config.hfs_splitting;
    let mut stages = vec![
      job::Stage::plain(job::Command::new(self.home.program("preselect"))),
      job::Stage::plain(job::Command::new(self.home.program("select"))),
    ];
    if hfs {
      stages.push(job::Stage::plain(job::Command::new(
        self.home.program("hfs_split"),
      )));
      stages.push(job::Stage::plain(job::Command::new(
        self.home.program("post_hfs_format"),
      )));
    }
    self.script.push(job::Line::Pipeline {
      stages,
      stdin: Some(pres_in.clone().into()),
      capture: Some((self.result_name().into(), job::Mode::Append)),
      errors: Some("err.log".into()),
    });

    let bib = if hfs { "hfs.bib" } else { "select.bib" };
    let client_file = self.client_file();
    if self.config.ftp_retrieval {
      self
        .script
        .run(job::Command::new("mv").arg("select.out").arg(&client_file));
      self.remove(&pres_in);
      self.ftp_package(bib);
    } else {
      self.script.push(job::Line::Run {
        stage: job::Stage::plain(job::Command::new("cat").arg("select.out")),
        stdin: None,
        target: Some((self.result_name().into(), job::Mode::Append)),
        trap: None,
      });
      self.echo_result("\"--==MailSection==\"");
      self
        .script
        .run(job::Command::new("rm").arg("select.out").arg(&pres_in));
      self.inline_package(bib, "\"--==MailSection==--\"");
    }
    Ok(true)
  }

  /// Parses and validates an extraction wavelength range, reporting
  /// failures into the result stream.
  fn wavelength_range(&mut self, token: &str) -> Option<(f64, f64)> {
    let Ok((left, right)) = grammar::request::pair(token) else {
      self.echo_result("FAILURE: Cannot read wavelength range");
      return None;
    };
    if left > right || left <= 0.0 {
      self.echo_result("FAILURE: Bad wavelength range");
      return None;
    }
    Some((left, right))
  }

  /// The preselect|format pipeline shared by ExtractAll and
  /// ExtractElement, with hyperfine splitting spliced in when requested,
  /// followed by the delivery packaging.
  fn format_pipeline(&mut self, pres_in: &str) {
    let hfs = self.config.hfs_splitting;
    let mut stages = vec![
      job::Stage::plain(job::Command::new(self.home.program("preselect"))),
      job::Stage::plain(job::Command::new(self.home.program("format"))),
    ];
    if hfs {
      stages.push(job::Stage::plain(job::Command::new(
        self.home.program("hfs_split"),
      )));
      stages.push(job::Stage::plain(job::Command::new(
        self.home.program("post_hfs_format"),
      )));
    }
    let bib = if hfs { "hfs.bib" } else { "presformat.bib" };
    let capture = if self.config.ftp_retrieval {
      (self.client_file().into(), job::Mode::Truncate)
    } else {
      (self.result_name().into(), job::Mode::Append)
    };
    self.script.push(job::Line::Pipeline {
      stages,
      stdin: Some(pres_in.into()),
      capture: Some(capture),
      errors: Some("err.log".into()),
    });
    if self.config.ftp_retrieval {
      self.ftp_package(bib);
    } else {
      self.echo_result("\"--==MailSection==\"");
      self.inline_package(bib, "\"--===MailSection==--\"");
    }
  }

  /// Result and bibliography are gzipped into the FTP drop directory and
  /// the retrieval URLs are announced in the reply.
  fn ftp_package(&mut self, bib: &str) {
    let client_file = self.client_file();
    let ftp = self.home.ftp_dir();
    let ftp = ftp.display();
    self.script.run(job::Command::new("gzip").arg(&client_file));
    self.script.run(
      job::Command::new("mv")
        .arg(format!("{client_file}.gz"))
        .arg(format!("{ftp}")),
    );
    self.script.run(
      job::Command::new("chmod")
        .arg("a+r")
        .arg(format!("{ftp}/{client_file}.gz")),
    );
    self.script.run(
      job::Command::new("mv")
        .arg(bib)
        .arg(format!("{client_file}.bib")),
    );
    self
      .script
      .run(job::Command::new("gzip").arg(format!("{client_file}.bib")));
    self.script.run(
      job::Command::new("mv")
        .arg(format!("{client_file}.bib.gz"))
        .arg(format!("{ftp}")),
    );
    self.script.run(
      job::Command::new("chmod")
        .arg("a+r")
        .arg(format!("{ftp}/{client_file}.bib.gz")),
    );
    self.echo_result(format!(
      "VALD processed your request number {}",
      self.number
    ));
    self.echo_result("Results can be retrieved with a Web browser at");
    self.echo_result(format!("{}/{client_file}.gz", self.ftp_url));
    self.echo_result(format!("{}/{client_file}.bib.gz", self.ftp_url));
    self.echo_result("This link will be valid for 48 hours only");
  }

  /// The bibliography companion rides along in the reply as a base64
  /// MIME attachment.
  fn inline_package(&mut self, bib: &str, closing: &str) {
    let client_file = self.client_file();
    self.script.run(
      job::Command::new("mv")
        .arg(bib)
        .arg(format!("{client_file}.bib")),
    );
    self
      .script
      .run(job::Command::new("gzip").arg(format!("{client_file}.bib")));
    self.echo_result(format!(
      "\"Content-Disposition: attachment; filename={client_file}.bib.gz;\""
    ));
    self.echo_result("\"Content-Type: application/octet-stream\"");
    self.echo_result("\"Content-Transfer-Encoding: base64\"");
    self.echo_result("\"\"");
    self.script.push(job::Line::Run {
      stage: job::Stage::plain(job::Command::new("base64").arg(format!("{client_file}.bib.gz"))),
      stdin: None,
      target: Some((self.result_name().into(), job::Mode::Append)),
      trap: None,
    });
    self.echo_result(closing);
    self
      .script
      .run(job::Command::new("rm").arg(format!("{client_file}.bib.gz")));
  }
}
