// Splits an incoming mailbox into request files and assembles the process
// script. Messages open on a `From ` line; the sender is taken from the
// `From:` header and checked against the registries; the body is copied
// verbatim while the begin/end markers are tracked on a compressed view.
// A request commits on the next boundary (or end of input) when a begin
// marker was seen and the sender is authorised, otherwise the request file
// is removed and its number released.

use crate::{counter, job, registry, request, text, Home};
use anyhow::Context as _;
use std::{
  fs, io,
  io::{BufRead as _, Write as _},
  path,
};

struct OpenRequest {
  file: Option<fs::File>,
  name: String,
  address: String,
  client: Option<String>,
  has_begin_request: bool,
  has_end_request: bool,
  is_mirror: bool,
}

pub fn ingest(arguments: &crate::Arguments, home: &Home) -> anyhow::Result<()> {
  let spool = path::Path::new(&arguments.spool);
  let mailbox = match &arguments.mailbox {
    Some(mailbox) => path::PathBuf::from(mailbox),
    None => spool.join("mailbox"),
  };
  let process_path = spool.join("process");

  let mailbox_file = match fs::File::open(&mailbox) {
    Ok(file) => file,
    Err(error) if error.kind() == io::ErrorKind::NotFound => {
      // No mail: leave an empty process script so the caller has nothing
      // to run.
      log::info!("no mail found at {mailbox:?}");
      fs::write(&process_path, "")
        .with_context(|| format!("couldn't write {process_path:?}"))?;
      return Ok(());
    }
    Err(error) => Err(error).with_context(|| format!("couldn't open {mailbox:?}"))?,
  };

  let global = registry::Register::open(&home.clients_register())?;
  let local = registry::Register::open(&home.clients_register_local())?;
  if global.is_none() && local.is_none() {
    anyhow::bail!(
      "could not find any of the client registers ({:?}, {:?})",
      home.clients_register(),
      home.clients_register_local()
    );
  }
  if global.is_none() {
    log::warn!("no global client register at {:?}", home.clients_register());
  }

  let store = counter::Store::new(home);
  let initial = store.get()?.max(0);
  let mut number = initial;

  let mut script = job::Script::new();
  script.push(job::Line::Set {
    variable: job::ERROR_VARIABLE.to_string(),
    value: "0".to_string(),
  });

  let mut ingest = Ingest {
    arguments,
    home,
    spool,
    script,
    global,
    local,
    open: None,
  };

  let mut lines = io::BufReader::new(mailbox_file).lines();
  while let Some(line) = lines.next().transpose().context("couldn't read the mailbox")? {
    let mut line = line;
    if line.starts_with("From ") {
      ingest.finalize(&mut number)?;
      number += 1;
      let name = format!("request.{number:06}");
      let file = fs::File::create(spool.join(&name))
        .with_context(|| format!("couldn't create {name}"))?;
      log::debug!("request {number} opens");
      ingest.open = Some(OpenRequest {
        file: Some(file),
        name,
        address: String::new(),
        client: None,
        has_begin_request: false,
        has_end_request: false,
        is_mirror: false,
      });
    } else if line.starts_with("From: ") && ingest.open.is_some() {
      // The header address can spill onto continuation lines; those are
      // consumed here and never reach the body.
      if memchr::memchr(b'@', line.as_bytes()).is_none() {
        while let Some(continuation) = lines.next().transpose()? {
          let is_continuation = continuation.starts_with("     ");
          let has_address = memchr::memchr(b'@', continuation.as_bytes()).is_some();
          line = continuation;
          if !is_continuation || has_address {
            break;
          }
        }
      }
      let address = isolate_address(&line);
      match registry::authenticate(ingest.global.as_ref(), ingest.local.as_ref(), &address) {
        None => {
          // Not in any register: kill the request quietly.
          log::info!("unauthorised sender {address:?}");
          let open = ingest.open.take().unwrap();
          drop(open.file);
          fs::remove_file(spool.join(&open.name))?;
          number -= 1;
          continue;
        }
        Some(client) => {
          log::debug!("authorised {address:?} as {client}");
          let open = ingest.open.as_mut().unwrap();
          if client == registry::MIRROR_SITE {
            open.is_mirror = true;
          }
          open.address = address;
          open.client = Some(client);
        }
      }
    }
    if let Some(open) = ingest.open.as_mut() {
      let compressed = text::compress(&line, text::LINE_CAPACITY).to_lowercase();
      if compressed.starts_with("beginrequest") {
        open.has_begin_request = true;
      }
      if let Some(file) = open.file.as_mut() {
        writeln!(file, "{line}")?;
      }
      if compressed.starts_with("endrequest") {
        open.has_end_request = true;
      }
    }
  }
  ingest.finalize(&mut number)?;

  ingest.script.push(job::Line::Exit {
    variable: job::ERROR_VARIABLE.to_string(),
  });
  let mut process = fs::File::create(&process_path)
    .with_context(|| format!("couldn't create {process_path:?}"))?;
  ingest.script.write_to(&mut process)?;
  store.put(number)?;
  log::info!("{} request(s) committed", number - initial);
  Ok(())
}

struct Ingest<'a> {
  arguments: &'a crate::Arguments,
  home: &'a Home,
  spool: &'a path::Path,
  script: job::Script,
  global: Option<registry::Register>,
  local: Option<registry::Register>,
  open: Option<OpenRequest>,
}

impl Ingest<'_> {
  /// Commits or aborts the request left open by the previous boundary.
  fn finalize(&mut self, number: &mut i64) -> anyhow::Result<()> {
    let Some(mut open) = self.open.take() else {
      return Ok(());
    };
    drop(open.file.take()); // The request file closes before anything runs.

    if !open.has_begin_request || open.client.is_none() {
      log::info!("request {number} aborted ({})", open.name);
      fs::remove_file(self.spool.join(&open.name))?;
      *number -= 1;
      return Ok(());
    }
    let client = open.client.as_deref().unwrap();
    if !open.has_end_request {
      // Truncated input still commits whatever was fully received.
      log::debug!("{} has no end request marker", open.name);
    }

    self
      .script
      .push(job::Line::Comment(format!("############## {} #############", open.name)));
    self.script.echo_to(
      format!("============= {} ============", open.name),
      self.home.requests_log(),
    );

    // The request is parsed right away; its job script runs later, under
    // the process script.
    match request::process(self.arguments, self.home, &self.spool.join(&open.name), client) {
      Ok(()) => (),
      Err(error) => {
        log::error!("request parser failed for {}: {error:#}", open.name);
        self.script.echo(format!(
          "ERROR: request parser failed for request {number}"
        ));
        self.script.push(job::Line::Set {
          variable: job::ERROR_VARIABLE.to_string(),
          value: "1".to_string(),
        });
      }
    }

    let job_name = format!("job.{number:06}");
    self
      .script
      .run(job::Command::new("chmod").arg("u+x").arg(&job_name));
    self.script.push(job::Line::Run {
      stage: job::Stage::plain(job::Command::new(format!("./{job_name}"))),
      stdin: None,
      target: None,
      trap: Some(format!("ERROR: job failed for request {number}")),
    });
    self.script.push(job::Line::Run {
      stage: job::Stage::plain(job::Command::new("cat").arg(&job_name)),
      stdin: None,
      target: Some((self.home.jobs_log(), job::Mode::Append)),
      trap: None,
    });

    if !open.is_mirror || open.has_begin_request {
      // Mirror info mails must not bounce replies back and forth.
      self.script.push(job::Line::Run {
        stage: job::Stage::plain(job::Command::new("sendmail").arg(&open.address)),
        stdin: Some(format!("result.{number:06}").into()),
        target: None,
        trap: Some(format!("ERROR: sendmail failed for request {number}")),
      });
    }
    let log_body = if open.is_mirror {
      // Mirror mails are long; keep only their head in the log.
      job::Command::new("head").arg("-20").arg(&open.name)
    } else {
      job::Command::new("cat").arg(&open.name)
    };
    self.script.push(job::Line::Run {
      stage: job::Stage::plain(log_body),
      stdin: None,
      target: Some((self.home.requests_log(), job::Mode::Append)),
      trap: None,
    });
    Ok(())
  }
}

/// Pulls the bare address out of a `From:` header line. Quoted aliases and
/// parenthesised comments are discarded, an angle-bracketed address is
/// preferred, and UUCP bangs and route prefixes are stripped.
fn isolate_address(line: &str) -> String {
  let tail = line.get(6..).unwrap_or("");
  let mut isolated = text::swallow_quotes(tail, '"', '"');
  isolated = text::swallow_quotes(&isolated, '(', ')');
  if let Some(i) = isolated.find('>') {
    isolated.truncate(i);
  } else if let Some(i) = isolated.find(' ') {
    isolated.truncate(i);
  }
  let mut address = match isolated.find('<') {
    Some(i) => isolated[i + 1..].to_string(),
    None => isolated,
  };
  if let Some(i) = address.rfind('>') {
    address.truncate(i);
  }
  if let Some(i) = address.rfind(':') {
    address = address[i + 1..].to_string();
  }
  if let Some(i) = address.rfind('!') {
    address = address[i + 1..].to_string();
  }
  address
}
