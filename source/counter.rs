// The request counter survives across runs in LAST_SUBMITTED_REQUEST and
// every read and write of it is appended to LOGS/reqID.log, so a crashed
// run can be reconciled against the request files it left behind.

use anyhow::Context as _;
use std::{fs, io, io::Write as _, path};

#[derive(Debug)]
pub struct Store {
  counter: path::PathBuf,
  audit: path::PathBuf,
}

impl Store {
  pub fn new(home: &crate::Home) -> Self {
    Self {
      counter: home.last_submitted_request(),
      audit: home.reqid_log(),
    }
  }

  /// Returns the last submitted request number, -1 when no counter file
  /// exists yet (callers treat that as 0).
  pub fn get(&self) -> anyhow::Result<i64> {
    let number = match fs::read_to_string(&self.counter) {
      Ok(contents) => contents
        .trim()
        .parse()
        .with_context(|| format!("corrupt counter file {:?}", self.counter))?,
      Err(error) if error.kind() == io::ErrorKind::NotFound => {
        log::warn!("cannot find the last request number file {:?}", self.counter);
        -1
      }
      Err(error) => Err(error).with_context(|| format!("couldn't read {:?}", self.counter))?,
    };
    log::info!("last submitted request: {number}");
    self.audit(&format!("Read: {number}\n"))?;
    Ok(number)
  }

  pub fn put(&self, number: i64) -> anyhow::Result<()> {
    fs::write(&self.counter, number.to_string())
      .with_context(|| format!("couldn't write {:?}", self.counter))?;
    self.audit(&format!("Wrote: {number}\n"))
  }

  fn audit(&self, entry: &str) -> anyhow::Result<()> {
    let mut audit = fs::OpenOptions::new()
      .append(true)
      .create(true)
      .open(&self.audit)
      .with_context(|| format!("couldn't open {:?}", self.audit))?;
    audit.write_all(entry.as_bytes())?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trip() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let home = crate::Home::new(directory.path());
    fs::create_dir_all(home.logs())?;
    let store = Store::new(&home);

    assert_eq!(-1, store.get()?);
    store.put(41)?;
    assert_eq!(41, store.get()?);
    store.put(42)?;
    assert_eq!(42, store.get()?);

    assert_eq!(
      "Read: -1\nWrote: 41\nRead: 41\nWrote: 42\nRead: 42\n",
      fs::read_to_string(home.reqid_log())?
    );
    Ok(())
  }
}
