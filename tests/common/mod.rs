#![allow(dead_code)] // Not every integration test uses every helper.

use std::{fs, path};

// Number of bits data codes start at and grow to; must match the reader.
const INITIAL_WIDTH: u32 = 9;
const MAX_WIDTH: u32 = 16;
const EOP: u16 = 257;
const FIRST_FREE: u16 = 258;

/// A server home plus a spool directory inside a test sandbox.
pub struct Server {
  pub home: path::PathBuf,
  pub spool: path::PathBuf,
}

impl Server {
  pub fn new(directory: &path::Path) -> anyhow::Result<Self> {
    let home = directory.join("home");
    let spool = directory.join("spool");
    for subdirectory in ["LOGS", "config", "models", "ftp", "bin"] {
      fs::create_dir_all(home.join(subdirectory))?;
    }
    fs::create_dir_all(&spool)?;
    fs::write(home.join("config").join("default.cfg"), "'default configuration'\n")?;
    Ok(Self { home, spool })
  }

  pub fn register(&self, contents: &str) -> anyhow::Result<()> {
    fs::write(self.home.join("clients.register"), contents)?;
    Ok(())
  }

  pub fn register_local(&self, contents: &str) -> anyhow::Result<()> {
    fs::write(self.home.join("clients.register_local"), contents)?;
    Ok(())
  }

  pub fn model(&self, name: &str) -> anyhow::Result<()> {
    fs::write(self.home.join("models").join(name), "")?;
    Ok(())
  }

  pub fn mailbox(&self, contents: &str) -> anyhow::Result<()> {
    fs::write(self.spool.join("mailbox"), contents)?;
    Ok(())
  }

  pub fn arguments(&self, mode: valdems::Mode) -> valdems::Arguments {
    valdems::Arguments {
      mode,
      home: self.home.to_str().unwrap().to_string(),
      spool: self.spool.to_str().unwrap().to_string(),
      site: "testsite".to_string(),
      ftp_url: "http://vald.test/ftp".to_string(),
      mailbox: None,
      request: None,
      client: None,
      data: None,
      descriptor: None,
      wavelength_start: None,
      wavelength_stop: None,
      limit: 100_000,
    }
  }

  pub fn ingest(&self) -> anyhow::Result<()> {
    valdems::run(&self.arguments(valdems::Mode::Ingest))
  }

  pub fn request(&self, name: &str, client: &str) -> anyhow::Result<()> {
    let mut arguments = self.arguments(valdems::Mode::Request);
    arguments.request = Some(self.spool.join(name).to_str().unwrap().to_string());
    arguments.client = Some(client.to_string());
    valdems::run(&arguments)
  }

  pub fn counter(&self) -> anyhow::Result<String> {
    Ok(fs::read_to_string(self.home.join("LAST_SUBMITTED_REQUEST"))?)
  }

  pub fn process_script(&self) -> anyhow::Result<String> {
    Ok(fs::read_to_string(self.spool.join("process"))?)
  }

  pub fn spool_file(&self, name: &str) -> anyhow::Result<String> {
    Ok(fs::read_to_string(self.spool.join(name))?)
  }

  pub fn has_spool_file(&self, name: &str) -> bool {
    self.spool.join(name).exists()
  }

  /// Wipes the per-run artefacts so an identical run can be replayed.
  pub fn reset(&self) -> anyhow::Result<()> {
    for entry in fs::read_dir(&self.spool)? {
      let entry = entry?;
      if entry.file_name() != "mailbox" {
        fs::remove_file(entry.path())?;
      }
    }
    let counter = self.home.join("LAST_SUBMITTED_REQUEST");
    if counter.exists() {
      fs::remove_file(counter)?;
    }
    Ok(())
  }
}

/// One mailbox message the splitter accepts.
pub fn message(from: &str, subject: &str, body: &str) -> String {
  format!(
    "From {from} Thu Jul 31 12:00:00 2025\n\
     From: {from}\n\
     To: vald@test.example\n\
     Subject: {subject}\n\
     \n\
     {body}\n"
  )
}

/// Compresses a byte stream the way the line-list records are compressed:
/// variable-width LZW, 9 to 16 bits, codes packed LSB-first, terminated by
/// EOP. The decoder learns each dictionary entry one code later than the
/// encoder emits it, so the width progression tracks the decoder's table.
pub fn compress(input: &[u8]) -> Vec<u8> {
  let mut output = Vec::new();
  let (mut accumulator, mut pending) = (0u32, 0u32);
  let mut width = INITIAL_WIDTH;
  let mut max_code: u32 = 1 << width;
  let mut decoder_free = FIRST_FREE as u32;
  let mut emitted = 0usize;
  let mut write = |code: u16| {
    if emitted >= 2 {
      decoder_free += 1;
      if decoder_free >= max_code && width < MAX_WIDTH {
        width += 1;
        max_code *= 2;
      }
    }
    emitted += 1;
    accumulator |= (code as u32) << pending;
    pending += width;
    while pending >= 8 {
      output.push((accumulator & 0xff) as u8);
      accumulator >>= 8;
      pending -= 8;
    }
  };

  let mut dictionary = std::collections::HashMap::new();
  let mut free = FIRST_FREE;
  let mut current: Vec<u8> = Vec::new();
  for &byte in input {
    let mut candidate = current.clone();
    candidate.push(byte);
    if current.is_empty() || dictionary.contains_key(&candidate) {
      current = candidate;
      continue;
    }
    let code = if current.len() == 1 {
      current[0] as u16
    } else {
      dictionary[&current]
    };
    write(code);
    dictionary.insert(candidate, free);
    free += 1;
    current = vec![byte];
  }
  if !current.is_empty() {
    let code = if current.len() == 1 {
      current[0] as u16
    } else {
      dictionary[&current]
    };
    write(code);
  }
  write(EOP);
  drop(write);
  if pending > 0 {
    output.push((accumulator & 0xff) as u8);
  }
  output
}

/// Builds the 270-byte layout of one transition with field values derived
/// from the wavelength, so assertions can recompute them.
pub fn transition_line(wavelength: f64) -> Vec<u8> {
  let mut line = Vec::with_capacity(270);
  line.extend_from_slice(&wavelength.to_le_bytes());
  line.extend_from_slice(&2600i32.to_le_bytes());
  line.extend_from_slice(&(-1.5f32).to_le_bytes());
  line.extend_from_slice(&(wavelength / 2.0).to_le_bytes());
  line.extend_from_slice(&2.5f32.to_le_bytes());
  line.extend_from_slice(&(wavelength / 3.0).to_le_bytes());
  line.extend_from_slice(&3.5f32.to_le_bytes());
  line.extend_from_slice(&1.2f32.to_le_bytes());
  line.extend_from_slice(&1.1f32.to_le_bytes());
  line.extend_from_slice(&8.1f32.to_le_bytes());
  line.extend_from_slice(&(-5.5f32).to_le_bytes());
  line.extend_from_slice(&(-7.7f32).to_le_bytes());
  line.resize(270, b' ');
  line
}

/// Writes a data/descriptor pair from per-record transition wavelengths.
pub fn write_line_list(
  directory: &path::Path,
  records: &[&[f64]],
) -> anyhow::Result<(path::PathBuf, path::PathBuf)> {
  let data_path = directory.join("lines.dat");
  let descriptor_path = directory.join("lines.dsc");
  let mut data = Vec::new();
  let mut descriptor = Vec::new();
  descriptor.extend_from_slice(&(records.len() as u32).to_le_bytes());
  for wavelengths in records {
    let mut plain = Vec::new();
    for &wavelength in *wavelengths {
      plain.extend_from_slice(&transition_line(wavelength));
    }
    let compressed = compress(&plain);
    descriptor.extend_from_slice(&wavelengths[0].to_le_bytes());
    descriptor.extend_from_slice(&wavelengths[wavelengths.len() - 1].to_le_bytes());
    descriptor.extend_from_slice(&(data.len() as u32).to_le_bytes());
    descriptor.extend_from_slice(&(compressed.len() as i32).to_le_bytes());
    data.extend_from_slice(&compressed);
  }
  fs::write(&data_path, data)?;
  fs::write(&descriptor_path, descriptor)?;
  Ok((data_path, descriptor_path))
}
