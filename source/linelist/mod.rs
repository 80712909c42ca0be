// Random-access reader for the compressed line-list format. A descriptor
// file carries a directory of wavelength-sorted records; each record is a
// variable-width LZW payload in the data file that decompresses to up to
// 1024 transitions of 270 bytes each. All numeric fields are little-endian
// on the wire.

use bytes::Buf as _;
use std::{
  error, fmt, fs, io,
  io::{Read as _, Seek as _},
  path,
  sync::atomic,
};

mod lzw;

/// Uncompressed size of a single transition.
pub const LINE_LENGTH: usize = 270;
pub const LINES_PER_RECORD: usize = 1024;
pub const RECORD_LENGTH: usize = LINE_LENGTH * LINES_PER_RECORD;
/// Process-wide cap on simultaneously open readers.
pub const MAX_OPEN_READERS: usize = 400;

const ANCILLARY_LENGTH: usize = 210;
// f64 start, f64 end, u32 offset, i32 length; naturally aligned, no
// padding.
const ENTRY_LENGTH: usize = 24;

#[derive(Debug)]
pub enum Error {
  Io(io::Error),
  /// The descriptor announces more entries than it holds.
  ShortDescriptor(path::PathBuf),
  /// The directory is not sorted into non-overlapping ascending ranges.
  BadDirectory,
  /// No record intersects the requested range.
  NoOverlap,
  /// `wl_start > wl_stop`.
  BadRange,
  Seek(io::Error),
  /// The data file ends inside a record.
  TruncatedRecord,
  /// Reading past the last record.
  PastEnd,
  /// The dictionary filled up without a CLEAR: the stream is corrupt.
  Corrupt,
  TooManyReaders,
}

impl fmt::Display for Error {
  fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Error::Io(error) => write!(formatter, "i/o error: {error}"),
      Error::ShortDescriptor(path) => write!(formatter, "descriptor {path:?} is short"),
      Error::BadDirectory => write!(formatter, "record directory is not sorted"),
      Error::NoOverlap => write!(formatter, "no record intersects the wavelength range"),
      Error::BadRange => write!(formatter, "wavelength range is inverted"),
      Error::Seek(error) => write!(formatter, "couldn't seek to the record: {error}"),
      Error::TruncatedRecord => write!(formatter, "record is truncated"),
      Error::PastEnd => write!(formatter, "no record left to read"),
      Error::Corrupt => write!(formatter, "compressed stream is corrupt"),
      Error::TooManyReaders => {
        write!(formatter, "more than {MAX_OPEN_READERS} open readers")
      }
    }
  }
}

impl error::Error for Error {
  fn source(&self) -> Option<&(dyn error::Error + 'static)> {
    match self {
      Error::Io(error) | Error::Seek(error) => Some(error),
      _ => None,
    }
  }
}

impl From<io::Error> for Error {
  fn from(error: io::Error) -> Self {
    Error::Io(error)
  }
}

/// One record of the wavelength directory.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
  pub wl_start: f64,
  pub wl_end: f64,
  pub offset: u32,
  pub length: i32,
}

/// One spectral line, decoded from its 270-byte layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
  pub wavelength: f64, // vacuum
  pub species: i32,
  pub log_gf: f32,
  pub energy_lower: f64,
  pub j_lower: f32,
  pub energy_upper: f64,
  pub j_upper: f32,
  pub lande_lower: f32,
  pub lande_upper: f32,
  pub gamma_radiative: f32,
  pub gamma_stark: f32,
  pub gamma_waals: f32,
  pub ancillary: [u8; ANCILLARY_LENGTH],
}

impl Transition {
  fn decode(line: &[u8; LINE_LENGTH]) -> Self {
    let mut buffer = &line[..];
    let wavelength = buffer.get_f64_le();
    let species = buffer.get_i32_le();
    let log_gf = buffer.get_f32_le();
    let energy_lower = buffer.get_f64_le();
    let j_lower = buffer.get_f32_le();
    let energy_upper = buffer.get_f64_le();
    let j_upper = buffer.get_f32_le();
    let lande_lower = buffer.get_f32_le();
    let lande_upper = buffer.get_f32_le();
    let gamma_radiative = buffer.get_f32_le();
    let gamma_stark = buffer.get_f32_le();
    let gamma_waals = buffer.get_f32_le();
    let mut ancillary = [0; ANCILLARY_LENGTH];
    ancillary.copy_from_slice(&line[60..]);
    // A reference flag below '0' means the record carries multiple
    // references: three 16-bit pointers follow, little-endian on the
    // wire, read as native words from memory by downstream consumers.
    #[cfg(target_endian = "big")]
    if line[236] < b'0' {
      for i in [177, 179, 181] {
        ancillary.swap(i, i + 1);
      }
    }
    Self {
      wavelength,
      species,
      log_gf,
      energy_lower,
      j_lower,
      energy_upper,
      j_upper,
      lande_lower,
      lande_upper,
      gamma_radiative,
      gamma_stark,
      gamma_waals,
      ancillary,
    }
  }
}

static OPEN_READERS: atomic::AtomicUsize = atomic::AtomicUsize::new(0);

#[derive(Debug)]
struct Permit;

impl Permit {
  fn acquire() -> Result<Self, Error> {
    OPEN_READERS
      .fetch_update(
        atomic::Ordering::SeqCst,
        atomic::Ordering::SeqCst,
        |readers| (readers < MAX_OPEN_READERS).then_some(readers + 1),
      )
      .map_err(|_| Error::TooManyReaders)?;
    Ok(Self)
  }
}

impl Drop for Permit {
  fn drop(&mut self) {
    OPEN_READERS.fetch_sub(1, atomic::Ordering::SeqCst);
  }
}

/// Locates the first record whose range can contain `wl_start`: the record
/// holding it in its closed range when one exists, else the right-hand
/// neighbour.
fn locate(directory: &[Entry], wl_start: f64, wl_stop: f64) -> Result<usize, Error> {
  let Some(last) = directory.last() else {
    return Err(Error::NoOverlap);
  };
  if wl_start > last.wl_end || wl_stop < directory[0].wl_start {
    return Err(Error::NoOverlap);
  }
  if wl_start < directory[0].wl_start {
    return Ok(0);
  }
  let (mut i, mut j) = (0, directory.len() - 1);
  while j - i > 1 {
    let k = (i + j) / 2;
    if wl_start < directory[k].wl_start {
      j = k;
    } else {
      i = k;
    }
  }
  Ok(if wl_start > directory[i].wl_end { j } else { i })
}

pub struct Reader {
  data: fs::File,
  directory: Vec<Entry>,
  current: usize,
  // Compressed record scratch, reused between reads.
  record: Vec<u8>,
  lzw: lzw::Decompressor,
  _permit: Permit,
}

impl Reader {
  /// Loads and validates the descriptor directory and opens the data file
  /// for random reads.
  pub fn open(data: &path::Path, descriptor: &path::Path) -> Result<Self, Error> {
    let permit = Permit::acquire()?;
    let contents = fs::read(descriptor)?;
    let mut buffer = &contents[..];
    if buffer.remaining() < 4 {
      return Err(Error::ShortDescriptor(descriptor.to_path_buf()));
    }
    let count = buffer.get_u32_le() as usize;
    if count
      .checked_mul(ENTRY_LENGTH)
      .map_or(true, |bytes| buffer.remaining() < bytes)
    {
      return Err(Error::ShortDescriptor(descriptor.to_path_buf()));
    }
    let mut directory = Vec::with_capacity(count);
    for _ in 0..count {
      let entry = Entry {
        wl_start: buffer.get_f64_le(),
        wl_end: buffer.get_f64_le(),
        offset: buffer.get_u32_le(),
        length: buffer.get_i32_le(),
      };
      if entry.wl_start > entry.wl_end || entry.length < 0 {
        return Err(Error::BadDirectory);
      }
      directory.push(entry);
    }
    if directory
      .windows(2)
      .any(|window| window[0].wl_end > window[1].wl_start)
    {
      return Err(Error::BadDirectory);
    }
    let data = fs::File::open(data)?;
    log::debug!("{} record(s) in {descriptor:?}", directory.len());
    Ok(Self {
      data,
      directory,
      current: 0,
      record: Vec::with_capacity(RECORD_LENGTH),
      lzw: lzw::Decompressor::new(),
      _permit: permit,
    })
  }

  pub fn records(&self) -> usize {
    self.directory.len()
  }

  /// Positions the reader at the first record overlapping
  /// `[wl_start, wl_stop]`, decompresses it, and appends the transitions
  /// within the range. Returns how many were appended.
  pub fn read_range(
    &mut self,
    wl_start: f64,
    wl_stop: f64,
    transitions: &mut Vec<Transition>,
  ) -> Result<usize, Error> {
    if wl_start > wl_stop {
      return Err(Error::BadRange);
    }
    let k = locate(&self.directory, wl_start, wl_stop)?;
    let entry = self.directory[k];
    self
      .data
      .seek(io::SeekFrom::Start(entry.offset as u64))
      .map_err(Error::Seek)?;
    self.fill(&entry)?;
    self.current = k + 1;
    let before = transitions.len();
    for transition in self.decode_record()? {
      if transition.wavelength >= wl_start && transition.wavelength <= wl_stop {
        transitions.push(transition);
      }
    }
    Ok(transitions.len() - before)
  }

  /// Decompresses the record following the most recently read one, without
  /// re-positioning, and appends every transition it holds.
  pub fn read_next(&mut self, transitions: &mut Vec<Transition>) -> Result<usize, Error> {
    if self.current >= self.directory.len() {
      return Err(Error::PastEnd);
    }
    let entry = self.directory[self.current];
    self.fill(&entry)?;
    self.current += 1;
    let decoded = self.decode_record()?;
    let count = decoded.len();
    transitions.extend(decoded);
    Ok(count)
  }

  /// Serves a whole range query: one positioned read, then sequential
  /// records until the window is passed, filtering by wavelength, capped
  /// at `limit` transitions.
  pub fn query(
    &mut self,
    wl_start: f64,
    wl_stop: f64,
    limit: usize,
  ) -> Result<Vec<Transition>, Error> {
    let mut transitions = Vec::new();
    match self.read_range(wl_start, wl_stop, &mut transitions) {
      Ok(_) => (),
      Err(Error::NoOverlap) => return Ok(transitions),
      Err(error) => return Err(error),
    }
    transitions.truncate(limit);
    let mut record = Vec::new();
    while transitions.len() < limit {
      record.clear();
      match self.read_next(&mut record) {
        Ok(_) => (),
        Err(Error::PastEnd) => break,
        Err(error) => return Err(error),
      }
      // The directory is wavelength-sorted: once a record starts past the
      // window, nothing further can match.
      if record.first().map_or(false, |first| first.wavelength > wl_stop) {
        break;
      }
      for transition in record.drain(..) {
        if transitions.len() >= limit {
          break;
        }
        if transition.wavelength >= wl_start && transition.wavelength <= wl_stop {
          transitions.push(transition);
        }
      }
    }
    Ok(transitions)
  }

  fn fill(&mut self, entry: &Entry) -> Result<(), Error> {
    let length = entry.length as usize;
    self.record.resize(length, 0);
    self
      .data
      .read_exact(&mut self.record)
      .map_err(|_| Error::TruncatedRecord)?;
    Ok(())
  }

  fn decode_record(&mut self) -> Result<Vec<Transition>, Error> {
    let mut transitions = Vec::new();
    let mut line = [0; LINE_LENGTH];
    let mut filled = 0;
    self.lzw.decompress(&self.record, |byte| {
      line[filled] = byte;
      filled += 1;
      if filled == LINE_LENGTH {
        transitions.push(Transition::decode(&line));
        filled = 0;
      }
    })?;
    Ok(transitions)
  }
}
