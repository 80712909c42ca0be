use pretty_assertions::assert_eq;
use std::path;
use test_log::test;
use valdems::linelist;

mod common;

fn wavelengths(transitions: &[linelist::Transition]) -> Vec<f64> {
  transitions
    .iter()
    .map(|transition| transition.wavelength)
    .collect()
}

#[test]
fn round_trip() -> anyhow::Result<()> {
  let directory = tempfile::tempdir()?;
  // Three records, 1024 lines each, contiguous wavelength ranges; enough
  // repetition in the encoded bytes to run the code width up.
  let records: Vec<Vec<f64>> = (0..3)
    .map(|record| {
      (0..1024)
        .map(|line| 4000.0 + record as f64 * 1024.0 + line as f64)
        .collect()
    })
    .collect();
  let records: Vec<&[f64]> = records.iter().map(Vec::as_slice).collect();
  let (data, descriptor) = common::write_line_list(directory.path(), &records)?;

  let mut reader = linelist::Reader::open(&data, &descriptor)?;
  assert_eq!(3, reader.records());

  let mut transitions = Vec::new();
  reader.read_range(4000.0, 10000.0, &mut transitions)?;
  assert_eq!(1024, transitions.len());
  // Byte-for-byte: every decoded field matches what was encoded.
  for (i, transition) in transitions.iter().enumerate() {
    let wavelength = 4000.0 + i as f64;
    assert_eq!(wavelength, transition.wavelength);
    assert_eq!(2600, transition.species);
    assert_eq!(-1.5, transition.log_gf);
    assert_eq!(wavelength / 2.0, transition.energy_lower);
    assert_eq!(wavelength / 3.0, transition.energy_upper);
    assert_eq!(2.5, transition.j_lower);
    assert_eq!(3.5, transition.j_upper);
    assert_eq!(1.2, transition.lande_lower);
    assert_eq!(1.1, transition.lande_upper);
    assert_eq!(8.1, transition.gamma_radiative);
    assert_eq!(-5.5, transition.gamma_stark);
    assert_eq!(-7.7, transition.gamma_waals);
    assert_eq!([b' '; 210], transition.ancillary);
  }

  // The two remaining records come back in directory order, each sorted
  // after the previous one.
  let mut second = Vec::new();
  reader.read_next(&mut second)?;
  let mut third = Vec::new();
  reader.read_next(&mut third)?;
  assert_eq!(1024, second.len());
  assert_eq!(1024, third.len());
  assert!(transitions.last().unwrap().wavelength <= second[0].wavelength);
  assert!(second.last().unwrap().wavelength <= third[0].wavelength);
  assert!(matches!(
    reader.read_next(&mut Vec::new()),
    Err(linelist::Error::PastEnd)
  ));
  Ok(())
}

#[test]
fn range_query_spans_records() -> anyhow::Result<()> {
  let directory = tempfile::tempdir()?;
  let first: Vec<f64> = (0..11).map(|i| 4000.0 + 100.0 * i as f64).collect();
  let second: Vec<f64> = (0..11).map(|i| 5000.0 + 100.0 * i as f64).collect();
  let (data, descriptor) = common::write_line_list(directory.path(), &[&first, &second])?;

  let mut reader = linelist::Reader::open(&data, &descriptor)?;
  let transitions = reader.query(4900.0, 5100.0, 100_000)?;
  // Both records contribute, in wavelength-sorted order.
  assert_eq!(vec![4900.0, 5000.0, 5000.0, 5100.0], wavelengths(&transitions));

  // Every returned wavelength is within the window.
  let transitions = reader.query(4050.0, 4450.0, 100_000)?;
  assert_eq!(vec![4100.0, 4200.0, 4300.0, 4400.0], wavelengths(&transitions));

  // The cap truncates.
  let transitions = reader.query(4000.0, 6000.0, 3)?;
  assert_eq!(3, transitions.len());

  // A window off the directory is empty, not an error.
  assert!(reader.query(9000.0, 9500.0, 100_000)?.is_empty());
  Ok(())
}

#[test]
fn read_range_filters_and_positions() -> anyhow::Result<()> {
  let directory = tempfile::tempdir()?;
  let first: Vec<f64> = (0..5).map(|i| 4000.0 + i as f64).collect();
  let second: Vec<f64> = (0..5).map(|i| 4010.0 + i as f64).collect();
  let (data, descriptor) = common::write_line_list(directory.path(), &[&first, &second])?;

  let mut reader = linelist::Reader::open(&data, &descriptor)?;
  let mut transitions = Vec::new();
  assert_eq!(2, reader.read_range(4001.0, 4002.0, &mut transitions)?);
  assert_eq!(vec![4001.0, 4002.0], wavelengths(&transitions));

  // The reader is positioned on the following record.
  let mut transitions = Vec::new();
  assert_eq!(5, reader.read_next(&mut transitions)?);
  assert_eq!(4010.0, transitions[0].wavelength);

  assert!(matches!(
    reader.read_range(5000.0, 6000.0, &mut Vec::new()),
    Err(linelist::Error::NoOverlap)
  ));
  assert!(matches!(
    reader.read_range(4002.0, 4001.0, &mut Vec::new()),
    Err(linelist::Error::BadRange)
  ));
  Ok(())
}

#[test]
fn query_mode_runs() -> anyhow::Result<()> {
  let directory = tempfile::tempdir()?;
  let server = common::Server::new(directory.path())?;
  let (data, descriptor) =
    common::write_line_list(directory.path(), &[&[4000.0, 4500.0, 5000.0]])?;

  let mut arguments = server.arguments(valdems::Mode::Query);
  arguments.data = Some(data.to_str().unwrap().to_string());
  arguments.descriptor = Some(descriptor.to_str().unwrap().to_string());
  arguments.wavelength_start = Some(4400.0);
  arguments.wavelength_stop = Some(4600.0);
  valdems::run(&arguments)?;

  arguments.wavelength_stop = Some(4300.0);
  assert!(valdems::run(&arguments).is_err());
  Ok(())
}

#[test]
fn bad_files() -> anyhow::Result<()> {
  let directory = tempfile::tempdir()?;
  let (data, descriptor) = common::write_line_list(directory.path(), &[&[4000.0, 4001.0]])?;

  // A descriptor announcing more entries than it holds is rejected.
  let short = directory.path().join("short.dsc");
  std::fs::write(&short, 5u32.to_le_bytes())?;
  assert!(matches!(
    linelist::Reader::open(&data, &short),
    Err(linelist::Error::ShortDescriptor(_))
  ));

  // A data file ending inside a record is a truncated read.
  let truncated = directory.path().join("truncated.dat");
  std::fs::write(&truncated, &std::fs::read(&data)?[..10])?;
  let mut reader = linelist::Reader::open(&truncated, &descriptor)?;
  assert!(matches!(
    reader.read_range(4000.0, 4001.0, &mut Vec::new()),
    Err(linelist::Error::TruncatedRecord)
  ));

  assert!(matches!(
    linelist::Reader::open(path::Path::new("/nonexistent"), &descriptor),
    Err(linelist::Error::Io(_))
  ));
  Ok(())
}
