// Model atmospheres are selected by rounding the requested parameters to
// the file-name grid and scanning the model directory for the nearest
// entry, temperature first, gravity as the tie break.

use super::grammar;
use anyhow::Context as _;
use std::path;

/// Rounds an effective temperature and a log g to the grid encoded in the
/// model file names (whole kelvins, tenths of log g).
pub fn grid_point(temperature: f64, gravity: f64) -> (i32, i32) {
  let mut t = temperature as i32;
  if ((temperature * 10.0) as i64).rem_euclid(10) > 5 {
    t += 1;
  }
  let mut g = (gravity * 10.0) as i32;
  if ((gravity * 100.0) as i64).rem_euclid(10) > 5 {
    g += 1;
  }
  (t, g)
}

pub fn file_name(temperature: i32, gravity: i32) -> String {
  format!("{temperature:05}g{gravity:02}.krz")
}

/// Scans `directory` for the model closest to `name` (itself a grid file
/// name). Temperature distance dominates; gravity decides ties. Returns
/// `None` when the directory holds no model at all.
pub fn nearest(directory: &path::Path, name: &str) -> anyhow::Result<Option<String>> {
  let (target_t, target_g) = grammar::request::model(name)
    .with_context(|| format!("{name} is not a model file name"))?;
  let (mut best_t, mut best_g) = (-1, -1);
  for entry in
    std::fs::read_dir(directory).with_context(|| format!("couldn't scan {directory:?}"))?
  {
    let entry = entry?;
    let file = entry.file_name();
    let Some(file) = file.to_str() else {
      continue;
    };
    let Ok((t, g)) = grammar::request::model(file) else {
      continue;
    };
    if (t - target_t).abs() < (best_t - target_t).abs() {
      (best_t, best_g) = (t, g);
    } else if (t - target_t).abs() == (best_t - target_t).abs()
      && (g - target_g).abs() < (best_g - target_g).abs()
    {
      (best_t, best_g) = (t, g);
    }
  }
  if best_t >= 0 && best_g >= 0 {
    Ok(Some(file_name(best_t, best_g)))
  } else {
    Ok(None)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;

  #[test]
  fn rounding() {
    assert_eq!((5780, 44), grid_point(5780.0, 4.4));
    // Tenths above .5 round the temperature up, hundredths the gravity.
    assert_eq!((5781, 44), grid_point(5780.7, 4.4));
    assert_eq!((5780, 44), grid_point(5780.5, 4.4));
    assert_eq!((8000, 45), grid_point(8000.0, 4.5));
    assert_eq!((5780, 45), grid_point(5780.0, 4.47));
  }

  #[test]
  fn names() {
    assert_eq!("05780g44.krz", file_name(5780, 44));
    assert_eq!("00500g05.krz", file_name(500, 5));
  }

  #[test]
  fn nearest_model() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    for model in ["05750g45.krz", "05500g40.krz"] {
      fs::write(directory.path().join(model), "")?;
    }
    fs::write(directory.path().join("README"), "not a model")?;

    // Temperature has more weight than gravity.
    assert_eq!(
      Some("05750g45.krz".to_string()),
      nearest(directory.path(), "05780g44.krz")?
    );
    assert_eq!(
      Some("05500g40.krz".to_string()),
      nearest(directory.path(), "05499g45.krz")?
    );
    // Exact hit.
    assert_eq!(
      Some("05750g45.krz".to_string()),
      nearest(directory.path(), "05750g45.krz")?
    );
    Ok(())
  }

  #[test]
  fn empty_directory() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    assert_eq!(None, nearest(directory.path(), "05750g45.krz")?);
    Ok(())
  }
}
