// Option keywords may appear on any line of a request body. Each one is
// recognised by a minimum prefix whose length is part of the interface:
// the lengths below disambiguate the keyword set and deliberately accept
// longer tails (LONGEST still selects the long format). Recognising a
// keyword consumes the token.

use crate::job;
use std::fs;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WavelengthUnits {
  Angstrom,
  Nanometre,
  InverseCm,
}

/// Per-request option bundle, reset for every request and threaded
/// explicitly through the parser.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
  pub long_format: bool,
  pub personal_configuration: bool,
  pub have_radiative_damping: bool,
  pub have_stark_damping: bool,
  pub have_waals_damping: bool,
  pub have_lande: bool,
  pub have_term_designation: bool,
  pub extended_waals: bool,
  pub zeeman_pattern: bool,
  pub stark_broadening: bool,
  pub ftp_retrieval: bool,
  pub energy_in_inverse_cm: bool,
  pub wavelength_in_vacuum: bool,
  pub wavelength_units: WavelengthUnits,
  pub isotopic_scaling: bool,
  pub hfs_splitting: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      long_format: false,
      personal_configuration: false,
      have_radiative_damping: false,
      have_stark_damping: false,
      have_waals_damping: false,
      have_lande: false,
      have_term_designation: false,
      extended_waals: false,
      zeeman_pattern: false,
      stark_broadening: false,
      ftp_retrieval: false,
      energy_in_inverse_cm: false,
      wavelength_in_vacuum: false,
      wavelength_units: WavelengthUnits::Angstrom,
      isotopic_scaling: true,
      hfs_splitting: false,
    }
  }
}

impl Config {
  /// The option line handed to the selection helpers: the format selector
  /// folds the energy unit in, the rest are plain switches.
  pub fn flags_line(&self) -> String {
    format!(
      "{} {} {} {} {} {} {} {} {} {} {} {} {}",
      self.long_format as i32 + 3 * self.energy_in_inverse_cm as i32,
      self.have_radiative_damping as i32,
      self.have_stark_damping as i32,
      self.have_waals_damping as i32,
      self.have_lande as i32,
      self.have_term_designation as i32,
      self.extended_waals as i32,
      self.zeeman_pattern as i32,
      self.stark_broadening as i32,
      self.wavelength_in_vacuum as i32,
      self.wavelength_units as i32,
      self.isotopic_scaling as i32,
      self.hfs_splitting as i32,
    )
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Keyword {
  LongFormat,
  ShortFormat,
  PersonalConfiguration,
  DefaultConfiguration,
  HaveRadiative,
  HaveStark,
  HaveWaals,
  HaveLande,
  HaveTerm,
  DefaultWaals,
  ExtendedWaals,
  ZeemanPattern,
  StarkBroadening,
  ViaFtp,
  EnergyUnitEv,
  EnergyUnitInverseCm,
  MediumAir,
  MediumVacuum,
  WaveUnitAngstrom,
  WaveUnitNanometre,
  WaveUnitInverseCm,
  IsotopicScalingOn,
  IsotopicScalingOff,
  HfsSplitting,
  NoHfsSplitting,
}

// (keyword, minimum prefix length). First match wins.
const KEYWORDS: [(&str, usize, Keyword); 25] = [
  ("LONGFORMAT", 4, Keyword::LongFormat),
  ("SHORTFORMAT", 5, Keyword::ShortFormat),
  ("PERSONALCONFIGURATION", 6, Keyword::PersonalConfiguration),
  ("DEFAULTCONFIGURATION", 10, Keyword::DefaultConfiguration),
  ("HAVERAD", 7, Keyword::HaveRadiative),
  ("HAVESTARK", 9, Keyword::HaveStark),
  ("HAVEWAALS", 9, Keyword::HaveWaals),
  ("HAVELANDE", 9, Keyword::HaveLande),
  ("HAVETERM", 8, Keyword::HaveTerm),
  ("DEFAULTWAALS", 8, Keyword::DefaultWaals),
  ("EXTENDEDWAALS", 9, Keyword::ExtendedWaals),
  ("ZEEMANPATTERN", 6, Keyword::ZeemanPattern),
  ("STARKBROADENING", 5, Keyword::StarkBroadening),
  ("VIAFTP", 6, Keyword::ViaFtp),
  ("ENERGYUNITEV", 11, Keyword::EnergyUnitEv),
  ("ENERGYUNIT1CM", 12, Keyword::EnergyUnitInverseCm),
  ("MEDIUMAIR", 7, Keyword::MediumAir),
  ("MEDIUMVACUUM", 7, Keyword::MediumVacuum),
  ("WAVEUNITANGSTROM", 9, Keyword::WaveUnitAngstrom),
  ("WAVEUNITNM", 9, Keyword::WaveUnitNanometre),
  ("WAVEUNIT1CM", 10, Keyword::WaveUnitInverseCm),
  ("ISOTOPICSCALINGON", 17, Keyword::IsotopicScalingOn),
  ("ISOTOPICSCALINGOFF", 18, Keyword::IsotopicScalingOff),
  ("HFSSPLITTING", 8, Keyword::HfsSplitting),
  ("NOHFSSPLITTING", 10, Keyword::NoHfsSplitting),
];

fn recognise(token: &str) -> Option<Keyword> {
  let token = token.as_bytes();
  KEYWORDS
    .iter()
    .find(|(keyword, length, _)| {
      token.len() >= *length && token[..*length] == keyword.as_bytes()[..*length]
    })
    .map(|(_, _, keyword)| *keyword)
}

/// Looks the token up in the keyword table and applies its effect. The
/// token is upper-cased in place; a recognised keyword is consumed (the
/// token is cleared). Configuration-file problems are reported into the
/// result stream, never propagated.
pub fn set(
  token: &mut String,
  config: &mut Config,
  script: &mut job::Script,
  home: &crate::Home,
  personal_config: &str,
  number: i64,
) {
  token.make_ascii_uppercase();
  let Some(keyword) = recognise(token) else {
    return;
  };
  match keyword {
    Keyword::LongFormat => config.long_format = true,
    Keyword::ShortFormat => config.long_format = false,
    Keyword::PersonalConfiguration => {
      config.personal_configuration = true;
      ensure_personal_configuration(config, script, home, personal_config, number);
    }
    Keyword::DefaultConfiguration => config.personal_configuration = false,
    Keyword::HaveRadiative => config.have_radiative_damping = true,
    Keyword::HaveStark => config.have_stark_damping = true,
    Keyword::HaveWaals => config.have_waals_damping = true,
    Keyword::HaveLande => config.have_lande = true,
    Keyword::HaveTerm => config.have_term_designation = true,
    Keyword::DefaultWaals => config.extended_waals = false,
    Keyword::ExtendedWaals => config.extended_waals = true,
    Keyword::ZeemanPattern => config.zeeman_pattern = true,
    Keyword::StarkBroadening => config.stark_broadening = true,
    Keyword::ViaFtp => config.ftp_retrieval = true,
    Keyword::EnergyUnitEv => config.energy_in_inverse_cm = false,
    Keyword::EnergyUnitInverseCm => config.energy_in_inverse_cm = true,
    Keyword::MediumAir => config.wavelength_in_vacuum = false,
    Keyword::MediumVacuum => config.wavelength_in_vacuum = true,
    Keyword::WaveUnitAngstrom => config.wavelength_units = WavelengthUnits::Angstrom,
    Keyword::WaveUnitNanometre => config.wavelength_units = WavelengthUnits::Nanometre,
    Keyword::WaveUnitInverseCm => config.wavelength_units = WavelengthUnits::InverseCm,
    Keyword::IsotopicScalingOn => config.isotopic_scaling = true,
    Keyword::IsotopicScalingOff => config.isotopic_scaling = false,
    Keyword::HfsSplitting => config.hfs_splitting = true,
    Keyword::NoHfsSplitting => config.hfs_splitting = false,
  }
  token.clear();
}

/// Makes sure the client's personal configuration file exists, templating
/// it from the site default on first use.
fn ensure_personal_configuration(
  config: &mut Config,
  script: &mut job::Script,
  home: &crate::Home,
  personal_config: &str,
  number: i64,
) {
  let result = format!("result.{number:06}");
  let path = home.personal_config_dir().join(personal_config);
  match path.try_exists() {
    Ok(true) => return,
    Ok(false) => (),
    Err(error) => {
      log::warn!("couldn't probe {path:?}: {error}");
      script.echo_to("ERROR: Wrong path to personal configuration", &result);
      script.echo_to("       Contact VALD administrator", &result);
      config.personal_configuration = false;
      return;
    }
  }
  if let Err(error) = fs::copy(home.default_config(), &path).and_then(|_| {
    use std::os::unix::fs::PermissionsExt as _;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
  }) {
    log::warn!("couldn't template {path:?}: {error}");
    script.echo_to("ERROR: Wrong path to personal configuration", &result);
    script.echo_to("       Contact VALD administrator", &result);
    config.personal_configuration = false;
    return;
  }
  script.echo_to(
    format!("Configuration file {personal_config} has been created"),
    &result,
  );
}
