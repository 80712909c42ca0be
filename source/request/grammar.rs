// Grammars for the tokens left over once a request line has been through
// the scrubbers: wavelength (and other numeric) pairs, abundance lists and
// model atmosphere file names. Input reaches these rules upper-cased and
// stripped of whitespace and comments.

/// One entry of an abundance block.
#[derive(Debug, PartialEq)]
pub enum Abundance {
  /// `X:value` or `XX:value` with a known element symbol (normalised, e.g.
  /// `Fe`).
  Element { symbol: String, value: f64 },
  /// `MH:value`, the overall metallicity.
  MetalOverHydrogen(f64),
  /// Anything else; carries the first three characters for the warning.
  Unknown(String),
}

peg::parser! {
  pub grammar request() for str {
    rule digit() = ['0'..='9']
    rule letter() = ['A'..='Z' | 'a'..='z']

    // The numeric shape the old %lg scans accepted: optional sign, digits
    // with an optional fraction, optional exponent.
    rule number() -> f64
      = n:$(['+' | '-']? (digit()+ ("." digit()*)? / "." digit()+)
            (['e' | 'E'] ['+' | '-']? digit()+)?)
      {? n.parse().or(Err("number")) }

    // Two numbers split by exactly one separator character; trailing text
    // is ignored, as %lg%*1s%lg ignored it.
    #[no_eof]
    pub rule pair() -> (f64, f64)
      = a:number() [_] b:number()
      { (a, b) }

    rule metallicity() -> Abundance
      = "MH:" v:number()
      { Abundance::MetalOverHydrogen(v) }
    rule element() -> Abundance
      = s:$(letter() letter()?) ":" v:number()
      {?
        match normalise(s) {
          Some(symbol) => Ok(Abundance::Element { symbol, value: v }),
          None => Err("element"),
        }
      }
    rule unknown() -> Abundance
      = s:$((!"," [_])+)
      { Abundance::Unknown(s.chars().take(3).collect()) }
    rule entry() -> Option<Abundance>
      = a:(metallicity() / element() / unknown()) { Some(a) }
      / "" { None }

    // A comma-delimited abundance list; empty entries are skipped.
    pub rule abundances() -> Vec<Abundance>
      = entries:(entry() ** ",")
      { entries.into_iter().flatten().collect() }

    // Model atmosphere file names encode the grid point: 5-digit effective
    // temperature, 'g', 2 digits of 10 * log g.
    pub rule model() -> (i32, i32)
      = t:$(digit()*<5>) "g" g:$(digit()*<2>) ".krz"
      { (t.parse().unwrap(), g.parse().unwrap()) /* guaranteed by the digits */ }
  }
}

// Symbols of the 99 elements abundances can be given for, in atomic number
// order.
static ELEMENTS: [&str; 99] = [
  "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", //
  "Na", "Mg", "Al", "Si", "P", "S", "Cl", "Ar", "K", "Ca", //
  "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", //
  "Ga", "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", //
  "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn", //
  "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", //
  "Pm", "Sm", "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb", //
  "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", //
  "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", //
  "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf", "Es",
];

/// Matches a one- or two-character symbol against the element table,
/// case-insensitively, and returns the normalised spelling.
pub fn normalise(symbol: &str) -> Option<String> {
  ELEMENTS
    .iter()
    .find(|element| element.eq_ignore_ascii_case(symbol))
    .map(|element| element.to_string())
}

/// 1-based atomic number of a species symbol, if known.
pub fn element_number(symbol: &str) -> Option<usize> {
  ELEMENTS
    .iter()
    .position(|element| element.eq_ignore_ascii_case(symbol))
    .map(|position| position + 1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pairs() {
    assert_eq!((5000.0, 5010.0), request::pair("5000,5010").unwrap());
    assert_eq!((5700.0, 6700.0), request::pair("5700.,6700.,").unwrap());
    assert_eq!((0.01, 2.0), request::pair("0.01,2.0").unwrap());
    assert_eq!((8000.0, 4.5), request::pair("8000,4.5").unwrap());
    assert_eq!((-1.0, 2e3), request::pair("-1.0,2e3").unwrap());
    // Any single character separates, the way the old scan skipped one.
    assert_eq!((5000.0, 6000.0), request::pair("5000-6000").unwrap());
    assert!(request::pair("5000").is_err());
    assert!(request::pair("5000,,6000").is_err());
    assert!(request::pair("").is_err());
  }

  #[test]
  fn abundances() {
    assert_eq!(
      vec![
        Abundance::Element {
          symbol: "Sr".to_string(),
          value: -4.67
        },
        Abundance::Element {
          symbol: "Cr".to_string(),
          value: -3.37
        },
      ],
      request::abundances("SR:-4.67,CR:-3.37,").unwrap()
    );
    assert_eq!(
      vec![Abundance::MetalOverHydrogen(-0.5)],
      request::abundances("MH:-0.5").unwrap()
    );
    assert_eq!(
      vec![
        Abundance::Unknown("XX:".to_string()),
        Abundance::Element {
          symbol: "Eu".to_string(),
          value: -5.53
        },
      ],
      request::abundances("XX:1.0,EU:-5.53").unwrap()
    );
    // A value that doesn't parse demotes the whole entry.
    assert_eq!(
      vec![Abundance::Unknown("FE:".to_string())],
      request::abundances("FE:abc").unwrap()
    );
  }

  #[test]
  fn models() {
    assert_eq!((5750, 45), request::model("05750g45.krz").unwrap());
    assert!(request::model("5750g45.krz").is_err());
    assert!(request::model("notamodel.dat").is_err());
  }

  #[test]
  fn elements() {
    assert_eq!(Some("Fe".to_string()), normalise("FE"));
    assert_eq!(Some("H".to_string()), normalise("h"));
    assert_eq!(None, normalise("Xx"));
    assert_eq!(Some(26), element_number("fe"));
    assert_eq!(Some(99), element_number("ES"));
    assert_eq!(None, element_number("QQ"));
  }
}
