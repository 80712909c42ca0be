// Request bodies come from mail clients of every vintage, so every line is
// scrubbed before interpretation: whitespace goes away, comments are cut,
// and only the characters the request grammar can use survive.

// Ordinary request lines are read at terminal width; only the abundance
// block accepts longer input.
pub const LINE_CAPACITY: usize = 80;
pub const ABUNDANCE_LINE_CAPACITY: usize = 320;

const SPECIES_CAPACITY: usize = 255;

/// Strips whitespace and comments from a request line, keeping only the
/// characters the request grammar understands.
pub fn compress(line: &str, capacity: usize) -> String {
  let mut compressed = String::new();
  for c in line.chars().take(capacity) {
    if c == '#' {
      break;
    }
    if c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | ',' | '-' | '+') {
      compressed.push(c);
    }
  }
  compressed
}

/// Isolates a species name. Accepted shapes are `<name>`, `<name> <number>`,
/// `<name>+` and `<name>+<number>`: the name is the leading alphanumeric
/// run, a blank-separated spectrum number is appended to it, and a `+`
/// terminates the field.
pub fn compress_species(line: &str) -> String {
  let line: Vec<char> = line.chars().take(SPECIES_CAPACITY).collect();
  let mut i = 0;
  while i < line.len() && (line[i] == ' ' || line[i] == '\t') {
    i += 1;
  }
  let mut species = String::new();
  while i < line.len() && line[i].is_ascii_alphanumeric() {
    species.push(line[i]);
    i += 1;
  }
  if species.is_empty() {
    return species;
  }
  while i < line.len() && (line[i] == ' ' || line[i] == '\t') {
    i += 1;
  }
  while i < line.len() && line[i].is_ascii_digit() {
    species.push(line[i]);
    i += 1;
  }
  species
}

/// Copies `line` leaving out everything enclosed between `open` and `close`.
/// An unbalanced quote yields an empty string.
pub fn swallow_quotes(line: &str, open: char, close: char) -> String {
  let mut swallowed = String::new();
  let mut quote = false;
  for c in line.chars() {
    if c == open && !quote {
      quote = true;
    } else if c == close && quote {
      quote = false;
    } else if !quote {
      swallowed.push(c);
    }
  }
  if quote {
    swallowed.clear();
  }
  swallowed
}

/// Replaces shell metacharacters with spaces so header text can be embedded
/// in an emitted script.
pub fn remove_meta(line: &str) -> String {
  line
    .chars()
    .map(|c| match c {
      ';' | '&' | '|' | '>' | '<' | '"' | '\n' | '\r' => ' ',
      c => c,
    })
    .collect()
}
