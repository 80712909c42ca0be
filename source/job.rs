// Job and process scripts are built as a small command AST and serialised
// to csh at the very end, so tests can look at the structure instead of
// diffing shell text. The only control construct the scripts use is the
// `|| (echo ...; set ERROR_STATE=1)` trap.

use std::{fmt, fs, io::Write as _, path};

pub const ERROR_VARIABLE: &str = "ERROR_STATE";

#[derive(Clone, Debug, PartialEq)]
pub struct Command {
  pub program: path::PathBuf,
  pub arguments: Vec<String>,
}

impl Command {
  pub fn new(program: impl Into<path::PathBuf>) -> Self {
    Self {
      program: program.into(),
      arguments: Vec::new(),
    }
  }

  pub fn arg(mut self, argument: impl Into<String>) -> Self {
    self.arguments.push(argument.into());
    self
  }
}

impl fmt::Display for Command {
  fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    write!(formatter, "{}", self.program.display())?;
    for argument in &self.arguments {
      write!(formatter, " {argument}")?;
    }
    Ok(())
  }
}

/// How a redirection target is opened.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mode {
  Append,
  Truncate,
}

impl Mode {
  fn operator(&self) -> &'static str {
    match self {
      Mode::Append => ">>",
      Mode::Truncate => ">",
    }
  }
}

/// One stage of a pipeline. A grouped stage is rendered inside parentheses,
/// the way multi-word helper invocations are isolated in csh.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
  pub command: Command,
  pub grouped: bool,
}

impl Stage {
  pub fn plain(command: Command) -> Self {
    Self {
      command,
      grouped: false,
    }
  }

  pub fn grouped(command: Command) -> Self {
    Self {
      command,
      grouped: true,
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    if self.grouped {
      write!(formatter, "({})", self.command)
    } else {
      write!(formatter, "{}", self.command)
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Line {
  Shebang,
  Set {
    variable: String,
    value: String,
  },
  Comment(String),
  /// `echo TEXT [>> target]`; the text carries its own quoting.
  Echo {
    text: String,
    target: Option<(path::PathBuf, Mode)>,
  },
  /// A single command with optional grouping, redirections and error trap.
  Run {
    stage: Stage,
    stdin: Option<path::PathBuf>,
    target: Option<(path::PathBuf, Mode)>,
    trap: Option<String>,
  },
  /// `first < stdin | middle | (last >> capture) >>& errors`.
  Pipeline {
    stages: Vec<Stage>,
    stdin: Option<path::PathBuf>,
    capture: Option<(path::PathBuf, Mode)>,
    errors: Option<path::PathBuf>,
  },
  Exit {
    variable: String,
  },
}

impl fmt::Display for Line {
  fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Line::Shebang => write!(formatter, "#!/bin/csh"),
      Line::Set { variable, value } => write!(formatter, "set {variable}={value}"),
      Line::Comment(text) => write!(formatter, "{text}"),
      Line::Echo { text, target } => {
        write!(formatter, "echo {text}")?;
        if let Some((target, mode)) = target {
          write!(formatter, " {} {}", mode.operator(), target.display())?;
        }
        Ok(())
      }
      Line::Run {
        stage,
        stdin,
        target,
        trap,
      } => {
        write!(formatter, "{stage}")?;
        if let Some(stdin) = stdin {
          write!(formatter, " < {}", stdin.display())?;
        }
        if let Some((target, mode)) = target {
          write!(formatter, " {} {}", mode.operator(), target.display())?;
        }
        if let Some(trap) = trap {
          write!(
            formatter,
            " || (echo {trap}; set {ERROR_VARIABLE}=1)"
          )?;
        }
        Ok(())
      }
      Line::Pipeline {
        stages,
        stdin,
        capture,
        errors,
      } => {
        let last = stages.len() - 1;
        for (i, stage) in stages.iter().enumerate() {
          if i > 0 {
            write!(formatter, " | ")?;
          }
          match capture {
            Some((target, mode)) if i == last => {
              write!(formatter, "({stage} {} {})", mode.operator(), target.display())?
            }
            _ => write!(formatter, "{stage}")?,
          }
          if i == 0 {
            if let Some(stdin) = stdin {
              write!(formatter, " < {}", stdin.display())?;
            }
          }
        }
        if let Some(errors) = errors {
          write!(formatter, " >>& {}", errors.display())?;
        }
        Ok(())
      }
      Line::Exit { variable } => write!(formatter, "exit ${variable}"),
    }
  }
}

#[derive(Debug, Default, PartialEq)]
pub struct Script {
  pub lines: Vec<Line>,
}

impl Script {
  pub fn new() -> Self {
    Self {
      lines: vec![Line::Shebang],
    }
  }

  pub fn push(&mut self, line: Line) {
    self.lines.push(line);
  }

  pub fn echo(&mut self, text: impl Into<String>) {
    self.push(Line::Echo {
      text: text.into(),
      target: None,
    });
  }

  pub fn echo_to(&mut self, text: impl Into<String>, target: impl Into<path::PathBuf>) {
    self.push(Line::Echo {
      text: text.into(),
      target: Some((target.into(), Mode::Append)),
    });
  }

  pub fn run(&mut self, command: Command) {
    self.push(Line::Run {
      stage: Stage::plain(command),
      stdin: None,
      target: None,
      trap: None,
    });
  }

  pub fn write_to(&self, file: &mut fs::File) -> std::io::Result<()> {
    write!(file, "{self}")
  }
}

impl fmt::Display for Script {
  fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    for line in &self.lines {
      writeln!(formatter, "{line}")?;
    }
    Ok(())
  }
}
