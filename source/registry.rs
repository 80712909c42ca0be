// Client registries are plain text: a `#$ Client Name` comment names the
// client owning the address prefixes on the following lines, any other `#`
// line is a comment. A sender is authorised when its address and a prefix
// agree over the shorter of the two, case-insensitively.

use anyhow::Context as _;
use std::{cmp, fs, io, path};

/// Client name used by peer sites whose informational mails must not
/// trigger a reply.
pub const MIRROR_SITE: &str = "VALDMirrorSite";

#[derive(Debug)]
struct Client {
  name: String,
  prefixes: Vec<String>,
}

#[derive(Debug)]
pub struct Register {
  clients: Vec<Client>,
}

impl Register {
  /// Loads a registry; a missing file is not an error since a site may run
  /// with only one of the two registers.
  pub fn open(path: &path::Path) -> anyhow::Result<Option<Self>> {
    let contents = match fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(error) => Err(error).with_context(|| format!("couldn't read {path:?}"))?,
    };
    let mut clients: Vec<Client> = Vec::new();
    for line in contents.lines() {
      if let Some(name) = line.strip_prefix("#$") {
        clients.push(Client {
          name: name.chars().filter(char::is_ascii_alphabetic).collect(),
          prefixes: Vec::new(),
        });
      } else if line.starts_with('#') {
        continue;
      } else if let Some(client) = clients.last_mut() {
        let prefix = line.trim().to_lowercase();
        if !prefix.is_empty() {
          client.prefixes.push(prefix);
        }
      }
      // Prefixes before the first client name have nobody to belong to.
    }
    Ok(Some(Self { clients }))
  }

  pub fn find(&self, address: &str) -> Option<&str> {
    if address.is_empty() {
      return None;
    }
    let address = address.to_lowercase();
    for client in &self.clients {
      for prefix in &client.prefixes {
        let n = cmp::min(address.len(), prefix.len());
        if address.as_bytes()[..n] == prefix.as_bytes()[..n] {
          return Some(&client.name);
        }
      }
    }
    None
  }
}

/// Looks a sender up in the global register first, then in the local one; a
/// local-only client is marked with a `_local` suffix.
pub fn authenticate(
  global: Option<&Register>,
  local: Option<&Register>,
  address: &str,
) -> Option<String> {
  if let Some(name) = global.and_then(|register| register.find(address)) {
    return Some(name.to_string());
  }
  local
    .and_then(|register| register.find(address))
    .map(|name| format!("{name}_local"))
}
