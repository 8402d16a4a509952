//! Path resolution (spec.md §4.6): walks an absolute, slash-delimited path one component at a
//! time, descending into subdirectories via [`dir::read_dir`], and stops at the first entry that
//! either matches the final component or fails to be a directory when one is required.

use std::ops::ControlFlow;

use crate::dir::{self, DecodedEntry};
use crate::error::Fat32Error;
use crate::volume::Volume;

/// The result of resolving a path: either the root directory itself or a concrete directory
/// entry found while descending.
pub enum Resolved {
    Root,
    Entry(DecodedEntry),
}

/// Resolves `path` against `volume`, returning the entry it names.
///
/// `path` is always matched as an absolute path; a leading `/` is assumed even if the caller
/// omitted it, and repeated or trailing slashes are ignored.
pub fn resolve(volume: &Volume, path: &str) -> Result<Resolved, Fat32Error> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Ok(Resolved::Root);
    }

    let mut current_cluster = volume.root_cluster();
    let last = components.len() - 1;

    for (i, component) in components.iter().enumerate() {
        let mut found: Option<DecodedEntry> = None;

        dir::read_dir(
            volume.fat(),
            volume.device(),
            current_cluster,
            volume.mount_time(),
            |name, entry| {
                if name == *component {
                    found = Some(entry);
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )?;

        let entry = found.ok_or(Fat32Error::NotFound)?;

        if i == last {
            return Ok(Resolved::Entry(entry));
        }
        if !entry.is_dir {
            return Err(Fat32Error::NotDir);
        }
        current_cluster = entry.start_cluster;
    }

    unreachable!("components is non-empty, so the loop always returns")
}
