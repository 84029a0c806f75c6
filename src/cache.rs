//! A small cache of downloaded message bodies.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use tempfile::{Builder, NamedTempFile, TempPath};

use crate::error::{Error, ParseError, Result};
use crate::session::{Session, SessionState};

/// Number of message bodies kept per mailbox.
pub const CACHE_LEN: usize = 10;

#[derive(Debug)]
struct Entry {
    index: usize,
    path: TempPath,
}

/// Downloaded message bodies, kept in temporary files.
///
/// Message `i` lives in slot `i % CACHE_LEN`, so a new body evicts whatever shared its slot.
/// Evicted and cleared files are deleted from disk. The cache is emptied whenever the mailbox is
/// reconciled, since indices may have moved.
#[derive(Debug)]
pub struct BodyCache {
    slots: Vec<Option<Entry>>,
    temp_dir: Option<PathBuf>,
}

impl BodyCache {
    /// An empty cache that creates its files in `temp_dir`, or the system default.
    pub fn new(temp_dir: Option<PathBuf>) -> BodyCache {
        BodyCache {
            slots: (0..CACHE_LEN).map(|_| None).collect(),
            temp_dir,
        }
    }

    /// The file holding the body of message `index`, if cached.
    pub fn get(&self, index: usize) -> Option<&Path> {
        match &self.slots[index % CACHE_LEN] {
            Some(entry) if entry.index == index => Some(&*entry.path),
            _ => None,
        }
    }

    /// Cache the body of message `index`, evicting the previous occupant of its slot.
    pub fn insert(&mut self, index: usize, path: TempPath) {
        let slot = &mut self.slots[index % CACHE_LEN];
        if let Some(old) = slot.take() {
            trace!("evicting cached body of message {}", old.index);
        }
        *slot = Some(Entry { index, path });
    }

    /// Forget and delete every cached body.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    pub(crate) fn temp_file(&self) -> io::Result<NamedTempFile> {
        let mut builder = Builder::new();
        builder.prefix("imap-body-");
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

impl<T: Read + Write> Session<T> {
    /// Download the full text of a message, or reuse a cached copy.
    ///
    /// The returned file is positioned at the start. Fetching marks the message as read, as the
    /// server does.
    pub fn fetch_body(&mut self, index: usize) -> Result<File> {
        let selected = self.selected.as_ref().ok_or(Error::NotSelected)?;
        if index >= selected.context.len() {
            return Err(Error::NoSuchMessage(index));
        }
        if let Some(path) = selected.cache.get(index) {
            debug!("body of message {} is cached", index + 1);
            return Ok(File::open(path)?);
        }
        let mut file = selected.cache.temp_file()?;

        let opened = match self.download(index, file.as_file_mut()) {
            Ok(()) => self.keep_body(index, file),
            Err(e) => Err(e),
        };
        if self.state != SessionState::Disconnected {
            self.finish()?;
        }
        opened
    }

    fn keep_body(&mut self, index: usize, mut file: NamedTempFile) -> Result<File> {
        file.flush()?;
        let path = file.into_temp_path();
        let opened = File::open(&path)?;
        let selected = self.selected.as_mut().ok_or(Error::NotSelected)?;
        selected.cache.insert(index, path);
        if let Some(record) = selected.context.headers.get_mut(index) {
            record.flags.read = true;
            record.server_flags.read = true;
        }
        selected.context.update_counts();
        Ok(opened)
    }

    fn download(&mut self, index: usize, out: &mut dyn Write) -> Result<()> {
        let seq = index + 1;
        let response = self.run_with_sink(&format!("FETCH {} RFC822", seq), Some(out))?;
        let found = response
            .lines
            .iter()
            .any(|l| l.streamed > 0 && l.untagged().and_then(|u| u.number) == Some(seq));
        if !found {
            return Err(ParseError::Fetch(format!("no body for message {}", seq)).into());
        }
        debug!("downloaded body of message {}", seq);
        Ok(())
    }
}
