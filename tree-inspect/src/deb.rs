// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tree reading for `.deb` packages.

use {
    crate::{pipe::InProcessPipe, tar::TarTreeReader, Error, FileInfo, Result, TreeReader},
    archive_writer::{
        ar::ArReader,
        compression::{decompress_reader, Compression},
    },
    std::{
        fs::File,
        io::Write,
        path::{Path, PathBuf},
        thread,
    },
};

const BLOCKSIZE: usize = 65536;

/// Reads the `data.tar.*` member of a `.deb` package.
///
/// A producer thread scans the outer ar archive and pushes the
/// decompressed tar bytes through an in-process pipe; the consuming
/// side is an ordinary [TarTreeReader] over the pipe.
pub struct DebTreeReader {
    inner: TarTreeReader,
}

impl DebTreeReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pipe = InProcessPipe::new();

        let producer = pipe.clone();
        thread::spawn(move || {
            if let Err(e) = unpack_data_member(&path, &producer) {
                log::error!("error unpacking {}: {}", path.display(), e);
            }
            // EOF for the reader side on every exit path.
            producer.close();
        });

        Ok(Self {
            inner: TarTreeReader::from_reader(Box::new(pipe)),
        })
    }
}

/// Locate `data.tar.*`, decompress it, and stream it into the pipe.
fn unpack_data_member(path: &PathBuf, pipe: &InProcessPipe) -> Result<()> {
    let mut ar = ArReader::new(File::open(path)?)?;

    while let Some(entry) = ar.next_entry()? {
        if !entry.header.name.starts_with("data.tar") {
            continue;
        }

        let compression = Compression::from_filename(&entry.header.name);
        let mut reader = decompress_reader(
            Box::new(std::io::Cursor::new(entry.data)),
            compression,
        )?;

        let mut writer = pipe.clone();
        let mut buffer = [0u8; BLOCKSIZE];
        loop {
            let read = std::io::Read::read(&mut reader, &mut buffer)?;
            if read == 0 {
                return Ok(());
            }
            writer.write_all(&buffer[..read])?;
        }
    }

    Err(Error::NoDataMember(path.display().to_string()))
}

impl TreeReader for DebTreeReader {
    fn next(&mut self) -> Result<Option<FileInfo>> {
        self.inner.next()
    }

    fn is_done(&self) -> bool {
        self.inner.is_done()
    }
}
