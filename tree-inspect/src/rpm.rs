// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tree reading for RPM packages.

use {
    crate::{pipe::InProcessPipe, FileInfo, Result, TreeReader},
    cpio_reader::CpioReader,
    rpm_packaging::RpmReader,
    std::{fs::File, io::BufReader, path::Path, thread},
};

/// Reads the cpio payload of an RPM package.
///
/// A producer thread parses the RPM headers and streams the
/// decompressed payload through an in-process pipe; the consuming side
/// is a [CpioReader] over the pipe.
pub struct RpmTreeReader {
    cpio: CpioReader<InProcessPipe>,
    done: bool,
}

impl RpmTreeReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pipe = InProcessPipe::new();

        let producer = pipe.clone();
        thread::spawn(move || {
            let unpack = || -> rpm_packaging::Result<()> {
                let mut reader = RpmReader::new(BufReader::new(File::open(&path)?));
                let headers = reader.read_headers()?;
                let compressor = headers.payload_compressor()?;
                let mut writer = producer.clone();
                reader.stream_payload(compressor.as_deref(), &mut writer)?;
                Ok(())
            };

            if let Err(e) = unpack() {
                log::error!("error unpacking {}: {}", path.display(), e);
            }
            producer.close();
        });

        Ok(Self {
            cpio: CpioReader::new(pipe),
            done: false,
        })
    }
}

impl TreeReader for RpmTreeReader {
    fn next(&mut self) -> Result<Option<FileInfo>> {
        if self.done {
            return Ok(None);
        }

        match self.cpio.read_next()? {
            Some(info) => Ok(Some(info)),
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }
}
